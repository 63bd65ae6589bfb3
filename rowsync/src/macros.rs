//! Macros for sync error handling.
//!
//! Provides convenience macros for creating and returning
//! [`crate::error::SyncError`] instances with reduced boilerplate.

/// Creates a [`crate::error::SyncError`] from error kind and description.
///
/// Accepts a static description, an optional dynamic detail, and an optional
/// source error.
#[macro_export]
macro_rules! sync_error {
    ($kind:expr, $desc:expr) => {
        $crate::error::SyncError::from(($kind, $desc))
    };
    ($kind:expr, $desc:expr, source: $source:expr) => {
        $crate::error::SyncError::from(($kind, $desc)).with_source($source)
    };
    ($kind:expr, $desc:expr, $detail:expr) => {
        $crate::error::SyncError::from(($kind, $desc, $detail.to_string()))
    };
    ($kind:expr, $desc:expr, $detail:expr, source: $source:expr) => {
        $crate::error::SyncError::from(($kind, $desc, $detail.to_string())).with_source($source)
    };
}

/// Creates and returns a [`crate::error::SyncError`] from the current function.
///
/// Combines error creation with early return for conditions that should
/// immediately terminate execution. Supports the same optional detail and
/// source arguments as [`sync_error!`].
#[macro_export]
macro_rules! bail {
    ($kind:expr, $desc:expr) => {
        return ::core::result::Result::Err($crate::sync_error!($kind, $desc))
    };
    ($kind:expr, $desc:expr, source: $source:expr) => {
        return ::core::result::Result::Err($crate::sync_error!($kind, $desc, source: $source))
    };
    ($kind:expr, $desc:expr, $detail:expr) => {
        return ::core::result::Result::Err($crate::sync_error!($kind, $desc, $detail))
    };
    ($kind:expr, $desc:expr, $detail:expr, source: $source:expr) => {
        return ::core::result::Result::Err($crate::sync_error!(
            $kind,
            $desc,
            $detail,
            source: $source
        ))
    };
}
