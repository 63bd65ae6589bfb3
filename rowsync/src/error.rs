//! Error types and result definitions for sync operations.
//!
//! Provides a classified error type with captured diagnostic metadata for the
//! sync pipeline. [`SyncError`] supports single errors, errors with additional
//! detail, and multiple aggregated errors collected from parallel workers.

use std::borrow::Cow;
use std::error;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

/// Convenient result type for sync operations using [`SyncError`] as the error type.
pub type SyncResult<T> = Result<T, SyncError>;

/// Detailed payload stored for single [`SyncError`] instances.
#[derive(Debug, Clone)]
struct ErrorPayload {
    kind: ErrorKind,
    description: Cow<'static, str>,
    detail: Option<Cow<'static, str>>,
    source: Option<Arc<dyn error::Error + Send + Sync>>,
    location: &'static Location<'static>,
}

/// Main error type for sync operations.
///
/// [`SyncError`] can represent a single classified error or multiple
/// aggregated errors, while exposing a unified interface for kind inspection
/// and source chaining.
#[derive(Debug, Clone)]
pub struct SyncError {
    repr: ErrorRepr,
}

/// Internal representation of error data.
#[derive(Debug, Clone)]
enum ErrorRepr {
    /// Single error payload holding rich metadata.
    Single(ErrorPayload),
    /// Multiple aggregated errors.
    ///
    /// This variant is mainly useful to capture multiple worker failures.
    Many {
        errors: Vec<SyncError>,
        location: &'static Location<'static>,
    },
}

/// Specific categories of errors that can occur during sync operations.
///
/// The classification follows the pipeline's failure taxonomy: collaborator
/// failures surface with their own kinds so callers can distinguish
/// retryable admission problems from data problems.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // Collaborator failures.
    SourceQueryFailed,
    DestinationWriteFailed,
    ConfigStoreFailed,
    CheckpointStoreFailed,

    // Transport failures.
    TransportSendFailed,
    TransportClosed,

    // Admission failures.
    PoolClosed,
    AdmissionTimeout,

    // Data & configuration errors.
    InvalidEvent,
    InvalidConfig,
    ConversionError,

    // Checkpoint protocol.
    CheckpointResetRejected,

    // Capture failures.
    CaptureFailed,

    // State & workflow errors.
    WorkerPanic,
    InvalidState,

    // IO & serialization errors.
    SerializationError,
    DeserializationError,

    // Unknown / uncategorized.
    Unknown,
}

impl SyncError {
    /// Returns the [`ErrorKind`] of this error.
    ///
    /// For multiple errors, returns the kind of the first error or
    /// [`ErrorKind::Unknown`] if the error list is empty.
    pub fn kind(&self) -> ErrorKind {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.kind,
            ErrorRepr::Many { ref errors, .. } => errors
                .first()
                .map(|err| err.kind())
                .unwrap_or(ErrorKind::Unknown),
        }
    }

    /// Returns all [`ErrorKind`]s present in this error.
    pub fn kinds(&self) -> Vec<ErrorKind> {
        match self.repr {
            ErrorRepr::Single(ref payload) => vec![payload.kind],
            ErrorRepr::Many { ref errors, .. } => errors
                .iter()
                .flat_map(|err| err.kinds())
                .collect::<Vec<_>>(),
        }
    }

    /// Returns the detailed error information if available.
    pub fn detail(&self) -> Option<&str> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.detail.as_deref(),
            ErrorRepr::Many { ref errors, .. } => errors.iter().find_map(|e| e.detail()),
        }
    }

    /// Returns the captured callsite location for this error.
    pub fn location(&self) -> &'static Location<'static> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.location,
            ErrorRepr::Many { location, .. } => location,
        }
    }

    /// Attaches an originating [`error::Error`] to this error and returns the
    /// modified instance.
    ///
    /// Has no effect when called on aggregated errors because aggregates
    /// forward the first contained error as their source.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        if let ErrorRepr::Single(ref mut payload) = self.repr {
            payload.source = Some(Arc::new(source));
        }
        self
    }

    /// Creates a [`SyncError`] from its components.
    #[track_caller]
    fn from_components(
        kind: ErrorKind,
        description: Cow<'static, str>,
        detail: Option<Cow<'static, str>>,
    ) -> Self {
        SyncError {
            repr: ErrorRepr::Single(ErrorPayload {
                kind,
                description,
                detail,
                source: None,
                location: Location::caller(),
            }),
        }
    }
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.repr {
            ErrorRepr::Single(ref payload) => {
                write!(f, "{}", payload.description)?;
                if let Some(detail) = &payload.detail {
                    write!(f, ": {detail}")?;
                }
                Ok(())
            }
            ErrorRepr::Many { ref errors, .. } => {
                write!(f, "{} errors occurred:", errors.len())?;
                for error in errors {
                    write!(f, " [{error}]")?;
                }
                Ok(())
            }
        }
    }
}

impl error::Error for SyncError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload
                .source
                .as_ref()
                .map(|source| source.as_ref() as &(dyn error::Error + 'static)),
            ErrorRepr::Many { ref errors, .. } => errors
                .first()
                .map(|error| error as &(dyn error::Error + 'static)),
        }
    }
}

impl From<(ErrorKind, &'static str)> for SyncError {
    #[track_caller]
    fn from((kind, description): (ErrorKind, &'static str)) -> Self {
        SyncError::from_components(kind, Cow::Borrowed(description), None)
    }
}

impl From<(ErrorKind, &'static str, String)> for SyncError {
    #[track_caller]
    fn from((kind, description, detail): (ErrorKind, &'static str, String)) -> Self {
        SyncError::from_components(kind, Cow::Borrowed(description), Some(Cow::Owned(detail)))
    }
}

impl From<Vec<SyncError>> for SyncError {
    #[track_caller]
    fn from(errors: Vec<SyncError>) -> Self {
        SyncError {
            repr: ErrorRepr::Many {
                errors,
                location: Location::caller(),
            },
        }
    }
}

impl From<serde_json::Error> for SyncError {
    #[track_caller]
    fn from(err: serde_json::Error) -> Self {
        SyncError::from_components(
            ErrorKind::DeserializationError,
            Cow::Borrowed("JSON serialization failed"),
            Some(Cow::Owned(err.to_string())),
        )
        .with_source(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_error_exposes_kind_and_detail() {
        let err = SyncError::from((
            ErrorKind::AdmissionTimeout,
            "Timed out",
            "queue full".to_string(),
        ));

        assert_eq!(err.kind(), ErrorKind::AdmissionTimeout);
        assert_eq!(err.detail(), Some("queue full"));
        assert_eq!(err.to_string(), "Timed out: queue full");
    }

    #[test]
    fn aggregated_errors_flatten_kinds() {
        let errors = vec![
            SyncError::from((ErrorKind::PoolClosed, "closed")),
            SyncError::from((ErrorKind::InvalidEvent, "bad event")),
        ];
        let err = SyncError::from(errors);

        assert_eq!(err.kind(), ErrorKind::PoolClosed);
        assert_eq!(
            err.kinds(),
            vec![ErrorKind::PoolClosed, ErrorKind::InvalidEvent]
        );
    }

    #[test]
    fn source_is_preserved() {
        let io_err = std::io::Error::other("boom");
        let err = SyncError::from((ErrorKind::Unknown, "wrapped")).with_source(io_err);

        assert!(std::error::Error::source(&err).is_some());
    }
}
