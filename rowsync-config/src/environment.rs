use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Name of the environment variable that selects the runtime environment.
const APP_ENVIRONMENT_ENV_NAME: &str = "APP_ENVIRONMENT";

/// Error returned when the selected environment name is not recognized.
#[derive(Debug, Error)]
#[error("`{0}` is not a supported environment; use `dev`, `staging` or `prod`")]
pub struct UnknownEnvironment(String);

/// Deployment tier a sync process runs in.
///
/// Selects which environment-specific configuration file is layered on top
/// of the base configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// Local development.
    Dev,
    /// Pre-production, synced against staging sources and targets.
    Staging,
    /// Production.
    Prod,
}

impl Environment {
    /// Loads the environment from `APP_ENVIRONMENT`, defaulting to dev.
    pub fn load() -> Result<Environment, UnknownEnvironment> {
        match std::env::var(APP_ENVIRONMENT_ENV_NAME) {
            Ok(name) => name.parse(),
            Err(_) => Ok(Environment::Dev),
        }
    }

    /// Returns the string name of the environment, matching the
    /// configuration file stem it selects.
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Dev => "dev",
            Environment::Staging => "staging",
            Environment::Prod => "prod",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = UnknownEnvironment;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Self::Dev),
            "staging" => Ok(Self::Staging),
            "prod" => Ok(Self::Prod),
            other => Err(UnknownEnvironment(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_names_case_insensitively() {
        assert_eq!("dev".parse::<Environment>().unwrap(), Environment::Dev);
        assert_eq!("PROD".parse::<Environment>().unwrap(), Environment::Prod);
        assert_eq!(
            "Staging".parse::<Environment>().unwrap(),
            Environment::Staging
        );
    }

    #[test]
    fn rejects_unknown_names() {
        assert!("qa".parse::<Environment>().is_err());
    }
}
