use std::io;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::environment::{Environment, UnknownEnvironment};

/// Directory containing configuration files relative to the working directory.
const CONFIGURATION_DIR: &str = "configuration";

/// Supported extensions for base and environment configuration files.
const CONFIG_FILE_EXTENSIONS: &[&str] = &["yaml", "yml", "json"];

/// Prefix for environment variable configuration overrides.
const ENV_PREFIX: &str = "APP";

/// Separator between the prefix and key segments.
const ENV_PREFIX_SEPARATOR: &str = "_";

/// Separator for nested configuration keys in environment variables.
const ENV_SEPARATOR: &str = "__";

/// Errors that can occur while loading configuration files and overrides.
#[derive(Debug, Error)]
pub enum LoadConfigError {
    /// Failed to determine the current working directory.
    #[error("failed to determine the current directory: {0}")]
    CurrentDir(#[source] io::Error),

    /// The `configuration` directory does not exist.
    #[error("configuration directory `{0}` does not exist")]
    MissingConfigurationDirectory(PathBuf),

    /// Could not locate one of the required configuration files.
    #[error("could not locate `{stem}` configuration in `{directory}`")]
    ConfigurationFileMissing { stem: String, directory: PathBuf },

    /// Failed to determine the runtime environment (`APP_ENVIRONMENT`).
    #[error("failed to determine runtime environment: {0}")]
    Environment(#[from] UnknownEnvironment),

    /// Parsing or merging of the configuration sources failed.
    #[error("failed to build configuration: {0}")]
    Builder(#[source] config::ConfigError),

    /// The configuration sources were merged but deserialization failed.
    #[error("failed to deserialize configuration: {0}")]
    Deserialization(#[source] config::ConfigError),
}

/// Loads hierarchical configuration from base, environment, and env-var sources.
///
/// Files are read from `configuration/base.(yaml|yml|json)` and
/// `configuration/{environment}.(yaml|yml|json)`, then `APP_`-prefixed
/// environment variables are applied on top. Nested keys use double
/// underscores (`APP_POOL__WORKERS`).
pub fn load_config<T>() -> Result<T, LoadConfigError>
where
    T: DeserializeOwned,
{
    let base_path = std::env::current_dir().map_err(LoadConfigError::CurrentDir)?;
    let configuration_directory = base_path.join(CONFIGURATION_DIR);

    if !configuration_directory.is_dir() {
        return Err(LoadConfigError::MissingConfigurationDirectory(
            configuration_directory,
        ));
    }

    let environment = Environment::load()?;

    let base_file = find_configuration_file(&configuration_directory, "base")?;
    let environment_file =
        find_configuration_file(&configuration_directory, environment.as_str())?;

    let environment_source = config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator(ENV_PREFIX_SEPARATOR)
        .separator(ENV_SEPARATOR);

    let settings = config::Config::builder()
        .add_source(config::File::from(base_file))
        .add_source(config::File::from(environment_file))
        .add_source(environment_source)
        .build()
        .map_err(LoadConfigError::Builder)?;

    settings
        .try_deserialize::<T>()
        .map_err(LoadConfigError::Deserialization)
}

/// Finds the configuration file matching the stem and a supported extension.
fn find_configuration_file(directory: &Path, stem: &str) -> Result<PathBuf, LoadConfigError> {
    for extension in CONFIG_FILE_EXTENSIONS {
        let path = directory.join(format!("{stem}.{extension}"));
        if path.is_file() {
            return Ok(path);
        }
    }

    Err(LoadConfigError::ConfigurationFileMissing {
        stem: stem.to_string(),
        directory: directory.to_path_buf(),
    })
}
