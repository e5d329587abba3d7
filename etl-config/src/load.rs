use std::{
    io,
    path::{Path, PathBuf},
};

use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::environment::Environment;

/// Directory, relative to the working directory, holding the configuration files.
const CONFIGURATION_DIR: &str = "configuration";

/// Name of the file every environment starts from.
const BASE_FILE_STEM: &str = "base";

/// Extensions tried, in order, for every configuration file.
const CONFIG_FILE_EXTENSIONS: &[&str] = &["yaml", "yml", "json"];

const ENV_PREFIX: &str = "APP";

const ENV_PREFIX_SEPARATOR: &str = "_";

/// Separator for nested keys, e.g. `APP_WAREHOUSE__HOST`.
const ENV_SEPARATOR: &str = "__";

const LIST_SEPARATOR: &str = ",";

/// Implemented by top level configuration structures.
pub trait Config {
    /// Keys whose environment variable values are split on commas into lists.
    const LIST_PARSE_KEYS: &'static [&'static str];
}

/// Errors raised while assembling the layered configuration.
#[derive(Debug, Error)]
pub enum LoadConfigError {
    #[error("failed to determine the current directory: {0}")]
    CurrentDir(#[source] io::Error),

    #[error("configuration directory `{0}` does not exist")]
    MissingConfigurationDirectory(PathBuf),

    #[error("no `{stem}` configuration file in `{directory}`; tried extensions {extensions}")]
    ConfigurationFileMissing {
        stem: String,
        directory: PathBuf,
        extensions: String,
    },

    #[error("failed to parse `{path}`: {source}")]
    ConfigurationFileLoad {
        path: PathBuf,
        #[source]
        source: config::ConfigError,
    },

    #[error("failed to build configuration: {0}")]
    Builder(#[source] config::ConfigError),

    #[error("failed to deserialize configuration: {0}")]
    Deserialization(#[source] config::ConfigError),

    #[error("failed to determine runtime environment: {0}")]
    Environment(#[source] io::Error),
}

/// Loads `T` from `./configuration`, using the environment named by `APP_ENVIRONMENT`.
///
/// The base file is read first, the environment file is layered on top and `APP_` prefixed
/// environment variables override both. Nested keys use a double underscore and list keys
/// declared by [`Config::LIST_PARSE_KEYS`] accept comma separated values.
pub fn load_config<T>() -> Result<T, LoadConfigError>
where
    T: Config + DeserializeOwned,
{
    let directory = std::env::current_dir()
        .map_err(LoadConfigError::CurrentDir)?
        .join(CONFIGURATION_DIR);
    let environment = Environment::load().map_err(LoadConfigError::Environment)?;

    load_config_from(&directory, environment)
}

/// Same as [`load_config`] with an explicit directory and environment.
pub fn load_config_from<T>(directory: &Path, environment: Environment) -> Result<T, LoadConfigError>
where
    T: Config + DeserializeOwned,
{
    if !directory.is_dir() {
        return Err(LoadConfigError::MissingConfigurationDirectory(
            directory.to_path_buf(),
        ));
    }

    let mut builder = config::Config::builder();
    for stem in [BASE_FILE_STEM, environment.as_str()] {
        let path = locate_file(directory, stem)?;
        builder = builder.add_source(config::File::from(path.clone()));

        // Building after each file attributes parse failures to the file that caused them.
        builder
            .build_cloned()
            .map_err(|source| LoadConfigError::ConfigurationFileLoad { path, source })?;
    }

    let settings = builder
        .add_source(environment_source::<T>())
        .build()
        .map_err(LoadConfigError::Builder)?;

    settings
        .try_deserialize::<T>()
        .map_err(LoadConfigError::Deserialization)
}

fn environment_source<T: Config>() -> config::Environment {
    let mut source = config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator(ENV_PREFIX_SEPARATOR)
        .separator(ENV_SEPARATOR);

    if !T::LIST_PARSE_KEYS.is_empty() {
        source = source.try_parsing(true).list_separator(LIST_SEPARATOR);
        for key in T::LIST_PARSE_KEYS {
            source = source.with_list_parse_key(key);
        }
    }

    source
}

fn locate_file(directory: &Path, stem: &str) -> Result<PathBuf, LoadConfigError> {
    CONFIG_FILE_EXTENSIONS
        .iter()
        .map(|extension| directory.join(format!("{stem}.{extension}")))
        .find(|path| path.is_file())
        .ok_or_else(|| LoadConfigError::ConfigurationFileMissing {
            stem: stem.to_string(),
            directory: directory.to_path_buf(),
            extensions: CONFIG_FILE_EXTENSIONS.join(", "),
        })
}
