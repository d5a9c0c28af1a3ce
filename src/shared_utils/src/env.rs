//! Environment-variable access with structured errors.
//!
//! Configuration layers read overrides through these helpers so that an unset
//! variable is skipped and a malformed one is reported.

use std::str::FromStr;

use thiserror::Error;

/// Errors produced when an optional environment variable is present but unusable.
#[derive(Debug, Error)]
pub enum EnvVarError {
    /// The variable is set but its value does not parse into the requested type.
    #[error("Invalid value for environment variable {name}: {value:?}")]
    Invalid {
        /// Variable name.
        name: String,
        /// Raw value as found in the environment.
        value: String,
    },
}

/// Reads an optional environment variable. Unset and empty values both yield `None`.
pub fn get_env_var_opt(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Reads and parses an optional environment variable.
///
/// Returns `Ok(None)` when the variable is unset, and an error when it is set
/// to something that `T` cannot parse.
pub fn parse_env_var<T: FromStr>(name: &str) -> Result<Option<T>, EnvVarError> {
    match get_env_var_opt(name) {
        None => Ok(None),
        Some(raw) => raw.parse::<T>().map(Some).map_err(|_| EnvVarError::Invalid {
            name: name.to_string(),
            value: raw,
        }),
    }
}
