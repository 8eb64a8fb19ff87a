//! CLI-specific error types

use std::io;

use thiserror::Error;

use crate::config::ConfigError;
use crate::errors::MstError;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Engine(#[from] MstError),

    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("invalid input: {0}")]
    Input(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Stable code printed in error responses.
    pub fn code_str(&self) -> &'static str {
        match self {
            CliError::Config(_) => "MST_CLI_CONFIG_ERROR",
            CliError::Engine(e) => e.code().code(),
            CliError::Pattern(_) | CliError::Input(_) => "MST_CLI_INPUT_ERROR",
            CliError::Io(_) | CliError::Json(_) => "MST_CLI_IO_ERROR",
        }
    }
}

pub type CliResult<T> = Result<T, CliError>;
