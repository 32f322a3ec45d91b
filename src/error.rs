use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum OniError {
    #[error("collection conversion failed: {0}")]
    Conversion(String),

    #[error("invalid tabulator configuration: {0}")]
    Configuration(String),

    #[error("building table {table} failed after {built} table(s): {message}")]
    TableBuild {
        table: String,
        built: usize,
        message: String,
    },

    #[error("another operation is in progress: {0}")]
    #[diagnostic(help("wait for the running operation to finish"))]
    Busy(String),

    #[error("{operation} timed out after {seconds}s")]
    Timeout { operation: String, seconds: u64 },

    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    #[error("required tool not found: {0}")]
    #[diagnostic(help("install the tabulator or set tabulator_program in oni-tabulator.json"))]
    MissingTool(String),

    #[error("provider request failed: {0}")]
    Http(String),

    #[error("provider returned status {status}: {message}")]
    HttpStatus { status: u16, message: String },

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("failed to read settings file at {0}")]
    SettingsRead(PathBuf),

    #[error("failed to parse JSON settings: {0}")]
    SettingsParse(String),
}

impl OniError {
    /// Errors the delegate raises while fetching or converting a crate.
    pub fn is_conversion(&self) -> bool {
        matches!(self, OniError::Conversion(_))
    }
}
