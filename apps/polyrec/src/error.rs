//! # Application Errors

use polyrec_core::PolyrecError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Recovery(#[from] PolyrecError),

    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Path '{}' is not a regular file", path.display())]
    NotAFile { path: PathBuf },

    #[error("File '{}' is {size} bytes, limit is {limit}", path.display())]
    FileTooLarge { path: PathBuf, size: u64, limit: u64 },

    #[error("Invalid JSON in '{}': {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid TOML in '{}': {source}", path.display())]
    TomlParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Cannot render configuration: {0}")]
    TomlRender(#[from] toml::ser::Error),

    #[error("Cannot render report: {0}")]
    JsonRender(#[source] serde_json::Error),

    #[error("Expansion rejected: {0}")]
    ExpansionRejected(String),
}
