// error.rs: error type shared by the config loader, the log file and the record stage
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Failed to read config {}: {source}", path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ConfigParse(#[source] serde_json::Error),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Config path variable {0} is not set")]
    MissingConfigPath(&'static str),

    /// The undefined bucket could not be string-encoded. Never ignored: a
    /// half-written bucket must not reach the sink.
    #[error("Failed to encode undefined fields: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Failed to open log file {}: {source}", path.display())]
    LogFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse record JSON: {0}")]
    RecordParse(#[source] serde_json::Error),

    #[error("Record is not a JSON object")]
    NotAnObject,
}

pub type Result<T> = std::result::Result<T, Error>;
