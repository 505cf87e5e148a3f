// logfile.rs: append-only diagnostics file named by the host
use std::fs::{File, OpenOptions};
use std::path::Path;

use crate::error::{Error, Result};

/// Environment variable naming the diagnostics log file.
pub const LOGGING_FILE_VAR: &str = "LOGGING_FILE_PATH";

/// Open (or create) `path` for appending.
pub fn open_log_file(path: impl AsRef<Path>) -> Result<File> {
    let path = path.as_ref();
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| Error::LogFile {
            path: path.to_path_buf(),
            source,
        })
}
