//src/error.rs

use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractError {
    /// A required input or output path could not be opened.
    #[error("cannot open {}: {source}", .path.display())]
    FileAccess {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Incompatible options or bad arguments, detected before any processing.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl ExtractError {
    pub fn file_access<P: Into<PathBuf>>(path: P, source: io::Error) -> Self {
        ExtractError::FileAccess {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, ExtractError>;
