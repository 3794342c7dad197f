//! SFTP error types

use std::io;

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SftpError {
    #[error("SFTP initialization failed: {0}")]
    InitFailed(String),

    #[error("Failed to list {path}: {source}")]
    ListFailed {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Remote operation on {path} failed: {source}")]
    RemoteOpFailed {
        path: String,
        #[source]
        source: io::Error,
    },
}

impl SftpError {
    pub(crate) fn list(path: &str, source: io::Error) -> Self {
        SftpError::ListFailed {
            path: path.to_string(),
            source,
        }
    }

    pub(crate) fn remote(path: &str, source: io::Error) -> Self {
        SftpError::RemoteOpFailed {
            path: path.to_string(),
            source,
        }
    }
}

// Serialize as the message string for the UI layer
impl Serialize for SftpError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
