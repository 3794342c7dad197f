//! SSH Error types

use std::io;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SshError {
    #[error("Proxy unreachable: {0}")]
    ProxyUnreachable(String),

    #[error("Proxy authentication failed: {0}")]
    ProxyAuthFailed(String),

    #[error("Target unreachable: {0}")]
    TargetUnreachable(String),

    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    #[error("Channel open failed: {0}")]
    ChannelOpenFailed(String),

    #[error("Channel is not open")]
    ChannelClosed,

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("SSH protocol error: {0}")]
    Protocol(String),

    #[error("Key error: {0}")]
    KeyError(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("SSH Agent not available: {0}")]
    AgentNotAvailable(String),

    #[error("SSH Agent error: {0}")]
    AgentError(String),
}

impl From<russh::Error> for SshError {
    fn from(err: russh::Error) -> Self {
        SshError::Protocol(err.to_string())
    }
}

impl From<russh::keys::Error> for SshError {
    fn from(err: russh::keys::Error) -> Self {
        SshError::KeyError(err.to_string())
    }
}

// Rendered as the plain message for frontends that forward errors as strings
impl serde::Serialize for SshError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// Failure reported by the nonblocking read path.
///
/// `Eof` is the normal end of an interactive session, not a fault: the
/// caller tears the connection down and may reconnect.
#[derive(Error, Debug)]
pub enum ReadError {
    #[error("Channel is closed")]
    Closed,

    #[error("Remote end reported EOF")]
    Eof,

    #[error("Channel read failed: {0}")]
    Io(#[from] io::Error),
}

impl ReadError {
    /// True for the orderly end-of-stream case
    pub fn is_eof(&self) -> bool {
        matches!(self, ReadError::Eof)
    }
}
