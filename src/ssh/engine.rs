//! Protocol engine seam
//!
//! The connection core never speaks SSH itself. It drives an engine through
//! the blocking primitives below, which keeps the bridging, pumping and
//! teardown logic independent of the library doing the actual protocol work
//! (see [`super::russh_engine`] for the production implementation).
//!
//! # Blocking contract
//!
//! | Call                               | May block |
//! |------------------------------------|-----------|
//! | `EngineSession::connect` / `auth_*`| yes       |
//! | `EngineSession::open_*`            | yes       |
//! | `EngineChannel::read_nonblocking`  | never     |
//! | `EngineChannel::write`             | briefly   |
//!
//! Blocking calls are only issued from `connect()`, the SFTP session and
//! `Connection::write`, each with a proxied tunnel pumped in the background
//! meanwhile. The cooperative tick never blocks.

use std::io;
use std::path::PathBuf;

use super::bridge::BridgeSocket;
use super::config::Credentials;
use super::error::SshError;
use crate::sftp::SftpBackend;

/// Parameters an engine needs to create one session
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub host: String,
    pub port: u16,
    pub username: String,
    /// Identity file tried during public-key authentication
    pub key_path: Option<PathBuf>,
}

impl From<Credentials<'_>> for SessionOptions {
    fn from(creds: Credentials<'_>) -> Self {
        Self {
            host: creds.host.to_string(),
            port: creds.port,
            username: creds.username.to_string(),
            key_path: creds.key_path.cloned(),
        }
    }
}

/// What a session's transport is attached to
#[derive(Debug)]
pub enum Transport {
    /// Plain TCP to the session's own host and port
    Tcp,
    /// One end of a local socket pair whose other end is pumped against a
    /// forwarded channel
    Bridge(BridgeSocket),
}

/// PTY parameters for an interactive channel
#[derive(Debug, Clone, Copy)]
pub struct PtyRequest<'a> {
    pub term: &'a str,
    pub cols: u32,
    pub rows: u32,
}

/// Factory for engine sessions
pub trait SshEngine: Send + Sync {
    type Session: EngineSession;

    /// Allocate an unconnected session
    fn new_session(&self, options: SessionOptions) -> Result<Self::Session, SshError>;
}

/// One SSH session (transport + authentication state)
pub trait EngineSession: Send {
    type Channel: EngineChannel;
    type Sftp: SftpBackend;

    /// Run the transport handshake over `transport`
    fn connect(&mut self, transport: Transport) -> Result<(), SshError>;

    /// Agent and identity-file authentication with no explicit secret.
    /// `Ok(false)` means every key was rejected.
    fn auth_publickey_auto(&mut self) -> Result<bool, SshError>;

    /// `Ok(false)` means the server rejected the password
    fn auth_password(&mut self, password: &str) -> Result<bool, SshError>;

    /// Open a `direct-tcpip` channel relayed by the peer to `host:port`
    fn open_forward(&mut self, host: &str, port: u16) -> Result<Self::Channel, SshError>;

    /// Open a session channel, request a PTY and start a shell
    fn open_shell(&mut self, pty: PtyRequest<'_>) -> Result<Self::Channel, SshError>;

    /// Start the SFTP subsystem on a fresh channel
    fn open_sftp(&mut self) -> Result<Self::Sftp, SshError>;

    /// Best-effort disconnect; safe on a session that never connected
    fn disconnect(&mut self);

    /// Last human-readable error reported by the transport
    fn last_error(&self) -> Option<String>;
}

/// A channel on an engine session
pub trait EngineChannel: Send {
    /// Copy already-received bytes into `buf`. `Ok(0)` when nothing is
    /// ready; end of stream is reported through [`EngineChannel::is_eof`].
    fn read_nonblocking(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Queue `data` for sending. May accept fewer bytes than offered.
    fn write(&mut self, data: &[u8]) -> io::Result<usize>;

    fn send_eof(&mut self) -> io::Result<()>;

    /// Close the channel. Safe to call more than once.
    fn close(&mut self);

    /// PTY window change
    fn resize(&mut self, cols: u32, rows: u32) -> io::Result<()>;

    fn is_open(&self) -> bool;

    /// True once the peer has sent EOF
    fn is_eof(&self) -> bool;
}
