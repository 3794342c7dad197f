//! Blocking SFTP primitives a [`FileSession`](super::FileSession) drives

use std::io::{self, Read, Write};

/// Attributes as reported by the server; any field may be absent
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemoteAttrs {
    pub size: Option<u64>,
    pub mtime: Option<u32>,
    /// Full mode including file-type bits
    pub permissions: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub name: String,
    pub attrs: RemoteAttrs,
}

/// An open SFTP subsystem. Every call blocks until the server answers.
pub trait SftpBackend: Send {
    type File: Read + Write + Send;

    /// One directory level, in server order
    fn read_dir(&mut self, path: &str) -> io::Result<Vec<RemoteEntry>>;

    fn open_read(&mut self, path: &str) -> io::Result<Self::File>;

    /// Create or truncate for writing
    fn create(&mut self, path: &str, mode: u32) -> io::Result<Self::File>;

    /// Create a directory with permission bits `mode`
    fn mkdir(&mut self, path: &str, mode: u32) -> io::Result<()>;

    fn remove_file(&mut self, path: &str) -> io::Result<()>;

    fn remove_dir(&mut self, path: &str) -> io::Result<()>;

    fn canonicalize(&mut self, path: &str) -> io::Result<String>;
}
