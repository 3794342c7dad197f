//! russh-sftp behind the blocking [`SftpBackend`] seam

use std::io::{self, Read, Write};
use std::sync::Arc;

use russh_sftp::client::error::Error as SftpErrorInner;
use russh_sftp::client::fs::File;
use russh_sftp::client::SftpSession;
use russh_sftp::protocol::{FileAttributes, OpenFlags};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::runtime::Runtime;
use tracing::debug;

use crate::sftp::{RemoteAttrs, RemoteEntry, SftpBackend};

fn map_sftp_error(err: SftpErrorInner) -> io::Error {
    let message = err.to_string();
    let kind = if message.contains("No such file") || message.contains("not found") {
        io::ErrorKind::NotFound
    } else if message.contains("Permission denied") {
        io::ErrorKind::PermissionDenied
    } else {
        io::ErrorKind::Other
    };
    io::Error::new(kind, message)
}

pub struct RusshSftp {
    runtime: Arc<Runtime>,
    sftp: Option<SftpSession>,
}

impl RusshSftp {
    pub(super) fn new(runtime: Arc<Runtime>, sftp: SftpSession) -> Self {
        Self {
            runtime,
            sftp: Some(sftp),
        }
    }

    fn session(&self) -> io::Result<&SftpSession> {
        self.sftp
            .as_ref()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))
    }

    fn open(&self, path: &str, flags: OpenFlags, mode: Option<u32>) -> io::Result<RusshFile> {
        let sftp = self.session()?;
        let file = self
            .runtime
            .block_on(async {
                match mode {
                    Some(mode) => {
                        let mut attrs = FileAttributes::empty();
                        attrs.permissions = Some(mode);
                        sftp.open_with_flags_and_attributes(path, flags, attrs).await
                    }
                    None => sftp.open_with_flags(path, flags).await,
                }
            })
            .map_err(map_sftp_error)?;
        Ok(RusshFile {
            runtime: self.runtime.clone(),
            file: Some(file),
        })
    }
}

impl SftpBackend for RusshSftp {
    type File = RusshFile;

    fn read_dir(&mut self, path: &str) -> io::Result<Vec<RemoteEntry>> {
        let sftp = self.session()?;
        let entries = self
            .runtime
            .block_on(sftp.read_dir(path))
            .map_err(map_sftp_error)?;

        Ok(entries
            .map(|entry| {
                let metadata = entry.metadata();
                RemoteEntry {
                    name: entry.file_name(),
                    attrs: RemoteAttrs {
                        size: metadata.size,
                        mtime: metadata.mtime,
                        permissions: metadata.permissions,
                    },
                }
            })
            .collect())
    }

    fn open_read(&mut self, path: &str) -> io::Result<RusshFile> {
        self.open(path, OpenFlags::READ, None)
    }

    fn create(&mut self, path: &str, mode: u32) -> io::Result<RusshFile> {
        self.open(
            path,
            OpenFlags::CREATE | OpenFlags::TRUNCATE | OpenFlags::WRITE,
            Some(mode),
        )
    }

    fn mkdir(&mut self, path: &str, mode: u32) -> io::Result<()> {
        let sftp = self.session()?;
        // MKDIR goes out with empty attributes, so the mode is applied after
        self.runtime
            .block_on(async {
                sftp.create_dir(path).await?;
                let mut attrs = FileAttributes::empty();
                attrs.permissions = Some(mode);
                sftp.set_metadata(path, attrs).await
            })
            .map_err(map_sftp_error)
    }

    fn remove_file(&mut self, path: &str) -> io::Result<()> {
        let sftp = self.session()?;
        self.runtime
            .block_on(sftp.remove_file(path))
            .map_err(map_sftp_error)
    }

    fn remove_dir(&mut self, path: &str) -> io::Result<()> {
        let sftp = self.session()?;
        self.runtime
            .block_on(sftp.remove_dir(path))
            .map_err(map_sftp_error)
    }

    fn canonicalize(&mut self, path: &str) -> io::Result<String> {
        let sftp = self.session()?;
        self.runtime
            .block_on(sftp.canonicalize(path))
            .map_err(map_sftp_error)
    }
}

impl Drop for RusshSftp {
    fn drop(&mut self) {
        // Dropping the session closes its channel from a runtime task
        let _guard = self.runtime.enter();
        self.sftp.take();
    }
}

/// Open remote file; closed on drop
pub struct RusshFile {
    runtime: Arc<Runtime>,
    file: Option<File>,
}

impl RusshFile {
    fn file(&mut self) -> io::Result<&mut File> {
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))
    }
}

impl Read for RusshFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let runtime = self.runtime.clone();
        let file = self.file()?;
        runtime.block_on(file.read(buf))
    }
}

impl Write for RusshFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let runtime = self.runtime.clone();
        let file = self.file()?;
        runtime.block_on(file.write_all(buf))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let runtime = self.runtime.clone();
        let file = self.file()?;
        runtime.block_on(file.flush())
    }
}

impl Drop for RusshFile {
    fn drop(&mut self) {
        if let Some(mut file) = self.file.take() {
            if let Err(e) = self.runtime.block_on(file.shutdown()) {
                debug!("SFTP file close failed: {}", e);
            }
            let _guard = self.runtime.enter();
            drop(file);
        }
    }
}
