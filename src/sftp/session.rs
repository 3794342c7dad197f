//! SFTP session bound to a live connection
//!
//! Every operation blocks until the server answers, so callers run them off
//! the event-handling thread. On a proxied connection each operation runs
//! with the bridge pumped in the background for exactly its duration.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::Path;

use tracing::{debug, info, warn};

use super::backend::SftpBackend;
use super::error::SftpError;
use super::path_utils::resolve_remote_path;
use super::types::constants::{CHUNK_SIZE, DIR_MODE, FILE_MODE};
use super::types::FileEntry;
use crate::ssh::{Connection, EngineSession};

/// File-transfer session on top of an established [`Connection`]
pub struct FileSession<'c, S: EngineSession> {
    conn: &'c mut Connection<S>,
    sftp: S::Sftp,
    cwd: String,
}

impl<'c, S: EngineSession> FileSession<'c, S> {
    /// Start the SFTP subsystem and record the remote working directory
    pub fn open(conn: &'c mut Connection<S>) -> Result<Self, SftpError> {
        if !conn.is_connected() {
            return Err(SftpError::InitFailed("connection is not established".into()));
        }
        info!("Opening SFTP subsystem for connection {}", conn.id());

        let mut sftp = conn
            .with_session(|session| session.open_sftp())
            .map_err(|e| SftpError::InitFailed(e.to_string()))?;

        let cwd = match conn.pumped(|| sftp.canonicalize(".")) {
            Ok(Ok(path)) => path,
            Ok(Err(e)) => {
                warn!("Failed to resolve remote home, using /: {}", e);
                "/".to_string()
            }
            Err(e) => return Err(SftpError::InitFailed(e.to_string())),
        };

        info!("SFTP subsystem opened, cwd {}", cwd);
        Ok(Self { conn, sftp, cwd })
    }

    /// Remote working directory captured at open
    pub fn cwd(&self) -> &str {
        &self.cwd
    }

    fn resolve(&self, path: &str) -> String {
        resolve_remote_path(&self.cwd, path)
    }

    /// Run one blocking backend call, pumping the bridge if proxied
    fn run<R>(
        &mut self,
        f: impl FnOnce(&mut S::Sftp) -> Result<R, SftpError>,
    ) -> Result<R, SftpError> {
        let Self { conn, sftp, .. } = self;
        conn.pumped(|| f(sftp))?
    }

    /// List one directory level
    pub fn list(&mut self, path: &str) -> Result<Vec<FileEntry>, SftpError> {
        let path = self.resolve(path);
        debug!("Listing directory: {}", path);

        let entries = self.run(|sftp| sftp.read_dir(&path).map_err(|e| SftpError::list(&path, e)))?;
        let entries: Vec<FileEntry> = entries.into_iter().map(FileEntry::from).collect();

        debug!("Listed {} entries in {}", entries.len(), path);
        Ok(entries)
    }

    /// Copy a remote file to `local`, truncating it. Returns bytes copied.
    pub fn download(&mut self, remote: &str, local: impl AsRef<Path>) -> Result<u64, SftpError> {
        let remote = self.resolve(remote);
        let local = local.as_ref();
        info!("Downloading {} to {}", remote, local.display());

        let copied = self.run(|sftp| {
            let mut src = sftp
                .open_read(&remote)
                .map_err(|e| SftpError::remote(&remote, e))?;
            let mut dst = create_local(local)?;
            Ok(copy_chunks(&mut src, &mut dst)?)
        })?;

        info!("Downloaded {} bytes from {}", copied, remote);
        Ok(copied)
    }

    /// Copy `local` to a remote file, truncating it. Returns bytes copied.
    pub fn upload(&mut self, local: impl AsRef<Path>, remote: &str) -> Result<u64, SftpError> {
        let remote = self.resolve(remote);
        let local = local.as_ref();
        info!("Uploading {} to {}", local.display(), remote);

        let mut src = File::open(local)?;
        let copied = self.run(|sftp| {
            let mut dst = sftp
                .create(&remote, FILE_MODE)
                .map_err(|e| SftpError::remote(&remote, e))?;
            Ok(copy_chunks(&mut src, &mut dst)?)
        })?;

        info!("Uploaded {} bytes to {}", copied, remote);
        Ok(copied)
    }

    pub fn mkdir(&mut self, path: &str) -> Result<(), SftpError> {
        let path = self.resolve(path);
        info!("Creating directory: {}", path);
        self.run(|sftp| {
            sftp.mkdir(&path, DIR_MODE)
                .map_err(|e| SftpError::remote(&path, e))
        })
    }

    /// Remove a file
    pub fn remove(&mut self, path: &str) -> Result<(), SftpError> {
        let path = self.resolve(path);
        info!("Deleting: {}", path);
        self.run(|sftp| sftp.remove_file(&path).map_err(|e| SftpError::remote(&path, e)))
    }

    /// Remove an empty directory
    pub fn rmdir(&mut self, path: &str) -> Result<(), SftpError> {
        let path = self.resolve(path);
        info!("Deleting directory: {}", path);
        self.run(|sftp| sftp.remove_dir(&path).map_err(|e| SftpError::remote(&path, e)))
    }

    /// Absolute form of `path` as the server sees it
    pub fn canonicalize(&mut self, path: &str) -> Result<String, SftpError> {
        let path = self.resolve(path);
        self.run(|sftp| sftp.canonicalize(&path).map_err(|e| SftpError::remote(&path, e)))
    }
}

fn create_local(path: &Path) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(FILE_MODE);
    }
    options.open(path)
}

/// Stream `src` into `dst` in fixed chunks. A short write is an error.
fn copy_chunks<R, W>(src: &mut R, dst: &mut W) -> io::Result<u64>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut total = 0u64;

    loop {
        let n = match src.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        let written = dst.write(&buf[..n])?;
        if written != n {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("short write: {} of {} bytes", written, n),
            ));
        }
        total += n as u64;
    }

    dst.flush()?;
    Ok(total)
}
