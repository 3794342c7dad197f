//! SFTP data types

use serde::{Deserialize, Serialize};

use super::backend::RemoteEntry;

/// Transfer constants
pub mod constants {
    /// Bytes per read/write during upload and download
    pub const CHUNK_SIZE: usize = 16 * 1024;

    /// Mode for newly created files, local and remote
    pub const FILE_MODE: u32 = 0o644;

    /// Mode for newly created remote directories
    pub const DIR_MODE: u32 = 0o755;

    pub const S_IFMT: u32 = 0o170000;
    pub const S_IFDIR: u32 = 0o040000;
    pub const S_IFLNK: u32 = 0o120000;
    pub const S_IFREG: u32 = 0o100000;
}

use constants::*;

/// File type from the mode's type bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Regular,
    Directory,
    Symlink,
    Unknown,
}

impl FileKind {
    pub fn from_mode(mode: Option<u32>) -> Self {
        match mode.map(|m| m & S_IFMT) {
            Some(S_IFREG) => FileKind::Regular,
            Some(S_IFDIR) => FileKind::Directory,
            Some(S_IFLNK) => FileKind::Symlink,
            _ => FileKind::Unknown,
        }
    }
}

/// One directory listing entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// File name (not full path)
    pub name: String,
    pub kind: FileKind,
    /// File size in bytes
    pub size: u64,
    /// Last modified time (Unix timestamp)
    pub modified: i64,
    /// `ls -l` style, e.g. `drwxr-xr-x`
    pub permissions: String,
}

impl From<RemoteEntry> for FileEntry {
    fn from(entry: RemoteEntry) -> Self {
        let attrs = entry.attrs;
        Self {
            name: entry.name,
            kind: FileKind::from_mode(attrs.permissions),
            size: attrs.size.unwrap_or(0),
            modified: attrs.mtime.map(i64::from).unwrap_or(0),
            permissions: format_permissions(attrs.permissions.unwrap_or(0)),
        }
    }
}

/// Render a mode as a 10-character permission string
pub fn format_permissions(mode: u32) -> String {
    let kind = match mode & S_IFMT {
        S_IFDIR => 'd',
        S_IFLNK => 'l',
        _ => '-',
    };
    let mut out = String::with_capacity(10);
    out.push(kind);
    for shift in [6, 3, 0] {
        let bits = (mode >> shift) & 0o7;
        out.push(if bits & 0o4 != 0 { 'r' } else { '-' });
        out.push(if bits & 0o2 != 0 { 'w' } else { '-' });
        out.push(if bits & 0o1 != 0 { 'x' } else { '-' });
    }
    out
}
