//! Remote path helpers
//!
//! Remote SFTP paths always use `/` as separator, whatever the local or
//! remote OS.

/// Check if a remote SFTP path is absolute.
pub fn is_absolute_remote_path(path: &str) -> bool {
    path.starts_with('/')
}

/// Join remote SFTP path components using `/` separator.
pub fn join_remote_path(base: &str, component: &str) -> String {
    if base.ends_with('/') {
        format!("{}{}", base, component)
    } else {
        format!("{}/{}", base, component)
    }
}

/// Resolve `path` against `cwd` unless it is already absolute
pub fn resolve_remote_path(cwd: &str, path: &str) -> String {
    match path {
        "" | "." => cwd.to_string(),
        p if is_absolute_remote_path(p) => p.to_string(),
        p => join_remote_path(cwd, p),
    }
}
