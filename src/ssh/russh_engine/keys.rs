//! Identity file discovery

use std::path::{Path, PathBuf};

/// Default identities, in the order OpenSSH tries them
const DEFAULT_IDENTITIES: [&str; 3] = ["id_ed25519", "id_ecdsa", "id_rsa"];

/// Expand ~ to home directory (russh::keys doesn't handle tilde)
pub fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    path.to_path_buf()
}

/// Identity files to try: the configured one first, then existing defaults
pub fn identity_candidates(explicit: Option<&Path>) -> Vec<PathBuf> {
    let mut candidates: Vec<PathBuf> = explicit.map(expand_tilde).into_iter().collect();

    if let Some(ssh_dir) = dirs::home_dir().map(|h| h.join(".ssh")) {
        for name in DEFAULT_IDENTITIES {
            let path = ssh_dir.join(name);
            if path.is_file() && !candidates.contains(&path) {
                candidates.push(path);
            }
        }
    }
    candidates
}
