//! Authentication fallback shared by proxy and target sessions
//!
//! Order is fixed: key/agent first with no explicit secret, then password
//! only if the key attempt failed and a non-empty password was supplied.
//! The first success wins.

use std::fmt;

use tracing::{debug, info, warn};

use super::engine::EngineSession;

/// Which method got the session in, or that none did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    PublicKey,
    Password,
    Rejected,
}

impl AuthOutcome {
    pub fn success(&self) -> bool {
        !matches!(self, AuthOutcome::Rejected)
    }
}

impl fmt::Display for AuthOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthOutcome::PublicKey => f.write_str("publickey"),
            AuthOutcome::Password => f.write_str("password"),
            AuthOutcome::Rejected => f.write_str("rejected"),
        }
    }
}

pub fn authenticate<S>(session: &mut S, username: &str, password: Option<&str>) -> AuthOutcome
where
    S: EngineSession + ?Sized,
{
    match session.auth_publickey_auto() {
        Ok(true) => {
            info!("Authenticated {} with public key", username);
            return AuthOutcome::PublicKey;
        }
        Ok(false) => debug!("Public key authentication rejected for {}", username),
        Err(e) => warn!("Public key authentication error for {}: {}", username, e),
    }

    let Some(password) = password.filter(|p| !p.is_empty()) else {
        debug!("No password supplied for {}, giving up", username);
        return AuthOutcome::Rejected;
    };

    match session.auth_password(password) {
        Ok(true) => {
            info!("Authenticated {} with password", username);
            AuthOutcome::Password
        }
        Ok(false) => {
            debug!("Password authentication rejected for {}", username);
            AuthOutcome::Rejected
        }
        Err(e) => {
            warn!("Password authentication error for {}: {}", username, e);
            AuthOutcome::Rejected
        }
    }
}
