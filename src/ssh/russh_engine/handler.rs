//! Client handler for russh callbacks

use russh::client;
use russh::keys::ssh_key::HashAlg;
use russh::keys::PublicKey;
use tracing::info;

use crate::ssh::error::SshError;

/// Accepts every host key and logs its fingerprint.
///
/// Host-key policy belongs to the caller; this core only needs a working
/// transport.
pub struct ClientHandler {
    host: String,
    port: u16,
}

impl ClientHandler {
    pub fn new(host: String, port: u16) -> Self {
        Self { host, port }
    }
}

impl client::Handler for ClientHandler {
    type Error = SshError;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        info!(
            "Host key for {}:{} accepted ({})",
            self.host,
            self.port,
            server_public_key.fingerprint(HashAlg::Sha256)
        );
        Ok(true)
    }
}
