//! Production engine on top of `russh`
//!
//! russh is async; the connection core is blocking. Each [`RusshEngine`]
//! owns a multi-threaded tokio runtime that drives the protocol tasks.
//! Blocking engine calls `block_on` a future on it, and channel reads poll
//! the channel's message queue once without waiting.
//!
//! Every russh object is dropped with the runtime entered, since dropping
//! may spawn cleanup tasks.

mod agent;
mod channel;
mod handler;
mod keys;
mod sftp;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use russh::client::{self, Handle};
use russh::keys::key::PrivateKeyWithHashAlg;
use russh::Disconnect;
use tokio::runtime::Runtime;
use tracing::{debug, info, warn};

pub use agent::{is_agent_available, SshAgentClient};
pub use channel::RusshChannel;
pub use handler::ClientHandler;
pub use keys::{expand_tilde, identity_candidates};
pub use sftp::{RusshFile, RusshSftp};

use super::config::EngineConfig;
use super::engine::{EngineSession, PtyRequest, SessionOptions, SshEngine, Transport};
use super::error::SshError;

/// Session factory sharing one runtime and client config
pub struct RusshEngine {
    runtime: Arc<Runtime>,
    client_config: Arc<client::Config>,
    timeout: Duration,
}

impl RusshEngine {
    pub fn new(config: EngineConfig) -> Result<Self, SshError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(config.worker_threads.max(1))
            .thread_name("ssh-engine")
            .enable_all()
            .build()?;

        let client_config = client::Config {
            inactivity_timeout: None,
            keepalive_interval: Some(Duration::from_secs(config.keepalive_secs)),
            keepalive_max: config.keepalive_max,
            ..Default::default()
        };

        Ok(Self {
            runtime: Arc::new(runtime),
            client_config: Arc::new(client_config),
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }
}

impl SshEngine for RusshEngine {
    type Session = RusshSession;

    fn new_session(&self, options: SessionOptions) -> Result<RusshSession, SshError> {
        Ok(RusshSession {
            runtime: self.runtime.clone(),
            client_config: self.client_config.clone(),
            timeout: self.timeout,
            options,
            handle: None,
            last_error: None,
        })
    }
}

pub struct RusshSession {
    runtime: Arc<Runtime>,
    client_config: Arc<client::Config>,
    timeout: Duration,
    options: SessionOptions,
    handle: Option<Handle<ClientHandler>>,
    last_error: Option<String>,
}

impl RusshSession {
    /// Run `f` to completion, keeping its error as the session's last error
    fn block_on<T>(&mut self, f: impl Future<Output = Result<T, SshError>>) -> Result<T, SshError> {
        let result = self.runtime.block_on(f);
        if let Err(e) = &result {
            self.last_error = Some(e.to_string());
        }
        result
    }

    fn handle(&mut self) -> Result<&mut Handle<ClientHandler>, SshError> {
        self.handle
            .as_mut()
            .ok_or_else(|| SshError::Protocol("session is not connected".into()))
    }

    async fn try_agent(handle: &mut Handle<ClientHandler>, username: &str) -> bool {
        if !is_agent_available() {
            return false;
        }
        let result = match SshAgentClient::connect().await {
            Ok(mut agent) => agent.authenticate(handle, username).await,
            Err(e) => Err(e),
        };
        result.unwrap_or_else(|e| {
            debug!("Agent authentication unavailable: {}", e);
            false
        })
    }

    async fn try_identities(
        handle: &mut Handle<ClientHandler>,
        options: &SessionOptions,
    ) -> Result<bool, SshError> {
        for path in identity_candidates(options.key_path.as_deref()) {
            let key = match russh::keys::load_secret_key(&path, None) {
                Ok(key) => key,
                Err(e) => {
                    debug!("Skipping identity {}: {}", path.display(), e);
                    continue;
                }
            };
            let key_with_hash = PrivateKeyWithHashAlg::new(Arc::new(key), None);
            let result = handle
                .authenticate_publickey(&options.username, key_with_hash)
                .await?;
            if result.success() {
                info!("Authenticated with identity {}", path.display());
                return Ok(true);
            }
            debug!("Identity {} rejected", path.display());
        }
        Ok(false)
    }
}

impl EngineSession for RusshSession {
    type Channel = RusshChannel;
    type Sftp = RusshSftp;

    fn connect(&mut self, transport: Transport) -> Result<(), SshError> {
        let host = self.options.host.clone();
        let port = self.options.port;
        let config = self.client_config.clone();
        let handler = ClientHandler::new(host.clone(), port);
        let timeout = self.timeout;

        let handle = self.block_on(async move {
            let addr_host = host.clone();
            let connecting = async move {
                match transport {
                    Transport::Tcp => {
                        client::connect(config, (addr_host.as_str(), port), handler).await
                    }
                    Transport::Bridge(socket) => {
                        #[cfg(unix)]
                        let stream = tokio::net::UnixStream::from_std(socket)?;
                        #[cfg(not(unix))]
                        let stream = tokio::net::TcpStream::from_std(socket)?;
                        client::connect_stream(config, stream, handler).await
                    }
                }
            };
            tokio::time::timeout(timeout, connecting)
                .await
                .map_err(|_| SshError::Timeout(format!("Connection to {}:{} timed out", host, port)))?
        })?;

        debug!("SSH handshake completed with {}:{}", self.options.host, port);
        self.handle = Some(handle);
        Ok(())
    }

    fn auth_publickey_auto(&mut self) -> Result<bool, SshError> {
        let runtime = self.runtime.clone();
        let options = self.options.clone();
        let handle = self.handle()?;

        let result = runtime.block_on(async {
            if Self::try_agent(handle, &options.username).await {
                return Ok(true);
            }
            Self::try_identities(handle, &options).await
        });
        if let Err(e) = &result {
            self.last_error = Some(e.to_string());
        }
        result
    }

    fn auth_password(&mut self, password: &str) -> Result<bool, SshError> {
        let runtime = self.runtime.clone();
        let username = self.options.username.clone();
        let handle = self.handle()?;

        let result = runtime
            .block_on(handle.authenticate_password(username, password))
            .map(|r| r.success())
            .map_err(SshError::from);
        if let Err(e) = &result {
            self.last_error = Some(e.to_string());
        }
        result
    }

    fn open_forward(&mut self, host: &str, port: u16) -> Result<RusshChannel, SshError> {
        let runtime = self.runtime.clone();
        let handle = self.handle()?;
        let channel = runtime.block_on(handle.channel_open_direct_tcpip(
            host,
            port as u32,
            "127.0.0.1",
            0,
        ));
        match channel {
            Ok(channel) => Ok(RusshChannel::new(runtime, channel)),
            Err(e) => {
                self.last_error = Some(e.to_string());
                Err(SshError::ChannelOpenFailed(e.to_string()))
            }
        }
    }

    fn open_shell(&mut self, pty: PtyRequest<'_>) -> Result<RusshChannel, SshError> {
        let runtime = self.runtime.clone();
        let handle = self.handle()?;
        let channel = runtime.block_on(async {
            let channel = handle.channel_open_session().await?;
            channel
                .request_pty(false, pty.term, pty.cols, pty.rows, 0, 0, &[])
                .await?;
            channel.request_shell(false).await?;
            Ok::<_, russh::Error>(channel)
        });
        match channel {
            Ok(channel) => {
                debug!("Shell channel opened with {}x{} PTY", pty.cols, pty.rows);
                Ok(RusshChannel::new(runtime, channel))
            }
            Err(e) => {
                self.last_error = Some(e.to_string());
                Err(SshError::ChannelOpenFailed(e.to_string()))
            }
        }
    }

    fn open_sftp(&mut self) -> Result<RusshSftp, SshError> {
        let runtime = self.runtime.clone();
        let handle = self.handle()?;
        let sftp = runtime.block_on(async {
            let channel = handle.channel_open_session().await?;
            channel.request_subsystem(true, "sftp").await?;
            russh_sftp::client::SftpSession::new(channel.into_stream())
                .await
                .map_err(|e| SshError::Protocol(e.to_string()))
        });
        match sftp {
            Ok(sftp) => Ok(RusshSftp::new(runtime, sftp)),
            Err(e) => {
                self.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    fn disconnect(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        if let Err(e) = self.runtime.block_on(handle.disconnect(
            Disconnect::ByApplication,
            "",
            "en",
        )) {
            warn!("Disconnect from {} failed: {}", self.options.host, e);
        }
        let _guard = self.runtime.enter();
        drop(handle);
    }

    fn last_error(&self) -> Option<String> {
        self.last_error.clone()
    }
}

impl Drop for RusshSession {
    fn drop(&mut self) {
        let _guard = self.runtime.enter();
        self.handle.take();
    }
}
