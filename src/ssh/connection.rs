//! Connection manager
//!
//! Builds one [`Connection`] per remote target, optionally through a single
//! jump host:
//!
//! ```text
//! Client ──SSH──▶ [Proxy] ──direct-tcpip──▶ [Target]
//!    │                 ▲
//!    └─ primary SSH ──▶ bridge ◀── pump ──┘
//! ```
//!
//! # Steps
//!
//! 1. Connect and authenticate the proxy session
//! 2. Open a `direct-tcpip` channel from the proxy to the target
//! 3. Allocate the bridge; its transport end becomes the primary session's socket
//! 4. Start the background pump, run the primary handshake, auth and shell open
//! 5. Join the pump; the caller's loop now owns pumping via [`Connection::tick`]
//!
//! Any failure tears the partially built connection down before returning.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::auth::{authenticate, AuthOutcome};
use super::bridge::{self, BridgeEnd};
use super::config::{ConnectOptions, ProxyDescriptor, TargetConfig};
use super::engine::{EngineChannel, EngineSession, PtyRequest, SshEngine, Transport};
use super::error::SshError;
use super::io::ChannelState;
use super::pump::{self, PumpState, PumpStats};
use crate::history::{HistoryEntry, HistorySink, NoopHistory};

/// Proxy-side resources of a connection, released in reverse order
pub(crate) struct ProxyLink<S: EngineSession> {
    session: Option<S>,
    channel: Option<S::Channel>,
    bridge: Option<BridgeEnd>,
    pump: PumpState,
}

impl<S: EngineSession> ProxyLink<S> {
    fn new(session: S) -> Self {
        Self {
            session: Some(session),
            channel: None,
            bridge: None,
            pump: PumpState::new(),
        }
    }

    /// One cooperative pump step
    pub(crate) fn step(&mut self) -> io::Result<PumpStats> {
        match (self.channel.as_mut(), self.bridge.as_mut()) {
            (Some(channel), Some(bridge)) => self.pump.step(channel, bridge),
            _ => Ok(PumpStats::default()),
        }
    }

    fn is_finished(&self) -> bool {
        self.pump.is_finished()
    }

    /// Run `f` while a scoped worker keeps the bridge drained
    pub(crate) fn pump_while<R>(
        &mut self,
        interval: Duration,
        f: impl FnOnce() -> R,
    ) -> io::Result<R> {
        match (self.channel.as_mut(), self.bridge.as_mut()) {
            (Some(channel), Some(bridge)) => {
                pump::with_background_pump(&mut self.pump, channel, bridge, interval, f)
            }
            _ => Ok(f()),
        }
    }

    fn release(&mut self) {
        if self.bridge.take().is_some() {
            debug!("Bridge socket closed");
        }
        if let Some(mut channel) = self.channel.take() {
            channel.close();
        }
        if let Some(mut session) = self.session.take() {
            session.disconnect();
        }
    }
}

/// A live (or partially built) session to one remote target.
///
/// Exclusively owns the primary session and channel plus, when proxied,
/// the proxy session, forwarded channel and bridge. Dropping it tears
/// everything down; [`Connection::close`] does the same explicitly and may
/// be called any number of times.
pub struct Connection<S: EngineSession> {
    id: String,
    pub(super) session: Option<S>,
    pub(super) channel: Option<S::Channel>,
    pub(super) state: ChannelState,
    connected: bool,
    pub(super) proxy: Option<ProxyLink<S>>,
    pub(super) pump_interval: Duration,
    last_error: Option<String>,
    history: Arc<dyn HistorySink>,
    hostname: String,
    username: String,
}

impl<S: EngineSession> Connection<S> {
    fn new(
        session: S,
        target: &TargetConfig,
        pump_interval: Duration,
        history: Arc<dyn HistorySink>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            session: Some(session),
            channel: None,
            state: ChannelState::Unopened,
            connected: false,
            proxy: None,
            pump_interval,
            last_error: None,
            history,
            hostname: target.host.clone(),
            username: target.username.clone(),
        }
    }

    /// An interactive session has started on this connection
    fn record_history(&self) {
        self.history
            .record(&HistoryEntry::ssh(&self.hostname, &self.username));
    }

    /// Identifier used in log lines
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Handshake and authentication completed and not yet torn down
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn has_proxy(&self) -> bool {
        self.proxy.is_some()
    }

    /// Whether a bridge socket is currently held
    pub fn has_bridge(&self) -> bool {
        self.proxy
            .as_ref()
            .is_some_and(|link| link.bridge.is_some())
    }

    pub fn has_channel(&self) -> bool {
        self.channel.is_some()
    }

    /// Interactive channel lifecycle state
    pub fn state(&self) -> ChannelState {
        self.state
    }

    /// Most recent error text reported by the transport
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// One cooperative pump step; no-op without a proxy.
    pub fn pump_step(&mut self) -> io::Result<PumpStats> {
        match self.proxy.as_mut() {
            Some(link) => link.step(),
            None => Ok(PumpStats::default()),
        }
    }

    /// The jump-host tunnel failed or was closed by the far side
    pub fn tunnel_finished(&self) -> bool {
        self.proxy.as_ref().is_some_and(ProxyLink::is_finished)
    }

    /// Run a blocking closure with the bridge pumped in the background
    pub(crate) fn pumped<R>(&mut self, f: impl FnOnce() -> R) -> io::Result<R> {
        match self.proxy.as_mut() {
            Some(link) => link.pump_while(self.pump_interval, f),
            None => Ok(f()),
        }
    }

    /// Run a blocking call against the primary session
    pub(crate) fn with_session<R>(
        &mut self,
        f: impl FnOnce(&mut S) -> Result<R, SshError>,
    ) -> Result<R, SshError> {
        let Self {
            session,
            proxy,
            pump_interval,
            last_error,
            ..
        } = self;
        let session = session.as_mut().ok_or(SshError::ChannelClosed)?;

        let result = match proxy.as_mut() {
            Some(link) => link.pump_while(*pump_interval, || f(&mut *session))?,
            None => f(&mut *session),
        };
        if result.is_err() {
            *last_error = session.last_error();
        }
        result
    }

    /// Open the interactive channel on a connection created without one
    pub fn open_shell(&mut self, options: &ConnectOptions) -> Result<(), SshError> {
        if !self.connected {
            return Err(SshError::ChannelOpenFailed("session is not connected".into()));
        }
        if self.channel.is_some() {
            return Err(SshError::ChannelOpenFailed("shell already open".into()));
        }

        let channel = self.with_session(|session| open_shell_channel(session, options))?;
        self.channel = Some(channel);
        self.state.advance(ChannelState::Open);
        info!("Interactive shell opened for connection {}", self.id);
        self.record_history();
        Ok(())
    }

    /// Proxy connect, auth and forwarded-channel open; returns the primary
    /// session's transport.
    fn open_proxy<E>(
        &mut self,
        engine: &E,
        proxy: &ProxyDescriptor,
        target: &TargetConfig,
    ) -> Result<Transport, SshError>
    where
        E: SshEngine<Session = S>,
    {
        info!("Using proxy {}@{}:{}", proxy.username, proxy.host, proxy.port);

        let session = engine
            .new_session(proxy.credentials().into())
            .map_err(|e| SshError::ProxyUnreachable(e.to_string()))?;
        let link = self.proxy.insert(ProxyLink::new(session));
        let Some(session) = link.session.as_mut() else {
            return Err(SshError::ProxyUnreachable("proxy session released".into()));
        };

        if let Err(e) = session.connect(Transport::Tcp) {
            self.last_error = session.last_error();
            return Err(SshError::ProxyUnreachable(format!(
                "{}:{}: {}",
                proxy.host, proxy.port, e
            )));
        }

        if authenticate(session, &proxy.username, proxy.password.as_deref())
            == AuthOutcome::Rejected
        {
            self.last_error = session.last_error();
            return Err(SshError::ProxyAuthFailed(format!(
                "{}@{}: all methods rejected",
                proxy.username, proxy.host
            )));
        }
        info!("Proxy connected and authenticated");

        let channel = session.open_forward(&target.host, target.port).map_err(|e| {
            SshError::ProxyUnreachable(format!(
                "forward to {}:{} via {} failed: {}",
                target.host, target.port, proxy.host, e
            ))
        })?;
        link.channel = Some(channel);
        debug!("Forward channel opened to {}:{}", target.host, target.port);

        let (pump_side, transport_side) = bridge::socket_pair()?;
        link.bridge = Some(pump_side);
        Ok(Transport::Bridge(transport_side))
    }

    fn establish<E>(
        &mut self,
        engine: &E,
        target: &TargetConfig,
        proxy: Option<&ProxyDescriptor>,
        options: &ConnectOptions,
    ) -> Result<(), SshError>
    where
        E: SshEngine<Session = S>,
    {
        let transport = match proxy {
            Some(proxy) => self.open_proxy(engine, proxy, target)?,
            None => Transport::Tcp,
        };

        debug!("Connecting to target session");
        let channel = self.with_session(|session| handshake(session, transport, target, options))?;

        self.connected = true;
        if let Some(channel) = channel {
            self.channel = Some(channel);
            self.state.advance(ChannelState::Open);
        }
        Ok(())
    }

    /// Release every handle in reverse acquisition order.
    ///
    /// Idempotent; absent handles are skipped.
    pub fn close(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            if self.state < ChannelState::Closing {
                if let Err(e) = channel.send_eof() {
                    debug!("Failed to send EOF for connection {}: {}", self.id, e);
                }
                self.state.advance(ChannelState::Closing);
            }
            channel.close();
        }
        if self.state != ChannelState::Unopened {
            self.state.advance(ChannelState::Closed);
        }

        if let Some(mut session) = self.session.take() {
            session.disconnect();
            debug!("Primary session released for connection {}", self.id);
        }
        self.connected = false;

        if let Some(mut link) = self.proxy.take() {
            link.release();
            debug!("Proxy resources released for connection {}", self.id);
        }
    }
}

impl<S: EngineSession> Drop for Connection<S> {
    fn drop(&mut self) {
        self.close();
    }
}

fn open_shell_channel<S: EngineSession + ?Sized>(
    session: &mut S,
    options: &ConnectOptions,
) -> Result<S::Channel, SshError> {
    session
        .open_shell(PtyRequest {
            term: &options.term,
            cols: options.cols,
            rows: options.rows,
        })
        .map_err(|e| SshError::ChannelOpenFailed(e.to_string()))
}

/// Primary handshake, authentication and optional shell, run on the
/// caller's thread (with the pump worker alive when proxied).
fn handshake<S: EngineSession + ?Sized>(
    session: &mut S,
    transport: Transport,
    target: &TargetConfig,
    options: &ConnectOptions,
) -> Result<Option<S::Channel>, SshError> {
    session.connect(transport).map_err(|e| {
        SshError::TargetUnreachable(format!("{}:{}: {}", target.host, target.port, e))
    })?;
    debug!("SSH handshake completed");

    if authenticate(session, &target.username, target.password.as_deref())
        == AuthOutcome::Rejected
    {
        return Err(SshError::AuthFailed(format!(
            "{}@{}: all methods rejected",
            target.username, target.host
        )));
    }

    if !options.open_shell {
        return Ok(None);
    }
    open_shell_channel(session, options).map(Some)
}

/// Entry point for building connections with one engine
pub struct SshConnector<E: SshEngine> {
    engine: E,
    history: Arc<dyn HistorySink>,
}

impl<E: SshEngine> SshConnector<E> {
    pub fn new(engine: E) -> Self {
        Self {
            engine,
            history: Arc::new(NoopHistory),
        }
    }

    /// Notify `history` of every interactive session that starts
    pub fn with_history(mut self, history: Arc<dyn HistorySink>) -> Self {
        self.history = history;
        self
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Connect with default PTY settings
    pub fn connect(
        &self,
        target: &TargetConfig,
        proxy: Option<&ProxyDescriptor>,
        open_shell: bool,
    ) -> Result<Connection<E::Session>, SshError> {
        let options = ConnectOptions {
            open_shell,
            ..ConnectOptions::default()
        };
        self.connect_with(target, proxy, &options)
    }

    /// Blocking. Call from a worker thread, never from the UI loop.
    pub fn connect_with(
        &self,
        target: &TargetConfig,
        proxy: Option<&ProxyDescriptor>,
        options: &ConnectOptions,
    ) -> Result<Connection<E::Session>, SshError> {
        info!(
            "Connecting to {}@{}:{}",
            target.username, target.host, target.port
        );

        let session = self
            .engine
            .new_session(target.credentials().into())
            .map_err(|e| SshError::TargetUnreachable(e.to_string()))?;
        let mut conn = Connection::new(
            session,
            target,
            options.pump_interval(),
            self.history.clone(),
        );

        if let Err(e) = conn.establish(&self.engine, target, proxy, options) {
            warn!(
                "Connection {} to {}:{} failed: {}",
                conn.id, target.host, target.port, e
            );
            conn.close();
            return Err(e);
        }

        info!(
            "Connection {} established to {}@{}:{}",
            conn.id, target.username, target.host, target.port
        );
        if conn.has_channel() {
            conn.record_history();
        }
        Ok(conn)
    }
}
