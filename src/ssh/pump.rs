//! Proxy pump
//!
//! Moves bytes between a forwarded proxy channel and the pump side of the
//! transport bridge. Two regimes drive the same [`PumpState::step`]:
//!
//! - **Background**: while `connect()` blocks in the primary handshake, a
//!   scoped worker thread loops `step(); sleep(interval)` until signalled.
//! - **Cooperative**: once the connection is handed to the caller, each tick
//!   of the caller's event loop performs one step.
//!
//! A step never blocks. Bytes that a partial write could not place are kept
//! and flushed first on the next step.

use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use bytes::{Buf, BytesMut};
use tracing::{debug, warn};

use super::bridge::ShutdownWrite;
use super::engine::EngineChannel;

/// Bytes moved per direction per step
pub const PUMP_CHUNK_SIZE: usize = 4096;

/// Bytes delivered by one step
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PumpStats {
    /// Proxy channel → bridge
    pub to_bridge: usize,
    /// Bridge → proxy channel
    pub to_proxy: usize,
}

impl PumpStats {
    pub fn is_idle(&self) -> bool {
        self.to_bridge == 0 && self.to_proxy == 0
    }
}

/// Carry-over buffers between steps
#[derive(Debug, Default)]
pub struct PumpState {
    to_bridge: BytesMut,
    to_proxy: BytesMut,
    bridge_eof: bool,
    /// Proxy channel ended and the bridge write half is shut
    upstream_eof: bool,
    failed: bool,
}

impl PumpState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes read but not yet written, per direction
    pub fn pending(&self) -> (usize, usize) {
        (self.to_bridge.len(), self.to_proxy.len())
    }

    /// The tunnel can carry no more traffic towards the primary session
    pub fn is_finished(&self) -> bool {
        self.failed || self.upstream_eof
    }

    /// One nonblocking pass: proxy → bridge first, then bridge → proxy.
    ///
    /// Once the proxy channel has ended and everything it delivered has been
    /// flushed, the bridge write half is shut so the primary session sees end
    /// of stream. A failed step is final; later steps do nothing.
    pub fn step<C, B>(&mut self, channel: &mut C, bridge: &mut B) -> io::Result<PumpStats>
    where
        C: EngineChannel + ?Sized,
        B: Read + Write + ShutdownWrite + ?Sized,
    {
        if self.failed {
            return Ok(PumpStats::default());
        }
        let result = self.transfer(channel, bridge);
        if result.is_err() {
            self.failed = true;
        }
        result
    }

    fn transfer<C, B>(&mut self, channel: &mut C, bridge: &mut B) -> io::Result<PumpStats>
    where
        C: EngineChannel + ?Sized,
        B: Read + Write + ShutdownWrite + ?Sized,
    {
        let mut stats = PumpStats::default();
        let mut buf = [0u8; PUMP_CHUNK_SIZE];

        let mut drained = false;
        if self.to_bridge.is_empty() && !self.upstream_eof {
            let n = channel.read_nonblocking(&mut buf)?;
            self.to_bridge.extend_from_slice(&buf[..n]);
            drained = n == 0;
        }
        if !self.to_bridge.is_empty() {
            match bridge.write(&self.to_bridge) {
                Ok(n) => {
                    self.to_bridge.advance(n);
                    stats.to_bridge = n;
                }
                Err(e) if is_transient(&e) => {}
                Err(e) => return Err(e),
            }
        }
        if drained && (channel.is_eof() || !channel.is_open()) {
            debug!("Proxy channel ended, shutting down bridge write half");
            self.upstream_eof = true;
            if let Err(e) = bridge.shutdown_write() {
                debug!("Bridge shutdown failed: {}", e);
            }
        }

        if !channel.is_open() {
            return Ok(stats);
        }
        if self.to_proxy.is_empty() && !self.bridge_eof {
            match bridge.read(&mut buf) {
                Ok(0) => {
                    debug!("Bridge closed by local session, sending EOF upstream");
                    self.bridge_eof = true;
                    if let Err(e) = channel.send_eof() {
                        debug!("Failed to send EOF on proxy channel: {}", e);
                    }
                }
                Ok(n) => self.to_proxy.extend_from_slice(&buf[..n]),
                Err(e) if is_transient(&e) => {}
                Err(e) => return Err(e),
            }
        }
        if !self.to_proxy.is_empty() {
            let n = channel.write(&self.to_proxy)?;
            self.to_proxy.advance(n);
            stats.to_proxy = n;
        }

        Ok(stats)
    }
}

fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

/// Worker loop: step, sleep, until `stop` is raised or a step fails.
pub fn run_background<C, B>(
    state: &mut PumpState,
    channel: &mut C,
    bridge: &mut B,
    stop: &AtomicBool,
    interval: Duration,
) where
    C: EngineChannel + ?Sized,
    B: Read + Write + ShutdownWrite + ?Sized,
{
    debug!("Proxy pump worker started");
    while !stop.load(Ordering::Acquire) {
        if let Err(e) = state.step(channel, bridge) {
            warn!("Proxy pump worker stopped on error: {}", e);
            break;
        }
        thread::sleep(interval);
    }
    debug!("Proxy pump worker exiting");
}

/// Raises the stop flag even when the foreground closure unwinds
struct StopOnDrop<'a>(&'a AtomicBool);

impl Drop for StopOnDrop<'_> {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Release);
    }
}

/// Run `f` on the calling thread while a worker pumps the bridge.
///
/// The worker borrows the channel and bridge for exactly the lifetime of
/// `f`; it is signalled and joined before this returns, on every path.
pub fn with_background_pump<C, B, R>(
    state: &mut PumpState,
    channel: &mut C,
    bridge: &mut B,
    interval: Duration,
    f: impl FnOnce() -> R,
) -> io::Result<R>
where
    C: EngineChannel + ?Sized,
    B: Read + Write + ShutdownWrite + Send + ?Sized,
{
    let stop = AtomicBool::new(false);
    let stop = &stop;

    thread::scope(|scope| {
        let worker = thread::Builder::new()
            .name("proxy-pump".to_string())
            .spawn_scoped(scope, move || {
                run_background(state, channel, bridge, stop, interval)
            })?;

        let result = {
            let _stop = StopOnDrop(stop);
            f()
        };

        if let Err(panic) = worker.join() {
            std::panic::resume_unwind(panic);
        }
        debug!("Proxy pump worker joined");
        Ok(result)
    })
}
