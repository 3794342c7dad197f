//! Nonblocking I/O on the interactive channel
//!
//! The presentation layer never blocks. Its loop calls [`Connection::tick`]
//! every few milliseconds, which runs one pump step (proxied connections
//! only) and then one nonblocking read.

use tracing::{debug, warn};

use super::connection::Connection;
use super::engine::{EngineChannel, EngineSession};
use super::error::{ReadError, SshError};

/// Lifecycle of the interactive channel. Only forward transitions apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum ChannelState {
    #[default]
    Unopened,
    Open,
    /// EOF sent, close pending
    Closing,
    Closed,
}

impl ChannelState {
    /// Move to `next` if it is later in the lifecycle. Returns whether the
    /// state changed.
    pub fn advance(&mut self, next: ChannelState) -> bool {
        if next > *self {
            *self = next;
            true
        } else {
            false
        }
    }
}

impl<S: EngineSession> Connection<S> {
    /// Read whatever has already arrived. `Ok(0)` means nothing yet.
    pub fn try_read(&mut self, buf: &mut [u8]) -> Result<usize, ReadError> {
        if self.state >= ChannelState::Closed {
            return Err(ReadError::Closed);
        }
        let Some(channel) = self.channel.as_mut() else {
            return Err(ReadError::Closed);
        };
        if buf.is_empty() {
            return Ok(0);
        }

        match channel.read_nonblocking(buf) {
            Ok(0) if channel.is_eof() || !channel.is_open() => {
                debug!("Channel reached EOF for connection {}", self.id());
                self.state.advance(ChannelState::Closed);
                Err(ReadError::Eof)
            }
            Ok(n) => Ok(n),
            Err(e) => {
                warn!("Channel read failed for connection {}: {}", self.id(), e);
                self.state.advance(ChannelState::Closed);
                Err(ReadError::Io(e))
            }
        }
    }

    /// Send bytes to the remote shell. May accept fewer than offered.
    ///
    /// When proxied, the tunnel is pumped in the background for the duration
    /// of the write, since window space for it arrives through the bridge.
    pub fn write(&mut self, data: &[u8]) -> Result<usize, SshError> {
        if self.state != ChannelState::Open {
            return Err(SshError::ChannelClosed);
        }
        let Self {
            channel,
            proxy,
            pump_interval,
            ..
        } = self;
        let channel = channel.as_mut().ok_or(SshError::ChannelClosed)?;

        let written = match proxy.as_mut() {
            Some(link) => link.pump_while(*pump_interval, || channel.write(data))?,
            None => channel.write(data),
        };
        Ok(written?)
    }

    pub fn is_open(&self) -> bool {
        self.state == ChannelState::Open
            && self
                .channel
                .as_ref()
                .is_some_and(|c| c.is_open() && !c.is_eof())
    }

    /// One pump step, then one nonblocking read.
    ///
    /// A failed tunnel is terminal: the pump error is returned once, and a
    /// tunnel closed by the far side reads as end of stream after whatever
    /// had already arrived.
    pub fn tick(&mut self, buf: &mut [u8]) -> Result<usize, ReadError> {
        if self.state >= ChannelState::Closed {
            return Err(ReadError::Closed);
        }
        if let Err(e) = self.pump_step() {
            warn!("Proxy pump step failed for connection {}: {}", self.id(), e);
            self.state.advance(ChannelState::Closed);
            return Err(ReadError::Io(e));
        }

        let n = self.try_read(buf)?;
        if n == 0 && !buf.is_empty() && self.tunnel_finished() {
            debug!("Proxy tunnel ended for connection {}", self.id());
            self.state.advance(ChannelState::Closed);
            return Err(ReadError::Eof);
        }
        Ok(n)
    }

    /// Notify the remote PTY of a new window size
    pub fn resize(&mut self, cols: u32, rows: u32) -> Result<(), SshError> {
        if self.state != ChannelState::Open {
            return Err(SshError::ChannelClosed);
        }
        let channel = self.channel.as_mut().ok_or(SshError::ChannelClosed)?;
        channel.resize(cols, rows)?;
        debug!("Resized PTY to {}x{}", cols, rows);
        Ok(())
    }
}
