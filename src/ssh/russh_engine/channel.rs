//! Blocking/nonblocking facade over an async russh channel

use std::io;
use std::sync::Arc;

use bytes::{Buf, BytesMut};
use futures_util::FutureExt;
use russh::client::Msg;
use russh::{Channel, ChannelMsg};
use tokio::runtime::Runtime;
use tracing::{debug, trace};

use crate::ssh::engine::EngineChannel;

/// Upper bound on bytes accepted by one write
const WRITE_CHUNK: usize = 32 * 1024;

pub struct RusshChannel {
    runtime: Arc<Runtime>,
    channel: Option<Channel<Msg>>,
    /// Received but not yet handed out
    pending: BytesMut,
    eof: bool,
    closed: bool,
}

impl RusshChannel {
    pub(super) fn new(runtime: Arc<Runtime>, channel: Channel<Msg>) -> Self {
        Self {
            runtime,
            channel: Some(channel),
            pending: BytesMut::new(),
            eof: false,
            closed: false,
        }
    }

    /// Pull messages that have already arrived until data shows up
    fn poll_messages(&mut self) {
        let _guard = self.runtime.enter();
        let Some(channel) = self.channel.as_mut() else {
            return;
        };

        while self.pending.is_empty() && !self.closed {
            match channel.wait().now_or_never() {
                None => break,
                Some(None) => {
                    debug!("Channel {:?} message stream ended", channel.id());
                    self.closed = true;
                }
                Some(Some(msg)) => match msg {
                    ChannelMsg::Data { data } => self.pending.extend_from_slice(&data),
                    // stderr is merged into the terminal stream
                    ChannelMsg::ExtendedData { data, ext: 1 } => {
                        self.pending.extend_from_slice(&data)
                    }
                    ChannelMsg::Eof => self.eof = true,
                    ChannelMsg::Close => self.closed = true,
                    ChannelMsg::ExitStatus { exit_status } => {
                        debug!("Remote process exited with status {}", exit_status)
                    }
                    other => trace!("Ignoring channel message: {:?}", other),
                },
            }
        }
    }
}

fn to_io(err: russh::Error) -> io::Error {
    io::Error::new(io::ErrorKind::Other, err.to_string())
}

impl EngineChannel for RusshChannel {
    fn read_nonblocking(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pending.is_empty() {
            self.poll_messages();
        }
        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.advance(n);
        Ok(n)
    }

    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if self.closed {
            return Err(io::ErrorKind::BrokenPipe.into());
        }
        let channel = self
            .channel
            .as_ref()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))?;
        let data = &data[..data.len().min(WRITE_CHUNK)];
        self.runtime.block_on(channel.data(data)).map_err(to_io)?;
        Ok(data.len())
    }

    fn send_eof(&mut self) -> io::Result<()> {
        match self.channel.as_ref() {
            Some(channel) if !self.closed => self.runtime.block_on(channel.eof()).map_err(to_io),
            _ => Ok(()),
        }
    }

    fn close(&mut self) {
        if let Some(channel) = self.channel.take() {
            if !self.closed {
                if let Err(e) = self.runtime.block_on(channel.close()) {
                    debug!("Channel close failed: {}", e);
                }
            }
            let _guard = self.runtime.enter();
            drop(channel);
        }
        self.closed = true;
    }

    fn resize(&mut self, cols: u32, rows: u32) -> io::Result<()> {
        let channel = self
            .channel
            .as_ref()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))?;
        self.runtime
            .block_on(channel.window_change(cols, rows, 0, 0))
            .map_err(to_io)
    }

    fn is_open(&self) -> bool {
        self.channel.is_some() && !self.closed
    }

    fn is_eof(&self) -> bool {
        self.eof
    }
}

impl Drop for RusshChannel {
    fn drop(&mut self) {
        let _guard = self.runtime.enter();
        self.channel.take();
    }
}
