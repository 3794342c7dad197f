//! SSH module - connections, jump-host tunneling and nonblocking I/O
//!
//! # Features
//! - Direct SSH connections
//! - Single-hop ProxyJump through a `direct-tcpip` channel bridged onto a
//!   local socket pair
//! - Key/agent authentication with password fallback
//! - Nonblocking reads for an event-driven caller

pub(crate) mod auth;
pub mod bridge;
pub(crate) mod config;
pub(crate) mod connection;
pub mod engine;
pub(crate) mod error;
pub(crate) mod io;
pub mod pump;
pub mod russh_engine;

pub use auth::{authenticate, AuthOutcome};
pub use config::{ConnectOptions, EngineConfig, ProxyDescriptor, TargetConfig};
pub use connection::{Connection, SshConnector};
pub use engine::{EngineChannel, EngineSession, PtyRequest, SessionOptions, SshEngine, Transport};
pub use error::{ReadError, SshError};
pub use io::ChannelState;
pub use pump::{PumpState, PumpStats, PUMP_CHUNK_SIZE};
pub use russh_engine::{RusshEngine, RusshSession};
