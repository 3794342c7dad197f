//! OxideTerm core - SSH sessions for event-driven clients
//!
//! Establishes interactive and SFTP sessions over SSH, optionally through a
//! single jump host, and exposes the shell stream to a caller that must never
//! block.
//!
//! ```no_run
//! use oxideterm_core::ssh::{EngineConfig, ProxyDescriptor, RusshEngine, SshConnector, TargetConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let connector = SshConnector::new(RusshEngine::new(EngineConfig::default())?);
//! let target = TargetConfig::new("10.0.0.5", "alice").password("secret");
//! let proxy = ProxyDescriptor::new("bastion.example.com", "alice");
//! let mut conn = connector.connect(&target, Some(&proxy), true)?;
//!
//! let mut buf = [0u8; 4096];
//! loop {
//!     match conn.tick(&mut buf) {
//!         Ok(0) => std::thread::sleep(std::time::Duration::from_millis(10)),
//!         Ok(n) => print!("{}", String::from_utf8_lossy(&buf[..n])),
//!         Err(_) => break,
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod history;
pub mod sftp;
pub mod ssh;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{HostRecord, Protocol};
pub use history::{HistoryEntry, HistorySink, MemoryHistory, NoopHistory};
pub use sftp::{FileEntry, FileKind, FileSession, SftpError};
pub use ssh::{
    ChannelState, Connection, ConnectOptions, ProxyDescriptor, ReadError, RusshEngine,
    SshConnector, SshError, TargetConfig,
};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize logging
///
/// `RUST_LOG` overrides the default `info` filter. Does nothing if a global
/// subscriber is already installed.
pub fn init_logging() {
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
