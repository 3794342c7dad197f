//! SSH Configuration

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// The host a connection ultimately talks to
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Remote host address
    pub host: String,

    /// SSH port (default: 22)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Username for authentication
    pub username: String,

    /// Password used when key/agent authentication is rejected
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Extra identity file tried before the default ~/.ssh keys
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_path: Option<PathBuf>,
}

impl TargetConfig {
    pub fn new(host: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: default_port(),
            username: username.into(),
            password: None,
            key_path: None,
        }
    }

    /// Set custom port
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn key_path(mut self, key_path: impl Into<PathBuf>) -> Self {
        self.key_path = Some(key_path.into());
        self
    }

    pub(crate) fn credentials(&self) -> Credentials<'_> {
        Credentials {
            host: &self.host,
            port: self.port,
            username: &self.username,
            password: self.password.as_deref(),
            key_path: self.key_path.as_ref(),
        }
    }
}

/// Jump host used to reach the target (ProxyJump with a single hop)
///
/// Immutable for the duration of one connect attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyDescriptor {
    /// Jump host address
    pub host: String,

    /// Jump host port (default: 22)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Username for the jump host
    pub username: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_path: Option<PathBuf>,
}

impl ProxyDescriptor {
    pub fn new(host: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: default_port(),
            username: username.into(),
            password: None,
            key_path: None,
        }
    }

    /// Set custom port
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn key_path(mut self, key_path: impl Into<PathBuf>) -> Self {
        self.key_path = Some(key_path.into());
        self
    }

    pub(crate) fn credentials(&self) -> Credentials<'_> {
        Credentials {
            host: &self.host,
            port: self.port,
            username: &self.username,
            password: self.password.as_deref(),
            key_path: self.key_path.as_ref(),
        }
    }
}

/// Borrowed view shared by target and proxy when creating engine sessions
#[derive(Debug, Clone, Copy)]
pub struct Credentials<'a> {
    pub host: &'a str,
    pub port: u16,
    pub username: &'a str,
    pub password: Option<&'a str>,
    pub key_path: Option<&'a PathBuf>,
}

/// Per-connect behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectOptions {
    /// Open a PTY-backed shell channel once authenticated
    #[serde(default = "default_open_shell")]
    pub open_shell: bool,

    /// Terminal columns
    #[serde(default = "default_cols")]
    pub cols: u32,

    /// Terminal rows
    #[serde(default = "default_rows")]
    pub rows: u32,

    /// TERM value sent with the PTY request
    #[serde(default = "default_term")]
    pub term: String,

    /// Sleep between background pump steps, in milliseconds
    #[serde(default = "default_pump_interval_ms")]
    pub pump_interval_ms: u64,
}

impl ConnectOptions {
    pub fn pump_interval(&self) -> Duration {
        Duration::from_millis(self.pump_interval_ms)
    }

    /// Options for a connection that only carries SFTP
    pub fn without_shell() -> Self {
        Self {
            open_shell: false,
            ..Self::default()
        }
    }
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            open_shell: default_open_shell(),
            cols: default_cols(),
            rows: default_rows(),
            term: default_term(),
            pump_interval_ms: default_pump_interval_ms(),
        }
    }
}

/// Settings for the russh-backed engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Handshake timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Keepalive interval in seconds
    #[serde(default = "default_keepalive")]
    pub keepalive_secs: u64,

    /// Missed keepalives before the transport gives up
    #[serde(default = "default_keepalive_max")]
    pub keepalive_max: usize,

    /// Runtime worker threads driving the SSH transports
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            keepalive_secs: default_keepalive(),
            keepalive_max: default_keepalive_max(),
            worker_threads: default_worker_threads(),
        }
    }
}

fn default_port() -> u16 {
    22
}

fn default_open_shell() -> bool {
    true
}

fn default_cols() -> u32 {
    80
}

fn default_rows() -> u32 {
    24
}

fn default_term() -> String {
    "xterm-256color".to_string()
}

fn default_pump_interval_ms() -> u64 {
    1
}

fn default_timeout() -> u64 {
    30
}

fn default_keepalive() -> u64 {
    30
}

fn default_keepalive_max() -> usize {
    3
}

fn default_worker_threads() -> usize {
    2
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_defaults_from_json() {
        let target: TargetConfig =
            serde_json::from_str(r#"{"host":"db.internal","username":"ops"}"#).unwrap();
        assert_eq!(target.port, 22);
        assert!(target.password.is_none());
        assert!(target.key_path.is_none());
    }

    #[test]
    fn test_connect_options_default_pty() {
        let opts = ConnectOptions::default();
        assert!(opts.open_shell);
        assert_eq!((opts.cols, opts.rows), (80, 24));
        assert_eq!(opts.pump_interval(), Duration::from_millis(1));
        assert!(!ConnectOptions::without_shell().open_shell);
    }

    #[test]
    fn test_proxy_builder() {
        let proxy = ProxyDescriptor::new("bastion.example.com", "jump")
            .port(2222)
            .password("secret");
        assert_eq!(proxy.port, 2222);
        assert_eq!(proxy.credentials().password, Some("secret"));
        assert_eq!(proxy.credentials().host, "bastion.example.com");
    }
}
