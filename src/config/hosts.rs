//! Saved host records
//!
//! Rows of the external record store, as JSON. The core only reads them and
//! turns them into connect parameters.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ssh::{ConnectOptions, ProxyDescriptor, TargetConfig};

#[derive(Debug, Error)]
pub enum HostRecordError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Proxy {0} is itself proxied; only one jump host is supported")]
    NestedProxy(String),
}

/// What the record is opened as
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// Interactive shell
    #[default]
    Ssh,
    /// File browser only
    Sftp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostRecord {
    /// Display name
    pub name: String,
    pub hostname: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_path: Option<PathBuf>,
    #[serde(default)]
    pub protocol: Protocol,
    /// Jump host record, already resolved by the store
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<Box<HostRecord>>,
}

fn default_port() -> u16 {
    22
}

impl HostRecord {
    pub fn from_json(json: &str) -> Result<Self, HostRecordError> {
        let record: HostRecord = serde_json::from_str(json)?;
        record.validate()?;
        Ok(record)
    }

    /// Parse a JSON array of records
    pub fn list_from_json(json: &str) -> Result<Vec<Self>, HostRecordError> {
        let records: Vec<HostRecord> = serde_json::from_str(json)?;
        for record in &records {
            record.validate()?;
        }
        Ok(records)
    }

    fn validate(&self) -> Result<(), HostRecordError> {
        match &self.proxy {
            Some(proxy) if proxy.proxy.is_some() => {
                Err(HostRecordError::NestedProxy(proxy.name.clone()))
            }
            _ => Ok(()),
        }
    }

    pub fn target(&self) -> TargetConfig {
        let mut target = TargetConfig::new(&self.hostname, &self.username).port(self.port);
        target.password = self.password.clone();
        target.key_path = self.key_path.clone();
        target
    }

    pub fn proxy(&self) -> Option<ProxyDescriptor> {
        self.proxy.as_deref().map(|p| {
            let mut proxy = ProxyDescriptor::new(&p.hostname, &p.username).port(p.port);
            proxy.password = p.password.clone();
            proxy.key_path = p.key_path.clone();
            proxy
        })
    }

    /// Shell for `ssh` records, SFTP-only for `sftp` records
    pub fn connect_options(&self) -> ConnectOptions {
        match self.protocol {
            Protocol::Ssh => ConnectOptions::default(),
            Protocol::Sftp => ConnectOptions::without_shell(),
        }
    }
}
