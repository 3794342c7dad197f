//! Configuration Management Module
//!
//! Host records supplied by the external credential store.

pub mod hosts;

pub use hosts::{HostRecord, HostRecordError, Protocol};
