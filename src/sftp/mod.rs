//! SFTP file management module
//!
//! Remote directory listing, streamed upload/download and basic file
//! operations on top of an established connection.

pub mod backend;
pub mod error;
pub mod path_utils;
pub mod session;
pub mod types;

pub use backend::{RemoteAttrs, RemoteEntry, SftpBackend};
pub use error::SftpError;
pub use session::FileSession;
pub use types::*;
