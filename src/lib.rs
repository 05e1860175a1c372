//! tether
//!
//! Line-protocol TCP server and client with ECHO/TIME/CLOSE and
//! resumable UPLOAD/DOWNLOAD backed by persisted session offsets.

pub mod cli;
pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod logger;
pub mod net;
pub mod paths;
pub mod protocol;
pub mod reconnect;
pub mod server;
pub mod session;
pub mod transfer;

pub use error::{Result, TransferError};
