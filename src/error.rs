//! Error taxonomy shared by the server, the client and the transfer engine

use std::io;

/// Errors produced by the tether library.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    /// Peer closed the stream before the expected bytes arrived.
    #[error("connection closed during {0}")]
    ConnectionClosed(&'static str),

    /// Malformed or unexpected line from the peer.
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("file not found: {0}")]
    NotFound(String),

    /// Missing or unusable command argument.
    #[error("invalid argument: {0}")]
    Validation(String),

    #[error("declared size {declared} exceeds limit {limit}")]
    TooLarge { declared: u64, limit: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl TransferError {
    /// True when the underlying connection can no longer be trusted and the
    /// client should reconnect.
    pub fn is_connection_fault(&self) -> bool {
        matches!(self, Self::ConnectionClosed(_) | Self::Io(_) | Self::TooLarge { .. })
    }
}

pub type Result<T, E = TransferError> = std::result::Result<T, E>;
