use std::io;
use thiserror::Error;

use super::types::MacAddress;

/// Custom error types for groupcast
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Peer error: {0}")]
    Peer(#[from] PeerError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Creates a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Creates a new invalid state error
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Error::InvalidState(msg.into())
    }
}

/// Failure to turn a received buffer into a message
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("frame too short: expected {expected} bytes, got {actual}")]
    TooShort { expected: usize, actual: usize },
}

/// Failure to register a peer for directed sends
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PeerError {
    #[error("peer table full ({capacity} entries), cannot add {address}")]
    TableFull { address: MacAddress, capacity: usize },

    #[error("peer {0} is not registered")]
    NotRegistered(MacAddress),
}

/// Result reported by a [`crate::network::PeerRegistry`] when adding an entry
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("peer already exists")]
    Exists,

    #[error("peer registry full ({capacity} entries)")]
    Full { capacity: usize },
}

/// Failure reported by the transport when handing over a frame
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("send to {destination} failed: {reason}")]
    SendFailed { destination: MacAddress, reason: String },

    #[error("no route to {0}")]
    Unreachable(MacAddress),

    #[error("transport closed")]
    Closed,
}

impl TransportError {
    /// Creates a new send failure
    pub fn send_failed(destination: MacAddress, reason: impl Into<String>) -> Self {
        TransportError::SendFailed {
            destination,
            reason: reason.into(),
        }
    }
}
