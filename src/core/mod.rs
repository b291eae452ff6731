//! Core types and traits for the groupcast protocol
//! 
//! This module contains the fundamental building blocks used throughout the library.

pub mod error;
pub mod types;
pub mod serde;

pub use self::error::{DecodeError, Error, PeerError, RegistryError, Result, TransportError};
pub use self::types::{
    default_schedule,
    Config,
    GroupId,
    MacAddress,
    MessageType,
    PeerInfo,
    Role,
    ScheduleEntry,
    WatermarkScope,
};

/// Capacity of the `sender_id` field, including the terminating NUL
pub const SENDER_ID_LEN: usize = 20;

/// Capacity of the `body` field, including the terminating NUL
pub const BODY_LEN: usize = 180;

/// Width of the timestamp field in bytes (64-bit profile)
pub const TIMESTAMP_LEN: usize = 8;

/// Size of every frame on the air
pub const WIRE_SIZE: usize = SENDER_ID_LEN + BODY_LEN + 1 + 1 + 4 + TIMESTAMP_LEN;

/// Default radio channel
pub const DEFAULT_CHANNEL: u8 = 1;

/// Highest radio channel accepted in configuration
pub const MAX_CHANNEL: u8 = 14;

/// Peer registry capacity of the reference radio
pub const MAX_PEERS: usize = 20;
