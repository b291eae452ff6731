use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::{Error, Result};

/// Hardware address of a radio peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MacAddress(pub [u8; 6]);

impl MacAddress {
    /// The all-ones address every listener in range receives
    pub const BROADCAST: MacAddress = MacAddress([0xFF; 6]);

    /// Creates an address from raw bytes
    pub const fn new(bytes: [u8; 6]) -> Self {
        MacAddress(bytes)
    }

    /// Generates a random, locally administered unicast address
    pub fn random() -> Self {
        use rand::Rng;
        let mut bytes = [0u8; 6];
        rand::thread_rng().fill(&mut bytes);
        bytes[0] = (bytes[0] & 0xFC) | 0x02;
        MacAddress(bytes)
    }

    /// Returns whether this is the broadcast address
    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }

    /// Returns the raw address bytes
    pub fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

impl FromStr for MacAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut bytes = [0u8; 6];
        let mut parts = s.split(|c| c == ':' || c == '-');
        for byte in bytes.iter_mut() {
            let part = parts
                .next()
                .ok_or_else(|| Error::config(format!("address too short: {s}")))?;
            *byte = u8::from_str_radix(part, 16)
                .map_err(|e| Error::config(format!("invalid address {s}: {e}")))?;
        }
        if parts.next().is_some() {
            return Err(Error::config(format!("address too long: {s}")));
        }
        Ok(MacAddress(bytes))
    }
}

impl TryFrom<String> for MacAddress {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<MacAddress> for String {
    fn from(addr: MacAddress) -> Self {
        addr.to_string()
    }
}

/// Multicast partition tag; group 0 addresses every group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct GroupId(pub u8);

impl GroupId {
    /// Group tag meaning "all groups"
    pub const ALL: GroupId = GroupId(0);

    pub fn is_all(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of message carried in a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum MessageType {
    Info,
    Command,
    Alert,
    /// A type byte this node does not understand; kept so it can be reported
    Unknown(u8),
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Info => "INFO",
            MessageType::Command => "COMMAND",
            MessageType::Alert => "ALERT",
            MessageType::Unknown(_) => "UNKNOWN",
        }
    }
}

impl From<u8> for MessageType {
    fn from(value: u8) -> Self {
        match value {
            1 => MessageType::Info,
            2 => MessageType::Command,
            3 => MessageType::Alert,
            other => MessageType::Unknown(other),
        }
    }
}

impl From<MessageType> for u8 {
    fn from(value: MessageType) -> Self {
        match value {
            MessageType::Info => 1,
            MessageType::Command => 2,
            MessageType::Alert => 3,
            MessageType::Unknown(other) => other,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A radio peer registered for directed sends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerInfo {
    /// Hardware address, the identity key
    pub address: MacAddress,
    /// Logical radio channel; 0 means "current channel"
    pub channel: u8,
    /// Link encryption, never enabled by this protocol
    pub encrypt: bool,
}

impl PeerInfo {
    pub fn new(address: MacAddress, channel: u8) -> Self {
        PeerInfo {
            address,
            channel,
            encrypt: false,
        }
    }
}

/// What a node does on the air
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Periodically broadcasts the schedule and logs replies
    Broadcaster,
    /// Filters incoming broadcasts and answers commands
    Listener,
}

/// How the duplicate filter keys its watermark
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatermarkScope {
    /// One watermark for every sender
    #[default]
    Global,
    /// One watermark per `sender_id`. Protocol enhancement, off by default.
    PerSender,
}

/// One slot of the broadcaster's rotation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub message_type: MessageType,
    pub group: GroupId,
    pub body: String,
}

impl ScheduleEntry {
    pub fn new(message_type: MessageType, group: GroupId, body: impl Into<String>) -> Self {
        ScheduleEntry {
            message_type,
            group,
            body: body.into(),
        }
    }
}

/// Configuration for a groupcast node
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Identifier written into `sender_id` of outgoing frames
    pub node_id: String,
    /// Group this node belongs to
    pub group: GroupId,
    /// Radio channel used when registering peers
    pub channel: u8,
    /// Broadcaster or listener
    pub role: Role,
    /// Delay between scheduled broadcasts
    #[serde(serialize_with = "super::serde::serialize_duration_ms")]
    #[serde(deserialize_with = "super::serde::deserialize_duration_ms")]
    pub broadcast_interval: Duration,
    /// Pause before a reply goes out, to stay clear of the receive window
    #[serde(serialize_with = "super::serde::serialize_duration_ms")]
    #[serde(deserialize_with = "super::serde::deserialize_duration_ms")]
    pub reply_delay: Duration,
    /// Body of the reply sent for every command
    pub reply_text: String,
    /// Duplicate filter keying
    pub watermark_scope: WatermarkScope,
    /// Maximum number of registered peers
    pub peer_capacity: usize,
    /// Depth of the transport event queue
    pub event_queue: usize,
    /// Peers registered at startup
    pub static_peers: Vec<MacAddress>,
    /// Broadcast rotation
    pub schedule: Vec<ScheduleEntry>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            node_id: "NODE_003".to_string(),
            group: GroupId(1),
            channel: super::DEFAULT_CHANNEL,
            role: Role::Listener,
            broadcast_interval: Duration::from_secs(5),
            reply_delay: Duration::from_millis(100),
            reply_text: "Command received and processed".to_string(),
            watermark_scope: WatermarkScope::Global,
            peer_capacity: super::MAX_PEERS,
            event_queue: 64,
            static_peers: Vec::new(),
            schedule: default_schedule(),
        }
    }
}

impl Config {
    /// Configuration for a broadcaster announcing to every group
    pub fn broadcaster(node_id: impl Into<String>) -> Self {
        Config {
            node_id: node_id.into(),
            group: GroupId::ALL,
            role: Role::Broadcaster,
            ..Default::default()
        }
    }

    /// Configuration for a listener in `group`
    pub fn listener(node_id: impl Into<String>, group: GroupId) -> Self {
        Config {
            node_id: node_id.into(),
            group,
            role: Role::Listener,
            ..Default::default()
        }
    }

    /// Checks the configuration for values the node cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.node_id.is_empty() {
            return Err(Error::config("node id must not be empty"));
        }
        if self.channel > super::MAX_CHANNEL {
            return Err(Error::config(format!("channel {} out of range", self.channel)));
        }
        if self.broadcast_interval.is_zero() {
            return Err(Error::config("broadcast interval must be non-zero"));
        }
        if self.peer_capacity == 0 {
            return Err(Error::config("peer capacity must be non-zero"));
        }
        if self.event_queue == 0 {
            return Err(Error::config("event queue depth must be non-zero"));
        }
        if self.role == Role::Broadcaster && self.schedule.is_empty() {
            return Err(Error::config("broadcaster needs at least one schedule entry"));
        }
        Ok(())
    }
}

/// The stock rotation: info to all, command to group 1, alert to group 2, status to all
pub fn default_schedule() -> Vec<ScheduleEntry> {
    vec![
        ScheduleEntry::new(MessageType::Info, GroupId::ALL, "General announcement to all devices"),
        ScheduleEntry::new(MessageType::Command, GroupId(1), "Command for Group 1 devices"),
        ScheduleEntry::new(MessageType::Alert, GroupId(2), "Alert for Group 2 devices"),
        ScheduleEntry::new(MessageType::Info, GroupId::ALL, "Status update for all groups"),
    ]
}
