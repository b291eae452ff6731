//! groupcast: connectionless group broadcast for nearby radio peers
//!
//! Senders periodically broadcast typed, grouped messages to every listener in
//! range. Listeners drop duplicates and frames for other groups, and answer
//! commands with a direct reply to the sender's radio address. Delivery is
//! best-effort and single-hop; nothing is encrypted or retried.
//!
//! The radio itself sits behind [`network::Transport`]; [`network::RadioMedium`]
//! and [`network::UdpTransport`] are bundled for simulation and testing.
pub mod core;
pub mod network;
pub mod node;
pub mod protocol;
mod util;

// Re-export commonly used items
pub use crate::core::{Config, Error, GroupId, MacAddress, MessageType, Result, Role};
pub use crate::node::{EventSink, Node, NodeEvent};
pub use crate::protocol::{FrameCodec, Message};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
