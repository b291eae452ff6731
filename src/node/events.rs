use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::core::{DecodeError, GroupId, MacAddress, PeerError, Role, TransportError};
use crate::network::SendStatus;
use crate::protocol::{Message, ReplySkip};

/// Something a node did or observed, reported to an [`EventSink`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeEvent {
    /// The node loop started
    Started {
        address: MacAddress,
        node_id: String,
        group: GroupId,
        role: Role,
    },
    /// A peer was registered for directed sends
    PeerAdded { address: MacAddress },
    /// A peer could not be registered
    PeerRejected { address: MacAddress, error: PeerError },
    /// A scheduled broadcast is about to be sent
    Broadcast { message: Message },
    /// A reply was handed to the transport
    ReplySent { to: MacAddress, message: Message },
    /// An admitted command was not answered
    ReplySkipped { source: Option<MacAddress>, reason: ReplySkip },
    /// The transport refused a frame
    SendFailed { destination: MacAddress, error: TransportError },
    /// The transport finished a send
    SendCompleted { destination: Option<MacAddress>, status: SendStatus },
    /// A frame passed both filters
    Admitted { source: Option<MacAddress>, message: Message },
    /// A frame at or below the watermark was dropped
    Duplicate { source: Option<MacAddress>, sequence: u32, watermark: u32 },
    /// A frame for another group was dropped
    ForeignGroup { source: Option<MacAddress>, group: GroupId, mine: GroupId },
    /// A buffer could not be decoded
    DecodeFailed { source: Option<MacAddress>, error: DecodeError },
    /// A broadcaster heard a reply
    ReplyReceived { source: MacAddress, message: Message },
    /// A transport notification the node could not use
    Ignored { reason: &'static str },
}

/// Destination for node events
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &NodeEvent);
}

impl<F> EventSink for F
where
    F: Fn(&NodeEvent) + Send + Sync,
{
    fn emit(&self, event: &NodeEvent) {
        self(event)
    }
}

/// Writes events to `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &NodeEvent) {
        match event {
            NodeEvent::Started { address, node_id, group, role } => {
                info!(%address, node_id = %node_id, %group, ?role, "node started");
            }
            NodeEvent::PeerAdded { address } => {
                info!(%address, "peer added");
            }
            NodeEvent::PeerRejected { address, error } => {
                warn!(%address, %error, "peer not added");
            }
            NodeEvent::Broadcast { message } => {
                info!(
                    message_type = %message.message_type,
                    group = %message.group_id,
                    sequence = message.sequence_number,
                    body = %message.body,
                    "broadcasting"
                );
            }
            NodeEvent::ReplySent { to, message } => {
                info!(%to, body = %message.body, "reply sent");
            }
            NodeEvent::ReplySkipped { source, reason } => {
                warn!(source = ?source, ?reason, "reply skipped");
            }
            NodeEvent::SendFailed { destination, error } => {
                warn!(%destination, %error, "send failed");
            }
            NodeEvent::SendCompleted { destination, status } => match status {
                SendStatus::Success => info!(destination = ?destination, "send status: SUCCESS"),
                SendStatus::Failure => warn!(destination = ?destination, "send status: FAIL"),
            },
            NodeEvent::Admitted { source, message } => {
                info!(
                    source = ?source,
                    sender = %message.sender_id,
                    message_type = %message.message_type,
                    group = %message.group_id,
                    sequence = message.sequence_number,
                    body = %message.body,
                    "received"
                );
            }
            NodeEvent::Duplicate { source, sequence, watermark } => {
                debug!(source = ?source, sequence, watermark, "duplicate ignored");
            }
            NodeEvent::ForeignGroup { source, group, mine } => {
                debug!(source = ?source, %group, %mine, "skip group");
            }
            NodeEvent::DecodeFailed { source, error } => {
                warn!(source = ?source, %error, "frame dropped");
            }
            NodeEvent::ReplyReceived { source, message } => {
                info!(
                    %source,
                    sender = %message.sender_id,
                    body = %message.body,
                    group = %message.group_id,
                    timestamp = message.timestamp,
                    "reply received"
                );
            }
            NodeEvent::Ignored { reason } => {
                debug!(reason, "notification ignored");
            }
        }
    }
}

/// Forwards events into an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<NodeEvent>,
}

impl ChannelSink {
    /// Creates a sink and the receiver its events arrive on
    pub fn new() -> (Self, mpsc::UnboundedReceiver<NodeEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ChannelSink { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: &NodeEvent) {
        // A dropped receiver just means nobody is listening any more
        let _ = self.tx.send(event.clone());
    }
}
