use serde::{Deserialize, Serialize};

use crate::core::{GroupId, MessageType, BODY_LEN, SENDER_ID_LEN};
use crate::util::truncate_utf8;

/// A frame exchanged between nodes
///
/// Messages are built once, either for a send or from a received buffer,
/// and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Identifier of the sending node
    pub sender_id: String,
    /// Text payload
    pub body: String,
    /// Kind of message
    pub message_type: MessageType,
    /// Target group, 0 for all
    pub group_id: GroupId,
    /// Per-sender sequence, 0 for unsequenced replies
    pub sequence_number: u32,
    /// Milliseconds on the sender's monotonic clock
    pub timestamp: u64,
}

impl Message {
    /// Builds a sequenced broadcast message
    pub fn broadcast(
        sender_id: impl Into<String>,
        body: impl Into<String>,
        message_type: MessageType,
        group_id: GroupId,
        sequence_number: u32,
        timestamp: u64,
    ) -> Self {
        Message {
            sender_id: sender_id.into(),
            body: body.into(),
            message_type,
            group_id,
            sequence_number,
            timestamp,
        }
    }

    /// Builds an unsequenced Info reply
    pub fn reply(
        sender_id: impl Into<String>,
        body: impl Into<String>,
        group_id: GroupId,
        timestamp: u64,
    ) -> Self {
        Message {
            sender_id: sender_id.into(),
            body: body.into(),
            message_type: MessageType::Info,
            group_id,
            sequence_number: 0,
            timestamp,
        }
    }

    /// Whether this message takes part in duplicate suppression
    pub fn is_sequenced(&self) -> bool {
        self.sequence_number != 0
    }

    /// Returns the message as it will look after a trip over the wire:
    /// strings cut to their field capacity minus the terminator.
    pub fn to_wire_form(&self) -> Message {
        Message {
            sender_id: truncate_utf8(&self.sender_id, SENDER_ID_LEN - 1).to_string(),
            body: truncate_utf8(&self.body, BODY_LEN - 1).to_string(),
            ..self.clone()
        }
    }
}
