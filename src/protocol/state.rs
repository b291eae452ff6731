use tracing::{debug, warn};

use crate::core::{
    Config, DecodeError, Error, GroupId, MacAddress, MessageType, PeerError, Result, Role,
};
use crate::network::PeerTable;
use crate::util::Clock;
use super::codec::FrameCodec;
use super::filter::DuplicateFilter;
use super::group::is_relevant;
use super::message::Message;
use super::schedule::{BroadcastSchedule, SequenceCounter};

/// Where the last inbound frame got to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchPhase {
    /// Nothing processed yet
    Idle,
    /// Frame handed to the codec
    Decoding,
    /// Frame dropped before dispatch
    Rejected(Rejection),
    /// Frame passed both filters
    Admitted(MessageType),
    /// Admitted frame fully handled
    Terminal,
    /// Admitted command whose reply has not been handed off yet
    Replying,
}

/// Why an inbound frame was not dispatched
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// The buffer could not be decoded
    Decode(DecodeError),
    /// Sequence number at or below the watermark
    Duplicate { sequence: u32, watermark: u32 },
    /// Addressed to another group
    ForeignGroup { group: GroupId, mine: GroupId },
}

/// Why a command went unanswered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplySkip {
    /// The transport did not report who sent the command
    NoSource,
    /// The sender could not be registered as a peer
    Peer(PeerError),
}

/// Result of running one inbound frame through the state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// Dropped by the codec or a filter
    Rejected(Rejection),
    /// Admitted and handled, nothing to send
    Delivered(Message),
    /// Admitted command; `reply` must go to `to`
    Reply {
        request: Message,
        to: MacAddress,
        reply: Message,
        /// Whether `to` was registered while handling this frame
        peer_added: bool,
    },
    /// Admitted command that cannot be answered
    ReplySkipped { request: Message, reason: ReplySkip },
}

/// Protocol state of one node
///
/// Owns everything the inbound and outbound paths share: the sequence
/// counter, the duplicate filter and the peer table. Callers serialize access
/// by owning the state from a single task.
#[derive(Debug)]
pub struct ProtocolState {
    node_id: String,
    group: GroupId,
    channel: u8,
    role: Role,
    reply_text: String,
    sequence: SequenceCounter,
    filter: DuplicateFilter,
    peers: PeerTable,
    schedule: BroadcastSchedule,
    clock: Clock,
    phase: DispatchPhase,
}

impl ProtocolState {
    /// Creates protocol state from a validated configuration
    pub fn new(config: &Config, peers: PeerTable) -> Result<Self> {
        config.validate()?;
        Ok(ProtocolState {
            node_id: config.node_id.clone(),
            group: config.group,
            channel: config.channel,
            role: config.role,
            reply_text: config.reply_text.clone(),
            sequence: SequenceCounter::new(),
            filter: DuplicateFilter::with_scope(config.watermark_scope)
                .with_sender_limit(config.peer_capacity),
            peers,
            schedule: BroadcastSchedule::new(config.schedule.clone()),
            clock: Clock::new(),
            phase: DispatchPhase::Idle,
        })
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn group(&self) -> GroupId {
        self.group
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    /// Phase reached by the most recent inbound frame
    pub fn phase(&self) -> &DispatchPhase {
        &self.phase
    }

    pub fn filter(&self) -> &DuplicateFilter {
        &self.filter
    }

    pub fn peers(&self) -> &PeerTable {
        &self.peers
    }

    pub fn peers_mut(&mut self) -> &mut PeerTable {
        &mut self.peers
    }

    /// Last sequence number used for a broadcast
    pub fn last_sequence(&self) -> u32 {
        self.sequence.current()
    }

    /// Builds the next scheduled broadcast, consuming a sequence number
    pub fn next_broadcast(&mut self) -> Result<Message> {
        let entry = self
            .schedule
            .next_entry()
            .ok_or_else(|| Error::invalid_state("broadcast schedule is empty"))?;
        let (message_type, group, body) = (entry.message_type, entry.group, entry.body.clone());

        Ok(Message::broadcast(
            self.node_id.clone(),
            body,
            message_type,
            group,
            self.sequence.next(),
            self.clock.now_ms(),
        ))
    }

    /// Runs an inbound frame through decode, duplicate filter, group filter and dispatch
    pub fn receive(&mut self, source: Option<MacAddress>, data: &[u8]) -> Dispatch {
        self.phase = DispatchPhase::Decoding;
        let message = match FrameCodec::decode(data) {
            Ok(message) => message,
            Err(e) => return self.reject(Rejection::Decode(e)),
        };

        // Duplicate check comes first: foreign-group frames still advance the watermark
        if !self.filter.admit_from(&message.sender_id, message.sequence_number) {
            let watermark = self.filter.watermark_for(&message.sender_id);
            return self.reject(Rejection::Duplicate {
                sequence: message.sequence_number,
                watermark,
            });
        }

        if !is_relevant(message.group_id, self.group) {
            return self.reject(Rejection::ForeignGroup {
                group: message.group_id,
                mine: self.group,
            });
        }

        self.phase = DispatchPhase::Admitted(message.message_type);
        match message.message_type {
            MessageType::Command => self.prepare_reply(source, message),
            MessageType::Info | MessageType::Alert | MessageType::Unknown(_) => {
                self.phase = DispatchPhase::Terminal;
                Dispatch::Delivered(message)
            }
        }
    }

    /// Decodes a reply addressed to this node without filtering it
    pub fn observe_reply(&mut self, data: &[u8]) -> std::result::Result<Message, DecodeError> {
        self.phase = DispatchPhase::Decoding;
        match FrameCodec::decode(data) {
            Ok(message) => {
                self.phase = DispatchPhase::Terminal;
                Ok(message)
            }
            Err(e) => {
                self.phase = DispatchPhase::Rejected(Rejection::Decode(e.clone()));
                Err(e)
            }
        }
    }

    fn prepare_reply(&mut self, source: Option<MacAddress>, request: Message) -> Dispatch {
        self.phase = DispatchPhase::Replying;

        let Some(to) = source else {
            warn!(sender = %request.sender_id, "command without source address, not replying");
            self.phase = DispatchPhase::Terminal;
            return Dispatch::ReplySkipped {
                request,
                reason: ReplySkip::NoSource,
            };
        };

        let known = self.peers.contains(&to);
        if let Err(e) = self.peers.upsert(to, self.channel) {
            warn!(%to, error = %e, "cannot register command sender, not replying");
            self.phase = DispatchPhase::Terminal;
            return Dispatch::ReplySkipped {
                request,
                reason: ReplySkip::Peer(e),
            };
        }

        let reply = Message::reply(
            self.node_id.clone(),
            self.reply_text.clone(),
            self.group,
            self.clock.now_ms(),
        );
        debug!(%to, sender = %request.sender_id, "command admitted, reply prepared");

        Dispatch::Reply {
            request,
            to,
            reply,
            peer_added: !known,
        }
    }

    /// Marks the pending reply as handed to the transport, whatever its outcome
    pub fn complete_reply(&mut self) {
        if self.phase == DispatchPhase::Replying {
            self.phase = DispatchPhase::Terminal;
        }
    }

    fn reject(&mut self, rejection: Rejection) -> Dispatch {
        self.phase = DispatchPhase::Rejected(rejection.clone());
        Dispatch::Rejected(rejection)
    }
}
