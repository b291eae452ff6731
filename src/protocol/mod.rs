//! Protocol implementation module
//! 
//! This module defines the groupcast frame, its fixed-size encoding, the
//! inbound filters and the dispatch state machine.

pub mod codec;
pub mod filter;
pub mod group;
pub mod message;
pub mod schedule;
pub mod state;

pub use self::codec::FrameCodec;
pub use self::filter::DuplicateFilter;
pub use self::group::is_relevant;
pub use self::message::Message;
pub use self::schedule::{BroadcastSchedule, SequenceCounter};
pub use self::state::{Dispatch, DispatchPhase, ProtocolState, Rejection, ReplySkip};
