//! Transport adapter module
//!
//! This module defines the boundary to the radio: the [`Transport`] trait used to
//! hand frames to the driver, the [`TransportCallbacks`] the driver calls back
//! into, and the peer registry the [`PeerTable`] wraps. Two transports are
//! bundled: an in-process [`RadioMedium`] and a UDP emulation.

mod medium;
mod peers;
mod udp;

pub use self::medium::{MediumTransport, RadioMedium};
pub use self::peers::{MemoryRegistry, PeerRegistry, PeerTable};
pub use self::udp::{DatagramCodec, UdpConfig, UdpTransport};

use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::core::{MacAddress, TransportError};

/// Outcome of a send as reported by the radio
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStatus {
    Success,
    Failure,
}

/// Notification from the radio to the node loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A frame arrived
    Received {
        source: Option<MacAddress>,
        data: Bytes,
    },
    /// A previous send finished
    SendComplete {
        destination: Option<MacAddress>,
        status: SendStatus,
    },
}

/// Hands frames to the radio
///
/// `send` only queues the frame; the outcome arrives later as a
/// [`TransportEvent::SendComplete`].
pub trait Transport: Send + Sync {
    /// Hardware address of this radio
    fn local_address(&self) -> MacAddress;

    /// Queues `frame` for `destination`
    fn send(&self, destination: &MacAddress, frame: Bytes) -> Result<(), TransportError>;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn local_address(&self) -> MacAddress {
        (**self).local_address()
    }

    fn send(&self, destination: &MacAddress, frame: Bytes) -> Result<(), TransportError> {
        (**self).send(destination, frame)
    }
}

/// Entry points a radio driver calls from its completion context
///
/// Callbacks never run protocol logic. They copy what they were given into
/// the node's event queue and return immediately; a full queue drops the
/// notification.
#[derive(Clone, Debug)]
pub struct TransportCallbacks {
    events: mpsc::Sender<TransportEvent>,
}

impl TransportCallbacks {
    /// Creates callbacks feeding a queue of `depth` events
    pub fn channel(depth: usize) -> (Self, mpsc::Receiver<TransportEvent>) {
        let (tx, rx) = mpsc::channel(depth.max(1));
        (TransportCallbacks { events: tx }, rx)
    }

    /// Inbound frame. `len` is the length the driver reported for `data`.
    ///
    /// Returns whether the frame was queued. Frames without a source address
    /// or with a non-positive length are dropped here.
    pub fn on_receive(&self, source: Option<MacAddress>, data: &[u8], len: i32) -> bool {
        let Some(source) = source else {
            debug!("frame without source address ignored");
            return false;
        };
        let Ok(len) = usize::try_from(len) else {
            debug!(%source, len, "frame with negative length ignored");
            return false;
        };
        if len == 0 {
            debug!(%source, "empty frame ignored");
            return false;
        }

        let len = len.min(data.len());
        self.push(TransportEvent::Received {
            source: Some(source),
            data: Bytes::copy_from_slice(&data[..len]),
        })
    }

    /// Completion of a send; `destination` is absent when the driver has no address info
    pub fn on_send_complete(&self, destination: Option<MacAddress>, status: SendStatus) -> bool {
        self.push(TransportEvent::SendComplete { destination, status })
    }

    fn push(&self, event: TransportEvent) -> bool {
        match self.events.try_send(event) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("transport event queue full, notification dropped");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }
}
