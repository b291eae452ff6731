use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::trace;

use crate::core::{MacAddress, TransportError};
use super::{SendStatus, Transport, TransportCallbacks, TransportEvent};

/// Shared in-process "air" connecting radios in range of each other
///
/// Broadcast frames reach every other attached radio and always complete
/// successfully, as broadcasts carry no link-level acknowledgment. Directed
/// frames complete successfully only if the destination is attached.
#[derive(Clone, Default)]
pub struct RadioMedium {
    stations: Arc<Mutex<HashMap<MacAddress, TransportCallbacks>>>,
}

impl RadioMedium {
    /// Creates an empty medium
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a radio with `address`, returning its transport and event queue
    pub fn attach(
        &self,
        address: MacAddress,
        queue: usize,
    ) -> (MediumTransport, mpsc::Receiver<TransportEvent>) {
        let (callbacks, events) = TransportCallbacks::channel(queue);
        self.stations().insert(address, callbacks.clone());

        let transport = MediumTransport {
            address,
            medium: self.clone(),
            callbacks,
        };
        (transport, events)
    }

    /// Takes a radio out of range
    pub fn detach(&self, address: &MacAddress) {
        self.stations().remove(address);
    }

    /// Number of attached radios
    pub fn len(&self) -> usize {
        self.stations().len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations().is_empty()
    }

    fn stations(&self) -> MutexGuard<'_, HashMap<MacAddress, TransportCallbacks>> {
        self.stations.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Receivers of a frame from `source` to `destination`
    fn recipients(&self, source: &MacAddress, destination: &MacAddress) -> Vec<TransportCallbacks> {
        let stations = self.stations();
        if destination.is_broadcast() {
            stations
                .iter()
                .filter(|(address, _)| *address != source)
                .map(|(_, callbacks)| callbacks.clone())
                .collect()
        } else {
            stations.get(destination).cloned().into_iter().collect()
        }
    }
}

/// A radio attached to a [`RadioMedium`]
pub struct MediumTransport {
    address: MacAddress,
    medium: RadioMedium,
    callbacks: TransportCallbacks,
}

impl Transport for MediumTransport {
    fn local_address(&self) -> MacAddress {
        self.address
    }

    fn send(&self, destination: &MacAddress, frame: Bytes) -> Result<(), TransportError> {
        let recipients = self.medium.recipients(&self.address, destination);
        let len = i32::try_from(frame.len()).unwrap_or(i32::MAX);

        trace!(from = %self.address, to = %destination, receivers = recipients.len(), "frame on air");
        for station in &recipients {
            station.on_receive(Some(self.address), &frame, len);
        }

        let status = if destination.is_broadcast() || !recipients.is_empty() {
            SendStatus::Success
        } else {
            SendStatus::Failure
        };
        self.callbacks.on_send_complete(Some(*destination), status);
        Ok(())
    }
}
