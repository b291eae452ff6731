use std::collections::HashMap;

use tracing::debug;

use crate::core::{MacAddress, PeerError, PeerInfo, RegistryError};

/// The radio's own table of peers it may address directly
///
/// Mirrors what radio drivers usually expose: an existence check and an add
/// that reports duplicates and exhaustion as distinct errors.
pub trait PeerRegistry: Send {
    /// Whether `address` is registered
    fn exists(&self, address: &MacAddress) -> bool;

    /// Registers a peer
    fn add(&mut self, peer: PeerInfo) -> Result<(), RegistryError>;

    /// Number of registered peers
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Bounded in-memory peer registry
#[derive(Debug, Clone)]
pub struct MemoryRegistry {
    capacity: usize,
    peers: HashMap<MacAddress, PeerInfo>,
}

impl MemoryRegistry {
    pub fn new(capacity: usize) -> Self {
        MemoryRegistry {
            capacity,
            peers: HashMap::new(),
        }
    }

    /// Looks up a registered peer
    pub fn get(&self, address: &MacAddress) -> Option<&PeerInfo> {
        self.peers.get(address)
    }
}

impl Default for MemoryRegistry {
    fn default() -> Self {
        Self::new(crate::core::MAX_PEERS)
    }
}

impl PeerRegistry for MemoryRegistry {
    fn exists(&self, address: &MacAddress) -> bool {
        self.peers.contains_key(address)
    }

    fn add(&mut self, peer: PeerInfo) -> Result<(), RegistryError> {
        if self.peers.contains_key(&peer.address) {
            return Err(RegistryError::Exists);
        }
        if self.peers.len() >= self.capacity {
            return Err(RegistryError::Full {
                capacity: self.capacity,
            });
        }
        self.peers.insert(peer.address, peer);
        Ok(())
    }

    fn len(&self) -> usize {
        self.peers.len()
    }
}

/// Addresses eligible for directed sends
///
/// Entries live for the whole process: there is no removal, and adding an
/// address that is already present succeeds without changing it.
pub struct PeerTable {
    registry: Box<dyn PeerRegistry>,
}

impl PeerTable {
    /// Wraps a radio peer registry
    pub fn new(registry: Box<dyn PeerRegistry>) -> Self {
        PeerTable { registry }
    }

    /// Creates a table over a [`MemoryRegistry`] with `capacity` slots
    pub fn with_capacity(capacity: usize) -> Self {
        Self::new(Box::new(MemoryRegistry::new(capacity)))
    }

    /// Whether `address` may be sent to directly
    pub fn contains(&self, address: &MacAddress) -> bool {
        self.registry.exists(address)
    }

    /// Makes sure `address` is registered on `channel`
    pub fn upsert(&mut self, address: MacAddress, channel: u8) -> Result<(), PeerError> {
        if self.registry.exists(&address) {
            return Ok(());
        }
        match self.registry.add(PeerInfo::new(address, channel)) {
            Ok(()) => {
                debug!(%address, channel, "peer registered");
                Ok(())
            }
            Err(RegistryError::Exists) => Ok(()),
            Err(RegistryError::Full { capacity }) => Err(PeerError::TableFull { address, capacity }),
        }
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }
}

impl std::fmt::Debug for PeerTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerTable").field("len", &self.len()).finish()
    }
}
