use std::collections::{HashMap, VecDeque};

use tracing::debug;

use crate::core::{WatermarkScope, MAX_PEERS};

/// Rejects broadcasts whose sequence number is not above the watermark
///
/// Sequence 0 marks unsequenced frames (replies) and always passes without
/// touching the watermark. With [`WatermarkScope::Global`] every sender shares
/// one watermark, so two broadcasters with interleaving ranges will see some of
/// each other's frames dropped as duplicates.
///
/// With [`WatermarkScope::PerSender`] at most `sender_limit` senders are
/// tracked. When a new sender arrives at the limit, the sender first seen
/// longest ago is forgotten and its next frame starts from a fresh watermark.
#[derive(Debug, Clone)]
pub struct DuplicateFilter {
    scope: WatermarkScope,
    watermark: u32,
    per_sender: HashMap<String, u32>,
    arrival: VecDeque<String>,
    sender_limit: usize,
}

impl Default for DuplicateFilter {
    fn default() -> Self {
        DuplicateFilter {
            scope: WatermarkScope::default(),
            watermark: 0,
            per_sender: HashMap::new(),
            arrival: VecDeque::new(),
            sender_limit: MAX_PEERS,
        }
    }
}

impl DuplicateFilter {
    /// Creates a filter with a single global watermark
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a filter with the given watermark keying
    pub fn with_scope(scope: WatermarkScope) -> Self {
        DuplicateFilter {
            scope,
            ..Default::default()
        }
    }

    /// Caps how many senders keep their own watermark (at least one)
    pub fn with_sender_limit(mut self, limit: usize) -> Self {
        self.sender_limit = limit.max(1);
        self
    }

    /// Admits `sequence` against the global watermark
    pub fn admit(&mut self, sequence: u32) -> bool {
        Self::advance(&mut self.watermark, sequence)
    }

    /// Admits `sequence` from `sender`, keyed according to the filter's scope
    pub fn admit_from(&mut self, sender: &str, sequence: u32) -> bool {
        let admitted = match self.scope {
            WatermarkScope::Global => self.admit(sequence),
            WatermarkScope::PerSender => {
                if sequence == 0 {
                    return true;
                }
                if !self.per_sender.contains_key(sender) {
                    self.track(sender);
                }
                match self.per_sender.get_mut(sender) {
                    Some(watermark) => Self::advance(watermark, sequence),
                    None => true,
                }
            }
        };
        if !admitted {
            debug!(sender, sequence, "duplicate sequence rejected");
        }
        admitted
    }

    /// Highest sequence accepted through the global watermark
    pub fn watermark(&self) -> u32 {
        self.watermark
    }

    /// Watermark that applies to frames from `sender`
    pub fn watermark_for(&self, sender: &str) -> u32 {
        match self.scope {
            WatermarkScope::Global => self.watermark,
            WatermarkScope::PerSender => self.per_sender.get(sender).copied().unwrap_or(0),
        }
    }

    pub fn scope(&self) -> WatermarkScope {
        self.scope
    }

    /// Number of senders with their own watermark
    pub fn tracked_senders(&self) -> usize {
        self.per_sender.len()
    }

    fn track(&mut self, sender: &str) {
        while self.per_sender.len() >= self.sender_limit {
            let Some(oldest) = self.arrival.pop_front() else {
                break;
            };
            debug!(sender = %oldest, "sender watermark evicted");
            self.per_sender.remove(&oldest);
        }
        self.per_sender.insert(sender.to_string(), 0);
        self.arrival.push_back(sender.to_string());
    }

    fn advance(watermark: &mut u32, sequence: u32) -> bool {
        if sequence == 0 {
            return true;
        }
        if sequence > *watermark {
            *watermark = sequence;
            true
        } else {
            false
        }
    }
}
