use crate::core::ScheduleEntry;

/// Process-wide sequence counter for outgoing broadcasts
///
/// The first value handed out is 1. Zero is reserved for unsequenced frames
/// and is skipped if the counter ever wraps.
///
/// Known limitation: after a wrap from `u32::MAX` back to 1, listeners whose
/// watermark already reached `u32::MAX` reject every later broadcast until
/// they restart. At one broadcast every five seconds the wrap is about 680
/// years away.
#[derive(Debug, Clone, Default)]
pub struct SequenceCounter {
    last: u32,
}

impl SequenceCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advances the counter and returns the new value
    pub fn next(&mut self) -> u32 {
        self.last = self.last.wrapping_add(1);
        if self.last == 0 {
            self.last = 1;
        }
        self.last
    }

    /// Last value handed out, 0 before the first send
    pub fn current(&self) -> u32 {
        self.last
    }
}

/// Fixed rotation of broadcast contents
#[derive(Debug, Clone)]
pub struct BroadcastSchedule {
    entries: Vec<ScheduleEntry>,
    cursor: usize,
}

impl BroadcastSchedule {
    pub fn new(entries: Vec<ScheduleEntry>) -> Self {
        BroadcastSchedule { entries, cursor: 0 }
    }

    /// Returns the entry for this cycle and moves to the next one
    pub fn next_entry(&mut self) -> Option<&ScheduleEntry> {
        if self.entries.is_empty() {
            return None;
        }
        let index = self.cursor % self.entries.len();
        self.cursor = (index + 1) % self.entries.len();
        self.entries.get(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
