//! Utility module
//! 
//! This module provides common utilities and helper functions used
//! throughout the library.

use tokio::time::Instant;

/// Monotonic millisecond clock used to stamp outgoing frames
///
/// The epoch is the moment the clock was created, so timestamps are only
/// comparable between frames from the same node.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    epoch: Instant,
}

impl Clock {
    /// Creates a clock anchored at the current instant
    pub fn new() -> Self {
        Clock {
            epoch: Instant::now(),
        }
    }

    /// Milliseconds elapsed since the clock was created
    pub fn now_ms(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

/// Copies `text` into at most `max` bytes without splitting a UTF-8 character
pub fn truncate_utf8(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
