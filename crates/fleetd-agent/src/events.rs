//! In-memory agent event log
//!
//! A small ring of timestamped one-line events, served over the local
//! HTTP endpoint for quick inspection on a box without log shipping.

use chrono::Utc;
use std::collections::VecDeque;
use std::sync::Mutex;

const DEFAULT_CAPACITY: usize = 256;

/// Bounded ring buffer of recent agent events.
#[derive(Debug)]
pub struct EventLog {
    entries: Mutex<VecDeque<String>>,
    capacity: usize,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl EventLog {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(DEFAULT_CAPACITY))),
            capacity: capacity.max(1),
        }
    }

    /// Append an event, evicting the oldest entry when full.
    pub fn push(&self, message: impl AsRef<str>) {
        let line = format!("{} {}", Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ"), message.as_ref());

        let mut entries = self.entries.lock().expect("event log lock poisoned");
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(line);
    }

    /// All retained events, oldest first.
    pub fn all(&self) -> Vec<String> {
        self.entries
            .lock()
            .expect("event log lock poisoned")
            .iter()
            .cloned()
            .collect()
    }

    /// Most recent events, oldest first.
    pub fn tail(&self, limit: usize) -> Vec<String> {
        let entries = self.entries.lock().expect("event log lock poisoned");
        entries
            .iter()
            .skip(entries.len().saturating_sub(limit))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("event log lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
