use std::collections::VecDeque;

use chrono::Utc;
use serde_json::Value;

use crate::usecases::ports::BridgeEvent;

/// Bounded ring of bridge events; the oldest entry is dropped first.
#[derive(Debug)]
pub struct EventLog {
    capacity: usize,
    entries: VecDeque<BridgeEvent>,
}

impl EventLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity.min(64)),
        }
    }

    pub fn push(&mut self, kind: &str, detail: Value) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(BridgeEvent {
            at: Utc::now(),
            kind: kind.to_string(),
            detail,
        });
    }

    /// Up to `limit` most recent entries, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<BridgeEvent> {
        let skip = self.entries.len().saturating_sub(limit);
        self.entries.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_drops_oldest_when_full() {
        let mut log = EventLog::new(2);
        log.push("a", Value::Null);
        log.push("b", Value::Null);
        log.push("c", json!({"n": 3}));
        let kinds: Vec<_> = log.recent(10).into_iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec!["b", "c"]);
    }

    #[test]
    fn test_recent_keeps_newest() {
        let mut log = EventLog::new(10);
        for kind in ["a", "b", "c", "d"] {
            log.push(kind, Value::Null);
        }
        let kinds: Vec<_> = log.recent(2).into_iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec!["c", "d"]);
        assert_eq!(log.len(), 4);
        assert!(log.recent(0).is_empty());
    }
}
