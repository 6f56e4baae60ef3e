use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use crate::domain::Event;

/// Point-in-time copy of the merged per-source event map, safe for
/// concurrent readers while the live map keeps mutating.
pub type EventsSnapshot = HashMap<String, Vec<Event>>;

/// Process-wide map from source id to its current event list; the single
/// source of truth for what is displayed. Every operation leaves the map in
/// a consistent, immediately-readable state.
#[derive(Default)]
pub struct EventCache {
    inner: RwLock<HashMap<String, Vec<Event>>>,
}

impl EventCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace a source's entry wholesale, ordered by ascending start time.
    pub fn upsert(&self, source_id: &str, mut events: Vec<Event>) {
        events.sort_by_key(|e| e.start_time);
        self.inner
            .write()
            .expect("event cache lock poisoned")
            .insert(source_id.to_string(), events);
    }

    /// Remove a source's entry; no-op when absent.
    pub fn remove(&self, source_id: &str) {
        self.inner
            .write()
            .expect("event cache lock poisoned")
            .remove(source_id);
    }

    /// Drop every entry whose source is no longer enabled. Used after a
    /// reconfiguration to clear keys that went stale while a refresh was in
    /// flight.
    pub fn prune_to_enabled(&self, enabled_ids: &HashSet<String>) {
        self.inner
            .write()
            .expect("event cache lock poisoned")
            .retain(|id, _| enabled_ids.contains(id));
    }

    pub fn snapshot(&self) -> EventsSnapshot {
        self.inner
            .read()
            .expect("event cache lock poisoned")
            .clone()
    }

    pub fn contains(&self, source_id: &str) -> bool {
        self.inner
            .read()
            .expect("event cache lock poisoned")
            .contains_key(source_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{RawEvent, Source};
    use chrono::{TimeZone, Utc};

    fn event_at(source_id: &str, hour: u32) -> Event {
        let source = Source::new(source_id, "https://example.com/cal.ics");
        Event::from_raw(
            RawEvent {
                start: Utc.with_ymd_and_hms(2026, 2, 11, hour, 0, 0).unwrap(),
                ..RawEvent::default()
            },
            &source,
        )
    }

    #[test]
    fn test_upsert_replaces_wholesale_and_sorts() {
        let cache = EventCache::new();
        cache.upsert("a", vec![event_at("a", 15), event_at("a", 9), event_at("a", 12)]);

        let snap = cache.snapshot();
        let starts: Vec<u32> = snap["a"]
            .iter()
            .map(|e| e.start_time.format("%H").to_string().parse().unwrap())
            .collect();
        assert_eq!(starts, vec![9, 12, 15]);

        cache.upsert("a", vec![event_at("a", 18)]);
        assert_eq!(cache.snapshot()["a"].len(), 1);
    }

    #[test]
    fn test_upsert_then_remove_survives_interleaved_other_upsert() {
        let cache = EventCache::new();
        cache.upsert("a", vec![event_at("a", 9)]);
        cache.upsert("b", vec![event_at("b", 10)]);
        cache.remove("a");

        let snap = cache.snapshot();
        assert!(!snap.contains_key("a"));
        assert!(snap.contains_key("b"));
    }

    #[test]
    fn test_remove_missing_is_noop() {
        let cache = EventCache::new();
        cache.remove("missing");
        assert!(cache.snapshot().is_empty());
    }

    #[test]
    fn test_prune_to_enabled() {
        let cache = EventCache::new();
        cache.upsert("a", vec![event_at("a", 9)]);
        cache.upsert("b", vec![event_at("b", 10)]);
        cache.upsert("c", vec![event_at("c", 11)]);

        let enabled: HashSet<String> = ["a".to_string(), "c".to_string()].into();
        cache.prune_to_enabled(&enabled);

        let snap = cache.snapshot();
        assert_eq!(snap.len(), 2);
        assert!(snap.contains_key("a"));
        assert!(snap.contains_key("c"));
    }

    #[test]
    fn test_snapshot_is_independent_copy() {
        let cache = EventCache::new();
        cache.upsert("a", vec![event_at("a", 9)]);

        let snap = cache.snapshot();
        cache.remove("a");

        assert!(snap.contains_key("a"));
        assert!(!cache.contains("a"));
    }
}
