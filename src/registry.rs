//! In-memory store of the latest known record per vehicle.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use crate::types::BusRecord;

/// Whether a merge created a new entry or overwrote an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeKind {
    Inserted,
    Updated,
}

/// Latest [`BusRecord`] per vehicle id.
///
/// Entries are never removed: a vehicle missing from a poll keeps its last
/// known state until the process restarts.
#[derive(Debug, Default)]
pub struct BusRegistry {
    buses: HashMap<String, BusRecord>,
}

impl BusRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `record`, replacing every field of an existing entry with the
    /// same id, and returns the stored entry.
    pub fn merge(&mut self, record: BusRecord) -> (MergeKind, &BusRecord) {
        match self.buses.entry(record.id.clone()) {
            Entry::Vacant(slot) => (MergeKind::Inserted, slot.insert(record)),
            Entry::Occupied(slot) => {
                let existing = slot.into_mut();
                *existing = record;
                (MergeKind::Updated, existing)
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<&BusRecord> {
        self.buses.get(id)
    }

    /// Every stored record, in no particular order.
    pub fn list_all(&self) -> impl Iterator<Item = &BusRecord> {
        self.buses.values()
    }

    pub fn snapshot(&self) -> Vec<BusRecord> {
        self.buses.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.buses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buses.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::fallback_record;
    use serde_json::json;

    fn bus(id: &str, stop: &str) -> BusRecord {
        let mut record = fallback_record(&json!([0, 0, id, "1"]));
        record.stop_name = stop.to_string();
        record
    }

    #[test]
    fn test_merge_inserts_new_id() {
        let mut registry = BusRegistry::new();
        let (kind, stored) = registry.merge(bus("A", "Stop 1"));

        assert_eq!(kind, MergeKind::Inserted);
        assert_eq!(stored.stop_name, "Stop 1");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_merge_same_id_overwrites() {
        let mut registry = BusRegistry::new();
        registry.merge(bus("A", "Stop 1"));
        let (kind, stored) = registry.merge(bus("A", "Stop 2"));

        assert_eq!(kind, MergeKind::Updated);
        assert_eq!(stored.stop_name, "Stop 2");
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("A").unwrap().stop_name, "Stop 2");
    }

    #[test]
    fn test_merge_overwrites_every_field() {
        let mut registry = BusRegistry::new();
        let mut first = bus("A", "Stop 1");
        first.duration = 5;
        first.path_color = "#FFFFFF".to_string();
        registry.merge(first);

        let second = bus("A", "Stop 2");
        registry.merge(second.clone());

        assert_eq!(registry.get("A"), Some(&second));
    }

    #[test]
    fn test_absent_records_persist() {
        let mut registry = BusRegistry::new();
        registry.merge(bus("A", "Stop 1"));
        registry.merge(bus("B", "Stop 2"));
        registry.merge(bus("B", "Stop 3"));

        let mut ids: Vec<_> = registry.list_all().map(|b| b.id.clone()).collect();
        ids.sort();
        assert_eq!(ids, vec!["A", "B"]);
        assert_eq!(registry.snapshot().len(), 2);
    }

    #[test]
    fn test_empty_registry() {
        let registry = BusRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.get("A").is_none());
    }
}
