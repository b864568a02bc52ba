//! Batch pipeline: normalize every raw record, merge it into the
//! registry, then fan the post-merge records out to subscribers.

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::normalize::{Normalized, normalize};
use crate::registry::{BusRegistry, MergeKind};
use crate::subscriptions::{DispatchReport, Subscriptions};
use crate::types::BusRecord;

/// Counts from processing one raw batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub records: usize,
    pub inserted: usize,
    pub updated: usize,
    pub fallbacks: usize,
    pub dispatch: DispatchReport,
}

/// Owns the vehicle registry and the subscription table.
#[derive(Default)]
pub struct BusTracker {
    registry: BusRegistry,
    subscriptions: Subscriptions,
    debug: bool,
}

impl BusTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables per-bus merge logging.
    pub fn use_debug(&mut self, enabled: bool) {
        self.debug = enabled;
    }

    pub fn debug_enabled(&self) -> bool {
        self.debug
    }

    pub fn registry(&self) -> &BusRegistry {
        &self.registry
    }

    pub fn subscriptions_mut(&mut self) -> &mut Subscriptions {
        &mut self.subscriptions
    }

    /// Every bus seen since startup.
    pub fn buses(&self) -> Vec<BusRecord> {
        self.registry.snapshot()
    }

    /// Runs one raw batch through normalize → merge → dispatch.
    ///
    /// Malformed records are kept as fallback records; nothing here aborts
    /// the batch.
    pub fn process_batch(&mut self, raw: &[Value]) -> BatchReport {
        let mut report = BatchReport {
            records: raw.len(),
            ..Default::default()
        };
        let mut touched = Vec::with_capacity(raw.len());

        for (index, item) in raw.iter().enumerate() {
            let normalized = normalize(item);
            if let Normalized::Fallback { error, record } = &normalized {
                report.fallbacks += 1;
                warn!(index, bus_id = %record.id, error = %error, "Raw record decode failed, using defaults");
            }

            let (kind, stored) = self.registry.merge(normalized.into_record());
            match kind {
                MergeKind::Inserted => report.inserted += 1,
                MergeKind::Updated => report.updated += 1,
            }
            if self.debug {
                let verb = match kind {
                    MergeKind::Inserted => "started",
                    MergeKind::Updated => "updated",
                };
                info!(bus_id = %stored.id, line = %stored.line_number, stop = %stored.stop_name, "Bus {verb}");
            }
            touched.push(stored.id.clone());
        }

        // Snapshots are taken after every merge, so an id repeated within
        // the batch is delivered with its final state each time.
        let updated: Vec<BusRecord> = touched
            .iter()
            .filter_map(|id| self.registry.get(id).cloned())
            .collect();
        report.dispatch = self.subscriptions.dispatch(&updated);
        debug!(
            records = report.records,
            inserted = report.inserted,
            updated = report.updated,
            fallbacks = report.fallbacks,
            tracked = self.registry.len(),
            "Batch processed"
        );

        report
    }
}
