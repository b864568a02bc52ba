//! Global and per-line subscriber fan-out.
//!
//! A [`Subscriptions`] table holds at most one global listener, which
//! receives each whole batch, and any number of line listeners, which
//! receive the individual records whose line number matches.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use tracing::{debug, error, info};

use crate::types::{BusRecord, LineKey};

pub type LineListener = Arc<dyn Fn(&BusRecord) + Send + Sync>;
pub type GlobalListener = Box<dyn Fn(&[BusRecord]) + Send + Sync>;

/// Counts from one [`Subscriptions::dispatch`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub line_calls: usize,
    pub global_calls: usize,
    pub failures: usize,
}

#[derive(Default)]
pub struct Subscriptions {
    global: Option<GlobalListener>,
    by_line: HashMap<LineKey, Vec<LineListener>>,
}

impl Subscriptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs the global listener, replacing any previous one.
    pub fn subscribe_global<F>(&mut self, listener: F)
    where
        F: Fn(&[BusRecord]) + Send + Sync + 'static,
    {
        if self.global.is_some() {
            debug!("Replacing global listener");
        }
        self.global = Some(Box::new(listener));
    }

    /// Appends a listener for one line.
    pub fn subscribe_line<K, F>(&mut self, line: K, listener: F)
    where
        K: Into<LineKey>,
        F: Fn(&BusRecord) + Send + Sync + 'static,
    {
        self.add_line_listener(line.into(), Arc::new(listener));
    }

    /// Registers the same listener under each of `lines`.
    pub fn subscribe_lines<I, K, F>(&mut self, lines: I, listener: F)
    where
        I: IntoIterator<Item = K>,
        K: Into<LineKey>,
        F: Fn(&BusRecord) + Send + Sync + 'static,
    {
        let listener: LineListener = Arc::new(listener);
        let mut keys = Vec::new();
        for line in lines {
            let key = line.into();
            keys.push(key.to_string());
            self.add_line_listener(key, Arc::clone(&listener));
        }
        info!(lines = %keys.join(", "), "Subscribed to line updates");
    }

    fn add_line_listener(&mut self, key: LineKey, listener: LineListener) {
        debug!(line = %key, "Subscribed to line updates");
        self.by_line.entry(key).or_default().push(listener);
    }

    pub fn has_global(&self) -> bool {
        self.global.is_some()
    }

    /// Number of listeners registered for `line`.
    pub fn line_listener_count(&self, line: &LineKey) -> usize {
        self.by_line.get(line).map_or(0, Vec::len)
    }

    /// Notifies line listeners for each record in batch order, then the
    /// global listener once with the whole batch.
    ///
    /// A panicking listener is logged and counted; the remaining listeners
    /// still run.
    pub fn dispatch(&self, updated: &[BusRecord]) -> DispatchReport {
        let mut report = DispatchReport::default();

        for bus in updated {
            let Some(listeners) = self.by_line.get(&bus.line_number) else {
                continue;
            };
            for listener in listeners {
                report.line_calls += 1;
                if catch_unwind(AssertUnwindSafe(|| listener(bus))).is_err() {
                    report.failures += 1;
                    error!(bus_id = %bus.id, line = %bus.line_number, "Line listener panicked");
                }
            }
        }

        if let Some(global) = &self.global {
            report.global_calls += 1;
            if catch_unwind(AssertUnwindSafe(|| global(updated))).is_err() {
                report.failures += 1;
                error!(batch_len = updated.len(), "Global listener panicked");
            }
        }

        report
    }
}
