//! Output formatting and persistence for bus snapshots.
//!
//! Supports pretty-printing, JSON serialization, and CSV append.

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, info};

use crate::types::BusRecord;
use csv::WriterBuilder;
use std::fs::OpenOptions;
use std::path::Path;

/// One CSV row per bus snapshot. The path is stored as a JSON string.
#[derive(Debug, Serialize)]
struct BusRow<'a> {
    observed_at: String,
    id: &'a str,
    line_number: &'a str,
    lat: f64,
    lng: f64,
    stop_name: &'a str,
    route_name: &'a str,
    start_time: &'a str,
    end_time: &'a str,
    segment_index: i64,
    duration: i64,
    icon_color: &'a str,
    text_color: &'a str,
    path_color: &'a str,
    path: String,
}

impl<'a> BusRow<'a> {
    fn new(bus: &'a BusRecord, observed_at: &str) -> Result<Self> {
        Ok(Self {
            observed_at: observed_at.to_string(),
            id: &bus.id,
            line_number: bus.line_number.as_str(),
            lat: bus.position.lat,
            lng: bus.position.lng,
            stop_name: &bus.stop_name,
            route_name: &bus.route_name,
            start_time: &bus.start_time,
            end_time: &bus.end_time,
            segment_index: bus.segment_index,
            duration: bus.duration,
            icon_color: &bus.icon_color,
            text_color: &bus.text_color,
            path_color: &bus.path_color,
            path: serde_json::to_string(&bus.path)?,
        })
    }
}

/// Logs a bus record using Rust's debug pretty-print format.
pub fn print_pretty(bus: &BusRecord) {
    debug!("{:#?}", bus);
}

/// Logs a batch of bus records as pretty-printed JSON.
pub fn print_json(buses: &[BusRecord]) -> Result<()> {
    info!("{}", serde_json::to_string_pretty(buses)?);
    Ok(())
}

/// Appends one row per [`BusRecord`] to a CSV file, stamped with the
/// current UTC time.
///
/// Creates the file with headers if it does not already exist.
pub fn append_records(path: &str, buses: &[BusRecord]) -> Result<()> {
    let file_exists = Path::new(path).exists();
    debug!(path, file_exists, rows = buses.len(), "Appending CSV records");

    let file = OpenOptions::new().append(true).create(true).open(path)?;

    let mut writer = WriterBuilder::new()
        .has_headers(!file_exists) // IMPORTANT when appending
        .from_writer(file);

    let observed_at = chrono::Utc::now().to_rfc3339();
    for bus in buses {
        writer.serialize(BusRow::new(bus, &observed_at)?)?;
    }
    writer.flush()?;

    Ok(())
}
