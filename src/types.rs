//! Canonical bus-state types shared by the decode and fan-out pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::coords::Position;

/// String form of a line number, used as the fan-out key.
///
/// The upstream reports line numbers either as numbers or as strings
/// (`1`, `"1"`, `"L1"`). Both are reduced to their textual form, so
/// `LineKey::from(7)` and `LineKey::from("7")` name the same line.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LineKey(String);

impl LineKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LineKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LineKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for LineKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&String> for LineKey {
    fn from(value: &String) -> Self {
        Self(value.clone())
    }
}

macro_rules! line_key_from_int {
    ($($t:ty),*) => {
        $(impl From<$t> for LineKey {
            fn from(value: $t) -> Self {
                Self(value.to_string())
            }
        })*
    };
}

line_key_from_int!(u8, u16, u32, u64, i32, i64, usize);

/// Latest known state of a single vehicle.
///
/// Records are delivered to subscribers as complete snapshots, never as
/// diffs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusRecord {
    pub id: String,
    pub position: Position,
    pub stop_name: String,
    pub line_number: LineKey,
    pub route_name: String,
    pub start_time: String,
    pub end_time: String,
    /// Planned route segment. Never empty.
    pub path: Vec<Position>,
    pub segment_index: i64,
    pub duration: i64,
    pub icon_color: String,
    pub text_color: String,
    /// `#`-prefixed hex stroke color.
    pub path_color: String,
}
