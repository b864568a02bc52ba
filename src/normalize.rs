//! Conversion of positional raw records into [`BusRecord`]s.
//!
//! Each raw record is a fixed-length JSON array whose meaning is defined
//! purely by index. Normalization never fails outright: a record that
//! cannot be read yields [`Normalized::Fallback`] carrying default values
//! and the reason it was rejected.

use serde_json::Value;
use thiserror::Error;

use crate::coords::{self, SENTINEL};
use crate::types::{BusRecord, LineKey};

pub const IDX_LAT: usize = 0;
pub const IDX_LNG: usize = 1;
pub const IDX_ID: usize = 2;
pub const IDX_LINE: usize = 3;
pub const IDX_STOP: usize = 4;
pub const IDX_ROUTE: usize = 5;
pub const IDX_START: usize = 6;
pub const IDX_END: usize = 7;
pub const IDX_ICON_COLOR: usize = 9;
pub const IDX_TEXT_COLOR: usize = 10;
pub const IDX_PATH_COLOR: usize = 11;
pub const IDX_DURATION: usize = 12;
pub const IDX_SEGMENT: usize = 14;
pub const IDX_PATH: usize = 15;

/// Identity used when a malformed record carries no readable id or line.
pub const UNKNOWN: &str = "unknown";

/// Why a raw record could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("raw record is not an array")]
    NotAnArray,

    #[error("raw record has no {field} at index {index}")]
    MissingField { index: usize, field: &'static str },

    #[error("{field} at index {index} is not {expected}")]
    WrongShape {
        index: usize,
        field: &'static str,
        expected: &'static str,
    },
}

/// Outcome of normalizing one raw record.
#[derive(Debug, Clone, PartialEq)]
pub enum Normalized {
    Decoded(BusRecord),
    Fallback { record: BusRecord, error: DecodeError },
}

impl Normalized {
    pub fn record(&self) -> &BusRecord {
        match self {
            Normalized::Decoded(record) => record,
            Normalized::Fallback { record, .. } => record,
        }
    }

    pub fn into_record(self) -> BusRecord {
        match self {
            Normalized::Decoded(record) => record,
            Normalized::Fallback { record, .. } => record,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Normalized::Fallback { .. })
    }

    pub fn error(&self) -> Option<&DecodeError> {
        match self {
            Normalized::Decoded(_) => None,
            Normalized::Fallback { error, .. } => Some(error),
        }
    }
}

/// Normalizes one raw record.
pub fn normalize(raw: &Value) -> Normalized {
    match decode(raw) {
        Ok(record) => Normalized::Decoded(record),
        Err(error) => Normalized::Fallback {
            record: fallback_record(raw),
            error,
        },
    }
}

fn decode(raw: &Value) -> Result<BusRecord, DecodeError> {
    let fields = raw.as_array().ok_or(DecodeError::NotAnArray)?;

    let path_tokens = match fields.get(IDX_PATH) {
        Some(Value::Array(tokens)) => tokens,
        Some(_) => {
            return Err(DecodeError::WrongShape {
                index: IDX_PATH,
                field: "path",
                expected: "an array",
            });
        }
        None => {
            return Err(DecodeError::MissingField {
                index: IDX_PATH,
                field: "path",
            });
        }
    };

    let mut path = coords::decode_path(path_tokens);
    if path.is_empty() {
        path.push(SENTINEL);
    }

    Ok(BusRecord {
        id: text(fields, IDX_ID, "id")?,
        position: coords::decode_primary(fields.get(IDX_LAT), fields.get(IDX_LNG)),
        stop_name: text(fields, IDX_STOP, "stop name")?,
        line_number: LineKey::from(text(fields, IDX_LINE, "line number")?),
        route_name: text(fields, IDX_ROUTE, "route name")?,
        start_time: text(fields, IDX_START, "start time")?,
        end_time: text(fields, IDX_END, "end time")?,
        path,
        segment_index: integer(fields, IDX_SEGMENT, "segment index")?,
        duration: integer(fields, IDX_DURATION, "duration")?,
        icon_color: text(fields, IDX_ICON_COLOR, "icon color")?,
        text_color: text(fields, IDX_TEXT_COLOR, "text color")?,
        path_color: format!("#{}", text(fields, IDX_PATH_COLOR, "path color")?),
    })
}

fn text(fields: &[Value], index: usize, field: &'static str) -> Result<String, DecodeError> {
    match fields.get(index) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(Value::Bool(b)) => Ok(b.to_string()),
        Some(Value::Null) => Ok(String::new()),
        Some(_) => Err(DecodeError::WrongShape {
            index,
            field,
            expected: "a scalar",
        }),
        None => Err(DecodeError::MissingField { index, field }),
    }
}

/// Reads an integer field. Floats and numeric strings are truncated; any
/// other present value (blank, unparsable text, booleans, nested values)
/// reads as 0. Only a missing index is an error.
fn integer(fields: &[Value], index: usize, field: &'static str) -> Result<i64, DecodeError> {
    let value = fields
        .get(index)
        .ok_or(DecodeError::MissingField { index, field })?;

    let parsed = match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>().ok().or_else(|| {
                s.parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite())
                    .map(|f| f.trunc() as i64)
            })
        }
        _ => None,
    };
    Ok(parsed.unwrap_or(0))
}

/// Builds the default record for a raw value that failed to decode,
/// keeping whatever id and line number are readable.
pub fn fallback_record(raw: &Value) -> BusRecord {
    let fields = raw.as_array().map(Vec::as_slice).unwrap_or_default();
    let known = |index: usize| {
        coords::token_text(fields.get(index)).unwrap_or_else(|| UNKNOWN.to_string())
    };

    BusRecord {
        id: known(IDX_ID),
        position: SENTINEL,
        stop_name: "Unknown Stop".to_string(),
        line_number: LineKey::from(known(IDX_LINE)),
        route_name: "Unknown Route".to_string(),
        start_time: "00:00".to_string(),
        end_time: "00:00".to_string(),
        path: vec![SENTINEL],
        segment_index: 0,
        duration: 0,
        icon_color: "grey".to_string(),
        text_color: "black".to_string(),
        path_color: "#000000".to_string(),
    }
}
