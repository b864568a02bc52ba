//! Fixed-prefix coordinate decoding.
//!
//! The upstream only transmits the digits that vary inside the service
//! area. Latitudes are the fractional part after `28.` and longitudes the
//! digits after `-15.4`, so the full coordinate is rebuilt by prepending
//! those prefixes to the raw token and parsing the result.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Prefix restored in front of every latitude token.
pub const LAT_PREFIX: &str = "28.";
/// Prefix restored in front of every longitude token.
pub const LNG_PREFIX: &str = "-15.4";

/// Coordinate used whenever a position cannot be decoded.
pub const SENTINEL: Position = Position { lat: 28.0, lng: -15.4 };

/// A WGS84 coordinate in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub lat: f64,
    pub lng: f64,
}

impl Position {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// `false` when either component decoded to `NaN` or an infinity.
    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lng.is_finite()
    }
}

/// Returns the textual form of a raw token, or `None` when the token is
/// missing (`null`, empty string, or not a scalar).
pub fn token_text(token: Option<&Value>) -> Option<String> {
    match token? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Decodes one truncated latitude/longitude pair.
///
/// Returns `None` if either token is missing. A token that does not form a
/// number after prefixing is not rejected: the longest numeric prefix wins,
/// and `NaN` is produced only when nothing parses.
pub fn decode_position(lat: Option<&Value>, lng: Option<&Value>) -> Option<Position> {
    let lat = token_text(lat)?;
    let lng = token_text(lng)?;

    Some(Position {
        lat: parse_float_prefix(&format!("{LAT_PREFIX}{lat}")),
        lng: parse_float_prefix(&format!("{LNG_PREFIX}{lng}")),
    })
}

/// Decodes the primary position of a record, falling back to [`SENTINEL`].
pub fn decode_primary(lat: Option<&Value>, lng: Option<&Value>) -> Position {
    decode_position(lat, lng).unwrap_or(SENTINEL)
}

/// Decodes a flattened `[lat, lng, lat, lng, ...]` token sequence.
///
/// Pairs with a missing token are skipped, as is a trailing unpaired token.
/// The result may be empty.
pub fn decode_path(tokens: &[Value]) -> Vec<Position> {
    tokens
        .chunks_exact(2)
        .filter_map(|pair| decode_position(pair.first(), pair.get(1)))
        .collect()
}

/// Parses the longest leading substring of `s` that forms a decimal float.
///
/// Accepts an optional sign, digits with at most one decimal point, and an
/// exponent that is only consumed when followed by a digit. Returns `NaN`
/// when no digit is found.
pub fn parse_float_prefix(s: &str) -> f64 {
    let s = s.trim_start();
    let bytes = s.as_bytes();
    let mut i = 0;

    let negative = match bytes.first() {
        Some(b'-') => {
            i += 1;
            true
        }
        Some(b'+') => {
            i += 1;
            false
        }
        _ => false,
    };

    let int_start = i;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    let int_part = &s[int_start..i];

    let mut frac_part = "";
    if i < bytes.len() && bytes[i] == b'.' {
        let frac_start = i + 1;
        let mut j = frac_start;
        while j < bytes.len() && bytes[j].is_ascii_digit() {
            j += 1;
        }
        frac_part = &s[frac_start..j];
        i = j;
    }

    if int_part.is_empty() && frac_part.is_empty() {
        return f64::NAN;
    }

    let mut exponent = String::new();
    if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
        let mut j = i + 1;
        let mut exp_sign = "";
        if j < bytes.len() && (bytes[j] == b'-' || bytes[j] == b'+') {
            exp_sign = if bytes[j] == b'-' { "-" } else { "" };
            j += 1;
        }
        let exp_start = j;
        while j < bytes.len() && bytes[j].is_ascii_digit() {
            j += 1;
        }
        if j > exp_start {
            exponent = format!("e{exp_sign}{}", &s[exp_start..j]);
        }
    }

    let int_part = if int_part.is_empty() { "0" } else { int_part };
    let frac_part = if frac_part.is_empty() { "0" } else { frac_part };
    let sign = if negative { "-" } else { "" };

    format!("{sign}{int_part}.{frac_part}{exponent}")
        .parse()
        .unwrap_or(f64::NAN)
}
