//! JSON parser for raw vehicle batches.

use anyhow::{Context, Result};
use serde_json::Value;

/// Decodes a response body into its raw vehicle records.
///
/// Records are left untyped; [`crate::normalize`] interprets them.
///
/// # Errors
///
/// Returns an error if the body is not JSON or not a JSON array.
pub fn parse_batch(bytes: &[u8]) -> Result<Vec<Value>> {
    let value: Value = serde_json::from_slice(bytes).context("feed body is not valid JSON")?;
    match value {
        Value::Array(records) => Ok(records),
        other => anyhow::bail!("feed body is not a JSON array (got {})", kind(&other)),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
