//! Best-effort extraction of coordinates from raw activity streams.
//!
//! A stream payload is a JSON array of `{ "type": ..., "data": [...] }`
//! records. Only `latlng` records contribute; anything else, including
//! malformed records and malformed pairs, is skipped silently.

use serde_json::Value;
use tracing::debug;

use super::Coordinate;

const LATLNG_STREAM: &str = "latlng";

/// Parse every valid `[lat, lon]` pair from `raw`.
pub fn parse_latlng_stream(raw: &[u8]) -> Vec<Coordinate> {
    let document: Value = match serde_json::from_slice(raw) {
        Ok(document) => document,
        Err(err) => {
            debug!(error = %err, "skipping undecodable activity stream");
            return Vec::new();
        }
    };

    let records: Vec<&Value> = match &document {
        Value::Array(records) => records.iter().collect(),
        Value::Object(_) => vec![&document],
        _ => Vec::new(),
    };

    records
        .into_iter()
        .filter(|record| record.get("type").and_then(Value::as_str) == Some(LATLNG_STREAM))
        .filter_map(|record| record.get("data").and_then(Value::as_array))
        .flatten()
        .filter_map(parse_pair)
        .collect()
}

fn parse_pair(value: &Value) -> Option<Coordinate> {
    let [lat, lon] = value.as_array()?.as_slice() else {
        return None;
    };
    Coordinate::new(lat.as_f64()?, lon.as_f64()?)
}
