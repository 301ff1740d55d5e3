//! Per-generation heap statistics.
//!
//! Data sources hand over each generation of each isolate as an opaque JSON
//! object. [`HeapSpaceSnapshot::parse`] pulls the three byte counts the
//! aggregator cares about out of it and ignores everything else.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// A raw per-generation heap record as delivered by a data source.
///
/// Must contain numeric `used`, `capacity` and `external` fields; any other
/// fields (generation name, collection counts, timings) are ignored.
pub type RawHeapRecord = Value;

/// Heap statistics for one generation of one isolate at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct HeapSpaceSnapshot {
    /// Bytes currently allocated in this generation.
    pub used: i64,
    /// Bytes reserved for this generation.
    pub capacity: i64,
    /// Bytes held outside the managed heap by objects in this generation.
    pub external: i64,
}

impl HeapSpaceSnapshot {
    /// Build a snapshot from already-validated byte counts.
    pub fn new(used: i64, capacity: i64, external: i64) -> Self {
        Self {
            used,
            capacity,
            external,
        }
    }

    /// Parse one raw heap record.
    ///
    /// Fails with [`Error::MalformedSnapshot`] if the record is not an object,
    /// or if any of the three fields is missing, non-numeric, fractional or
    /// negative.
    pub fn parse(raw: &RawHeapRecord) -> Result<Self> {
        let Some(obj) = raw.as_object() else {
            return Err(Error::MalformedSnapshot {
                field: "<record>",
                problem: format!("is not an object (got {})", json_kind(raw)),
            });
        };

        let field = |name: &'static str| -> Result<i64> {
            match obj.get(name) {
                Some(v) => byte_count(name, v),
                None => Err(Error::MalformedSnapshot {
                    field: name,
                    problem: "is missing".to_string(),
                }),
            }
        };

        Ok(Self {
            used: field("used")?,
            capacity: field("capacity")?,
            external: field("external")?,
        })
    }
}

/// Parse every generation of one isolate, keeping the ones that parse.
///
/// The second element holds the errors for the generations that were skipped;
/// callers decide how loudly to report them.
pub fn parse_generations(raw: &[RawHeapRecord]) -> (Vec<HeapSpaceSnapshot>, Vec<Error>) {
    let mut parsed = Vec::with_capacity(raw.len());
    let mut errors = Vec::new();
    for record in raw {
        match HeapSpaceSnapshot::parse(record) {
            Ok(snapshot) => parsed.push(snapshot),
            Err(e) => errors.push(e),
        }
    }
    (parsed, errors)
}

fn byte_count(name: &'static str, value: &Value) -> Result<i64> {
    let malformed = |problem: String| Error::MalformedSnapshot {
        field: name,
        problem,
    };

    let n = if let Some(n) = value.as_i64() {
        n
    } else if let Some(f) = value.as_f64() {
        // Some runtimes encode every number as a double.
        if !f.is_finite() || f.fract() != 0.0 || f.abs() >= i64::MAX as f64 {
            return Err(malformed(format!("is not a whole i64 byte count ({f})")));
        }
        f as i64
    } else {
        return Err(malformed(format!("is not numeric (got {})", json_kind(value))));
    };

    if n < 0 {
        return Err(malformed(format!("is negative ({n})")));
    }
    Ok(n)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
