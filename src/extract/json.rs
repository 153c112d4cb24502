//! Recursive candidate search over arbitrary JSON.
//!
//! The upstream API answers with whatever shape its current release happens
//! to produce, so nothing here assumes a schema: every finite number and
//! every numeric-looking string anywhere in the tree becomes a candidate.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use super::{CandidatePool, Origin};
use crate::normalize::normalize_number;

/// Key names that tend to sit on the path to the value we want.
static VALUE_KEY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)value|total|account|worth|robux|inventory|price").expect("value-key regex")
});

pub fn value_like_key(key: &str) -> bool {
    VALUE_KEY_RE.is_match(key)
}

/// Collect numeric candidates from `value` into `pool`, tagging each with a
/// clone of `origin`.
///
/// Object keys matching the value vocabulary are visited first; the remaining
/// keys are scanned afterwards, so the bias changes discovery order but never
/// drops anything. A node of an unexpected type simply contributes nothing —
/// one bad node must not abort the whole search.
pub fn search_json(value: &Value, origin: &Origin, pool: &mut CandidatePool) {
    match value {
        Value::Number(n) => {
            if let Some(v) = n.as_u64() {
                pool.push(v, origin.clone());
            } else if let Some(f) = n.as_f64() {
                // Pool invariant is integral and non-negative: floats are
                // truncated toward zero, negatives dropped.
                if f.is_finite() && f >= 0.0 && f < u64::MAX as f64 {
                    pool.push(f.trunc() as u64, origin.clone());
                }
            }
        }
        Value::String(s) => {
            if let Some(v) = normalize_number(s) {
                pool.push(v, origin.clone());
            }
        }
        Value::Object(map) => {
            for (k, v) in map {
                if value_like_key(k) {
                    search_json(v, origin, pool);
                }
            }
            for (k, v) in map {
                if !value_like_key(k) {
                    search_json(v, origin, pool);
                }
            }
        }
        Value::Array(items) => {
            for v in items {
                search_json(v, origin, pool);
            }
        }
        Value::Null | Value::Bool(_) => {}
    }
}
