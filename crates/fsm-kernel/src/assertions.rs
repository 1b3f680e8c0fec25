//! Fatal assertions used by state functions
//!
//! Failures carry the serialized store result so the report shows exactly
//! what the store acknowledged.

use crate::error::AssertionError;
use crate::store::InsertResult;
use serde::Serialize;

/// Fail unless `actual == expected`, dumping `context` as JSON
pub fn assert_eq_with<T, C>(expected: T, actual: T, what: &str, context: &C) -> Result<(), AssertionError>
where
    T: PartialEq + std::fmt::Debug,
    C: Serialize + ?Sized,
{
    if expected == actual {
        return Ok(());
    }
    let dump = serde_json::to_string(context).unwrap_or_else(|e| format!("<unserializable: {e}>"));
    Err(AssertionError::new(format!(
        "{what}: expected {expected:?}, got {actual:?}: {dump}"
    )))
}

/// The insert must have stored exactly `expected` documents
pub fn assert_inserted(expected: u64, result: &InsertResult) -> Result<(), AssertionError> {
    assert_eq_with(expected, result.n_inserted, "unexpected insert count", result)
}
