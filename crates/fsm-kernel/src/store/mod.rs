//! Store interface consumed by workloads
//!
//! Workloads never talk to a database directly; they go through
//! [`DocumentStore`]. The harness ships [`MemoryStore`] for simulation and
//! tests; a real deployment plugs in its own client.

pub mod memory;

pub use memory::{MemoryStore, TtlMonitor, DEFAULT_TTL_MONITOR_PERIOD};

use crate::error::StoreError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// A single field value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Bool(bool),
    Int(i64),
    Str(String),
    Timestamp(DateTime<Utc>),
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Timestamp(value)
    }
}

/// Flat document: field name to value
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Document(BTreeMap<String, FieldValue>);

impl Document {
    /// Empty document
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style field setter
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.0.insert(field.into(), value.into());
        self
    }

    /// Value of `field`, if set
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.0.get(field)
    }

    /// Number of fields
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// No fields set
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Conjunction of field equality clauses; empty matches everything
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Filter(BTreeMap<String, FieldValue>);

impl Filter {
    /// Matches every document
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Filter on `field == value`
    #[must_use]
    pub fn field(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self::all().and(field, value)
    }

    /// Also require `field == value`
    #[must_use]
    pub fn and(mut self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.0.insert(field.into(), value.into());
        self
    }

    /// All clauses hold for `doc`
    #[must_use]
    pub fn matches(&self, doc: &Document) -> bool {
        self.0
            .iter()
            .all(|(field, expected)| doc.get(field) == Some(expected))
    }
}

/// Index key direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum IndexOrder {
    Ascending,
    Descending,
}

/// Index definition, optionally with a TTL
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexSpec {
    /// Indexed fields in key order
    pub keys: Vec<(String, IndexOrder)>,
    /// TTL for documents whose first key is a date
    #[serde(rename = "expireAfterSeconds", skip_serializing_if = "Option::is_none")]
    pub expire_after_seconds: Option<u64>,
}

impl IndexSpec {
    /// Single-field ascending index
    #[must_use]
    pub fn ascending(field: impl Into<String>) -> Self {
        Self {
            keys: vec![(field.into(), IndexOrder::Ascending)],
            expire_after_seconds: None,
        }
    }

    /// Attach a TTL in seconds
    #[must_use]
    pub fn expire_after(mut self, seconds: u64) -> Self {
        self.expire_after_seconds = Some(seconds);
        self
    }

    /// Conventional name, e.g. `indexed_insert_ttl_1`
    #[must_use]
    pub fn name(&self) -> String {
        self.keys
            .iter()
            .map(|(field, order)| match order {
                IndexOrder::Ascending => format!("{field}_1"),
                IndexOrder::Descending => format!("{field}_-1"),
            })
            .collect::<Vec<_>>()
            .join("_")
    }

    /// The field a TTL applies to: TTL indexes are single-field
    #[must_use]
    pub fn ttl_field(&self) -> Option<(&str, u64)> {
        match (self.keys.as_slice(), self.expire_after_seconds) {
            ([(field, _)], Some(secs)) => Some((field.as_str(), secs)),
            _ => None,
        }
    }
}

/// Store acknowledgement of an insert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InsertResult {
    /// Documents written
    #[serde(rename = "nInserted")]
    pub n_inserted: u64,
}

/// The narrow store surface a workload may use.
#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert one document into `collection`
    async fn insert(&self, collection: &str, document: Document)
        -> Result<InsertResult, StoreError>;

    /// Create an index; re-creating an identical index is a no-op
    async fn create_index(&self, collection: &str, spec: IndexSpec) -> Result<(), StoreError>;

    /// Count documents in `collection` matching `filter`
    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError>;
}
