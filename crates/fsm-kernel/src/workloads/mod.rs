//! Workloads shipped with the harness

pub mod indexed_insert_ttl;

pub use indexed_insert_ttl::IndexedInsertTtl;
