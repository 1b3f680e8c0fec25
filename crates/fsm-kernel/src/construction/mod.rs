//! Construction Phase
//!
//! Descriptors are built and validated here, before any hook or worker runs.
//! The driver only accepts `WorkloadDescriptor` values that came out of
//! `WorkloadBuilder::build`.

pub mod builder;
pub mod validator;

pub use builder::{WorkloadBuilder, WorkloadDescriptor};
pub use validator::validate_descriptor;
