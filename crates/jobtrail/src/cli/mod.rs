//! CLI command implementations, one module per pipeline stage.

pub mod admin;
pub mod digest;
pub mod snapshot;
pub mod worker;
