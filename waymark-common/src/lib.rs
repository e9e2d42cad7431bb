//! Shared types for the waymark routing engine.
//!
//! Lives in its own crate so the offline pipeline, the query engine and any
//! future tooling agree on one error taxonomy without pulling in the engine.

pub mod error;

pub use error::{EngineError, Result, Status};
