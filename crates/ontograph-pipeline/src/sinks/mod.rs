//! Commit sink implementations.
//!
//! `http` talks the bulk-loader and bulk-upsert wire protocols of the real
//! stores; `memory` provides scripted in-process sinks for tests and the
//! CLI demo path.

pub mod http;
pub mod memory;

pub use http::{HttpGraphSink, HttpVectorSink};
pub use memory::{MemoryGraphSink, MemoryVectorSink};
