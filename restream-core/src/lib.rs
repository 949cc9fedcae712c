//! Stream execution engine: encoder supervision, lifecycle state machine,
//! diagnostic parsing and event fan-out.
//!
//! Data Flow:
//! ```text
//!  StreamService ──► Pipeline::start ──► CommandBuilder ──► EncoderLauncher
//!                          │                                     │
//!                          ▼                                     ▼
//!                   ProcessRegistry ◄──── monitor task ◄── diagnostics (stderr)
//!                                              │
//!                              ┌───────────────┴──────────────┐
//!                              ▼                              ▼
//!                          EventHub                     ActivitySink
//! ```

pub mod activity;
pub mod destination;
pub mod encoder;
pub mod error;
pub mod hub;
pub mod model;
pub mod pipeline;
pub mod registry;
pub mod service;
pub mod stats;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{CommandError, PipelineError, ServiceError};
pub use pipeline::{Pipeline, PipelineOptions};
