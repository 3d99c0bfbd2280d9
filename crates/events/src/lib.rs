//! # klinewatch events
//!
//! This crate defines the user-visible event structures the session engine
//! emits: login notices, connection loss, server-pushed messages and filter
//! detections. It also owns the append-only [`EventLog`] those events land in.
//!
//! As a Layer 0 crate, it depends only on `core-types`.

// Declare the modules that make up this crate.
pub mod error;
pub mod log;
pub mod messages;

// Re-export the core types to provide a clean public API.
pub use error::EventsError;
pub use log::EventLog;
pub use messages::{ClientEvent, DetectionNotice, LogLevel, LogMessage};
