//! # Saving Willy Common Library
//!
//! Shared code for the observation ingest service and its tooling:
//! - Configuration error type and result alias
//! - Configuration loading (CLI → ENV → TOML → defaults)
//! - In-memory log ring buffer fed by `tracing`
//! - Workflow event types and the broadcast event bus

pub mod config;
pub mod error;
pub mod events;
pub mod log_buffer;

pub use error::{Error, Result};
