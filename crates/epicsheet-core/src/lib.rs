//! epicsheet-core library.
//!
//! A schema-versioned data-access layer that treats a spreadsheet as a small
//! project-tracking database: epics, their current status, an append-only
//! log of status updates partitioned by creation quarter, and a metadata
//! sheet carrying the schema version.
//!
//! # Conventions
//!
//! - **Errors**: library operations return [`error::StoreError`]; binaries use
//!   `anyhow::Result` at the edges.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `error!`, `debug!`, `trace!`).

pub mod backend;
pub mod cache;
pub mod config;
pub mod error;
pub mod log_reader;
pub mod model;
pub mod quarter;
pub mod query;
pub mod sheet;
pub mod store;
pub mod table;
pub mod version;
pub mod workflow;

pub use error::{ErrorCode, StoreError};
pub use store::EpicStore;
