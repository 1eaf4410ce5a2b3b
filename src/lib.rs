//! Streams NYC taxi CSV data into DuckDB in fixed-size batches.

pub mod config;
pub mod duck;
pub mod error;
pub mod fetch;
pub mod process;
pub mod schema;

pub use config::{CreateMode, DecodePolicy, IngestConfig, UnknownColumns};
pub use error::{IngestError, RunFailure};
pub use process::{ingest, RunSummary};
