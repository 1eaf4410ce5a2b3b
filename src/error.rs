// src/error.rs

use crate::schema::SemanticType;
use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Everything that can stop an ingestion run. None of these are retried.
#[derive(Debug, Error)]
pub enum IngestError {
    /// A field could not be read as its declared semantic type.
    #[error("line {line}, column `{column}`: cannot read {value:?} as {expected}")]
    Decode {
        line: u64,
        column: String,
        value: String,
        expected: SemanticType,
    },

    /// The delimited text itself is malformed (bad quoting, ragged rows, bad header).
    #[error("line {line}: malformed row: {reason}")]
    MalformedRow { line: u64, reason: String },

    /// The source or the destination could not be reached.
    #[error("cannot reach {target}")]
    Connectivity {
        target: String,
        #[source]
        source: BoxError,
    },

    /// The destination table is incompatible with the batch or the create mode.
    #[error("table `{table}`: {reason}")]
    SchemaConflict { table: String, reason: String },

    /// The destination rejected a row.
    #[error("table `{table}` rejected a row")]
    Constraint {
        table: String,
        #[source]
        source: duckdb::Error,
    },

    #[error("database error")]
    Database(#[source] duckdb::Error),

    #[error("run cancelled")]
    Cancelled,
}

impl IngestError {
    /// True for failures caused by source content rather than the destination.
    pub fn is_decode(&self) -> bool {
        matches!(
            self,
            IngestError::Decode { .. } | IngestError::MalformedRow { .. }
        )
    }

    /// Sort a DuckDB failure into the error kind it represents.
    pub fn from_duckdb(table: &str, err: duckdb::Error) -> Self {
        // Statements report "Constraint Error: ..."; the appender reports
        // "Failed to append: NOT NULL constraint failed: ...".
        let message = err.to_string().to_ascii_lowercase();
        if message.contains("constraint error") || message.contains("constraint failed") {
            IngestError::Constraint {
                table: table.to_string(),
                source: err,
            }
        } else if message.contains("io error") || message.contains("connection error") {
            IngestError::Connectivity {
                target: format!("database holding `{}`", table),
                source: Box::new(err),
            }
        } else {
            IngestError::Database(err)
        }
    }
}

/// A failed run: which batch was in flight and how much was already committed.
#[derive(Debug, Error)]
#[error("ingestion into `{table}` aborted in batch {batch} after {rows_committed} committed rows ({skipped} skipped)")]
pub struct RunFailure {
    pub table: String,
    pub batch: usize,
    pub rows_committed: u64,
    /// Rows dropped under the skip decode policy before the failure.
    pub skipped: u64,
    #[source]
    pub source: IngestError,
}
