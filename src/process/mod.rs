// src/process/mod.rs
pub mod chunk;
pub mod date_parser;
pub mod decode;
pub mod driver;

pub use chunk::{Batch, BatchSource};
pub use decode::{Record, RowDecoder, Value};
pub use driver::{DriverState, Ingestor, Materializer, RunSummary};

use crate::config::IngestConfig;
use crate::error::RunFailure;
use std::io::Read;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Decode `source` according to `config` and load it through `sink`,
/// one batch of `config.chunk_size` rows at a time.
///
/// Blocking: every batch pull reads from `source` and every append waits
/// on the destination. Run it on a blocking thread from async code.
#[tracing::instrument(level = "info", skip_all, fields(table = %config.table, kind = ?config.kind))]
pub fn ingest<R, M>(
    source: R,
    config: &IngestConfig,
    sink: &mut M,
    cancel: CancellationToken,
) -> Result<RunSummary, RunFailure>
where
    R: Read,
    M: Materializer,
{
    let decoder = RowDecoder::new(
        source,
        config.kind,
        config.unknown_columns,
        config.decode_policy,
    )
    .map_err(|source| RunFailure {
        table: config.table.clone(),
        batch: 0,
        rows_committed: 0,
        skipped: 0,
        source,
    })?;

    let schema = decoder.schema().clone();
    let mut batches = BatchSource::new(decoder, schema, config.chunk_size);
    let outcome = Ingestor::new(sink, config.mode)
        .with_cancellation(cancel)
        .run(batches.by_ref());
    let skipped = batches.rows().skipped();
    let mut summary = outcome.map_err(|mut failure| {
        failure.skipped = skipped;
        if skipped > 0 {
            warn!(skipped, "rows skipped before the run aborted");
        }
        failure
    })?;
    summary.skipped = skipped;

    info!(
        batches = summary.batches,
        rows = summary.rows,
        skipped = summary.skipped,
        "ingestion complete"
    );
    Ok(summary)
}
