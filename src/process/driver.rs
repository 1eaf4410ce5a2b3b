// src/process/driver.rs

use crate::config::CreateMode;
use crate::error::{IngestError, RunFailure};
use crate::process::chunk::Batch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Destination side of a run: defines the table once, then takes batches.
pub trait Materializer {
    /// Name of the destination table.
    fn table(&self) -> &str;

    /// Define the table structure from `batch` according to `mode`.
    fn establish(&mut self, batch: &Batch, mode: CreateMode) -> Result<(), IngestError>;

    /// Insert every record of `batch` as one unit of work; returns rows written.
    fn append(&mut self, batch: &Batch) -> Result<u64, IngestError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    NotStarted,
    Establishing,
    Appending,
    Done,
}

/// Outcome of a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub table: String,
    pub batches: usize,
    pub rows: u64,
    /// Rows dropped by the decoder under the skip policy.
    pub skipped: u64,
}

/// Moves batches into a [`Materializer`]: the first batch establishes the
/// table, every batch (the first included) is appended.
pub struct Ingestor<'a, M> {
    sink: &'a mut M,
    mode: CreateMode,
    state: DriverState,
    pulled: usize,
    batches: usize,
    rows_committed: u64,
    cancel: CancellationToken,
}

impl<'a, M: Materializer> Ingestor<'a, M> {
    pub fn new(sink: &'a mut M, mode: CreateMode) -> Self {
        Self {
            sink,
            mode,
            state: DriverState::NotStarted,
            pulled: 0,
            batches: 0,
            rows_committed: 0,
            cancel: CancellationToken::new(),
        }
    }

    /// Stop between batches once `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn rows_committed(&self) -> u64 {
        self.rows_committed
    }

    fn step(&mut self, batch: &Batch) -> Result<(), IngestError> {
        if self.state == DriverState::NotStarted {
            self.state = DriverState::Establishing;
            self.sink.establish(batch, self.mode)?;
            info!(table = %self.sink.table(), mode = ?self.mode, "table established");
            self.state = DriverState::Appending;
        }

        let written = self.sink.append(batch)?;
        self.batches += 1;
        self.rows_committed += written;
        info!(
            batch = batch.index(),
            rows = written,
            total = self.rows_committed,
            "inserted"
        );
        Ok(())
    }

    fn fail(&mut self, batch: usize, source: IngestError) -> RunFailure {
        self.state = DriverState::Done;
        warn!(
            table = %self.sink.table(),
            batch,
            rows_committed = self.rows_committed,
            error = %source,
            "run aborted"
        );
        RunFailure {
            table: self.sink.table().to_string(),
            batch,
            rows_committed: self.rows_committed,
            skipped: 0,
            source,
        }
    }

    /// Drain `batches` into the sink. Stops at the first error; rows from
    /// batches appended before it stay in the destination.
    pub fn run<I>(&mut self, batches: I) -> Result<RunSummary, RunFailure>
    where
        I: IntoIterator<Item = Result<Batch, IngestError>>,
    {
        let mut batches = batches.into_iter();
        loop {
            if self.cancel.is_cancelled() {
                return Err(self.fail(self.pulled, IngestError::Cancelled));
            }
            let batch = match batches.next() {
                None => break,
                Some(Err(err)) => return Err(self.fail(self.pulled, err)),
                Some(Ok(batch)) => batch,
            };
            self.pulled += 1;
            debug!(batch = batch.index(), offset = batch.offset(), "pulled");

            if let Err(err) = self.step(&batch) {
                return Err(self.fail(batch.index(), err));
            }
        }

        if self.state == DriverState::NotStarted {
            warn!(table = %self.sink.table(), "source has no rows; destination left untouched");
        }
        self.state = DriverState::Done;
        Ok(RunSummary {
            table: self.sink.table().to_string(),
            batches: self.batches,
            rows: self.rows_committed,
            skipped: 0,
        })
    }
}
