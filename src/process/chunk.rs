// src/process/chunk.rs

use crate::error::IngestError;
use crate::process::decode::Record;
use crate::schema::TableSchema;
use std::{num::NonZeroUsize, sync::Arc};
use tracing::trace;

/// Upper bound on the records reserved up front for one batch.
const MAX_PREALLOC: usize = 1 << 16;

/// A bounded run of consecutive records, loaded as one unit.
#[derive(Debug)]
pub struct Batch {
    index: usize,
    offset: u64,
    schema: Arc<TableSchema>,
    records: Vec<Record>,
}

impl Batch {
    pub fn new(index: usize, offset: u64, schema: Arc<TableSchema>, records: Vec<Record>) -> Self {
        Self {
            index,
            offset,
            schema,
            records,
        }
    }

    /// Position of this batch in the run, starting at 0.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Number of records emitted before this batch.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn schema(&self) -> &Arc<TableSchema> {
        &self.schema
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Groups a record stream into batches of at most `chunk_size`.
///
/// Single pass: after the upstream is exhausted or fails, the source is fused.
/// Records of a batch that hits an upstream error are dropped with it.
pub struct BatchSource<I> {
    rows: I,
    schema: Arc<TableSchema>,
    chunk_size: usize,
    next_index: usize,
    emitted: u64,
    done: bool,
}

impl<I> BatchSource<I>
where
    I: Iterator<Item = Result<Record, IngestError>>,
{
    pub fn new(rows: I, schema: Arc<TableSchema>, chunk_size: NonZeroUsize) -> Self {
        Self {
            rows,
            schema,
            chunk_size: chunk_size.get(),
            next_index: 0,
            emitted: 0,
            done: false,
        }
    }

    /// Records handed out in batches so far.
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    pub fn rows(&self) -> &I {
        &self.rows
    }
}

impl<I> Iterator for BatchSource<I>
where
    I: Iterator<Item = Result<Record, IngestError>>,
{
    type Item = Result<Batch, IngestError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let mut records = Vec::with_capacity(self.chunk_size.min(MAX_PREALLOC));
        while records.len() < self.chunk_size {
            match self.rows.next() {
                Some(Ok(record)) => records.push(record),
                Some(Err(err)) => {
                    self.done = true;
                    return Some(Err(err));
                }
                None => {
                    self.done = true;
                    break;
                }
            }
        }
        if records.is_empty() {
            return None;
        }

        let batch = Batch::new(self.next_index, self.emitted, self.schema.clone(), records);
        trace!(index = batch.index(), rows = batch.len(), "batch ready");
        self.next_index += 1;
        self.emitted += batch.len() as u64;
        Some(Ok(batch))
    }
}
