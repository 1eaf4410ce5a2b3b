// src/config.rs

use crate::fetch::urls;
use crate::schema::SourceKind;
use clap::ValueEnum;
use std::num::NonZeroUsize;

pub const DEFAULT_CHUNK_SIZE: NonZeroUsize = match NonZeroUsize::new(100_000) {
    Some(n) => n,
    None => panic!("chunk size must be non-zero"),
};

/// What `establish` does when the destination table already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum CreateMode {
    /// Drop and recreate.
    #[default]
    Replace,
    /// Keep the existing table and append to it.
    Append,
    /// Refuse to run.
    Fail,
}

/// What the decoder does with a row that does not match its schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum DecodePolicy {
    /// Stop the run on the first bad row.
    #[default]
    Abort,
    /// Log the row and carry on.
    Skip,
}

/// How header columns missing from the registry are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum UnknownColumns {
    /// Load them as nullable text.
    #[default]
    Pass,
    /// Treat them as a decode failure.
    Reject,
}

/// Immutable settings for one ingestion run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestConfig {
    pub kind: SourceKind,
    /// URL or local path of the delimited source.
    pub location: String,
    /// Destination table name, already expanded.
    pub table: String,
    pub chunk_size: NonZeroUsize,
    pub mode: CreateMode,
    pub decode_policy: DecodePolicy,
    pub unknown_columns: UnknownColumns,
}

impl IngestConfig {
    /// Trip data for one month: `<target_table>_<year>_<month:02>`.
    pub fn trips(year: u16, month: u8, target_table: &str) -> Self {
        Self::new(
            SourceKind::Trips,
            urls::trip_data_url(year, month),
            format!("{}_{}_{:02}", target_table, year, month),
        )
    }

    /// The zone lookup table, loaded under a fixed name.
    pub fn zones(target_table: &str) -> Self {
        Self::new(
            SourceKind::Zones,
            urls::ZONE_LOOKUP_URL.to_string(),
            target_table.to_string(),
        )
    }

    fn new(kind: SourceKind, location: String, table: String) -> Self {
        Self {
            kind,
            location,
            table,
            chunk_size: DEFAULT_CHUNK_SIZE,
            mode: CreateMode::default(),
            decode_policy: DecodePolicy::default(),
            unknown_columns: UnknownColumns::default(),
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: NonZeroUsize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_mode(mut self, mode: CreateMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_decode_policy(mut self, policy: DecodePolicy) -> Self {
        self.decode_policy = policy;
        self
    }

    pub fn with_unknown_columns(mut self, unknown: UnknownColumns) -> Self {
        self.unknown_columns = unknown;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trip_table_name_pads_month() {
        let cfg = IngestConfig::trips(2021, 1, "yellow_taxi_data");
        assert_eq!(cfg.table, "yellow_taxi_data_2021_01");
        assert_eq!(cfg.kind, SourceKind::Trips);
        assert!(cfg.location.ends_with("yellow_tripdata_2021-01.csv.gz"));
        assert_eq!(cfg.chunk_size.get(), 100_000);
        assert_eq!(cfg.mode, CreateMode::Replace);
        assert_eq!(cfg.decode_policy, DecodePolicy::Abort);
    }

    #[test]
    fn zone_table_name_is_fixed() {
        let cfg = IngestConfig::zones("zones")
            .with_mode(CreateMode::Fail)
            .with_location("/tmp/zones.csv");
        assert_eq!(cfg.table, "zones");
        assert_eq!(cfg.location, "/tmp/zones.csv");
        assert_eq!(cfg.mode, CreateMode::Fail);
    }
}
