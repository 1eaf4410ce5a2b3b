// src/schema/registry.rs

use super::types::{SchemaEntry, SemanticType};
use SemanticType::*;

/// Which dataset a run ingests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    /// Yellow taxi trip records, one file per year/month.
    Trips,
    /// The static taxi zone lookup table.
    Zones,
}

static TRIP_COLUMNS: &[(&str, SemanticType)] = &[
    ("VendorID", NullableInt64),
    ("tpep_pickup_datetime", Timestamp),
    ("tpep_dropoff_datetime", Timestamp),
    ("passenger_count", NullableInt64),
    ("trip_distance", Float64),
    ("RatecodeID", NullableInt64),
    ("store_and_fwd_flag", Utf8Text),
    ("PULocationID", NullableInt64),
    ("DOLocationID", NullableInt64),
    ("payment_type", NullableInt64),
    ("fare_amount", Float64),
    ("extra", Float64),
    ("mta_tax", Float64),
    ("tip_amount", Float64),
    ("tolls_amount", Float64),
    ("improvement_surcharge", Float64),
    ("total_amount", Float64),
    ("congestion_surcharge", Float64),
];

static ZONE_COLUMNS: &[(&str, SemanticType)] = &[
    ("LocationID", NullableInt64),
    ("Borough", Utf8Text),
    ("Zone", Utf8Text),
    ("service_zone", Utf8Text),
];

impl SourceKind {
    fn columns(self) -> &'static [(&'static str, SemanticType)] {
        match self {
            SourceKind::Trips => TRIP_COLUMNS,
            SourceKind::Zones => ZONE_COLUMNS,
        }
    }

    /// Ordered schema entries for this source.
    pub fn entries(self) -> Vec<SchemaEntry> {
        self.columns()
            .iter()
            .map(|&(name, ty)| SchemaEntry::new(name, ty))
            .collect()
    }

    /// Names of the columns parsed as timestamps.
    pub fn timestamp_columns(self) -> Vec<&'static str> {
        self.columns()
            .iter()
            .filter(|(_, ty)| *ty == Timestamp)
            .map(|&(name, _)| name)
            .collect()
    }

    pub fn lookup(self, column: &str) -> Option<SchemaEntry> {
        self.columns()
            .iter()
            .find(|(name, _)| *name == column)
            .map(|&(name, ty)| SchemaEntry::new(name, ty))
    }
}
