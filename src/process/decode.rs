// src/process/decode.rs

use crate::config::{DecodePolicy, UnknownColumns};
use crate::error::IngestError;
use crate::process::date_parser;
use crate::schema::{SchemaEntry, SemanticType, SourceKind, TableSchema};
use chrono::NaiveDateTime;
use csv::{ReaderBuilder, StringRecord};
use std::{collections::HashSet, io::Read, sync::Arc};
use tracing::{debug, warn};

/// One decoded field.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int64(i64),
    Float64(f64),
    Text(String),
    Timestamp(NaiveDateTime),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

/// One decoded row, positionally aligned with the decoder's [`TableSchema`].
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    line: u64,
    values: Vec<Value>,
}

impl Record {
    pub fn new(line: u64, values: Vec<Value>) -> Self {
        Self { line, values }
    }

    /// Line of the source file this row came from (header is line 1).
    pub fn line(&self) -> u64 {
        self.line
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn get(&self, idx: usize) -> Option<&Value> {
        self.values.get(idx)
    }
}

fn parse_int(s: &str) -> Option<i64> {
    s.parse::<i64>().ok().or_else(|| {
        // Integral floats such as "1.0" show up in some monthly files.
        s.parse::<f64>()
            .ok()
            .filter(|f| f.is_finite() && f.fract() == 0.0 && f.abs() < 9.0e18)
            .map(|f| f as i64)
    })
}

/// Missing-value markers the monthly exports use in typed columns.
const NA_MARKERS: &[&str] = &[
    "#N/A", "#N/A N/A", "#NA", "-NaN", "-nan", "<NA>", "N/A", "NA", "NULL", "NaN", "None",
    "n/a", "nan", "null",
];

fn is_na_marker(s: &str) -> bool {
    s.is_empty() || NA_MARKERS.contains(&s)
}

fn parse_float(s: &str) -> Option<f64> {
    // "inf" and friends parse as f64 but are not data.
    s.parse::<f64>().ok().filter(|f| f.is_finite())
}

/// Convert one raw field into `ty`. `None` means the text is not a valid `ty`.
///
/// Numeric and timestamp fields are trimmed, and a blank field or a missing
/// value marker such as `NaN` or `NULL` becomes [`Value::Null`]. Text is kept
/// as-is; only an empty text field is null.
pub fn decode_field(raw: &str, ty: SemanticType) -> Option<Value> {
    let trimmed = raw.trim();
    match ty {
        SemanticType::Utf8Text if raw.is_empty() => Some(Value::Null),
        SemanticType::Utf8Text => Some(Value::Text(raw.to_string())),
        _ if is_na_marker(trimmed) => Some(Value::Null),
        SemanticType::NullableInt64 => parse_int(trimmed).map(Value::Int64),
        SemanticType::Float64 => parse_float(trimmed).map(Value::Float64),
        SemanticType::Timestamp => date_parser::parse_timestamp(trimmed).map(Value::Timestamp),
    }
}

/// Match the header against the registry for `kind`.
fn resolve_schema(
    headers: &StringRecord,
    kind: SourceKind,
    unknown: UnknownColumns,
) -> Result<TableSchema, IngestError> {
    if headers.is_empty() || headers.iter().all(str::is_empty) {
        return Err(IngestError::MalformedRow {
            line: 1,
            reason: "source has no header row".into(),
        });
    }

    let mut seen = HashSet::with_capacity(headers.len());
    let mut columns = Vec::with_capacity(headers.len());
    for name in headers.iter() {
        if !seen.insert(name) {
            return Err(IngestError::MalformedRow {
                line: 1,
                reason: format!("duplicate column `{}` in header", name),
            });
        }
        let entry = match (kind.lookup(name), unknown) {
            (Some(entry), _) => entry,
            (None, UnknownColumns::Pass) => {
                warn!(column = name, "column not in registry; loading as text");
                SchemaEntry::new(name, SemanticType::Utf8Text)
            }
            (None, UnknownColumns::Reject) => {
                return Err(IngestError::MalformedRow {
                    line: 1,
                    reason: format!("column `{}` is not part of the {:?} schema", name, kind),
                })
            }
        };
        columns.push(entry);
    }

    for entry in kind.entries() {
        if !seen.contains(entry.name.as_str()) {
            debug!(column = %entry.name, "registry column absent from source");
        }
    }
    Ok(TableSchema::new(columns))
}

fn from_csv(err: csv::Error) -> IngestError {
    let line = err.position().map(|p| p.line()).unwrap_or(0);
    let reason = err.to_string();
    match err.into_kind() {
        csv::ErrorKind::Io(io) => IngestError::Connectivity {
            target: "source stream".into(),
            source: Box::new(io),
        },
        _ => IngestError::MalformedRow { line, reason },
    }
}

/// Lazy, single-pass decoder from delimited text into typed [`Record`]s.
pub struct RowDecoder<R> {
    reader: csv::Reader<R>,
    schema: Arc<TableSchema>,
    policy: DecodePolicy,
    row: StringRecord,
    decoded: u64,
    skipped: u64,
    done: bool,
}

impl<R: Read> RowDecoder<R> {
    /// Read the header from `source` and bind it to the registry for `kind`.
    pub fn new(
        source: R,
        kind: SourceKind,
        unknown: UnknownColumns,
        policy: DecodePolicy,
    ) -> Result<Self, IngestError> {
        let mut reader = ReaderBuilder::new().has_headers(true).from_reader(source);
        let headers = reader.headers().map_err(from_csv)?;
        let schema = resolve_schema(headers, kind, unknown)?;
        debug!(columns = schema.len(), "header bound to schema");

        Ok(Self {
            reader,
            schema: Arc::new(schema),
            policy,
            row: StringRecord::new(),
            decoded: 0,
            skipped: 0,
            done: false,
        })
    }

    pub fn schema(&self) -> &Arc<TableSchema> {
        &self.schema
    }

    /// Rows decoded successfully so far.
    pub fn decoded(&self) -> u64 {
        self.decoded
    }

    /// Rows dropped under [`DecodePolicy::Skip`].
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    fn decode_row(&self) -> Result<Record, IngestError> {
        let line = self.row.position().map(|p| p.line()).unwrap_or(0);
        let mut values = Vec::with_capacity(self.schema.len());
        for (raw, entry) in self.row.iter().zip(self.schema.columns()) {
            let value = decode_field(raw, entry.ty)
                .filter(|v| entry.nullable || !v.is_null())
                .ok_or_else(|| IngestError::Decode {
                    line,
                    column: entry.name.clone(),
                    value: raw.to_string(),
                    expected: entry.ty,
                })?;
            values.push(value);
        }
        Ok(Record::new(line, values))
    }

    /// Apply the decode policy to a failed row. `Some` ends the stream.
    fn reject(&mut self, err: IngestError) -> Option<IngestError> {
        if self.policy == DecodePolicy::Skip && err.is_decode() {
            warn!(error = %err, "skipping row");
            self.skipped += 1;
            None
        } else {
            self.done = true;
            Some(err)
        }
    }
}

impl<R: Read> Iterator for RowDecoder<R> {
    type Item = Result<Record, IngestError>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            let outcome = match self.reader.read_record(&mut self.row) {
                Ok(false) => {
                    self.done = true;
                    return None;
                }
                Ok(true) => self.decode_row(),
                Err(err) => Err(from_csv(err)),
            };
            match outcome {
                Ok(record) => {
                    self.decoded += 1;
                    return Some(Ok(record));
                }
                Err(err) => {
                    if let Some(fatal) = self.reject(err) {
                        return Some(Err(fatal));
                    }
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::io::Cursor;

    const ZONES: &str = "\"LocationID\",\"Borough\",\"Zone\",\"service_zone\"
1,\"EWR\",\"Newark Airport\",\"EWR\"
2,\"Queens\",\"Jamaica Bay\",\"Boro Zone\"
,\"Unknown\",,
";

    fn decoder(data: &str, kind: SourceKind, policy: DecodePolicy) -> RowDecoder<Cursor<Vec<u8>>> {
        RowDecoder::new(
            Cursor::new(data.as_bytes().to_vec()),
            kind,
            UnknownColumns::Pass,
            policy,
        )
        .unwrap()
    }

    #[test]
    fn decodes_zone_rows_with_nulls() {
        let rows: Vec<Record> = decoder(ZONES, SourceKind::Zones, DecodePolicy::Abort)
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].get(0), Some(&Value::Int64(1)));
        assert_eq!(rows[1].get(2), Some(&Value::Text("Jamaica Bay".into())));
        assert_eq!(rows[2].get(0), Some(&Value::Null));
        assert_eq!(rows[2].get(2), Some(&Value::Null));
        assert_eq!(rows[2].line(), 4);
    }

    #[test]
    fn field_conversion_rules() {
        use SemanticType::*;
        assert_eq!(decode_field("", NullableInt64), Some(Value::Null));
        assert_eq!(decode_field(" 7 ", NullableInt64), Some(Value::Int64(7)));
        assert_eq!(decode_field("2.0", NullableInt64), Some(Value::Int64(2)));
        assert_eq!(decode_field("2.5", NullableInt64), None);
        assert_eq!(decode_field("abc", Float64), None);
        assert_eq!(decode_field("", Float64), Some(Value::Null));
        assert_eq!(decode_field("NaN", Float64), Some(Value::Null));
        assert_eq!(decode_field(" nan ", Float64), Some(Value::Null));
        assert_eq!(decode_field("NULL", NullableInt64), Some(Value::Null));
        assert_eq!(decode_field("NA", Timestamp), Some(Value::Null));
        assert_eq!(decode_field("inf", Float64), None);
        assert_eq!(decode_field("-infinity", Float64), None);
        assert_eq!(decode_field("NaN", Utf8Text), Some(Value::Text("NaN".into())));
        assert_eq!(decode_field("  x ", Utf8Text), Some(Value::Text("  x ".into())));
        assert_eq!(decode_field("", Timestamp), Some(Value::Null));
        assert_eq!(decode_field("not a date", Timestamp), None);
        assert_eq!(
            decode_field("2021-01-01 00:30:10", Timestamp),
            Some(Value::Timestamp(
                NaiveDate::from_ymd_opt(2021, 1, 1)
                    .unwrap()
                    .and_hms_opt(0, 30, 10)
                    .unwrap()
            ))
        );
    }

    #[test]
    fn malformed_number_aborts_and_fuses() {
        let data = "LocationID,Borough\n1,A\nxx,B\n3,C\n";
        let mut dec = decoder(data, SourceKind::Zones, DecodePolicy::Abort);
        assert!(dec.next().unwrap().is_ok());
        match dec.next().unwrap() {
            Err(IngestError::Decode {
                line,
                column,
                value,
                expected,
            }) => {
                assert_eq!(line, 3);
                assert_eq!(column, "LocationID");
                assert_eq!(value, "xx");
                assert_eq!(expected, SemanticType::NullableInt64);
            }
            other => panic!("expected decode error, got {:?}", other),
        }
        assert!(dec.next().is_none());
    }

    #[test]
    fn skip_policy_drops_bad_rows() {
        let data = "LocationID,Borough\n1,A\nxx,B\n3,C,extra\n4,D\n";
        let mut dec = decoder(data, SourceKind::Zones, DecodePolicy::Skip);
        let rows: Vec<Record> = dec.by_ref().collect::<Result<_, _>>().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].get(0), Some(&Value::Int64(4)));
        assert_eq!(dec.skipped(), 2);
        assert_eq!(dec.decoded(), 2);
    }

    #[test]
    fn ragged_row_is_malformed() {
        let data = "LocationID,Borough\n1,A,extra\n";
        let mut dec = decoder(data, SourceKind::Zones, DecodePolicy::Abort);
        assert!(matches!(
            dec.next(),
            Some(Err(IngestError::MalformedRow { .. }))
        ));
    }

    #[test]
    fn unknown_columns_follow_policy() {
        let data = "LocationID,airport_fee\n1,2.5\n";
        let mut dec = decoder(data, SourceKind::Zones, DecodePolicy::Abort);
        assert_eq!(dec.schema().columns()[1].ty, SemanticType::Utf8Text);
        let row = dec.next().unwrap().unwrap();
        assert_eq!(row.get(1), Some(&Value::Text("2.5".into())));

        let rejected = RowDecoder::new(
            Cursor::new(data.as_bytes().to_vec()),
            SourceKind::Zones,
            UnknownColumns::Reject,
            DecodePolicy::Abort,
        );
        assert!(matches!(rejected, Err(IngestError::MalformedRow { line: 1, .. })));
    }

    #[test]
    fn duplicate_or_missing_header_is_rejected() {
        for data in ["LocationID,LocationID\n1,2\n", ""] {
            let res = RowDecoder::new(
                Cursor::new(data.as_bytes().to_vec()),
                SourceKind::Zones,
                UnknownColumns::Pass,
                DecodePolicy::Abort,
            );
            assert!(res.is_err(), "{data:?}");
        }
    }

    #[test]
    fn header_only_source_yields_nothing() {
        let mut dec = decoder("LocationID,Borough\n", SourceKind::Zones, DecodePolicy::Abort);
        assert!(dec.next().is_none());
        assert_eq!(dec.schema().len(), 2);
    }
}
