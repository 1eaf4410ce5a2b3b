// src/duck/mod.rs

use crate::config::CreateMode;
use crate::error::IngestError;
use crate::process::{Batch, Materializer, Value};
use crate::schema::{quote_ident, SchemaEntry, TableSchema};
use chrono::DateTime;
use duckdb::types::{
    FromSql, FromSqlError, FromSqlResult, TimeUnit, ToSqlOutput, Value as DuckValue, ValueRef,
};
use duckdb::{params, Connection, ToSql};
use std::sync::Arc;
use tracing::{debug, info};

impl ToSql for Value {
    fn to_sql(&self) -> duckdb::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Owned(DuckValue::Null),
            Value::Int64(v) => ToSqlOutput::Owned(DuckValue::BigInt(*v)),
            Value::Float64(v) => ToSqlOutput::Owned(DuckValue::Double(*v)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Timestamp(ts) => ToSqlOutput::Owned(DuckValue::Timestamp(
                TimeUnit::Microsecond,
                ts.and_utc().timestamp_micros(),
            )),
        })
    }
}

impl FromSql for Value {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value {
            ValueRef::Null => Ok(Value::Null),
            ValueRef::BigInt(v) => Ok(Value::Int64(v)),
            ValueRef::Int(v) => Ok(Value::Int64(v.into())),
            ValueRef::Double(v) => Ok(Value::Float64(v)),
            ValueRef::Text(bytes) => std::str::from_utf8(bytes)
                .map(|s| Value::Text(s.to_owned()))
                .map_err(|e| FromSqlError::Other(Box::new(e))),
            ValueRef::Timestamp(unit, v) => {
                let micros = match unit {
                    TimeUnit::Second => v.saturating_mul(1_000_000),
                    TimeUnit::Millisecond => v.saturating_mul(1_000),
                    TimeUnit::Microsecond => v,
                    TimeUnit::Nanosecond => v / 1_000,
                };
                DateTime::from_timestamp_micros(micros)
                    .map(|dt| Value::Timestamp(dt.naive_utc()))
                    .ok_or(FromSqlError::InvalidType)
            }
            _ => Err(FromSqlError::InvalidType),
        }
    }
}

/// A DuckDB table loaded batch by batch over a borrowed connection.
pub struct DuckTable<'c> {
    conn: &'c Connection,
    name: String,
    layout: Option<Arc<TableSchema>>,
}

impl<'c> DuckTable<'c> {
    pub fn new(conn: &'c Connection, name: impl Into<String>) -> Self {
        Self {
            conn,
            name: name.into(),
            layout: None,
        }
    }

    fn db_err(&self, err: duckdb::Error) -> IngestError {
        IngestError::from_duckdb(&self.name, err)
    }

    pub fn exists(&self) -> Result<bool, IngestError> {
        let n: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM information_schema.tables \
                 WHERE table_schema = current_schema() AND table_name = ?",
                params![self.name],
                |r| r.get(0),
            )
            .map_err(|e| self.db_err(e))?;
        Ok(n > 0)
    }

    /// `(column name, data type)` of the existing table, in column order.
    pub fn existing_columns(&self) -> Result<Vec<(String, String)>, IngestError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT column_name, data_type FROM information_schema.columns \
                 WHERE table_schema = current_schema() AND table_name = ? \
                 ORDER BY ordinal_position",
            )
            .map_err(|e| self.db_err(e))?;
        let rows = stmt
            .query_map(params![self.name], |r| {
                Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?))
            })
            .map_err(|e| self.db_err(e))?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| self.db_err(e))
    }

    pub fn row_count(&self) -> Result<u64, IngestError> {
        let n: i64 = self
            .conn
            .query_row(
                &format!("SELECT COUNT(*) FROM {}", quote_ident(&self.name)),
                [],
                |r| r.get(0),
            )
            .map_err(|e| self.db_err(e))?;
        Ok(n as u64)
    }

    /// Every row of the table in insertion order, decoded back into [`Value`]s.
    pub fn scan(&self) -> Result<Vec<Vec<Value>>, IngestError> {
        let columns = self.existing_columns()?.len();
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT * FROM {}", quote_ident(&self.name)))
            .map_err(|e| self.db_err(e))?;
        let rows = stmt
            .query_map([], |r| {
                (0..columns)
                    .map(|i| r.get::<_, Value>(i))
                    .collect::<duckdb::Result<Vec<_>>>()
            })
            .map_err(|e| self.db_err(e))?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| self.db_err(e))
    }

    fn create(&self, schema: &TableSchema) -> Result<(), IngestError> {
        let columns = schema
            .columns()
            .iter()
            .map(SchemaEntry::column_definition)
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!("CREATE TABLE {} ({});", quote_ident(&self.name), columns);
        debug!(%sql, "creating table");
        self.conn.execute_batch(&sql).map_err(|e| self.db_err(e))
    }

    fn drop_table(&self) -> Result<(), IngestError> {
        self.conn
            .execute_batch(&format!("DROP TABLE IF EXISTS {};", quote_ident(&self.name)))
            .map_err(|e| self.db_err(e))
    }

    /// An existing table can take appends only if its columns line up with ours.
    fn check_compatible(&self, schema: &TableSchema) -> Result<(), IngestError> {
        let existing = self.existing_columns()?;
        let wanted = schema.storage_layout();
        let matches = existing.len() == wanted.len()
            && existing
                .iter()
                .zip(&wanted)
                .all(|((name, ty), (want_name, want_ty))| {
                    name == want_name && ty.eq_ignore_ascii_case(want_ty)
                });
        if matches {
            Ok(())
        } else {
            Err(IngestError::SchemaConflict {
                table: self.name.clone(),
                reason: format!(
                    "existing columns {:?} do not match source columns {:?}",
                    existing, wanted
                ),
            })
        }
    }

    fn append_rows(&self, batch: &Batch) -> Result<u64, IngestError> {
        let mut appender = self.conn.appender(&self.name).map_err(|e| self.db_err(e))?;
        for record in batch.records() {
            let row: Vec<&dyn ToSql> = record.values().iter().map(|v| v as &dyn ToSql).collect();
            appender
                .append_row(row.as_slice())
                .map_err(|e| self.db_err(e))?;
        }
        appender.flush().map_err(|e| self.db_err(e))?;
        Ok(batch.len() as u64)
    }
}

impl Materializer for DuckTable<'_> {
    fn table(&self) -> &str {
        &self.name
    }

    fn establish(&mut self, batch: &Batch, mode: CreateMode) -> Result<(), IngestError> {
        let schema = batch.schema();
        let exists = self.exists()?;
        match (mode, exists) {
            (_, false) => self.create(schema)?,
            (CreateMode::Replace, true) => {
                info!(table = %self.name, "replacing existing table");
                self.drop_table()?;
                self.create(schema)?;
            }
            (CreateMode::Append, true) => self.check_compatible(schema)?,
            (CreateMode::Fail, true) => {
                return Err(IngestError::SchemaConflict {
                    table: self.name.clone(),
                    reason: "table already exists and create mode is `fail`".into(),
                })
            }
        }
        self.layout = Some(schema.clone());
        Ok(())
    }

    fn append(&mut self, batch: &Batch) -> Result<u64, IngestError> {
        let layout = self
            .layout
            .as_ref()
            .ok_or_else(|| IngestError::SchemaConflict {
                table: self.name.clone(),
                reason: "append before establish".into(),
            })?;
        if !Arc::ptr_eq(layout, batch.schema()) && **layout != **batch.schema() {
            return Err(IngestError::SchemaConflict {
                table: self.name.clone(),
                reason: format!("batch {} has a different column set", batch.index()),
            });
        }

        self.conn
            .execute_batch("BEGIN TRANSACTION;")
            .map_err(|e| self.db_err(e))?;
        match self.append_rows(batch) {
            Ok(written) => {
                self.conn
                    .execute_batch("COMMIT;")
                    .map_err(|e| self.db_err(e))?;
                Ok(written)
            }
            Err(err) => {
                if let Err(rollback) = self.conn.execute_batch("ROLLBACK;") {
                    debug!(error = %rollback, "rollback failed");
                }
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::Record;
    use crate::schema::SemanticType;
    use anyhow::Result;
    use chrono::NaiveDate;

    fn zone_schema() -> Arc<TableSchema> {
        Arc::new(TableSchema::new(vec![
            SchemaEntry::new("LocationID", SemanticType::NullableInt64),
            SchemaEntry::new("Zone", SemanticType::Utf8Text),
        ]))
    }

    fn batch(schema: &Arc<TableSchema>, ids: &[i64]) -> Batch {
        let records = ids
            .iter()
            .map(|&id| Record::new(0, vec![Value::Int64(id), Value::Text(format!("z{id}"))]))
            .collect();
        Batch::new(0, 0, schema.clone(), records)
    }

    #[test]
    fn replace_recreates_and_appends() -> Result<()> {
        let conn = Connection::open_in_memory()?;
        let schema = zone_schema();
        let mut table = DuckTable::new(&conn, "zones");

        table.establish(&batch(&schema, &[]), CreateMode::Replace)?;
        table.append(&batch(&schema, &[1, 2, 3]))?;
        assert_eq!(table.row_count()?, 3);

        let mut again = DuckTable::new(&conn, "zones");
        again.establish(&batch(&schema, &[]), CreateMode::Replace)?;
        assert_eq!(again.row_count()?, 0);
        assert_eq!(
            again.existing_columns()?,
            vec![
                ("LocationID".to_string(), "BIGINT".to_string()),
                ("Zone".to_string(), "VARCHAR".to_string())
            ]
        );
        Ok(())
    }

    #[test]
    fn fail_mode_refuses_existing_table() -> Result<()> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("CREATE TABLE zones (LocationID BIGINT, Zone VARCHAR);")?;
        let mut table = DuckTable::new(&conn, "zones");
        let err = table
            .establish(&batch(&zone_schema(), &[1]), CreateMode::Fail)
            .unwrap_err();
        assert!(matches!(err, IngestError::SchemaConflict { .. }));
        Ok(())
    }

    #[test]
    fn append_mode_checks_existing_columns() -> Result<()> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("CREATE TABLE zones (LocationID BIGINT, Zone VARCHAR);")?;
        conn.execute_batch("INSERT INTO zones VALUES (99, 'old');")?;
        let mut table = DuckTable::new(&conn, "zones");
        table.establish(&batch(&zone_schema(), &[]), CreateMode::Append)?;
        table.append(&batch(&zone_schema(), &[1]))?;
        assert_eq!(table.row_count()?, 2);

        conn.execute_batch("CREATE TABLE other (LocationID DOUBLE);")?;
        let mut other = DuckTable::new(&conn, "other");
        let err = other
            .establish(&batch(&zone_schema(), &[]), CreateMode::Append)
            .unwrap_err();
        assert!(matches!(err, IngestError::SchemaConflict { .. }));
        Ok(())
    }

    #[test]
    fn append_rejects_foreign_schema() -> Result<()> {
        let conn = Connection::open_in_memory()?;
        let mut table = DuckTable::new(&conn, "zones");
        let schema = zone_schema();
        assert!(table.append(&batch(&schema, &[1])).is_err());

        table.establish(&batch(&schema, &[]), CreateMode::Replace)?;
        let foreign = Arc::new(TableSchema::new(vec![SchemaEntry::new(
            "LocationID",
            SemanticType::Float64,
        )]));
        let stray = Batch::new(1, 0, foreign, vec![Record::new(0, vec![Value::Float64(1.0)])]);
        assert!(matches!(
            table.append(&stray),
            Err(IngestError::SchemaConflict { .. })
        ));
        assert_eq!(table.row_count()?, 0);
        Ok(())
    }

    #[test]
    fn values_read_back_unchanged() -> Result<()> {
        let conn = Connection::open_in_memory()?;
        let schema = Arc::new(TableSchema::new(vec![
            SchemaEntry::new("i", SemanticType::NullableInt64),
            SchemaEntry::new("f", SemanticType::Float64),
            SchemaEntry::new("t", SemanticType::Utf8Text),
            SchemaEntry::new("ts", SemanticType::Timestamp),
        ]));
        let pickup = NaiveDate::from_ymd_opt(2021, 1, 1)
            .unwrap()
            .and_hms_opt(0, 30, 10)
            .unwrap();
        let rows = vec![
            vec![
                Value::Int64(1),
                Value::Float64(2.5),
                Value::Text("N".into()),
                Value::Timestamp(pickup),
            ],
            vec![Value::Null, Value::Null, Value::Null, Value::Null],
        ];
        let records = rows
            .iter()
            .cloned()
            .map(|values| Record::new(0, values))
            .collect();
        let batch = Batch::new(0, 0, schema, records);

        let mut table = DuckTable::new(&conn, "round_trip");
        table.establish(&batch, CreateMode::Replace)?;
        table.append(&batch)?;
        assert_eq!(table.scan()?, rows);
        Ok(())
    }

    #[test]
    fn constraint_violations_are_classified() -> Result<()> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("CREATE TABLE strict (id BIGINT NOT NULL);")?;
        let err = conn
            .execute_batch("INSERT INTO strict VALUES (NULL);")
            .unwrap_err();
        assert!(matches!(
            IngestError::from_duckdb("strict", err),
            IngestError::Constraint { .. }
        ));
        Ok(())
    }

    #[test]
    fn appender_not_null_violation_is_a_constraint_error() -> Result<()> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("CREATE TABLE strict (LocationID BIGINT NOT NULL, Zone VARCHAR);")?;
        let schema = zone_schema();
        let records = vec![
            Record::new(2, vec![Value::Int64(1), Value::Text("z1".into())]),
            Record::new(3, vec![Value::Null, Value::Text("z2".into())]),
        ];
        let batch = Batch::new(0, 0, schema, records);

        let mut table = DuckTable::new(&conn, "strict");
        table.establish(&batch, CreateMode::Append)?;
        let err = table.append(&batch).unwrap_err();
        assert!(matches!(err, IngestError::Constraint { ref table, .. } if table == "strict"));
        assert_eq!(table.row_count()?, 0);
        Ok(())
    }
}
