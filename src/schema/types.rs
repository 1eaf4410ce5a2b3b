// src/schema/types.rs

use std::fmt;

/// Semantic type of a source column, as enforced by the row decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SemanticType {
    NullableInt64,
    Float64,
    Utf8Text,
    Timestamp,
}

impl SemanticType {
    /// Column type used when the destination table is created.
    pub fn storage_type(self) -> &'static str {
        match self {
            SemanticType::NullableInt64 => "BIGINT",
            SemanticType::Float64 => "DOUBLE",
            SemanticType::Utf8Text => "VARCHAR",
            SemanticType::Timestamp => "TIMESTAMP",
        }
    }
}

impl fmt::Display for SemanticType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SemanticType::NullableInt64 => "nullable_int64",
            SemanticType::Float64 => "float64",
            SemanticType::Utf8Text => "utf8_text",
            SemanticType::Timestamp => "timestamp",
        };
        f.write_str(s)
    }
}

/// A single column definition: name, semantic type, nullability.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SchemaEntry {
    pub name: String,
    pub ty: SemanticType,
    pub nullable: bool,
}

impl SchemaEntry {
    pub fn new(name: impl Into<String>, ty: SemanticType) -> Self {
        Self {
            name: name.into(),
            ty,
            nullable: true,
        }
    }

    /// Column definition fragment, e.g. `"trip_distance" DOUBLE`.
    pub fn column_definition(&self) -> String {
        let mut def = format!("{} {}", quote_ident(&self.name), self.ty.storage_type());
        if !self.nullable {
            def.push_str(" NOT NULL");
        }
        def
    }
}

/// Ordered column layout of a decoded source, shared by every batch of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    columns: Vec<SchemaEntry>,
}

impl TableSchema {
    pub fn new(columns: Vec<SchemaEntry>) -> Self {
        Self { columns }
    }

    pub fn columns(&self) -> &[SchemaEntry] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// `(name, storage type)` pairs in column order.
    pub fn storage_layout(&self) -> Vec<(String, &'static str)> {
        self.columns
            .iter()
            .map(|c| (c.name.clone(), c.ty.storage_type()))
            .collect()
    }
}

/// Double-quote an SQL identifier, escaping embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
