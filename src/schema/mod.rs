pub mod registry;
pub mod types;

pub use registry::SourceKind;
pub use types::{quote_ident, SchemaEntry, SemanticType, TableSchema};
