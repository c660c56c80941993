//! exoscope-ingestion: spreadsheet import into the candidate store.
//!
//! - [`reader`] decodes CSV, Excel and JSON-lines files into numbered rows
//! - [`columns`] maps archive headers onto candidate fields
//! - [`loader`] validates rows independently and inserts the valid ones in
//!   one transaction, reporting the rest per row

pub mod columns;
pub mod error;
pub mod loader;
pub mod reader;

pub use columns::{ColumnAliases, Target};
pub use error::{ImportError, ImportRowError, Result};
pub use loader::{errors_by_field, map_row, BulkLoader, ImportReport};
pub use reader::{read_rows, FileFormat, SourceRow};
