// Csvie - CSV import, export and record scrubbing against a SQL database
// Exposes all modules for use in the CLI and tests

pub mod error;
pub mod record;
pub mod key;
pub mod store;
pub mod index;
pub mod cleaner;
pub mod config;
pub mod storage;
pub mod bulk_load;
pub mod files;

// Re-export commonly used types
pub use error::{CsvieError, Result};
pub use record::{Record, Value};
pub use key::{build_key, KeySpec};
pub use store::{RecordStore, SchemaSource, SqliteStore};
pub use index::{build_index, distinct_values, group_by_key, Index};
pub use cleaner::{build_template, resolve_field, resolve_value, Cleaner, Scrubber};
pub use config::{CsvieConfig, ImportOptions};
pub use storage::StorageDisk;
pub use bulk_load::{empty_string_overwrite, load_data_statement};
pub use files::{unique_file_name, unique_headers, Csvie};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
