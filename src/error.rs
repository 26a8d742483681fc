// ⚠️ Error types for the csvie library
// The CLI wraps these in anyhow; library code returns them directly

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CsvieError {
    /// The backing store could not be queried
    #[error("data access failed: {0}")]
    DataAccess(#[from] rusqlite::Error),

    /// The column list of an entity could not be resolved
    #[error("could not resolve columns for table '{table}'")]
    SchemaResolution { table: String },

    /// Key specification is empty or its two sides differ in length
    #[error("invalid key specification: {0}")]
    InvalidKeySpec(String),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, CsvieError>;

impl From<toml::de::Error> for CsvieError {
    fn from(e: toml::de::Error) -> Self {
        CsvieError::Config(e.to_string())
    }
}
