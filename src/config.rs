// ⚙️ Configuration - File handling and bulk-load options
// Defaults mirror a stock MySQL CSV import; a TOML file or per-call options override them

use crate::error::{CsvieError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CsvieConfig {
    /// Directory where uploaded files live; chunked files are written here too
    pub storage_disk: PathBuf,

    /// Character set named in the bulk-load statement
    pub file_charset: String,

    /// Data rows per chunked file (each chunk also gets the header line)
    pub file_chunk_size: usize,

    pub file_fields_enclosed_by: String,
    pub file_fields_escaped_by: String,
    pub file_fields_terminated_by: String,

    /// Leading lines skipped on import, usually just the header
    pub file_lines_ignored: usize,

    pub file_lines_terminated_by: String,

    /// Accept lone `\r` line endings (files saved by classic Mac tools)
    pub file_mac_support: bool,
}

impl Default for CsvieConfig {
    fn default() -> Self {
        CsvieConfig {
            storage_disk: PathBuf::from("storage"),
            file_charset: "utf8".to_string(),
            file_chunk_size: 1000,
            file_fields_enclosed_by: "\"".to_string(),
            file_fields_escaped_by: "\\b".to_string(),
            file_fields_terminated_by: ",".to_string(),
            file_lines_ignored: 1,
            file_lines_terminated_by: "\\n".to_string(),
            file_mac_support: false,
        }
    }
}

impl CsvieConfig {
    /// Load from a TOML file; no path means defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(CsvieConfig::default());
        };

        let content = fs::read_to_string(path)?;
        let config: CsvieConfig = toml::from_str(&content)?;
        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.file_chunk_size == 0 {
            return Err(CsvieError::Config(
                "file_chunk_size must be greater than zero".to_string(),
            ));
        }

        if self.file_fields_terminated_by.len() != 1 {
            return Err(CsvieError::Config(format!(
                "file_fields_terminated_by must be a single byte, got {:?}",
                self.file_fields_terminated_by
            )));
        }

        Ok(())
    }

    /// Overlay per-call options; unset options keep their current value
    pub fn apply(&mut self, options: &ImportOptions) {
        if let Some(v) = &options.storage_disk {
            self.storage_disk = v.clone();
        }
        if let Some(v) = &options.file_charset {
            self.file_charset = v.clone();
        }
        if let Some(v) = options.file_chunk_size {
            self.file_chunk_size = v;
        }
        if let Some(v) = &options.file_fields_enclosed_by {
            self.file_fields_enclosed_by = v.clone();
        }
        if let Some(v) = &options.file_fields_escaped_by {
            self.file_fields_escaped_by = v.clone();
        }
        if let Some(v) = &options.file_fields_terminated_by {
            self.file_fields_terminated_by = v.clone();
        }
        if let Some(v) = options.file_lines_ignored {
            self.file_lines_ignored = v;
        }
        if let Some(v) = &options.file_lines_terminated_by {
            self.file_lines_terminated_by = v.clone();
        }
        if let Some(v) = options.file_mac_support {
            self.file_mac_support = v;
        }
    }

    /// Field delimiter as the single byte the csv reader wants
    pub fn delimiter(&self) -> u8 {
        self.file_fields_terminated_by.bytes().next().unwrap_or(b',')
    }

    /// Quote byte; falls back to `"` when unset
    pub fn quote(&self) -> u8 {
        self.file_fields_enclosed_by.bytes().next().unwrap_or(b'"')
    }
}

/// Per-call overrides for `CsvieConfig`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportOptions {
    pub storage_disk: Option<PathBuf>,
    pub file_charset: Option<String>,
    pub file_chunk_size: Option<usize>,
    pub file_fields_enclosed_by: Option<String>,
    pub file_fields_escaped_by: Option<String>,
    pub file_fields_terminated_by: Option<String>,
    pub file_lines_ignored: Option<usize>,
    pub file_lines_terminated_by: Option<String>,
    pub file_mac_support: Option<bool>,
}

impl ImportOptions {
    pub fn is_empty(&self) -> bool {
        *self == ImportOptions::default()
    }
}
