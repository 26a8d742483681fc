// 📂 CSV Files - Chunk, read, save, export, restore and import
// Every relative path resolves against the configured storage disk

use crate::bulk_load::load_data_statement;
use crate::config::{CsvieConfig, ImportOptions};
use crate::error::{CsvieError, Result};
use crate::record::{Record, Value};
use crate::storage::StorageDisk;
use crate::store::{SchemaSource, SqliteStore};
use chrono::Utc;
use csv::{ReaderBuilder, StringRecord, Terminator, Writer, WriterBuilder};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

// ============================================================================
// HELPERS
// ============================================================================

/// Trim headers and suffix duplicates with `-1`, `-2`, ...
pub fn unique_headers<S: AsRef<str>>(headers: &[S]) -> Vec<String> {
    let mut unique: Vec<String> = Vec::with_capacity(headers.len());

    for header in headers {
        let original = header.as_ref().trim();
        let mut value = original.to_string();
        let mut count = 0;

        while unique.contains(&value) {
            count += 1;
            value = format!("{}-{}", original, count);
        }

        unique.push(value);
    }

    unique
}

/// A blank CRLF line reads as a single empty cell once its `\r` is dropped
fn is_blank(cells: &[String]) -> bool {
    matches!(cells, [only] if only.is_empty())
}

/// Random file name: hex SHA-256 of a v4 UUID and the current time, plus `extension`
pub fn unique_file_name(extension: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!(
        "{}{}",
        uuid::Uuid::new_v4(),
        Utc::now().timestamp_nanos_opt().unwrap_or_default()
    ));
    format!("{:x}{}", hasher.finalize(), extension)
}

// ============================================================================
// CSVIE
// ============================================================================

pub struct Csvie {
    config: CsvieConfig,
    /// Configuration as constructed; option overrides start from it
    defaults: CsvieConfig,
    disk: StorageDisk,
}

impl Csvie {
    pub fn new(config: CsvieConfig) -> Result<Self> {
        config.validate()?;
        let disk = StorageDisk::new(config.storage_disk.clone());

        Ok(Csvie {
            defaults: config.clone(),
            config,
            disk,
        })
    }

    pub fn config(&self) -> &CsvieConfig {
        &self.config
    }

    pub fn disk(&self) -> &StorageDisk {
        &self.disk
    }

    pub fn file_chunk_size(&self) -> usize {
        self.config.file_chunk_size
    }

    pub fn set_file_chunk_size(&mut self, size: usize) {
        self.config.file_chunk_size = size.max(1);
    }

    pub fn storage_disk(&self) -> &Path {
        self.disk.root()
    }

    pub fn set_storage_disk(&mut self, root: impl Into<PathBuf>) {
        self.config.storage_disk = root.into();
        self.disk = StorageDisk::new(self.config.storage_disk.clone());
    }

    pub fn has_mac_support(&self) -> bool {
        self.config.file_mac_support
    }

    pub fn enable_mac_support(&mut self) {
        self.config.file_mac_support = true;
    }

    pub fn disable_mac_support(&mut self) {
        self.config.file_mac_support = false;
    }

    /// Apply overrides on top of the constructed configuration.
    ///
    /// Options left unset fall back to their configured value, discarding
    /// earlier setter calls. The result stays in effect for later calls. An
    /// empty set of options changes nothing.
    pub fn apply_options(&mut self, options: &ImportOptions) -> Result<()> {
        if options.is_empty() {
            return Ok(());
        }

        let mut config = self.defaults.clone();
        config.apply(options);
        config.validate()?;

        self.disk = StorageDisk::new(config.storage_disk.clone());
        self.config = config;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Reading & writing
    // ------------------------------------------------------------------------

    fn reader(&self, path: &Path) -> Result<csv::Reader<File>> {
        let mut builder = ReaderBuilder::new();
        builder
            .has_headers(false)
            .flexible(true)
            .delimiter(self.config.delimiter())
            .quote(self.config.quote());

        // CRLF also accepts a lone \r
        if !self.config.file_mac_support {
            builder.terminator(Terminator::Any(b'\n'));
        }

        Ok(builder.from_path(path)?)
    }

    fn writer(&self, path: &Path) -> Result<Writer<File>> {
        let writer = WriterBuilder::new()
            .delimiter(self.config.delimiter())
            .quote(self.config.quote())
            .from_path(path)?;

        Ok(writer)
    }

    /// Cells of a record; a `\r` left by a Windows line ending is dropped
    fn cells(&self, record: &StringRecord) -> Vec<String> {
        let mut cells: Vec<String> = record.iter().map(String::from).collect();

        if !self.config.file_mac_support {
            if let Some(last) = cells.last_mut() {
                if last.ends_with('\r') {
                    last.pop();
                }
            }
        }

        cells
    }

    /// Cells of every non-blank record
    fn records<'r>(
        &'r self,
        reader: &'r mut csv::Reader<File>,
    ) -> impl Iterator<Item = Result<Vec<String>>> + 'r {
        reader.records().filter_map(move |record| match record {
            Ok(record) => {
                let cells = self.cells(&record);
                (!is_blank(&cells)).then_some(Ok(cells))
            }
            Err(e) => Some(Err(CsvieError::from(e))),
        })
    }

    /// Split each file into chunks of `file_chunk_size` data rows.
    ///
    /// Chunks go into a directory named after the file, next to it, and each
    /// starts with the (deduplicated) header. A file without an extension gets
    /// a `<name>-chunks` directory instead. Returned paths are relative to
    /// the storage disk when the chunk lives on it.
    pub fn chunk_files<P: AsRef<Path>>(&self, paths: &[P]) -> Result<Vec<PathBuf>> {
        let mut chunk_paths = Vec::new();

        for path in paths {
            let path = self.disk.path(path);

            if fs::metadata(&path)?.len() == 0 {
                debug!(file = %path.display(), "skipping empty file");
                continue;
            }

            let mut reader = self.reader(&path)?;
            let mut records = self.records(&mut reader);

            let headers = match records.next() {
                Some(first) => unique_headers(&first?),
                None => continue,
            };

            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            let chunk_dir = match path.extension() {
                Some(_) => path.with_file_name(stem),
                None => path.with_file_name(format!("{}-chunks", stem)),
            };
            StorageDisk::make_path(&chunk_dir, false)?;

            let mut current: Option<Writer<File>> = None;
            let mut rows_in_chunk = 0;
            let mut chunks = 0;

            for cells in records {
                let cells = cells?;

                if current.is_none() {
                    let chunk_path = chunk_dir.join(unique_file_name(".csv"));
                    let mut writer = self.writer(&chunk_path)?;
                    writer.write_record(&headers)?;

                    chunk_paths.push(self.relative_to_disk(&chunk_path));
                    current = Some(writer);
                    chunks += 1;
                }

                if let Some(writer) = current.as_mut() {
                    writer.write_record(&cells)?;
                }
                rows_in_chunk += 1;

                if rows_in_chunk == self.config.file_chunk_size {
                    if let Some(mut writer) = current.take() {
                        writer.flush()?;
                    }
                    rows_in_chunk = 0;
                }
            }

            if let Some(mut writer) = current.take() {
                writer.flush()?;
            }

            info!(file = %path.display(), chunks, "chunked file");
        }

        Ok(chunk_paths)
    }

    fn relative_to_disk(&self, path: &Path) -> PathBuf {
        path.strip_prefix(self.disk.root())
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| path.to_path_buf())
    }

    /// Every data row of a file as text values keyed by the deduplicated header
    pub fn read_csv_file(&self, path: impl AsRef<Path>) -> Result<Vec<Record>> {
        let path = self.disk.path(path);
        let mut reader = self.reader(&path)?;
        let mut records = self.records(&mut reader);

        let headers = match records.next() {
            Some(first) => unique_headers(&first?),
            None => return Ok(Vec::new()),
        };

        let mut rows = Vec::new();
        for cells in records {
            let cells = cells?;
            let row: Record = headers
                .iter()
                .enumerate()
                .map(|(i, h)| {
                    let cell = cells.get(i).cloned().unwrap_or_default();
                    (h.as_str(), Value::Text(cell))
                })
                .collect();
            rows.push(row);
        }

        debug!(file = %path.display(), rows = rows.len(), "read csv file");
        Ok(rows)
    }

    /// Replace an existing file with `rows`, header taken from the first row.
    ///
    /// Returns `false` when the file is not on the disk or there are no rows.
    pub fn save_csv_file(&self, path: impl AsRef<Path>, rows: &[Record]) -> Result<bool> {
        let path = self.disk.path(path);

        let Some(first) = rows.first() else {
            return Ok(false);
        };
        if !path.is_file() {
            return Ok(false);
        }

        let headers: Vec<&str> = first.columns().collect();
        let mut writer = self.writer(&path)?;
        writer.write_record(&headers)?;

        for row in rows {
            writer.write_record(
                headers
                    .iter()
                    .map(|h| row.get(h).map(|v| v.key_part().into_owned()).unwrap_or_default()),
            )?;
        }
        writer.flush()?;

        Ok(true)
    }

    // ------------------------------------------------------------------------
    // Database export / restore / import
    // ------------------------------------------------------------------------

    /// Write every row of `table` to `<dir>/<table>.csv`; returns the file path
    pub fn export_table_to_csv(
        &self,
        store: &SqliteStore<'_>,
        table: &str,
        dir: Option<&Path>,
    ) -> Result<PathBuf> {
        let columns = store.column_names(table)?;
        let rows = store.select_all(table)?;

        let dir = dir.map(|d| self.disk.path(d)).unwrap_or_else(|| self.disk.root().to_path_buf());
        StorageDisk::make_path(&dir, false)?;
        let path = dir.join(format!("{}.csv", table));

        let mut writer = self.writer(&path)?;
        writer.write_record(&columns)?;
        for row in &rows {
            writer.write_record(row.values().map(|v| v.key_part().into_owned()))?;
        }
        writer.flush()?;

        info!(table, rows = rows.len(), file = %path.display(), "exported table");
        Ok(path)
    }

    /// Export all tables except `excluded` into a fresh dump directory
    pub fn export_database(
        &self,
        store: &SqliteStore<'_>,
        excluded: &[&str],
        dir: Option<&Path>,
    ) -> Result<PathBuf> {
        let name = unique_file_name("");
        let dump_dir = match dir {
            Some(d) => self.disk.path(d).join(name),
            None => self.disk.path(name),
        };

        let tables: Vec<String> = store
            .table_names()?
            .into_iter()
            .filter(|t| !excluded.contains(&t.as_str()))
            .collect();

        for table in &tables {
            self.export_table_to_csv(store, table, Some(&dump_dir))?;
        }

        info!(tables = tables.len(), dir = %dump_dir.display(), "exported database");
        Ok(dump_dir)
    }

    /// Truncate and re-import every table found in a dump directory.
    ///
    /// Stops at the first file that is not a known table or does not import
    /// completely.
    pub fn restore_database(&mut self, store: &SqliteStore<'_>, dump_dir: impl AsRef<Path>) -> Result<bool> {
        let dump_dir = self.disk.path(dump_dir);
        if !dump_dir.is_dir() {
            warn!(dir = %dump_dir.display(), "dump directory not found");
            return Ok(false);
        }

        let mut files: Vec<PathBuf> = fs::read_dir(&dump_dir)?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "csv"))
            .collect();
        files.sort();

        for file in files {
            if !self.restore_table(store, &file)? {
                warn!(file = %file.display(), "restore stopped");
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn restore_table(&mut self, store: &SqliteStore<'_>, file: &Path) -> Result<bool> {
        let table = match file.file_stem() {
            Some(stem) => stem.to_string_lossy().into_owned(),
            None => return Ok(false),
        };

        if !store.table_names()?.contains(&table) {
            return Ok(false);
        }

        store.truncate(&table)?;
        self.import_csv(store, file, &table, &ImportOptions::default())
    }

    /// Bulk-load a CSV file into `table`.
    ///
    /// Columns map by position onto the table's columns, empty cells become
    /// NULL, and the first `file_lines_ignored` lines are skipped. Returns
    /// whether every data line was inserted.
    pub fn import_csv(
        &mut self,
        store: &SqliteStore<'_>,
        path: impl AsRef<Path>,
        table: &str,
        options: &ImportOptions,
    ) -> Result<bool> {
        self.apply_options(options)?;

        let path = self.disk.path(path);
        let columns = store.column_names(table)?;
        debug!(
            statement = %load_data_statement(&path, table, &columns, &self.config),
            "bulk load"
        );

        let mut reader = self.reader(&path)?;
        let mut rows = Vec::new();

        for cells in self.records(&mut reader).skip(self.config.file_lines_ignored) {
            let cells = cells?;
            let values: Vec<Value> = (0..columns.len())
                .map(|i| cells.get(i).map(|c| Value::from_cell(c)).unwrap_or(Value::Null))
                .collect();
            rows.push(values);
        }

        // LOAD DATA LOCAL skips duplicate-key rows instead of failing
        let inserted = store.insert_rows_ignoring_conflicts(table, &columns, &rows)?;
        info!(table, lines = rows.len(), inserted, "imported csv");

        Ok(inserted == rows.len())
    }

    /// Delete every file and directory on the disk, or under `dir` on it
    pub fn clear_storage_disk(&self, dir: Option<&Path>) -> bool {
        let files = self.disk.all_files(dir);
        let dirs = self.disk.all_directories(dir);

        let result: std::io::Result<()> = (|| {
            for file in &files {
                fs::remove_file(file)?;
            }
            for dir in &dirs {
                fs::remove_dir_all(dir)?;
            }
            Ok(())
        })();

        match result {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "failed to clear storage disk");
                false
            }
        }
    }
}
