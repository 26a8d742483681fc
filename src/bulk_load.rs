// 📥 Bulk Load - MySQL LOAD DATA statement rendering
// MySQL reads empty CSV cells as '' rather than NULL, so every column goes
// through a user variable and nullif()

use crate::config::CsvieConfig;
use std::path::Path;

/// Column list and SET clause mapping empty strings to NULL:
/// `(@a,@b) SET a = nullif(@a,''), b = nullif(@b,'');`
pub fn empty_string_overwrite<S: AsRef<str>>(columns: &[S]) -> String {
    let variables = columns
        .iter()
        .map(|c| format!("@{}", c.as_ref()))
        .collect::<Vec<_>>()
        .join(",");

    let assignments = columns
        .iter()
        .map(|c| format!("{0} = nullif(@{0},'')", c.as_ref()))
        .collect::<Vec<_>>()
        .join(", ");

    format!("({}) SET {};", variables, assignments)
}

/// Full `LOAD DATA LOCAL INFILE` statement for importing `path` into `table`
pub fn load_data_statement<S: AsRef<str>>(
    path: &Path,
    table: &str,
    columns: &[S],
    config: &CsvieConfig,
) -> String {
    format!(
        "LOAD DATA LOCAL INFILE '{path}' \
         INTO TABLE {table} \
         CHARACTER SET {charset} \
         FIELDS TERMINATED by '{terminated}' \
         OPTIONALLY ENCLOSED BY '{enclosed}' \
         ESCAPED BY '{escaped}' \
         LINES TERMINATED BY '{lines}' \
         IGNORE {ignored} LINES {overwrite}",
        path = path.display(),
        table = table,
        charset = config.file_charset,
        terminated = config.file_fields_terminated_by,
        enclosed = escape_quote(&config.file_fields_enclosed_by),
        escaped = config.file_fields_escaped_by,
        lines = config.file_lines_terminated_by,
        ignored = config.file_lines_ignored,
        overwrite = empty_string_overwrite(columns),
    )
}

fn escape_quote(s: &str) -> String {
    if s == "\"" {
        "\\\"".to_string()
    } else {
        s.to_string()
    }
}
