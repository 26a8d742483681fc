// 🧽 Cleaners - Merge CSV rows into store-shaped records
// Hash-join a batch against the store, then let a Scrubber decide per row

use crate::error::{CsvieError, Result};
use crate::index::build_index;
use crate::key::{build_key, KeySpec};
use crate::record::{Record, Value};
use crate::store::{RecordStore, SchemaSource};
use chrono::{DateTime, Utc};
use tracing::debug;

// ============================================================================
// SCRUBBER (extension point)
// ============================================================================

/// Per-row merge supplied by the host application.
///
/// Returning `None` drops the row from the batch output.
pub trait Scrubber {
    /// Caller data handed to every call, e.g. a lookup table or import label
    type Extra;

    /// Merge one CSV row.
    ///
    /// * `found` - `None` when nothing in the store shares the row's key,
    ///   otherwise every matched record in store order (never empty)
    /// * `template` - every target column, all null; copy it, don't expect it
    ///   to be reused between calls
    /// * `now` - one timestamp shared by the whole batch
    fn scrub_row(
        &self,
        row: &Record,
        found: Option<&[Record]>,
        template: &Record,
        now: DateTime<Utc>,
        extra: Option<&Self::Extra>,
    ) -> Option<Record>;
}

// ============================================================================
// CLEANER
// ============================================================================

pub struct Cleaner<S: Scrubber> {
    scrubber: S,
    key_spec: KeySpec,
    table: String,
    template_table: Option<String>,
    extra: Option<S::Extra>,
}

impl<S: Scrubber> Cleaner<S> {
    /// Cleaner matching rows against `table` by `key_spec`
    pub fn new(scrubber: S, key_spec: KeySpec, table: impl Into<String>) -> Self {
        Cleaner {
            scrubber,
            key_spec,
            table: table.into(),
            template_table: None,
            extra: None,
        }
    }

    /// Build output records from another table's columns
    pub fn with_template_table(mut self, table: impl Into<String>) -> Self {
        let table = table.into();
        self.template_table = if table.is_empty() { None } else { Some(table) };
        self
    }

    pub fn with_extra(mut self, extra: S::Extra) -> Self {
        self.extra = Some(extra);
        self
    }

    pub fn key_spec(&self) -> &KeySpec {
        &self.key_spec
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Table the template record is built from
    pub fn template_table(&self) -> &str {
        self.template_table.as_deref().unwrap_or(&self.table)
    }

    pub fn scrub<St, Sc>(&self, rows: &[Record], store: &St, schema: &Sc) -> Result<Vec<Record>>
    where
        St: RecordStore + ?Sized,
        Sc: SchemaSource + ?Sized,
    {
        self.scrub_at(rows, store, schema, Utc::now())
    }

    /// Scrub a batch with an explicit batch timestamp
    pub fn scrub_at<St, Sc>(
        &self,
        rows: &[Record],
        store: &St,
        schema: &Sc,
        now: DateTime<Utc>,
    ) -> Result<Vec<Record>>
    where
        St: RecordStore + ?Sized,
        Sc: SchemaSource + ?Sized,
    {
        let index = build_index(rows, &self.key_spec, &self.table, store)?;
        let template = build_template(schema, self.template_table())?;
        let extra = self.extra.as_ref();

        let cleaned: Vec<Record> = rows
            .iter()
            .filter_map(|row| {
                let key = build_key(row, self.key_spec.csv_fields());
                let found = index.get(&key).map(Vec::as_slice);

                self.scrubber.scrub_row(row, found, &template, now, extra)
            })
            .collect();

        debug!(
            table = %self.table,
            rows = rows.len(),
            kept = cleaned.len(),
            "scrubbed batch"
        );

        Ok(cleaned)
    }
}

/// Null-valued record with every column of `table`
pub fn build_template<Sc: SchemaSource + ?Sized>(schema: &Sc, table: &str) -> Result<Record> {
    let columns = schema.column_names(table)?;

    if columns.is_empty() {
        return Err(CsvieError::SchemaResolution {
            table: table.to_string(),
        });
    }

    Ok(Record::with_columns(columns))
}

// ============================================================================
// VALUE RESOLUTION
// ============================================================================

/// Pick a field's final value.
///
/// A locked field keeps `current`. Otherwise a present `incoming` wins, then
/// the first present fallback. With no fallbacks, or none present, `current`
/// is kept.
pub fn resolve_value<T: Clone>(
    current: Option<T>,
    incoming: Option<T>,
    locked: bool,
    fallbacks: &[Option<T>],
) -> Option<T> {
    if locked {
        return current;
    }

    if incoming.is_some() {
        return incoming;
    }

    fallbacks
        .iter()
        .find_map(|v| v.clone())
        .or(current)
}

/// `resolve_value` for cells, where `Value::Null` is the absent value
pub fn resolve_field(current: &Value, incoming: &Value, locked: bool, fallbacks: &[Value]) -> Value {
    if locked {
        return current.clone();
    }

    if !incoming.is_null() {
        return incoming.clone();
    }

    fallbacks
        .iter()
        .find(|v| !v.is_null())
        .unwrap_or(current)
        .clone()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;
    use chrono::TimeZone;
    use rusqlite::Connection;
    use std::cell::RefCell;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE users (
                id INTEGER PRIMARY KEY,
                email TEXT,
                name TEXT,
                created_at TEXT,
                updated_at TEXT
            );
            INSERT INTO users VALUES (1, 'one@example.com', 'One', '2024-01-01', '2024-01-01');
            INSERT INTO users VALUES (3, 'three@example.com', NULL, '2024-01-03', '2024-01-03');",
        )
        .unwrap();
        conn
    }

    fn csv_row(id: &str, name: &str) -> Record {
        let mut row = Record::new();
        row.set("user_id", id);
        row.set("full_name", Value::from_cell(name));
        row
    }

    fn batch_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 14, 15, 9, 26).unwrap()
    }

    /// Updates existing users, drops rows with no match
    struct UpdateExisting;

    impl Scrubber for UpdateExisting {
        type Extra = ();

        fn scrub_row(
            &self,
            row: &Record,
            found: Option<&[Record]>,
            template: &Record,
            now: DateTime<Utc>,
            _extra: Option<&()>,
        ) -> Option<Record> {
            let existing = found?.first()?;
            let mut out = template.clone();

            for column in ["id", "email", "name", "created_at"] {
                out.set(column, existing.get(column).cloned().unwrap_or(Value::Null));
            }

            let name = resolve_field(
                existing.get("name").unwrap_or(&Value::Null),
                row.get("full_name").unwrap_or(&Value::Null),
                false,
                &[],
            );
            out.set("name", name);
            out.set("updated_at", now.to_rfc3339());

            Some(out)
        }
    }

    /// Records every call it receives
    #[derive(Default)]
    struct Recorder {
        calls: RefCell<Vec<(String, Option<usize>, DateTime<Utc>, Option<String>)>>,
    }

    impl Scrubber for Recorder {
        type Extra = String;

        fn scrub_row(
            &self,
            row: &Record,
            found: Option<&[Record]>,
            template: &Record,
            now: DateTime<Utc>,
            extra: Option<&String>,
        ) -> Option<Record> {
            assert!(template.values().all(Value::is_null));

            self.calls.borrow_mut().push((
                row.text("user_id").unwrap_or_default().to_string(),
                found.map(<[Record]>::len),
                now,
                extra.cloned(),
            ));

            let mut out = template.clone();
            out.set("id", row.get("user_id").cloned().unwrap_or(Value::Null));
            Some(out)
        }
    }

    #[test]
    fn test_scrub_drops_unmatched_rows() {
        let conn = setup();
        let store = SqliteStore::new(&conn);
        let cleaner = Cleaner::new(UpdateExisting, KeySpec::single("user_id", "id"), "users");

        let rows = vec![csv_row("1", "Uno"), csv_row("2", "Dos"), csv_row("3", "")];
        let cleaned = cleaner.scrub_at(&rows, &store, &store, batch_time()).unwrap();

        assert_eq!(cleaned.len(), 2);
        assert_eq!(cleaned[0].get("id"), Some(&Value::Integer(1)));
        assert_eq!(cleaned[0].text("name"), Some("Uno"));
        assert_eq!(cleaned[1].get("id"), Some(&Value::Integer(3)));
        // empty CSV cell falls back to the stored value, which is null
        assert_eq!(cleaned[1].get("name"), Some(&Value::Null));

        let columns: Vec<&str> = cleaned[0].columns().collect();
        assert_eq!(columns, vec!["id", "email", "name", "created_at", "updated_at"]);
    }

    #[test]
    fn test_scrubber_sees_matches_and_shared_timestamp() {
        let conn = setup();
        let store = SqliteStore::new(&conn);
        let cleaner = Cleaner::new(Recorder::default(), KeySpec::single("user_id", "id"), "users")
            .with_extra("nightly import".to_string());

        let rows = vec![csv_row("3", "a"), csv_row("2", "b"), csv_row("1", "c")];
        let cleaned = cleaner.scrub_at(&rows, &store, &store, batch_time()).unwrap();

        let ids: Vec<_> = cleaned.iter().map(|r| r.text("id").unwrap()).collect();
        assert_eq!(ids, vec!["3", "2", "1"]);

        let calls = cleaner.scrubber.calls.borrow();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0].1, Some(1));
        assert_eq!(calls[1].1, None);
        assert_eq!(calls[2].1, Some(1));
        assert!(calls.iter().all(|c| c.2 == batch_time()));
        assert!(calls.iter().all(|c| c.3.as_deref() == Some("nightly import")));
    }

    #[test]
    fn test_multiple_matches_arrive_in_store_order() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE orders (id INTEGER PRIMARY KEY, customer TEXT);
             INSERT INTO orders VALUES (10, 'acme');
             INSERT INTO orders VALUES (11, 'globex');
             INSERT INTO orders VALUES (12, 'acme');",
        )
        .unwrap();
        let store = SqliteStore::new(&conn);

        struct Collect(RefCell<Vec<i64>>);
        impl Scrubber for Collect {
            type Extra = ();
            fn scrub_row(
                &self,
                _row: &Record,
                found: Option<&[Record]>,
                _template: &Record,
                _now: DateTime<Utc>,
                _extra: Option<&()>,
            ) -> Option<Record> {
                for record in found.unwrap_or_default() {
                    if let Some(Value::Integer(id)) = record.get("id") {
                        self.0.borrow_mut().push(*id);
                    }
                }
                None
            }
        }

        let mut row = Record::new();
        row.set("customer", "acme");
        let cleaner = Cleaner::new(
            Collect(RefCell::new(Vec::new())),
            KeySpec::single("customer", "customer"),
            "orders",
        );

        let cleaned = cleaner.scrub(&[row], &store, &store).unwrap();
        assert!(cleaned.is_empty());
        assert_eq!(*cleaner.scrubber.0.borrow(), vec![10, 12]);
    }

    #[test]
    fn test_template_override_and_schema_error() {
        let conn = setup();
        conn.execute_batch("CREATE TABLE user_imports (id INTEGER, note TEXT);")
            .unwrap();
        let store = SqliteStore::new(&conn);

        let cleaner = Cleaner::new(Recorder::default(), KeySpec::single("user_id", "id"), "users")
            .with_template_table("user_imports");
        let cleaned = cleaner.scrub(&[csv_row("1", "x")], &store, &store).unwrap();
        let columns: Vec<&str> = cleaned[0].columns().collect();
        assert_eq!(columns, vec!["id", "note"]);

        let broken = Cleaner::new(Recorder::default(), KeySpec::single("user_id", "id"), "users")
            .with_template_table("nope");
        assert!(matches!(
            broken.scrub(&[csv_row("1", "x")], &store, &store),
            Err(CsvieError::SchemaResolution { .. })
        ));
    }

    #[test]
    fn test_resolve_value_precedence() {
        // lock wins over everything
        assert_eq!(resolve_value(Some("A"), None, true, &[Some("B")]), Some("A"));
        assert_eq!(resolve_value(Some("A"), Some("C"), true, &[]), Some("A"));
        // incoming wins over fallback
        assert_eq!(resolve_value(Some("A"), Some("C"), false, &[Some("B")]), Some("C"));
        // first non-null fallback
        assert_eq!(
            resolve_value(Some("A"), None, false, &[None, Some("B"), Some("C")]),
            Some("B")
        );
        // no fallbacks keeps current
        assert_eq!(resolve_value(Some("A"), None, false, &[]), Some("A"));
        // all fallbacks null keeps current
        assert_eq!(resolve_value(Some("A"), None, false, &[None, None]), Some("A"));
    }

    #[test]
    fn test_resolve_field_treats_null_as_absent() {
        let a = Value::from("A");
        assert_eq!(resolve_field(&a, &Value::Null, false, &[Value::Null, Value::from("B")]), Value::from("B"));
        assert_eq!(resolve_field(&a, &Value::from(5i64), false, &[]), Value::Integer(5));
        assert_eq!(resolve_field(&a, &Value::from("C"), true, &[]), a);
        assert_eq!(resolve_field(&Value::Null, &Value::Null, false, &[Value::Null]), Value::Null);
    }
}
