// 🗄️ Store - Queryable records and schema lookup
// Collaborators are passed in explicitly; SqliteStore is the rusqlite-backed one

use crate::error::{CsvieError, Result};
use crate::record::{Record, Value};
use rusqlite::{params_from_iter, Connection};
use tracing::debug;

// ============================================================================
// COLLABORATOR TRAITS
// ============================================================================

/// A collection that can be filtered by "field in set" and materialized
pub trait RecordStore {
    /// Fetch every record of `table` whose fields satisfy all filters.
    ///
    /// Each filter is `(field, allowed values)`; filters combine with AND.
    fn fetch_where_in(&self, table: &str, filters: &[(String, Vec<Value>)]) -> Result<Vec<Record>>;
}

/// Supplies column and table names
pub trait SchemaSource {
    fn column_names(&self, table: &str) -> Result<Vec<String>>;

    fn table_names(&self) -> Result<Vec<String>>;
}

/// Quote an identifier for SQLite
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

// ============================================================================
// SQLITE STORE
// ============================================================================

pub struct SqliteStore<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteStore<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        SqliteStore { conn }
    }

    pub fn connection(&self) -> &Connection {
        self.conn
    }

    /// Every row of a table, in rowid order
    pub fn select_all(&self, table: &str) -> Result<Vec<Record>> {
        let sql = format!("SELECT * FROM {}", quote_ident(table));
        self.query_records(&sql, Vec::new())
    }

    /// Delete every row of a table
    pub fn truncate(&self, table: &str) -> Result<usize> {
        let deleted = self
            .conn
            .execute(&format!("DELETE FROM {}", quote_ident(table)), [])?;

        Ok(deleted)
    }

    /// Insert rows in a single transaction, returns number of rows inserted
    pub fn insert_rows(&self, table: &str, columns: &[String], rows: &[Vec<Value>]) -> Result<usize> {
        self.insert_with(table, columns, rows, "INSERT")
    }

    /// Like `insert_rows`, but rows violating a constraint are skipped
    pub fn insert_rows_ignoring_conflicts(
        &self,
        table: &str,
        columns: &[String],
        rows: &[Vec<Value>],
    ) -> Result<usize> {
        self.insert_with(table, columns, rows, "INSERT OR IGNORE")
    }

    fn insert_with(&self, table: &str, columns: &[String], rows: &[Vec<Value>], verb: &str) -> Result<usize> {
        if columns.is_empty() {
            return Err(CsvieError::SchemaResolution {
                table: table.to_string(),
            });
        }

        let column_list = columns
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = (1..=columns.len())
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "{} INTO {} ({}) VALUES ({})",
            verb,
            quote_ident(table),
            column_list,
            placeholders
        );

        let tx = self.conn.unchecked_transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(&sql)?;
            for row in rows {
                inserted += stmt.execute(params_from_iter(row.iter()))?;
            }
        }
        tx.commit()?;

        Ok(inserted)
    }

    fn query_records(&self, sql: &str, params: Vec<Value>) -> Result<Vec<Record>> {
        let mut stmt = self.conn.prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

        let records = stmt
            .query_map(params_from_iter(params.iter()), |row| {
                let mut record = Record::new();
                for (i, name) in columns.iter().enumerate() {
                    record.set(name.as_str(), Value::from(row.get_ref(i)?));
                }
                Ok(record)
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(records)
    }
}

impl RecordStore for SqliteStore<'_> {
    fn fetch_where_in(&self, table: &str, filters: &[(String, Vec<Value>)]) -> Result<Vec<Record>> {
        // An empty IN list can never match
        if filters.iter().any(|(_, values)| values.is_empty()) {
            return Ok(Vec::new());
        }

        let mut sql = format!("SELECT * FROM {}", quote_ident(table));
        let mut params = Vec::new();

        for (i, (field, values)) in filters.iter().enumerate() {
            let placeholders = (0..values.len())
                .map(|n| format!("?{}", params.len() + n + 1))
                .collect::<Vec<_>>()
                .join(", ");

            sql.push_str(if i == 0 { " WHERE " } else { " AND " });
            sql.push_str(&format!("{} IN ({})", quote_ident(field), placeholders));
            params.extend(values.iter().cloned());
        }

        debug!(table, filters = filters.len(), params = params.len(), "querying store");
        self.query_records(&sql, params)
    }
}

impl SchemaSource for SqliteStore<'_> {
    fn column_names(&self, table: &str) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare(&format!("PRAGMA table_info({})", quote_ident(table)))?;

        let columns = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        // PRAGMA table_info yields nothing for an unknown table
        if columns.is_empty() {
            return Err(CsvieError::SchemaResolution {
                table: table.to_string(),
            });
        }

        Ok(columns)
    }

    fn table_names(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT name FROM sqlite_master
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
             ORDER BY name",
        )?;

        let tables = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;

        Ok(tables)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE products (
                id INTEGER PRIMARY KEY,
                sku TEXT NOT NULL,
                store_id INTEGER NOT NULL,
                price REAL
            );
            INSERT INTO products (id, sku, store_id, price) VALUES (1, 'A-1', 10, 2.5);
            INSERT INTO products (id, sku, store_id, price) VALUES (2, 'A-1', 20, 3.0);
            INSERT INTO products (id, sku, store_id, price) VALUES (3, 'B-7', 10, NULL);",
        )
        .unwrap();
        conn
    }

    #[test]
    fn test_fetch_where_in_single_filter() {
        let conn = setup();
        let store = SqliteStore::new(&conn);

        let records = store
            .fetch_where_in("products", &[("sku".to_string(), vec![Value::from("A-1")])])
            .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("id"), Some(&Value::Integer(1)));
        assert_eq!(records[1].get("store_id"), Some(&Value::Integer(20)));
    }

    #[test]
    fn test_fetch_where_in_chains_filters_with_and() {
        let conn = setup();
        let store = SqliteStore::new(&conn);

        // Text "10" matches the integer column through SQLite affinity
        let records = store
            .fetch_where_in(
                "products",
                &[
                    ("sku".to_string(), vec![Value::from("A-1"), Value::from("B-7")]),
                    ("store_id".to_string(), vec![Value::from("10")]),
                ],
            )
            .unwrap();

        let ids: Vec<_> = records.iter().map(|r| r.get("id").cloned()).collect();
        assert_eq!(ids, vec![Some(Value::Integer(1)), Some(Value::Integer(3))]);
    }

    #[test]
    fn test_empty_value_set_matches_nothing() {
        let conn = setup();
        let store = SqliteStore::new(&conn);

        let records = store
            .fetch_where_in("products", &[("sku".to_string(), Vec::new())])
            .unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_unknown_table_is_data_access_error() {
        let conn = setup();
        let store = SqliteStore::new(&conn);

        let err = store
            .fetch_where_in("missing", &[("id".to_string(), vec![Value::from(1i64)])])
            .unwrap_err();
        assert!(matches!(err, CsvieError::DataAccess(_)));
    }

    #[test]
    fn test_schema_lookup() {
        let conn = setup();
        let store = SqliteStore::new(&conn);

        assert_eq!(
            store.column_names("products").unwrap(),
            vec!["id", "sku", "store_id", "price"]
        );
        assert_eq!(store.table_names().unwrap(), vec!["products"]);
        assert!(matches!(
            store.column_names("missing"),
            Err(CsvieError::SchemaResolution { .. })
        ));
    }

    #[test]
    fn test_insert_and_truncate() {
        let conn = setup();
        let store = SqliteStore::new(&conn);

        let columns = vec!["id".to_string(), "sku".to_string(), "store_id".to_string()];
        let inserted = store
            .insert_rows(
                "products",
                &columns,
                &[vec![Value::from(4i64), Value::from("C-2"), Value::from(30i64)]],
            )
            .unwrap();
        assert_eq!(inserted, 1);
        assert_eq!(store.select_all("products").unwrap().len(), 4);

        let skipped = store
            .insert_rows_ignoring_conflicts(
                "products",
                &columns,
                &[
                    vec![Value::from(4i64), Value::from("C-2"), Value::from(30i64)],
                    vec![Value::from(5i64), Value::from("C-3"), Value::from(30i64)],
                ],
            )
            .unwrap();
        assert_eq!(skipped, 1);
        assert!(store.insert_rows("products", &columns, &[vec![Value::from(5i64), Value::from("x"), Value::from(1i64)]]).is_err());

        assert_eq!(store.truncate("products").unwrap(), 5);
        assert!(store.select_all("products").unwrap().is_empty());
    }
}
