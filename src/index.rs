// 🗂️ Index Builder - Hash stored records by composite key
// One query per batch; the merge pass only reads the result

use crate::error::Result;
use crate::key::{build_key, KeySpec};
use crate::record::{Record, Value};
use crate::store::RecordStore;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Composite key → matched records, in store result order
pub type Index = HashMap<String, Vec<Record>>;

/// Distinct values of `field` across `rows`, in first-seen order.
/// Rows missing the field are skipped.
pub fn distinct_values(rows: &[Record], field: &str) -> Vec<Value> {
    let mut seen = HashSet::new();
    let mut values = Vec::new();

    for value in rows.iter().filter_map(|row| row.get(field)) {
        if seen.insert(value.key_part().into_owned()) {
            values.push(value.clone());
        }
    }

    values
}

/// Group records by the composite key of `fields`
pub fn group_by_key<S: AsRef<str>>(records: Vec<Record>, fields: &[S]) -> Index {
    let mut index: Index = HashMap::new();

    for record in records {
        index
            .entry(build_key(&record, fields))
            .or_default()
            .push(record);
    }

    index
}

/// Build the lookup index for a batch of CSV rows.
///
/// Every key pair adds a `store_field IN (csv values)` filter to the same
/// query, so a stored record must satisfy all of them at once.
pub fn build_index<S: RecordStore + ?Sized>(
    rows: &[Record],
    key_spec: &KeySpec,
    table: &str,
    store: &S,
) -> Result<Index> {
    let filters: Vec<(String, Vec<Value>)> = key_spec
        .pairs()
        .map(|(csv_field, store_field)| (store_field.to_string(), distinct_values(rows, csv_field)))
        .collect();

    let records = store.fetch_where_in(table, &filters)?;
    debug!(table, rows = rows.len(), matched = records.len(), "built scrub index");

    Ok(group_by_key(records, key_spec.store_fields()))
}
