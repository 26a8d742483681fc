// 🔑 Composite Keys - Join CSV rows to stored records
// The same field-name list is applied on both sides so keys are comparable

use crate::error::{CsvieError, Result};
use crate::record::Record;

// ============================================================================
// KEY SPECIFICATION
// ============================================================================

/// Ordered `(csv field, store field)` pairs identifying a row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpec {
    csv_fields: Vec<String>,
    store_fields: Vec<String>,
}

impl KeySpec {
    /// Build from two parallel field lists
    pub fn new<C, S>(csv_fields: C, store_fields: S) -> Result<Self>
    where
        C: IntoIterator,
        C::Item: Into<String>,
        S: IntoIterator,
        S::Item: Into<String>,
    {
        let csv_fields: Vec<String> = csv_fields.into_iter().map(Into::into).collect();
        let store_fields: Vec<String> = store_fields.into_iter().map(Into::into).collect();

        if csv_fields.is_empty() {
            return Err(CsvieError::InvalidKeySpec(
                "at least one key field is required".to_string(),
            ));
        }

        if csv_fields.len() != store_fields.len() {
            return Err(CsvieError::InvalidKeySpec(format!(
                "{} csv fields but {} store fields",
                csv_fields.len(),
                store_fields.len()
            )));
        }

        Ok(KeySpec {
            csv_fields,
            store_fields,
        })
    }

    /// Single-field key, the common case
    pub fn single(csv_field: impl Into<String>, store_field: impl Into<String>) -> Self {
        KeySpec {
            csv_fields: vec![csv_field.into()],
            store_fields: vec![store_field.into()],
        }
    }

    pub fn csv_fields(&self) -> &[String] {
        &self.csv_fields
    }

    pub fn store_fields(&self) -> &[String] {
        &self.store_fields
    }

    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.csv_fields
            .iter()
            .zip(&self.store_fields)
            .map(|(c, s)| (c.as_str(), s.as_str()))
    }

    pub fn len(&self) -> usize {
        self.csv_fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.csv_fields.is_empty()
    }
}

// ============================================================================
// KEY BUILDER
// ============================================================================

/// Concatenate the values of `fields` in order, with no separator.
///
/// A field missing from the row contributes the empty string, as does a null.
pub fn build_key<S: AsRef<str>>(row: &Record, fields: &[S]) -> String {
    let mut key = String::new();

    for field in fields {
        if let Some(value) = row.get(field.as_ref()) {
            key.push_str(&value.key_part());
        }
    }

    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Value;

    fn row(pairs: &[(&str, &str)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| (*k, Value::from(*v)))
            .collect()
    }

    #[test]
    fn test_key_follows_field_order_not_row_order() {
        let r1 = row(&[("first", "Ada"), ("last", "Lovelace"), ("age", "36")]);
        let r2 = row(&[("age", "36"), ("last", "Lovelace"), ("first", "Ada")]);

        assert_eq!(build_key(&r1, &["last", "first"]), "LovelaceAda");
        assert_eq!(build_key(&r2, &["last", "first"]), "LovelaceAda");
    }

    #[test]
    fn test_missing_field_is_empty() {
        let r = row(&[("id", "7")]);
        assert_eq!(build_key(&r, &["id", "sku"]), "7");
        assert_eq!(build_key(&r, &["sku"]), "");
    }

    #[test]
    fn test_numeric_and_text_values_share_keys() {
        let csv_row = row(&[("id", "12")]);
        let mut stored = Record::new();
        stored.set("user_id", 12i64);

        assert_eq!(build_key(&csv_row, &["id"]), build_key(&stored, &["user_id"]));
    }

    #[test]
    fn test_keys_can_collide_without_separator() {
        let a = row(&[("x", "1"), ("y", "23")]);
        let b = row(&[("x", "12"), ("y", "3")]);

        assert_eq!(build_key(&a, &["x", "y"]), build_key(&b, &["x", "y"]));
    }

    #[test]
    fn test_key_spec_validation() {
        assert!(KeySpec::new(Vec::<String>::new(), Vec::<String>::new()).is_err());
        assert!(KeySpec::new(["a", "b"], ["a"]).is_err());

        let spec = KeySpec::new(["sku", "store"], ["product_sku", "store_id"]).unwrap();
        let pairs: Vec<_> = spec.pairs().collect();
        assert_eq!(pairs, vec![("sku", "product_sku"), ("store", "store_id")]);
    }
}
