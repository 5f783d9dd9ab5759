//! Property-based tests for the query builder and backends.
//!
//! Uses proptest to verify invariants across random inputs:
//! - Caller values never reach the statement template
//! - Integer columns only accept exact integer text
//! - Malformed table names are rejected before registry lookup
//! - Inserted rows come back unchanged from the memory and `SQLite` backends

// Property tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used)]

use proptest::prelude::*;
use spendlog::storage::{QueryBuilder, SchemaRegistry, Storage, validate_identifier};
use spendlog::{Error, Row, Value};

proptest! {
    /// Property: a value containing a quote never appears in the template.
    #[test]
    fn prop_values_stay_out_of_template(
        payload in "[a-zA-Z0-9 ;-]{0,10}'[a-zA-Z0-9 ;'()-]{0,20}"
    ) {
        let registry = SchemaRegistry::builtin();
        let builder = QueryBuilder::new(&registry);

        let filter = Row::new().with("name", payload.as_str());
        let stmt = builder.build_select("users", Some(&filter), Some(10)).unwrap();
        prop_assert!(!stmt.template().contains('\''));
        prop_assert_eq!(stmt.param("p_name"), Some(&Value::Text(payload.clone())));

        let values = Row::new().with("id", 1).with("name", payload.as_str());
        let stmt = builder.build_insert("users", &values).unwrap();
        prop_assert!(!stmt.template().contains(&payload));
    }

    /// Property: non-numeric text bound to an integer column is a type mismatch.
    #[test]
    fn prop_non_numeric_text_rejected(text in "[a-zA-Z ]{1,12}") {
        let registry = SchemaRegistry::builtin();
        let builder = QueryBuilder::new(&registry);

        let filter = Row::new().with("user_id", text.as_str());
        let result = builder.build_select("expenses", Some(&filter), None);
        let is_mismatch = matches!(result, Err(Error::TypeMismatch { .. }));
        prop_assert!(is_mismatch);
    }

    /// Property: exact integer text coerces to the same integer.
    #[test]
    fn prop_integer_text_coerces(n in any::<i64>()) {
        let registry = SchemaRegistry::builtin();
        let builder = QueryBuilder::new(&registry);

        let filter = Row::new().with("user_id", n.to_string());
        let stmt = builder.build_select("expenses", Some(&filter), None).unwrap();
        prop_assert_eq!(stmt.param("$p_user_id"), Some(&Value::Integer(n)));
    }

    /// Property: names with a leading digit or a stray symbol are invalid.
    #[test]
    fn prop_malformed_table_names_rejected(
        name in prop_oneof![
            "[0-9][a-z_]{0,10}",
            "[a-z]{1,5}[ ;.'\"()-][a-z ]{0,8}",
        ]
    ) {
        prop_assert!(validate_identifier(&name).is_err());

        let storage = Storage::in_memory();
        let result = storage.select(&name, None, None);
        let is_invalid = matches!(result, Err(Error::InvalidIdentifier { .. }));
        prop_assert!(is_invalid);
    }

    /// Property: well-formed but unregistered names are unknown tables.
    #[test]
    fn prop_unregistered_tables_unknown(name in "zz_[a-z0-9_]{1,20}") {
        let storage = Storage::in_memory();
        let result = storage.select(&name, None, None);
        let is_unknown = matches!(result, Err(Error::UnknownTable { .. }));
        prop_assert!(is_unknown);
    }

    /// Property: memory and `SQLite` return inserted rows unchanged, in order.
    #[test]
    fn prop_insert_select_roundtrip(
        names in prop::collection::vec("\\PC{0,24}", 1..8)
    ) {
        for storage in [Storage::in_memory(), Storage::sqlite_in_memory().unwrap()] {
            let expected: Vec<Row> = (1_i64..)
                .zip(&names)
                .map(|(id, name)| Row::new().with("id", id).with("name", name))
                .collect();

            for row in &expected {
                prop_assert!(storage.insert("users", row).unwrap());
            }
            prop_assert_eq!(storage.select("users", None, None).unwrap(), expected);
        }
    }
}
