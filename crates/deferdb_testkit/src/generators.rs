//! Property-based test generators using proptest.
//!
//! Provides strategies for generating records, values, and permission
//! nodes that stay inside what the engine accepts.

use deferdb_codec::{Record, Value};
use proptest::prelude::*;

/// Strategy for generating collection names.
pub fn collection_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_]{0,15}").expect("Invalid regex")
}

/// Strategy for generating field names.
pub fn field_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-zA-Z0-9]{0,11}").expect("Invalid regex")
}

/// Strategy for generating scalar values (no arrays or maps).
pub fn scalar_value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Integer),
        "[ -~]{0,24}".prop_map(Value::Text),
    ]
}

/// Strategy for generating values nested up to a few levels.
pub fn value_strategy() -> impl Strategy<Value = Value> {
    scalar_value_strategy().prop_recursive(3, 32, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map(field_name_strategy(), inner, 0..4).prop_map(|map| {
                Value::Map(map.into_iter().fold(Record::new(), |record, (k, v)| {
                    record.with(k, v)
                }))
            }),
        ]
    })
}

/// Strategy for generating records of up to `max_fields` fields.
pub fn record_strategy(max_fields: usize) -> impl Strategy<Value = Record> {
    prop::collection::btree_map(field_name_strategy(), value_strategy(), 0..=max_fields)
        .prop_map(|map| {
            map.into_iter()
                .fold(Record::new(), |record, (k, v)| record.with(k, v))
        })
}

/// Strategy for generating permission node names like `chat.Mute`.
pub fn node_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Za-z][A-Za-z0-9]{0,7}(\\.[A-Za-z][A-Za-z0-9]{0,7}){0,3}")
        .expect("Invalid regex")
}

/// Strategy for generating node name and flag pairs.
pub fn nodes_strategy(max: usize) -> impl Strategy<Value = Vec<(String, bool)>> {
    prop::collection::vec((node_name_strategy(), any::<bool>()), 0..=max)
}
