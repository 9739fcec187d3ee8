//! Benchmark utilities.

#![warn(missing_docs)]

use deferdb_codec::{Record, Value};
use rand::distributions::Alphanumeric;
use rand::Rng;

/// Generate a random alphanumeric string of `len` characters.
pub fn random_text(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Generate a record with `id` and `width` random text fields.
pub fn random_record(id: &str, width: usize) -> Record {
    let mut rng = rand::thread_rng();
    (0..width).fold(Record::new().with("id", id), |record, i| {
        let value = if rng.gen_bool(0.5) {
            Value::Integer(rng.gen())
        } else {
            Value::Text(random_text(16))
        };
        record.with(format!("field_{i}"), value)
    })
}

/// Generate `count` records with ids `bench-0..count`.
pub fn generate_records(count: usize, width: usize) -> Vec<Record> {
    (0..count)
        .map(|i| random_record(&format!("bench-{i}"), width))
        .collect()
}

/// Generate `count` dotted permission node names.
pub fn node_names(count: usize) -> Vec<String> {
    (0..count)
        .map(|i| format!("bench.{}.{}", i % 10, random_text(6)))
        .collect()
}
