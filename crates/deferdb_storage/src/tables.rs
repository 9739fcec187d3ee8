//! Collection tables shared by the in-memory and file backends.

use crate::backend::UpsertOutcome;
use deferdb_codec::{Record, Value};
use std::collections::BTreeMap;

/// Records grouped by collection name, in insertion order.
#[derive(Debug, Default, Clone)]
pub(crate) struct Tables {
    collections: BTreeMap<String, Vec<Record>>,
}

impl Tables {
    pub(crate) fn find(&self, collection: &str, field: &str, value: &Value) -> Vec<Record> {
        self.collections
            .get(collection)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| r.matches(field, value))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub(crate) fn scan(&self, collection: &str) -> Vec<Record> {
        self.collections.get(collection).cloned().unwrap_or_default()
    }

    pub(crate) fn upsert(
        &mut self,
        collection: &str,
        field: &str,
        value: &Value,
        fields: &Record,
    ) -> UpsertOutcome {
        let records = self.collections.entry(collection.to_string()).or_default();

        if let Some(existing) = records.iter_mut().find(|r| r.matches(field, value)) {
            existing.set_fields(fields);
            return UpsertOutcome::Updated;
        }

        let mut record = fields.clone();
        record.insert(field, value.clone());
        records.push(record);
        UpsertOutcome::Inserted
    }

    /// Appends `record` without matching, so seeded data may hold duplicates.
    pub(crate) fn insert_raw(&mut self, collection: &str, record: Record) {
        self.collections
            .entry(collection.to_string())
            .or_default()
            .push(record);
    }

    pub(crate) fn remove(&mut self, collection: &str, field: &str, value: &Value) -> usize {
        let Some(records) = self.collections.get_mut(collection) else {
            return 0;
        };

        let before = records.len();
        records.retain(|r| !r.matches(field, value));
        let removed = before - records.len();

        if records.is_empty() {
            self.collections.remove(collection);
        }
        removed
    }

    pub(crate) fn names(&self) -> Vec<String> {
        self.collections.keys().cloned().collect()
    }

    /// Iterates `(collection, record)` pairs, used when rewriting the log.
    pub(crate) fn iter_records(&self) -> impl Iterator<Item = (&str, &Record)> {
        self.collections
            .iter()
            .flat_map(|(name, records)| records.iter().map(move |r| (name.as_str(), r)))
    }

    pub(crate) fn record_count(&self) -> usize {
        self.collections.values().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_inserts_then_updates_first_match() {
        let mut tables = Tables::default();
        let id = Value::from("a");

        let fields = Record::new().with("n", 1i64);
        assert_eq!(tables.upsert("c", "id", &id, &fields), UpsertOutcome::Inserted);

        let fields = Record::new().with("n", 2i64);
        assert_eq!(tables.upsert("c", "id", &id, &fields), UpsertOutcome::Updated);

        let found = tables.find("c", "id", &id);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].get("n"), Some(&Value::Integer(2)));
        assert_eq!(found[0].get_text("id"), Some("a"));
    }

    #[test]
    fn remove_drops_empty_collection() {
        let mut tables = Tables::default();
        let id = Value::from("a");
        tables.upsert("c", "id", &id, &Record::new());
        assert_eq!(tables.remove("c", "id", &id), 1);
        assert!(tables.names().is_empty());
        assert_eq!(tables.remove("c", "id", &id), 0);
    }

    #[test]
    fn remove_matches_by_any_field() {
        let mut tables = Tables::default();
        tables.upsert("c", "id", &Value::from("a"), &Record::new().with("owner", "x"));
        tables.upsert("c", "id", &Value::from("b"), &Record::new().with("owner", "x"));
        tables.upsert("c", "id", &Value::from("c"), &Record::new().with("owner", "y"));

        assert_eq!(tables.remove("c", "owner", &Value::from("x")), 2);
        assert_eq!(tables.record_count(), 1);
    }
}
