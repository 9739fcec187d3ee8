//! Cross-crate tests of the write-behind engine.

use deferdb_core::{
    Config, CoreError, Database, Document, Entry, NodeDocument, NodeEntry, Record, TransactionKind,
    UniqueDocument, UniqueId, Value,
};
use deferdb_testkit::prelude::*;
use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

#[test]
fn last_save_wins_for_one_document() {
    let test_db = TestDatabase::memory();
    let profiles = test_db.collection("profiles");
    let doc = Document::new(&profiles, "name", "alice").unwrap();

    for level in 0..500i64 {
        doc.set_field("level", level, true).unwrap();
    }
    test_db.settle();

    let stored = profiles.find("name", &Value::from("alice")).unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].get("level"), Some(&Value::Integer(499)));
}

#[test]
fn three_saves_leave_the_third_value() {
    let test_db = TestDatabase::memory();
    let counters = test_db.collection("counters");
    let doc = UniqueDocument::generate(&counters).unwrap();

    doc.set_field("n", 1i64, true).unwrap();
    doc.set_field("n", 2i64, true).unwrap();
    doc.set_field("n", 3i64, true).unwrap();
    test_db.settle();

    let record = counters
        .find_one("id", doc.identity_value())
        .unwrap()
        .unwrap();
    assert_eq!(record.get("n"), Some(&Value::Integer(3)));
    assert_eq!(test_db.stats().inserted, 1);
}

#[test]
fn shutdown_drains_everything_accepted() {
    let backend = Arc::new(FaultyBackend::in_memory());
    backend.set_latency(Some(Duration::from_micros(50)));
    let db = Database::open(backend.clone()).unwrap();
    let items = db.collection("items");

    for i in 0..1_000i64 {
        items.upsert(Record::new().with("id", i), "id").unwrap();
    }
    db.shutdown().unwrap();

    assert_eq!(items.count().unwrap(), 1_000);
    assert_eq!(db.pending_count(), 0);
    assert_eq!(db.stats().executed, 1_000);

    let late = items.upsert(Record::new().with("id", -1i64), "id");
    assert!(matches!(late, Err(CoreError::DatabaseClosed)));
}

#[test]
fn claim_of_stored_id_collides() {
    let test_db = TestDatabase::memory();
    let groups = test_db.collection("groups");

    let first = UniqueDocument::claim(&groups, "admins").unwrap();
    first.save().unwrap();
    test_db.settle();

    let second = UniqueDocument::claim(&groups, "admins");
    match second {
        Err(CoreError::IdentityCollision { value, .. }) => assert_eq!(value, "admins"),
        other => panic!("expected collision, got {other:?}"),
    }
}

#[test]
fn delete_is_idempotent() {
    let test_db = TestDatabase::memory();
    let groups = test_db.collection("groups");
    let doc = NodeDocument::claim(&groups, "temp").unwrap();
    doc.set_node("a", true, true).unwrap();
    test_db.settle();

    doc.delete().unwrap();
    doc.delete().unwrap();
    groups.delete("id", "never-existed").unwrap();
    test_db.settle();

    assert_eq!(groups.count().unwrap(), 0);
    let stats = test_db.stats();
    assert_eq!(stats.deletes_applied, 3);
    assert_eq!(stats.records_removed, 1);
    assert_eq!(stats.failed, 0);

    assert!(matches!(doc.save(), Err(CoreError::InvalidOperation { .. })));
}

#[test]
fn generated_ids_do_not_repeat() {
    let seen: HashSet<UniqueId> = (0..10_000).map(|_| UniqueId::generate()).collect();
    assert_eq!(seen.len(), 10_000);
}

#[test]
fn nodes_survive_a_round_trip() {
    let (test_db, groups) = scenarios::node_groups(
        "groups",
        &["admins", "mods"],
        &[("Chat.Mute", true), ("chat.kick", false)],
    );
    let collection = test_db.collection("groups");

    for group in &groups {
        let record = collection
            .find_one("id", group.identity_value())
            .unwrap()
            .unwrap();
        let loaded = NodeDocument::hydrate(&collection, &record).unwrap();
        assert_eq!(loaded.nodes().len(), 2);
        assert_eq!(loaded.flag_for("CHAT.MUTE"), Some(true));
        assert_eq!(loaded.flag_for("chat.kick"), Some(false));
    }
}

#[test]
fn removing_last_node_reaches_storage() {
    let test_db = TestDatabase::memory();
    let groups = test_db.collection("groups");
    let doc = NodeDocument::generate(&groups).unwrap();
    let node = doc.set_node("only", true, true).unwrap();
    assert!(doc.remove_node(&node, true).unwrap());
    test_db.settle();

    let record = groups.find_one("id", doc.identity_value()).unwrap().unwrap();
    assert_eq!(record.get("nodes"), Some(&Value::Array(vec![])));
}

#[test]
fn replaced_node_entry_sees_new_flag() {
    let test_db = TestDatabase::memory();
    let doc = NodeDocument::generate(&test_db.collection("groups")).unwrap();
    let old = doc.set_node("x", false, false).unwrap();
    doc.add_node(NodeEntry::new("X", true), true).unwrap();
    test_db.settle();

    assert!(old.flag());
    assert!(!old.is_attached());
    assert_eq!(doc.nodes().len(), 1);
}

#[test]
fn failed_transaction_does_not_stop_the_queue() {
    let backend = Arc::new(FaultyBackend::in_memory());
    let db = Database::open(backend.clone()).unwrap();
    let failures = db.subscribe_failures();

    backend.fail_collection("broken");
    let broken = db.collection("broken");
    let fine = db.collection("fine");

    fine.upsert(Record::new().with("id", 1i64), "id").unwrap();
    let failed_id = broken
        .upsert(Record::new().with("id", 1i64), "id")
        .unwrap();
    fine.upsert(Record::new().with("id", 2i64), "id").unwrap();
    db.shutdown().unwrap();

    assert_eq!(fine.count().unwrap(), 2);
    assert_eq!(broken.count().unwrap(), 0);

    let stats = db.stats();
    assert_eq!(stats.executed, 2);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.settled(), 3);

    let failure = failures.recv_timeout(Duration::from_secs(1)).unwrap();
    assert_eq!(failure.id, failed_id);
    assert_eq!(failure.collection, "broken");
    assert_eq!(failure.kind, TransactionKind::Upsert);
    assert_eq!(db.recent_failures().len(), 1);
    assert_eq!(backend.injected_count(), 1);
}

#[test]
fn failed_save_is_not_retried() {
    let backend = Arc::new(FaultyBackend::in_memory());
    let db = Database::open(backend.clone()).unwrap();
    let groups = db.collection("groups");

    backend.set_fail_writes(true);
    let doc = NodeDocument::generate(&groups).unwrap();
    doc.set_node("a", true, true).unwrap();
    assert!(db.wait_idle(IDLE_TIMEOUT));
    assert!(!doc.is_dirty());

    backend.reset();
    assert!(db.wait_idle(IDLE_TIMEOUT));
    assert_eq!(groups.count().unwrap(), 0);
    assert_eq!(backend.writes().len(), 1);
}

#[test]
fn bounded_queue_pushes_back() {
    let backend = Arc::new(FaultyBackend::in_memory());
    backend.set_latency(Some(Duration::from_millis(200)));
    let config = Config::default().queue_capacity(2);
    let db = Database::open_with_config(backend.clone(), config).unwrap();
    let items = db.collection("items");

    let results: Vec<_> = (0..4i64)
        .map(|i| items.upsert(Record::new().with("id", i), "id"))
        .collect();
    assert!(results
        .iter()
        .any(|r| matches!(r, Err(CoreError::QueueFull { capacity: 2 }))));

    db.shutdown().unwrap();
    let accepted = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(items.count().unwrap(), accepted);
    assert_eq!(db.stats().rejected as usize, 4 - accepted);
}

#[test]
fn file_store_survives_reopen() {
    let test_db = TestDatabase::file();
    let groups = test_db.collection("groups");
    let doc = NodeDocument::claim(&groups, "admins").unwrap();
    doc.set_field("name", "Admins", false).unwrap();
    doc.set_node("server.ban", true, true).unwrap();
    groups.upsert(Record::new().with("id", "gone"), "id").unwrap();
    groups.delete("id", "gone").unwrap();
    drop(doc);
    drop(groups);

    let test_db = test_db.reopen();
    assert!(test_db.recovery().unwrap().is_clean());

    let groups = test_db.collection("groups");
    assert_eq!(groups.count().unwrap(), 1);
    let record = groups.find_one("id", &Value::from("admins")).unwrap().unwrap();
    let loaded = NodeDocument::hydrate(&groups, &record).unwrap();
    assert_eq!(loaded.field_text("name").as_deref(), Some("Admins"));
    assert_eq!(loaded.flag_for("SERVER.BAN"), Some(true));
}

#[test]
fn concurrent_writers_keep_their_own_order() {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let config = StressConfig {
        operations: 500,
        threads: 8,
        key_space: 1,
        ..StressConfig::default()
    };
    let result = stress_concurrent_upserts(&db, &config);
    assert_eq!(result.failed_ops, 0);

    let collection = db.collection(&config.collection);
    for record in collection.scan().unwrap() {
        assert_eq!(record.get("seq"), Some(&Value::Integer(499)));
    }
}

#[test]
fn record_export_is_json_friendly() {
    let doc = Document::transient("id", "x").unwrap();
    doc.set_field("n", 7i64, false).unwrap();
    let json = serde_json::to_value(doc.to_record()).unwrap();
    assert_eq!(json, serde_json::json!({"id": "x", "n": 7}));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn generated_nodes_survive_hydration(nodes in nodes_strategy(16)) {
        let test_db = TestDatabase::memory();
        let groups = test_db.collection("groups");
        let doc = NodeDocument::generate(&groups).unwrap();

        // Names differing only in case share one entry; the last flag wins.
        let mut expected: Vec<(String, bool)> = Vec::new();
        for (name, flag) in &nodes {
            doc.set_node(name, *flag, false).unwrap();
            let lower = name.to_lowercase();
            match expected.iter_mut().find(|(seen, _)| *seen == lower) {
                Some(slot) => slot.1 = *flag,
                None => expected.push((lower, *flag)),
            }
        }

        let loaded = NodeDocument::hydrate(&groups, &doc.to_record()).unwrap();
        let actual: Vec<(String, bool)> = loaded
            .nodes()
            .iter()
            .map(|entry| (entry.node().to_lowercase(), entry.flag()))
            .collect();
        prop_assert_eq!(actual, expected);
        prop_assert!(!loaded.is_dirty());
    }

    #[test]
    fn generated_records_are_stored_as_given(
        collection in collection_name_strategy(),
        key in field_name_strategy(),
        record in record_strategy(6),
    ) {
        let test_db = TestDatabase::memory();
        let target = test_db.collection(&collection);
        let record = record.with("key", key.as_str());
        target.upsert(record.clone(), "key").unwrap();
        test_db.settle();

        let stored = target.find_one("key", &Value::from(key.as_str())).unwrap();
        prop_assert_eq!(stored, Some(record));
    }
}
