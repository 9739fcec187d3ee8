//! Unique documents carrying a set of permission nodes.

use super::node::{NodeEntry, NODE_ENTRY_NAME};
use super::unique::UniqueDocument;
use crate::collection::Collection;
use crate::error::CoreResult;
use deferdb_codec::Record;
use std::ops::Deref;
use std::sync::Arc;

/// A [`UniqueDocument`] whose entries include [`NodeEntry`] values.
///
/// At most one entry per node name is attached. The `nodes` array is always
/// exported, empty or not.
#[derive(Clone, Debug)]
pub struct NodeDocument {
    unique: UniqueDocument,
}

impl NodeDocument {
    fn with_nodes(unique: UniqueDocument) -> CoreResult<Self> {
        unique.load_entries(NODE_ENTRY_NAME, NodeEntry::decode)?;
        Ok(Self { unique })
    }

    /// Creates a document with a fresh random identity.
    ///
    /// # Errors
    ///
    /// See [`UniqueDocument::generate`].
    pub fn generate(collection: &Collection) -> CoreResult<Self> {
        Self::with_nodes(UniqueDocument::generate(collection)?)
    }

    /// Creates a document with a caller-supplied identity.
    ///
    /// # Errors
    ///
    /// See [`UniqueDocument::claim`].
    pub fn claim(collection: &Collection, id: &str) -> CoreResult<Self> {
        Self::with_nodes(UniqueDocument::claim(collection, id)?)
    }

    /// Loads a document and its nodes from a stored record.
    ///
    /// # Errors
    ///
    /// Returns `MalformedRecord` if the identity or any node is malformed.
    pub fn hydrate(collection: &Collection, record: &Record) -> CoreResult<Self> {
        Self::with_nodes(UniqueDocument::hydrate(collection, record)?)
    }

    /// The underlying unique document.
    #[must_use]
    pub fn unique(&self) -> &UniqueDocument {
        &self.unique
    }

    /// Attached nodes in attach order.
    #[must_use]
    pub fn nodes(&self) -> Vec<Arc<NodeEntry>> {
        self.entries_of::<NodeEntry>()
    }

    /// The entry for `name`, ignoring case.
    #[must_use]
    pub fn node(&self, name: &str) -> Option<Arc<NodeEntry>> {
        self.nodes().into_iter().find(|entry| entry.matches(name))
    }

    /// Whether a node named `name` is attached.
    #[must_use]
    pub fn has_node(&self, name: &str) -> bool {
        self.node(name).is_some()
    }

    /// The flag for `name`, if the node is attached.
    #[must_use]
    pub fn flag_for(&self, name: &str) -> Option<bool> {
        self.node(name).map(|entry| entry.flag())
    }

    /// Attaches `entry`, replacing any entry for the same node.
    ///
    /// A replaced entry takes the new entry's position, receives the new
    /// flag, so other holders of it see the current value, and is detached.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` if `entry` belongs to another document,
    /// in which case this document is unchanged, or the save error.
    pub fn add_node(&self, entry: Arc<NodeEntry>, save: bool) -> CoreResult<()> {
        let existing = self.node(&entry.node());
        let flag = entry.flag();
        self.swap_entry(existing.as_deref(), entry)?;
        if let Some(existing) = existing {
            existing.set_flag(flag, false)?;
        }
        if save {
            self.save()?;
        }
        Ok(())
    }

    /// Detaches the entry for `entry`'s node. Returns whether one was
    /// attached.
    ///
    /// The document is saved when `save` is true, even if nothing matched.
    ///
    /// # Errors
    ///
    /// Returns the save error.
    pub fn remove_node(&self, entry: &NodeEntry, save: bool) -> CoreResult<bool> {
        let removed = match self.node(&entry.node()) {
            Some(existing) => self.detach_entry(existing.as_ref()),
            None => false,
        };
        if save {
            self.save()?;
        }
        Ok(removed)
    }

    /// Sets the flag for `name`, attaching a new entry if needed.
    ///
    /// # Errors
    ///
    /// Returns the save error when `save` is true.
    pub fn set_node(&self, name: &str, flag: bool, save: bool) -> CoreResult<Arc<NodeEntry>> {
        if let Some(existing) = self.node(name) {
            existing.set_flag(flag, save)?;
            return Ok(existing);
        }
        let entry = NodeEntry::new(name, flag);
        self.attach_entry(Arc::clone(&entry), save)?;
        Ok(entry)
    }
}

impl Deref for NodeDocument {
    type Target = UniqueDocument;

    fn deref(&self) -> &Self::Target {
        &self.unique
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Entry;
    use crate::{CoreError, Database};
    use deferdb_codec::Value;
    use std::time::Duration;

    fn stored(db: &Database, doc: &NodeDocument) -> Record {
        assert!(db.wait_idle(Duration::from_secs(5)));
        doc.collection()
            .unwrap()
            .find_one("id", doc.identity_value())
            .unwrap()
            .unwrap()
    }

    #[test]
    fn fresh_document_exports_empty_nodes() {
        let db = Database::open_in_memory().unwrap();
        let doc = NodeDocument::generate(&db.collection("groups")).unwrap();
        assert_eq!(doc.to_record().get("nodes"), Some(&Value::Array(vec![])));
    }

    #[test]
    fn set_node_is_case_insensitive() {
        let db = Database::open_in_memory().unwrap();
        let doc = NodeDocument::generate(&db.collection("groups")).unwrap();
        doc.set_node("Chat.Mute", true, false).unwrap();
        doc.set_node("chat.mute", false, false).unwrap();

        assert_eq!(doc.nodes().len(), 1);
        assert_eq!(doc.flag_for("CHAT.MUTE"), Some(false));
    }

    #[test]
    fn add_node_replaces_existing() {
        let db = Database::open_in_memory().unwrap();
        let doc = NodeDocument::generate(&db.collection("groups")).unwrap();
        let old = doc.set_node("a", false, false).unwrap();

        let new = NodeEntry::new("A", true);
        doc.add_node(Arc::clone(&new), false).unwrap();

        assert_eq!(doc.nodes().len(), 1);
        assert!(Arc::ptr_eq(&doc.node("a").unwrap(), &new));
        assert!(old.flag());
        assert!(!old.is_attached());
        assert!(new.is_attached());
    }

    #[test]
    fn add_node_of_foreign_entry_changes_nothing() {
        let db = Database::open_in_memory().unwrap();
        let groups = db.collection("groups");
        let a = NodeDocument::generate(&groups).unwrap();
        let b = NodeDocument::generate(&groups).unwrap();
        let mine = a.set_node("x", false, true).unwrap();
        let foreign = b.set_node("X", true, false).unwrap();
        assert!(db.wait_idle(Duration::from_secs(5)));
        assert!(!a.is_dirty());

        let result = a.add_node(Arc::clone(&foreign), false);
        assert!(matches!(result, Err(CoreError::InvalidOperation { .. })));

        assert!(Arc::ptr_eq(&a.node("x").unwrap(), &mine));
        assert!(!mine.flag());
        assert!(mine.is_attached());
        assert!(!a.is_dirty());
        assert!(b.has_node("x"));
        assert!(foreign.document().unwrap().ptr_eq(&b));
    }

    #[test]
    fn add_node_keeps_position() {
        let db = Database::open_in_memory().unwrap();
        let doc = NodeDocument::generate(&db.collection("groups")).unwrap();
        doc.set_node("a", true, false).unwrap();
        doc.set_node("b", true, false).unwrap();
        doc.add_node(NodeEntry::new("A", false), false).unwrap();

        let names: Vec<_> = doc.nodes().iter().map(|n| n.node()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(doc.flag_for("a"), Some(false));
    }

    #[test]
    fn remove_node_reports_presence() {
        let db = Database::open_in_memory().unwrap();
        let doc = NodeDocument::generate(&db.collection("groups")).unwrap();
        doc.set_node("a", true, false).unwrap();

        assert!(doc.remove_node(&NodeEntry::new("A", false), false).unwrap());
        assert!(!doc.remove_node(&NodeEntry::new("a", false), false).unwrap());
        assert!(!doc.has_node("a"));
    }

    #[test]
    fn nodes_round_trip_through_storage() {
        let db = Database::open_in_memory().unwrap();
        let groups = db.collection("groups");
        let doc = NodeDocument::claim(&groups, "admins").unwrap();
        doc.set_node("Sledge.Kick", true, false).unwrap();
        doc.set_node("sledge.ban", false, false).unwrap();
        doc.save().unwrap();

        let record = stored(&db, &doc);
        let loaded = NodeDocument::hydrate(&groups, &record).unwrap();
        assert!(!loaded.is_dirty());
        assert_eq!(loaded.flag_for("SLEDGE.KICK"), Some(true));
        assert_eq!(loaded.flag_for("sledge.ban"), Some(false));
        assert!(loaded.nodes().iter().all(|n| n.is_attached()));
    }

    #[test]
    fn node_flag_save_persists() {
        let db = Database::open_in_memory().unwrap();
        let doc = NodeDocument::generate(&db.collection("groups")).unwrap();
        let node = doc.set_node("a", false, true).unwrap();
        node.set_flag(true, true).unwrap();

        let record = stored(&db, &doc);
        let nodes = record.get("nodes").and_then(Value::as_array).unwrap();
        assert_eq!(nodes[0].as_record().unwrap().get_text("flag"), Some("1"));
    }

    #[test]
    fn hydrate_with_bad_node_is_malformed() {
        let db = Database::open_in_memory().unwrap();
        let record = Record::new().with("id", "g").with(
            "nodes",
            vec![Value::Map(Record::new().with("name", "a").with("flag", "2"))],
        );
        let result = NodeDocument::hydrate(&db.collection("groups"), &record);
        assert!(matches!(result, Err(CoreError::MalformedRecord { .. })));
    }
}
