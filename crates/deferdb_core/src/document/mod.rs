//! Documents and their entries.
//!
//! A [`Document`] is an in-memory record identified by one field value,
//! optionally bound to a [`Collection`]. It holds plain fields plus any
//! number of [`Entry`] values. Saving serializes all of it into one
//! [`Record`] and enqueues an upsert keyed on the identity field:
//!
//! ```text
//! { <identity_field>: <identity_value>,
//!   <plain fields>...,
//!   <entry name>: [ <entry export>, ... ], ... }
//! ```
//!
//! Documents are cheap cloneable handles. Entries point back at their
//! document through a weak [`EntryLink`], so dropping every handle to a
//! document frees it even while entries are still referenced elsewhere.
//!
//! "Clean" means the in-memory state matches the last record handed to the
//! queue, not that the write has reached storage.

mod entry;
mod node;
mod nodes;
mod unique;

pub use entry::{Entry, EntryLink};
pub use node::{NodeEntry, NODE_ENTRY_NAME};
pub use nodes::NodeDocument;
pub use unique::{IdentityOrigin, UniqueDocument, UniqueId, UNIQUE_ID_FIELD};

use crate::collection::Collection;
use crate::error::{CoreError, CoreResult};
use crate::transaction::Transaction;
use deferdb_codec::{Record, Value};
use parking_lot::Mutex;
use std::any::Any;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

struct AttachedEntry {
    entry: Arc<dyn Entry>,
    any: Arc<dyn Any + Send + Sync>,
}

#[derive(Default)]
struct DocumentState {
    fields: Record,
    entries: Vec<AttachedEntry>,
    /// Every entry name seen, so emptied groups still export as `[]`.
    entry_groups: BTreeSet<String>,
    dirty: bool,
    deleted: bool,
}

pub(crate) struct DocumentCore {
    collection: Option<Collection>,
    identity_field: String,
    identity_value: Value,
    state: Mutex<DocumentState>,
}

impl DocumentCore {
    fn build_record(&self, state: &DocumentState) -> Record {
        let mut record = state.fields.clone();
        record.insert(self.identity_field.clone(), self.identity_value.clone());

        for group in &state.entry_groups {
            let exports: Vec<Value> = state
                .entries
                .iter()
                .filter(|attached| attached.entry.name() == group)
                .map(|attached| Value::Map(attached.entry.export()))
                .collect();
            record.insert(group.clone(), Value::Array(exports));
        }
        record
    }

    fn position_of<E: Entry + ?Sized>(state: &DocumentState, entry: &E) -> Option<usize> {
        state
            .entries
            .iter()
            .position(|attached| std::ptr::eq(attached.entry.link(), entry.link()))
    }
}

/// A handle to a document.
///
/// # Example
///
/// ```rust
/// use deferdb_codec::Value;
/// use deferdb_core::{Database, Document};
///
/// let db = Database::open_in_memory().unwrap();
/// let profiles = db.collection("profiles");
///
/// let doc = Document::new(&profiles, "name", "alice").unwrap();
/// doc.set_field("level", 3i64, false).unwrap();
/// doc.set_field("title", "admin", false).unwrap();
/// doc.save().unwrap();
/// assert!(!doc.is_dirty());
///
/// db.shutdown().unwrap();
/// let stored = profiles.find_one("name", &Value::from("alice")).unwrap().unwrap();
/// assert_eq!(stored.get("level"), Some(&Value::Integer(3)));
/// ```
#[derive(Clone)]
pub struct Document {
    core: Arc<DocumentCore>,
}

impl Document {
    /// Creates a fresh document in `collection`. It starts dirty.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` if `identity_value` is null.
    pub fn new(
        collection: &Collection,
        identity_field: impl Into<String>,
        identity_value: impl Into<Value>,
    ) -> CoreResult<Self> {
        Self::build(
            Some(collection.clone()),
            identity_field.into(),
            identity_value.into(),
            Record::new(),
            true,
        )
    }

    /// Creates a document with no backing collection.
    ///
    /// It can be built up and exported, but `save` and `delete` fail.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` if `identity_value` is null.
    pub fn transient(
        identity_field: impl Into<String>,
        identity_value: impl Into<Value>,
    ) -> CoreResult<Self> {
        Self::build(
            None,
            identity_field.into(),
            identity_value.into(),
            Record::new(),
            true,
        )
    }

    /// Loads a document from a stored record. It starts clean.
    ///
    /// Every field except the identity is kept as a plain field until
    /// claimed by [`Document::load_entries`].
    ///
    /// # Errors
    ///
    /// Returns `MalformedRecord` if the identity field is missing or null.
    pub fn hydrate(
        collection: &Collection,
        identity_field: impl Into<String>,
        record: &Record,
    ) -> CoreResult<Self> {
        let identity_field = identity_field.into();
        let mut fields = record.clone();
        let identity_value = match fields.remove(&identity_field) {
            Some(value) if !value.is_null() => value,
            _ => {
                return Err(CoreError::malformed(
                    collection.name(),
                    format!("record has no value for identity field '{identity_field}'"),
                ))
            }
        };
        Self::build(
            Some(collection.clone()),
            identity_field,
            identity_value,
            fields,
            false,
        )
    }

    fn build(
        collection: Option<Collection>,
        identity_field: String,
        identity_value: Value,
        fields: Record,
        dirty: bool,
    ) -> CoreResult<Self> {
        if identity_value.is_null() {
            return Err(CoreError::invalid_operation(format!(
                "identity field '{identity_field}' cannot be null"
            )));
        }
        let state = DocumentState {
            fields,
            dirty,
            ..DocumentState::default()
        };
        Ok(Self {
            core: Arc::new(DocumentCore {
                collection,
                identity_field,
                identity_value,
                state: Mutex::new(state),
            }),
        })
    }

    pub(crate) fn from_core(core: Arc<DocumentCore>) -> Self {
        Self { core }
    }

    #[cfg(test)]
    pub(crate) fn core(&self) -> &Arc<DocumentCore> {
        &self.core
    }

    /// The backing collection, if any.
    #[must_use]
    pub fn collection(&self) -> Option<&Collection> {
        self.core.collection.as_ref()
    }

    /// Name of the identifying field.
    #[must_use]
    pub fn identity_field(&self) -> &str {
        &self.core.identity_field
    }

    /// Value of the identifying field. Never null.
    #[must_use]
    pub fn identity_value(&self) -> &Value {
        &self.core.identity_value
    }

    /// Whether there are changes not yet handed to the queue.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.core.state.lock().dirty
    }

    /// Whether `delete` has been called.
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.core.state.lock().deleted
    }

    /// Marks the document as changed.
    ///
    /// Entries call this from mutators that do not save immediately.
    pub fn mark_dirty(&self) {
        self.core.state.lock().dirty = true;
    }

    /// Whether both handles refer to the same document.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.core, &other.core)
    }

    /// Value of a plain field, or the identity value for the identity field.
    #[must_use]
    pub fn field(&self, key: &str) -> Option<Value> {
        if key == self.core.identity_field {
            return Some(self.core.identity_value.clone());
        }
        self.core.state.lock().fields.get(key).cloned()
    }

    /// Text value of a plain field.
    #[must_use]
    pub fn field_text(&self, key: &str) -> Option<String> {
        self.field(key).and_then(|v| v.as_text().map(str::to_string))
    }

    /// All plain fields, without the identity or entry groups.
    #[must_use]
    pub fn fields(&self) -> Record {
        self.core.state.lock().fields.clone()
    }

    /// Sets a plain field, saving immediately when `save` is true.
    ///
    /// With `save` false the change stays in memory so several fields can
    /// go out in one write.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` for the identity field or an entry group
    /// name, or the save error.
    pub fn set_field(
        &self,
        key: impl Into<String>,
        value: impl Into<Value>,
        save: bool,
    ) -> CoreResult<()> {
        let key = key.into();
        if key == self.core.identity_field {
            return Err(CoreError::invalid_operation(format!(
                "identity field '{key}' cannot be changed"
            )));
        }
        {
            let mut state = self.core.state.lock();
            if state.entry_groups.contains(&key) {
                return Err(CoreError::invalid_operation(format!(
                    "field '{key}' is an entry group"
                )));
            }
            state.fields.insert(key, value);
            state.dirty = true;
        }
        if save {
            self.save()?;
        }
        Ok(())
    }

    /// Clears a plain field by writing null.
    ///
    /// Upserts never remove stored keys, so the null is what reaches
    /// storage.
    ///
    /// # Errors
    ///
    /// Same as [`Document::set_field`].
    pub fn clear_field(&self, key: impl Into<String>, save: bool) -> CoreResult<()> {
        self.set_field(key, Value::Null, save)
    }

    /// Attaches `entry`, saving immediately when `save` is true.
    ///
    /// Attaching an entry already on this document is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` if the entry belongs to another live
    /// document, or the save error.
    pub fn attach_entry<T: Entry>(&self, entry: Arc<T>, save: bool) -> CoreResult<()> {
        self.swap_entry(None::<&T>, entry)?;
        if save {
            self.save()?;
        }
        Ok(())
    }

    /// Attaches `new` in place of `old` in one step. If `new` belongs to
    /// another document nothing changes. When `old` is not attached, `new`
    /// is appended.
    pub(crate) fn swap_entry<E: Entry + ?Sized, T: Entry>(
        &self,
        old: Option<&E>,
        new: Arc<T>,
    ) -> CoreResult<()> {
        let mut state = self.core.state.lock();
        if DocumentCore::position_of(&state, new.as_ref()).is_some() {
            return Ok(());
        }
        if !new.link().try_attach(&self.core) {
            return Err(CoreError::invalid_operation(format!(
                "entry '{}' belongs to another document",
                new.name()
            )));
        }

        let attached = AttachedEntry {
            entry: new.clone(),
            any: new.clone(),
        };
        match old.and_then(|old| DocumentCore::position_of(&state, old)) {
            Some(index) => {
                let removed = std::mem::replace(&mut state.entries[index], attached);
                removed.entry.link().detach();
            }
            None => state.entries.push(attached),
        }
        state.entry_groups.insert(new.name().to_string());
        state.dirty = true;
        Ok(())
    }

    /// Detaches `entry` without saving. Returns whether it was attached.
    pub fn detach_entry<E: Entry + ?Sized>(&self, entry: &E) -> bool {
        let mut state = self.core.state.lock();
        let Some(index) = DocumentCore::position_of(&state, entry) else {
            return false;
        };
        let removed = state.entries.remove(index);
        removed.entry.link().detach();
        state.dirty = true;
        true
    }

    /// Detaches `entry` and saves, so storage reflects the removal on the
    /// next drain. Returns whether it was attached.
    ///
    /// # Errors
    ///
    /// Returns the save error.
    pub fn remove_entry<E: Entry + ?Sized>(&self, entry: &E) -> CoreResult<bool> {
        if !self.detach_entry(entry) {
            return Ok(false);
        }
        self.save()?;
        Ok(true)
    }

    /// Attached entries in attach order.
    #[must_use]
    pub fn entries(&self) -> Vec<Arc<dyn Entry>> {
        self.core
            .state
            .lock()
            .entries
            .iter()
            .map(|attached| Arc::clone(&attached.entry))
            .collect()
    }

    /// Attached entries of concrete type `T`, in attach order.
    #[must_use]
    pub fn entries_of<T: Entry>(&self) -> Vec<Arc<T>> {
        self.core
            .state
            .lock()
            .entries
            .iter()
            .filter_map(|attached| Arc::clone(&attached.any).downcast::<T>().ok())
            .collect()
    }

    /// Number of attached entries.
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.core.state.lock().entries.len()
    }

    /// Hydrates the entry group `name` from the field of the same name.
    ///
    /// `decode` is called once per element. The field is removed from the
    /// plain fields, the group is registered even when the field is absent,
    /// and the document's dirty state is left unchanged.
    ///
    /// # Errors
    ///
    /// Returns `MalformedRecord` if the field is not an array of maps, or
    /// the first error from `decode`. Nothing is attached on error.
    pub fn load_entries<T, F>(&self, name: &str, mut decode: F) -> CoreResult<Vec<Arc<T>>>
    where
        T: Entry,
        F: FnMut(&Record) -> CoreResult<T>,
    {
        let raw = self.core.state.lock().fields.get(name).cloned();
        let context = || self.context();

        let mut decoded = Vec::new();
        match raw {
            None | Some(Value::Null) => {}
            Some(Value::Array(items)) => {
                for item in &items {
                    let record = item.as_record().ok_or_else(|| {
                        CoreError::malformed(
                            context(),
                            format!("entry in '{name}' is {}, expected map", item.kind()),
                        )
                    })?;
                    decoded.push(Arc::new(decode(record)?));
                }
            }
            Some(other) => {
                return Err(CoreError::malformed(
                    context(),
                    format!("field '{name}' is {}, expected array", other.kind()),
                ))
            }
        }

        let mut state = self.core.state.lock();
        state.fields.remove(name);
        state.entry_groups.insert(name.to_string());
        for entry in &decoded {
            entry.link().attach(&self.core);
            state.entries.push(AttachedEntry {
                entry: entry.clone(),
                any: entry.clone(),
            });
        }
        Ok(decoded)
    }

    /// Serializes the identity, plain fields, and every entry group.
    #[must_use]
    pub fn to_record(&self) -> Record {
        let state = self.core.state.lock();
        self.core.build_record(&state)
    }

    /// Serializes the document and enqueues an upsert on the identity field.
    ///
    /// The record is built and enqueued under the document's lock, so saves
    /// of one document reach the queue in the order their state was taken.
    /// The document is clean afterwards. If the queue refuses the write it
    /// stays dirty.
    ///
    /// # Errors
    ///
    /// Returns `IllegalState` without a backing collection,
    /// `InvalidOperation` after `delete`, or the queue's error.
    pub fn save(&self) -> CoreResult<()> {
        let collection = self.require_collection("save")?;
        let mut state = self.core.state.lock();
        if state.deleted {
            return Err(CoreError::invalid_operation(format!(
                "{} was deleted and cannot be saved",
                self.describe()
            )));
        }

        let record = self.core.build_record(&state);
        let transaction =
            Transaction::upsert(collection.name(), record, self.core.identity_field.as_str())?;
        collection.enqueue(transaction)?;
        state.dirty = false;
        Ok(())
    }

    /// Enqueues removal of every stored record with this identity.
    ///
    /// The handle must not be saved afterwards. Deleting again is allowed
    /// and matches nothing once the first delete has drained.
    ///
    /// # Errors
    ///
    /// Returns `IllegalState` without a backing collection, or the queue's
    /// error.
    pub fn delete(&self) -> CoreResult<()> {
        let collection = self.require_collection("delete")?;
        let mut state = self.core.state.lock();
        collection.enqueue(Transaction::delete(
            collection.name(),
            self.core.identity_field.as_str(),
            self.core.identity_value.clone(),
        ))?;
        state.deleted = true;
        Ok(())
    }

    fn require_collection(&self, action: &str) -> CoreResult<&Collection> {
        self.core.collection.as_ref().ok_or_else(|| {
            CoreError::illegal_state(format!(
                "cannot {action} {}: no backing collection",
                self.describe()
            ))
        })
    }

    fn context(&self) -> String {
        match &self.core.collection {
            Some(collection) => format!("{}[{}]", collection.name(), self.core.identity_value),
            None => format!("transient[{}]", self.core.identity_value),
        }
    }

    fn describe(&self) -> String {
        format!(
            "document {} = {}",
            self.core.identity_field, self.core.identity_value
        )
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("collection", &self.collection().map(Collection::name))
            .field("identity_field", &self.core.identity_field)
            .field("identity_value", &self.core.identity_value)
            .field("entries", &self.entry_count())
            .finish()
    }
}
