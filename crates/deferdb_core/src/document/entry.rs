//! Entries: named sub-components of a document.

use super::{Document, DocumentCore};
use crate::error::{CoreError, CoreResult};
use deferdb_codec::Record;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};

/// The non-owning back-reference from an entry to its document.
///
/// Holds a `Weak` pointer, so an entry never keeps its document alive.
/// A link that was never attached, was detached, or whose document has
/// been dropped reports no document.
#[derive(Debug, Default)]
pub struct EntryLink {
    document: Mutex<Weak<DocumentCore>>,
}

impl EntryLink {
    /// Creates a detached link.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The owning document, if attached and still alive.
    #[must_use]
    pub fn document(&self) -> Option<Document> {
        self.document.lock().upgrade().map(Document::from_core)
    }

    /// Whether the link points at a live document.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.document.lock().strong_count() > 0
    }

    pub(crate) fn attach(&self, core: &Arc<DocumentCore>) {
        *self.document.lock() = Arc::downgrade(core);
    }

    /// Points the link at `core` unless another live document holds it.
    /// Check and store happen under one lock.
    pub(crate) fn try_attach(&self, core: &Arc<DocumentCore>) -> bool {
        let mut document = self.document.lock();
        if document.strong_count() > 0 && !std::ptr::eq(document.as_ptr(), Arc::as_ptr(core)) {
            return false;
        }
        *document = Arc::downgrade(core);
        true
    }

    pub(crate) fn detach(&self) {
        *self.document.lock() = Weak::new();
    }
}

/// A named sub-component of a [`Document`].
///
/// Entries export themselves as a sub-record. When the document is saved,
/// every attached entry's export is written into an array field named after
/// [`Entry::name`], in attach order.
///
/// Persistence always goes through the owning document: `save` saves the
/// whole document and `delete` detaches the entry and saves. A detached
/// entry may be mutated freely but cannot be saved or deleted.
///
/// # Locking
///
/// `export` is called while the document's lock is held. Implementations
/// must release their own lock before calling `save`, or a concurrent save
/// of the document can deadlock against them.
pub trait Entry: Send + Sync + 'static {
    /// Name of the array field this entry is exported into.
    fn name(&self) -> &str;

    /// Back-reference to the owning document.
    fn link(&self) -> &EntryLink;

    /// Serializes this entry's fields.
    fn export(&self) -> Record;

    /// Saves the owning document.
    ///
    /// # Errors
    ///
    /// Returns `IllegalState` if the entry is detached, or the document's
    /// save error.
    fn save(&self) -> CoreResult<()> {
        let document = self.document().ok_or_else(|| {
            CoreError::illegal_state(format!("entry '{}' has no document", self.name()))
        })?;
        document.save()
    }

    /// Removes this entry from its document and saves the document.
    ///
    /// # Errors
    ///
    /// Returns `IllegalState` if the entry is detached, or the document's
    /// save error.
    fn delete(&self) -> CoreResult<()> {
        let document = self.document().ok_or_else(|| {
            CoreError::illegal_state(format!("entry '{}' has no document", self.name()))
        })?;
        document.remove_entry(self)?;
        Ok(())
    }

    /// Whether the entry belongs to a live document.
    fn is_attached(&self) -> bool {
        self.link().is_attached()
    }

    /// The owning document.
    fn document(&self) -> Option<Document> {
        self.link().document()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_link_is_detached() {
        let link = EntryLink::new();
        assert!(!link.is_attached());
        assert!(link.document().is_none());
    }

    #[test]
    fn link_does_not_keep_document_alive() {
        let document = Document::transient("id", "a").unwrap();
        let link = EntryLink::new();
        link.attach(document.core());
        assert!(link.is_attached());

        drop(document);
        assert!(!link.is_attached());
    }
}
