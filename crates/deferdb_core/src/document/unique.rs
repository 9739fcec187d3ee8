//! Documents identified by a globally unique token.

use super::Document;
use crate::collection::Collection;
use crate::error::{CoreError, CoreResult};
use deferdb_codec::{Record, Value};
use std::fmt;
use std::ops::Deref;
use uuid::Uuid;

/// Identity field of every unique document.
pub const UNIQUE_ID_FIELD: &str = "id";

/// A unique identity token.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UniqueId(String);

impl UniqueId {
    /// Generates a random token (UUID v4).
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Wraps an existing token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The token text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UniqueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UniqueId {
    fn from(token: &str) -> Self {
        Self::new(token)
    }
}

impl From<String> for UniqueId {
    fn from(token: String) -> Self {
        Self(token)
    }
}

impl From<Uuid> for UniqueId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid.to_string())
    }
}

impl From<UniqueId> for Value {
    fn from(id: UniqueId) -> Self {
        Value::Text(id.0)
    }
}

/// How a unique document got its identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityOrigin {
    /// Random token, not checked against storage.
    Generated,
    /// Caller-supplied token, checked against storage.
    Claimed,
    /// Read from an existing stored record.
    Hydrated,
}

/// A document whose `id` field holds a unique token.
///
/// Identity comes from exactly one of three paths:
///
/// | Path | Token | Storage check | Starts |
/// |------|-------|---------------|--------|
/// | [`generate`](Self::generate) | random UUID v4 | none | dirty |
/// | [`claim`](Self::claim) | caller's | must not exist | dirty |
/// | [`hydrate`](Self::hydrate) | from the record | none | clean |
///
/// The claim check reads storage directly, so it does not see upserts still
/// waiting in the queue.
///
/// Derefs to [`Document`] for fields, entries, `save` and `delete`.
#[derive(Clone, Debug)]
pub struct UniqueDocument {
    document: Document,
    origin: IdentityOrigin,
}

impl UniqueDocument {
    /// Creates a document with a fresh random identity.
    ///
    /// # Errors
    ///
    /// Does not fail in practice; the signature matches the other paths.
    pub fn generate(collection: &Collection) -> CoreResult<Self> {
        let id = UniqueId::generate();
        Ok(Self {
            document: Document::new(collection, UNIQUE_ID_FIELD, id)?,
            origin: IdentityOrigin::Generated,
        })
    }

    /// Creates a document with a caller-supplied identity.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` for an empty token, `IdentityCollision`
    /// if a stored record already has it, or a storage read error.
    ///
    /// Only storage is checked. A save of the same id still in the queue is
    /// not seen.
    pub fn claim(collection: &Collection, id: impl Into<UniqueId>) -> CoreResult<Self> {
        let id = id.into();
        if id.as_str().is_empty() {
            return Err(CoreError::invalid_operation("unique id cannot be empty"));
        }

        let value = Value::from(id.as_str());
        if collection.exists(UNIQUE_ID_FIELD, &value)? {
            return Err(CoreError::identity_collision(
                collection.name(),
                UNIQUE_ID_FIELD,
                id.as_str(),
            ));
        }

        Ok(Self {
            document: Document::new(collection, UNIQUE_ID_FIELD, value)?,
            origin: IdentityOrigin::Claimed,
        })
    }

    /// Loads a document from a stored record.
    ///
    /// # Errors
    ///
    /// Returns `MalformedRecord` if `id` is missing or is not text.
    pub fn hydrate(collection: &Collection, record: &Record) -> CoreResult<Self> {
        match record.get(UNIQUE_ID_FIELD) {
            Some(Value::Text(token)) if !token.is_empty() => {}
            Some(Value::Text(_)) => {
                return Err(CoreError::malformed(
                    collection.name(),
                    format!("'{UNIQUE_ID_FIELD}' is empty"),
                ))
            }
            Some(other) => {
                return Err(CoreError::malformed(
                    collection.name(),
                    format!("'{UNIQUE_ID_FIELD}' is {}, expected text", other.kind()),
                ))
            }
            None => {
                return Err(CoreError::malformed(
                    collection.name(),
                    format!("record has no '{UNIQUE_ID_FIELD}'"),
                ))
            }
        }
        Ok(Self {
            document: Document::hydrate(collection, UNIQUE_ID_FIELD, record)?,
            origin: IdentityOrigin::Hydrated,
        })
    }

    /// The identity token.
    #[must_use]
    pub fn id(&self) -> UniqueId {
        UniqueId::new(self.document.identity_value().as_text().unwrap_or_default())
    }

    /// How the identity was assigned.
    #[must_use]
    pub fn origin(&self) -> IdentityOrigin {
        self.origin
    }

    /// The underlying document.
    #[must_use]
    pub fn document(&self) -> &Document {
        &self.document
    }
}

impl Deref for UniqueDocument {
    type Target = Document;

    fn deref(&self) -> &Self::Target {
        &self.document
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;
    use std::collections::HashSet;
    use std::time::Duration;

    #[test]
    fn generated_ids_are_distinct() {
        let ids: HashSet<UniqueId> = (0..1000).map(|_| UniqueId::generate()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn generate_starts_dirty() {
        let db = Database::open_in_memory().unwrap();
        let doc = UniqueDocument::generate(&db.collection("c")).unwrap();
        assert_eq!(doc.origin(), IdentityOrigin::Generated);
        assert!(doc.is_dirty());
        assert_eq!(doc.identity_field(), UNIQUE_ID_FIELD);
        assert_eq!(doc.id().as_str().len(), 36);
    }

    #[test]
    fn claim_existing_collides() {
        let db = Database::open_in_memory().unwrap();
        let users = db.collection("users");
        UniqueDocument::claim(&users, "alice").unwrap().save().unwrap();
        assert!(db.wait_idle(Duration::from_secs(5)));

        let result = UniqueDocument::claim(&users, "alice");
        assert!(matches!(result, Err(CoreError::IdentityCollision { .. })));
    }

    #[test]
    fn claim_fresh_succeeds() {
        let db = Database::open_in_memory().unwrap();
        let doc = UniqueDocument::claim(&db.collection("users"), "bob").unwrap();
        assert_eq!(doc.origin(), IdentityOrigin::Claimed);
        assert_eq!(doc.id(), UniqueId::from("bob"));
        assert!(doc.is_dirty());
    }

    #[test]
    fn claim_empty_is_invalid() {
        let db = Database::open_in_memory().unwrap();
        let result = UniqueDocument::claim(&db.collection("users"), "");
        assert!(matches!(result, Err(CoreError::InvalidOperation { .. })));
    }

    #[test]
    fn hydrate_is_clean() {
        let db = Database::open_in_memory().unwrap();
        let record = Record::new().with("id", "carol").with("x", 1i64);
        let doc = UniqueDocument::hydrate(&db.collection("users"), &record).unwrap();
        assert_eq!(doc.origin(), IdentityOrigin::Hydrated);
        assert!(!doc.is_dirty());
        assert_eq!(doc.id().as_str(), "carol");
    }

    #[test]
    fn hydrate_rejects_non_text_id() {
        let db = Database::open_in_memory().unwrap();
        let record = Record::new().with("id", 5i64);
        let result = UniqueDocument::hydrate(&db.collection("users"), &record);
        assert!(matches!(result, Err(CoreError::MalformedRecord { .. })));
    }
}
