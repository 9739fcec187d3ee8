//! Permission group and user records.
//!
//! These are plain compositions of [`NodeDocument`] with a few fields. They
//! carry no permission rules (inheritance, resolution); those belong to the
//! application.

use crate::collection::Collection;
use crate::document::{NodeDocument, UniqueId};
use crate::error::{CoreError, CoreResult};
use deferdb_codec::{Record, Value};
use std::ops::Deref;

/// Default collection for permission groups.
pub const GROUPS_COLLECTION: &str = "permission_groups";

/// Default collection for permission users.
pub const USERS_COLLECTION: &str = "permission_users";

const NAME_FIELD: &str = "name";
const PARENT_FIELD: &str = "parentId";
const GROUP_FIELD: &str = "groupId";

fn optional_id(document: &NodeDocument, field: &str) -> Option<UniqueId> {
    match document.field(field) {
        Some(Value::Text(token)) if !token.is_empty() => Some(UniqueId::new(token)),
        _ => None,
    }
}

fn set_optional_id(
    document: &NodeDocument,
    field: &str,
    id: Option<&UniqueId>,
    save: bool,
) -> CoreResult<()> {
    match id {
        Some(id) => document.set_field(field, id.as_str(), save),
        None => document.clear_field(field, save),
    }
}

/// A named group of permission nodes with an optional parent group.
#[derive(Clone, Debug)]
pub struct PermissionGroup {
    document: NodeDocument,
}

impl PermissionGroup {
    /// Creates a group with a generated id. It is not saved.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` for an empty name.
    pub fn create(collection: &Collection, name: &str) -> CoreResult<Self> {
        if name.is_empty() {
            return Err(CoreError::invalid_operation("group name cannot be empty"));
        }
        let document = NodeDocument::generate(collection)?;
        document.set_field(NAME_FIELD, name, false)?;
        Ok(Self { document })
    }

    /// Loads a group from a stored record.
    ///
    /// # Errors
    ///
    /// Returns `MalformedRecord` if the id, name, or any node is malformed.
    pub fn hydrate(collection: &Collection, record: &Record) -> CoreResult<Self> {
        if record.get_text(NAME_FIELD).is_none() {
            return Err(CoreError::malformed(
                collection.name(),
                format!("group has no text '{NAME_FIELD}'"),
            ));
        }
        Ok(Self {
            document: NodeDocument::hydrate(collection, record)?,
        })
    }

    /// Group name.
    #[must_use]
    pub fn name(&self) -> String {
        self.document.field_text(NAME_FIELD).unwrap_or_default()
    }

    /// Renames the group.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` for an empty name, or the save error.
    pub fn set_name(&self, name: &str, save: bool) -> CoreResult<()> {
        if name.is_empty() {
            return Err(CoreError::invalid_operation("group name cannot be empty"));
        }
        self.document.set_field(NAME_FIELD, name, save)
    }

    /// Id of the parent group.
    #[must_use]
    pub fn parent_id(&self) -> Option<UniqueId> {
        optional_id(&self.document, PARENT_FIELD)
    }

    /// Sets or clears the parent group.
    ///
    /// # Errors
    ///
    /// Returns the save error.
    pub fn set_parent_id(&self, parent: Option<&UniqueId>, save: bool) -> CoreResult<()> {
        set_optional_id(&self.document, PARENT_FIELD, parent, save)
    }
}

impl Deref for PermissionGroup {
    type Target = NodeDocument;

    fn deref(&self) -> &Self::Target {
        &self.document
    }
}

/// Per-player permission nodes, identified by the player's id.
#[derive(Clone, Debug)]
pub struct PermissionUser {
    document: NodeDocument,
}

impl PermissionUser {
    /// Creates a user record claiming `player_id`. It is not saved.
    ///
    /// # Errors
    ///
    /// Returns `IdentityCollision` if a record for the player exists.
    pub fn create(collection: &Collection, player_id: &str) -> CoreResult<Self> {
        Ok(Self {
            document: NodeDocument::claim(collection, player_id)?,
        })
    }

    /// Loads a user from a stored record.
    ///
    /// # Errors
    ///
    /// Returns `MalformedRecord` if the id or any node is malformed.
    pub fn hydrate(collection: &Collection, record: &Record) -> CoreResult<Self> {
        Ok(Self {
            document: NodeDocument::hydrate(collection, record)?,
        })
    }

    /// Id of the group the user belongs to.
    #[must_use]
    pub fn group_id(&self) -> Option<UniqueId> {
        optional_id(&self.document, GROUP_FIELD)
    }

    /// Sets or clears the user's group.
    ///
    /// # Errors
    ///
    /// Returns the save error.
    pub fn set_group_id(&self, group: Option<&UniqueId>, save: bool) -> CoreResult<()> {
        set_optional_id(&self.document, GROUP_FIELD, group, save)
    }
}

impl Deref for PermissionUser {
    type Target = NodeDocument;

    fn deref(&self) -> &Self::Target {
        &self.document
    }
}

/// Hydrates every group in `collection`.
///
/// Each record gets its own result, so one malformed record does not hide
/// the others.
///
/// # Errors
///
/// Returns an error only if the collection cannot be read.
pub fn load_groups(collection: &Collection) -> CoreResult<Vec<CoreResult<PermissionGroup>>> {
    Ok(collection
        .scan()?
        .iter()
        .map(|record| PermissionGroup::hydrate(collection, record))
        .collect())
}

/// Hydrates every user in `collection`.
///
/// # Errors
///
/// Returns an error only if the collection cannot be read.
pub fn load_users(collection: &Collection) -> CoreResult<Vec<CoreResult<PermissionUser>>> {
    Ok(collection
        .scan()?
        .iter()
        .map(|record| PermissionUser::hydrate(collection, record))
        .collect())
}
