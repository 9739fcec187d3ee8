//! Node entries: named boolean permission toggles.

use super::entry::{Entry, EntryLink};
use crate::error::{CoreError, CoreResult};
use deferdb_codec::{Record, Value};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// Entry group name nodes are exported under.
pub const NODE_ENTRY_NAME: &str = "nodes";

const FLAG_ON: &str = "1";
const FLAG_OFF: &str = "0";

struct NodeState {
    node: String,
    flag: bool,
}

/// One permission node and its flag.
///
/// Node names are lowercased on write, so lookups are case-insensitive.
/// Exported as `{name: <node>, flag: "1" | "0"}`.
pub struct NodeEntry {
    link: EntryLink,
    state: Mutex<NodeState>,
}

impl NodeEntry {
    /// Creates a detached node entry.
    #[must_use]
    pub fn new(node: &str, flag: bool) -> Arc<Self> {
        Arc::new(Self::detached(node, flag))
    }

    fn detached(node: &str, flag: bool) -> Self {
        Self {
            link: EntryLink::new(),
            state: Mutex::new(NodeState {
                node: node.to_lowercase(),
                flag,
            }),
        }
    }

    /// Parses an exported node.
    ///
    /// # Errors
    ///
    /// Returns `MalformedRecord` if `name` is missing or `flag` is anything
    /// other than `"1"` or `"0"`.
    pub fn decode(record: &Record) -> CoreResult<Self> {
        let node = record
            .get_text("name")
            .ok_or_else(|| CoreError::malformed("node", "missing text field 'name'"))?;
        let flag = match record.get("flag") {
            Some(Value::Text(text)) if text == FLAG_ON => true,
            Some(Value::Text(text)) if text == FLAG_OFF => false,
            Some(other) => {
                return Err(CoreError::malformed(
                    "node",
                    format!("flag of '{node}' is {other}, expected \"1\" or \"0\""),
                ))
            }
            None => {
                return Err(CoreError::malformed(
                    "node",
                    format!("node '{node}' has no flag"),
                ))
            }
        };
        Ok(Self::detached(node, flag))
    }

    /// The lowercased node name.
    #[must_use]
    pub fn node(&self) -> String {
        self.state.lock().node.clone()
    }

    /// The flag.
    #[must_use]
    pub fn flag(&self) -> bool {
        self.state.lock().flag
    }

    /// Whether this entry is for `node`, ignoring case.
    #[must_use]
    pub fn matches(&self, node: &str) -> bool {
        self.state.lock().node == node.to_lowercase()
    }

    /// Sets the flag, saving the owning document when `save` is true.
    ///
    /// # Errors
    ///
    /// Returns `IllegalState` if `save` is true and the entry is detached,
    /// or the document's save error.
    pub fn set_flag(&self, flag: bool, save: bool) -> CoreResult<()> {
        self.state.lock().flag = flag;
        if save {
            return self.save();
        }
        if let Some(document) = self.document() {
            document.mark_dirty();
        }
        Ok(())
    }
}

impl Entry for NodeEntry {
    fn name(&self) -> &str {
        NODE_ENTRY_NAME
    }

    fn link(&self) -> &EntryLink {
        &self.link
    }

    fn export(&self) -> Record {
        let state = self.state.lock();
        Record::new()
            .with("name", state.node.as_str())
            .with("flag", if state.flag { FLAG_ON } else { FLAG_OFF })
    }
}

impl fmt::Debug for NodeEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("NodeEntry")
            .field("node", &state.node)
            .field("flag", &state.flag)
            .field("attached", &self.link.is_attached())
            .finish()
    }
}
