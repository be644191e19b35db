//! Wire types of the store's v2 keys API

use serde::{Deserialize, Serialize};

/// What happened to a key, as reported by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Action {
    Get,
    Set,
    Create,
    Update,
    Delete,
    Expire,
    CompareAndSwap,
    CompareAndDelete,
    #[serde(other)]
    Unknown,
}

impl Action {
    /// Did this event leave the key absent?
    pub fn removes_key(&self) -> bool {
        matches!(
            self,
            Action::Delete | Action::Expire | Action::CompareAndDelete
        )
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Action::Get => "get",
            Action::Set => "set",
            Action::Create => "create",
            Action::Update => "update",
            Action::Delete => "delete",
            Action::Expire => "expire",
            Action::CompareAndSwap => "compareAndSwap",
            Action::CompareAndDelete => "compareAndDelete",
            Action::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub dir: bool,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub modified_index: u64,
    #[serde(default)]
    pub created_index: u64,
    /// Remaining lease in seconds
    #[serde(default)]
    pub ttl: Option<i64>,
    #[serde(default)]
    pub expiration: Option<String>,
}

/// A successful store reply; also the event type of a watch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub action: Action,
    pub node: Node,
    #[serde(default)]
    pub prev_node: Option<Node>,
}

impl Response {
    pub fn value(&self) -> Option<&str> {
        self.node.value.as_deref()
    }

    pub fn modified_index(&self) -> u64 {
        self.node.modified_index
    }
}

/// Condition a write must satisfy at apply time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Precondition {
    /// Key must not exist (`prevExist=false`)
    Absent,
    /// Key must exist (`prevExist=true`)
    Present,
    /// Key must currently hold this value (`prevValue`)
    Value(String),
    /// Key must currently have this modification index (`prevIndex`)
    Index(u64),
}

impl Precondition {
    pub fn is_existence(&self) -> bool {
        matches!(self, Precondition::Absent | Precondition::Present)
    }
}

/// How a read waits for changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Wait {
    /// Return the current state immediately
    #[default]
    No,
    /// Block until the next change
    Next,
    /// Block until the first change with an index strictly greater than this one
    After(u64),
}
