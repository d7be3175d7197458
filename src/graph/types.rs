//! Core type definitions for the graph engine

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

/// Process-wide counter backing every [`Identity`]. Starts at 1 so that 0 is
/// never a valid id.
static NEXT_IDENTITY: AtomicU64 = AtomicU64::new(1);

/// Process-wide counter backing every [`TxId`].
static NEXT_TRANSACTION: AtomicU64 = AtomicU64::new(1);

/// Globally unique handle for a node or relationship
///
/// Equality, ordering and hashing use the numeric id alone. The type tag is
/// metadata for cache bucketing and never takes part in comparisons.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    id: u64,
    type_tag: String,
}

impl Identity {
    /// Allocate a fresh identity from the global counter
    pub fn new(type_tag: impl Into<String>) -> Self {
        Identity {
            id: NEXT_IDENTITY.fetch_add(1, AtomicOrdering::SeqCst),
            type_tag: type_tag.into(),
        }
    }

    /// Rebuild an identity persisted outside this process.
    ///
    /// Advances the global counter past `id` so the restored value is never
    /// handed out again.
    pub fn restore(id: u64, type_tag: impl Into<String>) -> Self {
        let identity = Identity {
            id,
            type_tag: type_tag.into(),
        };
        identity.reserve();
        identity
    }

    /// Make sure the global counter never issues this id again
    pub(crate) fn reserve(&self) {
        NEXT_IDENTITY.fetch_max(self.id.saturating_add(1), AtomicOrdering::SeqCst);
    }

    pub fn as_u64(&self) -> u64 {
        self.id
    }

    pub fn type_tag(&self) -> &str {
        &self.type_tag
    }
}

impl PartialEq for Identity {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Identity {}

impl Hash for Identity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl PartialOrd for Identity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Identity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.type_tag, self.id)
    }
}

/// Identifier of a transaction, unique and monotonic within the process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TxId(u64);

impl TxId {
    pub(crate) fn next() -> Self {
        TxId(NEXT_TRANSACTION.fetch_add(1, AtomicOrdering::SeqCst))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxId({})", self.0)
    }
}

/// Node label (e.g., "Person", "Employee")
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct Label(String);

impl Label {
    pub fn new(label: impl Into<String>) -> Self {
        Label(label.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for Label {
    fn from(s: String) -> Self {
        Label(s)
    }
}

impl From<&str> for Label {
    fn from(s: &str) -> Self {
        Label(s.to_string())
    }
}

/// Relationship type (e.g., "KNOWS", "OWNS")
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct RelType(String);

impl RelType {
    pub fn new(rel_type: impl Into<String>) -> Self {
        RelType(rel_type.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for RelType {
    fn from(s: String) -> Self {
        RelType(s)
    }
}

impl From<&str> for RelType {
    fn from(s: &str) -> Self {
        RelType(s.to_string())
    }
}

/// Traversal direction relative to a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// The node is the source
    Outgoing,
    /// The node is the target
    Incoming,
    Both,
}

impl Direction {
    pub fn includes_outgoing(&self) -> bool {
        matches!(self, Direction::Outgoing | Direction::Both)
    }

    pub fn includes_incoming(&self) -> bool {
        matches!(self, Direction::Incoming | Direction::Both)
    }
}
