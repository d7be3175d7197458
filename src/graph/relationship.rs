//! Relationship implementation for the property graph
//!
//! Relationships are directed and typed. At most one relationship may exist
//! per (source, type, target) triple; [`UniquenessKey`] is that triple.

use super::database::{Database, GraphRead};
use super::entity::Entity;
use super::error::GraphResult;
use super::node::Node;
use super::property::PropertyMap;
use super::transaction::Transaction;
use super::types::{Identity, Label, RelType};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// A directed relationship between two nodes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    pub identity: Identity,

    /// Source node (relationship goes FROM this node)
    pub source: Identity,

    /// Target node (relationship goes TO this node)
    pub target: Identity,

    pub rel_type: RelType,

    /// Labels are written through the transaction but not indexed
    pub labels: HashSet<Label>,

    pub properties: PropertyMap,

    /// Creation timestamp (Unix milliseconds)
    pub created_at: i64,
}

impl Relationship {
    pub fn new(
        identity: Identity,
        source: Identity,
        target: Identity,
        rel_type: impl Into<RelType>,
    ) -> Self {
        Relationship {
            identity,
            source,
            target,
            rel_type: rel_type.into(),
            labels: HashSet::new(),
            properties: PropertyMap::new(),
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn id(&self) -> &Identity {
        &self.identity
    }

    pub fn uniqueness_key(&self) -> UniquenessKey {
        UniquenessKey::new(&self.source, &self.rel_type, &self.target)
    }

    pub fn starts_from(&self, node: &Identity) -> bool {
        &self.source == node
    }

    pub fn ends_at(&self, node: &Identity) -> bool {
        &self.target == node
    }

    pub fn start_node(&self, view: &impl GraphRead) -> GraphResult<Node> {
        view.get_node_by_id(&self.source)
    }

    pub fn end_node(&self, view: &impl GraphRead) -> GraphResult<Node> {
        view.get_node_by_id(&self.target)
    }

    /// The endpoint that is not `node`. For a self-loop that is `node` itself.
    pub fn other_node(&self, view: &impl GraphRead, node: &Identity) -> GraphResult<Node> {
        if &self.source == node {
            view.get_node_by_id(&self.target)
        } else {
            view.get_node_by_id(&self.source)
        }
    }

    pub fn delete(&self, db: &Database, tx: &mut Transaction) -> GraphResult<()> {
        db.delete_relationship(tx, &self.identity)
    }
}

impl Entity for Relationship {
    fn identity(&self) -> &Identity {
        &self.identity
    }

    fn properties(&self) -> &PropertyMap {
        &self.properties
    }

    fn properties_mut(&mut self) -> &mut PropertyMap {
        &mut self.properties
    }

    fn labels(&self) -> &HashSet<Label> {
        &self.labels
    }

    fn labels_mut(&mut self) -> &mut HashSet<Label> {
        &mut self.labels
    }

    fn entity_type(&self) -> &str {
        self.rel_type.as_str()
    }

    fn endpoints(&self) -> Option<(&Identity, &Identity)> {
        Some((&self.source, &self.target))
    }
}

impl PartialEq for Relationship {
    fn eq(&self, other: &Self) -> bool {
        self.identity == other.identity
    }
}

impl Eq for Relationship {}

impl std::hash::Hash for Relationship {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.identity.hash(state);
    }
}

/// The (source, type, target) triple guarded by the relationship repository
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UniquenessKey {
    source: u64,
    rel_type: RelType,
    target: u64,
}

impl UniquenessKey {
    pub fn new(source: &Identity, rel_type: &RelType, target: &Identity) -> Self {
        UniquenessKey {
            source: source.as_u64(),
            rel_type: rel_type.clone(),
            target: target.as_u64(),
        }
    }
}

impl fmt::Display for UniquenessKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-[{}]->{}", self.source, self.rel_type, self.target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_relationship() {
        let a = Identity::new("Person");
        let b = Identity::new("Person");
        let rel = Relationship::new(Identity::new("KNOWS"), a.clone(), b.clone(), "KNOWS");

        assert!(rel.starts_from(&a));
        assert!(rel.ends_at(&b));
        assert!(!rel.starts_from(&b));
        assert_eq!(rel.entity_type(), "KNOWS");
        assert_eq!(rel.endpoints(), Some((&a, &b)));
    }

    #[test]
    fn test_uniqueness_key_is_deterministic() {
        let a = Identity::new("Person");
        let b = Identity::new("Person");
        let first = Relationship::new(Identity::new("KNOWS"), a.clone(), b.clone(), "KNOWS");
        let second = Relationship::new(Identity::new("KNOWS"), a.clone(), b.clone(), "KNOWS");
        let reversed = Relationship::new(Identity::new("KNOWS"), b.clone(), a.clone(), "KNOWS");
        let other_type = Relationship::new(Identity::new("LIKES"), a, b, "LIKES");

        assert_ne!(first, second);
        assert_eq!(first.uniqueness_key(), second.uniqueness_key());
        assert_ne!(first.uniqueness_key(), reversed.uniqueness_key());
        assert_ne!(first.uniqueness_key(), other_type.uniqueness_key());
    }

    #[test]
    fn test_uniqueness_key_fields_do_not_bleed() {
        // "1" + "2X" + "3" and "12" + "X" + "3" concatenate to the same text
        let key_a = UniquenessKey::new(
            &Identity::restore(1, "N"),
            &RelType::new("2X"),
            &Identity::restore(3, "N"),
        );
        let key_b = UniquenessKey::new(
            &Identity::restore(12, "N"),
            &RelType::new("X"),
            &Identity::restore(3, "N"),
        );
        assert_ne!(key_a, key_b);
        assert_eq!(key_a.to_string(), "1-[2X]->3");
    }
}
