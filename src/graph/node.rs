//! Node implementation for the property graph

use super::database::{Database, GraphRead};
use super::entity::Entity;
use super::error::GraphResult;
use super::property::{PropertyMap, PropertyValue};
use super::relationship::Relationship;
use super::transaction::Transaction;
use super::types::{Direction, Identity, Label, RelType};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Property key mirroring the node's type
pub const TYPE_KEY: &str = "type";

/// A node in the property graph
///
/// Values of this type are snapshots: reading a node through a transaction
/// returns a copy with that transaction's pending writes applied. Mutations go
/// through [`Transaction`] or [`Database`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub identity: Identity,

    /// Set of labels for this node (supports multiple labels)
    pub labels: HashSet<Label>,

    pub properties: PropertyMap,

    /// Creation timestamp (Unix milliseconds)
    pub created_at: i64,
}

impl Node {
    pub fn new(identity: Identity, labels: impl IntoIterator<Item = Label>) -> Self {
        Node {
            identity,
            labels: labels.into_iter().collect(),
            properties: PropertyMap::new(),
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn with_properties(
        identity: Identity,
        labels: impl IntoIterator<Item = Label>,
        properties: PropertyMap,
    ) -> Self {
        let mut node = Node::new(identity, labels);
        for (key, value) in properties {
            node.put_property(key, value);
        }
        node
    }

    pub fn id(&self) -> &Identity {
        &self.identity
    }

    /// The node's type: the `type` property when it holds a string, otherwise
    /// the identity's type tag
    pub fn node_type(&self) -> &str {
        self.properties
            .get(TYPE_KEY)
            .and_then(PropertyValue::as_string)
            .unwrap_or_else(|| self.identity.type_tag())
    }

    pub fn property_count(&self) -> usize {
        self.properties.len()
    }

    pub fn label_count(&self) -> usize {
        self.labels.len()
    }

    /// Link this node to `other`. Both nodes are locked in ascending identity
    /// order before the relationship is staged.
    pub fn create_relationship_to(
        &self,
        db: &Database,
        tx: &mut Transaction,
        other: &Node,
        rel_type: impl Into<RelType>,
        properties: PropertyMap,
    ) -> GraphResult<Relationship> {
        db.create_relationship(tx, &self.identity, &other.identity, rel_type, properties)
    }

    /// True if an outgoing `rel_type` relationship to `target` is visible
    pub fn has_relationship_to(
        &self,
        view: &impl GraphRead,
        rel_type: &RelType,
        target: &Node,
    ) -> GraphResult<bool> {
        view.has_relationship_to(&self.identity, rel_type, &target.identity)
    }

    pub fn relationships(
        &self,
        view: &impl GraphRead,
        direction: Direction,
        rel_type: Option<&RelType>,
    ) -> GraphResult<Vec<Relationship>> {
        view.get_relationships_of(&self.identity, direction, rel_type)
    }

    /// Delete this node and every relationship touching it
    pub fn delete(&self, db: &Database, tx: &mut Transaction) -> GraphResult<()> {
        db.delete_node(tx, &self.identity)
    }
}

impl Entity for Node {
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
        self.node_type()
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.identity == other.identity
    }
}

impl Eq for Node {}

impl std::hash::Hash for Node {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.identity.hash(state);
    }
}
