//! Database service
//!
//! [`Database`] is the façade applications talk to. It owns the node and
//! relationship repositories and the checkout table, hands out transactions,
//! and implements the write operations that need more than one entity at
//! once (relationship creation, cascading node deletion).
//!
//! Reads go through [`GraphRead`], implemented both by `Database` (the
//! committed state) and by [`Transaction`] (committed state plus that
//! transaction's staged work).

use super::entity::Entity;
use super::error::{GraphError, GraphResult};
use super::filter::Filter;
use super::lock::LockTable;
use super::node::{Node, TYPE_KEY};
use super::property::{PropertyMap, PropertyValue};
use super::relationship::{Relationship, UniquenessKey};
use super::repository::{NodeRepository, RelationshipRepository, NODES_FILE, RELATIONSHIPS_FILE};
use super::transaction::{ChangeSet, Transaction};
use super::types::{Direction, Identity, Label, RelType, TxId};
use crate::config::DatabaseConfig;
use rustc_hash::FxHashSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Relationship type linking an owner to a node created on its behalf
pub const OWNS: &str = "OWNS";

/// Relationship type carrying the access properties of an owned node
pub const SECURITY: &str = "SECURITY";

/// Read access to a graph
pub trait GraphRead {
    fn get_node_by_id(&self, id: &Identity) -> GraphResult<Node>;

    fn get_relationship_by_id(&self, id: &Identity) -> GraphResult<Relationship>;

    fn get_nodes(&self, filter: &Filter) -> GraphResult<Vec<Node>>;

    fn get_relationships(&self, filter: &Filter) -> GraphResult<Vec<Relationship>>;

    fn get_all_nodes(&self) -> GraphResult<Vec<Node>> {
        self.get_nodes(&Filter::All)
    }

    fn get_nodes_by_label(&self, label: &Label) -> GraphResult<Vec<Node>> {
        self.get_nodes(&Filter::Labels(vec![label.clone()]))
    }

    fn get_nodes_by_type(&self, node_type: &str) -> GraphResult<Vec<Node>> {
        self.get_nodes(&Filter::of_type(node_type))
    }

    fn get_relationships_by_type(&self, rel_type: &RelType) -> GraphResult<Vec<Relationship>> {
        self.get_relationships(&Filter::of_type(rel_type.as_str()))
    }

    /// Relationships touching `node`, optionally restricted to one type.
    /// A self-loop is reported once for [`Direction::Both`].
    fn get_relationships_of(
        &self,
        node: &Identity,
        direction: Direction,
        rel_type: Option<&RelType>,
    ) -> GraphResult<Vec<Relationship>> {
        let mut result = Vec::new();
        if direction.includes_outgoing() {
            result.extend(self.get_relationships(&Filter::Source(node.clone()))?);
        }
        if direction.includes_incoming() {
            let incoming = self.get_relationships(&Filter::Target(node.clone()))?;
            if direction.includes_outgoing() {
                result.extend(incoming.into_iter().filter(|r| !r.starts_from(node)));
            } else {
                result.extend(incoming);
            }
        }
        if let Some(rel_type) = rel_type {
            result.retain(|r| &r.rel_type == rel_type);
        }
        Ok(result)
    }

    fn has_relationship_to(
        &self,
        source: &Identity,
        rel_type: &RelType,
        target: &Identity,
    ) -> GraphResult<bool> {
        Ok(self
            .get_relationships(&Filter::Source(source.clone()))?
            .iter()
            .any(|r| &r.rel_type == rel_type && r.ends_at(target)))
    }
}

/// Shared state behind a [`Database`] and its open transactions
#[derive(Debug)]
pub(crate) struct GraphState {
    pub(crate) nodes: NodeRepository,
    pub(crate) relationships: RelationshipRepository,
    pub(crate) locks: LockTable,
}

impl GraphState {
    fn new(config: &DatabaseConfig) -> Self {
        GraphState {
            nodes: NodeRepository::new(),
            relationships: RelationshipRepository::new(),
            locks: LockTable::new(config.lock_timeout()),
        }
    }

    /// Apply a transaction's changes. Both repositories are write-locked for
    /// the duration, so readers observe all of it or none of it.
    pub(crate) fn commit_transaction(&self, tx: TxId, changes: ChangeSet) -> GraphResult<()> {
        if changes.is_empty() {
            debug!(tx = %tx, "empty transaction committed");
            return Ok(());
        }

        let mut nodes = self.nodes.write()?;
        let mut rels = self.relationships.write()?;

        // Validate before touching anything
        {
            let deleted: FxHashSet<&Identity> = changes.deleted_rel_ids.iter().collect();
            for rel in &changes.created_rels {
                let key = rel.uniqueness_key();
                if let Some(existing) = rels.find_by_key(&key) {
                    if !deleted.contains(existing) {
                        warn!(tx = %tx, key = %key, existing = %existing, "commit rejected: duplicate relationship");
                        return Err(GraphError::DuplicateRelationship(key));
                    }
                }
            }
        }

        let (created_nodes, created_rels) = (changes.created_nodes.len(), changes.created_rels.len());
        let (deleted_nodes, deleted_rels) = (changes.deleted_node_ids.len(), changes.deleted_rel_ids.len());
        let modified = changes.node_shadows.len() + changes.rel_shadows.len();

        rels.remove(&changes.deleted_rel_ids);
        nodes.remove(&changes.deleted_node_ids);

        for (id, shadow) in changes.node_shadows {
            if let Some(current) = nodes.get(&id) {
                let mut updated = current.clone();
                shadow.merge_into(&mut updated);
                nodes.update_cache(updated);
            }
        }
        for (id, shadow) in changes.rel_shadows {
            if let Some(current) = rels.get(&id) {
                let mut updated = current.clone();
                shadow.merge_into(&mut updated);
                rels.update_cache(updated)?;
            }
        }

        for node in changes.created_nodes {
            nodes.add(node);
        }
        for rel in changes.created_rels {
            rels.add(rel)?;
        }

        info!(
            tx = %tx,
            created_nodes,
            created_rels,
            deleted_nodes,
            deleted_rels,
            modified,
            "transaction committed"
        );
        Ok(())
    }

    pub(crate) fn rollback_transaction(&self, tx: TxId, discarded: usize) {
        debug!(tx = %tx, discarded, "transaction rolled back");
    }
}

/// An in-memory transactional graph
#[derive(Debug)]
pub struct Database {
    state: Arc<GraphState>,
    config: DatabaseConfig,
}

impl Database {
    /// Purely in-memory database with default settings
    pub fn new() -> Self {
        Self::with_config(DatabaseConfig::default())
    }

    pub fn with_config(config: DatabaseConfig) -> Self {
        Database {
            state: Arc::new(GraphState::new(&config)),
            config,
        }
    }

    /// Create a database and restore it from `config.data_path` when that
    /// directory holds snapshots. A missing directory is created.
    pub fn open(config: DatabaseConfig) -> GraphResult<Self> {
        config.validate()?;
        let db = Self::with_config(config);
        if let Some(dir) = db.config.data_path.clone() {
            if dir.is_dir() {
                db.load_from(&dir)?;
            } else {
                std::fs::create_dir_all(&dir)?;
            }
        }
        info!(
            nodes = db.node_count()?,
            relationships = db.relationship_count()?,
            "database opened"
        );
        Ok(db)
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    pub fn begin_tx(&self) -> Transaction {
        Transaction::new(Arc::clone(&self.state))
    }

    pub fn node_count(&self) -> GraphResult<usize> {
        self.state.nodes.len()
    }

    pub fn relationship_count(&self) -> GraphResult<usize> {
        self.state.relationships.len()
    }

    /// Number of entities currently checked out by open transactions
    pub fn locks_held(&self) -> GraphResult<usize> {
        self.state.locks.held_count()
    }

    /// Transaction holding `id`, if any
    pub fn lock_owner(&self, id: &Identity) -> GraphResult<Option<TxId>> {
        self.state.locks.owner(id)
    }

    // ----- writes -------------------------------------------------------

    /// Stage a new node. Its `type` property is set to `node_type`.
    pub fn create_node(
        &self,
        tx: &mut Transaction,
        node_type: &str,
        labels: impl IntoIterator<Item = Label>,
        properties: PropertyMap,
    ) -> GraphResult<Node> {
        let identity = Identity::new(node_type);
        tx.checkout(&identity)?;

        let mut initial = PropertyMap::new();
        initial.insert(TYPE_KEY.to_string(), PropertyValue::String(node_type.to_string()));
        initial.extend(properties);
        let node = Node::with_properties(identity, labels, initial);

        debug!(tx = %tx.id(), node = %node.identity, "node staged");
        tx.stage_node(node.clone());
        Ok(node)
    }

    /// Stage a node together with an `OWNS` and a `SECURITY` relationship from
    /// `owner`. If any step fails the transaction holds a partial result and
    /// should not be committed.
    #[allow(clippy::too_many_arguments)]
    pub fn create_node_with_owner(
        &self,
        tx: &mut Transaction,
        owner: &Identity,
        node_type: &str,
        labels: impl IntoIterator<Item = Label>,
        properties: PropertyMap,
        owns_properties: PropertyMap,
        security_properties: PropertyMap,
    ) -> GraphResult<Node> {
        // Fail before staging anything if the owner is not visible
        tx.get_node_by_id(owner)?;

        let node = self.create_node(tx, node_type, labels, properties)?;
        self.create_relationship(tx, owner, &node.identity, OWNS, owns_properties)?;
        self.create_relationship(tx, owner, &node.identity, SECURITY, security_properties)?;
        Ok(node)
    }

    /// Stage a relationship `source -[rel_type]-> target`.
    ///
    /// Both endpoints are checked out in ascending identity order, then the
    /// triple is checked against every relationship visible to `tx`.
    pub fn create_relationship(
        &self,
        tx: &mut Transaction,
        source: &Identity,
        target: &Identity,
        rel_type: impl Into<RelType>,
        properties: PropertyMap,
    ) -> GraphResult<Relationship> {
        let rel_type = rel_type.into();

        let (first, second) = if source <= target {
            (source, target)
        } else {
            (target, source)
        };
        tx.checkout_existing(first, |tx| tx.get_node_by_id(first))?;
        tx.checkout_existing(second, |tx| tx.get_node_by_id(second))?;

        let key = UniquenessKey::new(source, &rel_type, target);
        if let Some(existing) = tx.find_relationship_by_key(&key)? {
            warn!(tx = %tx.id(), key = %key, existing = %existing, "duplicate relationship rejected");
            return Err(GraphError::DuplicateRelationship(key));
        }

        let identity = Identity::new(rel_type.as_str());
        tx.checkout(&identity)?;

        let mut rel = Relationship::new(identity, source.clone(), target.clone(), rel_type);
        for (key, value) in properties {
            rel.put_property(key, value);
        }

        debug!(tx = %tx.id(), relationship = %rel.identity, key = %key, "relationship staged");
        tx.stage_relationship(rel.clone());
        Ok(rel)
    }

    /// Stage deletion of a node and every relationship touching it.
    ///
    /// The node is checked out first, which stops new relationships from
    /// attaching to it. The attached relationships are then checked out in
    /// ascending identity order, and nothing is staged until all of them are
    /// held. A relationship another transaction deleted while this one waited
    /// is skipped.
    pub fn delete_node(&self, tx: &mut Transaction, id: &Identity) -> GraphResult<()> {
        tx.checkout_existing(id, |tx| tx.get_node_by_id(id))?;

        let mut attached: Vec<Identity> = tx
            .get_relationships_of(id, Direction::Both, None)?
            .into_iter()
            .map(|r| r.identity)
            .collect();
        attached.sort();

        let mut doomed = Vec::with_capacity(attached.len());
        for rel_id in &attached {
            match tx.checkout_existing(rel_id, |tx| tx.get_relationship_by_id(rel_id)) {
                Ok(rel) => doomed.push(rel),
                Err(e) if e.is_not_found() => {
                    debug!(tx = %tx.id(), relationship = %rel_id, "relationship already deleted");
                }
                Err(e) => return Err(e),
            }
        }

        let cascaded = doomed.len();
        for rel in doomed {
            tx.stage_relationship_deletion(rel);
        }
        tx.stage_node_deletion(id);

        debug!(tx = %tx.id(), node = %id, cascaded, "node deletion staged");
        Ok(())
    }

    pub fn delete_relationship(&self, tx: &mut Transaction, id: &Identity) -> GraphResult<()> {
        let rel = tx.checkout_existing(id, |tx| tx.get_relationship_by_id(id))?;
        tx.stage_relationship_deletion(rel);
        debug!(tx = %tx.id(), relationship = %id, "relationship deletion staged");
        Ok(())
    }

    /// Native query passthrough. The in-memory backend has no query language.
    pub fn execute_native(&self, query: &str) -> GraphResult<Vec<PropertyMap>> {
        debug!(query, "native query refused");
        Err(GraphError::Unsupported(
            "native queries are not supported by the in-memory backend".to_string(),
        ))
    }

    // ----- snapshots ----------------------------------------------------

    /// Write both repositories to the configured data path
    pub fn save(&self) -> GraphResult<()> {
        let dir = self
            .config
            .data_path
            .clone()
            .ok_or_else(|| GraphError::Config("no data_path configured".to_string()))?;
        self.save_to(&dir)
    }

    /// Write both repositories to `dir`. Commits are blocked while the
    /// snapshot is taken, so the two files are mutually consistent.
    pub fn save_to(&self, dir: &Path) -> GraphResult<()> {
        std::fs::create_dir_all(dir)?;
        let level = self.config.compression_level;

        let nodes = self.state.nodes.read()?;
        let rels = self.state.relationships.read()?;
        let node_count = nodes.save(dir, level)?;
        let rel_count = rels.save(dir, level)?;

        info!(path = ?dir, nodes = node_count, relationships = rel_count, "snapshot saved");
        Ok(())
    }

    /// Load snapshots from `dir` into this database. Either file may be
    /// absent. Loaded entities are added to whatever is already present.
    pub fn load_from(&self, dir: &Path) -> GraphResult<()> {
        let node_count = if dir.join(NODES_FILE).is_file() {
            self.state.nodes.load(dir)?
        } else {
            0
        };
        let rel_count = if dir.join(RELATIONSHIPS_FILE).is_file() {
            self.state.relationships.load(dir)?
        } else {
            0
        };

        let nodes = self.state.nodes.read()?;
        let dangling = self
            .state
            .relationships
            .values(&Filter::All)?
            .iter()
            .filter(|r| !nodes.contains(&r.source) || !nodes.contains(&r.target))
            .count();
        if dangling > 0 {
            warn!(path = ?dir, dangling, "snapshot holds relationships with missing endpoints");
        }

        info!(path = ?dir, nodes = node_count, relationships = rel_count, "snapshot loaded");
        Ok(())
    }
}

impl Default for Database {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphRead for Database {
    fn get_node_by_id(&self, id: &Identity) -> GraphResult<Node> {
        self.state
            .nodes
            .get(id)?
            .ok_or_else(|| GraphError::NodeNotFound(id.clone()))
    }

    fn get_relationship_by_id(&self, id: &Identity) -> GraphResult<Relationship> {
        self.state
            .relationships
            .get(id)?
            .ok_or_else(|| GraphError::RelationshipNotFound(id.clone()))
    }

    fn get_nodes(&self, filter: &Filter) -> GraphResult<Vec<Node>> {
        self.state.nodes.values(filter)
    }

    fn get_relationships(&self, filter: &Filter) -> GraphResult<Vec<Relationship>> {
        self.state.relationships.values(filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person(db: &Database, tx: &mut Transaction, name: &str) -> Node {
        let mut props = PropertyMap::new();
        props.insert("name".to_string(), name.into());
        db.create_node(tx, "Person", vec![Label::new("Person")], props)
            .unwrap()
    }

    #[test]
    fn test_create_node_sets_type() {
        let db = Database::new();
        let mut tx = db.begin_tx();
        let node = person(&db, &mut tx, "Alice");
        tx.commit().unwrap();

        let stored = db.get_node_by_id(&node.identity).unwrap();
        assert_eq!(stored.node_type(), "Person");
        assert_eq!(
            stored.get_property(TYPE_KEY),
            Some(&PropertyValue::String("Person".to_string()))
        );
        assert_eq!(db.get_nodes_by_type("Person").unwrap().len(), 1);
    }

    #[test]
    fn test_create_relationship_and_navigate() {
        let db = Database::new();
        let mut tx = db.begin_tx();
        let alice = person(&db, &mut tx, "Alice");
        let bob = person(&db, &mut tx, "Bob");
        let knows = RelType::new("KNOWS");
        db.create_relationship(&mut tx, &alice.identity, &bob.identity, knows.clone(), PropertyMap::new())
            .unwrap();
        tx.commit().unwrap();

        assert!(db.has_relationship_to(&alice.identity, &knows, &bob.identity).unwrap());
        assert!(!db.has_relationship_to(&bob.identity, &knows, &alice.identity).unwrap());
        assert_eq!(
            db.get_relationships_of(&bob.identity, Direction::Incoming, None)
                .unwrap()
                .len(),
            1
        );
        assert_eq!(db.get_relationships_by_type(&knows).unwrap().len(), 1);
    }

    #[test]
    fn test_self_loop_reported_once() {
        let db = Database::new();
        let mut tx = db.begin_tx();
        let alice = person(&db, &mut tx, "Alice");
        db.create_relationship(&mut tx, &alice.identity, &alice.identity, "LIKES", PropertyMap::new())
            .unwrap();
        tx.commit().unwrap();

        let both = db
            .get_relationships_of(&alice.identity, Direction::Both, None)
            .unwrap();
        assert_eq!(both.len(), 1);
    }

    #[test]
    fn test_create_node_with_owner() {
        let db = Database::new();
        let mut tx = db.begin_tx();
        let owner = person(&db, &mut tx, "Owner");
        let mut security = PropertyMap::new();
        security.insert("level".to_string(), "private".into());
        let doc = db
            .create_node_with_owner(
                &mut tx,
                &owner.identity,
                "Document",
                vec![Label::new("Document")],
                PropertyMap::new(),
                PropertyMap::new(),
                security,
            )
            .unwrap();
        tx.commit().unwrap();

        let rels = db
            .get_relationships_of(&owner.identity, Direction::Outgoing, None)
            .unwrap();
        assert_eq!(rels.len(), 2);
        assert!(rels.iter().all(|r| r.ends_at(&doc.identity)));
        let sec = db
            .get_relationships_of(&owner.identity, Direction::Outgoing, Some(&RelType::new(SECURITY)))
            .unwrap();
        assert_eq!(sec[0].get_property("level").unwrap().as_string(), Some("private"));
    }

    #[test]
    fn test_owner_must_exist() {
        let db = Database::new();
        let mut tx = db.begin_tx();
        let ghost = Identity::new("Person");
        let result = db.create_node_with_owner(
            &mut tx,
            &ghost,
            "Document",
            vec![],
            PropertyMap::new(),
            PropertyMap::new(),
            PropertyMap::new(),
        );
        assert!(matches!(result, Err(GraphError::NodeNotFound(_))));
        assert_eq!(tx.created_node_count(), 0);
    }

    #[test]
    fn test_missing_ids_leave_no_checkout() {
        let db = Database::new();
        let mut tx = db.begin_tx();
        let alice = person(&db, &mut tx, "Alice");
        let ghost = Identity::new("Person");
        let held = db.locks_held().unwrap();

        assert!(db.delete_node(&mut tx, &ghost).unwrap_err().is_not_found());
        assert!(db
            .delete_relationship(&mut tx, &Identity::new("KNOWS"))
            .unwrap_err()
            .is_not_found());
        assert!(db
            .create_relationship(&mut tx, &alice.identity, &ghost, "KNOWS", PropertyMap::new())
            .unwrap_err()
            .is_not_found());

        assert!(!tx.holds(&ghost));
        assert!(tx.holds(&alice.identity));
        assert_eq!(db.locks_held().unwrap(), held);
    }

    #[test]
    fn test_execute_native_unsupported() {
        let db = Database::new();
        assert!(matches!(
            db.execute_native("MATCH (n) RETURN n"),
            Err(GraphError::Unsupported(_))
        ));
    }

    #[test]
    fn test_save_without_data_path() {
        let db = Database::new();
        assert!(matches!(db.save(), Err(GraphError::Config(_))));
    }

    #[test]
    fn test_delete_then_recreate_same_triple() {
        let db = Database::new();
        let mut tx = db.begin_tx();
        let a = person(&db, &mut tx, "A");
        let b = person(&db, &mut tx, "B");
        let first = db
            .create_relationship(&mut tx, &a.identity, &b.identity, "KNOWS", PropertyMap::new())
            .unwrap();
        tx.commit().unwrap();

        let mut tx = db.begin_tx();
        db.delete_relationship(&mut tx, &first.identity).unwrap();
        let second = db
            .create_relationship(&mut tx, &a.identity, &b.identity, "KNOWS", PropertyMap::new())
            .unwrap();
        tx.commit().unwrap();

        assert_eq!(db.relationship_count().unwrap(), 1);
        assert!(db.get_relationship_by_id(&first.identity).is_err());
        assert!(db.get_relationship_by_id(&second.identity).is_ok());
    }
}
