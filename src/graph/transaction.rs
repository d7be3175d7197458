//! Transactions
//!
//! A [`Transaction`] is one logical unit of work. It stages creations and
//! deletions, keeps a [`Shadow`] for every existing entity it writes to, and
//! holds every entity it created or touched checked out in the lock table.
//! Nothing reaches the repositories before [`Transaction::close`]:
//!
//! - `success()` then `close()`: shadows are merged, creations added and
//!   deletions purged, atomically with respect to other commits
//! - `close()` alone: everything staged is dropped
//!
//! Either way every checked-out entity is released. Dropping an unclosed
//! transaction closes it, so a transaction bound to a scope cannot leak locks.

use super::database::{GraphRead, GraphState};
use super::entity::{Entity, Shadow};
use super::error::{GraphError, GraphResult};
use super::filter::Filter;
use super::node::Node;
use super::property::PropertyValue;
use super::relationship::{Relationship, UniquenessKey};
use super::types::{Identity, Label, TxId};
use indexmap::IndexMap;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::BTreeSet;
use std::mem;
use std::sync::Arc;
use tracing::{debug, warn};

/// Everything a successful transaction hands to the repositories
#[derive(Debug, Default)]
pub(crate) struct ChangeSet {
    pub created_nodes: Vec<Node>,
    pub created_rels: Vec<Relationship>,
    pub deleted_node_ids: Vec<Identity>,
    pub deleted_rel_ids: Vec<Identity>,
    pub node_shadows: Vec<(Identity, Shadow)>,
    pub rel_shadows: Vec<(Identity, Shadow)>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.created_nodes.is_empty()
            && self.created_rels.is_empty()
            && self.deleted_node_ids.is_empty()
            && self.deleted_rel_ids.is_empty()
            && self.node_shadows.is_empty()
            && self.rel_shadows.is_empty()
    }
}

pub struct Transaction {
    id: TxId,
    state: Arc<GraphState>,

    created_nodes: IndexMap<Identity, Node>,
    created_rels: IndexMap<Identity, Relationship>,
    /// Uniqueness keys of `created_rels`
    created_keys: FxHashMap<UniquenessKey, Identity>,
    deleted_node_ids: FxHashSet<Identity>,
    deleted_rels: FxHashMap<Identity, Relationship>,

    node_shadows: FxHashMap<Identity, Shadow>,
    rel_shadows: FxHashMap<Identity, Shadow>,

    /// Entities this transaction holds in the lock table
    checked_out: BTreeSet<Identity>,

    success: bool,
    closed: bool,
}

impl Transaction {
    pub(crate) fn new(state: Arc<GraphState>) -> Self {
        let id = TxId::next();
        debug!(tx = %id, "transaction opened");
        Transaction {
            id,
            state,
            created_nodes: IndexMap::new(),
            created_rels: IndexMap::new(),
            created_keys: FxHashMap::default(),
            deleted_node_ids: FxHashSet::default(),
            deleted_rels: FxHashMap::default(),
            node_shadows: FxHashMap::default(),
            rel_shadows: FxHashMap::default(),
            checked_out: BTreeSet::new(),
            success: false,
            closed: false,
        }
    }

    pub fn id(&self) -> TxId {
        self.id
    }

    /// Mark the transaction for commit at close
    pub fn success(&mut self) {
        self.success = true;
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    /// Commit if [`success`](Self::success) was called, otherwise roll back.
    /// Locks are released in both cases, including when the commit fails.
    pub fn close(mut self) -> GraphResult<()> {
        self.finish()
    }

    /// `success()` followed by `close()`
    pub fn commit(mut self) -> GraphResult<()> {
        self.success = true;
        self.finish()
    }

    pub fn rollback(mut self) -> GraphResult<()> {
        self.success = false;
        self.finish()
    }

    /// True if this transaction holds `id` checked out
    pub fn holds(&self, id: &Identity) -> bool {
        self.checked_out.contains(id)
    }

    /// True if this transaction has a shadow copy of `id`
    pub fn is_modified(&self, id: &Identity) -> bool {
        self.node_shadows.contains_key(id) || self.rel_shadows.contains_key(id)
    }

    pub fn created_node_count(&self) -> usize {
        self.created_nodes.len()
    }

    pub fn created_relationship_count(&self) -> usize {
        self.created_rels.len()
    }

    // ----- entity reads -------------------------------------------------

    /// Read one property through this transaction's view
    pub fn get_node_property(&self, id: &Identity, key: &str) -> GraphResult<Option<PropertyValue>> {
        if self.deleted_node_ids.contains(id) {
            return Err(GraphError::NodeNotFound(id.clone()));
        }
        if let Some(node) = self.created_nodes.get(id) {
            return Ok(node.get_property(key).cloned());
        }
        if let Some(shadow) = self.node_shadows.get(id) {
            return Ok(shadow.get(key).cloned());
        }
        let nodes = self.state.nodes.read()?;
        let node = nodes
            .get(id)
            .ok_or_else(|| GraphError::NodeNotFound(id.clone()))?;
        Ok(node.get_property(key).cloned())
    }

    pub fn get_relationship_property(
        &self,
        id: &Identity,
        key: &str,
    ) -> GraphResult<Option<PropertyValue>> {
        if self.deleted_rels.contains_key(id) {
            return Err(GraphError::RelationshipNotFound(id.clone()));
        }
        if let Some(rel) = self.created_rels.get(id) {
            return Ok(rel.get_property(key).cloned());
        }
        if let Some(shadow) = self.rel_shadows.get(id) {
            return Ok(shadow.get(key).cloned());
        }
        let rels = self.state.relationships.read()?;
        let rel = rels
            .get(id)
            .ok_or_else(|| GraphError::RelationshipNotFound(id.clone()))?;
        Ok(rel.get_property(key).cloned())
    }

    // ----- entity writes ------------------------------------------------

    pub fn set_node_property(
        &mut self,
        id: &Identity,
        key: impl Into<String>,
        value: impl Into<PropertyValue>,
    ) -> GraphResult<()> {
        let (key, value) = (key.into(), value.into());
        if let Some(node) = self.created_nodes.get_mut(id) {
            node.put_property(key, value);
            return Ok(());
        }
        self.node_shadow(id)?.set(key, value);
        Ok(())
    }

    /// Same as setting `Null`: the key disappears on commit
    pub fn remove_node_property(&mut self, id: &Identity, key: impl Into<String>) -> GraphResult<()> {
        self.set_node_property(id, key, PropertyValue::Null)
    }

    pub fn add_label(&mut self, id: &Identity, label: impl Into<Label>) -> GraphResult<bool> {
        let label = label.into();
        if let Some(node) = self.created_nodes.get_mut(id) {
            return Ok(node.labels.insert(label));
        }
        Ok(self.node_shadow(id)?.add_label(label))
    }

    pub fn remove_label(&mut self, id: &Identity, label: &Label) -> GraphResult<bool> {
        if let Some(node) = self.created_nodes.get_mut(id) {
            return Ok(node.labels.remove(label));
        }
        Ok(self.node_shadow(id)?.remove_label(label))
    }

    pub fn set_relationship_property(
        &mut self,
        id: &Identity,
        key: impl Into<String>,
        value: impl Into<PropertyValue>,
    ) -> GraphResult<()> {
        let (key, value) = (key.into(), value.into());
        if let Some(rel) = self.created_rels.get_mut(id) {
            rel.put_property(key, value);
            return Ok(());
        }
        self.rel_shadow(id)?.set(key, value);
        Ok(())
    }

    pub fn remove_relationship_property(
        &mut self,
        id: &Identity,
        key: impl Into<String>,
    ) -> GraphResult<()> {
        self.set_relationship_property(id, key, PropertyValue::Null)
    }

    pub fn add_relationship_label(
        &mut self,
        id: &Identity,
        label: impl Into<Label>,
    ) -> GraphResult<bool> {
        let label = label.into();
        if let Some(rel) = self.created_rels.get_mut(id) {
            return Ok(rel.labels.insert(label));
        }
        Ok(self.rel_shadow(id)?.add_label(label))
    }

    pub fn remove_relationship_label(&mut self, id: &Identity, label: &Label) -> GraphResult<bool> {
        if let Some(rel) = self.created_rels.get_mut(id) {
            return Ok(rel.labels.remove(label));
        }
        Ok(self.rel_shadow(id)?.remove_label(label))
    }

    // ----- staging, used by the database facade -------------------------

    /// Check `id` out to this transaction, blocking while another holds it
    ///
    /// Returns `true` if this call took the lock, `false` if it was already held.
    pub(crate) fn checkout(&mut self, id: &Identity) -> GraphResult<bool> {
        if self.checked_out.contains(id) {
            return Ok(false);
        }
        self.state.locks.acquire(id, self.id)?;
        self.checked_out.insert(id.clone());
        Ok(true)
    }

    /// Check out an entity that must already exist, then run `lookup` under
    /// the lock. If the entity turns out to be absent, a lock taken by this
    /// call is handed back so no checkout is left behind for a missing id.
    pub(crate) fn checkout_existing<T>(
        &mut self,
        id: &Identity,
        lookup: impl FnOnce(&Self) -> GraphResult<T>,
    ) -> GraphResult<T> {
        let fresh = self.checkout(id)?;
        match lookup(self) {
            Ok(value) => Ok(value),
            Err(e) => {
                if fresh && e.is_not_found() {
                    self.checkin(id)?;
                }
                Err(e)
            }
        }
    }

    /// Release a single checkout taken by this transaction
    fn checkin(&mut self, id: &Identity) -> GraphResult<()> {
        if self.checked_out.remove(id) {
            self.state.locks.release_all([id], self.id)?;
        }
        Ok(())
    }

    pub(crate) fn stage_node(&mut self, node: Node) {
        self.created_nodes.insert(node.identity.clone(), node);
    }

    pub(crate) fn stage_relationship(&mut self, rel: Relationship) {
        self.created_keys
            .insert(rel.uniqueness_key(), rel.identity.clone());
        self.created_rels.insert(rel.identity.clone(), rel);
    }

    pub(crate) fn stage_node_deletion(&mut self, id: &Identity) {
        self.node_shadows.remove(id);
        if self.created_nodes.shift_remove(id).is_none() {
            self.deleted_node_ids.insert(id.clone());
        }
    }

    pub(crate) fn stage_relationship_deletion(&mut self, rel: Relationship) {
        self.rel_shadows.remove(&rel.identity);
        match self.created_rels.shift_remove(&rel.identity) {
            Some(created) => {
                self.created_keys.remove(&created.uniqueness_key());
            }
            None => {
                self.deleted_rels.insert(rel.identity.clone(), rel);
            }
        }
    }

    /// Identity of the visible relationship holding `key`, if any
    pub(crate) fn find_relationship_by_key(
        &self,
        key: &UniquenessKey,
    ) -> GraphResult<Option<Identity>> {
        if let Some(id) = self.created_keys.get(key) {
            return Ok(Some(id.clone()));
        }
        Ok(self
            .state
            .relationships
            .find_by_key(key)?
            .filter(|id| !self.deleted_rels.contains_key(id)))
    }

    /// Shadow of an existing node, materialized on first write
    fn node_shadow(&mut self, id: &Identity) -> GraphResult<&mut Shadow> {
        if self.deleted_node_ids.contains(id) {
            return Err(GraphError::NodeNotFound(id.clone()));
        }
        if !self.node_shadows.contains_key(id) {
            let node = self.checkout_existing(id, |tx| {
                tx.state
                    .nodes
                    .get(id)?
                    .ok_or_else(|| GraphError::NodeNotFound(id.clone()))
            })?;
            debug!(tx = %self.id, entity = %id, "shadow copy materialized");
            self.node_shadows.insert(id.clone(), Shadow::capture(&node));
        }
        self.node_shadows
            .get_mut(id)
            .ok_or_else(|| GraphError::NodeNotFound(id.clone()))
    }

    fn rel_shadow(&mut self, id: &Identity) -> GraphResult<&mut Shadow> {
        if self.deleted_rels.contains_key(id) {
            return Err(GraphError::RelationshipNotFound(id.clone()));
        }
        if !self.rel_shadows.contains_key(id) {
            let rel = self.checkout_existing(id, |tx| {
                tx.state
                    .relationships
                    .get(id)?
                    .ok_or_else(|| GraphError::RelationshipNotFound(id.clone()))
            })?;
            debug!(tx = %self.id, entity = %id, "shadow copy materialized");
            self.rel_shadows.insert(id.clone(), Shadow::capture(&rel));
        }
        self.rel_shadows
            .get_mut(id)
            .ok_or_else(|| GraphError::RelationshipNotFound(id.clone()))
    }

    // ----- close --------------------------------------------------------

    fn finish(&mut self) -> GraphResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let outcome = if self.success {
            let changes = self.take_changes();
            self.state.commit_transaction(self.id, changes)
        } else {
            let discarded = self.discard();
            self.state.rollback_transaction(self.id, discarded);
            Ok(())
        };

        let released = self.state.locks.release_all(&self.checked_out, self.id);
        self.checked_out.clear();
        outcome.and(released)
    }

    fn take_changes(&mut self) -> ChangeSet {
        self.created_keys.clear();
        ChangeSet {
            created_nodes: mem::take(&mut self.created_nodes).into_values().collect(),
            created_rels: mem::take(&mut self.created_rels).into_values().collect(),
            deleted_node_ids: mem::take(&mut self.deleted_node_ids).into_iter().collect(),
            deleted_rel_ids: mem::take(&mut self.deleted_rels).into_keys().collect(),
            node_shadows: mem::take(&mut self.node_shadows).into_iter().collect(),
            rel_shadows: mem::take(&mut self.rel_shadows).into_iter().collect(),
        }
    }

    /// Drop everything staged; returns how many entries were discarded
    fn discard(&mut self) -> usize {
        let discarded = self.created_nodes.len()
            + self.created_rels.len()
            + self.deleted_node_ids.len()
            + self.deleted_rels.len()
            + self.node_shadows.len()
            + self.rel_shadows.len();
        self.created_nodes.clear();
        self.created_rels.clear();
        self.created_keys.clear();
        self.deleted_node_ids.clear();
        self.deleted_rels.clear();
        self.node_shadows.clear();
        self.rel_shadows.clear();
        discarded
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if !self.success {
            debug!(tx = %self.id, "transaction dropped without close, rolling back");
        }
        if let Err(e) = self.finish() {
            warn!(tx = %self.id, error = %e, "closing dropped transaction failed");
        }
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("created_nodes", &self.created_nodes.len())
            .field("created_rels", &self.created_rels.len())
            .field("deleted_nodes", &self.deleted_node_ids.len())
            .field("deleted_rels", &self.deleted_rels.len())
            .field("modified", &(self.node_shadows.len() + self.rel_shadows.len()))
            .field("success", &self.success)
            .field("closed", &self.closed)
            .finish()
    }
}

/// Merge committed candidates, entities this transaction modified and its
/// staged creations into one filtered view. The filter is applied to the
/// entity as this transaction sees it, so a write that moves an entity into
/// or out of a label or type takes effect immediately for the writer.
fn merged_view<E: Entity>(
    filter: &Filter,
    committed: Vec<E>,
    shadows: &FxHashMap<Identity, Shadow>,
    lookup: impl Fn(&Identity) -> GraphResult<Option<E>>,
    is_deleted: impl Fn(&Identity) -> bool,
    created: impl Iterator<Item = E>,
) -> GraphResult<Vec<E>> {
    let mut seen = FxHashSet::default();
    let mut result = Vec::with_capacity(committed.len());

    for entity in committed {
        let id = entity.identity().clone();
        if is_deleted(&id) {
            continue;
        }
        let view = entity.materialize(shadows.get(&id));
        if filter.matches(&view) {
            result.push(view);
        }
        seen.insert(id);
    }

    for (id, shadow) in shadows {
        if seen.contains(id) || is_deleted(id) {
            continue;
        }
        if let Some(entity) = lookup(id)? {
            let view = entity.materialize(Some(shadow));
            if filter.matches(&view) {
                result.push(view);
            }
        }
    }

    result.extend(created.filter(|e| filter.matches(e)));
    Ok(result)
}

impl GraphRead for Transaction {
    /// Staged deletions read as not found, staged creations are visible,
    /// everything else is the committed node with this transaction's shadow
    fn get_node_by_id(&self, id: &Identity) -> GraphResult<Node> {
        if self.deleted_node_ids.contains(id) {
            return Err(GraphError::NodeNotFound(id.clone()));
        }
        if let Some(node) = self.created_nodes.get(id) {
            return Ok(node.clone());
        }
        let node = self
            .state
            .nodes
            .get(id)?
            .ok_or_else(|| GraphError::NodeNotFound(id.clone()))?;
        Ok(node.materialize(self.node_shadows.get(id)))
    }

    fn get_relationship_by_id(&self, id: &Identity) -> GraphResult<Relationship> {
        if self.deleted_rels.contains_key(id) {
            return Err(GraphError::RelationshipNotFound(id.clone()));
        }
        if let Some(rel) = self.created_rels.get(id) {
            return Ok(rel.clone());
        }
        let rel = self
            .state
            .relationships
            .get(id)?
            .ok_or_else(|| GraphError::RelationshipNotFound(id.clone()))?;
        Ok(rel.materialize(self.rel_shadows.get(id)))
    }

    fn get_nodes(&self, filter: &Filter) -> GraphResult<Vec<Node>> {
        merged_view(
            filter,
            self.state.nodes.values(filter)?,
            &self.node_shadows,
            |id| self.state.nodes.get(id),
            |id| self.deleted_node_ids.contains(id),
            self.created_nodes.values().cloned(),
        )
    }

    fn get_relationships(&self, filter: &Filter) -> GraphResult<Vec<Relationship>> {
        merged_view(
            filter,
            self.state.relationships.values(filter)?,
            &self.rel_shadows,
            |id| self.state.relationships.get(id),
            |id| self.deleted_rels.contains_key(id),
            self.created_rels.values().cloned(),
        )
    }
}
