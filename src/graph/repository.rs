//! Repositories: master storage plus secondary indices
//!
//! Each repository keeps a master map `Identity -> entity` and index buckets
//! derived strictly from it:
//! - nodes: label index and type index
//! - relationships: type, source and target indices plus the duplicate guard
//!
//! Every bucket entry has a master entry and every master entry sits in
//! exactly the buckets matching its current labels/type/endpoints.
//!
//! Readers copy bucket contents out under a read lock, so a query racing a
//! commit sees either the state before or after it, never a half-updated
//! bucket.

use super::entity::Entity;
use super::error::{read_lock, write_lock, GraphError, GraphResult};
use super::filter::Filter;
use super::node::Node;
use super::relationship::{Relationship, UniquenessKey};
use super::types::{Identity, Label, RelType};
use crate::persistence::snapshot;
use rustc_hash::{FxHashMap, FxHashSet};
use std::hash::Hash;
use std::path::Path;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{info, warn};

/// Snapshot file holding the node repository
pub const NODES_FILE: &str = "nodes.dat";

/// Snapshot file holding the relationship repository
pub const RELATIONSHIPS_FILE: &str = "relationships.dat";

/// Index from a key to the identities filed under it. Empty buckets are
/// dropped.
#[derive(Debug)]
struct IndexBuckets<K: Hash + Eq> {
    buckets: FxHashMap<K, FxHashSet<Identity>>,
}

impl<K: Hash + Eq> Default for IndexBuckets<K> {
    fn default() -> Self {
        IndexBuckets {
            buckets: FxHashMap::default(),
        }
    }
}

impl<K: Hash + Eq> IndexBuckets<K> {
    fn insert(&mut self, key: K, id: Identity) {
        self.buckets.entry(key).or_default().insert(id);
    }

    fn remove(&mut self, key: &K, id: &Identity) {
        if let Some(bucket) = self.buckets.get_mut(key) {
            bucket.remove(id);
            if bucket.is_empty() {
                self.buckets.remove(key);
            }
        }
    }

    fn ids(&self, key: &K) -> impl Iterator<Item = &Identity> {
        self.buckets.get(key).into_iter().flatten()
    }

    fn bucket_len(&self, key: &K) -> usize {
        self.buckets.get(key).map_or(0, |b| b.len())
    }
}

/// Node master map and indices. Only reachable through [`NodeRepository`]'s
/// lock.
#[derive(Debug, Default)]
pub struct NodeTables {
    master: FxHashMap<Identity, Node>,
    label_index: IndexBuckets<Label>,
    type_index: IndexBuckets<String>,
}

impl NodeTables {
    pub fn add(&mut self, node: Node) {
        if let Some(previous) = self.master.remove(&node.identity) {
            self.unindex(&previous);
        }
        self.index(&node);
        self.master.insert(node.identity.clone(), node);
    }

    pub fn remove(&mut self, ids: &[Identity]) {
        if ids.is_empty() {
            return;
        }
        for id in ids {
            if let Some(node) = self.master.remove(id) {
                self.unindex(&node);
            }
        }
    }

    /// Replace the stored node and re-file it under its current labels and
    /// type. Called for every node whose shadow is merged, since any write may
    /// have changed either.
    pub fn update_cache(&mut self, node: Node) {
        self.add(node);
    }

    pub fn get(&self, id: &Identity) -> Option<&Node> {
        self.master.get(id)
    }

    pub fn contains(&self, id: &Identity) -> bool {
        self.master.contains_key(id)
    }

    pub fn values(&self, filter: &Filter) -> Vec<Node> {
        match filter {
            Filter::Labels(labels) => {
                let mut seen = FxHashSet::default();
                labels
                    .iter()
                    .flat_map(|label| self.label_index.ids(label))
                    .filter(|id| seen.insert(*id))
                    .filter_map(|id| self.master.get(id).cloned())
                    .collect()
            }
            Filter::Type(t) => self
                .type_index
                .ids(t)
                .filter_map(|id| self.master.get(id).cloned())
                .collect(),
            Filter::All | Filter::Source(_) | Filter::Target(_) => self
                .master
                .values()
                .filter(|n| filter.matches(*n))
                .cloned()
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.master.len()
    }

    pub fn is_empty(&self) -> bool {
        self.master.is_empty()
    }

    pub fn label_count(&self, label: &Label) -> usize {
        self.label_index.bucket_len(label)
    }

    pub fn save(&self, dir: &Path, compression_level: u32) -> GraphResult<usize> {
        let mut records: Vec<&Node> = self.master.values().collect();
        records.sort_by(|a, b| a.identity.cmp(&b.identity));
        snapshot::write_snapshot(&dir.join(NODES_FILE), &records, compression_level)?;
        Ok(records.len())
    }

    pub fn load(&mut self, dir: &Path) -> GraphResult<usize> {
        let records: Vec<Node> = snapshot::read_snapshot(&dir.join(NODES_FILE))?;
        let count = records.len();
        for node in records {
            node.identity.reserve();
            self.add(node);
        }
        Ok(count)
    }

    fn index(&mut self, node: &Node) {
        for label in &node.labels {
            self.label_index.insert(label.clone(), node.identity.clone());
        }
        self.type_index
            .insert(node.node_type().to_string(), node.identity.clone());
    }

    fn unindex(&mut self, node: &Node) {
        for label in &node.labels {
            self.label_index.remove(label, &node.identity);
        }
        self.type_index
            .remove(&node.node_type().to_string(), &node.identity);
    }
}

/// Relationship master map, indices and duplicate guard
#[derive(Debug, Default)]
pub struct RelationshipTables {
    master: FxHashMap<Identity, Relationship>,
    type_index: IndexBuckets<RelType>,
    source_index: IndexBuckets<Identity>,
    target_index: IndexBuckets<Identity>,
    duplicate_guard: FxHashMap<UniquenessKey, Identity>,
}

impl RelationshipTables {
    /// Insert a relationship. Fails if another relationship already holds the
    /// same uniqueness key.
    pub fn add(&mut self, rel: Relationship) -> GraphResult<()> {
        let key = rel.uniqueness_key();
        match self.duplicate_guard.get(&key) {
            Some(existing) if *existing != rel.identity => {
                warn!(key = %key, existing = %existing, "rejecting duplicate relationship");
                return Err(GraphError::DuplicateRelationship(key));
            }
            _ => {}
        }

        if let Some(previous) = self.master.remove(&rel.identity) {
            self.unindex(&previous);
        }
        self.index(&rel);
        self.master.insert(rel.identity.clone(), rel);
        Ok(())
    }

    pub fn remove(&mut self, ids: &[Identity]) {
        if ids.is_empty() {
            return;
        }
        for id in ids {
            if let Some(rel) = self.master.remove(id) {
                self.unindex(&rel);
            }
        }
    }

    /// Replace the stored relationship and re-file it
    pub fn update_cache(&mut self, rel: Relationship) -> GraphResult<()> {
        self.add(rel)
    }

    pub fn get(&self, id: &Identity) -> Option<&Relationship> {
        self.master.get(id)
    }

    pub fn contains(&self, id: &Identity) -> bool {
        self.master.contains_key(id)
    }

    /// Identity of the relationship holding `key`, if any
    pub fn find_by_key(&self, key: &UniquenessKey) -> Option<&Identity> {
        self.duplicate_guard.get(key)
    }

    pub fn values(&self, filter: &Filter) -> Vec<Relationship> {
        let ids: Box<dyn Iterator<Item = &Identity> + '_> = match filter {
            Filter::Type(t) => Box::new(self.type_index.ids(&RelType::new(t.as_str()))),
            Filter::Source(node) => Box::new(self.source_index.ids(node)),
            Filter::Target(node) => Box::new(self.target_index.ids(node)),
            Filter::All | Filter::Labels(_) => {
                return self
                    .master
                    .values()
                    .filter(|r| filter.matches(*r))
                    .cloned()
                    .collect();
            }
        };
        ids.filter_map(|id| self.master.get(id).cloned()).collect()
    }

    pub fn len(&self) -> usize {
        self.master.len()
    }

    pub fn is_empty(&self) -> bool {
        self.master.is_empty()
    }

    pub fn save(&self, dir: &Path, compression_level: u32) -> GraphResult<usize> {
        let mut records: Vec<&Relationship> = self.master.values().collect();
        records.sort_by(|a, b| a.identity.cmp(&b.identity));
        snapshot::write_snapshot(&dir.join(RELATIONSHIPS_FILE), &records, compression_level)?;
        Ok(records.len())
    }

    /// Re-insert every record through [`add`](Self::add), rebuilding indices
    /// and the duplicate guard
    pub fn load(&mut self, dir: &Path) -> GraphResult<usize> {
        let records: Vec<Relationship> = snapshot::read_snapshot(&dir.join(RELATIONSHIPS_FILE))?;
        let count = records.len();
        for rel in records {
            rel.identity.reserve();
            self.add(rel)?;
        }
        Ok(count)
    }

    fn index(&mut self, rel: &Relationship) {
        let id = rel.identity.clone();
        self.type_index.insert(rel.rel_type.clone(), id.clone());
        self.source_index.insert(rel.source.clone(), id.clone());
        self.target_index.insert(rel.target.clone(), id.clone());
        self.duplicate_guard.insert(rel.uniqueness_key(), id);
    }

    fn unindex(&mut self, rel: &Relationship) {
        let id = &rel.identity;
        self.type_index.remove(&rel.rel_type, id);
        self.source_index.remove(&rel.source, id);
        self.target_index.remove(&rel.target, id);
        let key = rel.uniqueness_key();
        if self.duplicate_guard.get(&key) == Some(id) {
            self.duplicate_guard.remove(&key);
        }
    }
}

/// Process-lifetime node storage
#[derive(Debug, Default)]
pub struct NodeRepository {
    tables: RwLock<NodeTables>,
}

impl NodeRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &Identity) -> GraphResult<Option<Node>> {
        Ok(read_lock(&self.tables)?.get(id).cloned())
    }

    pub fn values(&self, filter: &Filter) -> GraphResult<Vec<Node>> {
        Ok(read_lock(&self.tables)?.values(filter))
    }

    pub fn len(&self) -> GraphResult<usize> {
        Ok(read_lock(&self.tables)?.len())
    }

    pub fn save(&self, dir: &Path, compression_level: u32) -> GraphResult<usize> {
        let count = read_lock(&self.tables)?.save(dir, compression_level)?;
        info!(count, dir = ?dir, "saved node snapshot");
        Ok(count)
    }

    pub fn load(&self, dir: &Path) -> GraphResult<usize> {
        let count = write_lock(&self.tables)?.load(dir)?;
        info!(count, dir = ?dir, "loaded node snapshot");
        Ok(count)
    }

    pub(crate) fn read(&self) -> GraphResult<RwLockReadGuard<'_, NodeTables>> {
        read_lock(&self.tables)
    }

    pub(crate) fn write(&self) -> GraphResult<RwLockWriteGuard<'_, NodeTables>> {
        write_lock(&self.tables)
    }
}

/// Process-lifetime relationship storage
#[derive(Debug, Default)]
pub struct RelationshipRepository {
    tables: RwLock<RelationshipTables>,
}

impl RelationshipRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &Identity) -> GraphResult<Option<Relationship>> {
        Ok(read_lock(&self.tables)?.get(id).cloned())
    }

    pub fn find_by_key(&self, key: &UniquenessKey) -> GraphResult<Option<Identity>> {
        Ok(read_lock(&self.tables)?.find_by_key(key).cloned())
    }

    pub fn values(&self, filter: &Filter) -> GraphResult<Vec<Relationship>> {
        Ok(read_lock(&self.tables)?.values(filter))
    }

    pub fn len(&self) -> GraphResult<usize> {
        Ok(read_lock(&self.tables)?.len())
    }

    pub fn save(&self, dir: &Path, compression_level: u32) -> GraphResult<usize> {
        let count = read_lock(&self.tables)?.save(dir, compression_level)?;
        info!(count, dir = ?dir, "saved relationship snapshot");
        Ok(count)
    }

    pub fn load(&self, dir: &Path) -> GraphResult<usize> {
        let count = write_lock(&self.tables)?.load(dir)?;
        info!(count, dir = ?dir, "loaded relationship snapshot");
        Ok(count)
    }

    pub(crate) fn read(&self) -> GraphResult<RwLockReadGuard<'_, RelationshipTables>> {
        read_lock(&self.tables)
    }

    pub(crate) fn write(&self) -> GraphResult<RwLockWriteGuard<'_, RelationshipTables>> {
        write_lock(&self.tables)
    }
}
