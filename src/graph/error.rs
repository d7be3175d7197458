//! Error type shared by the whole engine

use super::relationship::UniquenessKey;
use super::types::Identity;
use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;

/// Errors that can occur during graph operations
#[derive(Error, Debug)]
pub enum GraphError {
    /// Absent from the transaction view and the repository, or staged for
    /// deletion in the active transaction
    #[error("Node {0} not found")]
    NodeNotFound(Identity),

    #[error("Relationship {0} not found")]
    RelationshipNotFound(Identity),

    /// A relationship with the same (source, type, target) already exists
    #[error("Relationship {0} already exists")]
    DuplicateRelationship(UniquenessKey),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Snapshot written by a different format version; no migration exists
    #[error("Snapshot format version mismatch: expected {expected}, found {found}")]
    FormatMismatch { expected: u32, found: u32 },

    #[error("Corrupt snapshot: {0}")]
    CorruptSnapshot(String),

    #[error("Timed out waiting for lock on {0}")]
    LockTimeout(Identity),

    #[error("Internal lock poisoned")]
    LockPoisoned,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),
}

impl GraphError {
    /// True for the "no result" conditions callers usually recover from
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            GraphError::NodeNotFound(_) | GraphError::RelationshipNotFound(_)
        )
    }
}

pub type GraphResult<T> = Result<T, GraphError>;

pub(crate) fn acquire_lock<T>(lock: &Mutex<T>) -> GraphResult<MutexGuard<'_, T>> {
    lock.lock().map_err(|_| GraphError::LockPoisoned)
}

pub(crate) fn read_lock<T>(lock: &RwLock<T>) -> GraphResult<RwLockReadGuard<'_, T>> {
    lock.read().map_err(|_| GraphError::LockPoisoned)
}

pub(crate) fn write_lock<T>(lock: &RwLock<T>) -> GraphResult<RwLockWriteGuard<'_, T>> {
    lock.write().map_err(|_| GraphError::LockPoisoned)
}
