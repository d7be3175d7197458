//! Core graph engine
//!
//! This module implements the transactional property graph:
//! - Nodes with labels, a type and properties
//! - Directed, typed relationships, unique per (source, type, target)
//! - Repositories holding committed state with label/type/endpoint indices
//! - Transactions staging work against shadow copies until commit
//! - An entity checkout table serializing writers per entity

pub mod database;
pub mod entity;
pub mod error;
pub mod filter;
pub mod lock;
pub mod node;
pub mod property;
pub mod relationship;
pub mod repository;
pub mod transaction;
pub mod types;

// Re-export main types
pub use database::{Database, GraphRead, OWNS, SECURITY};
pub use entity::{Entity, Shadow};
pub use error::{GraphError, GraphResult};
pub use filter::Filter;
pub use lock::LockTable;
pub use node::{Node, TYPE_KEY};
pub use property::{PropertyMap, PropertyValue};
pub use relationship::{Relationship, UniquenessKey};
pub use repository::{NodeRepository, RelationshipRepository, NODES_FILE, RELATIONSHIPS_FILE};
pub use transaction::Transaction;
pub use types::{Direction, Identity, Label, RelType, TxId};
