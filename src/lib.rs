//! txgraph
//!
//! An in-memory, transactional property graph.
//!
//! # Model
//!
//! - Every node and relationship carries an [`Identity`]: a process-wide
//!   unique id plus a type tag
//! - Nodes have labels, a type and properties; relationships are directed,
//!   typed, and unique per (source, type, target)
//! - All writes happen inside a [`Transaction`]. A transaction sees its own
//!   staged writes; other readers see only committed state
//! - An entity written by one transaction is checked out to it until it
//!   closes; a second writer blocks on it
//! - Committed state can be saved as compressed snapshots and restored on
//!   open
//!
//! ## Example Usage
//!
//! ```rust
//! use txgraph::{Database, GraphRead, Label, PropertyMap, RelType};
//!
//! let db = Database::new();
//!
//! let mut tx = db.begin_tx();
//! let alice = db
//!     .create_node(&mut tx, "Person", vec![Label::new("Person")], PropertyMap::new())
//!     .unwrap();
//! let bob = db
//!     .create_node(&mut tx, "Person", vec![Label::new("Person")], PropertyMap::new())
//!     .unwrap();
//! tx.set_node_property(&alice.identity, "name", "Alice").unwrap();
//! db.create_relationship(&mut tx, &alice.identity, &bob.identity, "KNOWS", PropertyMap::new())
//!     .unwrap();
//! tx.success();
//! tx.close().unwrap();
//!
//! // Query by label
//! let persons = db.get_nodes_by_label(&Label::new("Person")).unwrap();
//! assert_eq!(persons.len(), 2);
//! assert!(db
//!     .has_relationship_to(&alice.identity, &RelType::new("KNOWS"), &bob.identity)
//!     .unwrap());
//! ```

#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod graph;
pub mod persistence;

// Re-export main types for convenience
pub use config::DatabaseConfig;
pub use graph::{
    Database, Direction, Entity, Filter, GraphError, GraphRead, GraphResult, Identity, Label,
    Node, PropertyMap, PropertyValue, RelType, Relationship, Transaction, TxId, UniquenessKey,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get version string
pub fn version() -> &'static str {
    VERSION
}
