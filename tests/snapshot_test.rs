//! Integration tests for snapshot persistence
//!
//! Verifies that a saved database reopens with identical content, indices
//! and duplicate guard, and that foreign formats are rejected.

use flate2::{Compression, GzBuilder};
use std::fs::File;
use tempfile::TempDir;
use txgraph::graph::{Entity, NODES_FILE, RELATIONSHIPS_FILE};
use txgraph::persistence::{SNAPSHOT_ENTRY, SNAPSHOT_FORMAT_VERSION};
use txgraph::{
    Database, DatabaseConfig, GraphError, GraphRead, Identity, Label, PropertyMap, PropertyValue,
    RelType,
};

fn populated(config: DatabaseConfig) -> (Database, Identity, Identity) {
    let db = Database::open(config).unwrap();
    let mut tx = db.begin_tx();

    let mut props = PropertyMap::new();
    props.insert("name".to_string(), "Alice".into());
    props.insert("scores".to_string(), vec![PropertyValue::Integer(1), PropertyValue::Float(2.5)].into());
    let alice = db
        .create_node(&mut tx, "Person", vec![Label::new("Person"), Label::new("Admin")], props)
        .unwrap();
    let acme = db
        .create_node(&mut tx, "Company", vec![Label::new("Company")], PropertyMap::new())
        .unwrap();

    let mut since = PropertyMap::new();
    since.insert("since".to_string(), 2019i64.into());
    db.create_relationship(&mut tx, &alice.identity, &acme.identity, "WORKS_AT", since)
        .unwrap();
    tx.commit().unwrap();

    (db, alice.identity, acme.identity)
}

#[test]
fn test_save_and_reopen() {
    let dir = TempDir::new().unwrap();
    let config = DatabaseConfig::default().with_data_path(dir.path());

    let (db, alice, acme) = populated(config.clone());
    db.save().unwrap();
    assert!(dir.path().join(NODES_FILE).is_file());
    assert!(dir.path().join(RELATIONSHIPS_FILE).is_file());
    drop(db);

    let reopened = Database::open(config).unwrap();
    assert_eq!(reopened.node_count().unwrap(), 2);
    assert_eq!(reopened.relationship_count().unwrap(), 1);

    let node = reopened.get_node_by_id(&alice).unwrap();
    assert_eq!(node.get_property("name").unwrap().as_string(), Some("Alice"));
    assert_eq!(node.get_property("scores").unwrap().as_array().map(|a| a.len()), Some(2));
    assert!(node.has_label(&Label::new("Admin")));

    // Indices are rebuilt
    assert_eq!(reopened.get_nodes_by_label(&Label::new("Admin")).unwrap().len(), 1);
    assert_eq!(reopened.get_nodes_by_type("Company").unwrap().len(), 1);
    let works_at = RelType::new("WORKS_AT");
    assert!(reopened.has_relationship_to(&alice, &works_at, &acme).unwrap());

    // Duplicate guard is rebuilt
    let mut tx = reopened.begin_tx();
    let dup = reopened.create_relationship(&mut tx, &alice, &acme, works_at, PropertyMap::new());
    assert!(matches!(dup, Err(GraphError::DuplicateRelationship(_))));
}

#[test]
fn test_new_ids_do_not_collide_after_load() {
    let dir = TempDir::new().unwrap();
    let config = DatabaseConfig::default().with_data_path(dir.path());
    let (db, alice, acme) = populated(config.clone());
    db.save().unwrap();
    drop(db);

    let reopened = Database::open(config).unwrap();
    let mut tx = reopened.begin_tx();
    let fresh = reopened
        .create_node(&mut tx, "Person", vec![], PropertyMap::new())
        .unwrap();
    assert!(fresh.identity > alice);
    assert!(fresh.identity > acme);
}

#[test]
fn test_open_creates_missing_directory() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("graph");
    let db = Database::open(DatabaseConfig::default().with_data_path(&path)).unwrap();
    assert!(path.is_dir());
    assert_eq!(db.node_count().unwrap(), 0);
}

#[test]
fn test_save_to_explicit_directory() {
    let dir = TempDir::new().unwrap();
    let (db, _, _) = populated(DatabaseConfig::default());
    db.save_to(dir.path()).unwrap();

    let other = Database::new();
    other.load_from(dir.path()).unwrap();
    assert_eq!(other.node_count().unwrap(), 2);
    assert_eq!(other.relationship_count().unwrap(), 1);
}

#[test]
fn test_uncommitted_work_is_not_saved() {
    let dir = TempDir::new().unwrap();
    let (db, _, _) = populated(DatabaseConfig::default());

    let mut tx = db.begin_tx();
    db.create_node(&mut tx, "Person", vec![], PropertyMap::new())
        .unwrap();
    db.save_to(dir.path()).unwrap();
    tx.close().unwrap();

    let other = Database::new();
    other.load_from(dir.path()).unwrap();
    assert_eq!(other.node_count().unwrap(), 2);
}

#[test]
fn test_format_mismatch_on_open() {
    let dir = TempDir::new().unwrap();
    let file = File::create(dir.path().join(NODES_FILE)).unwrap();
    let mut encoder = GzBuilder::new()
        .filename(SNAPSHOT_ENTRY)
        .write(file, Compression::default());
    bincode::serialize_into(&mut encoder, &(SNAPSHOT_FORMAT_VERSION + 7)).unwrap();
    bincode::serialize_into(&mut encoder, &0u64).unwrap();
    encoder.finish().unwrap();

    let result = Database::open(DatabaseConfig::default().with_data_path(dir.path()));
    assert!(matches!(
        result,
        Err(GraphError::FormatMismatch { found, .. }) if found == SNAPSHOT_FORMAT_VERSION + 7
    ));
}
