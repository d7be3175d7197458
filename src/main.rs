use anyhow::Context;
use txgraph::graph::{Direction, Entity};
use txgraph::{Database, DatabaseConfig, GraphRead, Label, PropertyMap, RelType};

fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    println!("txgraph v{}", txgraph::version());
    println!("==========================================");
    println!();

    // Optional YAML config as the first argument
    let config = match std::env::args().nth(1) {
        Some(path) => DatabaseConfig::from_yaml_file(&path)
            .with_context(|| format!("loading config from {}", path))?,
        None => DatabaseConfig::default(),
    };
    let db = Database::open(config).context("opening database")?;

    demo_transactions(&db)?;
    demo_isolation(&db)?;

    if db.config().data_path.is_some() {
        db.save().context("saving snapshot")?;
        println!("\n✓ Snapshot saved");
    }

    Ok(())
}

fn person(name: &str, age: i64, city: &str) -> PropertyMap {
    let mut props = PropertyMap::new();
    props.insert("name".to_string(), name.into());
    props.insert("age".to_string(), age.into());
    props.insert("city".to_string(), city.into());
    props
}

fn demo_transactions(db: &Database) -> anyhow::Result<()> {
    println!("=== Demo 1: Transactional writes ===");

    let mut tx = db.begin_tx();
    let alice = db.create_node(&mut tx, "Person", vec![Label::new("Person")], person("Alice", 30, "New York"))?;
    println!("✓ Created Person: Alice (age 30, New York)");
    let bob = db.create_node(&mut tx, "Person", vec![Label::new("Person")], person("Bob", 25, "San Francisco"))?;
    println!("✓ Created Person: Bob (age 25, San Francisco)");
    let charlie = db.create_node(&mut tx, "Person", vec![Label::new("Person")], person("Charlie", 35, "New York"))?;
    println!("✓ Created Person: Charlie (age 35, New York)");

    let mut since = PropertyMap::new();
    since.insert("since".to_string(), 2020i64.into());
    alice.create_relationship_to(db, &mut tx, &bob, "KNOWS", since)?;
    println!("✓ Alice -[KNOWS]-> Bob (since 2020)");
    bob.create_relationship_to(db, &mut tx, &charlie, "KNOWS", PropertyMap::new())?;
    println!("✓ Bob -[KNOWS]-> Charlie");
    alice.create_relationship_to(db, &mut tx, &charlie, "FOLLOWS", PropertyMap::new())?;
    println!("✓ Alice -[FOLLOWS]-> Charlie");

    if let Err(e) = alice.create_relationship_to(db, &mut tx, &bob, "KNOWS", PropertyMap::new()) {
        println!("✗ Second Alice -[KNOWS]-> Bob rejected: {}", e);
    }

    tx.commit()?;

    println!("\nGraph Statistics:");
    println!("  Total nodes: {}", db.node_count()?);
    println!("  Total relationships: {}", db.relationship_count()?);

    let outgoing = alice.relationships(db, Direction::Outgoing, None)?;
    println!("  Alice has {} outgoing relationships", outgoing.len());
    println!(
        "  Alice knows Bob: {}",
        alice.has_relationship_to(db, &RelType::new("KNOWS"), &bob)?
    );
    Ok(())
}

fn demo_isolation(db: &Database) -> anyhow::Result<()> {
    println!("\n=== Demo 2: Isolation ===");

    let alice = db
        .get_nodes_by_label(&Label::new("Person"))?
        .into_iter()
        .find(|n| n.get_property("name").and_then(|v| v.as_string()) == Some("Alice"))
        .context("Alice not found")?;

    let mut tx = db.begin_tx();
    tx.set_node_property(&alice.identity, "city", "Boston")?;
    tx.add_label(&alice.identity, "Traveller")?;

    let inside = tx.get_node_property(&alice.identity, "city")?;
    let outside = db.get_node_by_id(&alice.identity)?;
    println!("  Inside the transaction:  city = {:?}", inside.map(|v| v.to_string()));
    println!(
        "  Outside the transaction: city = {:?}",
        outside.get_property("city").map(|v| v.to_string())
    );

    tx.rollback()?;
    println!("✓ Rolled back; travellers: {}", db.get_nodes_by_label(&Label::new("Traveller"))?.len());
    Ok(())
}
