use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use txgraph::graph::Direction;
use txgraph::{Database, GraphRead, Identity, Label, PropertyMap};

fn person(i: usize) -> PropertyMap {
    let mut props = PropertyMap::new();
    props.insert("name".to_string(), format!("Person{}", i).into());
    props.insert("age".to_string(), ((i % 100) as i64).into());
    props
}

/// Benchmark node insertion throughput (one transaction per batch)
fn bench_node_insertion(c: &mut Criterion) {
    let mut group = c.benchmark_group("node_insertion");

    for size in [100, 1000, 10_000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                let db = Database::new();
                let mut tx = db.begin_tx();
                for i in 0..size {
                    db.create_node(&mut tx, "Person", vec![Label::new("Person")], person(i))
                        .unwrap();
                }
                tx.commit().unwrap();
            });
        });
    }
    group.finish();
}

/// Benchmark label scan performance
fn bench_label_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("label_scan");

    for size in [100, 1000, 10_000].iter() {
        // Setup: create nodes plus some noise nodes
        let db = Database::new();
        let mut tx = db.begin_tx();
        for i in 0..*size {
            db.create_node(&mut tx, "Person", vec![Label::new("Person")], person(i))
                .unwrap();
        }
        for _ in 0..(*size / 2) {
            db.create_node(&mut tx, "Company", vec![Label::new("Company")], PropertyMap::new())
                .unwrap();
        }
        tx.commit().unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                let nodes = db.get_nodes_by_label(&Label::new("Person")).unwrap();
                criterion::black_box(nodes.len());
            });
        });
    }
    group.finish();
}

/// Benchmark neighbourhood lookups on a chain n0 -> n1 -> ... -> n99
fn bench_traversal(c: &mut Criterion) {
    let mut group = c.benchmark_group("traversal");

    let db = Database::new();
    let mut tx = db.begin_tx();
    let ids: Vec<Identity> = (0..100)
        .map(|i| {
            db.create_node(&mut tx, "Person", vec![Label::new("Person")], person(i))
                .unwrap()
                .identity
        })
        .collect();
    for pair in ids.windows(2) {
        db.create_relationship(&mut tx, &pair[0], &pair[1], "KNOWS", PropertyMap::new())
            .unwrap();
    }
    tx.commit().unwrap();

    group.bench_function("committed_both", |b| {
        b.iter(|| {
            let rels = db.get_relationships_of(&ids[50], Direction::Both, None).unwrap();
            criterion::black_box(rels.len());
        });
    });

    group.bench_function("full_chain_walk", |b| {
        b.iter(|| {
            let mut current = ids[0].clone();
            let mut hops = 0;
            while let Some(rel) = db
                .get_relationships_of(&current, Direction::Outgoing, None)
                .unwrap()
                .into_iter()
                .next()
            {
                current = rel.target;
                hops += 1;
            }
            criterion::black_box(hops);
        });
    });

    group.finish();
}

/// Benchmark a read-modify-commit cycle on an existing node
fn bench_shadow_commit(c: &mut Criterion) {
    let db = Database::new();
    let mut tx = db.begin_tx();
    let id = db
        .create_node(&mut tx, "Person", vec![Label::new("Person")], person(0))
        .unwrap()
        .identity;
    tx.commit().unwrap();

    c.bench_function("shadow_commit", |b| {
        let mut n = 0i64;
        b.iter(|| {
            let mut tx = db.begin_tx();
            tx.set_node_property(&id, "counter", n).unwrap();
            tx.commit().unwrap();
            n += 1;
        });
    });
}

criterion_group!(
    benches,
    bench_node_insertion,
    bench_label_scan,
    bench_traversal,
    bench_shadow_commit,
);
criterion_main!(benches);
