//! B+tree benchmarks for shadowkv
//!
//! Measures the copy-on-write engine against the in-memory store, keeping
//! page I/O out of the picture: what shows up here is the cost of the
//! path rebuild, the split arithmetic, and the page codec.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use shadowkv::btree::BTree;
use shadowkv::MemStore;

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("btree_insert");

    for count in [100, 1000].iter() {
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::new("sequential", count), count, |b, &count| {
            b.iter(|| {
                let mut store = MemStore::new();
                let mut tree = BTree::new(&mut store);
                for i in 0..count {
                    let key = format!("key{i:08}");
                    let value = format!("value{i:08}");
                    tree.insert(key.as_bytes(), value.as_bytes()).unwrap();
                }
                store
            });
        });
        group.bench_with_input(BenchmarkId::new("reverse", count), count, |b, &count| {
            b.iter(|| {
                let mut store = MemStore::new();
                let mut tree = BTree::new(&mut store);
                for i in (0..count).rev() {
                    let key = format!("key{i:08}");
                    let value = format!("value{i:08}");
                    tree.insert(key.as_bytes(), value.as_bytes()).unwrap();
                }
                store
            });
        });
    }

    group.finish();
}

fn bench_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("btree_search");

    for count in [100, 1000].iter() {
        let mut store = MemStore::new();
        let mut tree = BTree::new(&mut store);
        for i in 0..*count {
            let key = format!("key{i:08}");
            let value = format!("value{i:08}");
            tree.insert(key.as_bytes(), value.as_bytes()).unwrap();
        }

        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::new("hit_every_key", count), count, |b, &count| {
            let tree = BTree::new(&mut store);
            b.iter(|| {
                for i in 0..count {
                    let key = format!("key{i:08}");
                    black_box(tree.get(key.as_bytes()).unwrap());
                }
            });
        });
    }

    group.finish();
}

fn bench_overwrite(c: &mut Criterion) {
    let mut group = c.benchmark_group("btree_overwrite");

    group.bench_function("same_key_1000_times", |b| {
        b.iter(|| {
            let mut store = MemStore::new();
            let mut tree = BTree::new(&mut store);
            for i in 0..1000u32 {
                tree.insert(b"hot-key", &i.to_le_bytes()).unwrap();
            }
            store
        });
    });

    group.finish();
}

criterion_group!(benches, bench_insert, bench_search, bench_overwrite);
criterion_main!(benches);
