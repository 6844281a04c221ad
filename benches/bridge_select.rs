use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::cell::Cell;
use std::rc::Rc;
use vfs_bridge::{register_vfs, BridgeConfigBuilder, Control, Database, Handlers, MemoryStorage};

const ROWS: usize = 1_000;

/// Benchmark SELECT round trips through the bridged VFS and row delivery
fn bench_bridge_select(c: &mut Criterion) {
    let config = BridgeConfigBuilder::new().worker_threads(1).build().unwrap();
    let cx = Control::new(config).unwrap();
    let vfs = register_vfs(&cx, Handlers::immediate(MemoryStorage::new())).unwrap();

    let delivered = Rc::new(Cell::new(0usize));
    let counter = Rc::clone(&delivered);
    let db = Database::init(&cx, move |_, values, _| {
        black_box(values);
        counter.set(counter.get() + 1);
    });

    cx.block_on(db.open("bench.db", &vfs)).unwrap();
    cx.block_on(db.exec("CREATE TABLE test (id INTEGER PRIMARY KEY, data TEXT)"))
        .unwrap();

    let mut insert = String::from("BEGIN;");
    for i in 0..ROWS {
        insert.push_str(&format!("INSERT INTO test (data) VALUES ('Test data {i}');"));
    }
    insert.push_str("COMMIT;");
    cx.block_on(db.exec(&insert)).unwrap();

    let mut group = c.benchmark_group("bridge_select");

    for limit in [1usize, 100] {
        let sql = format!("SELECT * FROM test LIMIT {limit}");
        group.throughput(Throughput::Elements(limit as u64));

        group.bench_with_input(BenchmarkId::new("select", limit), &sql, |b, sql| {
            b.iter(|| {
                cx.block_on(db.exec(sql)).unwrap();
            });
        });
    }

    group.finish();

    cx.block_on(db.close()).unwrap();
    black_box(delivered.get());
}

criterion_group!(benches, bench_bridge_select);
criterion_main!(benches);
