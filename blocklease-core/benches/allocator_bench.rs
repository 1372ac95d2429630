#[macro_use]
extern crate criterion;

use criterion::Criterion;

use blocklease_core::{BlockAllocator, PoolSpec, SnapshotStore};

fn allocator() -> BlockAllocator {
    BlockAllocator::new(
        PoolSpec::new("10.0.0.0/8", 24),
        PoolSpec::new("fd00::/48", 64),
    )
    .unwrap()
}

fn bench_block_churn(c: &mut Criterion) {
    let mut group = c.benchmark_group("block_churn");

    for family in [4u8, 6] {
        group.bench_function(format!("ipv{}", family), |b| {
            let lsr = allocator();
            b.iter(|| {
                let lease = lsr.get_block(family).unwrap();
                lsr.return_block(lease.id.as_str()).unwrap();
            });
        });
    }
    group.finish();
}

fn bench_address_churn(c: &mut Criterion) {
    let lsr = allocator();
    let block = lsr.get_block(4).unwrap();
    let id = block.id.as_str();

    c.bench_function("address_churn", |b| {
        b.iter(|| {
            let addr = lsr.get_address(id).unwrap();
            lsr.return_address(id, &addr.to_string()).unwrap();
        });
    });
}

fn bench_serialize(c: &mut Criterion) {
    let mut group = c.benchmark_group("snapshot_serialize");

    for blocks in [16usize, 256, 4096] {
        group.throughput(criterion::Throughput::Elements(blocks as u64));
        group.bench_function(format!("blocks_{}", blocks), |b| {
            let lsr = allocator();
            for _ in 0..blocks {
                let lease = lsr.get_block(4).unwrap();
                lsr.get_address(lease.id.as_str()).unwrap();
            }
            b.iter(|| SnapshotStore::serialize(&lsr).unwrap());
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_block_churn,
    bench_address_churn,
    bench_serialize
);
criterion_main!(benches);
