use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ratesim_storage::{Adjacency, ConnectivityMatrix, Layout, MemoryBudget};

fn random_adjacency(size: u32, fan_in: u32) -> Adjacency<u32> {
    // Deterministic hash-based pattern keeps runs comparable
    let pairs = (0..size).flat_map(move |post| {
        (0..fan_in).map(move |k| {
            let hash = ((post as u64) << 32 | k as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15);
            (post, (hash % size as u64) as u32)
        })
    });
    Adjacency::from_pairs(pairs)
}

fn bench_ingestion(c: &mut Criterion) {
    let mut group = c.benchmark_group("offset_matrix_ingestion");

    for &n in &[128u32, 512, 1024] {
        let adjacency = random_adjacency(n, 16);
        group.throughput(Throughput::Elements(adjacency.nb_synapses() as u64));

        for layout in [Layout::RowMajor, Layout::ColumnMajor] {
            let name = format!("{:?}", layout);
            group.bench_with_input(BenchmarkId::new(name, n), &adjacency, |b, adj| {
                b.iter(|| {
                    let mut m = ConnectivityMatrix::new(0, n, 0, n, layout).unwrap();
                    m.init_from_adjacency(adj, &MemoryBudget::Unlimited).unwrap();
                    m
                });
            });
        }
    }

    group.finish();
}

fn bench_queries(c: &mut Criterion) {
    let mut group = c.benchmark_group("offset_matrix_queries");
    let n = 1024u32;
    let adjacency = random_adjacency(n, 16);

    for layout in [Layout::RowMajor, Layout::ColumnMajor] {
        let mut m = ConnectivityMatrix::new(0, n, 0, n, layout).unwrap();
        m.init_from_adjacency(&adjacency, &MemoryBudget::Unlimited).unwrap();

        group.bench_function(format!("decode_all_rows/{:?}", layout), |b| {
            b.iter(|| {
                let mut total = 0usize;
                for row in 0..n {
                    total += m.decode_column_indices(row).unwrap().count();
                }
                total
            });
        });

        group.bench_function(format!("count_incoming/{:?}", layout), |b| {
            b.iter(|| m.count_incoming_per_column().unwrap());
        });
    }

    group.finish();
}

criterion_group!(benches, bench_ingestion, bench_queries);
criterion_main!(benches);
