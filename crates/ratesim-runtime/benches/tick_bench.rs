use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};
use ratesim_runtime::{
    Adjacency, Delay, Dynamics, LeakyParams, MemoryBudget, Network, NetworkBuilder, NetworkConfig,
    PopulationSpec, ProjectionSpec, Weights,
};

fn random_adjacency(size: u32, fan_in: u32) -> Adjacency<u32> {
    let pairs = (0..size).flat_map(move |post| {
        (0..fan_in).map(move |k| {
            let hash = ((post as u64) << 32 | k as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15);
            (post, (hash % size as u64) as u32)
        })
    });
    Adjacency::from_pairs(pairs)
}

fn build_network(size: u32, delay: Delay) -> Network {
    let config = NetworkConfig::default()
        .with_memory_budget(MemoryBudget::Unlimited)
        .with_seed(1234);
    let leaky = || Dynamics::leaky(LeakyParams::default()).expect("valid params");

    NetworkBuilder::new()
        .with_config(config)
        .add_population(PopulationSpec::input("input", size as usize))
        .add_population(PopulationSpec::new("exc", size as usize, leaky()))
        .add_population(PopulationSpec::new("inh", size as usize, leaky()))
        .add_projection(
            ProjectionSpec::new("input", "exc", "exc", random_adjacency(size, 32))
                .with_weights(Weights::Constant(0.1))
                .with_delay(delay),
        )
        .add_projection(
            ProjectionSpec::new("exc", "inh", "exc", random_adjacency(size, 32))
                .with_weights(Weights::Constant(0.1)),
        )
        .add_projection(
            ProjectionSpec::new("inh", "exc", "inh", random_adjacency(size, 32))
                .with_weights(Weights::Constant(0.2)),
        )
        .build()
        .expect("bench network build")
}

fn bench_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("network_step");

    for &n in &[256u32, 1024] {
        group.throughput(Throughput::Elements(3 * n as u64));
        for (label, delay) in [
            ("no_delay", Delay::None),
            ("uniform_delay", Delay::Uniform(5)),
            (
                "per_synapse_delay",
                Delay::PerSynapse((0..n).map(|post| vec![1 + post % 5; 32]).collect()),
            ),
        ] {
            group.bench_with_input(BenchmarkId::new(label, n), &n, |b, &n| {
                b.iter_batched(
                    || {
                        let mut network = build_network(n, delay.clone());
                        let input = network.population_id("input").expect("input population");
                        network
                            .set_rates(input, &vec![1.0; n as usize])
                            .expect("input rates");
                        network
                    },
                    |mut network| {
                        for _ in 0..10 {
                            network.step().unwrap();
                        }
                    },
                    BatchSize::LargeInput,
                );
            });
        }
    }

    group.finish();
}

criterion_group!(benches, bench_step);
criterion_main!(benches);
