use criterion::{
    BenchmarkId, Criterion, Throughput, {criterion_group, criterion_main},
};
use psort::{local_sort, psort, BitSpan, Exchange, SortAlgorithm, SortParams, Transport, World};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use strum::IntoEnumIterator;

fn random_keys(n: usize, seed: u64) -> Vec<u64> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n).map(|_| rng.gen()).collect()
}

fn local_sorts(c: &mut Criterion) {
    let mut group = c.benchmark_group("local_sort");
    let keys = random_keys(1 << 16, 1);
    group.throughput(Throughput::Elements(keys.len() as u64));
    for algorithm in [SortAlgorithm::Quick, SortAlgorithm::Radix] {
        group.bench_with_input(BenchmarkId::from_parameter(algorithm), &keys, |b, keys| {
            b.iter(|| {
                let mut keys = keys.clone();
                local_sort(algorithm, &mut keys, BitSpan::FULL).ok();
                keys
            })
        });
    }
    group.finish();
}

fn transports(c: &mut Criterion) {
    let npes = 4;
    let per_rank = 1 << 15;
    let inputs: Vec<Vec<u64>> = (0..npes).map(|r| random_keys(per_rank, r as u64)).collect();
    let params = SortParams::default();

    let mut group = c.benchmark_group("psort");
    group.throughput(Throughput::Elements((npes * per_rank) as u64));
    for transport in Transport::iter() {
        group.bench_with_input(BenchmarkId::from_parameter(transport), &inputs, |b, inputs| {
            b.iter(|| {
                let world = World::new(npes, transport).ok()?;
                let outputs = world.run(|mut ep| {
                    let keys = inputs[ep.rank()].clone();
                    psort(&mut *ep, &params, keys).ok()
                });
                Some(outputs)
            })
        });
    }
    group.finish();
}

criterion_group!(benches, local_sorts, transports);
criterion_main!(benches);
