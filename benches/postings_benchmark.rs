use criterion::{Criterion, black_box, criterion_group, criterion_main};
use rand::Rng;
use rand::seq::SliceRandom;

use bibdex::query::eval::{extend_positional, intersect, union};

fn sorted_ids(count: usize, max: i32) -> Vec<i32> {
    let mut rng = rand::thread_rng();
    let mut ids: Vec<i32> = (0..count).map(|_| rng.gen_range(0..max)).collect();
    ids.sort_unstable();
    ids.dedup();
    ids
}

fn positioned(ids: &[i32]) -> Vec<(i32, Vec<u16>)> {
    let mut rng = rand::thread_rng();
    ids.iter()
        .map(|&id| {
            let mut positions: Vec<u16> = (0..8).map(|_| rng.gen_range(1..400)).collect();
            positions.sort_unstable();
            positions.dedup();
            (id, positions)
        })
        .collect()
}

fn bench_merge_joins(c: &mut Criterion) {
    let a = sorted_ids(100_000, 5_000_000);
    let b = sorted_ids(80_000, 5_000_000);

    c.bench_function("intersect_100k_80k", |bench| {
        bench.iter(|| intersect(black_box(&a), black_box(&b)))
    });
    c.bench_function("union_100k_80k", |bench| {
        bench.iter(|| union(black_box(&a), black_box(&b)))
    });
}

fn bench_phrase_extension(c: &mut Criterion) {
    let ids = sorted_ids(20_000, 2_000_000);
    let upstream = positioned(&ids);
    let mut sample: Vec<i32> = ids
        .choose_multiple(&mut rand::thread_rng(), 10_000)
        .copied()
        .collect();
    sample.sort_unstable();
    let downstream = positioned(&sample);

    c.bench_function("extend_positional_20k", |bench| {
        bench.iter(|| extend_positional(black_box(&upstream), black_box(&downstream), 2))
    });
}

criterion_group!(benches, bench_merge_joins, bench_phrase_extension);
criterion_main!(benches);
