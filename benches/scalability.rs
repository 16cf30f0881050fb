use columnar_frame::{AggregateOp, Aggregation, ColumnData, Frame};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::ThreadPoolBuilder;

fn make_frame(rows: usize) -> Frame {
    let mut rng = StdRng::seed_from_u64(7);
    let keys: Vec<i64> = (0..rows).map(|_| rng.random_range(0..1_000)).collect();
    let values: Vec<f64> = (0..rows).map(|_| rng.random_range(0.0..1.0)).collect();
    Frame::new(vec![
        ("key", ColumnData::from(keys)),
        ("value", ColumnData::from(values)),
    ])
}

fn bench_scalability(c: &mut Criterion) {
    for rows in [100_000, 1_000_000] {
        let frame = make_frame(rows);

        for threads in [1, 8] {
            let id = format!("group_by_sum_{rows}rows_{threads}threads");
            let pool = ThreadPoolBuilder::new().num_threads(threads).build().unwrap();
            c.bench_function(&id, |b| {
                pool.install(|| {
                    b.iter(|| {
                        black_box(
                            frame
                                .group_by(["key"])
                                .aggregate([Aggregation::new("value", AggregateOp::Sum)]),
                        )
                    })
                })
            });
        }
    }
}

criterion_group!(benches, bench_scalability);
criterion_main!(benches);
