use columnar_frame::{
    AggregateOp, Aggregation, CmpOp, ColumnData, Expr, Filter, Frame, NewConfig, Order,
};
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const ROWS: usize = 1_000_000;

fn make_frame(rows: usize) -> Frame {
    let mut rng = StdRng::seed_from_u64(42);
    let values: Vec<f64> = (0..rows).map(|_| rng.random_range(1.0..1000.0)).collect();
    let ids: Vec<i64> = (0..rows).map(|_| rng.random_range(0..10_000)).collect();
    let categories: Vec<&str> = (0..rows)
        .map(|_| ["A", "B", "C", "D"][rng.random_range(0..4)])
        .collect();
    let regions: Vec<&str> = (0..rows)
        .map(|_| ["US", "EU", "ASIA", "AFRICA"][rng.random_range(0..4)])
        .collect();

    Frame::with_config(
        vec![
            ("id", ColumnData::from(ids)),
            ("value", ColumnData::from(values)),
            ("category", ColumnData::from(categories)),
            ("region", ColumnData::from(regions)),
        ],
        NewConfig::new().enum_column("category"),
    )
}

fn frame_ops(c: &mut Criterion) {
    let frame = make_frame(ROWS);

    let mut group = c.benchmark_group("Frame");
    group.sample_size(10);
    group.throughput(Throughput::Elements(ROWS as u64));

    group.bench_function("filter_value_gt", |b| {
        b.iter(|| black_box(frame.filter(Filter::new("value", CmpOp::Gt, 500.0))))
    });

    group.bench_function("sort_id_value", |b| {
        b.iter(|| black_box(frame.sort([Order::asc("id"), Order::desc("value")])))
    });

    group.bench_function("group_by_category_avg", |b| {
        b.iter(|| {
            black_box(
                frame
                    .group_by(["category"])
                    .aggregate([Aggregation::new("value", AggregateOp::Avg)]),
            )
        })
    });

    group.bench_function("group_by_category_region_sum", |b| {
        b.iter(|| {
            black_box(
                frame
                    .group_by(["category", "region"])
                    .aggregate([Aggregation::new("value", AggregateOp::Sum)]),
            )
        })
    });

    group.bench_function("eval_value_times_two", |b| {
        let expr = Expr::binary("*", Expr::col("value"), Expr::lit(2.0));
        b.iter(|| black_box(frame.eval("double", &expr)))
    });

    group.finish();
}

criterion_group!(benches, frame_ops);
criterion_main!(benches);
