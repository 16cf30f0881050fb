use std::time::Instant;

use columnar_frame::{
    AggregateOp, Aggregation, CmpOp, ColumnData, Expr, Filter, Frame, NewConfig, Order,
};
use rand::Rng;
use tracing::info;
use tracing_subscriber::EnvFilter;

const ROWS: usize = 1_000_000;
const REGIONS: [&str; 6] = ["US", "EU", "ASIA", "AFRICA", "AUSTRALIA", "SOUTH AMERICA"];

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).compact().init();
}

/// Synthetic dataset: id, value, category (enum), region.
fn generate(rows: usize) -> Frame {
    let mut rng = rand::rng();
    let ids: Vec<i64> = (0..rows as i64).collect();
    let values: Vec<f64> = (0..rows).map(|_| rng.random_range(1.0..1000.0)).collect();
    let categories: Vec<&str> = (0..rows)
        .map(|_| ["A", "B", "C", "D"][rng.random_range(0..4)])
        .collect();
    let regions: Vec<&str> = (0..rows)
        .map(|_| REGIONS[rng.random_range(0..REGIONS.len())])
        .collect();

    Frame::with_config(
        vec![
            ("id", ColumnData::from(ids)),
            ("value", ColumnData::from(values)),
            ("category", ColumnData::from(categories)),
            ("region", ColumnData::from(regions)),
        ],
        NewConfig::new()
            .column_order(["id", "category", "region", "value"])
            .enum_values("category", ["D", "C", "B", "A"]),
    )
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    let start = Instant::now();
    let frame = generate(ROWS).check()?;
    info!(rows = frame.len(), elapsed = ?start.elapsed(), "Dataset generated");

    let start = Instant::now();
    let expensive = frame
        .filter(Filter::new("value", CmpOp::Gt, 500.0))
        .check()?;
    info!(rows = expensive.len(), elapsed = ?start.elapsed(), "Filtered value > 500");

    let start = Instant::now();
    let summary = expensive
        .group_by(["category", "region"])
        .aggregate([
            Aggregation::new("value", AggregateOp::Avg).alias("avg"),
            Aggregation::new("value", AggregateOp::Count).alias("count"),
        ])
        .sort([Order::asc("category"), Order::desc("avg")])
        .check()?;
    info!(groups = summary.len(), elapsed = ?start.elapsed(), "Grouped by category, region");

    let labelled = summary
        .eval(
            "label",
            &Expr::binary("+", Expr::col("category"), Expr::lit("/")),
        )
        .eval(
            "label",
            &Expr::binary("+", Expr::col("label"), Expr::col("region")),
        )
        .check()?;

    println!("{}", labelled.slice(0, labelled.len().min(10)));
    Ok(())
}
