//! # ColumnarFrame
//!
//! `ColumnarFrame` is an immutable, in-memory, columnar table engine written in
//! Rust. It supports:
//!
//! - Typed columns (bool, int, float, string, enum) with a uniform null policy
//! - Zero-copy subsetting and reordering through shared row indices
//! - Filtering with built-in comparators, custom predicates and AND/OR/NOT trees
//! - Stable multi-key sorting, enum columns ordered by their declared universe
//! - Hash grouping on composite keys with built-in and custom aggregations
//! - Derived columns through instruction lists or expression trees
//! - Parallel computation with Rayon for large frames
//!
//! # Features
//!
//! - **Immutability**: every operation returns a new [`Frame`]; column storage
//!   is shared between frames and never written after construction
//! - **Error propagation**: a failed operation returns a frame carrying the
//!   error, and chained operations pass it along
//! - **Incremental hashing**: [`helpers::murmur::Murmur32`] keys composite
//!   group-by columns
//! - **Fixed-width rendering** through `Display`
//!
//! # Example
//!
//! ```rust
//! use columnar_frame::{
//!     AggregateOp, Aggregation, CmpOp, ColumnData, Filter, Frame, Order,
//! };
//!
//! fn main() -> Result<(), columnar_frame::FrameError> {
//!     let frame = Frame::new(vec![
//!         ("COL1", ColumnData::from(vec![1i64, 2, 2, 3, 3])),
//!         ("COL2", ColumnData::from(vec!["a", "b", "c", "a", "b"])),
//!     ]);
//!
//!     // Filter rows
//!     let filtered = frame.filter(Filter::new("COL1", CmpOp::Gt, 1)).check()?;
//!     println!("{filtered}");
//!
//!     // Group by category and sum
//!     let sums = frame
//!         .group_by(["COL2"])
//!         .aggregate([Aggregation::new("COL1", AggregateOp::Sum)])
//!         .sort([Order::asc("COL2")])
//!         .check()?;
//!     assert_eq!(sums.int_view("COL1")?.to_vec(), vec![Some(4), Some(5), Some(2)]);
//!
//!     Ok(())
//! }
//! ```

pub mod helpers;
pub mod processor;

pub use processor::apply::{Func1, Func2, Generator, Instruction, Operation};
pub use processor::column::{Column, ColumnData, EnumUniverse};
pub use processor::eval::{EvalContext, Expr};
pub use processor::filter::{Arg, Clause, CmpOp, Filter, Predicate};
pub use processor::frame::{Frame, NewConfig};
pub use processor::functions;
pub use processor::group_by::{Aggregation, GroupConfig, Grouper, Reducer};
pub use processor::index::{BoolView, EnumView, FloatView, Index, IntView, StrView, View};
pub use processor::sort::Order;
pub use processor::{AggregateOp, DataType, FrameError, Value};
