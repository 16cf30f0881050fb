use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use rayon::prelude::*;
use tracing::debug;

use crate::helpers::murmur::Murmur32;
use crate::processor::column::{Column, ColumnData};
use crate::processor::frame::Frame;
use crate::processor::index::{BoolView, FloatView, Index, IntView, StrView};
use crate::processor::{AggregateOp, DataType, FrameError, Value, PARALLEL_MIN_ROWS};

/// Group count from which groups are reduced in parallel.
const PARALLEL_MIN_GROUPS: usize = 1024;

/// Reduction applied to each group's view of a source column.
#[derive(Clone)]
pub enum Reducer {
    Builtin(AggregateOp),
    Bool(DataType, Arc<dyn Fn(BoolView<'_>) -> Value + Send + Sync>),
    Int(DataType, Arc<dyn Fn(IntView<'_>) -> Value + Send + Sync>),
    Float(DataType, Arc<dyn Fn(FloatView<'_>) -> Value + Send + Sync>),
    /// Also accepts enum columns, which read as labels.
    Str(DataType, Arc<dyn Fn(StrView<'_>) -> Value + Send + Sync>),
}

impl fmt::Debug for Reducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reducer::Builtin(op) => write!(f, "Reducer::Builtin({op:?})"),
            Reducer::Bool(out, _) => write!(f, "Reducer::Bool(.. -> {out})"),
            Reducer::Int(out, _) => write!(f, "Reducer::Int(.. -> {out})"),
            Reducer::Float(out, _) => write!(f, "Reducer::Float(.. -> {out})"),
            Reducer::Str(out, _) => write!(f, "Reducer::Str(.. -> {out})"),
        }
    }
}

/// One output column of [`Grouper::aggregate`].
///
/// The output column is named after the source column unless an alias is
/// set. Custom reducers declare the type of the value they return.
#[derive(Debug, Clone)]
pub struct Aggregation {
    column: String,
    reducer: Reducer,
    alias: Option<String>,
}

impl Aggregation {
    pub fn new(column: &str, op: AggregateOp) -> Self {
        Self::with_reducer(column, Reducer::Builtin(op))
    }

    pub fn bool(
        column: &str,
        output: DataType,
        f: impl Fn(BoolView<'_>) -> Value + Send + Sync + 'static,
    ) -> Self {
        Self::with_reducer(column, Reducer::Bool(output, Arc::new(f)))
    }

    pub fn int(
        column: &str,
        output: DataType,
        f: impl Fn(IntView<'_>) -> Value + Send + Sync + 'static,
    ) -> Self {
        Self::with_reducer(column, Reducer::Int(output, Arc::new(f)))
    }

    pub fn float(
        column: &str,
        output: DataType,
        f: impl Fn(FloatView<'_>) -> Value + Send + Sync + 'static,
    ) -> Self {
        Self::with_reducer(column, Reducer::Float(output, Arc::new(f)))
    }

    pub fn str(
        column: &str,
        output: DataType,
        f: impl Fn(StrView<'_>) -> Value + Send + Sync + 'static,
    ) -> Self {
        Self::with_reducer(column, Reducer::Str(output, Arc::new(f)))
    }

    pub fn with_reducer(column: &str, reducer: Reducer) -> Self {
        Self {
            column: column.to_string(),
            reducer,
            alias: None,
        }
    }

    /// Names the output column.
    pub fn alias(mut self, name: &str) -> Self {
        self.alias = Some(name.to_string());
        self
    }

    pub fn output_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.column)
    }

    fn reduce(&self, column: &Column, groups: &[Index]) -> Result<Column, FrameError> {
        match &self.reducer {
            Reducer::Builtin(op) => self.reduce_builtin(*op, column, groups),
            Reducer::Bool(out, f) => {
                into_column(*out, map_groups(groups, |g| Ok(f(column.bool_view(g.positions())?))))
            }
            Reducer::Int(out, f) => {
                into_column(*out, map_groups(groups, |g| Ok(f(column.int_view(g.positions())?))))
            }
            Reducer::Float(out, f) => into_column(
                *out,
                map_groups(groups, |g| Ok(f(column.float_view(g.positions())?))),
            ),
            Reducer::Str(out, f) => into_column(
                *out,
                map_groups(groups, |g| {
                    Ok(f(column.str_view_inner(g.positions(), true)?))
                }),
            ),
        }
    }

    fn reduce_builtin(
        &self,
        op: AggregateOp,
        column: &Column,
        groups: &[Index],
    ) -> Result<Column, FrameError> {
        let unsupported = || {
            FrameError::TypeMismatch(format!(
                "{op:?} not supported on {} column {:?}",
                column.data_type(),
                self.column
            ))
        };

        match (op, column) {
            (AggregateOp::Count, _) => Ok(Column::from(ColumnData::Int(
                groups.iter().map(|g| Some(g.len() as i64)).collect(),
            ))),
            (AggregateOp::Min | AggregateOp::Max, _) => {
                let wanted = if op == AggregateOp::Min {
                    std::cmp::Ordering::Less
                } else {
                    std::cmp::Ordering::Greater
                };
                let picks = map_groups(groups, |g| {
                    let mut best: Option<usize> = None;
                    for p in g.iter().filter(|&p| !column.is_null(p)) {
                        if best.map_or(true, |b| column.compare(p, b) == wanted) {
                            best = Some(p);
                        }
                    }
                    // An all-null group yields its (null) first element
                    Ok::<_, FrameError>(best.or_else(|| g.get(0)).unwrap_or_default())
                })
                .into_iter()
                .collect::<Result<Vec<usize>, _>>()?;
                Ok(column.gather(&picks))
            }
            (AggregateOp::Sum, Column::Int(v)) => Ok(Column::from(ColumnData::Int(
                groups
                    .iter()
                    .map(|g| Some(g.iter().filter_map(|p| v[p]).fold(0i64, i64::wrapping_add)))
                    .collect(),
            ))),
            (AggregateOp::Sum, Column::Float(v)) => Ok(Column::from(ColumnData::Float(
                groups
                    .iter()
                    .map(|g| g.iter().map(|p| v[p]).filter(|x| !x.is_nan()).sum::<f64>())
                    .collect(),
            ))),
            (AggregateOp::Avg, Column::Int(v)) => Ok(Column::from(ColumnData::Float(
                groups
                    .iter()
                    .map(|g| mean(g.iter().filter_map(|p| v[p]).map(|x| x as f64)))
                    .collect(),
            ))),
            (AggregateOp::Avg, Column::Float(v)) => Ok(Column::from(ColumnData::Float(
                groups
                    .iter()
                    .map(|g| mean(g.iter().map(|p| v[p]).filter(|x| !x.is_nan())))
                    .collect(),
            ))),
            _ => Err(unsupported()),
        }
    }
}

/// Mean of `values`, NaN (null) when empty.
fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), x| (s + x, n + 1));
    if n == 0 {
        f64::NAN
    } else {
        sum / n as f64
    }
}

fn map_groups<T, F>(groups: &[Index], f: F) -> Vec<Result<T, FrameError>>
where
    T: Send,
    F: Fn(&Index) -> Result<T, FrameError> + Sync,
{
    if groups.len() >= PARALLEL_MIN_GROUPS {
        groups.par_iter().map(&f).collect()
    } else {
        groups.iter().map(&f).collect()
    }
}

fn into_column(
    output: DataType,
    values: Vec<Result<Value, FrameError>>,
) -> Result<Column, FrameError> {
    let values = values.into_iter().collect::<Result<Vec<_>, _>>()?;
    ColumnData::from_values(output, values).map(Column::from)
}

/// Options for [`Frame::group_by_with`].
#[derive(Debug, Clone, Copy)]
pub struct GroupConfig {
    null_groups: bool,
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self { null_groups: true }
    }
}

impl GroupConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether rows with null keys group together (the default). When off,
    /// every row with a null in any key column forms a group of its own.
    pub fn null_groups(mut self, enabled: bool) -> Self {
        self.null_groups = enabled;
        self
    }
}

/// Rows of a frame partitioned by composite key.
///
/// Groups are kept in order of first appearance and each holds its row
/// positions in index order.
#[derive(Debug, Clone)]
pub struct Grouper {
    frame: Frame,
    columns: Vec<String>,
    groups: Vec<Index>,
    err: Option<FrameError>,
}

impl Grouper {
    fn new(frame: &Frame, columns: Vec<String>, config: GroupConfig) -> Self {
        let mut grouper = Self {
            frame: frame.clone(),
            columns,
            groups: Vec::new(),
            err: frame.err.clone(),
        };
        if grouper.err.is_some() {
            return grouper;
        }

        let keys = match grouper
            .columns
            .iter()
            .map(|c| frame.column(c))
            .collect::<Result<Vec<_>, _>>()
        {
            Ok(keys) => keys,
            Err(e) => {
                grouper.err = Some(e);
                return grouper;
            }
        };

        let groups = partition(&keys, frame.index.positions(), config);
        debug!(
            keys = ?grouper.columns,
            null_groups = config.null_groups,
            rows = frame.len(),
            groups = groups.len(),
            "Rows grouped"
        );
        grouper.groups = groups.into_iter().map(Index::from_positions).collect();
        grouper
    }

    pub fn err(&self) -> Option<&FrameError> {
        self.err.as_ref()
    }

    /// Grouping column names, in key order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Group indices into the grouped frame's storage.
    pub fn groups(&self) -> &[Index] {
        &self.groups
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Reduces every group to one row: key columns followed by one column per
    /// aggregation.
    ///
    /// # Errors
    /// Attached to the returned frame:
    /// - [`FrameError::MissingColumn`] for an unknown key or source column
    /// - [`FrameError::TypeMismatch`] when a reducer does not fit the source
    ///   column or returns a value of another type than declared
    /// - [`FrameError::Configuration`] when output names collide
    ///
    /// # Example
    /// ```rust
    /// use columnar_frame::{AggregateOp, Aggregation, ColumnData, Frame};
    ///
    /// let frame = Frame::new(vec![
    ///     ("COL1", ColumnData::from(vec![1i64, 2, 2, 3, 3])),
    ///     ("COL2", ColumnData::from(vec!["a", "b", "c", "a", "b"])),
    /// ]);
    /// let sums = frame
    ///     .group_by(["COL2"])
    ///     .aggregate([Aggregation::new("COL1", AggregateOp::Sum)]);
    /// assert_eq!(sums.len(), 3);
    /// ```
    pub fn aggregate(&self, aggregations: impl IntoIterator<Item = Aggregation>) -> Frame {
        if self.frame.err.is_some() {
            return self.frame.clone();
        }
        match self.try_aggregate(aggregations.into_iter().collect()) {
            Ok(frame) => frame,
            Err(e) => Frame::from_error("aggregate", e),
        }
    }

    fn try_aggregate(&self, aggregations: Vec<Aggregation>) -> Result<Frame, FrameError> {
        if let Some(e) = &self.err {
            return Err(e.clone());
        }

        let mut names: HashSet<&str> = self.columns.iter().map(String::as_str).collect();
        for agg in &aggregations {
            if !names.insert(agg.output_name()) {
                return Err(FrameError::Configuration(format!(
                    "aggregation output {:?} collides with another column",
                    agg.output_name()
                )));
            }
        }

        let firsts: Vec<usize> = self
            .groups
            .iter()
            .map(|g| g.get(0).unwrap_or_default())
            .collect();

        let mut columns = Vec::with_capacity(self.columns.len() + aggregations.len());
        for name in &self.columns {
            columns.push((name.clone(), self.frame.column(name)?.gather(&firsts)));
        }
        for agg in &aggregations {
            let source = self.frame.column(&agg.column)?;
            columns.push((agg.output_name().to_string(), agg.reduce(source, &self.groups)?));
        }

        debug!(
            groups = self.groups.len(),
            aggregations = aggregations.len(),
            "Groups aggregated"
        );
        let rows = self.groups.len();
        Ok(Frame {
            columns,
            index: Index::range(rows),
            storage_len: rows,
            err: None,
        })
    }
}

/// Hash partitions `positions` by the composite key over `keys`.
fn partition(keys: &[&Column], positions: &[usize], config: GroupConfig) -> Vec<Vec<usize>> {
    let hash_row = |p: usize| {
        let mut hasher = Murmur32::new();
        for key in keys {
            if !config.null_groups && key.is_null(p) {
                hasher.write_rand32();
            } else {
                key.hash_into(p, &mut hasher);
            }
        }
        hasher.sum32()
    };
    partition_with(keys, positions, config.null_groups, hash_row)
}

/// Partitions `positions` into buckets by `hash_row`.
///
/// Rows in one bucket are split by full key equality, so colliding keys still
/// land in separate groups. Null keys only match when `null_groups` is set.
fn partition_with<H>(
    keys: &[&Column],
    positions: &[usize],
    null_groups: bool,
    hash_row: H,
) -> Vec<Vec<usize>>
where
    H: Fn(usize) -> u32 + Sync,
{
    if positions.is_empty() {
        return Vec::new();
    }
    if keys.is_empty() {
        return vec![positions.to_vec()];
    }

    let hashes: Vec<u32> = if positions.len() >= PARALLEL_MIN_ROWS {
        positions.par_iter().map(|&p| hash_row(p)).collect()
    } else {
        positions.iter().map(|&p| hash_row(p)).collect()
    };

    let same_key = |a: usize, b: usize| {
        keys.iter()
            .all(|key| key.equal(a, b) && (null_groups || !key.is_null(b)))
    };

    let mut buckets: HashMap<u32, Vec<usize>> = HashMap::new();
    let mut groups: Vec<Vec<usize>> = Vec::new();
    for (&p, &hash) in positions.iter().zip(&hashes) {
        let candidates = buckets.entry(hash).or_default();
        let found = candidates
            .iter()
            .copied()
            .find(|&g| same_key(groups[g][0], p));
        match found {
            Some(g) => groups[g].push(p),
            None => {
                candidates.push(groups.len());
                groups.push(vec![p]);
            }
        }
    }
    groups
}

impl Frame {
    /// Partitions the rows by the values of `columns`.
    ///
    /// Grouping by no columns yields one group holding every row.
    pub fn group_by<I, S>(&self, columns: I) -> Grouper
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.group_by_with(columns, GroupConfig::default())
    }

    /// [`Frame::group_by`] with explicit grouping options.
    pub fn group_by_with<I, S>(&self, columns: I, config: GroupConfig) -> Grouper
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let columns = columns.into_iter().map(|c| c.as_ref().to_string()).collect();
        Grouper::new(self, columns, config)
    }

    /// First row of every distinct key over `columns`; all columns when
    /// `columns` is empty.
    pub fn distinct<I, S>(&self, columns: I) -> Frame
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if self.err.is_some() {
            return self.clone();
        }
        let mut columns: Vec<String> = columns.into_iter().map(|c| c.as_ref().to_string()).collect();
        if columns.is_empty() {
            columns = self.columns.iter().map(|(n, _)| n.clone()).collect();
        }
        let grouper = Grouper::new(self, columns, GroupConfig::default());
        if let Some(e) = grouper.err {
            return Frame::from_error("distinct", e);
        }
        let firsts = grouper.groups.iter().filter_map(|g| g.get(0)).collect();
        self.with_index(Index::from_positions(firsts))
    }
}
