use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use rayon::prelude::*;
use tracing::debug;

use crate::processor::column::{Column, EnumUniverse};
use crate::processor::frame::Frame;
use crate::processor::index::Index;
use crate::processor::{FrameError, Value, PARALLEL_MIN_ROWS};

/// Built-in comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl CmpOp {
    fn matches(self, ord: Ordering) -> bool {
        match self {
            CmpOp::Eq => ord == Ordering::Equal,
            CmpOp::Ne => ord != Ordering::Equal,
            CmpOp::Gt => ord == Ordering::Greater,
            CmpOp::Ge => ord != Ordering::Less,
            CmpOp::Lt => ord == Ordering::Less,
            CmpOp::Le => ord != Ordering::Greater,
        }
    }

    /// Outcome for a row whose element (or argument) is null.
    fn matches_null(self) -> bool {
        self == CmpOp::Ne
    }

    fn is_equality(self) -> bool {
        matches!(self, CmpOp::Eq | CmpOp::Ne)
    }
}

impl FromStr for CmpOp {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "=" => Ok(CmpOp::Eq),
            "!=" => Ok(CmpOp::Ne),
            ">" => Ok(CmpOp::Gt),
            ">=" => Ok(CmpOp::Ge),
            "<" => Ok(CmpOp::Lt),
            "<=" => Ok(CmpOp::Le),
            other => Err(FrameError::BadData(format!("unknown comparator {other:?}"))),
        }
    }
}

/// User supplied single-argument predicate, typed by column element.
///
/// `Str` predicates also accept enum columns and receive the label.
#[derive(Clone)]
pub enum Predicate {
    Bool(Arc<dyn Fn(Option<bool>) -> bool + Send + Sync>),
    Int(Arc<dyn Fn(Option<i64>) -> bool + Send + Sync>),
    Float(Arc<dyn Fn(f64) -> bool + Send + Sync>),
    Str(Arc<dyn Fn(Option<&str>) -> bool + Send + Sync>),
}

impl Predicate {
    pub fn bool(f: impl Fn(Option<bool>) -> bool + Send + Sync + 'static) -> Self {
        Predicate::Bool(Arc::new(f))
    }

    pub fn int(f: impl Fn(Option<i64>) -> bool + Send + Sync + 'static) -> Self {
        Predicate::Int(Arc::new(f))
    }

    pub fn float(f: impl Fn(f64) -> bool + Send + Sync + 'static) -> Self {
        Predicate::Float(Arc::new(f))
    }

    pub fn str(f: impl Fn(Option<&str>) -> bool + Send + Sync + 'static) -> Self {
        Predicate::Str(Arc::new(f))
    }

    fn type_name(&self) -> &'static str {
        match self {
            Predicate::Bool(_) => "bool",
            Predicate::Int(_) => "int",
            Predicate::Float(_) => "float",
            Predicate::Str(_) => "string",
        }
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Predicate::{}(..)", self.type_name())
    }
}

/// Right hand side of a built-in comparison.
#[derive(Debug, Clone)]
pub enum Arg {
    Value(Value),
    Column(String),
}

#[derive(Debug, Clone)]
pub enum Comparator {
    Cmp(CmpOp, Arg),
    Func(Predicate),
}

/// Single filter clause on one column.
#[derive(Debug, Clone)]
pub struct Filter {
    column: String,
    comparator: Comparator,
    universe: Option<Vec<String>>,
}

impl Filter {
    /// `column <op> literal`
    pub fn new(column: &str, op: CmpOp, arg: impl Into<Value>) -> Self {
        Self {
            column: column.to_string(),
            comparator: Comparator::Cmp(op, Arg::Value(arg.into())),
            universe: None,
        }
    }

    /// `column <op> other_column`, row by row.
    pub fn columns(column: &str, op: CmpOp, other: &str) -> Self {
        Self {
            column: column.to_string(),
            comparator: Comparator::Cmp(op, Arg::Column(other.to_string())),
            universe: None,
        }
    }

    /// Keeps rows where `predicate` holds.
    pub fn with_fn(column: &str, predicate: Predicate) -> Self {
        Self {
            column: column.to_string(),
            comparator: Comparator::Func(predicate),
            universe: None,
        }
    }

    /// Universe used to order labels when two enum columns with different
    /// universes are compared.
    pub fn with_universe<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.universe = Some(labels.into_iter().map(Into::into).collect());
        self
    }

    fn apply(&self, frame: &Frame, input: &[usize]) -> Result<Vec<usize>, FrameError> {
        let column = frame.column(&self.column)?;
        match &self.comparator {
            Comparator::Func(predicate) => self.apply_predicate(column, predicate, input),
            Comparator::Cmp(op, Arg::Value(v)) => self.compare_value(column, *op, v, input),
            Comparator::Cmp(op, Arg::Column(other)) => {
                let other = frame.column(other)?;
                self.compare_columns(column, other, *op, input)
            }
        }
    }

    fn apply_predicate(
        &self,
        column: &Column,
        predicate: &Predicate,
        input: &[usize],
    ) -> Result<Vec<usize>, FrameError> {
        match (column, predicate) {
            (Column::Bool(v), Predicate::Bool(f)) => Ok(keep(input, |p| f(v[p]))),
            (Column::Int(v), Predicate::Int(f)) => Ok(keep(input, |p| f(v[p]))),
            (Column::Float(v), Predicate::Float(f)) => Ok(keep(input, |p| f(v[p]))),
            (Column::Str(_) | Column::Enum { .. }, Predicate::Str(f)) => {
                Ok(keep(input, |p| f(column.str_at(p))))
            }
            (column, predicate) => Err(FrameError::TypeMismatch(format!(
                "{} predicate on {} column {:?}",
                predicate.type_name(),
                column.data_type(),
                self.column
            ))),
        }
    }

    fn compare_value(
        &self,
        column: &Column,
        op: CmpOp,
        arg: &Value,
        input: &[usize],
    ) -> Result<Vec<usize>, FrameError> {
        if arg.is_null() {
            return match op {
                CmpOp::Eq => Ok(keep(input, |p| column.is_null(p))),
                CmpOp::Ne => Ok(keep(input, |p| !column.is_null(p))),
                _ => Err(FrameError::BadData(format!(
                    "comparator {op:?} with null argument on column {:?}",
                    self.column
                ))),
            };
        }

        let mismatch = || {
            FrameError::TypeMismatch(format!(
                "cannot compare {} column {:?} with {arg:?}",
                column.data_type(),
                self.column
            ))
        };
        let check = |ord: Option<Ordering>| ord.map_or(op.matches_null(), |o| op.matches(o));

        match column {
            Column::Bool(v) => {
                let b = arg.as_bool().ok_or_else(mismatch)?;
                if !op.is_equality() {
                    return Err(FrameError::BadData(format!(
                        "comparator {op:?} not supported on bool column {:?}",
                        self.column
                    )));
                }
                Ok(keep(input, |p| check(v[p].map(|x| x.cmp(&b)))))
            }
            Column::Int(v) => match arg {
                Value::Int(i) => Ok(keep(input, |p| check(v[p].map(|x| x.cmp(i))))),
                Value::Float(f) => Ok(keep(input, |p| {
                    check(v[p].and_then(|x| (x as f64).partial_cmp(f)))
                })),
                _ => Err(mismatch()),
            },
            Column::Float(v) => {
                let f = arg.as_float().ok_or_else(mismatch)?;
                Ok(keep(input, |p| check(v[p].partial_cmp(&f))))
            }
            Column::Str(v) => {
                let s = arg.as_str().ok_or_else(mismatch)?;
                Ok(keep(input, |p| check(v[p].as_deref().map(|x| x.cmp(s)))))
            }
            Column::Enum { codes, universe } => {
                let label = arg.as_str().ok_or_else(mismatch)?;
                match universe.code_of(label) {
                    Some(code) => Ok(keep(input, |p| check(codes[p].map(|c| c.cmp(&code))))),
                    // An unknown label equals nothing but cannot be ordered
                    None if op == CmpOp::Eq => Ok(Vec::new()),
                    None if op == CmpOp::Ne => Ok(input.to_vec()),
                    None => Err(FrameError::BadData(format!(
                        "label {label:?} not in universe of enum column {:?}",
                        self.column
                    ))),
                }
            }
        }
    }

    fn compare_columns(
        &self,
        left: &Column,
        right: &Column,
        op: CmpOp,
        input: &[usize],
    ) -> Result<Vec<usize>, FrameError> {
        let check = |ord: Option<Ordering>| ord.map_or(op.matches_null(), |o| op.matches(o));

        match (left, right) {
            (Column::Bool(a), Column::Bool(b)) => {
                if !op.is_equality() {
                    return Err(FrameError::BadData(format!(
                        "comparator {op:?} not supported on bool column {:?}",
                        self.column
                    )));
                }
                Ok(keep(input, |p| check(a[p].zip(b[p]).map(|(x, y)| x.cmp(&y)))))
            }
            (Column::Int(a), Column::Int(b)) => {
                Ok(keep(input, |p| check(a[p].zip(b[p]).map(|(x, y)| x.cmp(&y)))))
            }
            (Column::Float(a), Column::Float(b)) => {
                Ok(keep(input, |p| check(a[p].partial_cmp(&b[p]))))
            }
            (Column::Str(a), Column::Str(b)) => Ok(keep(input, |p| {
                check(a[p].as_deref().zip(b[p].as_deref()).map(|(x, y)| x.cmp(y)))
            })),
            (
                Column::Enum {
                    codes: a,
                    universe: ua,
                },
                Column::Enum {
                    codes: b,
                    universe: ub,
                },
            ) => {
                let (map_a, map_b) = match &self.universe {
                    Some(labels) => {
                        let declared = EnumUniverse::new(labels.iter().cloned())?;
                        (recode(ua, &declared)?, recode(ub, &declared)?)
                    }
                    None if ua == ub => {
                        let identity: Vec<u32> = (0..ua.len() as u32).collect();
                        (identity.clone(), identity)
                    }
                    None => {
                        return Err(FrameError::TypeMismatch(format!(
                            "enum columns {:?} and compared column have different universes",
                            self.column
                        )))
                    }
                };
                Ok(keep(input, |p| {
                    let x = a[p].map(|c| map_a[c as usize]);
                    let y = b[p].map(|c| map_b[c as usize]);
                    check(x.zip(y).map(|(x, y)| x.cmp(&y)))
                }))
            }
            _ => Err(FrameError::TypeMismatch(format!(
                "cannot compare {} column {:?} with {} column",
                left.data_type(),
                self.column,
                right.data_type()
            ))),
        }
    }
}

/// Maps every code of `from` to the code of the same label in `to`.
fn recode(from: &EnumUniverse, to: &EnumUniverse) -> Result<Vec<u32>, FrameError> {
    from.labels()
        .iter()
        .map(|label| {
            to.code_of(label).ok_or_else(|| {
                FrameError::BadData(format!("label {label:?} missing from supplied universe"))
            })
        })
        .collect()
}

/// Positions of `input` satisfying `pred`, in input order.
fn keep<F>(input: &[usize], pred: F) -> Vec<usize>
where
    F: Fn(usize) -> bool + Sync,
{
    if input.len() >= PARALLEL_MIN_ROWS {
        input.par_iter().copied().filter(|&p| pred(p)).collect()
    } else {
        input.iter().copied().filter(|&p| pred(p)).collect()
    }
}

/// Filter clause tree.
#[derive(Debug, Clone)]
pub enum Clause {
    Filter(Filter),
    /// Each clause narrows the result of the previous one.
    And(Vec<Clause>),
    /// Rows matching any clause, in index order, without duplicates.
    Or(Vec<Clause>),
    /// Rows not matching the clause.
    Not(Box<Clause>),
}

impl Clause {
    pub fn and(clauses: impl IntoIterator<Item = impl Into<Clause>>) -> Self {
        Clause::And(clauses.into_iter().map(Into::into).collect())
    }

    pub fn or(clauses: impl IntoIterator<Item = impl Into<Clause>>) -> Self {
        Clause::Or(clauses.into_iter().map(Into::into).collect())
    }

    pub fn not(clause: impl Into<Clause>) -> Self {
        Clause::Not(Box::new(clause.into()))
    }

    fn apply(&self, frame: &Frame, input: &[usize]) -> Result<Vec<usize>, FrameError> {
        match self {
            Clause::Filter(f) => f.apply(frame, input),
            Clause::And(clauses) => {
                let mut current = input.to_vec();
                for clause in clauses {
                    current = clause.apply(frame, &current)?;
                }
                Ok(current)
            }
            Clause::Or(clauses) => {
                let mut hit = vec![false; frame.storage_len];
                for clause in clauses {
                    for p in clause.apply(frame, input)? {
                        hit[p] = true;
                    }
                }
                Ok(input.iter().copied().filter(|&p| hit[p]).collect())
            }
            Clause::Not(clause) => {
                let mut hit = vec![false; frame.storage_len];
                for p in clause.apply(frame, input)? {
                    hit[p] = true;
                }
                Ok(input.iter().copied().filter(|&p| !hit[p]).collect())
            }
        }
    }
}

impl From<Filter> for Clause {
    fn from(f: Filter) -> Self {
        Clause::Filter(f)
    }
}

impl Frame {
    /// Keeps the rows matching `clause`, in their current order.
    ///
    /// Only a new index is built; column storage is shared with `self`.
    ///
    /// # Errors
    /// Attached to the returned frame:
    /// - [`FrameError::MissingColumn`] for an unknown column
    /// - [`FrameError::TypeMismatch`] when the argument or predicate type does
    ///   not match the column
    /// - [`FrameError::BadData`] for a comparator the column type does not
    ///   support or an ordering comparison against null
    ///
    /// # Example
    /// ```rust
    /// use columnar_frame::{CmpOp, ColumnData, Filter, Frame};
    ///
    /// let frame = Frame::new(vec![("COL1", ColumnData::from(vec![1i64, 2, 3]))]);
    /// let filtered = frame.filter(Filter::new("COL1", CmpOp::Gt, 1));
    /// assert_eq!(filtered.len(), 2);
    /// ```
    pub fn filter(&self, clause: impl Into<Clause>) -> Frame {
        if self.err.is_some() {
            return self.clone();
        }
        let clause = clause.into();
        match clause.apply(self, self.index.positions()) {
            Ok(positions) => {
                debug!(
                    rows_in = self.len(),
                    rows_out = positions.len(),
                    "Filter applied"
                );
                self.with_index(Index::from_positions(positions))
            }
            Err(e) => Frame::from_error("filter", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::column::ColumnData;
    use crate::processor::frame::NewConfig;
    use rstest::rstest;

    fn sample() -> Frame {
        Frame::new(vec![
            ("COL1", ColumnData::from(vec![1i64, 2, 3])),
            ("COL2", ColumnData::from(vec!["a", "b", "c"])),
        ])
    }

    fn ints(frame: &Frame, col: &str) -> Vec<Option<i64>> {
        frame.int_view(col).unwrap().to_vec()
    }

    #[rstest]
    #[case("=", vec![Some(2)])]
    #[case("!=", vec![Some(1), Some(3)])]
    #[case(">", vec![Some(3)])]
    #[case(">=", vec![Some(2), Some(3)])]
    #[case("<", vec![Some(1)])]
    #[case("<=", vec![Some(1), Some(2)])]
    fn test_builtin_comparators(#[case] op: &str, #[case] expected: Vec<Option<i64>>) {
        let op: CmpOp = op.parse().unwrap();
        let filtered = sample().filter(Filter::new("COL1", op, 2));
        assert_eq!(ints(&filtered, "COL1"), expected);
    }

    #[test]
    fn test_unknown_comparator() {
        assert!(matches!("~".parse::<CmpOp>(), Err(FrameError::BadData(_))));
    }

    #[test]
    fn test_custom_predicate() {
        let is_odd = Predicate::int(|x| x.is_some_and(|x| x & 1 == 1));
        let filtered = sample().filter(Filter::with_fn("COL1", is_odd));
        assert_eq!(ints(&filtered, "COL1"), vec![Some(1), Some(3)]);
    }

    #[test]
    fn test_predicate_type_mismatch() {
        let filtered = sample().filter(Filter::with_fn("COL2", Predicate::int(|_| true)));
        assert!(matches!(filtered.err(), Some(FrameError::TypeMismatch(_))));

        let filtered = sample().filter(Filter::new("COL1", CmpOp::Eq, "a"));
        assert!(matches!(filtered.err(), Some(FrameError::TypeMismatch(_))));
    }

    #[test]
    fn test_unknown_column() {
        let filtered = sample().filter(Filter::new("NOPE", CmpOp::Eq, 1));
        assert_eq!(
            filtered.err(),
            Some(&FrameError::MissingColumn("NOPE".into()))
        );
    }

    #[test]
    fn test_or_keeps_index_order_without_duplicates() {
        let filtered = sample().filter(Clause::or([
            Filter::new("COL1", CmpOp::Gt, 2),
            Filter::new("COL2", CmpOp::Eq, "a"),
            Filter::new("COL1", CmpOp::Lt, 2),
        ]));
        assert_eq!(ints(&filtered, "COL1"), vec![Some(1), Some(3)]);
    }

    #[test]
    fn test_and_narrows() {
        let filtered = sample().filter(Clause::and([
            Filter::new("COL1", CmpOp::Gt, 1),
            Filter::new("COL2", CmpOp::Ne, "c"),
        ]));
        assert_eq!(ints(&filtered, "COL1"), vec![Some(2)]);
    }

    #[test]
    fn test_not() {
        let filtered = sample().filter(Clause::not(Filter::new("COL1", CmpOp::Eq, 2)));
        assert_eq!(ints(&filtered, "COL1"), vec![Some(1), Some(3)]);
    }

    #[test]
    fn test_null_handling() {
        let frame = Frame::new(vec![
            ("i", ColumnData::from(vec![Some(1i64), None, Some(3)])),
            ("f", ColumnData::from(vec![1.0, f64::NAN, 3.0])),
        ]);

        // nulls only satisfy !=
        assert_eq!(frame.filter(Filter::new("i", CmpOp::Gt, 0)).len(), 2);
        assert_eq!(frame.filter(Filter::new("i", CmpOp::Ne, 1)).len(), 2);
        assert_eq!(frame.filter(Filter::new("f", CmpOp::Lt, 10.0)).len(), 2);
        assert_eq!(frame.filter(Filter::new("f", CmpOp::Ne, 1.0)).len(), 2);

        // comparing against null selects by nullness
        let nulls = frame.filter(Filter::new("i", CmpOp::Eq, Value::Null));
        assert_eq!(ints(&nulls, "i"), vec![None]);
        assert_eq!(frame.filter(Filter::new("f", CmpOp::Ne, Value::Null)).len(), 2);

        let bad = frame.filter(Filter::new("i", CmpOp::Gt, Value::Null));
        assert!(matches!(bad.err(), Some(FrameError::BadData(_))));
    }

    #[test]
    fn test_bool_supports_equality_only() {
        let frame = Frame::new(vec![("b", ColumnData::from(vec![true, false, true]))]);
        assert_eq!(frame.filter(Filter::new("b", CmpOp::Eq, true)).len(), 2);
        let bad = frame.filter(Filter::new("b", CmpOp::Gt, false));
        assert!(matches!(bad.err(), Some(FrameError::BadData(_))));
    }

    #[test]
    fn test_int_literal_on_float_column() {
        let frame = Frame::new(vec![("f", ColumnData::from(vec![0.5, 1.5, 2.5]))]);
        assert_eq!(frame.filter(Filter::new("f", CmpOp::Ge, 1)).len(), 2);
    }

    #[test]
    fn test_enum_comparisons_follow_universe() {
        let frame = Frame::with_config(
            vec![("e", ColumnData::from(vec!["a", "b", "c"]))],
            NewConfig::new().enum_values("e", ["c", "b", "a"]),
        );
        let filtered = frame.filter(Filter::new("e", CmpOp::Lt, "b"));
        assert_eq!(filtered.enum_view("e").unwrap().to_vec(), vec![Some("c")]);

        assert_eq!(frame.filter(Filter::new("e", CmpOp::Eq, "zz")).len(), 0);
        assert_eq!(frame.filter(Filter::new("e", CmpOp::Ne, "zz")).len(), 3);
        let bad = frame.filter(Filter::new("e", CmpOp::Gt, "zz"));
        assert!(matches!(bad.err(), Some(FrameError::BadData(_))));

        let starts_with_b = Predicate::str(|s| s.is_some_and(|s| s.starts_with('b')));
        assert_eq!(frame.filter(Filter::with_fn("e", starts_with_b)).len(), 1);
    }

    #[test]
    fn test_column_to_column() {
        let frame = Frame::new(vec![
            ("a", ColumnData::from(vec![1i64, 5, 3])),
            ("b", ColumnData::from(vec![2i64, 4, 3])),
        ]);
        let filtered = frame.filter(Filter::columns("a", CmpOp::Gt, "b"));
        assert_eq!(ints(&filtered, "a"), vec![Some(5)]);

        let mixed = Frame::new(vec![
            ("a", ColumnData::from(vec![1i64])),
            ("b", ColumnData::from(vec!["x"])),
        ]);
        let bad = mixed.filter(Filter::columns("a", CmpOp::Eq, "b"));
        assert!(matches!(bad.err(), Some(FrameError::TypeMismatch(_))));
    }

    #[test]
    fn test_enum_columns_with_different_universes() {
        let frame = Frame::with_config(
            vec![
                ("x", ColumnData::from(vec!["lo", "hi"])),
                ("y", ColumnData::from(vec!["hi", "hi"])),
            ],
            NewConfig::new()
                .enum_values("x", ["lo", "hi"])
                .enum_values("y", ["hi", "lo"]),
        );

        let bad = frame.filter(Filter::columns("x", CmpOp::Lt, "y"));
        assert!(matches!(bad.err(), Some(FrameError::TypeMismatch(_))));

        let ok = frame.filter(Filter::columns("x", CmpOp::Lt, "y").with_universe(["lo", "hi"]));
        assert_eq!(ok.enum_view("x").unwrap().to_vec(), vec![Some("lo")]);

        let missing = frame.filter(Filter::columns("x", CmpOp::Lt, "y").with_universe(["lo"]));
        assert!(matches!(missing.err(), Some(FrameError::BadData(_))));
    }

    #[test]
    fn test_filter_is_idempotent() {
        let clause = Clause::or([
            Filter::new("COL1", CmpOp::Ge, 3),
            Filter::new("COL2", CmpOp::Eq, "a"),
        ]);
        let once = sample().filter(clause.clone());
        let twice = once.filter(clause);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_filter_shares_storage() {
        let frame = sample();
        let filtered = frame.filter(Filter::new("COL1", CmpOp::Gt, 1));
        assert!(filtered
            .column("COL1")
            .unwrap()
            .shares_storage(frame.column("COL1").unwrap()));
        assert_eq!(frame.len(), 3);
    }
}
