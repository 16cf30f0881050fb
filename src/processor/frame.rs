use std::collections::{HashMap, HashSet};
use std::fmt;

use tracing::{debug, warn};

use crate::processor::column::{Column, ColumnData, EnumUniverse};
use crate::processor::index::{BoolView, EnumView, FloatView, Index, IntView, StrView};
use crate::processor::{DataType, FrameError, Value};

/// Options for [`Frame::with_config`].
///
/// # Example
/// ```rust
/// use columnar_frame::{ColumnData, Frame, NewConfig};
///
/// let frame = Frame::with_config(
///     vec![
///         ("COL1", ColumnData::from(vec![1i64, 2])),
///         ("COL2", ColumnData::from(vec!["x", "y"])),
///     ],
///     NewConfig::new()
///         .column_order(["COL2", "COL1"])
///         .enum_values("COL2", ["y", "x"]),
/// );
/// assert_eq!(frame.column_names(), ["COL2", "COL1"]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct NewConfig {
    column_order: Option<Vec<String>>,
    enums: Vec<(String, Option<Vec<String>>)>,
}

impl NewConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Explicit column order; must name every column exactly once.
    pub fn column_order<I, S>(mut self, order: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.column_order = Some(order.into_iter().map(Into::into).collect());
        self
    }

    /// Declares `column` an enum whose universe is `labels`, in ordinal order.
    pub fn enum_values<I, S>(mut self, column: &str, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enums.push((
            column.to_string(),
            Some(labels.into_iter().map(Into::into).collect()),
        ));
        self
    }

    /// Declares `column` an enum with the universe taken from its values.
    pub fn enum_column(mut self, column: &str) -> Self {
        self.enums.push((column.to_string(), None));
        self
    }
}

/// Immutable table: named columns sharing one row index.
///
/// Every operation returns a new frame and leaves `self` untouched; column
/// storage is shared between frames wherever no new data is computed. An
/// operation that fails returns a frame carrying the error, and any operation
/// on such a frame passes the error along without doing work.
#[derive(Debug, Clone)]
pub struct Frame {
    pub(crate) columns: Vec<(String, Column)>,
    pub(crate) index: Index,
    /// Backing length shared by every column.
    pub(crate) storage_len: usize,
    pub(crate) err: Option<FrameError>,
}

impl Frame {
    /// Builds a frame with columns ordered by name.
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = (S, ColumnData)>,
        S: Into<String>,
    {
        Self::with_config(columns, NewConfig::default())
    }

    /// Builds a frame from raw column data and construction options.
    ///
    /// # Errors
    /// Attached to the returned frame:
    /// - [`FrameError::Configuration`] for duplicate names, an inconsistent
    ///   column order, enum declarations on unknown or non-string columns or
    ///   repeated for one column, or columns of differing length
    /// - [`FrameError::BadData`] for a value outside its declared enum universe
    pub fn with_config<I, S>(columns: I, config: NewConfig) -> Self
    where
        I: IntoIterator<Item = (S, ColumnData)>,
        S: Into<String>,
    {
        match Self::build(columns, config) {
            Ok(frame) => {
                debug!(
                    columns = frame.columns.len(),
                    rows = frame.len(),
                    "Frame constructed"
                );
                frame
            }
            Err(e) => Self::from_error("new", e),
        }
    }

    fn build<I, S>(columns: I, config: NewConfig) -> Result<Self, FrameError>
    where
        I: IntoIterator<Item = (S, ColumnData)>,
        S: Into<String>,
    {
        let mut data: HashMap<String, ColumnData> = HashMap::new();
        for (name, values) in columns {
            let name = name.into();
            if data.contains_key(&name) {
                return Err(FrameError::Configuration(format!(
                    "duplicate column name {name:?}"
                )));
            }
            data.insert(name, values);
        }

        let order = match config.column_order {
            Some(order) => {
                let mut seen = HashSet::new();
                for name in &order {
                    if !data.contains_key(name) {
                        return Err(FrameError::Configuration(format!(
                            "column order names unknown column {name:?}"
                        )));
                    }
                    if !seen.insert(name.as_str()) {
                        return Err(FrameError::Configuration(format!(
                            "column order names {name:?} twice"
                        )));
                    }
                }
                if order.len() != data.len() {
                    return Err(FrameError::Configuration(format!(
                        "column order lists {} of {} columns",
                        order.len(),
                        data.len()
                    )));
                }
                order
            }
            None => {
                let mut names: Vec<String> = data.keys().cloned().collect();
                names.sort();
                names
            }
        };

        let storage_len = order.first().map_or(0, |n| data[n].len());
        if let Some(bad) = order.iter().find(|n| data[*n].len() != storage_len) {
            return Err(FrameError::Configuration(format!(
                "column {bad:?} has length {}, expected {storage_len}",
                data[bad].len()
            )));
        }

        let mut enums: HashMap<String, Option<Vec<String>>> = HashMap::new();
        for (name, labels) in config.enums {
            if enums.contains_key(&name) {
                return Err(FrameError::Configuration(format!(
                    "enum declared twice for column {name:?}"
                )));
            }
            match data.get(&name) {
                None => {
                    return Err(FrameError::Configuration(format!(
                        "enum declared for unknown column {name:?}"
                    )))
                }
                Some(ColumnData::Str(_)) => {
                    enums.insert(name, labels);
                }
                Some(other) => {
                    return Err(FrameError::Configuration(format!(
                        "enum declared for {} column {name:?}",
                        other.data_type()
                    )))
                }
            }
        }

        let mut built = Vec::with_capacity(order.len());
        for name in order {
            let Some(values) = data.remove(&name) else {
                unreachable!("ordered column {name:?} missing from input, this is an implementation bug")
            };
            let column = match (enums.remove(&name), values) {
                (Some(labels), ColumnData::Str(values)) => {
                    let universe = labels.map(EnumUniverse::new).transpose()?;
                    Column::new_enum(&values, universe)?
                }
                (_, values) => Column::from(values),
            };
            built.push((name, column));
        }

        Ok(Self {
            columns: built,
            index: Index::range(storage_len),
            storage_len,
            err: None,
        })
    }

    /// Frame carrying `err` and no data.
    pub(crate) fn from_error(op: &str, err: FrameError) -> Self {
        warn!(op, error = %err, "Frame operation failed");
        Self {
            columns: Vec::new(),
            index: Index::range(0),
            storage_len: 0,
            err: Some(err),
        }
    }

    /// Same columns viewed through a different index.
    pub(crate) fn with_index(&self, index: Index) -> Self {
        Self {
            columns: self.columns.clone(),
            index,
            storage_len: self.storage_len,
            err: None,
        }
    }

    /// Adds `column`, or replaces the column of the same name in place.
    pub(crate) fn with_column(&self, name: &str, column: Column) -> Self {
        let mut columns = self.columns.clone();
        match columns.iter_mut().find(|(n, _)| n == name) {
            Some(slot) => slot.1 = column,
            None => columns.push((name.to_string(), column)),
        }
        Self {
            columns,
            index: self.index.clone(),
            storage_len: self.storage_len,
            err: None,
        }
    }

    /// Error attached by the operation that produced this frame, if any.
    pub fn err(&self) -> Option<&FrameError> {
        self.err.as_ref()
    }

    /// Converts an errored frame into `Err`.
    pub fn check(self) -> Result<Self, FrameError> {
        match self.err {
            Some(e) => Err(e),
            None => Ok(self),
        }
    }

    /// Number of logical rows.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn index(&self) -> &Index {
        &self.index
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn column_types(&self) -> Vec<DataType> {
        self.columns.iter().map(|(_, c)| c.data_type()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.columns.iter().any(|(n, _)| n == name)
    }

    pub fn column(&self, name: &str) -> Result<&Column, FrameError> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, c)| c)
            .ok_or_else(|| FrameError::MissingColumn(name.to_string()))
    }

    pub fn column_type(&self, name: &str) -> Result<DataType, FrameError> {
        self.column(name).map(Column::data_type)
    }

    pub fn bool_view(&self, name: &str) -> Result<BoolView<'_>, FrameError> {
        self.column(name)?.bool_view(self.index.positions())
    }

    pub fn int_view(&self, name: &str) -> Result<IntView<'_>, FrameError> {
        self.column(name)?.int_view(self.index.positions())
    }

    pub fn float_view(&self, name: &str) -> Result<FloatView<'_>, FrameError> {
        self.column(name)?.float_view(self.index.positions())
    }

    pub fn str_view(&self, name: &str) -> Result<StrView<'_>, FrameError> {
        self.column(name)?.str_view(self.index.positions())
    }

    pub fn enum_view(&self, name: &str) -> Result<EnumView<'_>, FrameError> {
        self.column(name)?.enum_view(self.index.positions())
    }

    /// Element of column `name` at logical row `row`.
    pub fn value_at(&self, name: &str, row: usize) -> Result<Value, FrameError> {
        let column = self.column(name)?;
        let pos = self.row_position(row)?;
        Ok(column.value_at(pos))
    }

    /// All elements of logical row `row`, in column order.
    pub fn row(&self, row: usize) -> Result<Vec<Value>, FrameError> {
        let pos = self.row_position(row)?;
        Ok(self.columns.iter().map(|(_, c)| c.value_at(pos)).collect())
    }

    fn row_position(&self, row: usize) -> Result<usize, FrameError> {
        self.index.get(row).ok_or_else(|| {
            FrameError::BadData(format!("row {row} out of range for {} rows", self.len()))
        })
    }

    /// Keeps only the named columns, in the given order.
    pub fn select<I, S>(&self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if self.err.is_some() {
            return self.clone();
        }
        let mut seen = HashSet::new();
        let mut columns = Vec::new();
        for name in names {
            let name = name.as_ref();
            if !seen.insert(name.to_string()) {
                return Self::from_error(
                    "select",
                    FrameError::Configuration(format!("column {name:?} selected twice")),
                );
            }
            match self.column(name) {
                Ok(c) => columns.push((name.to_string(), c.clone())),
                Err(e) => return Self::from_error("select", e),
            }
        }
        Self {
            columns,
            index: self.index.clone(),
            storage_len: self.storage_len,
            err: None,
        }
    }

    /// Removes the named columns.
    pub fn drop<I, S>(&self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if self.err.is_some() {
            return self.clone();
        }
        let mut dropped = HashSet::new();
        for name in names {
            let name = name.as_ref();
            if !self.contains(name) {
                return Self::from_error("drop", FrameError::MissingColumn(name.to_string()));
            }
            dropped.insert(name.to_string());
        }
        let mut frame = self.with_index(self.index.clone());
        frame.columns.retain(|(n, _)| !dropped.contains(n));
        frame
    }

    /// Adds (or replaces) column `dst` sharing the storage of `src`.
    pub fn copy(&self, dst: &str, src: &str) -> Self {
        if self.err.is_some() {
            return self.clone();
        }
        match self.column(src) {
            Ok(c) => self.with_column(dst, c.clone()),
            Err(e) => Self::from_error("copy", e),
        }
    }

    /// Logical rows `start..end`.
    pub fn slice(&self, start: usize, end: usize) -> Self {
        if self.err.is_some() {
            return self.clone();
        }
        if start > end || end > self.len() {
            return Self::from_error(
                "slice",
                FrameError::BadData(format!(
                    "slice {start}..{end} out of range for {} rows",
                    self.len()
                )),
            );
        }
        let positions = self.index.positions()[start..end].to_vec();
        self.with_index(Index::from_positions(positions))
    }
}

impl PartialEq for Frame {
    /// Frames are equal when names, types and every logical value match.
    fn eq(&self, other: &Self) -> bool {
        if self.err.is_some() || other.err.is_some() {
            return self.err == other.err;
        }
        if self.len() != other.len() || self.columns.len() != other.columns.len() {
            return false;
        }
        self.columns
            .iter()
            .zip(&other.columns)
            .all(|((n1, c1), (n2, c2))| {
                n1 == n2
                    && c1.data_type() == c2.data_type()
                    && self
                        .index
                        .iter()
                        .zip(other.index.iter())
                        .all(|(p1, p2)| c1.value_at(p1) == c2.value_at(p2))
            })
    }
}

impl fmt::Display for Frame {
    /// Fixed-width table: right aligned cells, a dash separator per column,
    /// then `Dims = <columns> x <rows>`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(err) = &self.err {
            return write!(f, "Error: {err}");
        }

        let headers: Vec<String> = self
            .columns
            .iter()
            .map(|(n, c)| format!("{n}({})", c.data_type().code()))
            .collect();
        let cells: Vec<Vec<String>> = self
            .columns
            .iter()
            .map(|(_, c)| self.index.iter().map(|p| c.render(p)).collect())
            .collect();
        let widths: Vec<usize> = headers
            .iter()
            .zip(&cells)
            .map(|(h, col)| {
                col.iter()
                    .map(|s| s.chars().count())
                    .chain(std::iter::once(h.chars().count()))
                    .max()
                    .unwrap_or_default()
            })
            .collect();

        let line = |parts: Vec<String>| parts.join(" ");

        writeln!(
            f,
            "{}",
            line(
                headers
                    .iter()
                    .zip(&widths)
                    .map(|(h, &w)| format!("{h:>w$}"))
                    .collect()
            )
        )?;
        writeln!(f, "{}", line(widths.iter().map(|w| "-".repeat(*w)).collect()))?;
        for row in 0..self.len() {
            writeln!(
                f,
                "{}",
                line(
                    cells
                        .iter()
                        .zip(&widths)
                        .map(|(col, &w)| format!("{:>w$}", col[row]))
                        .collect()
                )
            )?;
        }
        writeln!(f)?;
        write!(f, "Dims = {} x {}", self.columns.len(), self.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Frame {
        Frame::new(vec![
            ("COL1", ColumnData::from(vec![1i64, 2, 3])),
            ("COL2", ColumnData::from(vec!["a", "b", "c"])),
        ])
    }

    #[test]
    fn test_render_layout() {
        let expected = "COL1(i) COL2(s)\n\
                        ------- -------\n      \
                        1       a\n      \
                        2       b\n      \
                        3       c\n\
                        \n\
                        Dims = 2 x 3";
        assert_eq!(sample().to_string(), expected);
    }

    #[test]
    fn test_render_nulls_and_column_order() {
        let frame = Frame::with_config(
            vec![
                ("COL1", ColumnData::from(vec![1i64, 2, 3])),
                ("COL2", ColumnData::from(vec![1.5, 2.5, f64::NAN])),
                ("COL4", ColumnData::from(vec![Some("a"), None, Some("c")])),
                ("COL5", ColumnData::from(vec![false, false, true])),
            ],
            NewConfig::new().column_order(["COL5", "COL4", "COL2", "COL1"]),
        );
        let expected = [
            "COL5(b) COL4(s) COL2(f) COL1(i)",
            "------- ------- ------- -------",
            "  false       a     1.5       1",
            "  false    null     2.5       2",
            "   true       c    null       3",
            "",
            "Dims = 4 x 3",
        ]
        .join("\n");
        assert_eq!(frame.to_string(), expected);
    }

    #[test]
    fn test_render_widens_to_longest_value() {
        let frame = Frame::new(vec![("A", ColumnData::from(vec!["longer value", "x"]))]);
        let text = frame.to_string();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("        A(s)"));
        assert_eq!(lines.next(), Some("------------"));
        assert_eq!(lines.next(), Some("longer value"));
        assert_eq!(lines.next(), Some("           x"));
    }

    #[test]
    fn test_default_order_is_by_name() {
        let frame = Frame::new(vec![
            ("b", ColumnData::from(vec![1i64])),
            ("a", ColumnData::from(vec![2i64])),
        ]);
        assert_eq!(frame.column_names(), ["a", "b"]);
    }

    #[test]
    fn test_construction_errors() {
        let uneven = Frame::new(vec![
            ("a", ColumnData::from(vec![1i64, 2])),
            ("b", ColumnData::from(vec![1i64])),
        ]);
        assert!(matches!(uneven.err(), Some(FrameError::Configuration(_))));

        let bad_order = Frame::with_config(
            vec![("a", ColumnData::from(vec![1i64]))],
            NewConfig::new().column_order(["a", "z"]),
        );
        assert!(matches!(bad_order.err(), Some(FrameError::Configuration(_))));

        let enum_on_int = Frame::with_config(
            vec![("a", ColumnData::from(vec![1i64]))],
            NewConfig::new().enum_column("a"),
        );
        assert!(matches!(enum_on_int.err(), Some(FrameError::Configuration(_))));

        let outside_universe = Frame::with_config(
            vec![("a", ColumnData::from(vec!["x"]))],
            NewConfig::new().enum_values("a", ["y"]),
        );
        assert!(matches!(outside_universe.err(), Some(FrameError::BadData(_))));

        let declared_twice = Frame::with_config(
            vec![("a", ColumnData::from(vec!["x"]))],
            NewConfig::new().enum_values("a", ["x"]).enum_column("a"),
        );
        assert!(matches!(declared_twice.err(), Some(FrameError::Configuration(_))));
    }

    #[test]
    fn test_views_and_errors() {
        let frame = sample();
        assert_eq!(
            frame.int_view("COL1").unwrap().to_vec(),
            vec![Some(1), Some(2), Some(3)]
        );
        assert!(matches!(
            frame.int_view("COL2"),
            Err(FrameError::TypeMismatch(_))
        ));
        assert!(matches!(
            frame.int_view("NOPE"),
            Err(FrameError::MissingColumn(_))
        ));
    }

    #[test]
    fn test_select_drop_copy_share_storage() {
        let frame = sample();
        let selected = frame.select(["COL2"]);
        assert_eq!(selected.column_names(), ["COL2"]);
        assert!(selected
            .column("COL2")
            .unwrap()
            .shares_storage(frame.column("COL2").unwrap()));

        let dropped = frame.drop(["COL1"]);
        assert_eq!(dropped.column_names(), ["COL2"]);

        let copied = frame.copy("COL3", "COL1");
        assert_eq!(copied.column_names(), ["COL1", "COL2", "COL3"]);
        assert_eq!(copied.value_at("COL3", 2).unwrap(), Value::Int(3));

        assert!(matches!(
            frame.select(["COL9"]).err(),
            Some(FrameError::MissingColumn(_))
        ));
    }

    #[test]
    fn test_slice_and_row_access() {
        let frame = sample().slice(1, 3);
        assert_eq!(frame.len(), 2);
        assert_eq!(
            frame.row(0).unwrap(),
            vec![Value::Int(2), Value::Str("b".into())]
        );
        assert!(matches!(frame.row(2), Err(FrameError::BadData(_))));
        assert!(sample().slice(2, 5).err().is_some());
    }

    #[test]
    fn test_errored_frame_propagates() {
        let failed = sample().select(["missing"]);
        let chained = failed.slice(0, 1).copy("x", "COL1");
        assert_eq!(chained.err(), failed.err());
        assert!(chained.to_string().starts_with("Error: "));
        assert!(chained.check().is_err());
    }
}
