use std::sync::Arc;

use crate::processor::column::{Column, EnumUniverse};
use crate::processor::FrameError;

/// Ordered row positions into column storage.
///
/// An index is the only thing filtering, sorting and slicing produce; the
/// column storage it points into is never copied or touched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Index {
    positions: Arc<[usize]>,
}

impl Index {
    /// Identity index `0..len`.
    pub fn range(len: usize) -> Self {
        Self {
            positions: (0..len).collect(),
        }
    }

    /// Builds an index, checking every position against `storage_len`.
    ///
    /// # Errors
    /// [`FrameError::BadData`] if a position is out of range.
    pub fn new(positions: Vec<usize>, storage_len: usize) -> Result<Self, FrameError> {
        if let Some(bad) = positions.iter().find(|&&p| p >= storage_len) {
            return Err(FrameError::BadData(format!(
                "index position {bad} out of range for length {storage_len}"
            )));
        }
        Ok(Self::from_positions(positions))
    }

    /// Positions already known to be in range.
    pub(crate) fn from_positions(positions: Vec<usize>) -> Self {
        Self {
            positions: positions.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn positions(&self) -> &[usize] {
        &self.positions
    }

    /// Storage position of logical row `row`.
    pub fn get(&self, row: usize) -> Option<usize> {
        self.positions.get(row).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.positions.iter().copied()
    }
}

/// Read-only view of copyable elements through an index.
///
/// The view length is the index length, not the column length.
#[derive(Debug, Clone, Copy)]
pub struct View<'a, T: Copy> {
    data: &'a [T],
    positions: &'a [usize],
}

/// Nullable booleans.
pub type BoolView<'a> = View<'a, Option<bool>>;
/// Nullable integers.
pub type IntView<'a> = View<'a, Option<i64>>;
/// Floats, NaN is null.
pub type FloatView<'a> = View<'a, f64>;

impl<'a, T: Copy> View<'a, T> {
    pub(crate) fn new(data: &'a [T], positions: &'a [usize]) -> Self {
        Self { data, positions }
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Element at logical row `i`.
    ///
    /// # Panics
    /// If `i >= self.len()`.
    pub fn item_at(&self, i: usize) -> T {
        self.data[self.positions[i]]
    }

    pub fn iter(&self) -> impl Iterator<Item = T> + 'a {
        let (data, positions) = (self.data, self.positions);
        positions.iter().map(move |&p| data[p])
    }

    /// Copies the viewed elements out in row order.
    pub fn to_vec(&self) -> Vec<T> {
        self.iter().collect()
    }
}

#[derive(Debug, Clone, Copy)]
enum StrSource<'a> {
    Plain(&'a [Option<String>]),
    Labels {
        codes: &'a [Option<u32>],
        universe: &'a EnumUniverse,
    },
}

/// Read-only view of string elements; enum columns read as their labels.
#[derive(Debug, Clone, Copy)]
pub struct StrView<'a> {
    source: StrSource<'a>,
    positions: &'a [usize],
}

impl<'a> StrView<'a> {
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn item_at(&self, i: usize) -> Option<&'a str> {
        let p = self.positions[i];
        match self.source {
            StrSource::Plain(data) => data[p].as_deref(),
            StrSource::Labels { codes, universe } => codes[p].map(|c| universe.label(c)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = Option<&'a str>> + 'a {
        let view = *self;
        (0..view.len()).map(move |i| view.item_at(i))
    }

    pub fn to_vec(&self) -> Vec<Option<&'a str>> {
        self.iter().collect()
    }
}

/// Enum view: labels plus access to ordinal codes and the universe.
#[derive(Debug, Clone, Copy)]
pub struct EnumView<'a> {
    codes: View<'a, Option<u32>>,
    universe: &'a EnumUniverse,
}

impl<'a> EnumView<'a> {
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    pub fn item_at(&self, i: usize) -> Option<&'a str> {
        let universe = self.universe;
        self.codes.item_at(i).map(|c| universe.label(c))
    }

    pub fn code_at(&self, i: usize) -> Option<u32> {
        self.codes.item_at(i)
    }

    pub fn universe(&self) -> &'a EnumUniverse {
        self.universe
    }

    pub fn to_vec(&self) -> Vec<Option<&'a str>> {
        (0..self.len()).map(|i| self.item_at(i)).collect()
    }
}

fn wrong_type(column: &Column, wanted: &str) -> FrameError {
    FrameError::TypeMismatch(format!(
        "{wanted} view requested on {} column",
        column.data_type()
    ))
}

impl Column {
    pub fn bool_view<'a>(&'a self, positions: &'a [usize]) -> Result<BoolView<'a>, FrameError> {
        match self {
            Column::Bool(v) => Ok(View::new(&v[..], positions)),
            other => Err(wrong_type(other, "bool")),
        }
    }

    pub fn int_view<'a>(&'a self, positions: &'a [usize]) -> Result<IntView<'a>, FrameError> {
        match self {
            Column::Int(v) => Ok(View::new(&v[..], positions)),
            other => Err(wrong_type(other, "int")),
        }
    }

    pub fn float_view<'a>(&'a self, positions: &'a [usize]) -> Result<FloatView<'a>, FrameError> {
        match self {
            Column::Float(v) => Ok(View::new(&v[..], positions)),
            other => Err(wrong_type(other, "float")),
        }
    }

    /// String view; `allow_enum` lets enum columns read as labels.
    pub(crate) fn str_view_inner<'a>(
        &'a self,
        positions: &'a [usize],
        allow_enum: bool,
    ) -> Result<StrView<'a>, FrameError> {
        let source = match self {
            Column::Str(v) => StrSource::Plain(&v[..]),
            Column::Enum { codes, universe } if allow_enum => StrSource::Labels {
                codes: &codes[..],
                universe: &**universe,
            },
            other => return Err(wrong_type(other, "string")),
        };
        Ok(StrView { source, positions })
    }

    pub fn str_view<'a>(&'a self, positions: &'a [usize]) -> Result<StrView<'a>, FrameError> {
        self.str_view_inner(positions, false)
    }

    pub fn enum_view<'a>(&'a self, positions: &'a [usize]) -> Result<EnumView<'a>, FrameError> {
        match self {
            Column::Enum { codes, universe } => Ok(EnumView {
                codes: View::new(&codes[..], positions),
                universe: &**universe,
            }),
            other => Err(wrong_type(other, "enum")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::column::ColumnData;

    #[test]
    fn test_index_rejects_out_of_range() {
        assert!(Index::new(vec![0, 2], 3).is_ok());
        let err = Index::new(vec![0, 3], 3).unwrap_err();
        assert!(matches!(err, FrameError::BadData(_)));
    }

    #[test]
    fn test_view_follows_index_order() {
        let col = Column::from(ColumnData::from(vec![10i64, 20, 30, 40]));
        let index = Index::from_positions(vec![3, 1]);
        let view = col.int_view(index.positions()).unwrap();
        assert_eq!(view.len(), 2);
        assert_eq!(view.to_vec(), vec![Some(40), Some(20)]);
        assert_eq!(view.iter().flatten().sum::<i64>(), 60);
    }

    #[test]
    fn test_view_type_mismatch() {
        let col = Column::from(ColumnData::from(vec![1.5]));
        let index = Index::range(1);
        assert!(matches!(
            col.int_view(index.positions()),
            Err(FrameError::TypeMismatch(_))
        ));
        assert!(col.float_view(index.positions()).is_ok());
    }

    #[test]
    fn test_str_view_over_enum_labels() {
        let values: Vec<Option<String>> = vec![Some("b".into()), None, Some("a".into())];
        let col = Column::new_enum(&values, None).unwrap();
        let index = Index::range(3);

        assert!(col.str_view(index.positions()).is_err());
        let labels = col.str_view_inner(index.positions(), true).unwrap();
        assert_eq!(labels.to_vec(), vec![Some("b"), None, Some("a")]);

        let view = col.enum_view(index.positions()).unwrap();
        assert_eq!(view.code_at(0), Some(1));
        assert_eq!(view.item_at(2), Some("a"));
    }
}
