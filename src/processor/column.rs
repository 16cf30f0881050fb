use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::helpers::murmur::Murmur32;
use crate::processor::{DataType, FrameError, Value};

const NULL_TAG: u8 = 0;
const VALUE_TAG: u8 = 1;

/// Ordered label set backing an enum column.
///
/// A label's ordinal code is its position in the universe, so sorting by code
/// sorts by the declared label order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumUniverse {
    labels: Vec<String>,
    codes: HashMap<String, u32>,
}

impl EnumUniverse {
    /// Builds a universe from labels in ordinal order.
    ///
    /// # Errors
    /// [`FrameError::Configuration`] on duplicate labels.
    pub fn new<I, S>(labels: I) -> Result<Self, FrameError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let labels: Vec<String> = labels.into_iter().map(Into::into).collect();
        let mut codes = HashMap::with_capacity(labels.len());
        for (code, label) in labels.iter().enumerate() {
            let code = u32::try_from(code).map_err(|_| {
                FrameError::Configuration("enum universe exceeds u32 codes".into())
            })?;
            if codes.insert(label.clone(), code).is_some() {
                return Err(FrameError::Configuration(format!(
                    "duplicate enum label {label:?}"
                )));
            }
        }
        Ok(Self { labels, codes })
    }

    /// Universe made of the distinct labels in `values`, in ascending order.
    pub fn from_values<'a>(values: impl IntoIterator<Item = &'a str>) -> Self {
        let distinct: BTreeSet<&str> = values.into_iter().collect();
        let labels: Vec<String> = distinct.into_iter().map(str::to_string).collect();
        let codes = labels
            .iter()
            .enumerate()
            .map(|(code, l)| (l.clone(), code as u32))
            .collect();
        Self { labels, codes }
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn code_of(&self, label: &str) -> Option<u32> {
        self.codes.get(label).copied()
    }

    pub fn label(&self, code: u32) -> &str {
        &self.labels[code as usize]
    }
}

/// Raw typed data handed to frame construction.
///
/// Float nulls are NaN; every other type marks nulls with `None`.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Bool(Vec<Option<bool>>),
    Int(Vec<Option<i64>>),
    Float(Vec<f64>),
    Str(Vec<Option<String>>),
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Bool(v) => v.len(),
            ColumnData::Int(v) => v.len(),
            ColumnData::Float(v) => v.len(),
            ColumnData::Str(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn data_type(&self) -> DataType {
        match self {
            ColumnData::Bool(_) => DataType::Bool,
            ColumnData::Int(_) => DataType::Int,
            ColumnData::Float(_) => DataType::Float,
            ColumnData::Str(_) => DataType::Str,
        }
    }

    /// Collects values of the declared type; `Null` is accepted anywhere.
    pub(crate) fn from_values(dtype: DataType, values: Vec<Value>) -> Result<Self, FrameError> {
        fn mismatch(dtype: DataType, v: &Value) -> FrameError {
            FrameError::TypeMismatch(format!("expected {dtype} value, got {v:?}"))
        }

        match dtype {
            DataType::Bool => values
                .into_iter()
                .map(|v| match v {
                    v if v.is_null() => Ok(None),
                    Value::Bool(b) => Ok(Some(b)),
                    other => Err(mismatch(dtype, &other)),
                })
                .collect::<Result<_, _>>()
                .map(ColumnData::Bool),
            DataType::Int => values
                .into_iter()
                .map(|v| match v {
                    v if v.is_null() => Ok(None),
                    Value::Int(i) => Ok(Some(i)),
                    other => Err(mismatch(dtype, &other)),
                })
                .collect::<Result<_, _>>()
                .map(ColumnData::Int),
            DataType::Float => values
                .into_iter()
                .map(|v| match v {
                    v if v.is_null() => Ok(f64::NAN),
                    Value::Float(f) => Ok(f),
                    other => Err(mismatch(dtype, &other)),
                })
                .collect::<Result<_, _>>()
                .map(ColumnData::Float),
            DataType::Str => values
                .into_iter()
                .map(|v| match v {
                    v if v.is_null() => Ok(None),
                    Value::Str(s) => Ok(Some(s)),
                    other => Err(mismatch(dtype, &other)),
                })
                .collect::<Result<_, _>>()
                .map(ColumnData::Str),
            DataType::Enum => Err(FrameError::TypeMismatch(
                "enum columns can only be declared at construction".into(),
            )),
        }
    }
}

macro_rules! column_data_from {
    ($variant:ident, $t:ty, |$x:ident| $conv:expr) => {
        impl From<Vec<$t>> for ColumnData {
            fn from(values: Vec<$t>) -> Self {
                ColumnData::$variant(values.into_iter().map(|$x| $conv).collect())
            }
        }
    };
}

column_data_from!(Bool, bool, |x| Some(x));
column_data_from!(Bool, Option<bool>, |x| x);
column_data_from!(Int, i64, |x| Some(x));
column_data_from!(Int, Option<i64>, |x| x);
column_data_from!(Int, i32, |x| Some(i64::from(x)));
column_data_from!(Int, Option<i32>, |x| x.map(i64::from));
column_data_from!(Float, f64, |x| x);
column_data_from!(Float, Option<f64>, |x| x.unwrap_or(f64::NAN));
column_data_from!(Str, String, |x| Some(x));
column_data_from!(Str, Option<String>, |x| x);
column_data_from!(Str, &str, |x| Some(x.to_string()));
column_data_from!(Str, Option<&str>, |x| x.map(str::to_string));

/// Immutable typed column storage.
///
/// Cloning a column clones `Arc`s only; the element storage is shared by every
/// frame that references it and is never written after construction.
#[derive(Debug, Clone)]
pub enum Column {
    Bool(Arc<[Option<bool>]>),
    Int(Arc<[Option<i64>]>),
    Float(Arc<[f64]>), // NaN is null
    Str(Arc<[Option<String>]>),
    Enum {
        codes: Arc<[Option<u32>]>,
        universe: Arc<EnumUniverse>,
    },
}

impl From<ColumnData> for Column {
    fn from(data: ColumnData) -> Self {
        match data {
            ColumnData::Bool(v) => Column::Bool(v.into()),
            ColumnData::Int(v) => Column::Int(v.into()),
            ColumnData::Float(v) => Column::Float(v.into()),
            ColumnData::Str(v) => Column::Str(v.into()),
        }
    }
}

impl Column {
    /// Converts string data into an enum column.
    ///
    /// Without an explicit universe the distinct labels are used in ascending
    /// order.
    ///
    /// # Errors
    /// [`FrameError::BadData`] if a value is missing from the declared universe.
    pub fn new_enum(
        values: &[Option<String>],
        universe: Option<EnumUniverse>,
    ) -> Result<Self, FrameError> {
        let universe = universe.unwrap_or_else(|| {
            EnumUniverse::from_values(values.iter().flatten().map(String::as_str))
        });

        let codes = values
            .iter()
            .map(|v| match v {
                None => Ok(None),
                Some(label) => universe.code_of(label).map(Some).ok_or_else(|| {
                    FrameError::BadData(format!("value {label:?} not in enum universe"))
                }),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Column::Enum {
            codes: codes.into(),
            universe: Arc::new(universe),
        })
    }

    pub fn data_type(&self) -> DataType {
        match self {
            Column::Bool(_) => DataType::Bool,
            Column::Int(_) => DataType::Int,
            Column::Float(_) => DataType::Float,
            Column::Str(_) => DataType::Str,
            Column::Enum { .. } => DataType::Enum,
        }
    }

    /// Length of the backing storage.
    pub fn len(&self) -> usize {
        match self {
            Column::Bool(v) => v.len(),
            Column::Int(v) => v.len(),
            Column::Float(v) => v.len(),
            Column::Str(v) => v.len(),
            Column::Enum { codes, .. } => codes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn universe(&self) -> Option<&EnumUniverse> {
        match self {
            Column::Enum { universe, .. } => Some(universe),
            _ => None,
        }
    }

    pub fn is_null(&self, pos: usize) -> bool {
        match self {
            Column::Bool(v) => v[pos].is_none(),
            Column::Int(v) => v[pos].is_none(),
            Column::Float(v) => v[pos].is_nan(),
            Column::Str(v) => v[pos].is_none(),
            Column::Enum { codes, .. } => codes[pos].is_none(),
        }
    }

    /// Owned element at storage position `pos`.
    pub fn value_at(&self, pos: usize) -> Value {
        match self {
            Column::Bool(v) => v[pos].into(),
            Column::Int(v) => v[pos].into(),
            Column::Float(v) => Value::Float(v[pos]),
            Column::Str(v) => v[pos].clone().into(),
            Column::Enum { codes, universe } => {
                codes[pos].map(|c| universe.label(c).to_string()).into()
            }
        }
    }

    /// Label at `pos` for string and enum columns.
    pub(crate) fn str_at(&self, pos: usize) -> Option<&str> {
        match self {
            Column::Str(v) => v[pos].as_deref(),
            Column::Enum { codes, universe } => codes[pos].map(|c| universe.label(c)),
            _ => None,
        }
    }

    /// Total order over two storage positions. Nulls sort first and are equal
    /// to each other; enums order by ordinal code.
    pub fn compare(&self, a: usize, b: usize) -> Ordering {
        match self {
            Column::Bool(v) => v[a].cmp(&v[b]),
            Column::Int(v) => v[a].cmp(&v[b]),
            Column::Float(v) => compare_floats(v[a], v[b]),
            Column::Str(v) => v[a].cmp(&v[b]),
            Column::Enum { codes, .. } => codes[a].cmp(&codes[b]),
        }
    }

    pub fn equal(&self, a: usize, b: usize) -> bool {
        self.compare(a, b) == Ordering::Equal
    }

    /// Feeds the canonical byte form of the element at `pos` into `hasher`.
    ///
    /// Every element starts with a tag byte (0 for null, 1 otherwise) and
    /// variable width payloads are length prefixed, so the encodings of
    /// several columns can be concatenated without boundary ambiguity.
    pub fn hash_into(&self, pos: usize, hasher: &mut Murmur32) {
        if self.is_null(pos) {
            hasher.write_byte(NULL_TAG);
            return;
        }
        hasher.write_byte(VALUE_TAG);
        match self {
            Column::Bool(v) => hasher.write_byte(u8::from(v[pos] == Some(true))),
            Column::Int(v) => hasher.write_bytes(&v[pos].unwrap_or_default().to_le_bytes()),
            Column::Float(v) => {
                // 0.0 and -0.0 compare equal and must land in one group
                let x = if v[pos] == 0.0 { 0.0 } else { v[pos] };
                hasher.write_bytes(&x.to_bits().to_le_bytes());
            }
            Column::Str(v) => {
                let s = v[pos].as_deref().unwrap_or_default();
                hasher.write_bytes(&(s.len() as u64).to_le_bytes());
                hasher.write_bytes(s.as_bytes());
            }
            Column::Enum { codes, .. } => {
                hasher.write_bytes(&codes[pos].unwrap_or_default().to_le_bytes());
            }
        }
    }

    /// Text form of the element at `pos`, `null` for nulls.
    pub fn render(&self, pos: usize) -> String {
        self.value_at(pos).to_string()
    }

    /// New column holding the elements at `positions`, in that order.
    pub fn gather(&self, positions: &[usize]) -> Column {
        match self {
            Column::Bool(v) => Column::Bool(positions.iter().map(|&p| v[p]).collect()),
            Column::Int(v) => Column::Int(positions.iter().map(|&p| v[p]).collect()),
            Column::Float(v) => Column::Float(positions.iter().map(|&p| v[p]).collect()),
            Column::Str(v) => Column::Str(positions.iter().map(|&p| v[p].clone()).collect()),
            Column::Enum { codes, universe } => Column::Enum {
                codes: positions.iter().map(|&p| codes[p]).collect(),
                universe: Arc::clone(universe),
            },
        }
    }

    /// Whether both columns share the same backing storage.
    pub fn shares_storage(&self, other: &Column) -> bool {
        match (self, other) {
            (Column::Bool(a), Column::Bool(b)) => Arc::ptr_eq(a, b),
            (Column::Int(a), Column::Int(b)) => Arc::ptr_eq(a, b),
            (Column::Float(a), Column::Float(b)) => Arc::ptr_eq(a, b),
            (Column::Str(a), Column::Str(b)) => Arc::ptr_eq(a, b),
            (Column::Enum { codes: a, .. }, Column::Enum { codes: b, .. }) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// NaN is null: sorts first and equals other NaNs.
pub(crate) fn compare_floats(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}
