use std::fmt;
use std::hash::{Hash, Hasher};
use thiserror::Error;

pub mod apply;
pub mod column;
pub mod eval;
pub mod filter;
pub mod frame;
pub mod functions;
pub mod group_by;
pub mod index;
pub mod sort;

/// Row count from which per-row work is spread over the rayon pool.
pub(crate) const PARALLEL_MIN_ROWS: usize = 32 * 1024;

/// Error type used across the crate
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// Inconsistent construction or operation options
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Unknown column name
    #[error("Missing column: {0}")]
    MissingColumn(String),

    /// Predicate, function or enum universe not matching the column type
    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    /// Malformed argument or inconsistent null handling
    #[error("Bad data: {0}")]
    BadData(String),
}

/// Element type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Bool,
    Int,
    Float,
    Str,
    Enum,
}

impl DataType {
    /// Single letter used in rendered headers, e.g. `COL1(i)`.
    pub fn code(self) -> char {
        match self {
            DataType::Bool => 'b',
            DataType::Int => 'i',
            DataType::Float => 'f',
            DataType::Str => 's',
            DataType::Enum => 'e',
        }
    }

    /// Whether a column of type `self` can be read where `wanted` is declared.
    ///
    /// Enum columns read as their labels.
    pub(crate) fn readable_as(self, wanted: DataType) -> bool {
        self == wanted || (self == DataType::Enum && wanted == DataType::Str)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::Bool => "bool",
            DataType::Int => "int",
            DataType::Float => "float",
            DataType::Str => "string",
            DataType::Enum => "enum",
        };
        f.write_str(name)
    }
}

/// Scalar value used for literals, constants and row access.
///
/// Enum elements surface as `Str` holding their label. A float NaN is the
/// float null and compares equal to `Null`.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Float(f) => f.is_nan(),
            _ => false,
        }
    }

    /// Type of a non-null value.
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Value::Null => None,
            Value::Bool(_) => Some(DataType::Bool),
            Value::Int(_) => Some(DataType::Int),
            Value::Float(f) if f.is_nan() => None,
            Value::Float(_) => Some(DataType::Float),
            Value::Str(_) => Some(DataType::Str),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Float view of a numeric value; ints are promoted.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) if !f.is_nan() => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (a, b) if a.is_null() && b.is_null() => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits() || a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        if self.is_null() {
            0u8.hash(state);
            return;
        }
        match self {
            Value::Null => {}
            Value::Bool(v) => v.hash(state),
            Value::Int(v) => v.hash(state),
            // -0.0 == 0.0, so both must hash alike
            Value::Float(v) => (if *v == 0.0 { 0.0f64 } else { *v }).to_bits().hash(state),
            Value::Str(v) => v.hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            v if v.is_null() => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => f.write_str(s),
            Value::Null => f.write_str("null"),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// Built-in reductions for group-by aggregation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateOp {
    /// Sum of all non-null numeric values
    Sum,
    /// Count of all rows in the group
    Count,
    /// Average of non-null numeric values
    Avg,
    /// Minimum non-null value
    Min,
    /// Maximum non-null value
    Max,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_null_equality() {
        assert_eq!(Value::Null, Value::Float(f64::NAN));
        assert_ne!(Value::Null, Value::Int(0));
        assert_eq!(Value::Float(0.0), Value::Float(-0.0));
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some("a")), Value::Str("a".into()));
    }

    #[test]
    fn test_value_display() {
        assert_eq!(Value::Float(3.0).to_string(), "3");
        assert_eq!(Value::Float(2.25).to_string(), "2.25");
        assert_eq!(Value::Float(f64::NAN).to_string(), "null");
        assert_eq!(Value::Bool(false).to_string(), "false");
    }

    #[test]
    fn test_enum_readable_as_str() {
        assert!(DataType::Enum.readable_as(DataType::Str));
        assert!(!DataType::Str.readable_as(DataType::Enum));
        assert!(!DataType::Int.readable_as(DataType::Float));
    }
}
