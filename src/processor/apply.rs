use std::fmt;
use std::sync::Arc;

use rayon::prelude::*;
use tracing::debug;

use crate::processor::column::{Column, ColumnData};
use crate::processor::frame::Frame;
use crate::processor::{DataType, FrameError, Value, PARALLEL_MIN_ROWS};

/// Pure elementwise function of one argument.
#[derive(Clone)]
pub struct Func1 {
    input: DataType,
    output: DataType,
    f: Arc<dyn Fn(&Value) -> Value + Send + Sync>,
}

impl Func1 {
    pub fn new(
        input: DataType,
        output: DataType,
        f: impl Fn(&Value) -> Value + Send + Sync + 'static,
    ) -> Self {
        Self {
            input,
            output,
            f: Arc::new(f),
        }
    }

    pub fn input(&self) -> DataType {
        self.input
    }

    pub fn output(&self) -> DataType {
        self.output
    }

    pub fn call(&self, v: &Value) -> Value {
        (self.f)(v)
    }
}

impl fmt::Debug for Func1 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Func1({} -> {})", self.input, self.output)
    }
}

/// Pure elementwise function of two arguments.
#[derive(Clone)]
pub struct Func2 {
    left: DataType,
    right: DataType,
    output: DataType,
    f: Arc<dyn Fn(&Value, &Value) -> Value + Send + Sync>,
}

impl Func2 {
    pub fn new(
        left: DataType,
        right: DataType,
        output: DataType,
        f: impl Fn(&Value, &Value) -> Value + Send + Sync + 'static,
    ) -> Self {
        Self {
            left,
            right,
            output,
            f: Arc::new(f),
        }
    }

    pub fn inputs(&self) -> (DataType, DataType) {
        (self.left, self.right)
    }

    pub fn output(&self) -> DataType {
        self.output
    }

    pub fn call(&self, a: &Value, b: &Value) -> Value {
        (self.f)(a, b)
    }
}

impl fmt::Debug for Func2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Func2({}, {} -> {})", self.left, self.right, self.output)
    }
}

/// Stateful producer, called once per row in index order.
pub struct Generator {
    output: DataType,
    f: Box<dyn FnMut() -> Value>,
}

impl Generator {
    pub fn new(output: DataType, f: impl FnMut() -> Value + 'static) -> Self {
        Self {
            output,
            f: Box::new(f),
        }
    }
}

impl fmt::Debug for Generator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Generator(-> {})", self.output)
    }
}

#[derive(Debug)]
pub enum Operation {
    Const(Value),
    /// Null constant of a given type.
    Null(DataType),
    Map1(Func1, String),
    Map2(Func2, String, String),
    Generate(Generator),
}

/// One step of [`Frame::apply`]: computes column `dst`.
#[derive(Debug)]
pub struct Instruction {
    dst: String,
    op: Operation,
}

impl Instruction {
    pub fn constant(dst: &str, value: impl Into<Value>) -> Self {
        Self::new(dst, Operation::Const(value.into()))
    }

    pub fn null(dst: &str, dtype: DataType) -> Self {
        Self::new(dst, Operation::Null(dtype))
    }

    pub fn map1(dst: &str, f: Func1, src: &str) -> Self {
        Self::new(dst, Operation::Map1(f, src.to_string()))
    }

    pub fn map2(dst: &str, f: Func2, left: &str, right: &str) -> Self {
        Self::new(dst, Operation::Map2(f, left.to_string(), right.to_string()))
    }

    pub fn generate(dst: &str, output: DataType, f: impl FnMut() -> Value + 'static) -> Self {
        Self::new(dst, Operation::Generate(Generator::new(output, f)))
    }

    pub fn new(dst: &str, op: Operation) -> Self {
        Self {
            dst: dst.to_string(),
            op,
        }
    }

    pub fn dst(&self) -> &str {
        &self.dst
    }
}

/// Calls `f` for every row `0..rows`, in parallel above the row threshold.
pub(crate) fn map_rows<F>(rows: usize, f: F) -> Vec<Value>
where
    F: Fn(usize) -> Value + Sync + Send,
{
    if rows >= PARALLEL_MIN_ROWS {
        (0..rows).into_par_iter().map(f).collect()
    } else {
        (0..rows).map(f).collect()
    }
}

/// Builds a column over `storage_len` slots holding `values` at `positions`
/// and null everywhere else.
pub(crate) fn scatter(
    dtype: DataType,
    storage_len: usize,
    positions: &[usize],
    values: Vec<Value>,
) -> Result<Column, FrameError> {
    let mut slots = vec![Value::Null; storage_len];
    for (&p, v) in positions.iter().zip(values) {
        slots[p] = v;
    }
    ColumnData::from_values(dtype, slots).map(Column::from)
}

fn check_input(frame: &Frame, src: &str, wanted: DataType) -> Result<(), FrameError> {
    let actual = frame.column_type(src)?;
    if actual.readable_as(wanted) {
        Ok(())
    } else {
        Err(FrameError::TypeMismatch(format!(
            "function expects {wanted}, column {src:?} is {actual}"
        )))
    }
}

impl Frame {
    /// Runs `instructions` in order, each adding or replacing its destination
    /// column.
    ///
    /// A later instruction sees the columns written by earlier ones. Pure
    /// functions may run in parallel; generators are always called on the
    /// calling thread, once per row, in index order.
    ///
    /// # Errors
    /// Attached to the returned frame:
    /// - [`FrameError::MissingColumn`] for an unknown source column
    /// - [`FrameError::TypeMismatch`] when a source column does not match the
    ///   function's input type, or a function returns a value of another type
    ///   than declared
    /// - [`FrameError::BadData`] for an untyped null constant
    ///
    /// # Example
    /// ```rust
    /// use columnar_frame::{functions, ColumnData, Frame, Instruction, Value};
    ///
    /// let frame = Frame::new(vec![("COL1", ColumnData::from(vec![1i64, 2]))]);
    /// let applied = frame.apply([Instruction::map1("COL2", functions::str_i(), "COL1")]);
    /// assert_eq!(applied.value_at("COL2", 1).unwrap(), Value::from("2"));
    /// ```
    pub fn apply(&self, instructions: impl IntoIterator<Item = Instruction>) -> Frame {
        if self.err.is_some() {
            return self.clone();
        }
        let mut frame = self.clone();
        let mut count = 0usize;
        for instruction in instructions {
            count += 1;
            let dst = instruction.dst.clone();
            match frame.run_instruction(instruction.op) {
                Ok(column) => frame = frame.with_column(&dst, column),
                Err(e) => return Frame::from_error("apply", e),
            }
        }
        debug!(instructions = count, rows = frame.len(), "Instructions applied");
        frame
    }

    fn run_instruction(&self, op: Operation) -> Result<Column, FrameError> {
        let positions = self.index.positions();
        let (dtype, values) = match op {
            Operation::Const(value) => {
                let dtype = value.data_type().ok_or_else(|| {
                    FrameError::BadData("null constant needs a declared type".into())
                })?;
                (dtype, vec![value; positions.len()])
            }
            Operation::Null(dtype) => (dtype, Vec::new()),
            Operation::Map1(f, src) => {
                check_input(self, &src, f.input())?;
                let column = self.column(&src)?;
                let values = map_rows(positions.len(), |i| f.call(&column.value_at(positions[i])));
                (f.output(), values)
            }
            Operation::Map2(f, left, right) => {
                let (lt, rt) = f.inputs();
                check_input(self, &left, lt)?;
                check_input(self, &right, rt)?;
                let (a, b) = (self.column(&left)?, self.column(&right)?);
                let values = map_rows(positions.len(), |i| {
                    let p = positions[i];
                    f.call(&a.value_at(p), &b.value_at(p))
                });
                (f.output(), values)
            }
            Operation::Generate(mut generator) => {
                let values = positions.iter().map(|_| (generator.f)()).collect();
                (generator.output, values)
            }
        };
        scatter(dtype, self.storage_len, positions, values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::filter::{CmpOp, Filter};
    use crate::processor::functions;

    fn sample() -> Frame {
        Frame::new(vec![
            ("COL1", ColumnData::from(vec![1i64, 2, 3])),
            ("COL2", ColumnData::from(vec!["a", "b", "c"])),
        ])
    }

    #[test]
    fn test_chained_instructions() {
        let result = sample().apply([
            Instruction::map1("COL3", functions::str_i(), "COL1"),
            Instruction::map2("COL3", functions::concat_s(), "COL3", "COL2"),
        ]);
        assert_eq!(
            result.str_view("COL3").unwrap().to_vec(),
            vec![Some("1a"), Some("2b"), Some("3c")]
        );
        assert_eq!(result.column_names(), ["COL1", "COL2", "COL3"]);
    }

    #[test]
    fn test_constant_and_generator() {
        let mut next = 0i64;
        let result = sample().apply([
            Instruction::constant("K", 1.5),
            Instruction::generate("SEQ", DataType::Int, move || {
                next += 1;
                Value::Int(next - 1)
            }),
        ]);
        assert_eq!(result.float_view("K").unwrap().to_vec(), vec![1.5, 1.5, 1.5]);
        assert_eq!(
            result.int_view("SEQ").unwrap().to_vec(),
            vec![Some(0), Some(1), Some(2)]
        );
    }

    #[test]
    fn test_generator_follows_index_order() {
        let frame = sample().sort([crate::processor::sort::Order::desc("COL1")]);
        let mut next = 0i64;
        let result = frame.apply([Instruction::generate("SEQ", DataType::Int, move || {
            next += 1;
            Value::Int(next)
        })]);
        assert_eq!(
            result.int_view("SEQ").unwrap().to_vec(),
            vec![Some(1), Some(2), Some(3)]
        );
        // storage order is the reverse of row order
        let seq = result.column("SEQ").unwrap();
        assert_eq!(seq.value_at(0), Value::Int(3));
    }

    #[test]
    fn test_apply_on_filtered_frame() {
        let frame = sample().filter(Filter::new("COL1", CmpOp::Gt, 1));
        let plus_one = Func1::new(DataType::Int, DataType::Int, |v| {
            v.as_int().map(|x| x + 1).into()
        });
        let result = frame.apply([Instruction::map1("D", plus_one, "COL1")]);
        assert_eq!(result.int_view("D").unwrap().to_vec(), vec![Some(3), Some(4)]);
        // unindexed slots hold null
        assert!(result.column("D").unwrap().is_null(0));
        assert!(!frame.contains("D"));
    }

    #[test]
    fn test_apply_errors() {
        let mismatch = sample().apply([Instruction::map1("X", functions::str_i(), "COL2")]);
        assert!(matches!(mismatch.err(), Some(FrameError::TypeMismatch(_))));

        let missing = sample().apply([Instruction::map1("X", functions::str_i(), "NOPE")]);
        assert!(matches!(missing.err(), Some(FrameError::MissingColumn(_))));

        let bad_output = sample().apply([Instruction::map1(
            "X",
            Func1::new(DataType::Int, DataType::Int, |_| Value::from("no")),
            "COL1",
        )]);
        assert!(matches!(bad_output.err(), Some(FrameError::TypeMismatch(_))));

        let untyped = sample().apply([Instruction::constant("X", Value::Null)]);
        assert!(matches!(untyped.err(), Some(FrameError::BadData(_))));

        let typed = sample().apply([Instruction::null("X", DataType::Str)]);
        assert_eq!(typed.value_at("X", 0).unwrap(), Value::Null);
        assert_eq!(typed.column_type("X").unwrap(), DataType::Str);
    }

    #[test]
    fn test_enum_reads_as_string() {
        let frame = Frame::with_config(
            vec![("e", ColumnData::from(vec!["x", "y"]))],
            crate::processor::frame::NewConfig::new().enum_column("e"),
        );
        let result = frame.apply([Instruction::map1("u", functions::upper_s(), "e")]);
        assert_eq!(
            result.str_view("u").unwrap().to_vec(),
            vec![Some("X"), Some("Y")]
        );
    }
}
