use std::collections::HashMap;
use std::sync::OnceLock;

use tracing::debug;

use crate::processor::apply::{map_rows, scatter, Func1, Func2};
use crate::processor::frame::Frame;
use crate::processor::functions;
use crate::processor::{DataType, FrameError, Value};

/// Expression tree evaluated bottom-up against a frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Col(String),
    Lit(Value),
    Unary(String, Box<Expr>),
    Binary(String, Box<Expr>, Box<Expr>),
}

impl Expr {
    pub fn col(name: &str) -> Self {
        Expr::Col(name.to_string())
    }

    pub fn lit(value: impl Into<Value>) -> Self {
        Expr::Lit(value.into())
    }

    pub fn unary(op: &str, operand: Expr) -> Self {
        Expr::Unary(op.to_string(), Box::new(operand))
    }

    pub fn binary(op: &str, left: Expr, right: Expr) -> Self {
        Expr::Binary(op.to_string(), Box::new(left), Box::new(right))
    }
}

/// Operator registry keyed by (operator, operand type).
#[derive(Debug, Clone)]
pub struct EvalContext {
    fn1: HashMap<(String, DataType), Func1>,
    fn2: HashMap<(String, DataType), Func2>,
}

impl Default for EvalContext {
    fn default() -> Self {
        let mut ctx = Self::empty();
        ctx.set_fn1("str", functions::str_i())
            .set_fn1("str", functions::str_f())
            .set_fn1("str", functions::str_b())
            .set_fn1("str", functions::str_s())
            .set_fn1("abs", functions::abs_i())
            .set_fn1("abs", functions::abs_f())
            .set_fn1("float", functions::float_i())
            .set_fn1("int", functions::int_f())
            .set_fn1("!", functions::not_b())
            .set_fn1("upper", functions::upper_s())
            .set_fn1("lower", functions::lower_s())
            .set_fn1("len", functions::len_s())
            .set_fn2("+", functions::plus_i())
            .set_fn2("+", functions::plus_f())
            .set_fn2("+", functions::concat_s())
            .set_fn2("-", functions::minus_i())
            .set_fn2("-", functions::minus_f())
            .set_fn2("*", functions::mul_i())
            .set_fn2("*", functions::mul_f())
            .set_fn2("/", functions::div_i())
            .set_fn2("/", functions::div_f())
            .set_fn2("&", functions::and_b())
            .set_fn2("|", functions::or_b());
        ctx
    }
}

impl EvalContext {
    /// Registry without any operator.
    pub fn empty() -> Self {
        Self {
            fn1: HashMap::new(),
            fn2: HashMap::new(),
        }
    }

    /// Registers `f` as unary `op` for its input type, replacing any previous
    /// entry.
    pub fn set_fn1(&mut self, op: &str, f: Func1) -> &mut Self {
        self.fn1.insert((op.to_string(), f.input()), f);
        self
    }

    /// Registers `f` as binary `op` for its left input type.
    pub fn set_fn2(&mut self, op: &str, f: Func2) -> &mut Self {
        self.fn2.insert((op.to_string(), f.inputs().0), f);
        self
    }

    fn fn1(&self, op: &str, dtype: DataType) -> Result<&Func1, FrameError> {
        self.fn1
            .get(&(op.to_string(), dtype))
            .ok_or_else(|| unknown_operator(op, dtype))
    }

    fn fn2(&self, op: &str, dtype: DataType) -> Result<&Func2, FrameError> {
        self.fn2
            .get(&(op.to_string(), dtype))
            .ok_or_else(|| unknown_operator(op, dtype))
    }
}

fn unknown_operator(op: &str, dtype: DataType) -> FrameError {
    FrameError::TypeMismatch(format!("no operator {op:?} for {dtype} operands"))
}

fn default_context() -> &'static EvalContext {
    static CONTEXT: OnceLock<EvalContext> = OnceLock::new();
    CONTEXT.get_or_init(EvalContext::default)
}

/// Intermediate result of one node: a value per logical row, or one value
/// for every row.
enum Operand {
    Rows(Vec<Value>),
    Scalar(Value),
}

struct Evaluated {
    dtype: DataType,
    operand: Operand,
}

impl Evaluated {
    fn get(&self, row: usize) -> &Value {
        match &self.operand {
            Operand::Rows(values) => &values[row],
            Operand::Scalar(v) => v,
        }
    }

    fn is_scalar(&self) -> bool {
        matches!(self.operand, Operand::Scalar(_))
    }
}

/// Checks a function result against its declared output type.
fn checked(output: DataType, v: Value) -> Result<Value, FrameError> {
    match v.data_type() {
        Some(t) if t != output => Err(FrameError::TypeMismatch(format!(
            "function declared {output} returned {t} value"
        ))),
        _ => Ok(v),
    }
}

fn checked_rows(output: DataType, values: Vec<Value>) -> Result<Operand, FrameError> {
    values
        .into_iter()
        .map(|v| checked(output, v))
        .collect::<Result<Vec<_>, _>>()
        .map(Operand::Rows)
}

struct Evaluator<'a> {
    frame: &'a Frame,
    ctx: &'a EvalContext,
}

impl Evaluator<'_> {
    fn eval(&self, expr: &Expr) -> Result<Evaluated, FrameError> {
        let rows = self.frame.len();
        match expr {
            Expr::Col(name) => {
                let column = self.frame.column(name)?;
                let dtype = match column.data_type() {
                    DataType::Enum => DataType::Str,
                    other => other,
                };
                let positions = self.frame.index.positions();
                Ok(Evaluated {
                    dtype,
                    operand: Operand::Rows(map_rows(rows, |i| column.value_at(positions[i]))),
                })
            }
            Expr::Lit(value) => {
                let dtype = value.data_type().ok_or_else(|| {
                    FrameError::BadData("null literal in expression".into())
                })?;
                Ok(Evaluated {
                    dtype,
                    operand: Operand::Scalar(value.clone()),
                })
            }
            Expr::Unary(op, operand) => {
                let arg = self.eval(operand)?;
                let f = self.ctx.fn1(op, arg.dtype)?;
                let operand = if arg.is_scalar() {
                    Operand::Scalar(checked(f.output(), f.call(arg.get(0)))?)
                } else {
                    checked_rows(f.output(), map_rows(rows, |i| f.call(arg.get(i))))?
                };
                Ok(Evaluated {
                    dtype: f.output(),
                    operand,
                })
            }
            Expr::Binary(op, left, right) => {
                let (a, b) = (self.eval(left)?, self.eval(right)?);
                if a.dtype != b.dtype {
                    return Err(FrameError::TypeMismatch(format!(
                        "operator {op:?} applied to {} and {} operands",
                        a.dtype, b.dtype
                    )));
                }
                let f = self.ctx.fn2(op, a.dtype)?;
                let operand = if a.is_scalar() && b.is_scalar() {
                    Operand::Scalar(checked(f.output(), f.call(a.get(0), b.get(0)))?)
                } else {
                    checked_rows(
                        f.output(),
                        map_rows(rows, |i| f.call(a.get(i), b.get(i))),
                    )?
                };
                Ok(Evaluated {
                    dtype: f.output(),
                    operand,
                })
            }
        }
    }
}

impl Frame {
    /// Evaluates `expr` with the built-in operators into column `dst`.
    ///
    /// # Example
    /// ```rust
    /// use columnar_frame::{ColumnData, Expr, Frame, Value};
    ///
    /// let frame = Frame::new(vec![
    ///     ("COL1", ColumnData::from(vec![1i64, 2])),
    ///     ("COL2", ColumnData::from(vec!["a", "b"])),
    /// ]);
    /// let expr = Expr::binary("+", Expr::unary("str", Expr::col("COL1")), Expr::col("COL2"));
    /// let result = frame.eval("COL3", &expr);
    /// assert_eq!(result.value_at("COL3", 0).unwrap(), Value::from("1a"));
    /// ```
    pub fn eval(&self, dst: &str, expr: &Expr) -> Frame {
        self.eval_with(dst, expr, default_context())
    }

    /// Evaluates `expr` with the operators registered in `ctx`.
    ///
    /// # Errors
    /// Attached to the returned frame:
    /// - [`FrameError::MissingColumn`] for an unknown column reference
    /// - [`FrameError::TypeMismatch`] for operands of differing types, an
    ///   operator not registered for the operand type, or a function result
    ///   of another type than declared
    /// - [`FrameError::BadData`] for a null literal
    pub fn eval_with(&self, dst: &str, expr: &Expr, ctx: &EvalContext) -> Frame {
        if self.err.is_some() {
            return self.clone();
        }
        let evaluator = Evaluator { frame: self, ctx };
        let result = evaluator.eval(expr).and_then(|evaluated| {
            let values = (0..self.len()).map(|i| evaluated.get(i).clone()).collect();
            scatter(
                evaluated.dtype,
                self.storage_len,
                self.index.positions(),
                values,
            )
        });
        match result {
            Ok(column) => {
                debug!(dst, rows = self.len(), "Expression evaluated");
                self.with_column(dst, column)
            }
            Err(e) => Frame::from_error("eval", e),
        }
    }
}
