//! Built-in elementwise functions for [`Instruction`](crate::Instruction)s
//! and eval operators.
//!
//! Every function maps a null argument to null.

use crate::processor::apply::{Func1, Func2};
use crate::processor::{DataType, Value};

fn int1(output: DataType, f: fn(i64) -> Value) -> Func1 {
    Func1::new(DataType::Int, output, move |v| v.as_int().map_or(Value::Null, f))
}

fn float1(output: DataType, f: fn(f64) -> Value) -> Func1 {
    Func1::new(DataType::Float, output, move |v| {
        v.as_float().map_or(Value::Null, f)
    })
}

fn str1(output: DataType, f: fn(&str) -> Value) -> Func1 {
    Func1::new(DataType::Str, output, move |v| v.as_str().map_or(Value::Null, f))
}

fn int2(f: fn(i64, i64) -> Option<i64>) -> Func2 {
    Func2::new(DataType::Int, DataType::Int, DataType::Int, move |a, b| {
        match (a.as_int(), b.as_int()) {
            (Some(a), Some(b)) => f(a, b).into(),
            _ => Value::Null,
        }
    })
}

fn float2(f: fn(f64, f64) -> f64) -> Func2 {
    Func2::new(DataType::Float, DataType::Float, DataType::Float, move |a, b| {
        match (a.as_float(), b.as_float()) {
            (Some(a), Some(b)) => Value::Float(f(a, b)),
            _ => Value::Null,
        }
    })
}

fn bool2(f: fn(bool, bool) -> bool) -> Func2 {
    Func2::new(DataType::Bool, DataType::Bool, DataType::Bool, move |a, b| {
        match (a.as_bool(), b.as_bool()) {
            (Some(a), Some(b)) => Value::Bool(f(a, b)),
            _ => Value::Null,
        }
    })
}

/// Integer to its decimal text.
pub fn str_i() -> Func1 {
    int1(DataType::Str, |x| Value::Str(x.to_string()))
}

pub fn str_f() -> Func1 {
    float1(DataType::Str, |x| Value::Str(x.to_string()))
}

pub fn str_b() -> Func1 {
    Func1::new(DataType::Bool, DataType::Str, |v| {
        v.as_bool().map(|b| b.to_string()).into()
    })
}

pub fn str_s() -> Func1 {
    str1(DataType::Str, |s| Value::from(s))
}

pub fn float_i() -> Func1 {
    int1(DataType::Float, |x| Value::Float(x as f64))
}

/// Truncates toward zero.
pub fn int_f() -> Func1 {
    float1(DataType::Int, |x| Value::Int(x as i64))
}

pub fn abs_i() -> Func1 {
    int1(DataType::Int, |x| Value::Int(x.wrapping_abs()))
}

pub fn abs_f() -> Func1 {
    float1(DataType::Float, |x| Value::Float(x.abs()))
}

pub fn not_b() -> Func1 {
    Func1::new(DataType::Bool, DataType::Bool, |v| v.as_bool().map(|b| !b).into())
}

pub fn upper_s() -> Func1 {
    str1(DataType::Str, |s| Value::Str(s.to_uppercase()))
}

pub fn lower_s() -> Func1 {
    str1(DataType::Str, |s| Value::Str(s.to_lowercase()))
}

/// Length in characters.
pub fn len_s() -> Func1 {
    str1(DataType::Int, |s| Value::Int(s.chars().count() as i64))
}

pub fn concat_s() -> Func2 {
    Func2::new(DataType::Str, DataType::Str, DataType::Str, |a, b| {
        match (a.as_str(), b.as_str()) {
            (Some(a), Some(b)) => Value::Str(format!("{a}{b}")),
            _ => Value::Null,
        }
    })
}

pub fn plus_i() -> Func2 {
    int2(|a, b| Some(a.wrapping_add(b)))
}

pub fn minus_i() -> Func2 {
    int2(|a, b| Some(a.wrapping_sub(b)))
}

pub fn mul_i() -> Func2 {
    int2(|a, b| Some(a.wrapping_mul(b)))
}

/// Integer division; division by zero yields null.
pub fn div_i() -> Func2 {
    int2(i64::checked_div)
}

pub fn plus_f() -> Func2 {
    float2(|a, b| a + b)
}

pub fn minus_f() -> Func2 {
    float2(|a, b| a - b)
}

pub fn mul_f() -> Func2 {
    float2(|a, b| a * b)
}

pub fn div_f() -> Func2 {
    float2(|a, b| a / b)
}

pub fn and_b() -> Func2 {
    bool2(|a, b| a && b)
}

pub fn or_b() -> Func2 {
    bool2(|a, b| a || b)
}
