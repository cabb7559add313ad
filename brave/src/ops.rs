//! Operator semantics: coercion, the numeric tower, and the unary and binary
//! operations the interpreter dispatches to.

use std::cmp::Ordering;
use std::str::FromStr;

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::RuntimeError;
use crate::value::{NumericKind, Value};

type Result<T> = std::result::Result<T, RuntimeError>;

// ═══════════════════════════════════════════════════════════════════
// Coercion
// ═══════════════════════════════════════════════════════════════════

fn conversion(from: &Value, to: &'static str) -> RuntimeError {
    RuntimeError::Conversion {
        from: from.kind_name(),
        to,
    }
}

fn overflow(target: &'static str) -> RuntimeError {
    RuntimeError::Overflow { target }
}

/// Integral view of a value, rounding reals half-to-even.
fn integral(value: &Value, to: &'static str) -> Result<i128> {
    Ok(match value {
        Value::Null => 0,
        Value::Bool(b) => *b as i128,
        Value::Int32(v) => *v as i128,
        Value::Int64(v) => *v as i128,
        Value::UInt32(v) => *v as i128,
        Value::UInt64(v) => *v as i128,
        Value::Float32(v) => real_to_integral(*v as f64, to)?,
        Value::Float64(v) => real_to_integral(*v, to)?,
        Value::Decimal(d) => d
            .round_dp_with_strategy(0, RoundingStrategy::MidpointNearestEven)
            .to_i128()
            .ok_or_else(|| overflow(to))?,
        Value::String(s) => s.trim().parse().map_err(|_| conversion(value, to))?,
        Value::Object(_) => return Err(conversion(value, to)),
    })
}

fn real_to_integral(v: f64, to: &'static str) -> Result<i128> {
    let rounded = v.round_ties_even();
    if !rounded.is_finite() || rounded.abs() >= 1.7e38 {
        return Err(overflow(to));
    }
    Ok(rounded as i128)
}

macro_rules! integral_coercion {
    ($($name:ident -> $ty:ty, $label:literal;)*) => {
        $(
            pub fn $name(value: &Value) -> Result<$ty> {
                <$ty>::try_from(integral(value, $label)?)
                    .map_err(|_| overflow($label))
            }
        )*
    };
}

integral_coercion! {
    to_i32 -> i32, "int32";
    to_u32 -> u32, "uint32";
    to_i64 -> i64, "int64";
    to_u64 -> u64, "uint64";
}

pub fn to_f64(value: &Value) -> Result<f64> {
    Ok(match value {
        Value::Null => 0.0,
        Value::Bool(b) => *b as u8 as f64,
        Value::Int32(v) => *v as f64,
        Value::Int64(v) => *v as f64,
        Value::UInt32(v) => *v as f64,
        Value::UInt64(v) => *v as f64,
        Value::Float32(v) => *v as f64,
        Value::Float64(v) => *v,
        Value::Decimal(d) => d.to_f64().ok_or_else(|| overflow("double"))?,
        Value::String(s) => s.trim().parse().map_err(|_| conversion(value, "double"))?,
        Value::Object(_) => return Err(conversion(value, "double")),
    })
}

pub fn to_f32(value: &Value) -> Result<f32> {
    match value {
        Value::Float32(v) => Ok(*v),
        Value::String(s) => s.trim().parse().map_err(|_| conversion(value, "float")),
        other => Ok(to_f64(other)? as f32),
    }
}

pub fn to_decimal(value: &Value) -> Result<Decimal> {
    Ok(match value {
        Value::Null => Decimal::ZERO,
        Value::Bool(b) => Decimal::from(*b as u8),
        Value::Int32(v) => Decimal::from(*v),
        Value::Int64(v) => Decimal::from(*v),
        Value::UInt32(v) => Decimal::from(*v),
        Value::UInt64(v) => Decimal::from(*v),
        Value::Float32(v) => Decimal::from_f32(*v).ok_or_else(|| overflow("decimal"))?,
        Value::Float64(v) => Decimal::from_f64(*v).ok_or_else(|| overflow("decimal"))?,
        Value::Decimal(d) => *d,
        Value::String(s) => parse_decimal(s.trim()).ok_or_else(|| conversion(value, "decimal"))?,
        Value::Object(_) => return Err(conversion(value, "decimal")),
    })
}

/// Parses plain or scientific decimal notation.
pub fn parse_decimal(text: &str) -> Option<Decimal> {
    if text.contains(['e', 'E']) {
        Decimal::from_scientific(text).ok()
    } else {
        Decimal::from_str(text).ok()
    }
}

/// Boolean coercion used by conditions and the logical operators.
pub fn to_boolean(value: &Value) -> Result<bool> {
    Ok(match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Int32(v) => *v != 0,
        Value::Int64(v) => *v != 0,
        Value::UInt32(v) => *v != 0,
        Value::UInt64(v) => *v != 0,
        Value::Float32(v) => *v != 0.0,
        Value::Float64(v) => *v != 0.0,
        Value::Decimal(d) => !d.is_zero(),
        Value::String(s) => s.trim().eq_ignore_ascii_case("true"),
        Value::Object(_) => {
            return Err(RuntimeError::BooleanConversion {
                kind: value.kind_name(),
            });
        }
    })
}

/// Kind an arithmetic operation runs at: the higher rank of the two, int32
/// when neither side is numeric.
fn promoted(left: &Value, right: &Value) -> NumericKind {
    match (left.numeric_kind(), right.numeric_kind()) {
        (Some(a), Some(b)) => a.max(b),
        (Some(k), None) | (None, Some(k)) => k,
        (None, None) => NumericKind::Int32,
    }
}

pub(crate) fn numeric_eq(a: &Value, b: &Value, kind: NumericKind) -> bool {
    match kind {
        NumericKind::Decimal => match (to_decimal(a), to_decimal(b)) {
            (Ok(x), Ok(y)) => x == y,
            _ => false,
        },
        NumericKind::Float32 | NumericKind::Float64 => {
            matches!((to_f64(a), to_f64(b)), (Ok(x), Ok(y)) if x == y)
        }
        _ => matches!(
            (integral(a, "integer"), integral(b, "integer")),
            (Ok(x), Ok(y)) if x == y
        ),
    }
}

// ═══════════════════════════════════════════════════════════════════
// Unary
// ═══════════════════════════════════════════════════════════════════

fn unsupported(op: &'static str, value: &Value) -> RuntimeError {
    RuntimeError::UnsupportedOperand {
        op,
        kind: value.kind_name(),
    }
}

pub fn increment(value: &Value) -> Result<Value> {
    step(value, 1, "increment")
}

pub fn decrement(value: &Value) -> Result<Value> {
    step(value, -1, "decrement")
}

fn step(value: &Value, delta: i32, op: &'static str) -> Result<Value> {
    Ok(match value {
        Value::Null => Value::Int32(delta),
        Value::Int32(v) => Value::Int32(v.wrapping_add(delta)),
        Value::Int64(v) => Value::Int64(v.wrapping_add(delta as i64)),
        Value::Float64(v) => Value::Float64(v + delta as f64),
        Value::Float32(v) => Value::Float32(v + delta as f32),
        Value::Decimal(d) => Value::Decimal(
            d.checked_add(Decimal::from(delta))
                .ok_or_else(|| overflow("decimal"))?,
        ),
        other => return Err(unsupported(op, other)),
    })
}

pub fn negate(value: &Value) -> Result<Value> {
    Ok(match value {
        Value::Null => Value::Int32(0),
        Value::Int32(v) => Value::Int32(v.wrapping_neg()),
        Value::Int64(v) => Value::Int64(v.wrapping_neg()),
        Value::Float64(v) => Value::Float64(-v),
        Value::Float32(v) => Value::Float32(-v),
        Value::Decimal(d) => Value::Decimal(-*d),
        other => return Err(unsupported("negate", other)),
    })
}

pub fn bitwise_not(value: &Value) -> Result<Value> {
    Ok(match value {
        Value::Null => Value::Int32(0),
        Value::Int32(v) => Value::Int32(!v),
        Value::Int64(v) => Value::Int64(!v),
        Value::UInt32(v) => Value::UInt32(!v),
        Value::UInt64(v) => Value::UInt64(!v),
        Value::Bool(b) => Value::Bool(!b),
        other => return Err(unsupported("apply bitwise not to", other)),
    })
}

// ═══════════════════════════════════════════════════════════════════
// Arithmetic
// ═══════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arith {
    Add,
    Subtract,
    Multiply,
    Divide,
}

/// `+`: string concatenation when either side is a string, numeric
/// addition otherwise.
pub fn add(left: &Value, right: &Value) -> Result<Value> {
    if matches!(left, Value::String(_)) || matches!(right, Value::String(_)) {
        let mut text = left.concat_text();
        text.push_str(&right.concat_text());
        return Ok(Value::from(text));
    }
    arithmetic(Arith::Add, left, right)
}

macro_rules! integral_arith {
    ($op:expr, $l:expr, $r:expr, $variant:ident, $label:literal) => {{
        let (l, r) = ($l, $r);
        Value::$variant(match $op {
            Arith::Add => l.wrapping_add(r),
            Arith::Subtract => l.wrapping_sub(r),
            Arith::Multiply => l.wrapping_mul(r),
            Arith::Divide => {
                if r == 0 {
                    return Err(RuntimeError::DivideByZero);
                }
                l.checked_div(r).ok_or_else(|| overflow($label))?
            }
        })
    }};
}

macro_rules! real_arith {
    ($op:expr, $l:expr, $r:expr, $variant:ident) => {{
        let (l, r) = ($l, $r);
        Value::$variant(match $op {
            Arith::Add => l + r,
            Arith::Subtract => l - r,
            Arith::Multiply => l * r,
            Arith::Divide => {
                if r == 0.0 {
                    return Err(RuntimeError::DivideByZero);
                }
                l / r
            }
        })
    }};
}

/// Numeric arithmetic at the promoted kind. Null operands count as zero.
pub fn arithmetic(op: Arith, left: &Value, right: &Value) -> Result<Value> {
    Ok(match promoted(left, right) {
        NumericKind::Decimal => {
            let (l, r) = (to_decimal(left)?, to_decimal(right)?);
            let result = match op {
                Arith::Add => l.checked_add(r),
                Arith::Subtract => l.checked_sub(r),
                Arith::Multiply => l.checked_mul(r),
                Arith::Divide => {
                    if r.is_zero() {
                        return Err(RuntimeError::DivideByZero);
                    }
                    l.checked_div(r)
                }
            };
            Value::Decimal(result.ok_or_else(|| overflow("decimal"))?)
        }
        NumericKind::Float64 => real_arith!(op, to_f64(left)?, to_f64(right)?, Float64),
        NumericKind::Float32 => real_arith!(op, to_f32(left)?, to_f32(right)?, Float32),
        NumericKind::UInt64 => {
            integral_arith!(op, to_u64(left)?, to_u64(right)?, UInt64, "uint64")
        }
        NumericKind::Int64 => {
            integral_arith!(op, to_i64(left)?, to_i64(right)?, Int64, "int64")
        }
        NumericKind::UInt32 => {
            integral_arith!(op, to_u32(left)?, to_u32(right)?, UInt32, "uint32")
        }
        NumericKind::Int32 => {
            integral_arith!(op, to_i32(left)?, to_i32(right)?, Int32, "int32")
        }
    })
}

// ═══════════════════════════════════════════════════════════════════
// Bitwise
// ═══════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bitwise {
    And,
    Or,
    Xor,
}

macro_rules! apply_bits {
    ($op:expr, $l:expr, $r:expr) => {
        match $op {
            Bitwise::And => $l & $r,
            Bitwise::Or => $l | $r,
            Bitwise::Xor => $l ^ $r,
        }
    };
}

/// Bool op when both are bools; uint64 when either side is unsigned;
/// int64 otherwise.
pub fn bitwise(op: Bitwise, left: &Value, right: &Value) -> Result<Value> {
    if let (Value::Bool(l), Value::Bool(r)) = (left, right) {
        return Ok(Value::Bool(apply_bits!(op, *l, *r)));
    }
    let unsigned = [left, right]
        .iter()
        .any(|v| v.numeric_kind().is_some_and(NumericKind::is_unsigned));
    if unsigned {
        Ok(Value::UInt64(apply_bits!(op, to_u64(left)?, to_u64(right)?)))
    } else {
        Ok(Value::Int64(apply_bits!(op, to_i64(left)?, to_i64(right)?)))
    }
}

// ═══════════════════════════════════════════════════════════════════
// Comparison
// ═══════════════════════════════════════════════════════════════════

/// Total order over reals where NaN sorts first and equals itself.
fn compare_reals(l: f64, r: f64) -> Ordering {
    match (l.is_nan(), r.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => l.partial_cmp(&r).unwrap_or(Ordering::Equal),
    }
}

/// Ordering used by `< <= > >=`. Null sorts before every non-null value.
pub fn compare(left: &Value, right: &Value) -> Result<Ordering> {
    match (left.is_null(), right.is_null()) {
        (true, true) => return Ok(Ordering::Equal),
        (true, false) => return Ok(Ordering::Less),
        (false, true) => return Ok(Ordering::Greater),
        (false, false) => {}
    }

    let kinds = [left.numeric_kind(), right.numeric_kind()];
    let has = |pred: fn(NumericKind) -> bool| kinds.iter().flatten().any(|k| pred(*k));

    if has(|k| k == NumericKind::Decimal) {
        return Ok(to_decimal(left)?.cmp(&to_decimal(right)?));
    }
    if has(NumericKind::is_real) {
        return Ok(compare_reals(to_f64(left)?, to_f64(right)?));
    }
    if has(NumericKind::is_unsigned) {
        return Ok(to_u64(left)?.cmp(&to_u64(right)?));
    }
    Ok(to_i64(left)?.cmp(&to_i64(right)?))
}
