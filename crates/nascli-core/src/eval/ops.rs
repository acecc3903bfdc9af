//! Operator semantics over [`Value`].

use std::cmp::Ordering;

use crate::ast::BinOp;
use crate::error::{EvalErrorKind, ShellError};
use crate::value::Value;

fn unsupported(op: &str, left: &Value, right: &Value) -> ShellError {
    ShellError::type_mismatch(format!(
        "unsupported operand types for {}: {} and {}",
        op,
        left.type_name(),
        right.type_name()
    ))
}

fn overflow(op: BinOp) -> ShellError {
    ShellError::eval(
        EvalErrorKind::Overflow,
        format!("integer overflow in '{}'", op.symbol()),
    )
}

fn division_by_zero() -> ShellError {
    ShellError::eval(EvalErrorKind::DivisionByZero, "division by zero")
}

/// Apply a non-logical binary operator.
pub fn binary(op: BinOp, left: &Value, right: &Value) -> Result<Value, ShellError> {
    match op {
        BinOp::Eq => Ok(Value::Bool(left.loose_eq(right))),
        BinOp::NotEq => Ok(Value::Bool(!left.loose_eq(right))),
        BinOp::Gt | BinOp::Lt | BinOp::Ge | BinOp::Le => {
            let ord = compare(op, left, right)?;
            Ok(Value::Bool(match op {
                BinOp::Gt => ord == Ordering::Greater,
                BinOp::Lt => ord == Ordering::Less,
                BinOp::Ge => ord != Ordering::Less,
                _ => ord != Ordering::Greater,
            }))
        }
        BinOp::Add => add(left, right),
        BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod => arithmetic(op, left, right),
        BinOp::And | BinOp::Or => Err(ShellError::type_mismatch(format!(
            "'{}' is evaluated lazily",
            op.symbol()
        ))),
    }
}

fn compare(op: BinOp, left: &Value, right: &Value) -> Result<Ordering, ShellError> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => Ok(a.cmp(b)),
        (Value::String(a), Value::String(b)) => Ok(a.cmp(b)),
        (a, b) if a.is_number() && b.is_number() => {
            let (x, y) = (a.as_f64().unwrap_or(0.0), b.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y)
                .ok_or_else(|| unsupported(op.symbol(), left, right))
        }
        _ => Err(unsupported(op.symbol(), left, right)),
    }
}

fn add(left: &Value, right: &Value) -> Result<Value, ShellError> {
    match (left, right) {
        (Value::String(a), Value::String(b)) => Ok(Value::String(format!("{}{}", a, b))),
        (Value::List(a), Value::List(b)) => {
            let mut items = a.clone();
            items.extend(b.iter().cloned());
            Ok(Value::List(items))
        }
        _ => arithmetic(BinOp::Add, left, right),
    }
}

fn arithmetic(op: BinOp, left: &Value, right: &Value) -> Result<Value, ShellError> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => {
            let (a, b) = (*a, *b);
            match op {
                BinOp::Add => a.checked_add(b).map(Value::Int).ok_or_else(|| overflow(op)),
                BinOp::Sub => a.checked_sub(b).map(Value::Int).ok_or_else(|| overflow(op)),
                BinOp::Mul => a.checked_mul(b).map(Value::Int).ok_or_else(|| overflow(op)),
                BinOp::Div => {
                    if b == 0 {
                        return Err(division_by_zero());
                    }
                    // exact quotients stay integers
                    match a.checked_rem(b) {
                        Some(0) => a.checked_div(b).map(Value::Int).ok_or_else(|| overflow(op)),
                        Some(_) => Ok(Value::Float(a as f64 / b as f64)),
                        None => Err(overflow(op)),
                    }
                }
                BinOp::Mod => {
                    if b == 0 {
                        return Err(division_by_zero());
                    }
                    a.checked_rem(b).map(Value::Int).ok_or_else(|| overflow(op))
                }
                _ => Err(unsupported(op.symbol(), left, right)),
            }
        }
        (l, r) if l.is_number() && r.is_number() => {
            let (x, y) = (l.as_f64().unwrap_or(0.0), r.as_f64().unwrap_or(0.0));
            let result = match op {
                BinOp::Add => x + y,
                BinOp::Sub => x - y,
                BinOp::Mul => x * y,
                BinOp::Div | BinOp::Mod if y == 0.0 => return Err(division_by_zero()),
                BinOp::Div => x / y,
                BinOp::Mod => x % y,
                _ => return Err(unsupported(op.symbol(), left, right)),
            };
            Ok(Value::Float(result))
        }
        _ => Err(unsupported(op.symbol(), left, right)),
    }
}

pub fn negate(value: &Value) -> Result<Value, ShellError> {
    match value {
        Value::Int(i) => i
            .checked_neg()
            .map(Value::Int)
            .ok_or_else(|| overflow(BinOp::Sub)),
        Value::Float(x) => Ok(Value::Float(-x)),
        other => Err(ShellError::type_mismatch(format!(
            "bad operand type for unary -: {}",
            other.type_name()
        ))),
    }
}

/// Require a boolean, as conditions and logical operators do.
pub fn truth(value: &Value, context: &str) -> Result<bool, ShellError> {
    match value {
        Value::Bool(b) => Ok(*b),
        other => Err(ShellError::type_mismatch(format!(
            "{} must be boolean, got {} '{}'",
            context,
            other.type_name(),
            other
        ))),
    }
}

fn list_position(len: usize, index: &Value) -> Result<usize, ShellError> {
    match index {
        Value::Int(i) if *i >= 0 && (*i as usize) < len => Ok(*i as usize),
        Value::Int(i) => Err(ShellError::eval(
            EvalErrorKind::Index,
            format!("index {} out of range", i),
        )),
        other => Err(ShellError::type_mismatch(format!(
            "indices must be integers, got {}",
            other.type_name()
        ))),
    }
}

fn missing_key(key: &str) -> ShellError {
    ShellError::eval(EvalErrorKind::Key, format!("key '{}' not found", key))
}

/// `target[index]`
pub fn index(target: &Value, index: &Value) -> Result<Value, ShellError> {
    match target {
        Value::List(items) => Ok(items[list_position(items.len(), index)?].clone()),
        Value::String(s) => {
            let chars: Vec<char> = s.chars().collect();
            let at = list_position(chars.len(), index)?;
            Ok(Value::String(chars[at].to_string()))
        }
        Value::Dict(map) => match index {
            Value::String(key) => map.get(key).cloned().ok_or_else(|| missing_key(key)),
            other => Err(ShellError::type_mismatch(format!(
                "dict keys are strings, got {}",
                other.type_name()
            ))),
        },
        other => Err(ShellError::type_mismatch(format!(
            "{} is not subscriptable",
            other.type_name()
        ))),
    }
}

/// `target.name` on a dict.
pub fn member(target: &Value, name: &str) -> Result<Value, ShellError> {
    match target {
        Value::Dict(map) => map.get(name).cloned().ok_or_else(|| missing_key(name)),
        other => Err(ShellError::type_mismatch(format!(
            "{} has no member '{}'",
            other.type_name(),
            name
        ))),
    }
}

/// Store `value` at `slot[keys[0]][keys[1]]...`. The last dict key may be
/// new; every other step must exist.
pub fn assign_path(slot: &mut Value, keys: &[Value], value: Value) -> Result<(), ShellError> {
    let Some((key, rest)) = keys.split_first() else {
        *slot = value;
        return Ok(());
    };
    match slot {
        Value::List(items) => {
            let at = list_position(items.len(), key)?;
            assign_path(&mut items[at], rest, value)
        }
        Value::Dict(map) => {
            let Value::String(name) = key else {
                return Err(ShellError::type_mismatch(format!(
                    "dict keys are strings, got {}",
                    key.type_name()
                )));
            };
            if rest.is_empty() {
                map.insert(name.clone(), value);
                Ok(())
            } else {
                let inner = map.get_mut(name).ok_or_else(|| missing_key(name))?;
                assign_path(inner, rest, value)
            }
        }
        other => Err(ShellError::type_mismatch(format!(
            "{} does not support item assignment",
            other.type_name()
        ))),
    }
}
