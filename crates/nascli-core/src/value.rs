//! Dynamically typed values.
//!
//! [`Value`] is the closed set of things a variable, property or command
//! argument can hold. Conversions between them happen only through the
//! explicit rules in this module ([`ValueType::coerce`]) and in the evaluator's
//! operator table; nothing is converted implicitly.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ShellError;

/// A shell value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Dict(BTreeMap<String, Value>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "none",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Dict(_) => "dict",
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_))
    }

    /// Equality as seen by `==`: integers and floats form one numeric type,
    /// any other pair of different types is unequal.
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (a, b) if a.is_number() && b.is_number() => a.as_f64() == b.as_f64(),
            (Value::List(a), Value::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.loose_eq(y))
            }
            (Value::Dict(a), Value::Dict(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .zip(b)
                        .all(|((ka, va), (kb, vb))| ka == kb && va.loose_eq(vb))
            }
            (a, b) => a == b,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Int(_) | Value::Float(_) => 2,
            Value::String(_) => 3,
            Value::List(_) => 4,
            Value::Dict(_) => 5,
        }
    }

    /// Total order used for sorting rows. Values of different types order by
    /// type (none < boolean < number < string < list < dict).
    pub fn total_cmp(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (a, b) if a.is_number() && b.is_number() => {
                let (x, y) = (a.as_f64().unwrap_or(0.0), b.as_f64().unwrap_or(0.0));
                x.total_cmp(&y)
            }
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::List(a), Value::List(b)) => {
                for (x, y) in a.iter().zip(b) {
                    let ord = x.total_cmp(y);
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                a.len().cmp(&b.len())
            }
            (Value::Dict(a), Value::Dict(b)) => {
                for ((ka, va), (kb, vb)) in a.iter().zip(b) {
                    let ord = ka.cmp(kb).then_with(|| va.total_cmp(vb));
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                a.len().cmp(&b.len())
            }
            (a, b) => a.rank().cmp(&b.rank()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("none"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{:?}", x),
            Value::String(s) => f.write_str(s),
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
            Value::Dict(map) => {
                f.write_str("{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}={}", k, v)?;
                }
                f.write_str("}")
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// Declared type of a property or command argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    String,
    Integer,
    Number,
    Boolean,
    List,
    Dict,
    #[default]
    Any,
}

impl ValueType {
    pub fn name(&self) -> &'static str {
        match self {
            ValueType::String => "string",
            ValueType::Integer => "integer",
            ValueType::Number => "number",
            ValueType::Boolean => "boolean",
            ValueType::List => "list",
            ValueType::Dict => "dict",
            ValueType::Any => "any",
        }
    }

    /// Convert `value` to this type, or fail with a type mismatch naming
    /// `field`.
    ///
    /// Strings are parsed into numbers and booleans (`yes`/`no`, `on`/`off`,
    /// `true`/`false`); scalars are stringified for string fields; whole
    /// floats narrow to integers. Lists and dicts never convert.
    pub fn coerce(&self, field: &str, value: Value) -> Result<Value, ShellError> {
        let mismatch = |v: &Value| {
            ShellError::type_mismatch(format!(
                "{} expects {}, got {} '{}'",
                field,
                self.name(),
                v.type_name(),
                v
            ))
        };

        match (self, value) {
            (ValueType::Any, v) => Ok(v),
            (ValueType::String, v @ Value::String(_)) => Ok(v),
            (ValueType::String, v @ (Value::Int(_) | Value::Float(_) | Value::Bool(_))) => {
                Ok(Value::String(v.to_string()))
            }
            (ValueType::Integer, v @ Value::Int(_)) => Ok(v),
            (ValueType::Integer, Value::Float(x))
                if x.fract() == 0.0 && x >= i64::MIN as f64 && x < i64::MAX as f64 =>
            {
                Ok(Value::Int(x as i64))
            }
            (ValueType::Integer, Value::String(s)) => match s.trim().parse::<i64>() {
                Ok(i) => Ok(Value::Int(i)),
                Err(_) => Err(mismatch(&Value::String(s))),
            },
            (ValueType::Number, v @ (Value::Int(_) | Value::Float(_))) => Ok(v),
            (ValueType::Number, Value::String(s)) => {
                let trimmed = s.trim();
                if let Ok(i) = trimmed.parse::<i64>() {
                    Ok(Value::Int(i))
                } else if let Ok(x) = trimmed.parse::<f64>() {
                    Ok(Value::Float(x))
                } else {
                    Err(mismatch(&Value::String(s)))
                }
            }
            (ValueType::Boolean, v @ Value::Bool(_)) => Ok(v),
            (ValueType::Boolean, Value::String(s)) => match s.to_lowercase().as_str() {
                "yes" | "true" | "on" => Ok(Value::Bool(true)),
                "no" | "false" | "off" => Ok(Value::Bool(false)),
                _ => Err(mismatch(&Value::String(s))),
            },
            (ValueType::List, v @ Value::List(_)) => Ok(v),
            (ValueType::Dict, v @ Value::Dict(_)) => Ok(v),
            (_, v) => Err(mismatch(&v)),
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_scalars() {
        assert_eq!(Value::Null.to_string(), "none");
        assert_eq!(Value::Bool(true).to_string(), "true");
        assert_eq!(Value::Int(-4).to_string(), "-4");
        assert_eq!(Value::Float(3.5).to_string(), "3.5");
        assert_eq!(Value::Float(10.0).to_string(), "10.0");
        assert_eq!(Value::from("tank").to_string(), "tank");
    }

    #[test]
    fn test_display_dict_sorted_pairs() {
        let mut map = BTreeMap::new();
        map.insert("this".to_string(), Value::from("foo"));
        map.insert("that".to_string(), Value::from("bar"));
        assert_eq!(Value::Dict(map).to_string(), "{that=bar, this=foo}");
    }

    #[test]
    fn test_display_list_in_order() {
        let list = Value::List(vec![Value::Int(3), Value::Int(1), Value::Int(2)]);
        assert_eq!(list.to_string(), "[3, 1, 2]");
    }

    #[test]
    fn test_loose_eq_numbers_and_cross_type() {
        assert!(Value::Int(10).loose_eq(&Value::Float(10.0)));
        assert!(!Value::Int(10).loose_eq(&Value::from("10")));
        assert!(!Value::Null.loose_eq(&Value::Bool(false)));
    }

    #[test]
    fn test_total_cmp_orders_types_then_values() {
        let mut values = vec![
            Value::from("b"),
            Value::Int(2),
            Value::Null,
            Value::Float(1.5),
            Value::from("a"),
        ];
        values.sort_by(|a, b| a.total_cmp(b));
        assert_eq!(
            values,
            vec![
                Value::Null,
                Value::Float(1.5),
                Value::Int(2),
                Value::from("a"),
                Value::from("b"),
            ]
        );
    }

    #[test]
    fn test_coerce_rules() {
        assert_eq!(
            ValueType::Integer.coerce("size", Value::from("42")).unwrap(),
            Value::Int(42)
        );
        assert_eq!(
            ValueType::Boolean.coerce("enabled", Value::from("yes")).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            ValueType::String.coerce("name", Value::Int(7)).unwrap(),
            Value::from("7")
        );
        let err = ValueType::Integer
            .coerce("size", Value::from("big"))
            .unwrap_err();
        assert_eq!(err.kind(), "TypeError");
        assert!(ValueType::List.coerce("tags", Value::Int(1)).is_err());
    }

    #[test]
    fn test_whole_floats_narrow_only_within_range() {
        assert_eq!(
            ValueType::Integer.coerce("size", Value::Float(512.0)).unwrap(),
            Value::Int(512)
        );
        for x in [1e30, -1e30, 9.223372036854775807e18, f64::INFINITY, f64::NAN, 2.5] {
            let err = ValueType::Integer.coerce("size", Value::Float(x)).unwrap_err();
            assert_eq!(err.kind(), "TypeError", "{} should not narrow", x);
        }
    }

    #[test]
    fn test_deserialize_untagged() {
        let v: Value = serde_json::from_str(r#"{"a": [1, 2.5, null, true, "x"]}"#).unwrap();
        let Value::Dict(map) = v else {
            panic!("Expected dict");
        };
        assert_eq!(
            map["a"],
            Value::List(vec![
                Value::Int(1),
                Value::Float(2.5),
                Value::Null,
                Value::Bool(true),
                Value::from("x"),
            ])
        );
    }
}
