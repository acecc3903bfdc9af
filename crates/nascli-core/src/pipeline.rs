//! Post-processing stages applied to a [`ResultSet`] after `|`.
//!
//! Each stage takes its input by reference and returns a new table, so a
//! failing stage leaves nothing half-applied. `search` and `exclude` need
//! the evaluator for their predicates and live there; the stages here are
//! pure, and the age filters take the current time as an argument.

use std::cmp::Ordering;

use chrono::{DateTime, TimeDelta, Utc};

use crate::env::Environment;
use crate::error::{EvalErrorKind, ShellError};
use crate::output::{ResultSet, Row};
use crate::value::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub column: String,
    pub descending: bool,
}

impl SortKey {
    /// `name` sorts ascending, `-name` descending.
    pub fn parse(word: &str) -> Self {
        match word.strip_prefix('-') {
            Some(column) => Self {
                column: column.to_string(),
                descending: true,
            },
            None => Self {
                column: word.to_string(),
                descending: false,
            },
        }
    }

    /// `name=desc` / `name=asc` form.
    pub fn with_direction(column: &str, direction: &Value) -> Result<Self, ShellError> {
        let descending = match direction {
            Value::String(s) if s.eq_ignore_ascii_case("desc") => true,
            Value::String(s) if s.eq_ignore_ascii_case("asc") => false,
            Value::Bool(b) => *b,
            other => {
                return Err(ShellError::type_mismatch(format!(
                    "sort direction for {} must be asc or desc, got '{}'",
                    column, other
                )))
            }
        };
        Ok(Self {
            column: column.to_string(),
            descending,
        })
    }
}

fn unknown_column(column: &str) -> ShellError {
    ShellError::eval(EvalErrorKind::Key, format!("unknown column '{}'", column))
}

fn check_columns<'a>(
    input: &ResultSet,
    columns: impl IntoIterator<Item = &'a str>,
) -> Result<(), ShellError> {
    for column in columns {
        if !input.has_column(column) {
            return Err(unknown_column(column));
        }
    }
    Ok(())
}

/// Keep only `columns`, in the order given.
pub fn select(input: &ResultSet, columns: &[String]) -> Result<ResultSet, ShellError> {
    if columns.is_empty() {
        return Err(ShellError::arity("select needs at least one column"));
    }
    check_columns(input, columns.iter().map(String::as_str))?;
    let rows = input
        .rows
        .iter()
        .map(|row| {
            columns
                .iter()
                .map(|c| (c.clone(), row.get(c).cloned().unwrap_or(Value::Null)))
                .collect::<Row>()
        })
        .collect();
    Ok(ResultSet {
        columns: columns.to_vec(),
        rows,
    })
}

/// Stable multi-key sort.
pub fn sort(input: &ResultSet, keys: &[SortKey]) -> Result<ResultSet, ShellError> {
    if keys.is_empty() {
        return Err(ShellError::arity("sort needs at least one column"));
    }
    check_columns(input, keys.iter().map(|k| k.column.as_str()))?;
    let mut rows = input.rows.clone();
    rows.sort_by(|a, b| {
        for key in keys {
            let left = a.get(&key.column).unwrap_or(&Value::Null);
            let right = b.get(&key.column).unwrap_or(&Value::Null);
            let ord = left.total_cmp(right);
            let ord = if key.descending { ord.reverse() } else { ord };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
    Ok(ResultSet {
        columns: input.columns.clone(),
        rows,
    })
}

/// First `count` rows.
pub fn limit(input: &ResultSet, count: &Value) -> Result<ResultSet, ShellError> {
    let n = match count {
        Value::Int(n) if *n >= 0 => *n as usize,
        other => {
            return Err(ShellError::type_mismatch(format!(
                "limit expects a non-negative integer, got '{}'",
                other
            )))
        }
    };
    Ok(ResultSet {
        columns: input.columns.clone(),
        rows: input.rows.iter().take(n).cloned().collect(),
    })
}

/// Column read by `older_than`/`newer_than` when none is named.
pub const STARTED_AT: &str = "started_at";

/// Which side of the cutoff `filter_age` keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Age {
    /// At or before `now - span`.
    Older,
    /// At or after `now - span`.
    Newer,
}

/// A time span given as `H:MM`, `H:MM:SS` (`.` also separates) or a
/// number of seconds.
pub fn parse_span(value: &Value) -> Result<TimeDelta, ShellError> {
    let seconds = match value {
        Value::Int(n) if *n >= 0 => *n,
        Value::String(text) => {
            let fields: Vec<&str> = text.split([':', '.']).collect();
            let numbers: Option<Vec<i64>> = fields
                .iter()
                .map(|f| f.parse::<u32>().ok().map(i64::from))
                .collect();
            match numbers.as_deref() {
                Some([h, m]) => h * 3600 + m * 60,
                Some([h, m, s]) => h * 3600 + m * 60 + s,
                _ => {
                    return Err(ShellError::eval(
                        EvalErrorKind::Rejected,
                        format!("invalid time span '{}', expected H:MM or H:MM:SS", text),
                    ))
                }
            }
        }
        other => {
            return Err(ShellError::type_mismatch(format!(
                "time span must be 'H:MM[:SS]' or seconds, got {} '{}'",
                other.type_name(),
                other
            )))
        }
    };
    TimeDelta::try_seconds(seconds).ok_or_else(|| {
        ShellError::eval(EvalErrorKind::Overflow, format!("time span of {}s is too long", seconds))
    })
}

/// An RFC 3339 string or whole seconds since the epoch. `None` for null.
fn timestamp(column: &str, value: &Value) -> Result<Option<DateTime<Utc>>, ShellError> {
    match value {
        Value::Null => Ok(None),
        Value::String(text) => DateTime::parse_from_rfc3339(text)
            .map(|t| Some(t.with_timezone(&Utc)))
            .map_err(|e| {
                ShellError::type_mismatch(format!("{} '{}' is not a timestamp: {}", column, text, e))
            }),
        Value::Int(secs) => DateTime::from_timestamp(*secs, 0).map(Some).ok_or_else(|| {
            ShellError::eval(EvalErrorKind::Overflow, format!("{} {} is out of range", column, secs))
        }),
        other => Err(ShellError::type_mismatch(format!(
            "{} must be a timestamp, got {}",
            column,
            other.type_name()
        ))),
    }
}

/// Rows whose `column` time lies on the `age` side of `now - span`. Rows
/// without a time are dropped.
pub fn filter_age(
    input: &ResultSet,
    column: &str,
    age: Age,
    span: TimeDelta,
    now: DateTime<Utc>,
) -> Result<ResultSet, ShellError> {
    check_columns(input, [column])?;
    let cutoff = now.checked_sub_signed(span).unwrap_or(DateTime::<Utc>::MIN_UTC);
    let mut out = ResultSet::new(input.columns.clone());
    for row in &input.rows {
        let Some(at) = timestamp(column, row.get(column).unwrap_or(&Value::Null))? else {
            continue;
        };
        let keep = match age {
            Age::Older => at <= cutoff,
            Age::Newer => at >= cutoff,
        };
        if keep {
            out.rows.push(row.clone());
        }
    }
    Ok(out)
}

/// Bind each column of `row` as a variable in a fresh innermost scope.
/// The caller pops the scope.
pub fn bind_row(env: &mut Environment, row: &Row) {
    env.push_scope();
    for (column, value) in row {
        env.define(column, value.clone());
    }
}
