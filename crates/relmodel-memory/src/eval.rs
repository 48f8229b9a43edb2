//! Condition evaluation and ordering over stored rows.
//!
//! Evaluation is pure: no schema access and no validation. A comparison
//! that is not defined (a missing column, a null operand) is a non-match,
//! mirroring SQL three-valued logic collapsed to `false`.

use relmodel_core::query::{Condition, Direction, OrderBy};
use relmodel_core::{Row, Value, encode_value};
use std::cmp::Ordering;

/// Result of reading a column from a row during evaluation.
#[derive(Debug, Clone, PartialEq)]
enum FieldPresence<'a> {
    /// Column exists; the value may be `Value::Null`.
    Present(&'a Value),
    /// Column is not present on the row.
    Missing,
}

fn field<'a>(row: &'a Row, name: &str) -> FieldPresence<'a> {
    match row.get_by_name(name) {
        Some(value) => FieldPresence::Present(value),
        None => FieldPresence::Missing,
    }
}

/// SQL equality: `None` when either side is null.
fn compare_eq(actual: &Value, expected: &Value) -> Option<bool> {
    if actual.is_null() || expected.is_null() {
        return None;
    }
    Some(encode_value(actual) == encode_value(expected))
}

fn eq_present(row: &Row, column: &str, expected: &Value) -> bool {
    match field(row, column) {
        FieldPresence::Present(actual) => compare_eq(actual, expected).unwrap_or(false),
        FieldPresence::Missing => false,
    }
}

/// Evaluate a condition against a single row.
pub(crate) fn eval(row: &Row, condition: &Condition) -> bool {
    match condition {
        Condition::Eq(column, value) => eq_present(row, column, value),
        Condition::In { columns, values } => values.iter().any(|tuple| {
            tuple.len() == columns.len()
                && columns
                    .iter()
                    .zip(tuple)
                    .all(|(column, value)| eq_present(row, column, value))
        }),
        Condition::IsNull(column) => {
            matches!(field(row, column), FieldPresence::Present(Value::Null))
        }
        Condition::NotNull(column) => {
            matches!(field(row, column), FieldPresence::Present(v) if !v.is_null())
        }
        Condition::And(children) => children.iter().all(|child| eval(row, child)),
        Condition::Or(children) => children.iter().any(|child| eval(row, child)),
        Condition::Not(inner) => !eval(row, inner),
    }
}

/// Evaluate a conjunction of conditions.
pub(crate) fn eval_all(row: &Row, conditions: &[Condition]) -> bool {
    conditions.iter().all(|c| eval(row, c))
}

fn rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::TinyInt(_)
        | Value::SmallInt(_)
        | Value::Int(_)
        | Value::BigInt(_)
        | Value::Float(_)
        | Value::Double(_)
        | Value::Decimal(_) => 2,
        Value::Text(_) => 3,
        Value::Bytes(_) | Value::Uuid(_) => 4,
        Value::Json(_) | Value::Array(_) => 5,
    }
}

/// Total order over values; nulls sort first.
pub(crate) fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Text(x), Value::Text(y)) => x.cmp(y),
        (Value::Bytes(x), Value::Bytes(y)) => x.cmp(y),
        (Value::Uuid(x), Value::Uuid(y)) => x.cmp(y),
        _ if rank(a) == 2 && rank(b) == 2 => match (a.as_i64(), b.as_i64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => {
                let x = a.as_f64().unwrap_or(f64::NAN);
                let y = b.as_f64().unwrap_or(f64::NAN);
                x.total_cmp(&y)
            }
        },
        _ if rank(a) == rank(b) => encode_value(a).cmp(&encode_value(b)),
        _ => rank(a).cmp(&rank(b)),
    }
}

/// Stable sort by ORDER BY terms; a missing column sorts as null.
pub(crate) fn sort_rows(rows: &mut [Row], order_by: &[OrderBy]) {
    if order_by.is_empty() {
        return;
    }
    rows.sort_by(|a, b| {
        for term in order_by {
            let x = a.get_by_name(&term.column).unwrap_or(&Value::Null);
            let y = b.get_by_name(&term.column).unwrap_or(&Value::Null);
            let ord = match term.direction {
                Direction::Asc => compare_values(x, y),
                Direction::Desc => compare_values(y, x),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
}
