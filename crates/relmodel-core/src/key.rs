//! Lookup keys.
//!
//! Matching a related record to its primary record compares link attribute
//! values. Values are not hashable (floats, JSON), so they are first encoded
//! into a [`LookupKey`]: a canonical, hashable form where equal keys mean
//! "these records belong together".
//!
//! Encoding rules:
//!
//! - integer widths are normalised (`Int(1)` and `BigInt(1)` are equal), and
//!   so are floats holding an exact integer;
//! - text and numbers stay distinct (`"1"` never equals `1`);
//! - a single scalar attribute encodes to [`LookupKey::Single`];
//! - several attributes, or one non-scalar attribute, encode to
//!   [`LookupKey::Composite`] in attribute order;
//! - a missing attribute encodes as null.

use crate::record::RecordView;
use crate::value::Value;
use std::fmt;

/// Canonical, hashable form of one attribute value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyPart {
    Null,
    Bool(bool),
    Int(i64),
    /// IEEE-754 bits with `-0.0` folded into `0.0`.
    Float(u64),
    Decimal(String),
    Text(String),
    Bytes(Vec<u8>),
    Uuid([u8; 16]),
    /// Compact JSON text.
    Json(String),
    Array(Vec<KeyPart>),
}

impl KeyPart {
    pub fn is_null(&self) -> bool {
        matches!(self, KeyPart::Null)
    }

    /// Turn the part back into a value suitable for a query condition.
    pub fn to_value(&self) -> Value {
        match self {
            KeyPart::Null => Value::Null,
            KeyPart::Bool(b) => Value::Bool(*b),
            KeyPart::Int(i) => Value::BigInt(*i),
            KeyPart::Float(bits) => Value::Double(f64::from_bits(*bits)),
            KeyPart::Decimal(s) => Value::Decimal(s.clone()),
            KeyPart::Text(s) => Value::Text(s.clone()),
            KeyPart::Bytes(b) => Value::Bytes(b.clone()),
            KeyPart::Uuid(u) => Value::Uuid(*u),
            KeyPart::Json(s) => serde_json::from_str(s).map_or(Value::Null, Value::Json),
            KeyPart::Array(parts) => Value::Array(parts.iter().map(KeyPart::to_value).collect()),
        }
    }
}

fn float_part(f: f64) -> KeyPart {
    if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        return KeyPart::Int(f as i64);
    }
    let f = if f == 0.0 { 0.0 } else { f };
    KeyPart::Float(f.to_bits())
}

/// Encode a single value.
pub fn encode_value(value: &Value) -> KeyPart {
    match value {
        Value::Null => KeyPart::Null,
        Value::Bool(b) => KeyPart::Bool(*b),
        Value::TinyInt(i) => KeyPart::Int(i64::from(*i)),
        Value::SmallInt(i) => KeyPart::Int(i64::from(*i)),
        Value::Int(i) => KeyPart::Int(i64::from(*i)),
        Value::BigInt(i) => KeyPart::Int(*i),
        Value::Float(f) => float_part(f64::from(*f)),
        Value::Double(f) => float_part(*f),
        Value::Decimal(s) => KeyPart::Decimal(s.clone()),
        Value::Text(s) => KeyPart::Text(s.clone()),
        Value::Bytes(b) => KeyPart::Bytes(b.clone()),
        Value::Uuid(u) => KeyPart::Uuid(*u),
        Value::Json(j) => KeyPart::Json(j.to_string()),
        Value::Array(items) => KeyPart::Array(items.iter().map(encode_value).collect()),
    }
}

/// Hashable key identifying a record by some of its attributes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LookupKey {
    Single(KeyPart),
    Composite(Vec<KeyPart>),
}

impl LookupKey {
    /// Build a key from already-extracted attribute values.
    pub fn from_values<'a, I>(values: I) -> Self
    where
        I: IntoIterator<Item = &'a Value>,
    {
        let values: Vec<&Value> = values.into_iter().collect();
        match values.as_slice() {
            [value] if value.is_scalar() => LookupKey::Single(encode_value(value)),
            _ => LookupKey::Composite(values.iter().map(|v| encode_value(v)).collect()),
        }
    }

    /// The key parts in attribute order.
    pub fn parts(&self) -> &[KeyPart] {
        match self {
            LookupKey::Single(part) => std::slice::from_ref(part),
            LookupKey::Composite(parts) => parts,
        }
    }

    /// Whether the key can match anything.
    ///
    /// A key with a null part never matches: null is not equal to null.
    pub fn is_matchable(&self) -> bool {
        !self.parts().iter().any(KeyPart::is_null)
    }

    /// The key parts as values, for building query conditions.
    pub fn to_values(&self) -> Vec<Value> {
        self.parts().iter().map(KeyPart::to_value).collect()
    }
}

impl fmt::Display for LookupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let values: Vec<String> = self
            .to_values()
            .iter()
            .map(|v| v.to_json().to_string())
            .collect();
        write!(f, "({})", values.join(", "))
    }
}

/// Encode the listed attributes of a record.
pub fn encode(record: &dyn RecordView, attributes: &[&str]) -> LookupKey {
    LookupKey::from_values(
        attributes
            .iter()
            .map(|name| record.attribute(name).unwrap_or(&Value::Null)),
    )
}
