//! Cell values.
//!
//! `Value` carries a total order (Null first, NaN after every other float,
//! then by type) so it can key group maps and sort view output directly.

use crate::types::DataType;
use core::cmp::Ordering;
use core::fmt;
use core::hash::{Hash, Hasher};
use serde::{Deserialize, Serialize};

/// A value that can be stored in a table cell.
///
/// Serializes untagged, so JSON `null`, numbers, strings and booleans map
/// directly onto the variants. Timestamps travel as integer milliseconds.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Null value
    Null,
    /// 64-bit signed integer
    Integer(i64),
    /// 64-bit floating point
    Float(f64),
    /// UTF-8 string
    String(String),
    /// Boolean value
    Boolean(bool),
    /// Timestamp stored as Unix milliseconds
    Timestamp(i64),
}

impl Value {
    /// Returns the data type of this value, or None if it's Null.
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Value::Null => None,
            Value::Integer(_) => Some(DataType::Integer),
            Value::Float(_) => Some(DataType::Float),
            Value::String(_) => Some(DataType::String),
            Value::Boolean(_) => Some(DataType::Boolean),
            Value::Timestamp(_) => Some(DataType::Timestamp),
        }
    }

    /// Returns true if this value is Null.
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the boolean value if this is a Boolean, None otherwise.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the i64 value if this is an Integer, None otherwise.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the f64 value if this is a Float, None otherwise.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns a reference to the string if this is a String, None otherwise.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(v) => Some(v.as_str()),
            _ => None,
        }
    }

    /// Returns the milliseconds if this is a Timestamp, None otherwise.
    pub fn as_timestamp(&self) -> Option<i64> {
        match self {
            Value::Timestamp(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric view of Integer and Float values.
    pub fn to_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Converts this value into one storable in a column of type `dt`.
    ///
    /// Null fits every column. Integers widen into Float and Timestamp
    /// columns; any other cross-type value is rejected with `None`.
    pub fn coerce_to(self, dt: DataType) -> Option<Value> {
        match (self, dt) {
            (Value::Null, _) => Some(Value::Null),
            (Value::Integer(v), DataType::Integer) => Some(Value::Integer(v)),
            (Value::Integer(v), DataType::Float) => Some(Value::Float(v as f64)),
            (Value::Integer(v), DataType::Timestamp) => Some(Value::Timestamp(v)),
            (Value::Float(v), DataType::Float) => Some(Value::Float(v)),
            (Value::String(v), DataType::String) => Some(Value::String(v)),
            (Value::Boolean(v), DataType::Boolean) => Some(Value::Boolean(v)),
            (Value::Timestamp(v), DataType::Timestamp) => Some(Value::Timestamp(v)),
            _ => None,
        }
    }

    /// Returns a type ordering value for comparing different types.
    fn type_order(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Boolean(_) => 1,
            Value::Integer(_) => 2,
            Value::Float(_) => 3,
            Value::String(_) => 4,
            Value::Timestamp(_) => 5,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => {
                // Handle NaN comparison
                if a.is_nan() && b.is_nan() {
                    true
                } else {
                    a == b
                }
            }
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Timestamp(a), Value::Timestamp(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        core::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Integer(i) => i.hash(state),
            Value::Float(f) => canonical_bits(*f).hash(state),
            Value::String(s) => s.hash(state),
            Value::Boolean(b) => b.hash(state),
            Value::Timestamp(t) => t.hash(state),
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Null, _) => Ordering::Less,
            (_, Value::Null) => Ordering::Greater,
            (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
            (Value::Integer(a), Value::Integer(b)) => a.cmp(b),
            // Equal magnitudes still differ by type, as they do for `eq`.
            (Value::Integer(a), Value::Float(b)) => cmp_f64(*a as f64, *b).then(Ordering::Less),
            (Value::Float(a), Value::Integer(b)) => cmp_f64(*a, *b as f64).then(Ordering::Greater),
            (Value::Float(a), Value::Float(b)) => cmp_f64(*a, *b),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Timestamp(a), Value::Timestamp(b)) => a.cmp(b),
            // Different types: order by type discriminant
            _ => self.type_order().cmp(&other.type_order()),
        }
    }
}

/// Bits of `f` with `-0.0` folded into `0.0` and every NaN into one
/// pattern, matching float equality.
fn canonical_bits(f: f64) -> u64 {
    if f.is_nan() {
        f64::NAN.to_bits()
    } else if f == 0.0 {
        0
    } else {
        f.to_bits()
    }
}

/// NaN sorts above every other float.
fn cmp_f64(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Integer(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::String(v) => f.write_str(v),
            Value::Boolean(v) => write!(f, "{v}"),
            Value::Timestamp(v) => write!(f, "@{v}"),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_type_of_cells() {
        assert_eq!(Value::Integer(42).data_type(), Some(DataType::Integer));
        assert_eq!(Value::Timestamp(0).data_type(), Some(DataType::Timestamp));
        assert_eq!(Value::Null.data_type(), None);
    }

    #[test]
    fn test_accessors_by_type() {
        assert_eq!(Value::Boolean(true).as_bool(), Some(true));
        assert_eq!(Value::Integer(100).as_i64(), Some(100));
        assert_eq!(Value::Float(2.5).as_f64(), Some(2.5));
        assert_eq!(Value::String("hello".into()).as_str(), Some("hello"));
        assert_eq!(Value::Timestamp(1234567890).as_timestamp(), Some(1234567890));
        assert_eq!(Value::Integer(3).to_f64(), Some(3.0));
        assert_eq!(Value::String("3".into()).to_f64(), None);
    }

    #[test]
    fn test_coerce() {
        assert_eq!(Value::Integer(2).coerce_to(DataType::Float), Some(Value::Float(2.0)));
        assert_eq!(Value::Integer(7).coerce_to(DataType::Timestamp), Some(Value::Timestamp(7)));
        assert_eq!(Value::Null.coerce_to(DataType::Boolean), Some(Value::Null));
        assert_eq!(Value::Float(1.5).coerce_to(DataType::Integer), None);
        assert_eq!(Value::from("x").coerce_to(DataType::Integer), None);
    }

    #[test]
    fn test_total_order() {
        assert!(Value::Integer(1) < Value::Integer(2));
        assert!(Value::Integer(1) < Value::Float(1.5));
        assert!(Value::Float(f64::NAN) > Value::Float(1e300));
        assert!(Value::String("a".into()) < Value::String("b".into()));
        assert!(Value::Null < Value::Integer(0));
    }

    #[test]
    fn test_nan_equals_nan() {
        assert_eq!(Value::Float(f64::NAN), Value::Float(f64::NAN));
        assert_ne!(Value::Integer(42), Value::Timestamp(42));
    }

    fn hash_of(value: &Value) -> u64 {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        value.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn test_equal_floats_hash_alike() {
        assert_eq!(Value::Float(0.0), Value::Float(-0.0));
        assert_eq!(hash_of(&Value::Float(0.0)), hash_of(&Value::Float(-0.0)));
        let other_nan = f64::from_bits(f64::NAN.to_bits() | 1);
        assert_eq!(hash_of(&Value::Float(f64::NAN)), hash_of(&Value::Float(other_nan)));
        assert_eq!(hash_of(&Value::Float(-f64::NAN)), hash_of(&Value::Float(f64::NAN)));
    }

    #[test]
    fn test_order_agrees_with_equality() {
        let pairs = [
            (Value::Integer(1), Value::Float(1.0)),
            (Value::Integer(0), Value::Float(-0.0)),
            (Value::Float(0.0), Value::Float(-0.0)),
            (Value::Integer(2), Value::Float(1.5)),
        ];
        for (a, b) in pairs {
            assert_eq!(a.cmp(&b) == Ordering::Equal, a == b, "{a:?} vs {b:?}");
            assert_eq!(a.cmp(&b), b.cmp(&a).reverse());
        }
        assert!(Value::Integer(1) < Value::Float(1.0));
        assert!(Value::Float(1.0) < Value::Integer(2));
    }

    #[test]
    fn test_json_untagged() {
        let values: Vec<Value> = serde_json::from_str(r#"[null, 3, 2.5, "x", true]"#).unwrap();
        assert_eq!(
            values,
            vec![
                Value::Null,
                Value::Integer(3),
                Value::Float(2.5),
                Value::from("x"),
                Value::Boolean(true)
            ]
        );
        assert_eq!(serde_json::to_string(&Value::Timestamp(5)).unwrap(), "5");
    }
}
