//! Scalar metadata values.
//!
//! SigMF fields are JSON, but the engine only ever stores scalars. Arrays and
//! objects are rejected at the boundary instead of being carried around as
//! opaque JSON.

use serde::de::{self, Deserialize, Deserializer, Visitor};
use serde::ser::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::MetaError;

/// Ordered key/value map used for global metadata and segment extras
pub type MetaMap = BTreeMap<String, MetaValue>;

#[derive(Debug, Clone, PartialEq)]
pub enum MetaValue {
    Null,
    Bool(bool),
    Int64(i64),
    UInt64(u64),
    Double(f64),
    String(String),
}

impl MetaValue {
    /// Name of the variant, used in error messages
    pub fn kind(&self) -> &'static str {
        match self {
            MetaValue::Null => "null",
            MetaValue::Bool(_) => "bool",
            MetaValue::Int64(_) => "int64",
            MetaValue::UInt64(_) => "uint64",
            MetaValue::Double(_) => "double",
            MetaValue::String(_) => "string",
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            MetaValue::Int64(v) => Some(v as f64),
            MetaValue::UInt64(v) => Some(v as f64),
            MetaValue::Double(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            MetaValue::Int64(v) if v >= 0 => Some(v as u64),
            MetaValue::UInt64(v) => Some(v),
            MetaValue::Double(v) if v >= 0.0 && v.fract() == 0.0 && v <= u64::MAX as f64 => {
                Some(v as u64)
            }
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetaValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Convert a JSON value, naming `key` in the error when it is not a scalar
    pub fn from_json(key: &str, value: serde_json::Value) -> Result<Self, MetaError> {
        use serde_json::Value;
        match value {
            Value::Null => Ok(MetaValue::Null),
            Value::Bool(b) => Ok(MetaValue::Bool(b)),
            Value::Number(n) => {
                if let Some(u) = n.as_u64() {
                    Ok(MetaValue::UInt64(u))
                } else if let Some(i) = n.as_i64() {
                    Ok(MetaValue::Int64(i))
                } else {
                    // serde_json numbers are always one of the three
                    Ok(MetaValue::Double(n.as_f64().unwrap_or(f64::NAN)))
                }
            }
            Value::String(s) => Ok(MetaValue::String(s)),
            Value::Array(_) => Err(MetaError::UnsupportedValue {
                key: key.to_string(),
                kind: "array".to_string(),
            }),
            Value::Object(_) => Err(MetaError::UnsupportedValue {
                key: key.to_string(),
                kind: "object".to_string(),
            }),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value;
        match self {
            MetaValue::Null => Value::Null,
            MetaValue::Bool(b) => Value::Bool(*b),
            MetaValue::Int64(i) => Value::from(*i),
            MetaValue::UInt64(u) => Value::from(*u),
            MetaValue::Double(d) => serde_json::Number::from_f64(*d)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            MetaValue::String(s) => Value::String(s.clone()),
        }
    }
}

impl TryFrom<serde_json::Value> for MetaValue {
    type Error = MetaError;

    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        MetaValue::from_json("<value>", value)
    }
}

impl From<bool> for MetaValue {
    fn from(v: bool) -> Self {
        MetaValue::Bool(v)
    }
}

impl From<i64> for MetaValue {
    fn from(v: i64) -> Self {
        MetaValue::Int64(v)
    }
}

impl From<u64> for MetaValue {
    fn from(v: u64) -> Self {
        MetaValue::UInt64(v)
    }
}

impl From<f64> for MetaValue {
    fn from(v: f64) -> Self {
        MetaValue::Double(v)
    }
}

impl From<&str> for MetaValue {
    fn from(v: &str) -> Self {
        MetaValue::String(v.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(v: String) -> Self {
        MetaValue::String(v)
    }
}

impl fmt::Display for MetaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetaValue::Null => write!(f, "null"),
            MetaValue::Bool(b) => write!(f, "{}", b),
            MetaValue::Int64(i) => write!(f, "{}", i),
            MetaValue::UInt64(u) => write!(f, "{}", u),
            MetaValue::Double(d) => write!(f, "{}", d),
            MetaValue::String(s) => write!(f, "{}", s),
        }
    }
}

impl Serialize for MetaValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            MetaValue::Null => serializer.serialize_unit(),
            MetaValue::Bool(b) => serializer.serialize_bool(*b),
            MetaValue::Int64(i) => serializer.serialize_i64(*i),
            MetaValue::UInt64(u) => serializer.serialize_u64(*u),
            MetaValue::Double(d) => serializer.serialize_f64(*d),
            MetaValue::String(s) => serializer.serialize_str(s),
        }
    }
}

struct MetaValueVisitor;

impl<'de> Visitor<'de> for MetaValueVisitor {
    type Value = MetaValue;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a scalar metadata value (null, bool, number or string)")
    }

    fn visit_unit<E: de::Error>(self) -> Result<MetaValue, E> {
        Ok(MetaValue::Null)
    }

    fn visit_none<E: de::Error>(self) -> Result<MetaValue, E> {
        Ok(MetaValue::Null)
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<MetaValue, E> {
        Ok(MetaValue::Bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<MetaValue, E> {
        if v >= 0 {
            Ok(MetaValue::UInt64(v as u64))
        } else {
            Ok(MetaValue::Int64(v))
        }
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<MetaValue, E> {
        Ok(MetaValue::UInt64(v))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<MetaValue, E> {
        Ok(MetaValue::Double(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<MetaValue, E> {
        Ok(MetaValue::String(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<MetaValue, E> {
        Ok(MetaValue::String(v))
    }
}

impl<'de> Deserialize<'de> for MetaValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(MetaValueVisitor)
    }
}

/// Look up a numeric field in a map
pub fn get_f64(map: &MetaMap, key: &str) -> Option<f64> {
    map.get(key).and_then(MetaValue::as_f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_number_variants() {
        let v: MetaValue = serde_json::from_str("18446744073709551615").unwrap();
        assert_eq!(v, MetaValue::UInt64(u64::MAX));
        let v: MetaValue = serde_json::from_str("-9223372036854775808").unwrap();
        assert_eq!(v, MetaValue::Int64(i64::MIN));
        let v: MetaValue = serde_json::from_str("1.0").unwrap();
        assert_eq!(v, MetaValue::Double(1.0));
        let v: MetaValue = serde_json::from_str("7").unwrap();
        assert_eq!(v, MetaValue::UInt64(7));
    }

    #[test]
    fn test_integer_stays_integer_on_write() {
        let text = serde_json::to_string(&MetaValue::UInt64(5)).unwrap();
        assert_eq!(text, "5");
        let text = serde_json::to_string(&MetaValue::Double(5.0)).unwrap();
        assert_eq!(text, "5.0");
    }

    #[test]
    fn test_rejects_nested() {
        assert!(matches!(
            MetaValue::from_json("core:hw", json!([1, 2])),
            Err(MetaError::UnsupportedValue { ref key, .. }) if key == "core:hw"
        ));
        assert!(serde_json::from_str::<MetaValue>("{\"a\": 1}").is_err());
    }

    #[test]
    fn test_empty_string_is_kept() {
        let v = MetaValue::from_json("core:author", json!("")).unwrap();
        assert_eq!(v, MetaValue::String(String::new()));
        assert_eq!(v.to_json(), json!(""));
    }

    #[test]
    fn test_as_u64() {
        assert_eq!(MetaValue::Int64(3).as_u64(), Some(3));
        assert_eq!(MetaValue::Int64(-3).as_u64(), None);
        assert_eq!(MetaValue::Double(4.0).as_u64(), Some(4));
        assert_eq!(MetaValue::Double(4.5).as_u64(), None);
        assert_eq!(MetaValue::from("x").as_u64(), None);
    }
}
