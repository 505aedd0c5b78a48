//! Values exchanged across the module boundary.
//!
//! The module speaks a loosely typed calling convention: arguments and results
//! are scalars, byte buffers or structured objects. [`HostValue`] captures that
//! shape without committing to a particular embedding runtime.

use bytes::Bytes;
use serde_json::Value as JsonValue;
use std::fmt;

/// A value passed to, or returned from, the sandboxed module.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum HostValue {
    /// Absent value (the member or result does not exist).
    #[default]
    Undefined,
    /// Explicit null.
    Null,
    Bool(bool),
    /// All numbers cross the boundary as doubles.
    Number(f64),
    String(String),
    /// Raw byte buffer (typed array on the module side).
    Bytes(Bytes),
    /// Structured object or array.
    Json(JsonValue),
}

impl HostValue {
    /// Returns `true` for `Undefined` and `Null`.
    pub fn is_nullish(&self) -> bool {
        matches!(self, Self::Undefined | Self::Null)
    }

    /// Truthiness as the module runtime evaluates it.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Undefined | Self::Null => false,
            Self::Bool(b) => *b,
            Self::Number(n) => *n != 0.0 && !n.is_nan(),
            Self::String(s) => !s.is_empty(),
            Self::Bytes(_) => true,
            Self::Json(value) => json_truthy(value),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            Self::Json(JsonValue::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Json(JsonValue::Number(n)) => n.as_f64(),
            _ => None,
        }
    }

    /// Interprets the value as a non-negative integer.
    ///
    /// Fractional or negative numbers yield `None`.
    pub fn as_u64(&self) -> Option<u64> {
        let n = self.as_f64()?;
        if n.is_finite() && n >= 0.0 && n.fract() == 0.0 && n <= u64::MAX as f64 {
            Some(n as u64)
        } else {
            None
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Json(JsonValue::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    /// Returns the value as a byte buffer.
    ///
    /// Accepts raw bytes as well as JSON arrays of byte-sized integers, which is
    /// how typed arrays look after a structured-clone round trip.
    pub fn to_bytes(&self) -> Option<Bytes> {
        match self {
            Self::Bytes(bytes) => Some(bytes.clone()),
            Self::Json(JsonValue::Array(items)) => items
                .iter()
                .map(|item| item.as_u64().and_then(|b| u8::try_from(b).ok()))
                .collect::<Option<Vec<u8>>>()
                .map(Bytes::from),
            _ => None,
        }
    }

    /// Looks up a field on a structured object.
    pub fn field(&self, name: &str) -> Option<&JsonValue> {
        match self {
            Self::Json(JsonValue::Object(map)) => map.get(name),
            _ => None,
        }
    }

    /// Extracts the module's failure signal.
    ///
    /// The module cannot raise exceptions across the boundary, so it reports
    /// failure by resolving with an object carrying a truthy `error` field.
    /// Returns that whole object as the payload.
    pub fn error_payload(&self) -> Option<HostValue> {
        match self.field("error") {
            Some(err) if json_truthy(err) => Some(self.clone()),
            _ => None,
        }
    }

    /// Converts into a JSON value for logging or serialization.
    pub fn to_json(&self) -> JsonValue {
        match self {
            Self::Undefined | Self::Null => JsonValue::Null,
            Self::Bool(b) => JsonValue::Bool(*b),
            Self::Number(n) => serde_json::Number::from_f64(*n)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            Self::String(s) => JsonValue::String(s.clone()),
            Self::Bytes(bytes) => JsonValue::Array(
                bytes.iter().map(|b| JsonValue::from(*b)).collect(),
            ),
            Self::Json(value) => value.clone(),
        }
    }

    /// Short type label used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Bytes(_) => "bytes",
            Self::Json(JsonValue::Array(_)) => "array",
            Self::Json(_) => "object",
        }
    }
}

fn json_truthy(value: &JsonValue) -> bool {
    match value {
        JsonValue::Null => false,
        JsonValue::Bool(b) => *b,
        JsonValue::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(true),
        JsonValue::String(s) => !s.is_empty(),
        JsonValue::Array(_) | JsonValue::Object(_) => true,
    }
}

impl fmt::Display for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => write!(f, "undefined"),
            Self::Bytes(bytes) => write!(f, "<{} bytes>", bytes.len()),
            Self::String(s) => write!(f, "{}", s),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

impl From<bool> for HostValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for HostValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<u32> for HostValue {
    fn from(value: u32) -> Self {
        Self::Number(value as f64)
    }
}

impl From<u64> for HostValue {
    fn from(value: u64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<i64> for HostValue {
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<&str> for HostValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for HostValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<Bytes> for HostValue {
    fn from(value: Bytes) -> Self {
        Self::Bytes(value)
    }
}

impl From<Vec<u8>> for HostValue {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(value))
    }
}

impl From<JsonValue> for HostValue {
    fn from(value: JsonValue) -> Self {
        Self::Json(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_payload_requires_truthy_field() {
        let failed = HostValue::Json(json!({"error": "allocation not found"}));
        assert_eq!(failed.error_payload(), Some(failed.clone()));

        let empty = HostValue::Json(json!({"error": "", "url": "blob:x"}));
        assert!(empty.error_payload().is_none());

        let null = HostValue::Json(json!({"error": null}));
        assert!(null.error_payload().is_none());

        assert!(HostValue::String("error".into()).error_payload().is_none());
    }

    #[test]
    fn test_to_bytes_accepts_json_arrays() {
        let value = HostValue::Json(json!([1, 2, 255]));
        assert_eq!(value.to_bytes(), Some(Bytes::from_static(&[1, 2, 255])));

        let overflow = HostValue::Json(json!([256]));
        assert!(overflow.to_bytes().is_none());
    }

    #[test]
    fn test_as_u64_rejects_fractions() {
        assert_eq!(HostValue::Number(42.0).as_u64(), Some(42));
        assert_eq!(HostValue::Number(1.5).as_u64(), None);
        assert_eq!(HostValue::Number(-1.0).as_u64(), None);
        assert_eq!(HostValue::Json(json!(7)).as_u64(), Some(7));
    }

    #[test]
    fn test_truthiness() {
        assert!(!HostValue::Undefined.is_truthy());
        assert!(!HostValue::Number(0.0).is_truthy());
        assert!(HostValue::Bytes(Bytes::new()).is_truthy());
        assert!(HostValue::Json(json!({})).is_truthy());
    }
}
