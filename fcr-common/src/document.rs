//! Decoded response bodies and dotted-path lookups.
//!
//! A [`ServerDocument`] is read-only once decoded. Paths are dot separated;
//! a segment that parses as an unsigned integer indexes into an array.
//! Keys that themselves contain dots (index names such as `.watches`) are
//! looked up with [`ServerDocument::get_key`] or [`eval_segments`].

use serde_json::{Map, Value};

use crate::errors::{DecodeError, PathError};

#[derive(Debug, Clone, PartialEq)]
pub struct ServerDocument {
    root: Value,
}

impl ServerDocument {
    /// Decode a raw response body.
    pub fn decode(raw: &[u8]) -> Result<Self, DecodeError> {
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Err(DecodeError::Empty);
        }
        let root = serde_json::from_slice(raw)?;
        Ok(Self { root })
    }

    pub fn from_value(root: Value) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Value {
        &self.root
    }

    pub fn into_value(self) -> Value {
        self.root
    }

    /// True for `{}` and `[]` bodies.
    pub fn is_empty(&self) -> bool {
        match &self.root {
            Value::Object(map) => map.is_empty(),
            Value::Array(items) => items.is_empty(),
            _ => false,
        }
    }

    /// Top-level keys in document order.
    pub fn keys(&self) -> Vec<&str> {
        match &self.root {
            Value::Object(map) => map.keys().map(String::as_str).collect(),
            _ => Vec::new(),
        }
    }

    pub fn eval(&self, path: &str) -> Result<&Value, PathError> {
        eval(path, &self.root)
    }

    /// Single top-level key lookup; dots in `key` are not separators.
    pub fn get_key(&self, key: &str) -> Result<&Value, PathError> {
        eval_segments(&[key], &self.root)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.eval(path).is_ok()
    }

    pub fn get_str(&self, path: &str) -> Result<&str, PathError> {
        as_str(path, self.eval(path)?)
    }

    pub fn get_i64(&self, path: &str) -> Result<i64, PathError> {
        as_i64(path, self.eval(path)?)
    }

    pub fn get_bool(&self, path: &str) -> Result<bool, PathError> {
        as_bool(path, self.eval(path)?)
    }

    pub fn get_object(&self, path: &str) -> Result<&Map<String, Value>, PathError> {
        as_object(path, self.eval(path)?)
    }

    pub fn get_array(&self, path: &str) -> Result<&Vec<Value>, PathError> {
        as_array(path, self.eval(path)?)
    }
}

/// Evaluate a dotted path against a value.
///
/// `eval("a.b.c", v) == eval("c", eval("a.b", v)?)` whenever the
/// intermediate result is traversable.
pub fn eval<'a>(path: &str, value: &'a Value) -> Result<&'a Value, PathError> {
    if path.is_empty() {
        return Ok(value);
    }
    let segments: Vec<&str> = path.split('.').collect();
    walk(path, &segments, value)
}

/// Evaluate pre-split segments, so individual keys may contain dots.
pub fn eval_segments<'a>(segments: &[&str], value: &'a Value) -> Result<&'a Value, PathError> {
    let path = segments.join(".");
    walk(&path, segments, value)
}

fn walk<'a>(path: &str, segments: &[&str], mut current: &'a Value) -> Result<&'a Value, PathError> {
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(*segment).ok_or_else(|| PathError::MissingSegment {
                path: path.to_string(),
                segment: segment.to_string(),
            })?,
            Value::Array(items) => {
                let index: usize = segment.parse().map_err(|_| PathError::NotTraversable {
                    path: path.to_string(),
                    segment: segment.to_string(),
                    found: "array",
                })?;
                items.get(index).ok_or_else(|| PathError::MissingSegment {
                    path: path.to_string(),
                    segment: segment.to_string(),
                })?
            }
            other => {
                return Err(PathError::NotTraversable {
                    path: path.to_string(),
                    segment: segment.to_string(),
                    found: type_name(other),
                });
            }
        };
    }
    Ok(current)
}

pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "float",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn mismatch(path: &str, expected: &'static str, value: &Value) -> PathError {
    PathError::TypeMismatch {
        path: path.to_string(),
        expected,
        found: format!("{} {}", type_name(value), value),
    }
}

pub fn as_str<'a>(path: &str, value: &'a Value) -> Result<&'a str, PathError> {
    value.as_str().ok_or_else(|| mismatch(path, "string", value))
}

pub fn as_i64(path: &str, value: &Value) -> Result<i64, PathError> {
    value.as_i64().ok_or_else(|| mismatch(path, "integer", value))
}

pub fn as_bool(path: &str, value: &Value) -> Result<bool, PathError> {
    value.as_bool().ok_or_else(|| mismatch(path, "boolean", value))
}

pub fn as_object<'a>(path: &str, value: &'a Value) -> Result<&'a Map<String, Value>, PathError> {
    value.as_object().ok_or_else(|| mismatch(path, "object", value))
}

pub fn as_array<'a>(path: &str, value: &'a Value) -> Result<&'a Vec<Value>, PathError> {
    value.as_array().ok_or_else(|| mismatch(path, "array", value))
}
