//! The unit of data flowing between stages: an ordered key plus a
//! schemaless map of named values, self-describing on the wire.

use std::collections::HashMap;

use crate::error::Result;

mod codec;

/// Field name used when a bare value is lifted into a row.
pub const DEFAULT_FIELD: &str = "value";

/// A dynamically-typed value stored in a [`Row`].
///
/// The tagged-union shape mirrors the wire codec: every variant has its own
/// tag byte, so a value decodes without outside schema knowledge.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Bytes(Vec<u8>),
    String(String),
    List(Vec<Value>),
    Map(HashMap<String, Value>),
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

impl From<HashMap<String, Value>> for Value {
    fn from(v: HashMap<String, Value>) -> Self {
        Value::Map(v)
    }
}

/// One row of data.
///
/// The key is always present but may be empty; values may be absent. Rows
/// are created at a source or by a transformation, routed per row by the
/// stage's partitioner, and consumed by the downstream stage.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    pub key: String,
    pub values: HashMap<String, Value>,
}

impl Row {
    /// Create an empty row with the given key.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            values: HashMap::new(),
        }
    }

    /// Builder-style field insertion.
    pub fn with_field(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(field.into(), value.into());
        self
    }

    /// Lift a bare value into a row with an empty key, stored under
    /// [`DEFAULT_FIELD`].
    pub fn value(v: impl Into<Value>) -> Self {
        Row::new("").with_field(DEFAULT_FIELD, v)
    }

    /// A keyed row holding one value under [`DEFAULT_FIELD`].
    pub fn key_value(key: impl Into<String>, v: impl Into<Value>) -> Self {
        Row::new(key).with_field(DEFAULT_FIELD, v)
    }

    /// Look up a named value.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }

    /// One row per element of a sequence, each with an empty key and the
    /// element under [`DEFAULT_FIELD`].
    pub fn from_list<V>(values: impl IntoIterator<Item = V>) -> Vec<Row>
    where
        V: Into<Value>,
    {
        values.into_iter().map(Row::value).collect()
    }

    /// Rows from a keyed mapping: each entry yields one row with the entry
    /// key as row key. An entry whose value is a [`Value::List`] fans out to
    /// one row per element, all sharing the entry key, in element order.
    /// Cross-key order follows the input iterator.
    pub fn from_map<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Vec<Row>
    where
        K: Into<String>,
        V: Into<Value>,
    {
        let mut rows = Vec::new();
        for (k, v) in entries {
            let key = k.into();
            match v.into() {
                Value::List(items) => {
                    for item in items {
                        rows.push(Row::key_value(key.clone(), item));
                    }
                }
                value => rows.push(Row::key_value(key, value)),
            }
        }
        rows
    }

    /// Overlay another row's values onto this one; colliding fields take the
    /// other row's value. The receiver's key is kept.
    pub fn merge(mut self, other: Row) -> Row {
        self.values.extend(other.values);
        self
    }

    /// Encode the row with the self-describing binary codec.
    ///
    /// Encoding cannot fail: a row is always representable on the wire.
    pub fn encode(&self) -> Vec<u8> {
        codec::encode_row(self)
    }

    /// Decode a row previously produced by [`Row::encode`].
    pub fn decode(data: &[u8]) -> Result<Row> {
        codec::decode_row(data)
    }
}

#[cfg(test)]
#[path = "tests/row_tests.rs"]
mod tests;
