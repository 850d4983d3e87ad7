//! Database value types
//!
//! Values bound as parameters and read back from rows, plus the conversions that let
//! rows flow into caller types through `serde`.

use super::error::{DatabaseError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Database value that can hold different types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DatabaseValue {
    /// Null value
    Null,
    /// Boolean value
    Bool(bool),
    /// 32-bit integer
    Int(i32),
    /// 64-bit integer
    Long(i64),
    /// 32-bit floating point
    Float(f32),
    /// 64-bit floating point
    Double(f64),
    /// String value
    String(String),
    /// Binary data
    Bytes(Vec<u8>),
    /// Timestamp (Unix timestamp in microseconds)
    Timestamp(i64),
}

impl DatabaseValue {
    /// Get the value as a boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            DatabaseValue::Bool(v) => Some(*v),
            DatabaseValue::Int(v) => Some(*v != 0),
            DatabaseValue::Long(v) => Some(*v != 0),
            _ => None,
        }
    }

    /// Get the value as an i64
    pub fn as_long(&self) -> Option<i64> {
        match self {
            DatabaseValue::Long(v) | DatabaseValue::Timestamp(v) => Some(*v),
            DatabaseValue::Int(v) => Some(i64::from(*v)),
            DatabaseValue::String(s) => s.parse().ok(),
            DatabaseValue::Bool(v) => Some(i64::from(*v)),
            _ => None,
        }
    }

    /// Get the value as an f64
    pub fn as_double(&self) -> Option<f64> {
        match self {
            DatabaseValue::Double(v) => Some(*v),
            DatabaseValue::Float(v) => Some(f64::from(*v)),
            DatabaseValue::Int(v) => Some(f64::from(*v)),
            DatabaseValue::Long(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Borrow the value as a string slice (String values only)
    pub fn as_str(&self) -> Option<&str> {
        match self {
            DatabaseValue::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Get the value as bytes
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            DatabaseValue::Bytes(b) => Some(b),
            DatabaseValue::String(s) => Some(s.as_bytes()),
            _ => None,
        }
    }

    /// Check if the value is null
    pub fn is_null(&self) -> bool {
        matches!(self, DatabaseValue::Null)
    }

    /// Get the type name of this value
    pub fn type_name(&self) -> &'static str {
        match self {
            DatabaseValue::Null => "null",
            DatabaseValue::Bool(_) => "bool",
            DatabaseValue::Int(_) => "int",
            DatabaseValue::Long(_) => "long",
            DatabaseValue::Float(_) => "float",
            DatabaseValue::Double(_) => "double",
            DatabaseValue::String(_) => "string",
            DatabaseValue::Bytes(_) => "bytes",
            DatabaseValue::Timestamp(_) => "timestamp",
        }
    }

    /// Append an unambiguous encoding of this value to a fingerprint buffer.
    ///
    /// Every value starts with a type tag; variable-length payloads are length
    /// prefixed, so no two distinct values share an encoding. Integers are
    /// widened to 64 bits first since both widths bind the same parameter.
    pub(crate) fn encode_key(&self, out: &mut Vec<u8>) {
        match self {
            DatabaseValue::Null => out.push(0),
            DatabaseValue::Bool(v) => {
                out.push(1);
                out.push(u8::from(*v));
            }
            DatabaseValue::Int(v) => {
                out.push(3);
                out.extend_from_slice(&i64::from(*v).to_be_bytes());
            }
            DatabaseValue::Long(v) => {
                out.push(3);
                out.extend_from_slice(&v.to_be_bytes());
            }
            DatabaseValue::Float(v) => {
                out.push(4);
                out.extend_from_slice(&v.to_bits().to_be_bytes());
            }
            DatabaseValue::Double(v) => {
                out.push(5);
                out.extend_from_slice(&v.to_bits().to_be_bytes());
            }
            DatabaseValue::String(s) => {
                out.push(6);
                encode_bytes(s.as_bytes(), out);
            }
            DatabaseValue::Bytes(b) => {
                out.push(7);
                encode_bytes(b, out);
            }
            DatabaseValue::Timestamp(v) => {
                out.push(8);
                out.extend_from_slice(&v.to_be_bytes());
            }
        }
    }

    /// Convert to a plain JSON value (no enum tagging)
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value;
        match self {
            DatabaseValue::Null => Value::Null,
            DatabaseValue::Bool(v) => Value::Bool(*v),
            DatabaseValue::Int(v) => Value::from(*v),
            DatabaseValue::Long(v) | DatabaseValue::Timestamp(v) => Value::from(*v),
            DatabaseValue::Float(v) => serde_json::Number::from_f64(f64::from(*v))
                .map(Value::Number)
                .unwrap_or(Value::Null),
            DatabaseValue::Double(v) => serde_json::Number::from_f64(*v)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            DatabaseValue::String(s) => Value::String(s.clone()),
            DatabaseValue::Bytes(b) => Value::from(b.clone()),
        }
    }

    /// Convert from a plain JSON value.
    ///
    /// Arrays and objects are stored as their JSON text.
    pub fn from_json(value: serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => DatabaseValue::Null,
            Value::Bool(v) => DatabaseValue::Bool(v),
            Value::Number(n) => match n.as_i64() {
                Some(v) => DatabaseValue::Long(v),
                None => n
                    .as_f64()
                    .map(DatabaseValue::Double)
                    .unwrap_or(DatabaseValue::Null),
            },
            Value::String(s) => DatabaseValue::String(s),
            other => DatabaseValue::String(other.to_string()),
        }
    }
}

pub(crate) fn encode_bytes(bytes: &[u8], out: &mut Vec<u8>) {
    out.extend_from_slice(&(bytes.len() as u64).to_be_bytes());
    out.extend_from_slice(bytes);
}

impl From<bool> for DatabaseValue {
    fn from(v: bool) -> Self {
        DatabaseValue::Bool(v)
    }
}

impl From<i32> for DatabaseValue {
    fn from(v: i32) -> Self {
        DatabaseValue::Int(v)
    }
}

impl From<i64> for DatabaseValue {
    fn from(v: i64) -> Self {
        DatabaseValue::Long(v)
    }
}

impl From<f32> for DatabaseValue {
    fn from(v: f32) -> Self {
        DatabaseValue::Float(v)
    }
}

impl From<f64> for DatabaseValue {
    fn from(v: f64) -> Self {
        DatabaseValue::Double(v)
    }
}

impl From<String> for DatabaseValue {
    fn from(v: String) -> Self {
        DatabaseValue::String(v)
    }
}

impl From<&str> for DatabaseValue {
    fn from(v: &str) -> Self {
        DatabaseValue::String(v.to_string())
    }
}

impl From<Vec<u8>> for DatabaseValue {
    fn from(v: Vec<u8>) -> Self {
        DatabaseValue::Bytes(v)
    }
}

impl<T: Into<DatabaseValue>> From<Option<T>> for DatabaseValue {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => DatabaseValue::Null,
        }
    }
}

/// A row of database results (column name -> value mapping)
pub type DatabaseRow = HashMap<String, DatabaseValue>;

/// Multiple rows returned from a query
pub type DatabaseResult = Vec<DatabaseRow>;

/// Deserialize a row into a caller type, matching columns to field names
pub fn from_row<T: DeserializeOwned>(row: &DatabaseRow) -> Result<T> {
    let object: serde_json::Map<String, serde_json::Value> = row
        .iter()
        .map(|(column, value)| (column.clone(), value.to_json()))
        .collect();
    serde_json::from_value(serde_json::Value::Object(object))
        .map_err(|e| DatabaseError::serialization(format!("cannot decode row: {}", e)))
}

/// Deserialize every row of a result
pub fn from_rows<T: DeserializeOwned>(rows: &[DatabaseRow]) -> Result<Vec<T>> {
    rows.iter().map(from_row).collect()
}

/// Ordered column/value pairs written by inserts and updates
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    columns: Vec<String>,
    values: Vec<DatabaseValue>,
}

impl Record {
    /// Create an empty record
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a column value; a column set twice keeps its first position
    #[must_use]
    pub fn set(mut self, column: &str, value: impl Into<DatabaseValue>) -> Self {
        let value = value.into();
        match self.columns.iter().position(|c| c == column) {
            Some(idx) => self.values[idx] = value,
            None => {
                self.columns.push(column.to_string());
                self.values.push(value);
            }
        }
        self
    }

    /// Build a record from any struct serializing to a JSON object
    pub fn from_serialize<T: Serialize>(value: &T) -> Result<Self> {
        match serde_json::to_value(value)? {
            serde_json::Value::Object(object) => Ok(object
                .into_iter()
                .fold(Record::new(), |record, (column, value)| {
                    record.set(&column, DatabaseValue::from_json(value))
                })),
            other => Err(DatabaseError::serialization(format!(
                "expected an object, got {}",
                other
            ))),
        }
    }

    /// Column names in insertion order
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Values in insertion order
    pub fn values(&self) -> &[DatabaseValue] {
        &self.values
    }

    /// Number of columns
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// True when no column is set
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn test_value_conversions() {
        let val = DatabaseValue::Int(42);
        assert_eq!(val.as_long(), Some(42));
        assert_eq!(val.as_double(), Some(42.0));

        let val = DatabaseValue::String("123".to_string());
        assert_eq!(val.as_long(), Some(123));
        assert_eq!(val.as_str(), Some("123"));

        let val = DatabaseValue::Long(1);
        assert_eq!(val.as_bool(), Some(true));
    }

    #[test]
    fn test_value_from_types() {
        let val: DatabaseValue = 42.into();
        assert_eq!(val, DatabaseValue::Int(42));

        let val: DatabaseValue = "hello".into();
        assert_eq!(val, DatabaseValue::String("hello".to_string()));

        let val: DatabaseValue = Option::<i32>::None.into();
        assert_eq!(val, DatabaseValue::Null);
    }

    #[test]
    fn test_encode_key_tags_types() {
        let encode = |v: DatabaseValue| {
            let mut out = Vec::new();
            v.encode_key(&mut out);
            out
        };

        assert_eq!(encode(DatabaseValue::Int(1)), encode(DatabaseValue::Long(1)));
        assert_ne!(encode(DatabaseValue::Int(-1)), encode(DatabaseValue::Long(1)));
        assert_ne!(
            encode(DatabaseValue::Long(1)),
            encode(DatabaseValue::String("1".to_string()))
        );
        assert_ne!(
            encode(DatabaseValue::String("ab".to_string())),
            encode(DatabaseValue::Bytes(b"ab".to_vec()))
        );
        assert_eq!(
            encode(DatabaseValue::Double(1.5)),
            encode(DatabaseValue::Double(1.5))
        );
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct User {
        id: i64,
        name: String,
        email: Option<String>,
    }

    #[test]
    fn test_from_row() {
        let mut row = DatabaseRow::new();
        row.insert("id".to_string(), DatabaseValue::Long(7));
        row.insert("name".to_string(), DatabaseValue::String("Alice".to_string()));
        row.insert("email".to_string(), DatabaseValue::Null);

        let user: User = from_row(&row).unwrap();
        assert_eq!(
            user,
            User {
                id: 7,
                name: "Alice".to_string(),
                email: None
            }
        );
    }

    #[test]
    fn test_from_row_type_error() {
        let mut row = DatabaseRow::new();
        row.insert("id".to_string(), DatabaseValue::String("x".to_string()));
        let err = from_row::<User>(&row).unwrap_err();
        assert!(matches!(err, DatabaseError::Serialization(_)));
    }

    #[test]
    fn test_record_set_and_overwrite() {
        let record = Record::new()
            .set("name", "Alice")
            .set("age", 30)
            .set("name", "Bob");

        assert_eq!(record.columns(), &["name".to_string(), "age".to_string()]);
        assert_eq!(record.values()[0], DatabaseValue::String("Bob".to_string()));
        assert_eq!(record.len(), 2);
    }

    #[derive(Serialize)]
    struct NewUser<'a> {
        name: &'a str,
        age: i64,
    }

    #[test]
    fn test_record_from_serialize() {
        let record = Record::from_serialize(&NewUser {
            name: "Alice",
            age: 30,
        })
        .unwrap();

        assert_eq!(record.len(), 2);
        let age = record.columns().iter().position(|c| c == "age").unwrap();
        assert_eq!(record.values()[age], DatabaseValue::Long(30));

        let err = Record::from_serialize(&42).unwrap_err();
        assert!(matches!(err, DatabaseError::Serialization(_)));
    }
}
