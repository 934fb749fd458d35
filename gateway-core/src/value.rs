use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A typed value flowing through the planner, the execution operators, the
/// full-text scorer and the wire codec. NULL is first-class (§3 Row).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Date(String),
    Time(String),
    Timestamp(String),
    Decimal(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Render as MySQL text-protocol representation, or `None` for NULL
    /// (encoded by the caller as the 0xFB marker).
    pub fn as_text(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Bool(b) => Some(if *b { "1".into() } else { "0".into() }),
            Value::Int(i) => Some(i.to_string()),
            Value::Float(f) => Some(f.to_string()),
            Value::Text(s) => Some(s.clone()),
            Value::Bytes(b) => Some(String::from_utf8_lossy(b).to_string()),
            Value::Date(s) | Value::Time(s) | Value::Timestamp(s) | Value::Decimal(s) => {
                Some(s.clone())
            }
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Decimal(s) => s.parse().ok(),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::Time(a), Value::Time(b)) => a == b,
            (Value::Timestamp(a), Value::Timestamp(b)) => a == b,
            (Value::Decimal(a), Value::Decimal(b)) => a == b,
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if let (Some(a), Some(b)) = (self.as_f64(), other.as_f64()) {
            return a.partial_cmp(&b);
        }
        match (self.as_text(), other.as_text()) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => None,
        }
    }
}

/// Column descriptor, serialized as a MySQL column-definition packet (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub catalog: String,
    pub schema: String,
    pub table: String,
    pub org_table: String,
    pub name: String,
    pub org_name: String,
    pub charset: u16,
    pub max_length: u32,
    pub mysql_type: u8,
    pub flags: u16,
    pub decimals: u8,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, table: impl Into<String>, mysql_type: u8) -> Self {
        let name = name.into();
        let table = table.into();
        Self {
            catalog: "def".into(),
            schema: String::new(),
            table: table.clone(),
            org_table: table,
            name: name.clone(),
            org_name: name,
            charset: 45,
            max_length: 255,
            mysql_type,
            flags: 0,
            decimals: 0,
        }
    }
}

/// Ordered sequence of typed values aligned to a column descriptor list.
pub type Row = Vec<Value>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub nullable: bool,
    pub mysql_type: u8,
}
