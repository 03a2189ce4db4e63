use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// A stored document: a JSON object keyed by attribute name.
pub type Document = serde_json::Map<String, Value>;

/// Name of the identity attribute carried by every document.
pub const ID_FIELD: &str = "id";

/// Identity of an entity instance.
///
/// Root entities use store-assigned integers where `0` means "not yet
/// persisted". Embeddable entities use opaque string tokens.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityId {
    Int(i64),
    Token(String),
}

impl EntityId {
    pub const UNSAVED: EntityId = EntityId::Int(0);

    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().map(EntityId::Int),
            Value::String(s) => Some(EntityId::Token(s.clone())),
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            EntityId::Int(id) => Value::from(*id),
            EntityId::Token(token) => Value::String(token.clone()),
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            EntityId::Int(id) => Some(*id),
            EntityId::Token(_) => None,
        }
    }

    pub fn is_unsaved(&self) -> bool {
        matches!(self, EntityId::Int(0))
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityId::Int(id) => write!(f, "{}", id),
            EntityId::Token(token) => write!(f, "{}", token),
        }
    }
}

impl From<i64> for EntityId {
    fn from(id: i64) -> Self {
        EntityId::Int(id)
    }
}

impl From<&str> for EntityId {
    fn from(token: &str) -> Self {
        EntityId::Token(token.to_string())
    }
}

/// Short name of a JSON value's type, used in error messages.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "str",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}

/// Current time as fractional seconds since the Unix epoch.
pub fn timestamp_now() -> Value {
    let micros = chrono::Utc::now().timestamp_micros();
    Value::from(micros as f64 / 1_000_000.0)
}
