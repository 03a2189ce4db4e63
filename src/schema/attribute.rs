use crate::core::{DocError, Document, Result, json_type_name};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Declared value type of an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Any,
    Bool,
    Int,
    Float,
    Str,
    Dict,
    List,
    /// Ordered sequence of embedded sub-documents.
    Documents,
}

impl ValueKind {
    /// `null` is compatible with every kind: it clears the attribute.
    pub fn is_compatible(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (Self::Any, _) => true,
            (Self::Bool, Value::Bool(_)) => true,
            (Self::Int, Value::Number(n)) => n.is_i64() || n.is_u64(),
            (Self::Float, Value::Number(_)) => true,
            (Self::Str, Value::String(_)) => true,
            (Self::Dict, Value::Object(_)) => true,
            (Self::List, Value::Array(_)) => true,
            (Self::Documents, Value::Array(items)) => items.iter().all(Value::is_object),
            _ => false,
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self, Self::List | Self::Documents)
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => write!(f, "any"),
            Self::Bool => write!(f, "bool"),
            Self::Int => write!(f, "int"),
            Self::Float => write!(f, "float"),
            Self::Str => write!(f, "str"),
            Self::Dict => write!(f, "dict"),
            Self::List => write!(f, "list"),
            Self::Documents => write!(f, "list of documents"),
        }
    }
}

/// Computes a default from the values already resolved on the instance.
pub type DefaultFn = Arc<dyn Fn(&Document) -> Value + Send + Sync>;

/// How an attribute's value is produced when the instance holds none.
#[derive(Clone, Default)]
pub enum DefaultValue {
    #[default]
    Absent,
    Const(Value),
    Computed(DefaultFn),
}

impl DefaultValue {
    pub fn resolve(&self, resolved: &Document) -> Value {
        match self {
            DefaultValue::Absent => Value::Null,
            DefaultValue::Const(value) => value.clone(),
            DefaultValue::Computed(func) => func(resolved),
        }
    }
}

impl fmt::Debug for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultValue::Absent => write!(f, "Absent"),
            DefaultValue::Const(value) => f.debug_tuple("Const").field(value).finish(),
            DefaultValue::Computed(_) => write!(f, "Computed(<fn>)"),
        }
    }
}

/// A single schema unit: name, value type and default strategy.
#[derive(Debug, Clone)]
pub struct Attribute {
    name: String,
    kind: ValueKind,
    default: DefaultValue,
}

impl Attribute {
    pub fn new(name: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            name: name.into(),
            kind,
            default: DefaultValue::Absent,
        }
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = DefaultValue::Const(value.into());
        self
    }

    pub fn computed<F>(mut self, func: F) -> Self
    where
        F: Fn(&Document) -> Value + Send + Sync + 'static,
    {
        self.default = DefaultValue::Computed(Arc::new(func));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    pub fn default(&self) -> &DefaultValue {
        &self.default
    }

    pub fn validate(&self, value: &Value) -> Result<()> {
        if !self.kind.is_compatible(value) {
            return Err(DocError::TypeMismatch {
                attribute: self.name.clone(),
                expected: self.kind.to_string(),
                found: json_type_name(value).to_string(),
            });
        }
        Ok(())
    }
}
