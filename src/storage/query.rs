use crate::core::{Document, ID_FIELD};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

/// Set of top-level fields a fetch is scoped to. Always includes `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Projection(BTreeSet<String>);

impl Projection {
    pub fn of<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set: BTreeSet<String> = fields.into_iter().map(Into::into).collect();
        set.insert(ID_FIELD.to_string());
        Self(set)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains(field)
    }

    pub fn fields(&self) -> &BTreeSet<String> {
        &self.0
    }

    pub fn into_fields(self) -> BTreeSet<String> {
        self.0
    }

    /// Copy of `doc` restricted to the projected fields.
    pub fn apply(&self, doc: &Document) -> Document {
        doc.iter()
            .filter(|(key, _)| self.0.contains(key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }
}

/// A single equality or containment test on a top-level field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cond", rename_all = "snake_case")]
pub enum Condition {
    /// Field equals the value. A missing field equals `null`.
    Eq { field: String, value: Value },
    /// Field differs from the value.
    Ne { field: String, value: Value },
    /// Field equals one of the values.
    In { field: String, values: Vec<Value> },
    /// List field contains the value.
    Contains { field: String, value: Value },
}

impl Condition {
    pub fn matches(&self, doc: &Document) -> bool {
        let field_value = |field: &str| doc.get(field).unwrap_or(&Value::Null);
        match self {
            Condition::Eq { field, value } => field_value(field) == value,
            Condition::Ne { field, value } => field_value(field) != value,
            Condition::In { field, values } => values.contains(field_value(field)),
            Condition::Contains { field, value } => match doc.get(field) {
                Some(Value::Array(items)) => items.contains(value),
                _ => false,
            },
        }
    }
}

/// Conjunction of conditions. The empty filter matches every document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    conditions: Vec<Condition>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::Eq {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn ne(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::Ne {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn is_in<I, V>(mut self, field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.conditions.push(Condition::In {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
        });
        self
    }

    pub fn contains(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::Contains {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.conditions.iter().all(|cond| cond.matches(doc))
    }
}

/// Filter plus paging. Results come back in ascending id order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub filter: Filter,
    pub offset: usize,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new(filter: Filter) -> Self {
        Self {
            filter,
            offset: 0,
            limit: None,
        }
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}
