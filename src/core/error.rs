use thiserror::Error;

#[derive(Error, Debug)]
pub enum DocError {
    #[error("Attribute '{attribute}' is not declared on '{entity}'")]
    UnknownAttribute { entity: String, attribute: String },

    #[error("Type mismatch for '{attribute}': expected {expected}, got {found}")]
    TypeMismatch {
        attribute: String,
        expected: String,
        found: String,
    },

    #[error("Document {id} not found in '{collection}'")]
    NotFound { collection: String, id: String },

    #[error("'{entity}' instance has not been persisted yet")]
    NotPersisted { entity: String },

    #[error("'{entity}' instance {id} was removed")]
    Removed { entity: String, id: String },

    #[error("'{entity}' is embeddable and has no collection")]
    NoCollection { entity: String },

    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, DocError>;

impl DocError {
    pub fn not_found(collection: &str, id: impl ToString) -> Self {
        Self::NotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        }
    }

    /// True for errors a caller can reasonably surface as "not found".
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<serde_json::Error> for DocError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for DocError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
