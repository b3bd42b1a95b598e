use thiserror::Error;

#[derive(Error, Debug)]
pub enum TypedRtdbError {
    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Schema mismatch at '{path}': {message}")]
    SchemaMismatch { path: String, message: String },

    #[error("Invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("Constraint conflict: {0}")]
    ConstraintConflict(String),

    #[error("Store failure: {0}")]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TypedRtdbError {
    pub(crate) fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        TypedRtdbError::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn mismatch(path: impl Into<String>, message: impl Into<String>) -> Self {
        TypedRtdbError::SchemaMismatch {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// An error reported by the backing store (network, auth, permissions...).
/// Carried through unchanged; this crate never interprets or retries it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{code}: {message}")]
pub struct StoreError {
    pub code: String,
    pub message: String,
}

impl StoreError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        StoreError {
            code: code.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TypedRtdbError>;
