use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PatchError {
    #[error("Invalid patch document: {0}")]
    InvalidDocument(String),

    #[error("Invalid patch operation: {0}")]
    InvalidOperation(String),

    #[error("Invalid path '{0}'")]
    InvalidPath(String),

    #[error("Path '{0}' does not exist")]
    PathNotFound(String),

    #[error("Array index out of bounds at '{0}'")]
    IndexOutOfBounds(String),

    #[error("Cannot set a child of a scalar value at '{0}'")]
    InvalidTarget(String),

    #[error("Test operation failed at '{path}'")]
    TestFailed {
        path: String,
        expected: Value,
        actual: Option<Value>,
    },
}
