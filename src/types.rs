/// Shared types used across the codebase

use serde::{Deserialize, Serialize};

/// Kind of change applied to a stored document or membership.
/// Carried by change messages on the message bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Added,
    Saved,
    Removed,
}

/// How the caller of a request was authenticated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthType {
    User,
    Token,
    Anonymous,
}
