//! RFC 6902 JSON Patch with JSONPath selectors.
//!
//! Used by the PATCH endpoints: the stored model is mapped to its update view,
//! patched as a JSON tree, then mapped back.

pub mod error;
pub mod json_path;
pub mod operation;
pub mod patcher;
pub mod pointer;

pub use error::PatchError;
pub use json_path::JsonPath;
pub use operation::{Operation, PatchDocument};
pub use patcher::JsonPatcher;
pub use pointer::JsonPointer;
