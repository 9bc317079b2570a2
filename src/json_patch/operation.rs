use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::PatchError;

/// A single RFC 6902 operation. `path` and `from` accept either a JSON Pointer
/// or a JSONPath selector starting with `$`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum Operation {
    Test { path: String, value: Value },
    Remove { path: String },
    Add { path: String, value: Value },
    Replace { path: String, value: Value },
    Move { path: String, from: String },
    Copy { path: String, from: String },
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Test { .. } => "test",
            Operation::Remove { .. } => "remove",
            Operation::Add { .. } => "add",
            Operation::Replace { .. } => "replace",
            Operation::Move { .. } => "move",
            Operation::Copy { .. } => "copy",
        }
    }

    pub fn path(&self) -> &str {
        match self {
            Operation::Test { path, .. }
            | Operation::Remove { path }
            | Operation::Add { path, .. }
            | Operation::Replace { path, .. }
            | Operation::Move { path, .. }
            | Operation::Copy { path, .. } => path,
        }
    }
}

/// An ordered list of operations, serialized as a JSON array
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatchDocument {
    operations: Vec<Operation>,
}

impl PatchDocument {
    pub fn new(operations: Vec<Operation>) -> Self {
        Self { operations }
    }

    pub fn parse(text: &str) -> Result<Self, PatchError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| PatchError::InvalidDocument(e.to_string()))?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, PatchError> {
        let Value::Array(items) = value else {
            return Err(PatchError::InvalidDocument("expected an array of operations".to_string()));
        };

        let operations = items
            .into_iter()
            .enumerate()
            .map(|(i, item)| {
                serde_json::from_value(item)
                    .map_err(|e| PatchError::InvalidOperation(format!("operation {}: {}", i, e)))
            })
            .collect::<Result<Vec<Operation>, _>>()?;

        Ok(Self { operations })
    }

    pub fn add_operation(&mut self, operation: Operation) {
        self.operations.push(operation);
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serializes_in_wire_order() {
        let patch = PatchDocument::new(vec![
            Operation::Test { path: "/a/b/c".into(), value: json!("foo") },
            Operation::Remove { path: "/a/b/c".into() },
            Operation::Add { path: "/a/b/c".into(), value: json!(["foo", "bar"]) },
            Operation::Replace { path: "/a/b/c".into(), value: json!(42) },
            Operation::Move { path: "/a/b/d".into(), from: "/a/b/c".into() },
            Operation::Copy { path: "/a/b/e".into(), from: "/a/b/d".into() },
        ]);

        assert_eq!(
            serde_json::to_string(&patch).unwrap(),
            r#"[{"op":"test","path":"/a/b/c","value":"foo"},{"op":"remove","path":"/a/b/c"},{"op":"add","path":"/a/b/c","value":["foo","bar"]},{"op":"replace","path":"/a/b/c","value":42},{"op":"move","path":"/a/b/d","from":"/a/b/c"},{"op":"copy","path":"/a/b/e","from":"/a/b/d"}]"#
        );
    }

    #[test]
    fn parses_operations() {
        let patch = PatchDocument::parse(r#"[{"op":"add","path":"/baz","value":"qux"}]"#).unwrap();
        assert_eq!(patch.len(), 1);
        assert_eq!(patch.operations()[0].name(), "add");
        assert_eq!(patch.operations()[0].path(), "/baz");
    }

    #[test]
    fn rejects_unknown_or_incomplete_operations() {
        assert!(matches!(
            PatchDocument::parse(r#"[{"op":"merge","path":"/a"}]"#),
            Err(PatchError::InvalidOperation(_))
        ));
        assert!(matches!(
            PatchDocument::parse(r#"[{"op":"add","path":"/a"}]"#),
            Err(PatchError::InvalidOperation(_))
        ));
        assert!(matches!(
            PatchDocument::parse(r#"{"op":"add"}"#),
            Err(PatchError::InvalidDocument(_))
        ));
    }
}
