use serde_json::{Map, Value};

use super::error::PatchError;
use super::json_path::{values_equal, JsonPath};
use super::operation::{Operation, PatchDocument};
use super::pointer::{is_array_token, parse_index, JsonPointer};

/// Applies patch documents to JSON trees.
///
/// Operations run in order against a working copy; the target document is only
/// replaced once every operation has succeeded, so a failed `test` leaves it untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonPatcher;

impl JsonPatcher {
    pub fn new() -> Self {
        Self
    }

    pub fn patch(&self, document: &mut Value, patch: &PatchDocument) -> Result<(), PatchError> {
        if patch.is_empty() {
            return Ok(());
        }

        let mut working = document.clone();
        for operation in patch.operations() {
            tracing::trace!(op = operation.name(), path = operation.path(), "applying patch operation");
            self.apply(&mut working, operation)?;
        }
        *document = working;
        Ok(())
    }

    fn apply(&self, doc: &mut Value, operation: &Operation) -> Result<(), PatchError> {
        match operation {
            Operation::Add { path, value } => {
                for target in resolve(doc, path)? {
                    add(doc, &target, value.clone())?;
                }
                Ok(())
            }
            Operation::Remove { path } => {
                // Later siblings first so earlier array indexes stay valid
                for target in resolve(doc, path)?.into_iter().rev() {
                    remove(doc, &target)?;
                }
                Ok(())
            }
            Operation::Replace { path, value } => {
                for target in resolve(doc, path)? {
                    replace(doc, &target, value.clone())?;
                }
                Ok(())
            }
            Operation::Move { from, path } => {
                let source = resolve_single(doc, from)?;
                let value = remove(doc, &source)?.ok_or_else(|| PatchError::PathNotFound(from.clone()))?;
                for target in resolve(doc, path)? {
                    add(doc, &target, value.clone())?;
                }
                Ok(())
            }
            Operation::Copy { from, path } => {
                let source = resolve_single(doc, from)?;
                let value = source
                    .get(doc)
                    .cloned()
                    .ok_or_else(|| PatchError::PathNotFound(from.clone()))?;
                for target in resolve(doc, path)? {
                    add(doc, &target, value.clone())?;
                }
                Ok(())
            }
            Operation::Test { path, value } => {
                let targets = resolve(doc, path)?;
                if targets.is_empty() {
                    return Err(test_failed(path, value, None));
                }
                for target in targets {
                    match target.get(doc) {
                        Some(actual) if values_equal(actual, value) => {}
                        actual => return Err(test_failed(path, value, actual.cloned())),
                    }
                }
                Ok(())
            }
        }
    }
}

fn test_failed(path: &str, expected: &Value, actual: Option<Value>) -> PatchError {
    PatchError::TestFailed {
        path: path.to_string(),
        expected: expected.clone(),
        actual,
    }
}

/// Concrete pointers for a path: one for a JSON Pointer, every match for a JSONPath
fn resolve(doc: &Value, path: &str) -> Result<Vec<JsonPointer>, PatchError> {
    if JsonPath::is_json_path(path) {
        Ok(JsonPath::parse(path)?.select(doc))
    } else {
        Ok(vec![JsonPointer::parse(path)?])
    }
}

fn resolve_single(doc: &Value, path: &str) -> Result<JsonPointer, PatchError> {
    resolve(doc, path)?
        .into_iter()
        .next()
        .ok_or_else(|| PatchError::PathNotFound(path.to_string()))
}

fn add(doc: &mut Value, target: &JsonPointer, value: Value) -> Result<(), PatchError> {
    let Some((parent_ptr, last)) = target.split_last() else {
        *doc = value;
        return Ok(());
    };

    let Some(parent) = ensure_container(doc, &parent_ptr)? else {
        return Ok(());
    };

    match parent {
        Value::Object(map) => {
            map.insert(last.to_string(), value);
            Ok(())
        }
        Value::Array(items) => {
            if last == "-" {
                items.push(value);
                return Ok(());
            }
            match parse_index(last) {
                Some(index) if index <= items.len() => {
                    items.insert(index, value);
                    Ok(())
                }
                _ => Err(PatchError::IndexOutOfBounds(target.to_string())),
            }
        }
        _ => Err(PatchError::InvalidTarget(target.to_string())),
    }
}

fn replace(doc: &mut Value, target: &JsonPointer, value: Value) -> Result<(), PatchError> {
    let Some((parent_ptr, last)) = target.split_last() else {
        *doc = value;
        return Ok(());
    };

    let Some(parent) = ensure_container(doc, &parent_ptr)? else {
        return Ok(());
    };

    match parent {
        Value::Object(map) => {
            map.insert(last.to_string(), value);
            Ok(())
        }
        Value::Array(items) => {
            if last == "-" {
                items.push(value);
                return Ok(());
            }
            match parse_index(last).and_then(|i| items.get_mut(i)) {
                Some(slot) => {
                    *slot = value;
                    Ok(())
                }
                None => Err(PatchError::IndexOutOfBounds(target.to_string())),
            }
        }
        _ => Err(PatchError::InvalidTarget(target.to_string())),
    }
}

/// Removes and returns the value at `target`; a missing target is a no-op
fn remove(doc: &mut Value, target: &JsonPointer) -> Result<Option<Value>, PatchError> {
    let Some((parent_ptr, last)) = target.split_last() else {
        return Err(PatchError::InvalidPath("cannot remove the document root".to_string()));
    };

    Ok(match parent_ptr.get_mut(doc) {
        Some(Value::Object(map)) => map.remove(last),
        Some(Value::Array(items)) => match parse_index(last) {
            Some(index) if index < items.len() => Some(items.remove(index)),
            _ => None,
        },
        _ => None,
    })
}

/// Walks to `pointer`, creating empty objects for missing members.
///
/// Returns `Ok(None)` without touching the document when a missing segment
/// looks like an array slot, since its container type cannot be inferred.
fn ensure_container<'a>(doc: &'a mut Value, pointer: &JsonPointer) -> Result<Option<&'a mut Value>, PatchError> {
    let tokens = pointer.tokens();

    let mut existing = 0;
    {
        let mut current: &Value = doc;
        for token in tokens {
            let next = match current {
                Value::Object(map) => map.get(token),
                Value::Array(items) => parse_index(token).and_then(|i| items.get(i)),
                _ => return Err(PatchError::InvalidTarget(pointer.to_string())),
            };
            match next {
                Some(value) => {
                    current = value;
                    existing += 1;
                }
                None => break,
            }
        }
        if existing < tokens.len() {
            if !current.is_object() || tokens[existing..].iter().any(|t| is_array_token(t)) {
                return Ok(None);
            }
        }
    }

    let mut current = doc;
    for (depth, token) in tokens.iter().enumerate() {
        current = if depth < existing {
            match current {
                Value::Object(map) => map.get_mut(token),
                Value::Array(items) => parse_index(token).and_then(move |i| items.get_mut(i)),
                _ => None,
            }
            .ok_or_else(|| PatchError::PathNotFound(pointer.to_string()))?
        } else {
            match current {
                Value::Object(map) => map
                    .entry(token.clone())
                    .or_insert_with(|| Value::Object(Map::new())),
                _ => return Err(PatchError::InvalidTarget(pointer.to_string())),
            }
        };
    }
    Ok(Some(current))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "books": [
                {"title": "The Great Gatsby", "author": "F. Scott Fitzgerald"},
                {"title": "The Grapes of Wrath", "author": "John Steinbeck"}
            ]
        })
    }

    fn run(doc: &mut Value, ops: Value) -> Result<(), PatchError> {
        JsonPatcher::new().patch(doc, &PatchDocument::from_value(ops)?)
    }

    #[test]
    fn empty_patch_leaves_document_unchanged() {
        let mut doc = sample();
        JsonPatcher::new().patch(&mut doc, &PatchDocument::default()).unwrap();
        assert_eq!(doc, sample());
    }

    #[test]
    fn add_member() {
        let mut doc = json!({"foo": "bar"});
        run(&mut doc, json!([{"op": "add", "path": "/baz", "value": "qux"}])).unwrap();
        assert_eq!(doc, json!({"foo": "bar", "baz": "qux"}));
    }

    #[test]
    fn add_existing_member_overwrites() {
        let mut doc = sample();
        run(&mut doc, json!([{"op": "add", "path": "/books/0/title", "value": "Little Red Riding Hood"}])).unwrap();
        assert_eq!(doc["books"][0]["title"], "Little Red Riding Hood");
    }

    #[test]
    fn add_appends_with_dash_and_inserts_at_index() {
        let mut doc = sample();
        run(&mut doc, json!([
            {"op": "add", "path": "/books/-", "value": {"author": "James Brown"}},
            {"op": "add", "path": "/books/0", "value": {"author": "First"}}
        ]))
        .unwrap();
        let books = doc["books"].as_array().unwrap();
        assert_eq!(books.len(), 4);
        assert_eq!(books[0]["author"], "First");
        assert_eq!(books[3]["author"], "James Brown");
    }

    #[test]
    fn add_past_end_is_rejected() {
        let mut doc = sample();
        let err = run(&mut doc, json!([{"op": "add", "path": "/books/7", "value": 1}])).unwrap_err();
        assert!(matches!(err, PatchError::IndexOutOfBounds(_)));
    }

    #[test]
    fn remove_member_and_element() {
        let mut doc = sample();
        run(&mut doc, json!([{"op": "remove", "path": "/books/0/author"}])).unwrap();
        assert!(doc["books"][0].get("author").is_none());

        run(&mut doc, json!([{"op": "remove", "path": "/books/0"}])).unwrap();
        assert_eq!(doc["books"].as_array().unwrap().len(), 1);
        assert_eq!(doc["books"][0]["title"], "The Grapes of Wrath");
    }

    #[test]
    fn remove_missing_is_noop() {
        let mut doc = sample();
        run(&mut doc, json!([{"op": "remove", "path": "/nothing/here"}])).unwrap();
        assert_eq!(doc, sample());
    }

    #[test]
    fn replace_value_and_with_object() {
        let mut doc = sample();
        run(&mut doc, json!([{"op": "replace", "path": "/books/0/author", "value": "Bob Brown"}])).unwrap();
        assert_eq!(doc["books"][0]["author"], "Bob Brown");

        run(&mut doc, json!([{"op": "replace", "path": "/books/0/author", "value": {"hello": "world"}}])).unwrap();
        assert_eq!(doc["books"][0]["author"]["hello"], "world");
    }

    #[test]
    fn replace_creates_missing_members() {
        let mut doc = json!({"data": {}});
        run(&mut doc, json!([{"op": "replace", "path": "/data/author", "value": "Bob Brown"}])).unwrap();
        assert_eq!(doc, json!({"data": {"author": "Bob Brown"}}));

        let mut doc = json!({});
        run(&mut doc, json!([{"op": "replace", "path": "/data/author", "value": "Bob Brown"}])).unwrap();
        assert_eq!(doc, json!({"data": {"author": "Bob Brown"}}));
    }

    #[test]
    fn replace_root() {
        let mut doc = json!({});
        run(&mut doc, json!([{"op": "replace", "path": "/", "value": "Bob Brown"}])).unwrap();
        assert_eq!(doc, json!("Bob Brown"));
    }

    #[test]
    fn replace_does_not_invent_arrays() {
        let mut doc = json!({});
        run(&mut doc, json!([{"op": "replace", "path": "/hey/now/0/you", "value": "Bob Brown"}])).unwrap();
        assert_eq!(doc, json!({}));
    }

    #[test]
    fn replace_every_json_path_match() {
        let mut doc = json!({
            "books": [
                {"title": "The Great Gatsby", "author": "F. Scott Fitzgerald"},
                {"title": "The Grapes of Wrath", "author": "John Steinbeck"},
                {"title": "Some Other Title", "author": "John Steinbeck"}
            ]
        });
        run(&mut doc, json!([{"op": "replace", "path": "$.books[?(@.author == 'John Steinbeck')].author", "value": "Eric"}])).unwrap();
        assert_eq!(doc["books"][0]["author"], "F. Scott Fitzgerald");
        assert_eq!(doc["books"][1]["author"], "Eric");
        assert_eq!(doc["books"][2]["author"], "Eric");
    }

    #[test]
    fn remove_every_json_path_match() {
        let mut doc = json!({"tags": ["a", "b", "a", "c"]});
        run(&mut doc, json!([{"op": "remove", "path": "$.tags[?(@ == 'a')]"}])).unwrap();
        assert_eq!(doc, json!({"tags": ["b", "c"]}));

        let mut doc = json!({"items": [{"k": "x"}, {"k": "y"}, {"k": "x"}]});
        run(&mut doc, json!([{"op": "remove", "path": "$.items[?(@.k == 'x')]"}])).unwrap();
        assert_eq!(doc, json!({"items": [{"k": "y"}]}));
    }

    #[test]
    fn move_property() {
        let mut doc = sample();
        run(&mut doc, json!([{"op": "move", "from": "/books/0/author", "path": "/books/1/author"}])).unwrap();
        assert_eq!(doc["books"][1]["author"], "F. Scott Fitzgerald");
        assert!(doc["books"][0].get("author").is_none());
    }

    #[test]
    fn move_array_element_into_sibling() {
        let mut doc = sample();
        run(&mut doc, json!([{"op": "move", "from": "/books/1", "path": "/books/0/child"}])).unwrap();
        assert!(doc["books"][0]["child"].is_object());
        assert_eq!(doc["books"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn move_missing_source_fails() {
        let mut doc = sample();
        let err = run(&mut doc, json!([{"op": "move", "from": "/nope", "path": "/books/0/x"}])).unwrap_err();
        assert!(matches!(err, PatchError::PathNotFound(_)));
    }

    #[test]
    fn copy_array_element_and_property() {
        let mut doc = sample();
        run(&mut doc, json!([{"op": "copy", "from": "/books/0", "path": "/books/-"}])).unwrap();
        assert!(doc["books"][2].is_object());

        let mut doc = sample();
        run(&mut doc, json!([
            {"op": "add", "path": "/books/0/ISBN", "value": "21123123"},
            {"op": "copy", "from": "/books/0/ISBN", "path": "/books/1/ISBN"}
        ]))
        .unwrap();
        assert_eq!(doc["books"][1]["ISBN"], "21123123");
    }

    #[test]
    fn failed_test_aborts_whole_patch() {
        let mut doc = sample();
        let err = run(&mut doc, json!([
            {"op": "replace", "path": "/books/0/title", "value": "Changed"},
            {"op": "test", "path": "/books/0/author", "value": "Billy Burton"}
        ]))
        .unwrap_err();
        assert!(matches!(err, PatchError::TestFailed { .. }));
        assert_eq!(doc, sample());
    }

    #[test]
    fn passing_test_allows_patch() {
        let mut doc = json!({"version": 3});
        run(&mut doc, json!([
            {"op": "test", "path": "/version", "value": 3.0},
            {"op": "replace", "path": "/version", "value": 4}
        ]))
        .unwrap();
        assert_eq!(doc["version"], 4);
    }
}
