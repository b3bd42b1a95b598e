use crate::error::{Result, TypedRtdbError};
use crate::path::{self, is_index};
use crate::schema::{LeafKind, Shape};
use serde_json::{Map, Value};

/// Result of validating a value against a shape
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<String>,
}

impl ValidationResult {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Validate a value against the shape it is about to be written to.
/// Every problem is reported with its location relative to the write.
pub fn validate_value(shape: &Shape, value: &Value) -> ValidationResult {
    let mut result = ValidationResult::default();
    validate_at(shape, value, "", &mut result);
    result
}

/// Validate the entries of a multi-location update. Each key is a path
/// relative to `shape`; `null` entries delete and are only accepted where the
/// addressed node may be absent.
pub fn validate_update(shape: &Shape, entries: &Map<String, Value>) -> ValidationResult {
    let mut result = ValidationResult::default();

    if entries.is_empty() {
        result.errors.push("Update has no entries".into());
        return result;
    }

    for (key, value) in entries {
        let segments = match path::split_path(key) {
            Some(s) if !s.is_empty() => s,
            _ => {
                result.errors.push(format!("Invalid update key '{key}'"));
                continue;
            }
        };

        let child = match path::resolve_segments(shape, &segments) {
            Some(child) => child,
            None => {
                result
                    .errors
                    .push(format!("Unknown path '{key}' is not in the schema"));
                continue;
            }
        };

        if value.is_null() {
            if !may_be_absent(shape, &segments) {
                result
                    .errors
                    .push(format!("'{key}' is required and cannot be removed"));
            }
            continue;
        }

        validate_at(&child, value, key, &mut result);
    }

    result
}

/// Whether the node at `segments` below `shape` may be missing without the
/// data leaving the schema: the root, dynamic and list children, optional or
/// nullable fields, and fields holding containers that may be empty.
pub fn may_be_absent<S: AsRef<str>>(shape: &Shape, segments: &[S]) -> bool {
    let Some((last, parent)) = segments.split_last() else {
        return true;
    };
    match path::resolve_segments(shape, parent) {
        Some(parent_shape) => key_may_be_absent(&parent_shape, last.as_ref()),
        None => false,
    }
}

fn key_may_be_absent(parent: &Shape, key: &str) -> bool {
    match parent {
        Shape::Leaf(_) => false,
        Shape::Fixed(fields) => fields
            .get(key)
            .map(|f| f.optional || f.shape.is_nullable() || may_be_empty(&f.shape))
            .unwrap_or(false),
        Shape::Dynamic(_) => !key.is_empty(),
        Shape::List(_) => is_index(key),
        Shape::Union(members) => members.iter().any(|m| key_may_be_absent(m, key)),
    }
}

/// Whether `shape` has a valid empty form. The store never keeps empty
/// containers, so such a value reads back as absent.
fn may_be_empty(shape: &Shape) -> bool {
    match shape {
        Shape::Leaf(_) => false,
        Shape::Dynamic(_) | Shape::List(_) => true,
        Shape::Fixed(fields) => fields
            .values()
            .all(|f| f.optional || f.shape.is_nullable() || may_be_empty(&f.shape)),
        Shape::Union(members) => members.iter().any(may_be_empty),
    }
}

/// Validate and turn any problem into a `SchemaMismatch` at `path`.
pub fn check_value(shape: &Shape, value: &Value, path: &str) -> Result<()> {
    into_result(validate_value(shape, value), path)
}

/// Validate update entries and turn any problem into a `SchemaMismatch`.
pub fn check_update(shape: &Shape, entries: &Map<String, Value>, path: &str) -> Result<()> {
    into_result(validate_update(shape, entries), path)
}

fn into_result(result: ValidationResult, path: &str) -> Result<()> {
    if result.is_ok() {
        return Ok(());
    }
    Err(TypedRtdbError::mismatch(
        path,
        format!("Value validation failed:\n  - {}", result.errors.join("\n  - ")),
    ))
}

fn validate_at(shape: &Shape, value: &Value, at: &str, result: &mut ValidationResult) {
    match shape {
        Shape::Leaf(kind) => {
            if LeafKind::of(value) != Some(*kind) {
                result.errors.push(format!(
                    "{} expected {}, got {}",
                    location(at),
                    kind.name(),
                    type_name(value)
                ));
            }
        }
        Shape::Union(members) => {
            let matched = members.iter().any(|m| {
                let mut probe = ValidationResult::default();
                validate_at(m, value, at, &mut probe);
                probe.is_ok()
            });
            if !matched {
                result.errors.push(format!(
                    "{} expected {}, got {}",
                    location(at),
                    shape,
                    type_name(value)
                ));
            }
        }
        Shape::Fixed(fields) => {
            let empty = Map::new();
            let mapping = match value {
                Value::Object(m) => m,
                // An empty container is stored as null
                Value::Null => &empty,
                other => {
                    result.errors.push(format!(
                        "{} expected object, got {}",
                        location(at),
                        type_name(other)
                    ));
                    return;
                }
            };

            for (name, field) in fields {
                let child_at = join(at, name);
                match mapping.get(name) {
                    None | Some(Value::Null) => {
                        if !field.optional && !field.shape.is_nullable() && !may_be_empty(&field.shape) {
                            result
                                .errors
                                .push(format!("Required field '{child_at}' is missing"));
                        }
                    }
                    Some(child) => validate_at(&field.shape, child, &child_at, result),
                }
            }

            for key in mapping.keys() {
                if !fields.contains_key(key) {
                    result
                        .errors
                        .push(format!("Unexpected field '{}'", join(at, key)));
                }
            }
        }
        Shape::Dynamic(inner) => match value {
            Value::Null => {}
            Value::Object(mapping) => {
                for (key, child) in mapping {
                    if key.is_empty() {
                        result
                            .errors
                            .push(format!("{} contains an empty key", location(at)));
                        continue;
                    }
                    if !child.is_null() {
                        validate_at(inner, child, &join(at, key), result);
                    }
                }
            }
            Value::Array(items) => {
                for (index, child) in items.iter().enumerate() {
                    if !child.is_null() {
                        validate_at(inner, child, &join(at, &index.to_string()), result);
                    }
                }
            }
            other => result.errors.push(format!(
                "{} expected object, got {}",
                location(at),
                type_name(other)
            )),
        },
        Shape::List(element) => match value {
            Value::Null => {}
            Value::Array(items) => {
                for (index, child) in items.iter().enumerate() {
                    if !child.is_null() {
                        validate_at(element, child, &join(at, &index.to_string()), result);
                    }
                }
            }
            Value::Object(mapping) => {
                for (key, child) in mapping {
                    if !is_index(key) {
                        result.errors.push(format!(
                            "{} has non-numeric key '{key}'",
                            location(at)
                        ));
                        continue;
                    }
                    if !child.is_null() {
                        validate_at(element, child, &join(at, key), result);
                    }
                }
            }
            other => result.errors.push(format!(
                "{} expected list, got {}",
                location(at),
                type_name(other)
            )),
        },
    }
}

fn location(at: &str) -> String {
    if at.is_empty() {
        "Value".to_string()
    } else {
        format!("'{at}'")
    }
}

fn join(at: &str, key: &str) -> String {
    if at.is_empty() {
        key.to_string()
    } else {
        format!("{at}/{key}")
    }
}

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::resolve;
    use crate::schema::parse_schema_str;
    use serde_json::json;

    fn test_schema() -> Shape {
        parse_schema_str(
            r#"
users:
  "*":
    name: string
    score: number
    nickname?: string
    status: string | null
    tags: [string]
settings:
  theme: string
"#,
        )
        .unwrap()
    }

    fn user_shape() -> Shape {
        resolve(&test_schema(), "users/*").unwrap()
    }

    #[test]
    fn test_valid_user() {
        let result = validate_value(
            &user_shape(),
            &json!({ "name": "a", "score": 1, "tags": ["x", "y"] }),
        );
        assert!(result.is_ok(), "Errors: {:?}", result.errors);
    }

    #[test]
    fn test_missing_required_field() {
        let result = validate_value(&user_shape(), &json!({ "name": "a", "tags": [] }));
        assert!(!result.is_ok());
        assert!(result.errors.iter().any(|e| e.contains("'score' is missing")));
    }

    #[test]
    fn test_required_containers_may_be_empty() {
        let result = validate_value(&user_shape(), &json!({ "name": "a", "score": 2 }));
        assert!(result.is_ok(), "Errors: {:?}", result.errors);

        let shape = parse_schema_str("a:\n  b:\n    c: [number]\n  d:\n    e: string\n").unwrap();
        assert!(validate_value(&shape, &json!({ "d": { "e": "x" } })).is_ok());
        let result = validate_value(&shape, &json!({ "a": {} }));
        assert_eq!(result.errors, vec!["Required field 'd' is missing"]);
    }

    #[test]
    fn test_type_mismatch() {
        let result = validate_value(
            &user_shape(),
            &json!({ "name": 42, "score": 1, "tags": [] }),
        );
        assert_eq!(result.errors, vec!["'name' expected string, got number"]);
    }

    #[test]
    fn test_unexpected_field() {
        let result = validate_value(
            &user_shape(),
            &json!({ "name": "a", "score": 1, "tags": ["t"], "extra": true }),
        );
        assert!(result.errors.iter().any(|e| e.contains("Unexpected field 'extra'")));
    }

    #[test]
    fn test_nested_locations() {
        let schema = test_schema();
        let users = resolve(&schema, "users").unwrap();
        let result = validate_value(
            &users,
            &json!({ "u1": { "name": "a", "score": "high", "tags": ["ok", 3] } }),
        );
        assert!(result.errors.contains(&"'u1/score' expected number, got string".to_string()));
        assert!(result.errors.contains(&"'u1/tags/1' expected string, got number".to_string()));
    }

    #[test]
    fn test_union_value() {
        let status = Shape::union([Shape::string(), Shape::null()]);
        assert!(validate_value(&status, &json!("on")).is_ok());
        assert!(validate_value(&status, &json!(null)).is_ok());
        let result = validate_value(&status, &json!(3));
        assert_eq!(result.errors, vec!["Value expected string | null, got number"]);
    }

    #[test]
    fn test_list_as_index_keyed_object() {
        let tags = Shape::list(Shape::string());
        assert!(validate_value(&tags, &json!({ "0": "a", "1": "b" })).is_ok());
        assert!(!validate_value(&tags, &json!({ "first": "a" })).is_ok());
    }

    #[test]
    fn test_update_entries() {
        let schema = test_schema();
        let mut entries = Map::new();
        entries.insert("users/u1/score".into(), json!(5));
        entries.insert("users/u2/nickname".into(), json!(null));
        entries.insert("settings/theme".into(), json!("dark"));
        let result = validate_update(&schema, &entries);
        assert!(result.is_ok(), "Errors: {:?}", result.errors);
    }

    #[test]
    fn test_update_rejects_unknown_and_required_removal() {
        let schema = test_schema();
        let mut entries = Map::new();
        entries.insert("settings/colour".into(), json!("red"));
        entries.insert("settings/theme".into(), json!(null));
        entries.insert("users/".into(), json!({}));
        let result = validate_update(&schema, &entries);
        assert_eq!(result.errors.len(), 3);
        assert!(result.errors.iter().any(|e| e.contains("Unknown path 'settings/colour'")));
        assert!(result.errors.iter().any(|e| e.contains("'settings/theme' is required")));
        assert!(result.errors.iter().any(|e| e.contains("Invalid update key 'users/'")));
    }

    #[test]
    fn test_may_be_absent() {
        let schema = test_schema();
        assert!(may_be_absent::<&str>(&schema, &[]));
        assert!(may_be_absent(&schema, &["users", "u1"]));
        assert!(may_be_absent(&schema, &["users", "u1", "nickname"]));
        assert!(may_be_absent(&schema, &["users", "u1", "status"]));
        assert!(may_be_absent(&schema, &["users", "u1", "tags", "3"]));
        assert!(may_be_absent(&schema, &["users", "u1", "tags"]));
        assert!(!may_be_absent(&schema, &["users", "u1", "name"]));
        assert!(!may_be_absent(&schema, &["settings"]));
    }

    #[test]
    fn test_check_value_error() {
        let err = check_value(&Shape::number(), &json!("x"), "a/b").unwrap_err();
        match err {
            TypedRtdbError::SchemaMismatch { path, message } => {
                assert_eq!(path, "a/b");
                assert!(message.contains("expected number, got string"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
