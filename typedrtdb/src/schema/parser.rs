use super::types::{Field, LeafKind, Shape};
use crate::error::{Result, TypedRtdbError};
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use std::path::Path;

/// Key of a mapping describing a dynamic string-keyed container.
pub const DYNAMIC_KEY: &str = "*";
/// Key of a mapping describing a numeric-indexed list.
pub const LIST_KEY: &str = "#";
/// Key of a mapping describing a union of non-scalar shapes.
pub const UNION_KEY: &str = "|";

/// Parse a schema file into its root shape
pub fn parse_schema(path: &Path) -> Result<Shape> {
    let content = std::fs::read_to_string(path)?;
    parse_schema_str(&content)
}

/// Parse a schema YAML string into its root shape
pub fn parse_schema_str(content: &str) -> Result<Shape> {
    let value: Value = serde_yaml::from_str(content)?;
    shape_from_yaml(&value, "")
}

fn shape_from_yaml(value: &Value, at: &str) -> Result<Shape> {
    match value {
        Value::Null => Ok(Shape::null()),
        Value::String(s) => parse_scalar_type(s, at),
        Value::Sequence(items) => {
            if items.len() != 1 {
                return Err(schema_error(
                    at,
                    "a list shape is written as a one-element sequence",
                ));
            }
            Ok(Shape::list(shape_from_yaml(&items[0], &join(at, LIST_KEY))?))
        }
        Value::Mapping(mapping) => shape_from_mapping(mapping, at),
        Value::Bool(_) | Value::Number(_) | Value::Tagged(_) => Err(schema_error(
            at,
            "expected a type name, a mapping or a one-element sequence",
        )),
    }
}

/// `string`, `number | null`, ...
fn parse_scalar_type(text: &str, at: &str) -> Result<Shape> {
    let mut members = Vec::new();
    for part in text.split('|') {
        let name = part.trim();
        let kind = LeafKind::from_name(name)
            .ok_or_else(|| schema_error(at, format!("unknown type '{name}'")))?;
        members.push(Shape::Leaf(kind));
    }
    Ok(Shape::union(members))
}

fn shape_from_mapping(mapping: &Mapping, at: &str) -> Result<Shape> {
    let mut keys = Vec::with_capacity(mapping.len());
    for key in mapping.keys() {
        match key.as_str() {
            Some(k) => keys.push(k),
            None => return Err(schema_error(at, "field names must be strings")),
        }
    }

    for reserved in [DYNAMIC_KEY, LIST_KEY, UNION_KEY] {
        if keys.contains(&reserved) && keys.len() > 1 {
            return Err(schema_error(
                at,
                format!("'{reserved}' cannot be mixed with named fields"),
            ));
        }
    }

    if let Some(inner) = mapping.get(DYNAMIC_KEY) {
        return Ok(Shape::dynamic(shape_from_yaml(inner, &join(at, DYNAMIC_KEY))?));
    }
    if let Some(inner) = mapping.get(LIST_KEY) {
        return Ok(Shape::list(shape_from_yaml(inner, &join(at, LIST_KEY))?));
    }
    if let Some(inner) = mapping.get(UNION_KEY) {
        let members = inner
            .as_sequence()
            .filter(|m| !m.is_empty())
            .ok_or_else(|| schema_error(at, "a union lists its members as a sequence"))?;
        let shapes = members
            .iter()
            .map(|m| shape_from_yaml(m, at))
            .collect::<Result<Vec<_>>>()?;
        return Ok(Shape::union(shapes));
    }

    let mut fields = BTreeMap::new();
    for (key, inner) in keys.iter().zip(mapping.values()) {
        let (name, optional) = match key.strip_suffix('?') {
            Some(name) => (name, true),
            None => (*key, false),
        };
        if name.is_empty() || name.contains('/') {
            return Err(schema_error(at, format!("invalid field name '{key}'")));
        }
        let shape = shape_from_yaml(inner, &join(at, name))?;
        if fields
            .insert(name.to_string(), Field { shape, optional })
            .is_some()
        {
            return Err(schema_error(at, format!("field '{name}' declared twice")));
        }
    }
    Ok(Shape::Fixed(fields))
}

fn join(at: &str, segment: &str) -> String {
    if at.is_empty() {
        segment.to_string()
    } else {
        format!("{at}/{segment}")
    }
}

fn schema_error(at: &str, message: impl std::fmt::Display) -> TypedRtdbError {
    if at.is_empty() {
        TypedRtdbError::Schema(format!("at root: {message}"))
    } else {
        TypedRtdbError::Schema(format!("at '{at}': {message}"))
    }
}

impl TryFrom<Value> for Shape {
    type Error = TypedRtdbError;

    fn try_from(value: Value) -> Result<Self> {
        shape_from_yaml(&value, "")
    }
}

impl From<Shape> for Value {
    fn from(shape: Shape) -> Self {
        match shape {
            Shape::Leaf(kind) => Value::String(kind.name().to_string()),
            Shape::Fixed(fields) => {
                let mut mapping = Mapping::new();
                for (name, field) in fields {
                    let key = if field.optional {
                        format!("{name}?")
                    } else {
                        name
                    };
                    mapping.insert(Value::String(key), Value::from(field.shape));
                }
                Value::Mapping(mapping)
            }
            Shape::Dynamic(inner) => single_entry(DYNAMIC_KEY, Value::from(*inner)),
            Shape::List(inner) => Value::Sequence(vec![Value::from(*inner)]),
            Shape::Union(members) => {
                if members.iter().all(|m| matches!(m, Shape::Leaf(_))) {
                    let names: Vec<String> = members.iter().map(|m| m.to_string()).collect();
                    Value::String(names.join(" | "))
                } else {
                    let items = members.into_iter().map(Value::from).collect();
                    single_entry(UNION_KEY, Value::Sequence(items))
                }
            }
        }
    }
}

fn single_entry(key: &str, value: Value) -> Value {
    let mut mapping = Mapping::new();
    mapping.insert(Value::String(key.to_string()), value);
    Value::Mapping(mapping)
}
