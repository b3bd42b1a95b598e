use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Primitive value kinds a leaf of the schema can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LeafKind {
    String,
    Number,
    Boolean,
    Null,
}

impl LeafKind {
    pub fn name(&self) -> &'static str {
        match self {
            LeafKind::String => "string",
            LeafKind::Number => "number",
            LeafKind::Boolean => "boolean",
            LeafKind::Null => "null",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "string" => Some(LeafKind::String),
            "number" => Some(LeafKind::Number),
            "boolean" => Some(LeafKind::Boolean),
            "null" => Some(LeafKind::Null),
            _ => None,
        }
    }

    /// The kind of a JSON value, if it is a primitive.
    pub fn of(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Null => Some(LeafKind::Null),
            serde_json::Value::Bool(_) => Some(LeafKind::Boolean),
            serde_json::Value::Number(_) => Some(LeafKind::Number),
            serde_json::Value::String(_) => Some(LeafKind::String),
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => None,
        }
    }
}

/// A named field of a fixed object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub shape: Shape,
    /// Optional fields may be absent (or null) in stored values.
    pub optional: bool,
}

impl Field {
    pub fn required(shape: Shape) -> Self {
        Field {
            shape,
            optional: false,
        }
    }

    pub fn optional(shape: Shape) -> Self {
        Field {
            shape,
            optional: true,
        }
    }
}

/// A node of the schema tree: the declared shape of the data at one path.
///
/// The tree is built once from a schema file and never from user data, so it
/// is always finite and acyclic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "serde_yaml::Value", into = "serde_yaml::Value")]
pub enum Shape {
    Leaf(LeafKind),
    /// Exactly these named fields; any other key is invalid.
    Fixed(BTreeMap<String, Field>),
    /// Any non-empty string key, every child sharing one shape.
    Dynamic(Box<Shape>),
    /// Numeric-indexed container; only decimal-digit keys address children.
    List(Box<Shape>),
    Union(Vec<Shape>),
}

impl Shape {
    pub fn string() -> Self {
        Shape::Leaf(LeafKind::String)
    }

    pub fn number() -> Self {
        Shape::Leaf(LeafKind::Number)
    }

    pub fn boolean() -> Self {
        Shape::Leaf(LeafKind::Boolean)
    }

    pub fn null() -> Self {
        Shape::Leaf(LeafKind::Null)
    }

    pub fn dynamic(value: Shape) -> Self {
        Shape::Dynamic(Box::new(value))
    }

    pub fn list(element: Shape) -> Self {
        Shape::List(Box::new(element))
    }

    /// Build a fixed object from `(name, field)` pairs.
    pub fn fixed<I, K>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, Field)>,
        K: Into<String>,
    {
        Shape::Fixed(fields.into_iter().map(|(k, f)| (k.into(), f)).collect())
    }

    /// Build a union, flattening nested unions and dropping duplicates.
    /// A union of one member is that member.
    pub fn union<I: IntoIterator<Item = Shape>>(members: I) -> Self {
        let mut flat: Vec<Shape> = Vec::new();
        for member in members {
            match member {
                Shape::Union(inner) => {
                    for m in inner {
                        if !flat.contains(&m) {
                            flat.push(m);
                        }
                    }
                }
                other => {
                    if !flat.contains(&other) {
                        flat.push(other);
                    }
                }
            }
        }

        if flat.len() == 1 {
            flat.remove(0)
        } else {
            Shape::Union(flat)
        }
    }

    /// Whether values of this shape can have child paths.
    pub fn has_children(&self) -> bool {
        match self {
            Shape::Leaf(_) => false,
            Shape::Fixed(fields) => !fields.is_empty(),
            Shape::Dynamic(_) | Shape::List(_) => true,
            Shape::Union(members) => members.iter().any(Shape::has_children),
        }
    }

    /// Whether a primitive of `kind` is an admissible value of this shape.
    pub fn admits(&self, kind: LeafKind) -> bool {
        match self {
            Shape::Leaf(k) => *k == kind,
            Shape::Union(members) => members.iter().any(|m| m.admits(kind)),
            _ => false,
        }
    }

    pub fn is_nullable(&self) -> bool {
        self.admits(LeafKind::Null)
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Shape::Leaf(kind) => write!(f, "{}", kind.name()),
            Shape::Fixed(fields) => {
                write!(f, "{{")?;
                for (i, (name, field)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    let marker = if field.optional { "?" } else { "" };
                    write!(f, "{name}{marker}: {}", field.shape)?;
                }
                write!(f, "}}")
            }
            Shape::Dynamic(value) => write!(f, "{{*: {value}}}"),
            Shape::List(element) => write!(f, "[{element}]"),
            Shape::Union(members) => {
                for (i, member) in members.iter().enumerate() {
                    if i > 0 {
                        write!(f, " | ")?;
                    }
                    write!(f, "{member}")?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_union_flattens_and_dedupes() {
        let shape = Shape::union([
            Shape::string(),
            Shape::union([Shape::number(), Shape::string()]),
            Shape::null(),
        ]);
        assert_eq!(
            shape,
            Shape::Union(vec![Shape::string(), Shape::number(), Shape::null()])
        );
    }

    #[test]
    fn test_union_of_one_is_member() {
        assert_eq!(Shape::union([Shape::number()]), Shape::number());
    }

    #[test]
    fn test_admits() {
        let priority = Shape::union([Shape::string(), Shape::number(), Shape::null()]);
        assert!(priority.admits(LeafKind::Number));
        assert!(priority.is_nullable());
        assert!(!priority.admits(LeafKind::Boolean));
        assert!(!Shape::dynamic(Shape::number()).admits(LeafKind::Number));
    }

    #[test]
    fn test_display() {
        let shape = Shape::dynamic(Shape::fixed([
            ("name", Field::required(Shape::string())),
            ("nick", Field::optional(Shape::union([Shape::string(), Shape::null()]))),
        ]));
        assert_eq!(shape.to_string(), "{*: {name: string, nick?: string | null}}");
    }
}
