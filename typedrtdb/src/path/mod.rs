// Path algebra - parsing, parent derivation and resolution against a schema

use crate::error::{Result, TypedRtdbError};
use crate::schema::Shape;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Pattern standing for "any key" of a dynamic container.
pub const ANY_KEY: &str = "*";
/// Pattern standing for "any index" of a list.
pub const ANY_INDEX: &str = "#";

/// A validated slash-delimited path. The root is the empty path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Path {
    segments: Vec<String>,
}

impl Path {
    pub fn root() -> Self {
        Path::default()
    }

    /// Parse a path string. One leading slash is ignored; any other empty
    /// segment (double or trailing slash) makes the path invalid.
    pub fn parse(raw: &str) -> Result<Self> {
        let segments = split_path(raw).ok_or_else(|| {
            TypedRtdbError::invalid_path(raw, "empty segment (double or trailing slash)")
        })?;
        Ok(Path {
            segments: segments.into_iter().map(str::to_string).collect(),
        })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// The last segment, or `None` at the root.
    pub fn key(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// The parent path, or `None` at the root.
    pub fn parent(&self) -> Option<Path> {
        if self.is_root() {
            return None;
        }
        Some(Path {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// Append a relative path.
    pub fn join(&self, relative: &Path) -> Path {
        let mut segments = self.segments.clone();
        segments.extend(relative.segments.iter().cloned());
        Path { segments }
    }

    /// Append a single key.
    pub fn child(&self, key: &str) -> Path {
        let mut segments = self.segments.clone();
        segments.push(key.to_string());
        Path { segments }
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("/"))
    }
}

impl FromStr for Path {
    type Err = TypedRtdbError;

    fn from_str(s: &str) -> Result<Self> {
        Path::parse(s)
    }
}

/// Split a path string into segments, or `None` if it contains an empty
/// segment after the optional leading slash.
pub fn split_path(raw: &str) -> Option<Vec<&str>> {
    let rest = raw.strip_prefix('/').unwrap_or(raw);
    if rest.is_empty() {
        return Some(Vec::new());
    }
    let segments: Vec<&str> = rest.split('/').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return None;
    }
    Some(segments)
}

/// Resolve the shape at `path` below `shape`. `None` means no such path.
///
/// ```
/// use typedrtdb::path::resolve;
/// use typedrtdb::schema::{parse_schema_str, Shape};
///
/// let schema = parse_schema_str("a:\n  b: number\n").unwrap();
/// assert_eq!(resolve(&schema, "/a/b"), Some(Shape::number()));
/// assert_eq!(resolve(&schema, "/a/b/"), None);
/// ```
pub fn resolve(shape: &Shape, path: &str) -> Option<Shape> {
    let segments = split_path(path)?;
    resolve_segments(shape, &segments)
}

/// Resolve already-split segments below `shape`.
pub fn resolve_segments<S: AsRef<str>>(shape: &Shape, segments: &[S]) -> Option<Shape> {
    let mut current = shape.clone();
    for segment in segments {
        current = step(&current, segment.as_ref())?;
    }
    Some(current)
}

fn step(shape: &Shape, segment: &str) -> Option<Shape> {
    match shape {
        Shape::Leaf(_) => None,
        Shape::Fixed(fields) => fields.get(segment).map(|f| f.shape.clone()),
        Shape::Dynamic(value) => {
            if segment.is_empty() {
                None
            } else {
                Some((**value).clone())
            }
        }
        Shape::List(element) => {
            if is_index(segment) {
                Some((**element).clone())
            } else {
                None
            }
        }
        Shape::Union(members) => {
            let resolved: Vec<Shape> = members.iter().filter_map(|m| step(m, segment)).collect();
            if resolved.is_empty() {
                None
            } else {
                Some(Shape::union(resolved))
            }
        }
    }
}

/// Whether a segment is a decimal list index.
pub fn is_index(segment: &str) -> bool {
    !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit())
}

/// Drop the last non-empty segment of a path string. The parent of a
/// one-segment path, and of the root, is `""`. A leading slash is kept.
pub fn parent_path(path: &str) -> String {
    let (lead, rest) = match path.strip_prefix('/') {
        Some(rest) => ("/", rest),
        None => ("", path),
    };
    let segments: Vec<&str> = rest.split('/').filter(|s| !s.is_empty()).collect();
    if segments.len() <= 1 {
        return String::new();
    }
    format!("{lead}{}", segments[..segments.len() - 1].join("/"))
}

/// Shape of the concrete child `key`, as seen when iterating a container.
pub fn child_shape_for_key(shape: &Shape, key: &str) -> Option<Shape> {
    step(shape, key)
}

/// The value shape accepted for a new, generated key under `shape`.
/// Only containers accepting arbitrary string keys support this.
pub fn dynamic_child_value_shape(shape: &Shape) -> Option<Shape> {
    match shape {
        Shape::Dynamic(value) => Some((**value).clone()),
        Shape::Union(members) => {
            let values: Vec<Shape> = members
                .iter()
                .filter_map(|m| match m {
                    Shape::Dynamic(value) => Some((**value).clone()),
                    _ => None,
                })
                .collect();
            if values.is_empty() {
                None
            } else {
                Some(Shape::union(values))
            }
        }
        _ => None,
    }
}

/// Direct child patterns of `shape` with their shapes: field names for fixed
/// objects, [`ANY_KEY`] for dynamic containers, [`ANY_INDEX`] for lists.
pub fn direct_children(shape: &Shape) -> Vec<(String, Shape)> {
    match shape {
        Shape::Leaf(_) => Vec::new(),
        Shape::Fixed(fields) => fields
            .iter()
            .map(|(name, field)| (name.clone(), field.shape.clone()))
            .collect(),
        Shape::Dynamic(value) => vec![(ANY_KEY.to_string(), (**value).clone())],
        Shape::List(element) => vec![(ANY_INDEX.to_string(), (**element).clone())],
        Shape::Union(members) => {
            let mut merged: Vec<(String, Shape)> = Vec::new();
            for member in members {
                for (pattern, child) in direct_children(member) {
                    match merged.iter_mut().find(|(p, _)| *p == pattern) {
                        Some((_, existing)) => {
                            *existing = Shape::union([existing.clone(), child]);
                        }
                        None => merged.push((pattern, child)),
                    }
                }
            }
            merged
        }
    }
}

/// The child path patterns legal below `shape`. A pattern is suffixed with
/// `/*` as well when its own shape has children.
pub fn valid_child_patterns(shape: &Shape) -> BTreeSet<String> {
    let mut patterns = BTreeSet::new();
    for (pattern, child) in direct_children(shape) {
        if child.has_children() {
            patterns.insert(format!("{pattern}/*"));
        }
        patterns.insert(pattern);
    }
    patterns
}

/// Every addressable path pattern below `shape`, depth-first, parents
/// before children.
pub fn path_patterns(shape: &Shape) -> Vec<String> {
    let mut out = Vec::new();
    collect_patterns(shape, "", &mut out);
    out
}

fn collect_patterns(shape: &Shape, prefix: &str, out: &mut Vec<String>) {
    for (pattern, child) in direct_children(shape) {
        let full = if prefix.is_empty() {
            pattern
        } else {
            format!("{prefix}/{pattern}")
        };
        out.push(full.clone());
        collect_patterns(&child, &full, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::parse_schema_str;
    use pretty_assertions::assert_eq;

    fn test_schema() -> Shape {
        parse_schema_str(
            r#"
a:
  b: number
users:
  "*":
    name: string
    score: number
    nickname?: string
    tags: [string]
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_resolve_nested_field() {
        let schema = test_schema();
        assert_eq!(resolve(&schema, "/a/b"), Some(Shape::number()));
        assert_eq!(resolve(&schema, "a/b"), Some(Shape::number()));
    }

    #[test]
    fn test_trailing_slash_is_absent() {
        let schema = test_schema();
        assert_eq!(resolve(&schema, "/a/b/"), None);
        assert_eq!(resolve(&schema, "a//b"), None);
        assert_eq!(resolve(&schema, "//a"), None);
    }

    #[test]
    fn test_empty_path_is_root() {
        let schema = test_schema();
        assert_eq!(resolve(&schema, ""), Some(schema.clone()));
        assert_eq!(resolve(&schema, "/"), Some(schema.clone()));
    }

    #[test]
    fn test_unknown_field_is_absent() {
        let schema = test_schema();
        assert_eq!(resolve(&schema, "/a/c"), None);
    }

    #[test]
    fn test_leaf_has_no_children() {
        let schema = test_schema();
        assert_eq!(resolve(&schema, "/a/b/c"), None);
    }

    #[test]
    fn test_dynamic_key_resolves_value() {
        let schema = test_schema();
        assert_eq!(resolve(&schema, "/users/u1/name"), Some(Shape::string()));
        assert_eq!(resolve(&schema, "/users/42/score"), Some(Shape::number()));
        assert_eq!(resolve(&schema, "/users/u1/nickname"), Some(Shape::string()));
    }

    #[test]
    fn test_list_requires_numeric_segment() {
        let schema = test_schema();
        assert_eq!(resolve(&schema, "/users/u1/tags/0"), Some(Shape::string()));
        assert_eq!(resolve(&schema, "/users/u1/tags/first"), None);
    }

    #[test]
    fn test_union_resolution() {
        let schema = parse_schema_str("v:\n  '|':\n    - { a: number }\n    - { a: string, b: boolean }\n    - null\n").unwrap();
        assert_eq!(
            resolve(&schema, "v/a"),
            Some(Shape::union([Shape::number(), Shape::string()]))
        );
        assert_eq!(resolve(&schema, "v/b"), Some(Shape::boolean()));
        assert_eq!(resolve(&schema, "v/c"), None);
    }

    #[test]
    fn test_parent_path() {
        assert_eq!(parent_path("a/b/c"), "a/b");
        assert_eq!(parent_path("a"), "");
        assert_eq!(parent_path(""), "");
        assert_eq!(parent_path("/a/b"), "/a");
        assert_eq!(parent_path("/a"), "");
    }

    #[test]
    fn test_path_value() {
        let path = Path::parse("/users/u1/name").unwrap();
        assert_eq!(path.to_string(), "users/u1/name");
        assert_eq!(path.key(), Some("name"));
        assert_eq!(path.parent().unwrap().to_string(), "users/u1");
        assert!(Path::root().parent().is_none());
        assert!(Path::parse("users/").is_err());
    }

    #[test]
    fn test_valid_child_patterns() {
        let schema = test_schema();
        let root: Vec<String> = valid_child_patterns(&schema).into_iter().collect();
        assert_eq!(root, vec!["a", "a/*", "users", "users/*"]);

        let users = resolve(&schema, "users").unwrap();
        let patterns: Vec<String> = valid_child_patterns(&users).into_iter().collect();
        assert_eq!(patterns, vec!["*", "*/*"]);

        assert!(valid_child_patterns(&Shape::number()).is_empty());
    }

    #[test]
    fn test_dynamic_child_value_shape() {
        let schema = test_schema();
        let users = resolve(&schema, "users").unwrap();
        assert_eq!(
            dynamic_child_value_shape(&users),
            resolve(&schema, "users/anything")
        );
        assert_eq!(dynamic_child_value_shape(&schema), None);
        let tags = resolve(&schema, "users/u1/tags").unwrap();
        assert_eq!(dynamic_child_value_shape(&tags), None);
    }

    #[test]
    fn test_path_patterns() {
        let schema = test_schema();
        assert_eq!(
            path_patterns(&schema),
            vec![
                "a",
                "a/b",
                "users",
                "users/*",
                "users/*/name",
                "users/*/nickname",
                "users/*/score",
                "users/*/tags",
                "users/*/tags/#",
            ]
        );
    }
}
