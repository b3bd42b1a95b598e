// Snapshots: values read from the store, tagged with the reference they came from

use crate::error::Result;
use crate::path::Path;
use crate::reference::Reference;
use crate::schema::Shape;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// The value at a location at one point in time. It may be absent; use
/// [`DataSnapshot::into_existing`] to get a snapshot whose value is known to
/// be there.
#[derive(Debug, Clone)]
pub struct DataSnapshot {
    reference: Reference,
    value: Option<Value>,
}

/// A snapshot whose value exists. Produced by narrowing a [`DataSnapshot`]
/// or by iterating children.
#[derive(Debug, Clone)]
pub struct ExistingSnapshot {
    reference: Reference,
    value: Value,
}

impl DataSnapshot {
    /// Wrap a raw value read at `reference`. A JSON null counts as absent.
    pub fn new(reference: Reference, value: Option<Value>) -> Self {
        DataSnapshot {
            reference,
            value: value.filter(|v| !v.is_null()),
        }
    }

    pub fn exists(&self) -> bool {
        self.value.is_some()
    }

    pub fn val(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    /// The key of the location, or `None` when nothing is stored there.
    /// `reference().key()` gives the location's key either way.
    pub fn key(&self) -> Option<&str> {
        self.value.as_ref().and(self.reference.key())
    }

    pub fn reference(&self) -> &Reference {
        &self.reference
    }

    pub fn shape(&self) -> &Shape {
        self.reference.shape()
    }

    /// Snapshot of a descendant. The path must exist in the schema; the
    /// value there may not.
    pub fn child(&self, path: &str) -> Result<DataSnapshot> {
        child_snapshot(&self.reference, self.value.as_ref(), path)
    }

    pub fn has_child(&self, path: &str) -> bool {
        self.child(path).map(|c| c.exists()).unwrap_or(false)
    }

    pub fn has_children(&self) -> bool {
        self.num_children() > 0
    }

    pub fn num_children(&self) -> usize {
        self.value.as_ref().map(count_children).unwrap_or(0)
    }

    /// Call `f` on each child in order until it returns `true`.
    /// Returns whether iteration was cancelled.
    pub fn for_each<F>(&self, f: F) -> bool
    where
        F: FnMut(ExistingSnapshot) -> bool,
    {
        for_each_child(self.children(), f)
    }

    pub fn children(&self) -> Vec<ExistingSnapshot> {
        match &self.value {
            Some(value) => existing_children(&self.reference, value),
            None => Vec::new(),
        }
    }

    /// Decode the value, `None` when absent.
    pub fn val_as<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        match &self.value {
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
            None => Ok(None),
        }
    }

    /// Narrow to an [`ExistingSnapshot`], or get the snapshot back if the
    /// value is absent.
    pub fn into_existing(self) -> std::result::Result<ExistingSnapshot, DataSnapshot> {
        match self.value {
            Some(value) => Ok(ExistingSnapshot {
                reference: self.reference,
                value,
            }),
            None => Err(DataSnapshot {
                reference: self.reference,
                value: None,
            }),
        }
    }
}

impl ExistingSnapshot {
    pub(crate) fn new(reference: Reference, value: Value) -> Self {
        ExistingSnapshot { reference, value }
    }

    pub fn val(&self) -> &Value {
        &self.value
    }

    /// The location's key; `""` at the root.
    pub fn key(&self) -> &str {
        self.reference.key().unwrap_or("")
    }

    pub fn reference(&self) -> &Reference {
        &self.reference
    }

    pub fn shape(&self) -> &Shape {
        self.reference.shape()
    }

    pub fn child(&self, path: &str) -> Result<DataSnapshot> {
        child_snapshot(&self.reference, Some(&self.value), path)
    }

    pub fn has_child(&self, path: &str) -> bool {
        self.child(path).map(|c| c.exists()).unwrap_or(false)
    }

    pub fn has_children(&self) -> bool {
        self.num_children() > 0
    }

    pub fn num_children(&self) -> usize {
        count_children(&self.value)
    }

    pub fn for_each<F>(&self, f: F) -> bool
    where
        F: FnMut(ExistingSnapshot) -> bool,
    {
        for_each_child(self.children(), f)
    }

    pub fn children(&self) -> Vec<ExistingSnapshot> {
        existing_children(&self.reference, &self.value)
    }

    pub fn val_as<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.value.clone())?)
    }

    pub fn into_value(self) -> Value {
        self.value
    }
}

impl From<ExistingSnapshot> for DataSnapshot {
    fn from(snapshot: ExistingSnapshot) -> Self {
        DataSnapshot {
            reference: snapshot.reference,
            value: Some(snapshot.value),
        }
    }
}

fn child_snapshot(reference: &Reference, value: Option<&Value>, path: &str) -> Result<DataSnapshot> {
    let relative = Path::parse(path)?;
    let child = reference.child(path)?;
    let value = value.and_then(|v| lookup(v, relative.segments())).cloned();
    Ok(DataSnapshot::new(child, value))
}

fn lookup<'a>(value: &'a Value, segments: &[String]) -> Option<&'a Value> {
    let mut current = value;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn count_children(value: &Value) -> usize {
    match value {
        Value::Object(map) => map.values().filter(|v| !v.is_null()).count(),
        Value::Array(items) => items.iter().filter(|v| !v.is_null()).count(),
        _ => 0,
    }
}

fn existing_children(reference: &Reference, value: &Value) -> Vec<ExistingSnapshot> {
    let entries: Vec<(String, &Value)> = match value {
        Value::Object(map) => map.iter().map(|(k, v)| (k.clone(), v)).collect(),
        Value::Array(items) => items.iter().enumerate().map(|(i, v)| (i.to_string(), v)).collect(),
        _ => return Vec::new(),
    };

    let mut children = Vec::with_capacity(entries.len());
    for (key, child) in entries {
        if child.is_null() {
            continue;
        }
        match reference.child(&key) {
            Ok(child_ref) => children.push(ExistingSnapshot::new(child_ref, child.clone())),
            Err(_) => log::warn!(
                "Skipping '{}' under '{}': not in the schema",
                key,
                reference.path()
            ),
        }
    }
    children
}

fn for_each_child<F>(children: Vec<ExistingSnapshot>, mut f: F) -> bool
where
    F: FnMut(ExistingSnapshot) -> bool,
{
    for child in children {
        if f(child) {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::reference::Database;
    use crate::schema::parse_schema_str;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;

    fn test_db(data: Value) -> Database {
        let schema = parse_schema_str(
            r#"
users:
  "*":
    name: string
    score: number
    tags?: [string]
settings:
  theme: string
  volume?: number
"#,
        )
        .unwrap();
        Database::new(schema, Arc::new(MemoryBackend::with_data(data)))
    }

    fn sample() -> Database {
        test_db(json!({
            "users": {
                "u1": { "name": "A", "score": 1, "tags": ["x", "y"] },
                "u2": { "name": "B", "score": 2 }
            },
            "settings": { "theme": "dark" }
        }))
    }

    #[test]
    fn test_existence_narrowing() {
        let db = sample();
        let present = db.reference("settings/theme").unwrap().get().unwrap();
        assert!(present.exists());
        let existing = present.into_existing().unwrap();
        assert_eq!(existing.val(), &json!("dark"));
        assert_eq!(existing.key(), "theme");

        let absent = db.reference("settings/volume").unwrap().get().unwrap();
        assert!(!absent.exists());
        assert_eq!(absent.val(), None);
        assert_eq!(absent.key(), None);
        let back = absent.into_existing().unwrap_err();
        assert_eq!(back.key(), None);
        assert_eq!(back.reference().key(), Some("volume"));
    }

    #[test]
    fn test_root_key_is_empty() {
        let db = sample();
        let root = db.root().get().unwrap().into_existing().unwrap();
        assert_eq!(root.key(), "");
    }

    #[test]
    fn test_child_lookup() {
        let db = sample();
        let users = db.reference("users").unwrap().get().unwrap();
        let name = users.child("u1/name").unwrap();
        assert_eq!(name.val(), Some(&json!("A")));
        assert_eq!(name.shape(), &Shape::string());

        let tag = users.child("u1/tags/1").unwrap();
        assert_eq!(tag.val(), Some(&json!("y")));

        assert!(!users.child("u3/name").unwrap().exists());
        assert!(users.child("u1/email").is_err());
        assert!(users.has_child("u2"));
        assert!(!users.has_child("u2/tags"));
    }

    #[test]
    fn test_children_in_order() {
        let db = sample();
        let users = db.reference("users").unwrap().get().unwrap();
        assert!(users.has_children());
        assert_eq!(users.num_children(), 2);

        let keys: Vec<String> = users.children().iter().map(|c| c.key().to_string()).collect();
        assert_eq!(keys, vec!["u1", "u2"]);
        assert_eq!(users.children()[1].shape(), db.reference("users/u2").unwrap().shape());
    }

    #[test]
    fn test_fixed_object_children_use_field_shapes() {
        let db = test_db(json!({ "settings": { "theme": "dark", "volume": 3 } }));
        let settings = db.reference("settings").unwrap().get().unwrap();
        let shapes: Vec<(String, Shape)> = settings
            .children()
            .into_iter()
            .map(|c| (c.key().to_string(), c.shape().clone()))
            .collect();
        assert_eq!(
            shapes,
            vec![("theme".to_string(), Shape::string()), ("volume".to_string(), Shape::number())]
        );
    }

    #[test]
    fn test_for_each_cancel() {
        let db = sample();
        let users = db.reference("users").unwrap().get().unwrap();

        let mut seen = Vec::new();
        let cancelled = users.for_each(|child| {
            seen.push(child.key().to_string());
            true
        });
        assert!(cancelled);
        assert_eq!(seen, vec!["u1"]);

        let mut count = 0;
        assert!(!users.for_each(|_| {
            count += 1;
            false
        }));
        assert_eq!(count, 2);
    }

    #[test]
    fn test_unknown_keys_are_skipped() {
        let db = test_db(json!({ "settings": { "theme": "dark", "legacy": true } }));
        let settings = db.reference("settings").unwrap().get().unwrap();
        let keys: Vec<String> = settings.children().iter().map(|c| c.key().to_string()).collect();
        assert_eq!(keys, vec!["theme"]);
    }

    #[test]
    fn test_typed_values() {
        let db = sample();
        let score = db.reference("users/u2/score").unwrap().get().unwrap();
        assert_eq!(score.val_as::<u32>().unwrap(), Some(2));
        let existing = score.into_existing().unwrap();
        assert!(existing.val_as::<String>().is_err());

        let absent = db.reference("users/u9/score").unwrap().get().unwrap();
        assert_eq!(absent.val_as::<u32>().unwrap(), None);
    }

    #[test]
    fn test_existing_back_to_data() {
        let db = sample();
        let existing = db.reference("users/u1/tags").unwrap().get().unwrap().into_existing().unwrap();
        let children: Vec<Value> = existing.children().into_iter().map(ExistingSnapshot::into_value).collect();
        assert_eq!(children, vec![json!("x"), json!("y")]);

        let data: DataSnapshot = existing.into();
        assert!(data.exists());
    }
}
