// Query builder: ordering and range constraints with a narrowing comparison type

mod compile;

pub use compile::{compile_constraints, NativeQuery, QueryConstraint};

use crate::backend::EventKind;
use crate::error::{Result, TypedRtdbError};
use crate::listener::Listener;
use crate::path;
use crate::reference::Reference;
use crate::schema::{LeafKind, Shape};
use crate::snapshot::DataSnapshot;
use crate::validation::type_name;
use serde_json::{Number, Value};
use std::fmt;

/// A value accepted by range constraints.
#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
}

impl Primitive {
    /// A number primitive; NaN and infinities are rejected.
    pub fn number(n: f64) -> Result<Self> {
        Number::from_f64(n)
            .map(Primitive::Number)
            .ok_or_else(|| TypedRtdbError::mismatch("", format!("{n} is not a finite number")))
    }

    pub fn kind(&self) -> LeafKind {
        match self {
            Primitive::Null => LeafKind::Null,
            Primitive::Bool(_) => LeafKind::Boolean,
            Primitive::Number(_) => LeafKind::Number,
            Primitive::String(_) => LeafKind::String,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Primitive::Null => Value::Null,
            Primitive::Bool(b) => Value::Bool(*b),
            Primitive::Number(n) => Value::Number(n.clone()),
            Primitive::String(s) => Value::String(s.clone()),
        }
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_value())
    }
}

impl From<&str> for Primitive {
    fn from(s: &str) -> Self {
        Primitive::String(s.to_string())
    }
}

impl From<String> for Primitive {
    fn from(s: String) -> Self {
        Primitive::String(s)
    }
}

impl From<bool> for Primitive {
    fn from(b: bool) -> Self {
        Primitive::Bool(b)
    }
}

impl From<i32> for Primitive {
    fn from(n: i32) -> Self {
        Primitive::Number(n.into())
    }
}

impl From<i64> for Primitive {
    fn from(n: i64) -> Self {
        Primitive::Number(n.into())
    }
}

impl From<u32> for Primitive {
    fn from(n: u32) -> Self {
        Primitive::Number(n.into())
    }
}

impl From<u64> for Primitive {
    fn from(n: u64) -> Self {
        Primitive::Number(n.into())
    }
}

impl From<()> for Primitive {
    fn from(_: ()) -> Self {
        Primitive::Null
    }
}

impl TryFrom<Value> for Primitive {
    type Error = TypedRtdbError;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(Primitive::Null),
            Value::Bool(b) => Ok(Primitive::Bool(b)),
            Value::Number(n) => Ok(Primitive::Number(n)),
            Value::String(s) => Ok(Primitive::String(s)),
            other => Err(TypedRtdbError::mismatch(
                "",
                format!(
                    "range values must be string, number, boolean or null, got {}",
                    type_name(&other)
                ),
            )),
        }
    }
}

/// One ordering or range-bounding directive of a query.
#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    OrderByKey,
    OrderByValue,
    OrderByPriority,
    OrderByChild(String),
    StartAt { value: Primitive, key: Option<String> },
    StartAfter { value: Primitive, key: Option<String> },
    EndAt { value: Primitive, key: Option<String> },
    EndBefore { value: Primitive, key: Option<String> },
    EqualTo { value: Primitive, key: Option<String> },
    LimitToFirst(u32),
    LimitToLast(u32),
}

impl Constraint {
    pub fn name(&self) -> &'static str {
        match self {
            Constraint::OrderByKey => "orderByKey",
            Constraint::OrderByValue => "orderByValue",
            Constraint::OrderByPriority => "orderByPriority",
            Constraint::OrderByChild(_) => "orderByChild",
            Constraint::StartAt { .. } => "startAt",
            Constraint::StartAfter { .. } => "startAfter",
            Constraint::EndAt { .. } => "endAt",
            Constraint::EndBefore { .. } => "endBefore",
            Constraint::EqualTo { .. } => "equalTo",
            Constraint::LimitToFirst(_) => "limitToFirst",
            Constraint::LimitToLast(_) => "limitToLast",
        }
    }

    pub fn is_order_by(&self) -> bool {
        matches!(
            self,
            Constraint::OrderByKey
                | Constraint::OrderByValue
                | Constraint::OrderByPriority
                | Constraint::OrderByChild(_)
        )
    }
}

/// A reference plus an append-only list of constraints.
///
/// The first constraint may be an ordering; it fixes the "active comparison
/// type" that every later range value must match. Every builder method
/// consumes the query and returns the extended one, so a rejected constraint
/// never leaves a half-built query behind.
#[derive(Debug, Clone)]
pub struct Query {
    reference: Reference,
    constraints: Vec<Constraint>,
    comparison: Option<Shape>,
}

impl Query {
    pub(crate) fn new(reference: Reference) -> Self {
        Query {
            reference,
            constraints: Vec::new(),
            comparison: None,
        }
    }

    pub fn reference(&self) -> &Reference {
        &self.reference
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    /// The type range values must match, once an ordering is set.
    pub fn comparison_type(&self) -> Option<&Shape> {
        self.comparison.as_ref()
    }

    pub fn order_by_key(self) -> Result<Self> {
        self.order_by(Constraint::OrderByKey, Shape::string())
    }

    pub fn order_by_value(self) -> Result<Self> {
        let shape = self.reference.shape().clone();
        self.order_by(Constraint::OrderByValue, shape)
    }

    pub fn order_by_priority(self) -> Result<Self> {
        let shape = Shape::union([Shape::string(), Shape::number(), Shape::null()]);
        self.order_by(Constraint::OrderByPriority, shape)
    }

    /// Order children by the value at `child_path` inside each child.
    pub fn order_by_child(self, child_path: &str) -> Result<Self> {
        let segments = match path::split_path(child_path) {
            Some(s) if !s.is_empty() => s,
            _ => {
                return Err(TypedRtdbError::invalid_path(
                    child_path,
                    "orderByChild needs a non-empty relative path",
                ))
            }
        };

        let mut full = vec![path::ANY_KEY];
        full.extend(segments.iter().copied());
        let shape = path::resolve_segments(self.reference.shape(), &full).ok_or_else(|| {
            TypedRtdbError::invalid_path(
                format!("{}/*/{}", self.reference.path(), child_path),
                "children of this location have no such field",
            )
        })?;

        let normalized = segments.join("/");
        self.order_by(Constraint::OrderByChild(normalized), shape)
    }

    fn order_by(mut self, constraint: Constraint, comparison: Shape) -> Result<Self> {
        if let Some(existing) = self.constraints.iter().find(|c| c.is_order_by()) {
            return Err(TypedRtdbError::ConstraintConflict(format!(
                "{} cannot follow {}: a query has at most one ordering",
                constraint.name(),
                existing.name()
            )));
        }
        if let Some(first) = self.constraints.first() {
            return Err(TypedRtdbError::ConstraintConflict(format!(
                "{} must be the first constraint, found {} before it",
                constraint.name(),
                first.name()
            )));
        }

        self.constraints.push(constraint);
        self.comparison = Some(comparison);
        Ok(self)
    }

    pub fn start_at(self, value: impl Into<Primitive>, key: Option<&str>) -> Result<Self> {
        let value = value.into();
        self.range(value, key, |value, key| Constraint::StartAt { value, key })
    }

    pub fn start_after(self, value: impl Into<Primitive>, key: Option<&str>) -> Result<Self> {
        let value = value.into();
        self.range(value, key, |value, key| Constraint::StartAfter { value, key })
    }

    pub fn end_at(self, value: impl Into<Primitive>, key: Option<&str>) -> Result<Self> {
        let value = value.into();
        self.range(value, key, |value, key| Constraint::EndAt { value, key })
    }

    pub fn end_before(self, value: impl Into<Primitive>, key: Option<&str>) -> Result<Self> {
        let value = value.into();
        self.range(value, key, |value, key| Constraint::EndBefore { value, key })
    }

    pub fn equal_to(self, value: impl Into<Primitive>, key: Option<&str>) -> Result<Self> {
        let value = value.into();
        self.range(value, key, |value, key| Constraint::EqualTo { value, key })
    }

    fn range(
        mut self,
        value: Primitive,
        key: Option<&str>,
        make: fn(Primitive, Option<String>) -> Constraint,
    ) -> Result<Self> {
        let constraint = make(value.clone(), key.map(str::to_string));

        let comparison = self.comparison.as_ref().ok_or_else(|| {
            TypedRtdbError::ConstraintConflict(format!(
                "{} needs an orderBy constraint first",
                constraint.name()
            ))
        })?;

        // null bounds are always admissible
        let kind = value.kind();
        if kind != LeafKind::Null && !comparison.admits(kind) {
            return Err(TypedRtdbError::ConstraintConflict(format!(
                "{}({}) does not match the active comparison type {}",
                constraint.name(),
                value,
                comparison
            )));
        }

        self.constraints.push(constraint);
        Ok(self)
    }

    pub fn limit_to_first(mut self, limit: u32) -> Self {
        self.constraints.push(Constraint::LimitToFirst(limit));
        self
    }

    pub fn limit_to_last(mut self, limit: u32) -> Self {
        self.constraints.push(Constraint::LimitToLast(limit));
        self
    }

    /// The store-facing form of this query.
    pub fn compile(&self) -> NativeQuery {
        NativeQuery {
            path: self.reference.path().to_string(),
            constraints: compile_constraints(&self.constraints),
        }
    }

    /// Fetch the matching children, in the query's order.
    pub fn get(&self) -> Result<DataSnapshot> {
        let native = self.compile();
        log::debug!("get {} with {} constraint(s)", native.path, native.constraints.len());
        let value = self.reference.database().backend().get(&native)?;
        Ok(DataSnapshot::new(self.reference.clone(), value))
    }

    pub fn listen(&self, kind: EventKind) -> Result<Listener> {
        Listener::subscribe(self.reference.clone(), self.compile(), kind)
    }
}
