use super::Constraint;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A query constraint in the form the backing store consumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum QueryConstraint {
    OrderByKey,
    OrderByValue,
    OrderByPriority,
    OrderByChild {
        path: String,
    },
    StartAt {
        value: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        key: Option<String>,
    },
    StartAfter {
        value: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        key: Option<String>,
    },
    EndAt {
        value: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        key: Option<String>,
    },
    EndBefore {
        value: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        key: Option<String>,
    },
    EqualTo {
        value: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        key: Option<String>,
    },
    LimitToFirst {
        limit: u32,
    },
    LimitToLast {
        limit: u32,
    },
}

/// A location plus the ordered constraints to apply there. This is the only
/// query shape handed to a [`Backend`](crate::backend::Backend).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NativeQuery {
    pub path: String,
    #[serde(default)]
    pub constraints: Vec<QueryConstraint>,
}

impl NativeQuery {
    /// A plain location with no constraints.
    pub fn at(path: impl Into<String>) -> Self {
        NativeQuery {
            path: path.into(),
            constraints: Vec::new(),
        }
    }
}

/// Convert validated constraints to store constraints, one for one and in
/// declaration order. Nothing is merged, dropped or reordered.
pub fn compile_constraints(constraints: &[Constraint]) -> Vec<QueryConstraint> {
    constraints.iter().map(compile_one).collect()
}

fn compile_one(constraint: &Constraint) -> QueryConstraint {
    match constraint {
        Constraint::OrderByKey => QueryConstraint::OrderByKey,
        Constraint::OrderByValue => QueryConstraint::OrderByValue,
        Constraint::OrderByPriority => QueryConstraint::OrderByPriority,
        Constraint::OrderByChild(path) => QueryConstraint::OrderByChild { path: path.clone() },
        Constraint::StartAt { value, key } => QueryConstraint::StartAt {
            value: value.to_value(),
            key: key.clone(),
        },
        Constraint::StartAfter { value, key } => QueryConstraint::StartAfter {
            value: value.to_value(),
            key: key.clone(),
        },
        Constraint::EndAt { value, key } => QueryConstraint::EndAt {
            value: value.to_value(),
            key: key.clone(),
        },
        Constraint::EndBefore { value, key } => QueryConstraint::EndBefore {
            value: value.to_value(),
            key: key.clone(),
        },
        Constraint::EqualTo { value, key } => QueryConstraint::EqualTo {
            value: value.to_value(),
            key: key.clone(),
        },
        Constraint::LimitToFirst(limit) => QueryConstraint::LimitToFirst { limit: *limit },
        Constraint::LimitToLast(limit) => QueryConstraint::LimitToLast { limit: *limit },
    }
}
