use crate::backend::{Backend, EventKind, TransactionOutcome};
use crate::error::{Result, TypedRtdbError};
use crate::listener::{Event, Listener};
use crate::path::{self, Path};
use crate::query::{NativeQuery, Query};
use crate::schema::{parse_schema, Shape};
use crate::snapshot::DataSnapshot;
use crate::validation;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// The entry point: a schema paired with the store holding the data.
/// Cheap to clone; every [`Reference`] carries one.
#[derive(Clone)]
pub struct Database {
    schema: Arc<Shape>,
    backend: Arc<dyn Backend>,
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("schema", &self.schema.to_string())
            .finish_non_exhaustive()
    }
}

impl Database {
    pub fn new(schema: Shape, backend: Arc<dyn Backend>) -> Self {
        Database {
            schema: Arc::new(schema),
            backend,
        }
    }

    /// Parse the schema file at `schema_path` and attach it to `backend`.
    pub fn open(schema_path: &std::path::Path, backend: Arc<dyn Backend>) -> Result<Self> {
        let schema = parse_schema(schema_path)?;
        Ok(Database::new(schema, backend))
    }

    pub fn schema(&self) -> &Shape {
        &self.schema
    }

    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    pub fn root(&self) -> Reference {
        Reference {
            db: self.clone(),
            path: Path::root(),
            shape: (*self.schema).clone(),
        }
    }

    /// A reference to `path`. Fails with `InvalidPath` when the path is
    /// malformed or does not exist in the schema.
    pub fn reference(&self, path: &str) -> Result<Reference> {
        self.root().child_or_self(path)
    }
}

/// A typed location in the tree. Holding one proves the path resolves in the
/// schema; `shape` is what lives there.
#[derive(Clone)]
pub struct Reference {
    db: Database,
    path: Path,
    shape: Shape,
}

impl fmt::Debug for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reference")
            .field("path", &self.path.to_string())
            .field("shape", &self.shape.to_string())
            .finish()
    }
}

/// Outcome of [`Reference::transaction`].
#[derive(Debug, Clone)]
pub struct TransactionResult {
    pub committed: bool,
    pub snapshot: DataSnapshot,
}

impl Reference {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Last path segment; `None` at the root.
    pub fn key(&self) -> Option<&str> {
        self.path.key()
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Reference to a location below this one. `relative` may span several
    /// segments but must not be empty.
    pub fn child(&self, relative: &str) -> Result<Reference> {
        let parsed = Path::parse(relative)?;
        if parsed.is_root() {
            return Err(TypedRtdbError::invalid_path(relative, "child path is empty"));
        }
        self.descend(parsed, relative)
    }

    fn child_or_self(&self, relative: &str) -> Result<Reference> {
        let parsed = Path::parse(relative)?;
        self.descend(parsed, relative)
    }

    fn descend(&self, relative: Path, raw: &str) -> Result<Reference> {
        let full = self.path.join(&relative);
        let shape = path::resolve_segments(&self.shape, relative.segments())
            .ok_or_else(|| TypedRtdbError::invalid_path(full.to_string(), format!("'{raw}' is not in the schema")))?;
        Ok(Reference {
            db: self.db.clone(),
            path: full,
            shape,
        })
    }

    /// `None` at the root.
    pub fn parent(&self) -> Option<Reference> {
        let parent = self.path.parent()?;
        let shape = path::resolve_segments(self.db.schema(), parent.segments())?;
        Some(Reference {
            db: self.db.clone(),
            path: parent,
            shape,
        })
    }

    pub fn root(&self) -> Reference {
        self.db.root()
    }

    /// Child path patterns accepted below this location.
    pub fn valid_child_patterns(&self) -> BTreeSet<String> {
        path::valid_child_patterns(&self.shape)
    }

    /// Start an unconstrained query at this location.
    pub fn query(&self) -> Query {
        Query::new(self.clone())
    }

    pub fn order_by_key(&self) -> Result<Query> {
        self.query().order_by_key()
    }

    pub fn order_by_value(&self) -> Result<Query> {
        self.query().order_by_value()
    }

    pub fn order_by_priority(&self) -> Result<Query> {
        self.query().order_by_priority()
    }

    pub fn order_by_child(&self, child_path: &str) -> Result<Query> {
        self.query().order_by_child(child_path)
    }

    pub fn get(&self) -> Result<DataSnapshot> {
        self.query().get()
    }

    // ── Writes ──

    /// Replace the value at this location. `null` removes it, which is only
    /// allowed where the node may be absent.
    pub fn set(&self, value: &Value) -> Result<()> {
        self.check_replacement(value)?;
        let path = self.path.to_string();
        log::debug!("set {path}");
        self.db.backend().set(&path, value.clone())?;
        Ok(())
    }

    pub fn set_typed<T: Serialize>(&self, value: &T) -> Result<()> {
        self.set(&serde_json::to_value(value)?)
    }

    /// Write several locations below this one at once. Keys are relative
    /// paths; every entry is checked before anything is sent.
    pub fn update(&self, entries: &Map<String, Value>) -> Result<()> {
        let path = self.path.to_string();
        validation::check_update(&self.shape, entries, &path)?;
        log::debug!("update {path} ({} entries)", entries.len());
        self.db.backend().update(&path, entries.clone())?;
        Ok(())
    }

    /// Update from a serializable partial (e.g. a generated `…Partial`
    /// struct whose unset fields are skipped).
    pub fn update_typed<T: Serialize>(&self, partial: &T) -> Result<()> {
        match serde_json::to_value(partial)? {
            Value::Object(entries) => self.update(&entries),
            other => Err(TypedRtdbError::mismatch(
                self.path.to_string(),
                format!(
                    "an update needs an object of entries, got {}",
                    validation::type_name(&other)
                ),
            )),
        }
    }

    /// Store `value` under a key generated by the store and return the new
    /// child. Only locations with dynamic keys accept pushes.
    pub fn push(&self, value: &Value) -> Result<Reference> {
        let child_shape = self.push_shape()?;
        let path = self.path.to_string();
        validation::check_value(&child_shape, value, &path)?;
        log::debug!("push {path}");
        let key = self.db.backend().push(&path, value.clone())?;
        self.child(&key)
    }

    pub fn push_typed<T: Serialize>(&self, value: &T) -> Result<Reference> {
        self.push(&serde_json::to_value(value)?)
    }

    /// Reserve a generated child key without writing anything.
    pub fn new_child(&self) -> Result<Reference> {
        self.push_shape()?;
        let key = self.db.backend().generate_key()?;
        self.child(&key)
    }

    fn push_shape(&self) -> Result<Shape> {
        path::dynamic_child_value_shape(&self.shape).ok_or_else(|| {
            TypedRtdbError::invalid_path(
                self.path.to_string(),
                format!("{} has no dynamic keys to push to", self.shape),
            )
        })
    }

    /// Delete the value here. Required locations cannot be removed.
    pub fn remove(&self) -> Result<()> {
        self.set(&Value::Null)
    }

    /// Atomically replace the value using `update`, which sees the current
    /// value and returns the new one, or `None` to abort. The store may call
    /// `update` several times. A result that does not match the schema aborts
    /// the transaction and is reported as `SchemaMismatch`.
    pub fn transaction<F>(&self, mut update: F) -> Result<TransactionResult>
    where
        F: FnMut(Option<&Value>) -> Option<Value>,
    {
        let path = self.path.to_string();
        let mut rejected: Option<TypedRtdbError> = None;

        log::debug!("transaction {path}");
        let commit = self.db.backend().run_transaction(&path, &mut |current| {
            let Some(next) = update(current.as_ref()) else {
                rejected = None;
                return TransactionOutcome::Abort;
            };
            match self.check_replacement(&next) {
                Ok(()) => {
                    rejected = None;
                    TransactionOutcome::Commit(next)
                }
                Err(e) => {
                    rejected = Some(e);
                    TransactionOutcome::Abort
                }
            }
        })?;

        if let Some(e) = rejected {
            return Err(e);
        }
        Ok(TransactionResult {
            committed: commit.committed,
            snapshot: DataSnapshot::new(self.clone(), commit.value),
        })
    }

    fn check_replacement(&self, value: &Value) -> Result<()> {
        if value.is_null() {
            if validation::may_be_absent(self.db.schema(), self.path.segments()) {
                return Ok(());
            }
            return Err(TypedRtdbError::mismatch(
                self.path.to_string(),
                "location is required by the schema and cannot be removed",
            ));
        }
        validation::check_value(&self.shape, value, &self.path.to_string())
    }

    // ── Events ──

    pub fn listen(&self, kind: EventKind) -> Result<Listener> {
        Listener::subscribe(self.clone(), NativeQuery::at(self.path.to_string()), kind)
    }

    /// Wait for the first event of `kind` and stop listening. A value event
    /// arrives immediately; child events block until one happens.
    pub fn once(&self, kind: EventKind) -> Result<Event> {
        self.listen(kind)?.next_event()
    }
}
