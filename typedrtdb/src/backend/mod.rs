//! The boundary with the store that actually holds the data.
//!
//! Everything above this trait is typed and validated; everything below it is
//! raw JSON. Implementations own transport, persistence, auth and event
//! delivery. The crate only promises to call them with paths that resolve in
//! the schema, values that match it, and constraints in declaration order.

mod memory;

pub use memory::MemoryBackend;

use crate::error::StoreError;
use crate::query::NativeQuery;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::mpsc;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// What a transaction update function decided for one attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum TransactionOutcome {
    /// Write this value (null deletes).
    Commit(Value),
    /// Leave the data untouched and stop.
    Abort,
}

/// Final state of a transaction as reported by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionCommit {
    pub committed: bool,
    /// The value at the location after the transaction finished.
    pub value: Option<Value>,
}

/// Kinds of realtime events a location or query can be listened to for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Value,
    ChildAdded,
    ChildChanged,
    ChildMoved,
    ChildRemoved,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Value => "value",
            EventKind::ChildAdded => "child_added",
            EventKind::ChildChanged => "child_changed",
            EventKind::ChildMoved => "child_moved",
            EventKind::ChildRemoved => "child_removed",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An untyped event as delivered by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEvent {
    pub kind: EventKind,
    /// Child key for child events, `None` for value events.
    pub key: Option<String>,
    pub value: Option<Value>,
    pub previous_key: Option<String>,
}

pub type SubscriptionId = u64;

/// A live subscription. Events arrive on `events` until the store closes the
/// channel or [`Backend::unsubscribe`] is called.
#[derive(Debug)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub events: mpsc::Receiver<RawEvent>,
}

/// Operations the typed layer delegates to the backing store.
pub trait Backend: Send + Sync {
    /// Read the value at a location, with query constraints applied.
    /// `None` means nothing is stored there.
    fn get(&self, query: &NativeQuery) -> StoreResult<Option<Value>>;

    /// Replace the value at `path`; null deletes.
    fn set(&self, path: &str, value: Value) -> StoreResult<()>;

    /// Write several relative locations below `path` at once.
    fn update(&self, path: &str, entries: Map<String, Value>) -> StoreResult<()>;

    /// A fresh child key. Keys generated later sort after earlier ones.
    fn generate_key(&self) -> StoreResult<String>;

    /// Store `value` under a generated key below `path` and return the key.
    fn push(&self, path: &str, value: Value) -> StoreResult<String> {
        let key = self.generate_key()?;
        self.set(&join_path(path, &key), value)?;
        Ok(key)
    }

    /// Run `update` against the current value until it commits without
    /// contention or aborts. `update` may be called more than once.
    fn run_transaction(
        &self,
        path: &str,
        update: &mut dyn FnMut(Option<Value>) -> TransactionOutcome,
    ) -> StoreResult<TransactionCommit>;

    fn subscribe(&self, query: &NativeQuery, kind: EventKind) -> StoreResult<Subscription>;

    fn unsubscribe(&self, id: SubscriptionId);
}

/// Join a location and a relative path with exactly one slash.
pub fn join_path(path: &str, child: &str) -> String {
    let path = path.trim_end_matches('/');
    let child = child.trim_start_matches('/');
    if path.is_empty() {
        child.to_string()
    } else {
        format!("{path}/{child}")
    }
}
