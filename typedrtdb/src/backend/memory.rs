use super::{
    Backend, EventKind, RawEvent, StoreResult, Subscription, SubscriptionId, TransactionCommit,
    TransactionOutcome,
};
use crate::error::StoreError;
use crate::path::split_path;
use crate::query::{NativeQuery, QueryConstraint};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::sync::atomic::{self, AtomicU64};
use std::sync::{mpsc, Mutex, MutexGuard};

/// Attempts before a contended transaction gives up.
const MAX_TRANSACTION_ATTEMPTS: usize = 25;

static NULL: Value = Value::Null;

/// An in-process store holding one JSON tree.
///
/// Follows the realtime database data model: null deletes, empty containers
/// vanish, arrays are stored as index-keyed objects. Queries use the same
/// ordering rules as the hosted store, and subscribers receive the current
/// state on subscribe followed by events diffed after every write.
pub struct MemoryBackend {
    state: Mutex<State>,
    keys: Mutex<ulid::Generator>,
    next_subscription: AtomicU64,
}

#[derive(Default)]
struct State {
    root: Value,
    subscribers: Vec<Subscriber>,
}

struct Subscriber {
    id: SubscriptionId,
    query: NativeQuery,
    kind: EventKind,
    tx: mpsc::Sender<RawEvent>,
    last: Option<Value>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        MemoryBackend {
            state: Mutex::new(State::default()),
            keys: Mutex::new(ulid::Generator::new()),
            next_subscription: AtomicU64::new(1),
        }
    }

    /// A backend pre-loaded with `data` (e.g. a JSON fixture).
    pub fn with_data(data: Value) -> Self {
        let backend = Self::new();
        if let Ok(mut state) = backend.state.lock() {
            state.root = normalize(data);
        }
        backend
    }

    /// A copy of the whole stored tree.
    pub fn data(&self) -> StoreResult<Value> {
        Ok(self.lock()?.root.clone())
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| StoreError::new("internal", "memory store lock poisoned"))
    }
}

impl Backend for MemoryBackend {
    fn get(&self, query: &NativeQuery) -> StoreResult<Option<Value>> {
        segments_of(&query.path)?;
        let state = self.lock()?;
        Ok(evaluate(&state.root, query))
    }

    fn set(&self, path: &str, value: Value) -> StoreResult<()> {
        let segments = segments_of(path)?;
        let mut state = self.lock()?;
        write_at(&mut state.root, &segments, normalize(value));
        notify(&mut state);
        Ok(())
    }

    fn update(&self, path: &str, entries: Map<String, Value>) -> StoreResult<()> {
        let base = segments_of(path)?;
        let mut writes = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            let relative = match split_path(&key) {
                Some(s) if !s.is_empty() => s,
                _ => {
                    return Err(StoreError::new(
                        "invalid-path",
                        format!("invalid update key '{key}'"),
                    ))
                }
            };
            let mut segments = base.clone();
            segments.extend(relative.into_iter().map(str::to_string));
            writes.push((segments, normalize(value)));
        }

        let mut state = self.lock()?;
        for (segments, value) in writes {
            write_at(&mut state.root, &segments, value);
        }
        notify(&mut state);
        Ok(())
    }

    fn generate_key(&self) -> StoreResult<String> {
        let mut generator = self
            .keys
            .lock()
            .map_err(|_| StoreError::new("internal", "key generator lock poisoned"))?;
        let id = generator
            .generate()
            .map_err(|e| StoreError::new("internal", format!("key generation failed: {e}")))?;
        Ok(id.to_string())
    }

    fn run_transaction(
        &self,
        path: &str,
        update: &mut dyn FnMut(Option<Value>) -> TransactionOutcome,
    ) -> StoreResult<TransactionCommit> {
        let segments = segments_of(path)?;

        for _ in 0..MAX_TRANSACTION_ATTEMPTS {
            let current = value_at(&self.lock()?.root, &segments).cloned();

            // The update function runs without the lock held; it may read the store.
            match update(current.clone()) {
                TransactionOutcome::Abort => {
                    return Ok(TransactionCommit {
                        committed: false,
                        value: current,
                    })
                }
                TransactionOutcome::Commit(next) => {
                    let mut state = self.lock()?;
                    if value_at(&state.root, &segments) != current.as_ref() {
                        continue;
                    }
                    write_at(&mut state.root, &segments, normalize(next));
                    let value = value_at(&state.root, &segments).cloned();
                    notify(&mut state);
                    return Ok(TransactionCommit {
                        committed: true,
                        value,
                    });
                }
            }
        }

        Err(StoreError::new(
            "maxretry",
            format!("transaction at '{path}' gave up after {MAX_TRANSACTION_ATTEMPTS} attempts"),
        ))
    }

    fn subscribe(&self, query: &NativeQuery, kind: EventKind) -> StoreResult<Subscription> {
        segments_of(&query.path)?;
        let id = self.next_subscription.fetch_add(1, atomic::Ordering::Relaxed);
        let (tx, rx) = mpsc::channel();

        let mut state = self.lock()?;
        let current = evaluate(&state.root, query);
        for event in initial_events(kind, &current) {
            // The receiver is still in scope, so this cannot fail
            let _ = tx.send(event);
        }
        state.subscribers.push(Subscriber {
            id,
            query: query.clone(),
            kind,
            tx,
            last: current,
        });

        Ok(Subscription { id, events: rx })
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        match self.state.lock() {
            Ok(mut state) => state.subscribers.retain(|s| s.id != id),
            Err(_) => log::warn!("Could not remove subscription {id}: memory store lock poisoned"),
        }
    }
}

fn segments_of(path: &str) -> StoreResult<Vec<String>> {
    split_path(path)
        .map(|s| s.into_iter().map(str::to_string).collect())
        .ok_or_else(|| StoreError::new("invalid-path", format!("invalid path '{path}'")))
}

/// Arrays become index-keyed objects, null children disappear and empty
/// containers collapse to null.
fn normalize(value: Value) -> Value {
    match value {
        Value::Array(items) => normalize(Value::Object(
            items
                .into_iter()
                .enumerate()
                .map(|(i, v)| (i.to_string(), v))
                .collect(),
        )),
        Value::Object(map) => {
            let kept: Map<String, Value> = map
                .into_iter()
                .filter_map(|(k, v)| {
                    let v = normalize(v);
                    if v.is_null() {
                        None
                    } else {
                        Some((k, v))
                    }
                })
                .collect();
            if kept.is_empty() {
                Value::Null
            } else {
                Value::Object(kept)
            }
        }
        other => other,
    }
}

fn value_at<'a, S: AsRef<str>>(root: &'a Value, segments: &[S]) -> Option<&'a Value> {
    let mut current = root;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment.as_ref())?,
            Value::Array(items) => items.get(segment.as_ref().parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    if current.is_null() {
        None
    } else {
        Some(current)
    }
}

fn write_at(node: &mut Value, segments: &[String], value: Value) {
    let Some((first, rest)) = segments.split_first() else {
        *node = value;
        return;
    };

    if !node.is_object() {
        if value.is_null() {
            return;
        }
        *node = Value::Object(Map::new());
    }

    let mut now_empty = false;
    if let Value::Object(map) = node {
        let child = map.entry(first.clone()).or_insert(Value::Null);
        write_at(child, rest, value);
        if child.is_null() {
            map.shift_remove(first);
        }
        now_empty = map.is_empty();
    }
    if now_empty {
        *node = Value::Null;
    }
}

enum OrderBy {
    Key,
    Value,
    Priority,
    Child(Vec<String>),
}

fn evaluate(root: &Value, query: &NativeQuery) -> Option<Value> {
    let segments = split_path(&query.path)?;
    let node = value_at(root, &segments)?;
    if query.constraints.is_empty() {
        return Some(node.clone());
    }
    let Value::Object(children) = node else {
        return Some(node.clone());
    };

    let selected = apply_constraints(children, &query.constraints);
    if selected.is_empty() {
        None
    } else {
        Some(Value::Object(selected.into_iter().collect()))
    }
}

/// Order, filter and limit the children of a node. Range filters apply
/// before limits; limits apply in declaration order.
fn apply_constraints(children: &Map<String, Value>, constraints: &[QueryConstraint]) -> Vec<(String, Value)> {
    let order = constraints
        .iter()
        .find_map(|c| match c {
            QueryConstraint::OrderByKey => Some(OrderBy::Key),
            QueryConstraint::OrderByValue => Some(OrderBy::Value),
            QueryConstraint::OrderByPriority => Some(OrderBy::Priority),
            QueryConstraint::OrderByChild { path } => Some(OrderBy::Child(
                path.split('/').filter(|s| !s.is_empty()).map(str::to_string).collect(),
            )),
            _ => None,
        })
        .unwrap_or(OrderBy::Key);

    let mut entries: Vec<(String, Value)> = children
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    entries.sort_by(|a, b| compare_entries(&order, a, b));

    for constraint in constraints {
        match constraint {
            QueryConstraint::StartAt { value, key } => entries
                .retain(|e| position(&order, e, value, key.as_deref()).map_or(true, |o| o != Ordering::Less)),
            QueryConstraint::StartAfter { value, key } => entries
                .retain(|e| position(&order, e, value, key.as_deref()) == Some(Ordering::Greater)),
            QueryConstraint::EndAt { value, key } => entries
                .retain(|e| position(&order, e, value, key.as_deref()).map_or(true, |o| o != Ordering::Greater)),
            QueryConstraint::EndBefore { value, key } => entries
                .retain(|e| position(&order, e, value, key.as_deref()) == Some(Ordering::Less)),
            QueryConstraint::EqualTo { value, key } => entries
                .retain(|e| position(&order, e, value, key.as_deref()).map_or(true, |o| o == Ordering::Equal)),
            _ => {}
        }
    }

    for constraint in constraints {
        match constraint {
            QueryConstraint::LimitToFirst { limit } => entries.truncate(*limit as usize),
            QueryConstraint::LimitToLast { limit } => {
                let limit = *limit as usize;
                if entries.len() > limit {
                    entries.drain(..entries.len() - limit);
                }
            }
            _ => {}
        }
    }

    entries
}

fn sort_value<'a>(order: &OrderBy, value: &'a Value) -> &'a Value {
    match order {
        OrderBy::Key | OrderBy::Priority => &NULL,
        OrderBy::Value => value,
        OrderBy::Child(segments) => value_at(value, segments.as_slice()).unwrap_or(&NULL),
    }
}

fn compare_entries(order: &OrderBy, a: &(String, Value), b: &(String, Value)) -> Ordering {
    match order {
        OrderBy::Key => compare_keys(&a.0, &b.0),
        _ => compare_values(sort_value(order, &a.1), sort_value(order, &b.1))
            .then_with(|| compare_keys(&a.0, &b.0)),
    }
}

/// Where an entry sits relative to a bound. `None` means the sort values are
/// equal and the bound carries no key to break the tie.
fn position(order: &OrderBy, entry: &(String, Value), bound: &Value, bound_key: Option<&str>) -> Option<Ordering> {
    if let OrderBy::Key = order {
        return Some(match bound {
            Value::Null => Ordering::Greater,
            Value::String(s) => compare_keys(&entry.0, s),
            other => compare_keys(&entry.0, &other.to_string()),
        });
    }

    match compare_values(sort_value(order, &entry.1), bound) {
        Ordering::Equal => bound_key.map(|k| compare_keys(&entry.0, k)),
        other => Some(other),
    }
}

/// 32-bit integer keys sort numerically before all other keys, which sort
/// lexicographically.
pub(crate) fn compare_keys(a: &str, b: &str) -> Ordering {
    match (index_key(a), index_key(b)) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

fn index_key(key: &str) -> Option<i32> {
    let n: i32 = key.parse().ok()?;
    if n.to_string() == key {
        Some(n)
    } else {
        None
    }
}

/// null < false < true < numbers < strings < objects
pub(crate) fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(false) => 1,
            Value::Bool(true) => 2,
            Value::Number(_) => 3,
            Value::String(_) => 4,
            Value::Array(_) | Value::Object(_) => 5,
        }
    }

    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(0.0);
            let y = y.as_f64().unwrap_or(0.0);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

fn children_of(value: &Option<Value>) -> Vec<(&String, &Value)> {
    match value {
        Some(Value::Object(map)) => map.iter().collect(),
        _ => Vec::new(),
    }
}

fn child_event(kind: EventKind, key: &str, value: &Value, previous_key: Option<&String>) -> RawEvent {
    RawEvent {
        kind,
        key: Some(key.to_string()),
        value: Some(value.clone()),
        previous_key: previous_key.cloned(),
    }
}

fn previous_key<'a>(entries: &[(&'a String, &'a Value)], index: usize) -> Option<&'a String> {
    if index == 0 {
        None
    } else {
        Some(entries[index - 1].0)
    }
}

fn initial_events(kind: EventKind, current: &Option<Value>) -> Vec<RawEvent> {
    match kind {
        EventKind::Value => vec![RawEvent {
            kind,
            key: None,
            value: current.clone(),
            previous_key: None,
        }],
        EventKind::ChildAdded => {
            let children = children_of(current);
            let mut events = Vec::with_capacity(children.len());
            for (i, (key, value)) in children.iter().enumerate() {
                events.push(child_event(kind, key, value, previous_key(&children, i)));
            }
            events
        }
        _ => Vec::new(),
    }
}

fn diff_events(kind: EventKind, old: &Option<Value>, new: &Option<Value>) -> Vec<RawEvent> {
    if kind == EventKind::Value {
        return vec![RawEvent {
            kind,
            key: None,
            value: new.clone(),
            previous_key: None,
        }];
    }

    let before = children_of(old);
    let after = children_of(new);
    let old_value = |key: &str| {
        before
            .iter()
            .find(|(k, _)| k.as_str() == key)
            .map(|(_, v)| *v)
    };
    let in_after = |key: &str| after.iter().any(|(k, _)| k.as_str() == key);

    let mut events = Vec::new();
    match kind {
        EventKind::ChildAdded => {
            for (i, (key, value)) in after.iter().enumerate() {
                if old_value(key.as_str()).is_none() {
                    events.push(child_event(kind, key, value, previous_key(&after, i)));
                }
            }
        }
        EventKind::ChildRemoved => {
            for (key, value) in before.iter() {
                if !in_after(key.as_str()) {
                    events.push(child_event(kind, key, value, None));
                }
            }
        }
        EventKind::ChildChanged => {
            for (i, (key, value)) in after.iter().enumerate() {
                if matches!(old_value(key.as_str()), Some(old) if old != *value) {
                    events.push(child_event(kind, key, value, previous_key(&after, i)));
                }
            }
        }
        EventKind::ChildMoved => {
            let common_before: Vec<&str> = before
                .iter()
                .map(|(k, _)| k.as_str())
                .filter(|k| in_after(*k))
                .collect();
            let common_after: Vec<&str> = after
                .iter()
                .map(|(k, _)| k.as_str())
                .filter(|k| common_before.contains(k))
                .collect();
            for (i, (key, value)) in after.iter().enumerate() {
                let changed = matches!(old_value(key.as_str()), Some(old) if old != *value);
                let was = common_before.iter().position(|k| *k == key.as_str());
                let now = common_after.iter().position(|k| *k == key.as_str());
                if changed && was != now {
                    events.push(child_event(kind, key, value, previous_key(&after, i)));
                }
            }
        }
        EventKind::Value => {}
    }
    events
}

fn notify(state: &mut State) {
    let root = &state.root;
    state.subscribers.retain_mut(|sub| {
        let current = evaluate(root, &sub.query);
        if current == sub.last {
            return true;
        }
        let events = diff_events(sub.kind, &sub.last, &current);
        sub.last = current;
        for event in events {
            if sub.tx.send(event).is_err() {
                log::debug!("Dropping subscription {}: receiver closed", sub.id);
                return false;
            }
        }
        true
    });
}
