use crate::backend::{EventKind, RawEvent, SubscriptionId};
use crate::error::{Result, StoreError};
use crate::query::NativeQuery;
use crate::reference::Reference;
use crate::snapshot::{DataSnapshot, ExistingSnapshot};
use std::sync::mpsc;
use std::time::Duration;

/// A realtime event, with snapshots typed by the listened-to location.
#[derive(Debug, Clone)]
pub enum Event {
    Value(DataSnapshot),
    ChildAdded {
        snapshot: ExistingSnapshot,
        previous_key: Option<String>,
    },
    ChildChanged {
        snapshot: ExistingSnapshot,
        previous_key: Option<String>,
    },
    ChildMoved {
        snapshot: ExistingSnapshot,
        previous_key: Option<String>,
    },
    ChildRemoved {
        snapshot: ExistingSnapshot,
    },
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Value(_) => EventKind::Value,
            Event::ChildAdded { .. } => EventKind::ChildAdded,
            Event::ChildChanged { .. } => EventKind::ChildChanged,
            Event::ChildMoved { .. } => EventKind::ChildMoved,
            Event::ChildRemoved { .. } => EventKind::ChildRemoved,
        }
    }
}

/// A live subscription to one event kind at a location or query.
/// Events are delivered through an mpsc channel; dropping the listener
/// unsubscribes.
pub struct Listener {
    reference: Reference,
    kind: EventKind,
    id: SubscriptionId,
    events: mpsc::Receiver<RawEvent>,
}

impl Listener {
    pub(crate) fn subscribe(reference: Reference, query: NativeQuery, kind: EventKind) -> Result<Self> {
        log::debug!("listen {} on {}", kind, query.path);
        let subscription = reference.database().backend().subscribe(&query, kind)?;
        Ok(Listener {
            reference,
            kind,
            id: subscription.id,
            events: subscription.events,
        })
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn reference(&self) -> &Reference {
        &self.reference
    }

    /// Block for the next event. `None` once the store has closed the
    /// subscription.
    pub fn recv(&self) -> Option<Result<Event>> {
        self.events.recv().ok().map(|raw| self.convert(raw))
    }

    /// The next event if one is already queued.
    pub fn try_recv(&self) -> Option<Result<Event>> {
        self.events.try_recv().ok().map(|raw| self.convert(raw))
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<Result<Event>> {
        self.events.recv_timeout(timeout).ok().map(|raw| self.convert(raw))
    }

    /// Block for the next event, treating a closed subscription as an error.
    pub fn next_event(&self) -> Result<Event> {
        match self.recv() {
            Some(event) => event,
            None => Err(StoreError::new("disconnected", "subscription closed before any event").into()),
        }
    }

    /// Blocking iterator over events until the subscription closes.
    pub fn iter(&self) -> impl Iterator<Item = Result<Event>> + '_ {
        std::iter::from_fn(move || self.recv())
    }

    fn convert(&self, raw: RawEvent) -> Result<Event> {
        if raw.kind == EventKind::Value {
            return Ok(Event::Value(DataSnapshot::new(self.reference.clone(), raw.value)));
        }

        let key = raw
            .key
            .ok_or_else(|| StoreError::new("invalid-event", format!("{} event without a key", raw.kind)))?;
        let value = raw
            .value
            .filter(|v| !v.is_null())
            .ok_or_else(|| StoreError::new("invalid-event", format!("{} event for '{key}' without a value", raw.kind)))?;
        let snapshot = ExistingSnapshot::new(self.reference.child(&key)?, value);
        let previous_key = raw.previous_key;

        Ok(match raw.kind {
            EventKind::ChildAdded => Event::ChildAdded { snapshot, previous_key },
            EventKind::ChildChanged => Event::ChildChanged { snapshot, previous_key },
            EventKind::ChildMoved => Event::ChildMoved { snapshot, previous_key },
            _ => Event::ChildRemoved { snapshot },
        })
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.reference.database().backend().unsubscribe(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::error::TypedRtdbError;
    use crate::reference::Database;
    use crate::schema::parse_schema_str;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;

    fn test_db() -> Database {
        let schema = parse_schema_str(
            r#"
scores:
  "*":
    name: string
    points: number
"#,
        )
        .unwrap();
        Database::new(schema, Arc::new(MemoryBackend::new()))
    }

    fn player(name: &str, points: i64) -> serde_json::Value {
        json!({ "name": name, "points": points })
    }

    #[test]
    fn test_value_events() {
        let db = test_db();
        let scores = db.reference("scores").unwrap();
        let listener = scores.listen(EventKind::Value).unwrap();

        match listener.try_recv().unwrap().unwrap() {
            Event::Value(snapshot) => assert!(!snapshot.exists()),
            other => panic!("unexpected event: {other:?}"),
        }

        scores.child("p1").unwrap().set(&player("A", 3)).unwrap();
        match listener.try_recv().unwrap().unwrap() {
            Event::Value(snapshot) => assert_eq!(snapshot.num_children(), 1),
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(listener.try_recv().is_none());
    }

    #[test]
    fn test_child_added_typed() {
        let db = test_db();
        let scores = db.reference("scores").unwrap();
        scores.child("p1").unwrap().set(&player("A", 3)).unwrap();

        let listener = scores.listen(EventKind::ChildAdded).unwrap();
        let first = listener.try_recv().unwrap().unwrap();
        assert_eq!(first.kind(), EventKind::ChildAdded);

        let pushed = scores.push(&player("B", 5)).unwrap();
        match listener.try_recv().unwrap().unwrap() {
            Event::ChildAdded { snapshot, previous_key } => {
                assert_eq!(Some(snapshot.key()), pushed.key());
                assert_eq!(previous_key.as_deref(), Some("p1"));
                assert_eq!(snapshot.child("points").unwrap().val(), Some(&json!(5)));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_query_listener_follows_order() {
        let db = test_db();
        let scores = db.reference("scores").unwrap();
        scores.child("a").unwrap().set(&player("A", 1)).unwrap();
        scores.child("b").unwrap().set(&player("B", 2)).unwrap();

        let listener = scores
            .order_by_child("points")
            .unwrap()
            .listen(EventKind::ChildMoved)
            .unwrap();
        scores.child("a/points").unwrap().set(&json!(9)).unwrap();

        match listener.try_recv().unwrap().unwrap() {
            Event::ChildMoved { snapshot, previous_key } => {
                assert_eq!(snapshot.key(), "a");
                assert_eq!(previous_key.as_deref(), Some("b"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_child_removed() {
        let db = test_db();
        let scores = db.reference("scores").unwrap();
        scores.child("a").unwrap().set(&player("A", 1)).unwrap();

        let listener = scores.listen(EventKind::ChildRemoved).unwrap();
        scores.child("a").unwrap().remove().unwrap();
        match listener.try_recv().unwrap().unwrap() {
            Event::ChildRemoved { snapshot } => assert_eq!(snapshot.val(), &player("A", 1)),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_event_outside_schema_is_error() {
        let db = test_db();
        let listener = db.root().listen(EventKind::ChildAdded).unwrap();
        db.backend().set("legacy", json!(true)).unwrap();
        let err = listener.try_recv().unwrap().unwrap_err();
        assert!(matches!(err, TypedRtdbError::InvalidPath { .. }));
    }
}
