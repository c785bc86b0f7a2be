use std::collections::{BTreeMap, BTreeSet};
use std::sync::RwLock;

use bazaar_core::{AggregateId, ExpectedVersion};

use super::r#trait::{EventStore, EventStoreError, StoredEvent, StreamAppend, UncommittedEvent};

/// In-memory append-only event store.
///
/// Intended for tests/dev. A single lock guards every stream, so a
/// multi-stream append checks and writes all of its streams atomically.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    streams: RwLock<BTreeMap<AggregateId, Vec<StoredEvent>>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn current_version(stream: &[StoredEvent]) -> u64 {
        stream.last().map(|e| e.sequence_number).unwrap_or(0)
    }

    /// Per-batch checks that need no stream state.
    fn validate_batch(append: &StreamAppend) -> Result<(), EventStoreError> {
        let Some(first) = append.events.first() else {
            return Ok(());
        };
        for (idx, e) in append.events.iter().enumerate() {
            if e.aggregate_id != append.aggregate_id {
                return Err(EventStoreError::InvalidAppend(format!(
                    "batch contains multiple aggregate_ids (index {idx})"
                )));
            }
            if e.aggregate_type != first.aggregate_type {
                return Err(EventStoreError::AggregateTypeMismatch(format!(
                    "batch contains multiple aggregate_types (index {idx})"
                )));
            }
        }
        Ok(())
    }

    fn check_stream(stream: &[StoredEvent], append: &StreamAppend) -> Result<(), EventStoreError> {
        let current = Self::current_version(stream);
        if !append.expected_version.matches(current) {
            return Err(EventStoreError::Concurrency(format!(
                "stream {}: expected {:?}, found {current}",
                append.aggregate_id, append.expected_version
            )));
        }

        // Enforce aggregate type stability across the stream.
        if let (Some(existing), Some(incoming)) = (stream.first(), append.events.first()) {
            if existing.aggregate_type != incoming.aggregate_type {
                return Err(EventStoreError::AggregateTypeMismatch(format!(
                    "stream aggregate_type is '{}', attempted append with '{}'",
                    existing.aggregate_type, incoming.aggregate_type
                )));
            }
        }
        Ok(())
    }

    fn write(stream: &mut Vec<StoredEvent>, events: Vec<UncommittedEvent>) -> Vec<StoredEvent> {
        let mut next = Self::current_version(stream) + 1;
        let mut committed = Vec::with_capacity(events.len());
        for e in events {
            let stored = StoredEvent {
                event_id: e.event_id,
                aggregate_id: e.aggregate_id,
                aggregate_type: e.aggregate_type,
                sequence_number: next,
                event_type: e.event_type,
                event_version: e.event_version,
                occurred_at: e.occurred_at,
                payload: e.payload,
            };
            next += 1;
            stream.push(stored.clone());
            committed.push(stored);
        }
        committed
    }
}

impl EventStore for InMemoryEventStore {
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let Some(first) = events.first() else {
            return Ok(vec![]);
        };
        let aggregate_id = first.aggregate_id;
        self.append_streams(vec![StreamAppend {
            aggregate_id,
            expected_version,
            events,
        }])
    }

    fn append_streams(&self, appends: Vec<StreamAppend>) -> Result<Vec<StoredEvent>, EventStoreError> {
        let mut seen = BTreeSet::new();
        for append in &appends {
            if !seen.insert(append.aggregate_id) {
                return Err(EventStoreError::InvalidAppend(format!(
                    "stream {} appears twice in one append",
                    append.aggregate_id
                )));
            }
            Self::validate_batch(append)?;
        }

        let mut streams = self
            .streams
            .write()
            .map_err(|_| EventStoreError::Unavailable("lock poisoned".to_string()))?;

        // 1) Check every stream before touching any of them.
        for append in &appends {
            let stream = streams.get(&append.aggregate_id).map(Vec::as_slice).unwrap_or(&[]);
            Self::check_stream(stream, append)?;
        }

        // 2) Write.
        let mut committed = Vec::new();
        for append in appends {
            if append.events.is_empty() {
                continue;
            }
            let stream = streams.entry(append.aggregate_id).or_default();
            committed.extend(Self::write(stream, append.events));
        }

        Ok(committed)
    }

    fn load_stream(&self, aggregate_id: AggregateId) -> Result<Vec<StoredEvent>, EventStoreError> {
        let streams = self
            .streams
            .read()
            .map_err(|_| EventStoreError::Unavailable("lock poisoned".to_string()))?;

        Ok(streams.get(&aggregate_id).cloned().unwrap_or_default())
    }

    fn load_streams_by_type(
        &self,
        aggregate_type: &str,
    ) -> Result<Vec<(AggregateId, Vec<StoredEvent>)>, EventStoreError> {
        let streams = self
            .streams
            .read()
            .map_err(|_| EventStoreError::Unavailable("lock poisoned".to_string()))?;

        Ok(streams
            .iter()
            .filter(|(_, events)| events.first().is_some_and(|e| e.aggregate_type == aggregate_type))
            .map(|(id, events)| (*id, events.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn event(aggregate_id: AggregateId, aggregate_type: &str) -> UncommittedEvent {
        UncommittedEvent {
            event_id: Uuid::now_v7(),
            aggregate_id,
            aggregate_type: aggregate_type.to_string(),
            event_type: format!("{aggregate_type}.happened"),
            event_version: 1,
            occurred_at: Utc::now(),
            payload: serde_json::json!({}),
        }
    }

    #[test]
    fn sequence_numbers_start_at_one_and_increase() {
        let store = InMemoryEventStore::new();
        let id = AggregateId::new();

        store.append(vec![event(id, "t")], ExpectedVersion::Exact(0)).unwrap();
        let committed = store
            .append(vec![event(id, "t"), event(id, "t")], ExpectedVersion::Exact(1))
            .unwrap();

        assert_eq!(committed.iter().map(|e| e.sequence_number).collect::<Vec<_>>(), vec![2, 3]);
        assert_eq!(store.load_stream(id).unwrap().len(), 3);
    }

    #[test]
    fn stale_expected_version_is_a_concurrency_error() {
        let store = InMemoryEventStore::new();
        let id = AggregateId::new();
        store.append(vec![event(id, "t")], ExpectedVersion::Exact(0)).unwrap();

        let err = store.append(vec![event(id, "t")], ExpectedVersion::Exact(0)).unwrap_err();
        assert!(matches!(err, EventStoreError::Concurrency(_)));
    }

    #[test]
    fn multi_stream_append_is_all_or_nothing() {
        let store = InMemoryEventStore::new();
        let (a, b) = (AggregateId::new(), AggregateId::new());
        store.append(vec![event(b, "t")], ExpectedVersion::Exact(0)).unwrap();

        let err = store
            .append_streams(vec![
                StreamAppend {
                    aggregate_id: a,
                    expected_version: ExpectedVersion::Exact(0),
                    events: vec![event(a, "t")],
                },
                StreamAppend {
                    aggregate_id: b,
                    expected_version: ExpectedVersion::Exact(0),
                    events: vec![event(b, "t")],
                },
            ])
            .unwrap_err();

        assert!(matches!(err, EventStoreError::Concurrency(_)));
        assert!(store.load_stream(a).unwrap().is_empty());
        assert_eq!(store.load_stream(b).unwrap().len(), 1);
    }

    #[test]
    fn stream_type_cannot_change() {
        let store = InMemoryEventStore::new();
        let id = AggregateId::new();
        store.append(vec![event(id, "orders.order")], ExpectedVersion::Any).unwrap();

        let err = store
            .append(vec![event(id, "shipping.zone")], ExpectedVersion::Any)
            .unwrap_err();
        assert!(matches!(err, EventStoreError::AggregateTypeMismatch(_)));
    }

    #[test]
    fn streams_can_be_listed_by_type() {
        let store = InMemoryEventStore::new();
        let (a, b, c) = (AggregateId::new(), AggregateId::new(), AggregateId::new());
        for (id, t) in [(a, "orders.order"), (b, "shipping.zone"), (c, "orders.order")] {
            store.append(vec![event(id, t)], ExpectedVersion::Exact(0)).unwrap();
        }

        let orders = store.load_streams_by_type("orders.order").unwrap();
        let ids: BTreeSet<_> = orders.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, BTreeSet::from([a, c]));
    }
}
