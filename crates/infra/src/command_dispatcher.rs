//! Command execution pipeline (application-level orchestration).
//!
//! ```text
//! Command
//!   ↓
//! 1. Load events from store
//!   ↓
//! 2. Rehydrate aggregate (apply historical events to rebuild state)
//!   ↓
//! 3. Handle command (pure decision logic, produces events)
//!   ↓
//! 4. Persist events (append-only, optimistic concurrency check)
//! ```
//!
//! Steps 1-3 are [`CommandDispatcher::decide`]; step 4 is
//! [`CommandDispatcher::commit`]. Splitting them lets a caller decide against
//! several aggregates and persist every decision in one atomic append (a
//! checkout redeems a promo code and places an order together).
//!
//! This module contains no IO itself; it composes the `EventStore` trait.

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use bazaar_core::{Aggregate, AggregateId, DomainError, ErrorKind, ExpectedVersion};
use bazaar_events::Event;

use crate::event_store::{EventStore, EventStoreError, StoredEvent, StreamAppend, UncommittedEvent};

#[derive(Debug, Error)]
pub enum DispatchError {
    /// Deterministic domain failure (validation, policy, not found, conflict).
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Persisting to or reading from the event store failed.
    #[error("event store failure: {0}")]
    Store(EventStoreError),

    /// Failed to deserialize historical event payloads or stored records.
    #[error("deserialization failed: {0}")]
    Deserialize(String),

    /// The vendor directory could not be consulted.
    #[error("vendor directory failure: {0}")]
    Directory(String),

    /// The configuration store could not be read or written.
    #[error("configuration store failure: {0}")]
    Configuration(String),
}

impl DispatchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DispatchError::Domain(e) => e.kind(),
            _ => ErrorKind::Infrastructure,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            DispatchError::Domain(e) => e.code(),
            DispatchError::Store(_) => "store_failure",
            DispatchError::Deserialize(_) => "deserialize_failure",
            DispatchError::Directory(_) => "directory_failure",
            DispatchError::Configuration(_) => "configuration_failure",
        }
    }

    /// The domain error, if this is a deterministic business failure.
    pub fn domain(&self) -> Option<&DomainError> {
        match self {
            DispatchError::Domain(e) => Some(e),
            _ => None,
        }
    }
}

impl From<EventStoreError> for DispatchError {
    fn from(value: EventStoreError) -> Self {
        match value {
            EventStoreError::Concurrency(msg) => DispatchError::Domain(DomainError::Conflict(msg)),
            other => DispatchError::Store(other),
        }
    }
}

/// Outcome of handling a command against freshly loaded state.
///
/// `state` already has `events` applied. Nothing is persisted until the
/// decision is committed; the append is guarded by `expected_version`, the
/// stream version the decision was taken at.
#[derive(Debug, Clone)]
pub struct Decision<A: Aggregate> {
    pub aggregate_id: AggregateId,
    pub expected_version: ExpectedVersion,
    pub state: A,
    pub events: Vec<A::Event>,
}

impl<A> Decision<A>
where
    A: Aggregate,
    A::Event: Event + Serialize,
{
    /// True when the command was a no-op (e.g. an idempotent resubmission).
    pub fn is_noop(&self) -> bool {
        self.events.is_empty()
    }

    pub fn to_append(&self) -> Result<StreamAppend, DispatchError> {
        let events = self
            .events
            .iter()
            .map(|ev| UncommittedEvent::from_typed(self.aggregate_id, Uuid::now_v7(), ev))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(StreamAppend {
            aggregate_id: self.aggregate_id,
            expected_version: self.expected_version,
            events,
        })
    }
}

/// Reusable command execution engine for event-sourced aggregates.
///
/// ## Error Semantics
///
/// - **Domain errors**: returned as `DispatchError::Domain`
/// - **Concurrency errors**: a stale expected version surfaces as
///   `DomainError::Conflict`; nothing was written and the caller may retry
/// - **Store errors**: `DispatchError::Store`
///
/// Aggregates used with the dispatcher must be deterministic and side-effect
/// free, and must track their version in `apply()`.
#[derive(Debug, Clone)]
pub struct CommandDispatcher<S> {
    store: S,
}

impl<S> CommandDispatcher<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<S> CommandDispatcher<S>
where
    S: EventStore,
{
    /// Load and rehydrate one aggregate (a fresh instance if the stream is empty).
    pub fn load<A>(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<A, DispatchError>
    where
        A: Aggregate,
        A::Event: DeserializeOwned,
    {
        let history = self.store.load_stream(aggregate_id)?;
        validate_loaded_stream(aggregate_id, aggregate_type, &history)?;

        let mut aggregate = make_aggregate(aggregate_id);
        apply_history(&mut aggregate, &history)?;
        Ok(aggregate)
    }

    /// Rehydrate every aggregate of one type, ordered by aggregate id.
    pub fn load_all<A>(
        &self,
        aggregate_type: &str,
        mut make_aggregate: impl FnMut(AggregateId) -> A,
    ) -> Result<Vec<A>, DispatchError>
    where
        A: Aggregate,
        A::Event: DeserializeOwned,
    {
        self.store
            .load_streams_by_type(aggregate_type)?
            .into_iter()
            .map(|(aggregate_id, history)| {
                validate_loaded_stream(aggregate_id, aggregate_type, &history)?;
                let mut aggregate = make_aggregate(aggregate_id);
                apply_history(&mut aggregate, &history)?;
                Ok(aggregate)
            })
            .collect()
    }

    /// Load, rehydrate and handle a command without persisting anything.
    pub fn decide<A>(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        command: &A::Command,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<Decision<A>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: DeserializeOwned,
    {
        let history = self.store.load_stream(aggregate_id)?;
        validate_loaded_stream(aggregate_id, aggregate_type, &history)?;
        let expected_version = ExpectedVersion::Exact(stream_version(&history));

        let mut state = make_aggregate(aggregate_id);
        apply_history(&mut state, &history)?;

        // Decide events (no mutation), then evolve a copy of the state.
        let events = state.handle(command)?;
        for ev in &events {
            state.apply(ev);
        }

        Ok(Decision {
            aggregate_id,
            expected_version,
            state,
            events,
        })
    }

    /// Persist decided appends atomically. Empty appends are skipped.
    pub fn commit(&self, appends: Vec<StreamAppend>) -> Result<Vec<StoredEvent>, DispatchError> {
        let appends: Vec<_> = appends.into_iter().filter(|a| !a.events.is_empty()).collect();
        if appends.is_empty() {
            return Ok(vec![]);
        }
        Ok(self.store.append_streams(appends)?)
    }

    /// Decide and commit a single command; returns the committed decision.
    pub fn dispatch<A>(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        command: &A::Command,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<Decision<A>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: Event + Serialize + DeserializeOwned,
    {
        let decision = self.decide(aggregate_id, aggregate_type, command, make_aggregate)?;
        if !decision.is_noop() {
            self.commit(vec![decision.to_append()?])?;
        }
        Ok(decision)
    }
}

fn stream_version(stream: &[StoredEvent]) -> u64 {
    stream.last().map(|e| e.sequence_number).unwrap_or(0)
}

fn validate_loaded_stream(
    aggregate_id: AggregateId,
    aggregate_type: &str,
    stream: &[StoredEvent],
) -> Result<(), DispatchError> {
    // Ensure the stream belongs to this aggregate and is monotonically
    // increasing by sequence number, even if a buggy backend says otherwise.
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.aggregate_id != aggregate_id {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(format!(
                "loaded stream contains wrong aggregate_id at index {idx}"
            ))));
        }
        if e.aggregate_type != aggregate_type {
            return Err(DispatchError::Store(EventStoreError::AggregateTypeMismatch(format!(
                "stream {aggregate_id} holds '{}', expected '{aggregate_type}'",
                e.aggregate_type
            ))));
        }
        if e.sequence_number == 0 {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(
                "stored event has sequence_number=0".to_string(),
            )));
        }
        if e.sequence_number <= last {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(format!(
                "non-monotonic sequence_number in loaded stream (last={last}, found={})",
                e.sequence_number
            ))));
        }
        last = e.sequence_number;
    }
    Ok(())
}

fn apply_history<A>(aggregate: &mut A, history: &[StoredEvent]) -> Result<(), DispatchError>
where
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    // Ensure deterministic ordering.
    let mut sorted = history.to_vec();
    sorted.sort_by_key(|e| e.sequence_number);

    for stored in sorted {
        let ev: A::Event = serde_json::from_value(stored.payload)
            .map_err(|e| DispatchError::Deserialize(e.to_string()))?;
        aggregate.apply(&ev);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_store::InMemoryEventStore;
    use bazaar_core::{AggregateRoot, PolicyViolation, ShippingZoneId};
    use bazaar_shipping::{
        CreateShippingZone, DeleteShippingZone, RenameShippingZone, ShippingZone,
        ShippingZoneCommand, AGGREGATE_TYPE,
    };
    use chrono::Utc;

    fn create(zone_id: ShippingZoneId) -> ShippingZoneCommand {
        ShippingZoneCommand::CreateShippingZone(CreateShippingZone {
            zone_id,
            name: "Java".into(),
            is_active: true,
            occurred_at: Utc::now(),
        })
    }

    fn rename(name: &str) -> ShippingZoneCommand {
        ShippingZoneCommand::RenameShippingZone(RenameShippingZone {
            name: name.into(),
            occurred_at: Utc::now(),
        })
    }

    fn make(id: AggregateId) -> ShippingZone {
        ShippingZone::empty(id.into())
    }

    #[test]
    fn dispatch_persists_and_rehydrates() {
        let dispatcher = CommandDispatcher::new(InMemoryEventStore::new());
        let zone_id = ShippingZoneId::new();
        let id = AggregateId::from(zone_id);

        dispatcher.dispatch(id, AGGREGATE_TYPE, &create(zone_id), make).unwrap();
        dispatcher.dispatch(id, AGGREGATE_TYPE, &rename("Sumatra"), make).unwrap();

        let zone = dispatcher.load(id, AGGREGATE_TYPE, make).unwrap();
        assert_eq!(zone.name(), "Sumatra");
        assert_eq!(zone.version(), 2);
    }

    #[test]
    fn stale_decision_is_a_conflict_and_writes_nothing() {
        let dispatcher = CommandDispatcher::new(InMemoryEventStore::new());
        let zone_id = ShippingZoneId::new();
        let id = AggregateId::from(zone_id);
        dispatcher.dispatch(id, AGGREGATE_TYPE, &create(zone_id), make).unwrap();

        let first = dispatcher.decide(id, AGGREGATE_TYPE, &rename("Bali"), make).unwrap();
        let second = dispatcher.decide(id, AGGREGATE_TYPE, &rename("Bali Timur"), make).unwrap();

        dispatcher.commit(vec![first.to_append().unwrap()]).unwrap();
        let err = dispatcher.commit(vec![second.to_append().unwrap()]).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ConcurrencyConflict);
        assert_eq!(err.code(), "version_conflict");
        let zone = dispatcher.load(id, AGGREGATE_TYPE, make).unwrap();
        assert_eq!(zone.name(), "Bali");
    }

    #[test]
    fn domain_errors_pass_through() {
        let dispatcher = CommandDispatcher::new(InMemoryEventStore::new());
        let zone_id = ShippingZoneId::new();
        let id = AggregateId::from(zone_id);
        dispatcher.dispatch(id, AGGREGATE_TYPE, &create(zone_id), make).unwrap();

        let err = dispatcher
            .dispatch(id, AGGREGATE_TYPE, &create(zone_id), make)
            .unwrap_err();
        assert!(matches!(
            err.domain().and_then(DomainError::policy),
            Some(PolicyViolation::AlreadyExists(_))
        ));

        let missing = ShippingZoneId::new();
        let delete = ShippingZoneCommand::DeleteShippingZone(DeleteShippingZone {
            occurred_at: Utc::now(),
        });
        let err = dispatcher
            .dispatch(missing.into(), AGGREGATE_TYPE, &delete, make)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn streams_of_another_type_are_rejected_on_load() {
        let dispatcher = CommandDispatcher::new(InMemoryEventStore::new());
        let zone_id = ShippingZoneId::new();
        let id = AggregateId::from(zone_id);
        dispatcher.dispatch(id, AGGREGATE_TYPE, &create(zone_id), make).unwrap();

        let err = dispatcher.load(id, "orders.order", make).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Infrastructure);
        assert_eq!(err.code(), "store_failure");
    }

    #[test]
    fn load_all_rehydrates_every_stream_of_a_type() {
        let dispatcher = CommandDispatcher::new(InMemoryEventStore::new());
        for _ in 0..3 {
            let zone_id = ShippingZoneId::new();
            dispatcher
                .dispatch(zone_id.into(), AGGREGATE_TYPE, &create(zone_id), make)
                .unwrap();
        }

        let zones = dispatcher.load_all(AGGREGATE_TYPE, make).unwrap();
        assert_eq!(zones.len(), 3);
        assert!(zones.iter().all(|z| z.exists()));
    }
}
