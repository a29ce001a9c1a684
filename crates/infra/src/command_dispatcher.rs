//! Command execution pipeline (application-level orchestration).
//!
//! Flow: Command -> load events -> rehydrate aggregate -> decide -> persist -> publish.
//!
//! This module contains no IO itself; it composes infrastructure traits. The
//! actual event append goes through [`EventStore::append`], which performs
//! the idempotency short-circuit, stream-sequence allocation, and
//! aggregate-sequence assignment described by the event store contract.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use uuid::Uuid;

use ledger_core::{Aggregate, AggregateId, DomainError, ExpectedVersion, TenantId, UserId};
use ledger_directory::{WriteContext, WritableEntity};
use ledger_events::{EventBus, EventEnvelope};

use crate::emitter::{determine_storage_strategy, validate_payload, EventLogWrite};
use crate::event_store::{
    BusinessEvent, EventDraft, EventOrigin, EventStore, EventStoreError, PayloadStorage,
};
use crate::payload::PayloadStore;

#[derive(Debug)]
pub enum DispatchError {
    /// Optimistic concurrency failure (e.g. stale aggregate version).
    Concurrency(String),
    /// Tenant isolation violation (cross-tenant or cross-aggregate stream mixing).
    TenantIsolation(String),
    /// Domain validation failure (deterministic).
    Validation(String),
    /// The decided event's payload does not match its registered schema.
    SchemaValidation { event_type: String, reason: String },
    /// Domain invariant failure (deterministic).
    InvariantViolation(String),
    /// Domain authorization failure.
    Unauthorized,
    /// Domain-level not found.
    NotFound,
    /// Failed to deserialize historical event payloads into the aggregate event type.
    Deserialize(String),
    /// Persisting to the event store failed.
    Store(EventStoreError),
    /// Publication failed after a successful append (at-least-once; retry may duplicate).
    Publish(String),
    /// The write barrier refused this write context for the event log.
    WriteBarrier(ledger_directory::WriteBarrierError),
}

impl From<ledger_directory::WriteBarrierError> for DispatchError {
    fn from(value: ledger_directory::WriteBarrierError) -> Self {
        DispatchError::WriteBarrier(value)
    }
}

impl From<EventStoreError> for DispatchError {
    fn from(value: EventStoreError) -> Self {
        match &value {
            EventStoreError::Concurrency(msg) => DispatchError::Concurrency(msg.clone()),
            EventStoreError::TenantIsolation(msg) => DispatchError::TenantIsolation(msg.clone()),
            _ => DispatchError::Store(value),
        }
    }
}

impl From<DomainError> for DispatchError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => DispatchError::Validation(msg),
            DomainError::InvariantViolation(msg) => DispatchError::InvariantViolation(msg),
            DomainError::Conflict(msg) => DispatchError::Concurrency(msg),
            DomainError::Unauthorized => DispatchError::Unauthorized,
            DomainError::NotFound => DispatchError::NotFound,
            DomainError::InvalidId(msg) => DispatchError::Validation(msg),
        }
    }
}

/// Per-dispatch metadata supplied by the caller: who/what is driving this
/// command and what caused it, threaded explicitly rather than read from
/// ambient state.
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub tenant_id: TenantId,
    pub origin: EventOrigin,
    pub caused_by_user_id: Option<UserId>,
    pub caused_by_event_id: Option<Uuid>,
    pub metadata: BTreeMap<String, JsonValue>,
}

impl CommandContext {
    pub fn new(tenant_id: TenantId, origin: EventOrigin) -> Self {
        Self {
            tenant_id,
            origin,
            caused_by_user_id: None,
            caused_by_event_id: None,
            metadata: BTreeMap::new(),
        }
    }
}

/// Builds the stable idempotency key used to dedupe repeated command
/// submissions: `"{prefix}:{first 16 hex chars of sha256(canonical_json(payload))}"`.
pub fn idempotency_key<T: Serialize>(prefix: &str, payload: &T) -> Result<String, DispatchError> {
    let hash = ledger_core::canonical_json(payload)
        .map_err(|e| DispatchError::Validation(format!("idempotency key payload: {e}")))?;
    let digest = ledger_core::compute_bytes_hash(hash.as_bytes());
    Ok(format!("{prefix}:{}", &digest[..16]))
}

/// Reusable command execution engine.
///
/// Aggregates must be deterministic and side-effect free. Events are
/// appended first; publication happens only after successful append.
#[derive(Debug)]
pub struct CommandDispatcher<S, B, P> {
    store: S,
    bus: B,
    payloads: P,
}

impl<S, B, P> CommandDispatcher<S, B, P> {
    pub fn new(store: S, bus: B, payloads: P) -> Self {
        Self { store, bus, payloads }
    }

    pub fn into_parts(self) -> (S, B, P) {
        (self.store, self.bus, self.payloads)
    }
}

impl<S, B, P> CommandDispatcher<S, B, P>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
    P: PayloadStore,
{
    /// Dispatch a command through the full event-sourcing pipeline.
    ///
    /// `idempotency_key` should be stable across retries of the same logical
    /// command (see [`idempotency_key`]); the event store will return the
    /// already-committed event rather than re-applying the command if it has
    /// been seen before. `make_aggregate` must create an aggregate instance
    /// for the given tenant/id; historical events are deserialized into
    /// `A::Event` and applied in order before the command is handled.
    pub fn dispatch<A>(
        &self,
        ctx: &CommandContext,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        command: A::Command,
        idempotency_key: impl Into<String>,
        make_aggregate: impl FnOnce(TenantId, AggregateId) -> A,
    ) -> Result<Vec<BusinessEvent>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: ledger_events::Event + Serialize + DeserializeOwned,
    {
        let tenant_id = ctx.tenant_id;

        // 1) Load history (tenant-scoped).
        let history = self.store.load_stream(tenant_id, aggregate_id)?;
        validate_loaded_stream(tenant_id, aggregate_id, &history)?;
        let mut expected = ExpectedVersion::Exact(stream_version(&history));

        // 2) Rehydrate aggregate.
        let mut aggregate = make_aggregate(tenant_id, aggregate_id);
        apply_history::<A>(&mut aggregate, &history)?;

        // 3) Decide events (no mutation).
        let decided = aggregate.handle(&command).map_err(DispatchError::from)?;
        if decided.is_empty() {
            return Ok(vec![]);
        }

        // 4) Persist (append-only, optimistic). Only the first event in a
        // multi-event decision carries the caller's idempotency key; the
        // rest are linked to it by causation so a retried command still
        // short-circuits at the first event and never re-decides.
        EventLogWrite::check(WriteContext::Command)?;
        let aggregate_type = aggregate_type.into();
        let base_key = idempotency_key.into();
        let mut committed = Vec::with_capacity(decided.len());
        let mut causation: Option<Uuid> = ctx.caused_by_event_id;

        for (idx, ev) in decided.iter().enumerate() {
            let event_type = ev.event_type().to_string();
            let inline_data = serde_json::to_value(ev)
                .map_err(|e| DispatchError::Validation(format!("payload serialization failed: {e}")))?;

            validate_payload(&event_type, &inline_data).map_err(|reason| {
                DispatchError::SchemaValidation {
                    event_type: event_type.clone(),
                    reason,
                }
            })?;

            let strategy = determine_storage_strategy(
                &inline_data,
                ctx.origin,
                ledger_accounting::MAX_LINES_PER_CHUNK,
            );
            let payload_hash = ledger_core::compute_payload_hash(&inline_data);

            let (stored_inline, payload_ref) = match strategy {
                PayloadStorage::External => {
                    let blob_id = self.payloads.store_payload(&inline_data);
                    (JsonValue::Null, Some(blob_id))
                }
                PayloadStorage::Inline | PayloadStorage::Chunked => (inline_data, None),
            };

            let draft = EventDraft {
                tenant_id,
                aggregate_id,
                aggregate_type: aggregate_type.clone(),
                event_type,
                schema_version: ev.version(),
                inline_data: stored_inline,
                payload_storage: strategy,
                payload_hash,
                payload_ref,
                idempotency_key: if idx == 0 {
                    base_key.clone()
                } else {
                    format!("{base_key}#{idx}")
                },
                origin: ctx.origin,
                caused_by_user_id: ctx.caused_by_user_id.map(|u| *u.as_uuid()),
                caused_by_event_id: causation,
                occurred_at: ev.occurred_at(),
                metadata: ctx.metadata.clone(),
            };

            let event = self.store.append(draft, expected)?;
            expected = ExpectedVersion::Exact(event.aggregate_sequence);
            causation = Some(event.id);
            committed.push(event);
        }

        // 5) Publish committed events (after append).
        for event in &committed {
            self.bus
                .publish(event.to_envelope())
                .map_err(|e| DispatchError::Publish(format!("{e:?}")))?;
        }

        Ok(committed)
    }
}

fn stream_version(stream: &[BusinessEvent]) -> u64 {
    stream.last().map(|e| e.aggregate_sequence).unwrap_or(0)
}

fn validate_loaded_stream(
    tenant_id: TenantId,
    aggregate_id: AggregateId,
    stream: &[BusinessEvent],
) -> Result<(), DispatchError> {
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.tenant_id != tenant_id {
            return Err(DispatchError::TenantIsolation(format!(
                "loaded stream contains wrong tenant_id at index {idx}"
            )));
        }
        if e.aggregate_id != aggregate_id {
            return Err(DispatchError::TenantIsolation(format!(
                "loaded stream contains wrong aggregate_id at index {idx}"
            )));
        }
        if e.aggregate_sequence == 0 {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(
                "stored event has aggregate_sequence=0".to_string(),
            )));
        }
        if e.aggregate_sequence <= last {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(format!(
                "non-monotonic aggregate_sequence in loaded stream (last={last}, found={})",
                e.aggregate_sequence
            ))));
        }
        last = e.aggregate_sequence;
    }
    Ok(())
}

fn apply_history<A>(aggregate: &mut A, history: &[BusinessEvent]) -> Result<(), DispatchError>
where
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    let mut sorted = history.to_vec();
    sorted.sort_by_key(|e| e.aggregate_sequence);

    for stored in sorted {
        let ev: A::Event = serde_json::from_value(stored.inline_data)
            .map_err(|e| DispatchError::Deserialize(e.to_string()))?;
        aggregate.apply(&ev);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idempotency_key_is_stable_across_identical_payloads() {
        let payload = serde_json::json!({"b": 1, "a": 2});
        let k1 = idempotency_key("journal.create", &payload).unwrap();
        let k2 = idempotency_key("journal.create", &payload).unwrap();
        assert_eq!(k1, k2);
        assert!(k1.starts_with("journal.create:"));
    }

    #[test]
    fn idempotency_key_changes_with_payload() {
        let k1 = idempotency_key("journal.create", &serde_json::json!({"a": 1})).unwrap();
        let k2 = idempotency_key("journal.create", &serde_json::json!({"a": 2})).unwrap();
        assert_ne!(k1, k2);
    }

    #[test]
    fn event_log_write_barrier_permits_command_context_only() {
        assert!(EventLogWrite::check(WriteContext::Command).is_ok());
        assert!(EventLogWrite::check(WriteContext::Projection).is_err());
    }
}
