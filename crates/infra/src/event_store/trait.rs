use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use ledger_core::{AggregateId, ExpectedVersion, TenantId};

/// Who/what caused an event to be emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventOrigin {
    Human,
    Batch,
    Api,
    System,
}

/// Where an event's payload actually lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadStorage {
    Inline,
    External,
    Chunked,
}

/// A draft for a new event, not yet assigned a sequence.
///
/// One draft targets exactly one aggregate stream; a batch append (e.g. a
/// chunked journal emission) is expressed as several drafts appended in
/// sequence, linked by `caused_by_event_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventDraft {
    pub tenant_id: TenantId,
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,

    pub event_type: String,
    pub schema_version: u32,

    /// Structured payload. Already resolved to INLINE/EXTERNAL/CHUNKED
    /// storage by the emitter before this draft reaches the store.
    pub inline_data: JsonValue,
    pub payload_storage: PayloadStorage,
    pub payload_hash: String,
    pub payload_ref: Option<Uuid>,

    /// Unique per tenant. Re-appending a draft with a previously-seen key
    /// returns the original event rather than burning a new sequence.
    pub idempotency_key: String,

    pub origin: EventOrigin,
    pub caused_by_user_id: Option<Uuid>,
    pub caused_by_event_id: Option<Uuid>,

    pub occurred_at: DateTime<Utc>,
    pub metadata: BTreeMap<String, JsonValue>,
}

/// A committed, immutable event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusinessEvent {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,

    /// Monotonic per (tenant, aggregate_type, aggregate_id), starting at 1.
    pub aggregate_sequence: u64,
    /// Monotonic per tenant across all aggregates; the authoritative read
    /// cursor for projections.
    pub stream_sequence: u64,

    pub event_type: String,
    pub schema_version: u32,

    pub inline_data: JsonValue,
    pub payload_storage: PayloadStorage,
    pub payload_hash: String,
    pub payload_ref: Option<Uuid>,

    pub idempotency_key: String,

    pub origin: EventOrigin,
    pub caused_by_user_id: Option<Uuid>,
    pub caused_by_event_id: Option<Uuid>,

    pub occurred_at: DateTime<Utc>,
    pub recorded_at: DateTime<Utc>,
    pub metadata: BTreeMap<String, JsonValue>,
}

impl BusinessEvent {
    /// Convert a stored event into a tenant-scoped envelope for publication.
    pub fn to_envelope(&self) -> ledger_events::EventEnvelope<JsonValue> {
        ledger_events::EventEnvelope::new(
            self.id,
            self.tenant_id,
            self.aggregate_id,
            self.aggregate_type.clone(),
            self.stream_sequence,
            self.inline_data.clone(),
        )
    }
}

#[derive(Debug, Error)]
pub enum EventStoreError {
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),

    #[error("aggregate type mismatch: {0}")]
    AggregateTypeMismatch(String),

    #[error("invalid append: {0}")]
    InvalidAppend(String),

    #[error("event publication failed: {0}")]
    Publish(String),
}

/// Append-only, tenant-scoped event store.
///
/// Implementations must follow the algorithm in full on every `append`:
/// short-circuit on a previously-seen idempotency key, allocate the next
/// tenant-wide `stream_sequence` under an exclusive lock, compute the next
/// `aggregate_sequence` for the target stream, enforce `expected_version`
/// against the current aggregate version, then insert.
pub trait EventStore: Send + Sync {
    /// Append one event to an aggregate stream.
    fn append(
        &self,
        draft: EventDraft,
        expected_version: ExpectedVersion,
    ) -> Result<BusinessEvent, EventStoreError>;

    /// Append several drafts to the same aggregate stream as one causally
    /// linked batch (used by the chunked-payload emitter). Each draft is
    /// appended with `expected_version` advancing from the one before it.
    fn append_batch(
        &self,
        drafts: Vec<EventDraft>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<BusinessEvent>, EventStoreError> {
        let mut version = expected_version;
        let mut out = Vec::with_capacity(drafts.len());
        for draft in drafts {
            let event = self.append(draft, version)?;
            version = ExpectedVersion::Exact(event.aggregate_sequence);
            out.push(event);
        }
        Ok(out)
    }

    /// Load the full stream for a tenant + aggregate, in `aggregate_sequence` order.
    fn load_stream(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
    ) -> Result<Vec<BusinessEvent>, EventStoreError>;

    /// Look up a previously-appended event by its idempotency key, without
    /// attempting an append.
    fn find_by_idempotency_key(
        &self,
        tenant_id: TenantId,
        idempotency_key: &str,
    ) -> Result<Option<BusinessEvent>, EventStoreError>;
}

impl<S> EventStore for Arc<S>
where
    S: EventStore + ?Sized,
{
    fn append(
        &self,
        draft: EventDraft,
        expected_version: ExpectedVersion,
    ) -> Result<BusinessEvent, EventStoreError> {
        (**self).append(draft, expected_version)
    }

    fn load_stream(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
    ) -> Result<Vec<BusinessEvent>, EventStoreError> {
        (**self).load_stream(tenant_id, aggregate_id)
    }

    fn find_by_idempotency_key(
        &self,
        tenant_id: TenantId,
        idempotency_key: &str,
    ) -> Result<Option<BusinessEvent>, EventStoreError> {
        (**self).find_by_idempotency_key(tenant_id, idempotency_key)
    }
}
