//! Append-only event store boundary.
//!
//! This module defines the infrastructure-facing abstraction for storing and
//! loading tenant-scoped event streams, without making storage assumptions
//! beyond the ordering/idempotency algorithm the `EventStore` trait requires.

pub mod in_memory;
pub mod postgres;
pub mod query;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
pub use postgres::PostgresEventStore;
pub use query::{EventFilter, EventQuery, EventQueryResult, Pagination};
pub use r#trait::{
    BusinessEvent, EventDraft, EventOrigin, EventStore, EventStoreError, PayloadStorage,
};

/// Drains a tenant's entire event stream via [`EventQuery`], paging through
/// every offset page and returning events ordered by `stream_sequence`
/// ascending. `query_events` itself orders by `occurred_at`/offset, not
/// `stream_sequence`, so callers that need strict sequence order (the
/// projection engine's processing loop, the migration exporter) page
/// through everything and sort here instead.
pub fn drain_tenant_stream_ordered<Q: EventQuery>(
    store: &Q,
    tenant_id: ledger_core::TenantId,
) -> Result<Vec<BusinessEvent>, EventStoreError> {
    let mut all_events = Vec::new();
    let mut offset = 0u32;

    loop {
        let page = run_event_query(store, tenant_id, Pagination::new(Some(1000), Some(offset)))?;
        let got = page.events.len();
        let has_more = page.has_more;
        all_events.extend(page.events);
        if !has_more || got == 0 {
            break;
        }
        offset += got as u32;
    }

    all_events.sort_by_key(|e| e.stream_sequence);
    Ok(all_events)
}

fn run_event_query<Q: EventQuery>(
    store: &Q,
    tenant_id: ledger_core::TenantId,
    pagination: Pagination,
) -> Result<EventQueryResult, EventStoreError> {
    let query = store.query_events(tenant_id, EventFilter::default(), pagination);
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => handle.block_on(query),
        Err(_) => {
            // No ambient runtime: build one just for this query, matching
            // the rest of the infra layer's sync-over-async bridge.
            let rt = tokio::runtime::Runtime::new()
                .map_err(|e| EventStoreError::InvalidAppend(e.to_string()))?;
            rt.block_on(query)
        }
    }
}

/// Adapter that publishes committed events to an `EventBus` after a successful append.
///
/// Publish happens only after append succeeds: events are durable before
/// they are distributed, and a publish failure leaves the event in the
/// store to be republished rather than lost.
pub struct PublishingEventStore<S, B> {
    store: S,
    bus: B,
}

impl<S, B> PublishingEventStore<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self { store, bus }
    }

    pub fn into_parts(self) -> (S, B) {
        (self.store, self.bus)
    }
}

impl<S, B> EventStore for PublishingEventStore<S, B>
where
    S: EventStore,
    B: ledger_events::EventBus<ledger_events::EventEnvelope<serde_json::Value>>,
{
    fn append(
        &self,
        draft: EventDraft,
        expected_version: ledger_core::ExpectedVersion,
    ) -> Result<BusinessEvent, EventStoreError> {
        let committed = self.store.append(draft, expected_version)?;
        self.bus
            .publish(committed.to_envelope())
            .map_err(|err| EventStoreError::Publish(format!("{err:?}")))?;
        Ok(committed)
    }

    fn load_stream(
        &self,
        tenant_id: ledger_core::TenantId,
        aggregate_id: ledger_core::AggregateId,
    ) -> Result<Vec<BusinessEvent>, EventStoreError> {
        self.store.load_stream(tenant_id, aggregate_id)
    }

    fn find_by_idempotency_key(
        &self,
        tenant_id: ledger_core::TenantId,
        idempotency_key: &str,
    ) -> Result<Option<BusinessEvent>, EventStoreError> {
        self.store.find_by_idempotency_key(tenant_id, idempotency_key)
    }
}
