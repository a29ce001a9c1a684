use std::collections::HashMap;
use std::sync::RwLock;

use uuid::Uuid;

use ledger_core::{AggregateId, ExpectedVersion, TenantId};

use super::query::{EventFilter, EventQuery, EventQueryResult, Pagination};
use super::r#trait::{BusinessEvent, EventDraft, EventStore, EventStoreError};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct StreamKey {
    tenant_id: TenantId,
    aggregate_id: AggregateId,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct IdempotencyKey {
    tenant_id: TenantId,
    key: String,
}

/// In-memory append-only event store. Intended for tests and local tooling;
/// not optimized for performance.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    streams: RwLock<HashMap<StreamKey, Vec<BusinessEvent>>>,
    by_idempotency_key: RwLock<HashMap<IdempotencyKey, Uuid>>,
    by_event_id: RwLock<HashMap<Uuid, BusinessEvent>>,
    stream_counters: RwLock<HashMap<TenantId, u64>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn current_aggregate_version(stream: &[BusinessEvent]) -> u64 {
        stream.last().map(|e| e.aggregate_sequence).unwrap_or(0)
    }
}

impl EventStore for InMemoryEventStore {
    fn append(
        &self,
        draft: EventDraft,
        expected_version: ExpectedVersion,
    ) -> Result<BusinessEvent, EventStoreError> {
        let idem_key = IdempotencyKey {
            tenant_id: draft.tenant_id,
            key: draft.idempotency_key.clone(),
        };

        // Step 1: short-circuit on a previously-seen idempotency key.
        {
            let idx = self
                .by_idempotency_key
                .read()
                .map_err(|_| EventStoreError::InvalidAppend("lock poisoned".to_string()))?;
            if let Some(existing_id) = idx.get(&idem_key) {
                let by_id = self
                    .by_event_id
                    .read()
                    .map_err(|_| EventStoreError::InvalidAppend("lock poisoned".to_string()))?;
                if let Some(existing) = by_id.get(existing_id) {
                    return Ok(existing.clone());
                }
            }
        }

        let stream_key = StreamKey {
            tenant_id: draft.tenant_id,
            aggregate_id: draft.aggregate_id,
        };

        let mut streams = self
            .streams
            .write()
            .map_err(|_| EventStoreError::InvalidAppend("lock poisoned".to_string()))?;
        let stream = streams.entry(stream_key).or_default();

        if let Some(existing) = stream.first() {
            if existing.aggregate_type != draft.aggregate_type {
                return Err(EventStoreError::AggregateTypeMismatch(format!(
                    "stream aggregate_type is '{}', attempted append with '{}'",
                    existing.aggregate_type, draft.aggregate_type
                )));
            }
        }

        let current = Self::current_aggregate_version(stream);
        if !expected_version.matches(current) {
            return Err(EventStoreError::Concurrency(format!(
                "expected {expected_version:?}, found {current}"
            )));
        }

        // Step 2: allocate the tenant-wide stream sequence.
        let mut counters = self
            .stream_counters
            .write()
            .map_err(|_| EventStoreError::InvalidAppend("lock poisoned".to_string()))?;
        let counter = counters.entry(draft.tenant_id).or_insert(0);
        *counter += 1;
        let stream_sequence = *counter;
        drop(counters);

        let event = BusinessEvent {
            id: Uuid::now_v7(),
            tenant_id: draft.tenant_id,
            aggregate_id: draft.aggregate_id,
            aggregate_type: draft.aggregate_type,
            aggregate_sequence: current + 1,
            stream_sequence,
            event_type: draft.event_type,
            schema_version: draft.schema_version,
            inline_data: draft.inline_data,
            payload_storage: draft.payload_storage,
            payload_hash: draft.payload_hash,
            payload_ref: draft.payload_ref,
            idempotency_key: draft.idempotency_key,
            origin: draft.origin,
            caused_by_user_id: draft.caused_by_user_id,
            caused_by_event_id: draft.caused_by_event_id,
            occurred_at: draft.occurred_at,
            recorded_at: chrono::Utc::now(),
            metadata: draft.metadata,
        };

        stream.push(event.clone());

        let mut idx = self
            .by_idempotency_key
            .write()
            .map_err(|_| EventStoreError::InvalidAppend("lock poisoned".to_string()))?;
        idx.insert(idem_key, event.id);

        let mut by_id = self
            .by_event_id
            .write()
            .map_err(|_| EventStoreError::InvalidAppend("lock poisoned".to_string()))?;
        by_id.insert(event.id, event.clone());

        Ok(event)
    }

    fn load_stream(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
    ) -> Result<Vec<BusinessEvent>, EventStoreError> {
        let key = StreamKey {
            tenant_id,
            aggregate_id,
        };

        let streams = self
            .streams
            .read()
            .map_err(|_| EventStoreError::InvalidAppend("lock poisoned".to_string()))?;

        Ok(streams.get(&key).cloned().unwrap_or_default())
    }

    fn find_by_idempotency_key(
        &self,
        tenant_id: TenantId,
        idempotency_key: &str,
    ) -> Result<Option<BusinessEvent>, EventStoreError> {
        let idem_key = IdempotencyKey {
            tenant_id,
            key: idempotency_key.to_string(),
        };
        let idx = self
            .by_idempotency_key
            .read()
            .map_err(|_| EventStoreError::InvalidAppend("lock poisoned".to_string()))?;
        let Some(event_id) = idx.get(&idem_key) else {
            return Ok(None);
        };
        let by_id = self
            .by_event_id
            .read()
            .map_err(|_| EventStoreError::InvalidAppend("lock poisoned".to_string()))?;
        Ok(by_id.get(event_id).cloned())
    }
}

#[async_trait::async_trait]
impl EventQuery for InMemoryEventStore {
    async fn query_events(
        &self,
        tenant_id: TenantId,
        filter: EventFilter,
        pagination: Pagination,
    ) -> Result<EventQueryResult, EventStoreError> {
        let streams = {
            let guard = self
                .streams
                .read()
                .map_err(|_| EventStoreError::InvalidAppend("lock poisoned".to_string()))?;
            guard.clone()
        };

        let mut all_events: Vec<BusinessEvent> = Vec::new();
        for (key, stream) in streams.iter() {
            if key.tenant_id == tenant_id {
                all_events.extend(stream.iter().cloned());
            }
        }

        let mut filtered: Vec<BusinessEvent> = all_events
            .into_iter()
            .filter(|e| {
                if let Some(agg_id) = filter.aggregate_id {
                    if e.aggregate_id != agg_id {
                        return false;
                    }
                }
                if let Some(ref agg_type) = filter.aggregate_type {
                    if e.aggregate_type != *agg_type {
                        return false;
                    }
                }
                if let Some(ref evt_type) = filter.event_type {
                    if e.event_type != *evt_type {
                        return false;
                    }
                }
                if let Some(after) = filter.occurred_after {
                    if e.occurred_at < after {
                        return false;
                    }
                }
                if let Some(before) = filter.occurred_before {
                    if e.occurred_at > before {
                        return false;
                    }
                }
                true
            })
            .collect();

        filtered.sort_by(|a, b| a.stream_sequence.cmp(&b.stream_sequence));

        let total = filtered.len() as u64;
        let start = pagination.offset as usize;
        let paginated = filtered
            .into_iter()
            .skip(start)
            .take(pagination.limit as usize)
            .collect();

        let has_more = total > (pagination.offset + pagination.limit) as u64;

        Ok(EventQueryResult {
            events: paginated,
            total,
            pagination,
            has_more,
        })
    }

    async fn get_aggregate_events(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        pagination: Option<Pagination>,
    ) -> Result<EventQueryResult, EventStoreError> {
        let all_events = self.load_stream(tenant_id, aggregate_id)?;

        let total = all_events.len() as u64;
        let pagination = pagination.unwrap_or_default();

        let start = pagination.offset as usize;
        let paginated: Vec<BusinessEvent> = all_events
            .into_iter()
            .skip(start)
            .take(pagination.limit as usize)
            .collect();

        let has_more = total > (pagination.offset + pagination.limit) as u64;

        Ok(EventQueryResult {
            events: paginated,
            total,
            pagination,
            has_more,
        })
    }

    async fn get_event_by_id(
        &self,
        tenant_id: TenantId,
        event_id: Uuid,
    ) -> Result<Option<BusinessEvent>, EventStoreError> {
        let by_id = self
            .by_event_id
            .read()
            .map_err(|_| EventStoreError::InvalidAppend("lock poisoned".to_string()))?;
        Ok(by_id
            .get(&event_id)
            .filter(|e| e.tenant_id == tenant_id)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_store::r#trait::PayloadStorage;
    use std::collections::BTreeMap;

    fn draft(tenant_id: TenantId, aggregate_id: AggregateId, idem: &str) -> EventDraft {
        EventDraft {
            tenant_id,
            aggregate_id,
            aggregate_type: "account".to_string(),
            event_type: "account.created".to_string(),
            schema_version: 1,
            inline_data: serde_json::json!({"code": "1000"}),
            payload_storage: PayloadStorage::Inline,
            payload_hash: String::new(),
            payload_ref: None,
            idempotency_key: idem.to_string(),
            origin: super::super::r#trait::EventOrigin::Human,
            caused_by_user_id: None,
            caused_by_event_id: None,
            occurred_at: chrono::Utc::now(),
            metadata: BTreeMap::new(),
        }
    }

    #[test]
    fn append_assigns_monotonic_sequences() {
        let store = InMemoryEventStore::new();
        let tenant_id = TenantId::new();
        let aggregate_id = AggregateId::new();

        let e1 = store
            .append(draft(tenant_id, aggregate_id, "k1"), ExpectedVersion::New)
            .unwrap();
        let e2 = store
            .append(
                draft(tenant_id, aggregate_id, "k2"),
                ExpectedVersion::Exact(1),
            )
            .unwrap();

        assert_eq!(e1.aggregate_sequence, 1);
        assert_eq!(e2.aggregate_sequence, 2);
        assert_eq!(e1.stream_sequence, 1);
        assert_eq!(e2.stream_sequence, 2);
    }

    #[test]
    fn repeated_idempotency_key_short_circuits() {
        let store = InMemoryEventStore::new();
        let tenant_id = TenantId::new();
        let aggregate_id = AggregateId::new();

        let e1 = store
            .append(draft(tenant_id, aggregate_id, "same"), ExpectedVersion::New)
            .unwrap();
        let e2 = store
            .append(draft(tenant_id, aggregate_id, "same"), ExpectedVersion::New)
            .unwrap();

        assert_eq!(e1.id, e2.id);
        assert_eq!(e1.stream_sequence, e2.stream_sequence);
    }

    #[test]
    fn concurrency_conflict_is_rejected() {
        let store = InMemoryEventStore::new();
        let tenant_id = TenantId::new();
        let aggregate_id = AggregateId::new();

        store
            .append(draft(tenant_id, aggregate_id, "k1"), ExpectedVersion::New)
            .unwrap();

        let err = store
            .append(draft(tenant_id, aggregate_id, "k2"), ExpectedVersion::New)
            .unwrap_err();
        assert!(matches!(err, EventStoreError::Concurrency(_)));
    }

    #[test]
    fn stream_sequence_is_tenant_wide_across_aggregates() {
        let store = InMemoryEventStore::new();
        let tenant_id = TenantId::new();
        let agg_a = AggregateId::new();
        let agg_b = AggregateId::new();

        let e1 = store
            .append(draft(tenant_id, agg_a, "k1"), ExpectedVersion::New)
            .unwrap();
        let e2 = store
            .append(draft(tenant_id, agg_b, "k2"), ExpectedVersion::New)
            .unwrap();

        assert_eq!(e1.aggregate_sequence, 1);
        assert_eq!(e2.aggregate_sequence, 1);
        assert_eq!(e1.stream_sequence, 1);
        assert_eq!(e2.stream_sequence, 2);
    }
}
