//! Event emitter: the single path through which commands turn domain
//! intent into a stored [`BusinessEvent`].
//!
//! Responsibilities, in order: validate the payload against the registered
//! schema for its event type, choose a storage strategy, compute the
//! canonical hash, persist (writing an external blob first if needed), and
//! return the committed event. `command_dispatcher::CommandDispatcher`
//! drives this for every event it appends rather than calling
//! `EventStore::append` directly.

use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use ledger_core::{AggregateId, ExpectedVersion, TenantId};
use ledger_directory::{WriteBarrierError, WriteContext, WritableEntity};

use crate::event_store::{
    BusinessEvent, EventDraft, EventOrigin, EventStore, EventStoreError, PayloadStorage,
};
use crate::payload::PayloadStore;

/// Above this many bytes of canonical JSON, a non-`Human` origin payload is
/// stored externally instead of inline.
pub const EXTERNAL_STORAGE_THRESHOLD_BYTES: usize = 32 * 1024;

/// Marker entity gating writes to the event log itself. Only the command
/// layer, bootstrap seeding, and the migration orchestrator may append
/// events; projections never do (they write read models, not the log).
pub struct EventLogWrite;

impl WritableEntity for EventLogWrite {
    const NAME: &'static str = "event_log";

    fn allowed_contexts() -> &'static [WriteContext] {
        &[WriteContext::Command, WriteContext::Bootstrap, WriteContext::Migration]
    }
}

#[derive(Debug, Error)]
pub enum EmitError {
    #[error("write barrier: {0}")]
    WriteBarrier(#[from] WriteBarrierError),
    #[error("schema validation failed for event type '{event_type}': {reason}")]
    SchemaValidation { event_type: String, reason: String },
    #[error("no payload schema registered for event type '{0}'")]
    UnknownEventType(String),
    #[error("payload serialization failed: {0}")]
    Serialize(String),
    #[error(transparent)]
    Store(#[from] EventStoreError),
}

/// A field's expected value-kind in a payload schema descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Integer,
    DecimalAsString,
    EnumFromSet(&'static [&'static str]),
    List,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldDescriptor {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
}

/// Registered shape for one event type's payload. Unknown fields are a
/// validation error; adding an optional field is safe, renaming a field is
/// a breaking change (a new schema_version should be registered instead).
#[derive(Debug, Clone)]
pub struct PayloadSchema {
    pub event_type: &'static str,
    pub fields: &'static [FieldDescriptor],
}

impl PayloadSchema {
    pub fn validate(&self, payload: &JsonValue) -> Result<(), String> {
        let JsonValue::Object(map) = payload else {
            return Err("payload must be a JSON object".to_string());
        };

        for field in self.fields {
            let value = map.get(field.name);
            if value.is_none() || value == Some(&JsonValue::Null) {
                if field.required {
                    return Err(format!("missing required field '{}'", field.name));
                }
                continue;
            }
            let value = value.unwrap();
            let matches = match field.kind {
                FieldKind::String | FieldKind::DecimalAsString => value.is_string(),
                FieldKind::Integer => value.is_i64() || value.is_u64(),
                FieldKind::EnumFromSet(set) => {
                    value.as_str().map(|s| set.contains(&s)).unwrap_or(false)
                }
                FieldKind::List => value.is_array(),
            };
            if !matches {
                return Err(format!(
                    "field '{}' has the wrong kind (expected {:?})",
                    field.name, field.kind
                ));
            }
        }

        let known: std::collections::HashSet<&str> = self.fields.iter().map(|f| f.name).collect();
        for key in map.keys() {
            if !known.contains(key.as_str()) {
                return Err(format!("unknown field '{key}'"));
            }
        }

        Ok(())
    }
}

const ACCOUNT_CREATED_FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor { name: "tenant_id", kind: FieldKind::String, required: true },
    FieldDescriptor { name: "account_id", kind: FieldKind::String, required: true },
    FieldDescriptor { name: "code", kind: FieldKind::String, required: true },
    FieldDescriptor { name: "name", kind: FieldKind::String, required: true },
    FieldDescriptor { name: "name_ar", kind: FieldKind::String, required: false },
    FieldDescriptor { name: "kind", kind: FieldKind::EnumFromSet(&["asset", "liability", "equity", "revenue", "expense"]), required: true },
    FieldDescriptor { name: "description", kind: FieldKind::String, required: false },
    FieldDescriptor { name: "description_ar", kind: FieldKind::String, required: false },
    FieldDescriptor { name: "unit_of_measure", kind: FieldKind::String, required: false },
    FieldDescriptor { name: "parent_public_id", kind: FieldKind::String, required: false },
    FieldDescriptor { name: "is_header", kind: FieldKind::Integer, required: false },
    FieldDescriptor { name: "occurred_at", kind: FieldKind::String, required: true },
];

const JOURNAL_ENTRY_CREATED_FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor { name: "tenant_id", kind: FieldKind::String, required: true },
    FieldDescriptor { name: "entry_id", kind: FieldKind::String, required: true },
    FieldDescriptor { name: "date", kind: FieldKind::String, required: true },
    FieldDescriptor { name: "memo", kind: FieldKind::String, required: true },
    FieldDescriptor { name: "memo_ar", kind: FieldKind::String, required: false },
    FieldDescriptor { name: "kind", kind: FieldKind::EnumFromSet(&["normal", "reversal"]), required: true },
    FieldDescriptor { name: "currency", kind: FieldKind::String, required: true },
    FieldDescriptor { name: "exchange_rate", kind: FieldKind::DecimalAsString, required: true },
    FieldDescriptor { name: "lines", kind: FieldKind::List, required: true },
    FieldDescriptor { name: "reverses_entry", kind: FieldKind::String, required: false },
    FieldDescriptor { name: "occurred_at", kind: FieldKind::String, required: true },
];

const JOURNAL_LINES_CHUNK_ADDED_FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor { name: "tenant_id", kind: FieldKind::String, required: true },
    FieldDescriptor { name: "entry_id", kind: FieldKind::String, required: true },
    FieldDescriptor { name: "chunk_index", kind: FieldKind::Integer, required: true },
    FieldDescriptor { name: "total_chunks", kind: FieldKind::Integer, required: true },
    FieldDescriptor { name: "lines", kind: FieldKind::List, required: true },
    FieldDescriptor { name: "occurred_at", kind: FieldKind::String, required: true },
];

/// Static table of event-type -> payload schema, built once at first use
/// from a fixed array of descriptors (populate-once, read-only-after, the
/// teacher's style for the projection registry rather than runtime
/// reflection).
fn schema_registry() -> &'static HashMap<&'static str, PayloadSchema> {
    static REGISTRY: OnceLock<HashMap<&'static str, PayloadSchema>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let descriptors: &[(&'static str, &'static [FieldDescriptor])] = &[
            ("account.created", ACCOUNT_CREATED_FIELDS),
            ("journal_entry.created", JOURNAL_ENTRY_CREATED_FIELDS),
            ("journal.lines_chunk_added", JOURNAL_LINES_CHUNK_ADDED_FIELDS),
        ];
        descriptors
            .iter()
            .map(|(event_type, fields)| {
                (
                    *event_type,
                    PayloadSchema {
                        event_type,
                        fields,
                    },
                )
            })
            .collect()
    })
}

/// Validates `payload` against the registered schema for `event_type`, a
/// no-op when no schema is registered for that type or validation has been
/// disabled process-wide. Shared by [`Emitter`] and
/// `command_dispatcher::CommandDispatcher`, which both append to the event
/// log and must agree on what a valid payload looks like.
pub fn validate_payload(event_type: &str, payload: &JsonValue) -> Result<(), String> {
    if validation_disabled() {
        return Ok(());
    }
    match schema_registry().get(event_type) {
        Some(schema) => schema.validate(payload),
        None => Ok(()),
    }
}

/// Disables schema validation process-wide. Mirrors the
/// `DISABLE_EVENT_VALIDATION` test setting; set once at process start, never
/// toggled mid-run.
static VALIDATION_DISABLED: OnceLock<bool> = OnceLock::new();

pub fn set_validation_disabled(disabled: bool) {
    let _ = VALIDATION_DISABLED.set(disabled);
}

fn validation_disabled() -> bool {
    VALIDATION_DISABLED.get().copied().unwrap_or(false)
}

/// journal-shaped payloads carry a top-level `lines` array; the line-count
/// check takes priority over the size-based branches when present.
fn journal_line_count(payload: &JsonValue) -> Option<usize> {
    payload.get("lines")?.as_array().map(|v| v.len())
}

/// `origin=Human` & size <= threshold -> Inline; `origin` in
/// `{Batch, Api, System}` & size > threshold -> External; journal payloads
/// whose `lines[]` exceed `MAX_LINES_PER_CHUNK` -> Chunked, checked first.
pub fn determine_storage_strategy(
    payload: &JsonValue,
    origin: EventOrigin,
    max_lines_per_chunk: usize,
) -> PayloadStorage {
    if let Some(line_count) = journal_line_count(payload) {
        if line_count > max_lines_per_chunk {
            return PayloadStorage::Chunked;
        }
    }

    let canonical = ledger_core::canonical_json(payload).unwrap_or_default();
    let size = canonical.len();

    match origin {
        EventOrigin::Human if size <= EXTERNAL_STORAGE_THRESHOLD_BYTES => PayloadStorage::Inline,
        EventOrigin::Batch | EventOrigin::Api | EventOrigin::System
            if size > EXTERNAL_STORAGE_THRESHOLD_BYTES =>
        {
            PayloadStorage::External
        }
        _ => PayloadStorage::Inline,
    }
}

/// Per-emission metadata, mirroring `CommandContext` but for the lower-level
/// emit entry point used directly by commands that need fine control (e.g.
/// chunked journal emission) rather than going through
/// `CommandDispatcher::dispatch`.
#[derive(Debug, Clone)]
pub struct EmitRequest<T: Serialize> {
    pub tenant_id: TenantId,
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,
    pub event_type: String,
    pub schema_version: u32,
    pub data: T,
    pub idempotency_key: String,
    pub occurred_at: DateTime<Utc>,
    pub caused_by_event: Option<Uuid>,
    pub origin: EventOrigin,
    pub caused_by_user_id: Option<Uuid>,
    pub metadata: BTreeMap<String, JsonValue>,
}

/// Emits events through the full schema-validation / storage-strategy /
/// payload-blob pipeline, on top of a concrete [`EventStore`] and
/// [`PayloadStore`].
pub struct Emitter<S, P> {
    store: S,
    payloads: P,
}

impl<S, P> Emitter<S, P>
where
    S: EventStore,
    P: PayloadStore,
{
    pub fn new(store: S, payloads: P) -> Self {
        Self { store, payloads }
    }

    /// Emit one event under the `Command` write context.
    pub fn emit<T: Serialize>(
        &self,
        request: EmitRequest<T>,
        expected_version: ExpectedVersion,
    ) -> Result<BusinessEvent, EmitError> {
        EventLogWrite::check(WriteContext::Command)?;
        self.emit_with_context(request, expected_version)
    }

    /// System-initiated emission (no authenticated user); still goes
    /// through the same validation and storage pipeline.
    pub fn emit_no_actor<T: Serialize>(
        &self,
        request: EmitRequest<T>,
        expected_version: ExpectedVersion,
    ) -> Result<BusinessEvent, EmitError> {
        EventLogWrite::check(WriteContext::Command)?;
        self.emit_with_context(request, expected_version)
    }

    fn emit_with_context<T: Serialize>(
        &self,
        request: EmitRequest<T>,
        expected_version: ExpectedVersion,
    ) -> Result<BusinessEvent, EmitError> {
        let inline_data = serde_json::to_value(&request.data)
            .map_err(|e| EmitError::Serialize(e.to_string()))?;

        if !validation_disabled() {
            if let Some(schema) = schema_registry().get(request.event_type.as_str()) {
                schema
                    .validate(&inline_data)
                    .map_err(|reason| EmitError::SchemaValidation {
                        event_type: request.event_type.clone(),
                        reason,
                    })?;
            }
        }

        let strategy =
            determine_storage_strategy(&inline_data, request.origin, ledger_accounting::MAX_LINES_PER_CHUNK);
        let payload_hash = ledger_core::compute_payload_hash(&inline_data);

        let (stored_inline, payload_ref) = match strategy {
            PayloadStorage::External => {
                let blob_id = self.payloads.store_payload(&inline_data);
                (JsonValue::Null, Some(blob_id))
            }
            PayloadStorage::Inline | PayloadStorage::Chunked => (inline_data, None),
        };

        let draft = EventDraft {
            tenant_id: request.tenant_id,
            aggregate_id: request.aggregate_id,
            aggregate_type: request.aggregate_type,
            event_type: request.event_type,
            schema_version: request.schema_version,
            inline_data: stored_inline,
            payload_storage: strategy,
            payload_hash,
            payload_ref,
            idempotency_key: request.idempotency_key,
            origin: request.origin,
            caused_by_user_id: request.caused_by_user_id,
            caused_by_event_id: request.caused_by_event,
            occurred_at: request.occurred_at,
            metadata: request.metadata,
        };

        Ok(self.store.append(draft, expected_version)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_store::InMemoryEventStore;
    use crate::payload::InMemoryPayloadStore;

    fn emitter() -> Emitter<InMemoryEventStore, InMemoryPayloadStore> {
        Emitter::new(InMemoryEventStore::new(), InMemoryPayloadStore::new())
    }

    #[test]
    fn account_created_schema_rejects_unknown_fields() {
        let schema = schema_registry().get("account.created").unwrap();
        let payload = serde_json::json!({
            "tenant_id": "t", "account_id": "a", "code": "1000", "name": "Cash",
            "kind": "asset", "occurred_at": "2026-01-01T00:00:00Z", "bogus": 1
        });
        assert!(schema.validate(&payload).unwrap_err().contains("unknown field"));
    }

    #[test]
    fn account_created_schema_accepts_minimal_valid_payload() {
        let schema = schema_registry().get("account.created").unwrap();
        let payload = serde_json::json!({
            "tenant_id": "t", "account_id": "a", "code": "1000", "name": "Cash",
            "kind": "asset", "occurred_at": "2026-01-01T00:00:00Z"
        });
        assert!(schema.validate(&payload).is_ok());
    }

    #[test]
    fn large_journal_payload_selects_chunked_over_size_branches() {
        let lines: Vec<_> = (0..600).map(|i| serde_json::json!({"line_no": i})).collect();
        let payload = serde_json::json!({"lines": lines});
        let strategy = determine_storage_strategy(&payload, EventOrigin::Human, 500);
        assert_eq!(strategy, PayloadStorage::Chunked);
    }

    #[test]
    fn human_origin_small_payload_is_inline() {
        let payload = serde_json::json!({"a": 1});
        assert_eq!(
            determine_storage_strategy(&payload, EventOrigin::Human, 500),
            PayloadStorage::Inline
        );
    }

    #[test]
    fn emit_persists_and_validates() {
        let emitter = emitter();
        let tenant_id = TenantId::new();
        let account_id = AggregateId::new();
        let payload = serde_json::json!({
            "tenant_id": tenant_id, "account_id": account_id, "code": "1000",
            "name": "Cash", "kind": "asset", "occurred_at": Utc::now()
        });

        let event = emitter
            .emit(
                EmitRequest {
                    tenant_id,
                    aggregate_id: account_id,
                    aggregate_type: "account".to_string(),
                    event_type: "account.created".to_string(),
                    schema_version: 1,
                    data: payload,
                    idempotency_key: "account.create:abc".to_string(),
                    occurred_at: Utc::now(),
                    caused_by_event: None,
                    origin: EventOrigin::Human,
                    caused_by_user_id: None,
                    metadata: BTreeMap::new(),
                },
                ExpectedVersion::New,
            )
            .unwrap();

        assert_eq!(event.event_type, "account.created");
        assert_eq!(event.payload_storage, PayloadStorage::Inline);
    }

    #[test]
    fn emit_rejects_payload_missing_required_field() {
        let emitter = emitter();
        let tenant_id = TenantId::new();
        let account_id = AggregateId::new();
        let payload = serde_json::json!({
            "tenant_id": tenant_id, "account_id": account_id, "code": "1000",
            "kind": "asset", "occurred_at": Utc::now()
        });

        let err = emitter
            .emit(
                EmitRequest {
                    tenant_id,
                    aggregate_id: account_id,
                    aggregate_type: "account".to_string(),
                    event_type: "account.created".to_string(),
                    schema_version: 1,
                    data: payload,
                    idempotency_key: "account.create:abc".to_string(),
                    occurred_at: Utc::now(),
                    caused_by_event: None,
                    origin: EventOrigin::Human,
                    caused_by_user_id: None,
                    metadata: BTreeMap::new(),
                },
                ExpectedVersion::New,
            )
            .unwrap_err();

        assert!(matches!(err, EmitError::SchemaValidation { .. }));
    }
}
