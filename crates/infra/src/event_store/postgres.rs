//! Postgres-backed event store implementation.
//!
//! ## Error mapping
//!
//! | SQLx error | Postgres code | `EventStoreError` |
//! |---|---|---|
//! | Database (unique violation on idempotency key) | `23505` (idx on `idempotency_key`) | short-circuit, not an error |
//! | Database (unique violation on aggregate sequence) | `23505` (idx on `aggregate_sequence`) | `Concurrency` |
//! | Database (foreign key violation) | `23503` | `InvalidAppend` |
//! | Database (check constraint violation) | `23514` | `InvalidAppend` |
//! | Database (other) | any other | `InvalidAppend` |
//! | `PoolClosed` | n/a | `InvalidAppend` |
//! | `RowNotFound` | n/a | `InvalidAppend` |
//!
//! ## Thread safety
//!
//! `PostgresEventStore` is `Send + Sync`; the `sqlx::PgPool` handles connection
//! pooling across threads. `EventStore`'s synchronous contract is bridged to
//! async sqlx calls via `tokio::runtime::Handle::block_on`, which requires
//! every call site to run inside a tokio runtime.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use tracing::{instrument, Span};
use uuid::Uuid;

use ledger_core::{AggregateId, ExpectedVersion, TenantId};

use super::query::{EventFilter, EventQuery, EventQueryResult, Pagination};
use super::r#trait::{
    BusinessEvent, EventDraft, EventOrigin, EventStore, EventStoreError, PayloadStorage,
};

const IDEMPOTENCY_UNIQUE_CONSTRAINT: &str = "events_tenant_id_idempotency_key_key";
const AGGREGATE_SEQUENCE_UNIQUE_CONSTRAINT: &str =
    "events_tenant_id_aggregate_type_aggregate_id_aggregate_sequence_key";

/// Postgres-backed append-only event store.
#[derive(Debug, Clone)]
pub struct PostgresEventStore {
    pool: Arc<PgPool>,
}

impl PostgresEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    #[instrument(
        skip(self),
        fields(tenant_id = %tenant_id.as_uuid(), aggregate_id = %aggregate_id.as_uuid()),
        err
    )]
    pub async fn load_stream(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
    ) -> Result<Vec<BusinessEvent>, EventStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT *
            FROM events
            WHERE tenant_id = $1 AND aggregate_id = $2
            ORDER BY aggregate_sequence ASC
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(aggregate_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_stream", e))?;

        rows_to_events(rows)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id.as_uuid()), err)]
    pub async fn find_by_idempotency_key(
        &self,
        tenant_id: TenantId,
        idempotency_key: &str,
    ) -> Result<Option<BusinessEvent>, EventStoreError> {
        let row = sqlx::query(
            r#"SELECT * FROM events WHERE tenant_id = $1 AND idempotency_key = $2"#,
        )
        .bind(tenant_id.as_uuid())
        .bind(idempotency_key)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_by_idempotency_key", e))?;

        row.map(|r| EventRow::from_row(&r).map(Into::into))
            .transpose()
            .map_err(|e| EventStoreError::InvalidAppend(format!("failed to deserialize event row: {e}")))
    }

    /// Append one event, following the algorithm in full: short-circuit on a
    /// previously-seen idempotency key, lock the tenant's stream counter,
    /// compute the next aggregate sequence, enforce `expected_version`, insert.
    #[instrument(
        skip(self, draft),
        fields(
            tenant_id = %draft.tenant_id.as_uuid(),
            aggregate_id = %draft.aggregate_id.as_uuid(),
            event_type = %draft.event_type,
            expected_version = ?expected_version,
        ),
        err
    )]
    pub async fn append_event(
        &self,
        draft: EventDraft,
        expected_version: ExpectedVersion,
    ) -> Result<BusinessEvent, EventStoreError> {
        let span = Span::current();

        if let Some(existing) = self
            .find_by_idempotency_key(draft.tenant_id, &draft.idempotency_key)
            .await?
        {
            span.record("idempotent_replay", true);
            return Ok(existing);
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let (current_version, existing_aggregate_type) =
            check_stream_version(&mut tx, draft.tenant_id, draft.aggregate_id).await?;

        if let Some(ref existing_type) = existing_aggregate_type {
            if existing_type != &draft.aggregate_type {
                let _ = tx.rollback().await;
                return Err(EventStoreError::AggregateTypeMismatch(format!(
                    "stream aggregate_type is '{}', attempted append with '{}'",
                    existing_type, draft.aggregate_type
                )));
            }
        }

        if !expected_version.matches(current_version) {
            let _ = tx.rollback().await;
            return Err(EventStoreError::Concurrency(format!(
                "expected {expected_version:?}, found {current_version}"
            )));
        }

        // Tenant-wide stream sequence, locked for the duration of this append.
        let stream_sequence: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO tenant_stream_counters (tenant_id, last_stream_sequence)
            VALUES ($1, 1)
            ON CONFLICT (tenant_id) DO UPDATE
                SET last_stream_sequence = tenant_stream_counters.last_stream_sequence + 1
            RETURNING last_stream_sequence
            "#,
        )
        .bind(draft.tenant_id.as_uuid())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("allocate_stream_sequence", e))?;

        let event_id = Uuid::now_v7();
        let next_aggregate_sequence = current_version as i64 + 1;
        let recorded_at = Utc::now();
        let metadata_json = serde_json::to_value(&draft.metadata)
            .map_err(|e| EventStoreError::InvalidAppend(format!("metadata serialization failed: {e}")))?;

        let insert_result = sqlx::query(
            r#"
            INSERT INTO events (
                id, tenant_id, aggregate_id, aggregate_type,
                aggregate_sequence, stream_sequence,
                event_type, schema_version,
                inline_data, payload_storage, payload_hash, payload_ref,
                idempotency_key,
                origin, caused_by_user_id, caused_by_event_id,
                occurred_at, recorded_at, metadata
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)
            "#,
        )
        .bind(event_id)
        .bind(draft.tenant_id.as_uuid())
        .bind(draft.aggregate_id.as_uuid())
        .bind(&draft.aggregate_type)
        .bind(next_aggregate_sequence)
        .bind(stream_sequence)
        .bind(&draft.event_type)
        .bind(draft.schema_version as i32)
        .bind(&draft.inline_data)
        .bind(payload_storage_str(draft.payload_storage))
        .bind(&draft.payload_hash)
        .bind(draft.payload_ref)
        .bind(&draft.idempotency_key)
        .bind(event_origin_str(draft.origin))
        .bind(draft.caused_by_user_id)
        .bind(draft.caused_by_event_id)
        .bind(draft.occurred_at)
        .bind(recorded_at)
        .bind(&metadata_json)
        .execute(&mut *tx)
        .await;

        if let Err(e) = insert_result {
            let _ = tx.rollback().await;
            if is_unique_violation_on(&e, IDEMPOTENCY_UNIQUE_CONSTRAINT) {
                // Lost the idempotency race; the winner is already committed.
                return self
                    .find_by_idempotency_key(draft.tenant_id, &draft.idempotency_key)
                    .await?
                    .ok_or_else(|| {
                        EventStoreError::InvalidAppend(
                            "idempotency race lost but winner not found".to_string(),
                        )
                    });
            }
            if is_unique_violation_on(&e, AGGREGATE_SEQUENCE_UNIQUE_CONSTRAINT) {
                return Err(EventStoreError::Concurrency(format!(
                    "concurrent append detected at aggregate_sequence {next_aggregate_sequence}"
                )));
            }
            return Err(map_sqlx_error("insert_event", e));
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Ok(BusinessEvent {
            id: event_id,
            tenant_id: draft.tenant_id,
            aggregate_id: draft.aggregate_id,
            aggregate_type: draft.aggregate_type,
            aggregate_sequence: next_aggregate_sequence as u64,
            stream_sequence: stream_sequence as u64,
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
            recorded_at,
            metadata: draft.metadata,
        })
    }
}

async fn check_stream_version(
    tx: &mut Transaction<'_, Postgres>,
    tenant_id: TenantId,
    aggregate_id: AggregateId,
) -> Result<(u64, Option<String>), EventStoreError> {
    let row = sqlx::query(
        r#"
        SELECT
            COALESCE(MAX(aggregate_sequence), 0) as current_version,
            MAX(aggregate_type) as aggregate_type
        FROM events
        WHERE tenant_id = $1 AND aggregate_id = $2
        FOR UPDATE
        "#,
    )
    .bind(tenant_id.as_uuid())
    .bind(aggregate_id.as_uuid())
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("check_stream_version", e))?;

    let current_version: Option<i64> = row
        .try_get("current_version")
        .map_err(|e| EventStoreError::InvalidAppend(format!("failed to read current_version: {e}")))?;
    let aggregate_type: Option<String> = row
        .try_get("aggregate_type")
        .map_err(|e| EventStoreError::InvalidAppend(format!("failed to read aggregate_type: {e}")))?;

    Ok((current_version.unwrap_or(0) as u64, aggregate_type))
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> EventStoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {operation}: {}", db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => EventStoreError::Concurrency(msg),
                Some("23503") | Some("23514") => EventStoreError::InvalidAppend(msg),
                _ => EventStoreError::InvalidAppend(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            EventStoreError::InvalidAppend(format!("connection pool closed in {operation}"))
        }
        sqlx::Error::RowNotFound => {
            EventStoreError::InvalidAppend(format!("unexpected row not found in {operation}"))
        }
        _ => EventStoreError::InvalidAppend(format!("sqlx error in {operation}: {err}")),
    }
}

fn is_unique_violation_on(err: &sqlx::Error, constraint: &str) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        if db_err.code().as_deref() != Some("23505") {
            return false;
        }
        return db_err
            .constraint()
            .map(|c| c == constraint)
            .unwrap_or(false);
    }
    false
}

fn payload_storage_str(s: PayloadStorage) -> &'static str {
    match s {
        PayloadStorage::Inline => "inline",
        PayloadStorage::External => "external",
        PayloadStorage::Chunked => "chunked",
    }
}

fn payload_storage_from_str(s: &str) -> Result<PayloadStorage, EventStoreError> {
    match s {
        "inline" => Ok(PayloadStorage::Inline),
        "external" => Ok(PayloadStorage::External),
        "chunked" => Ok(PayloadStorage::Chunked),
        other => Err(EventStoreError::InvalidAppend(format!(
            "unknown payload_storage '{other}'"
        ))),
    }
}

fn event_origin_str(o: EventOrigin) -> &'static str {
    match o {
        EventOrigin::Human => "human",
        EventOrigin::Batch => "batch",
        EventOrigin::Api => "api",
        EventOrigin::System => "system",
    }
}

fn event_origin_from_str(s: &str) -> Result<EventOrigin, EventStoreError> {
    match s {
        "human" => Ok(EventOrigin::Human),
        "batch" => Ok(EventOrigin::Batch),
        "api" => Ok(EventOrigin::Api),
        "system" => Ok(EventOrigin::System),
        other => Err(EventStoreError::InvalidAppend(format!(
            "unknown origin '{other}'"
        ))),
    }
}

#[derive(Debug)]
struct EventRow {
    id: Uuid,
    tenant_id: Uuid,
    aggregate_id: Uuid,
    aggregate_type: String,
    aggregate_sequence: i64,
    stream_sequence: i64,
    event_type: String,
    schema_version: i32,
    inline_data: JsonValue,
    payload_storage: String,
    payload_hash: String,
    payload_ref: Option<Uuid>,
    idempotency_key: String,
    origin: String,
    caused_by_user_id: Option<Uuid>,
    caused_by_event_id: Option<Uuid>,
    occurred_at: DateTime<Utc>,
    recorded_at: DateTime<Utc>,
    metadata: JsonValue,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for EventRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(EventRow {
            id: row.try_get("id")?,
            tenant_id: row.try_get("tenant_id")?,
            aggregate_id: row.try_get("aggregate_id")?,
            aggregate_type: row.try_get("aggregate_type")?,
            aggregate_sequence: row.try_get("aggregate_sequence")?,
            stream_sequence: row.try_get("stream_sequence")?,
            event_type: row.try_get("event_type")?,
            schema_version: row.try_get("schema_version")?,
            inline_data: row.try_get("inline_data")?,
            payload_storage: row.try_get("payload_storage")?,
            payload_hash: row.try_get("payload_hash")?,
            payload_ref: row.try_get("payload_ref")?,
            idempotency_key: row.try_get("idempotency_key")?,
            origin: row.try_get("origin")?,
            caused_by_user_id: row.try_get("caused_by_user_id")?,
            caused_by_event_id: row.try_get("caused_by_event_id")?,
            occurred_at: row.try_get("occurred_at")?,
            recorded_at: row.try_get("recorded_at")?,
            metadata: row.try_get("metadata")?,
        })
    }
}

impl TryFrom<EventRow> for BusinessEvent {
    type Error = EventStoreError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        let metadata: BTreeMap<String, JsonValue> = serde_json::from_value(row.metadata)
            .map_err(|e| EventStoreError::InvalidAppend(format!("metadata deserialization failed: {e}")))?;

        Ok(BusinessEvent {
            id: row.id,
            tenant_id: TenantId::from_uuid(row.tenant_id),
            aggregate_id: AggregateId::from_uuid(row.aggregate_id),
            aggregate_type: row.aggregate_type,
            aggregate_sequence: row.aggregate_sequence as u64,
            stream_sequence: row.stream_sequence as u64,
            event_type: row.event_type,
            schema_version: row.schema_version as u32,
            inline_data: row.inline_data,
            payload_storage: payload_storage_from_str(&row.payload_storage)?,
            payload_hash: row.payload_hash,
            payload_ref: row.payload_ref,
            idempotency_key: row.idempotency_key,
            origin: event_origin_from_str(&row.origin)?,
            caused_by_user_id: row.caused_by_user_id,
            caused_by_event_id: row.caused_by_event_id,
            occurred_at: row.occurred_at,
            recorded_at: row.recorded_at,
            metadata,
        })
    }
}

fn rows_to_events(rows: Vec<sqlx::postgres::PgRow>) -> Result<Vec<BusinessEvent>, EventStoreError> {
    rows.into_iter()
        .map(|row| {
            EventRow::from_row(&row)
                .map_err(|e| EventStoreError::InvalidAppend(format!("failed to deserialize event row: {e}")))
                .and_then(BusinessEvent::try_from)
        })
        .collect()
}

fn block_on_current<F: std::future::Future>(fut: F) -> Result<F::Output, EventStoreError> {
    let handle = tokio::runtime::Handle::try_current().map_err(|_| {
        EventStoreError::InvalidAppend(
            "PostgresEventStore requires a tokio runtime; call from within one".to_string(),
        )
    })?;
    Ok(handle.block_on(fut))
}

impl EventStore for PostgresEventStore {
    fn append(
        &self,
        draft: EventDraft,
        expected_version: ExpectedVersion,
    ) -> Result<BusinessEvent, EventStoreError> {
        block_on_current(self.append_event(draft, expected_version))?
    }

    fn load_stream(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
    ) -> Result<Vec<BusinessEvent>, EventStoreError> {
        block_on_current(self.load_stream(tenant_id, aggregate_id))?
    }

    fn find_by_idempotency_key(
        &self,
        tenant_id: TenantId,
        idempotency_key: &str,
    ) -> Result<Option<BusinessEvent>, EventStoreError> {
        block_on_current(self.find_by_idempotency_key(tenant_id, idempotency_key))?
    }
}

#[async_trait::async_trait]
impl EventQuery for PostgresEventStore {
    async fn query_events(
        &self,
        tenant_id: TenantId,
        filter: EventFilter,
        pagination: Pagination,
    ) -> Result<EventQueryResult, EventStoreError> {
        let agg_id_param: Option<Uuid> = filter.aggregate_id.map(|id| *id.as_uuid());
        let agg_type_param: Option<&str> = filter.aggregate_type.as_deref();
        let evt_type_param: Option<&str> = filter.event_type.as_deref();

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM events
            WHERE tenant_id = $1
                AND ($2::uuid IS NULL OR aggregate_id = $2)
                AND ($3::text IS NULL OR aggregate_type = $3)
                AND ($4::text IS NULL OR event_type = $4)
                AND ($5::timestamptz IS NULL OR occurred_at >= $5)
                AND ($6::timestamptz IS NULL OR occurred_at <= $6)
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(agg_id_param)
        .bind(agg_type_param)
        .bind(evt_type_param)
        .bind(filter.occurred_after)
        .bind(filter.occurred_before)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("count_events", e))?;

        let rows = sqlx::query(
            r#"
            SELECT *
            FROM events
            WHERE tenant_id = $1
                AND ($2::uuid IS NULL OR aggregate_id = $2)
                AND ($3::text IS NULL OR aggregate_type = $3)
                AND ($4::text IS NULL OR event_type = $4)
                AND ($5::timestamptz IS NULL OR occurred_at >= $5)
                AND ($6::timestamptz IS NULL OR occurred_at <= $6)
            ORDER BY stream_sequence ASC
            LIMIT $7 OFFSET $8
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(agg_id_param)
        .bind(agg_type_param)
        .bind(evt_type_param)
        .bind(filter.occurred_after)
        .bind(filter.occurred_before)
        .bind(pagination.limit as i64)
        .bind(pagination.offset as i64)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("query_events", e))?;

        let events = rows_to_events(rows)?;
        let has_more = total > (pagination.offset + pagination.limit) as i64;

        Ok(EventQueryResult {
            events,
            total: total as u64,
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
        let pagination = pagination.unwrap_or_default();

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM events WHERE tenant_id = $1 AND aggregate_id = $2",
        )
        .bind(tenant_id.as_uuid())
        .bind(aggregate_id.as_uuid())
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("count_aggregate_events", e))?;

        let rows = sqlx::query(
            r#"
            SELECT * FROM events
            WHERE tenant_id = $1 AND aggregate_id = $2
            ORDER BY aggregate_sequence ASC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(aggregate_id.as_uuid())
        .bind(pagination.limit as i64)
        .bind(pagination.offset as i64)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_aggregate_events", e))?;

        let events = rows_to_events(rows)?;
        let has_more = total > (pagination.offset + pagination.limit) as i64;

        Ok(EventQueryResult {
            events,
            total: total as u64,
            pagination,
            has_more,
        })
    }

    async fn get_event_by_id(
        &self,
        tenant_id: TenantId,
        event_id: Uuid,
    ) -> Result<Option<BusinessEvent>, EventStoreError> {
        let row = sqlx::query("SELECT * FROM events WHERE tenant_id = $1 AND id = $2")
            .bind(tenant_id.as_uuid())
            .bind(event_id)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_event_by_id", e))?;

        row.map(|r| {
            EventRow::from_row(&r)
                .map_err(|e| EventStoreError::InvalidAppend(format!("failed to deserialize event row: {e}")))
                .and_then(BusinessEvent::try_from)
        })
        .transpose()
    }
}
