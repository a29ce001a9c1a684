//! Projection engine: named, registered consumers of the tenant-wide event
//! stream, each tracked by a bookmark and an idempotency ledger so replay
//! and crash-recovery never double-apply an event.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use sqlx::Row;
use thiserror::Error;
use uuid::Uuid;

use ledger_core::TenantId;
use ledger_directory::{WriteBarrierError, WriteContext, WritableEntity};

use crate::event_store::{drain_tenant_stream_ordered, BusinessEvent, EventQuery, EventStoreError};

/// Tracks a projection's progress for one tenant: the last event it
/// successfully applied, and whether it is currently paused or erroring.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionBookmark {
    pub projection_name: String,
    pub tenant_id: TenantId,
    pub last_event_id: Option<Uuid>,
    pub last_stream_sequence: u64,
    pub last_processed_at: Option<DateTime<Utc>>,
    pub is_paused: bool,
    pub error_count: u32,
    pub last_error: Option<String>,
}

impl ProjectionBookmark {
    fn new(projection_name: &str, tenant_id: TenantId) -> Self {
        Self {
            projection_name: projection_name.to_string(),
            tenant_id,
            last_event_id: None,
            last_stream_sequence: 0,
            last_processed_at: None,
            is_paused: false,
            error_count: 0,
            last_error: None,
        }
    }
}

pub trait ProjectionBookmarkStore: Send + Sync {
    fn get(&self, projection_name: &str, tenant_id: TenantId) -> Option<ProjectionBookmark>;
    fn upsert(&self, bookmark: ProjectionBookmark);
    fn clear(&self, projection_name: &str, tenant_id: TenantId);
}

/// The `ProjectionAppliedEvent` idempotency ledger: `(projection_name,
/// tenant_id, event_id)` once inserted is never re-applied, making replay
/// and crash-recovery safe.
pub trait ProjectionAppliedLedger: Send + Sync {
    fn has_applied(&self, projection_name: &str, tenant_id: TenantId, event_id: Uuid) -> bool;
    fn mark_applied(&self, projection_name: &str, tenant_id: TenantId, event_id: Uuid);
    fn clear_applied(&self, projection_name: &str, tenant_id: TenantId);
}

/// In-memory bookmark store and applied-event ledger, for tests and local
/// tooling.
#[derive(Debug, Default)]
pub struct InMemoryBookmarkStore {
    bookmarks: RwLock<HashMap<(String, TenantId), ProjectionBookmark>>,
    applied: RwLock<HashSet<(String, TenantId, Uuid)>>,
}

impl InMemoryBookmarkStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProjectionBookmarkStore for InMemoryBookmarkStore {
    fn get(&self, projection_name: &str, tenant_id: TenantId) -> Option<ProjectionBookmark> {
        self.bookmarks
            .read()
            .ok()?
            .get(&(projection_name.to_string(), tenant_id))
            .cloned()
    }

    fn upsert(&self, bookmark: ProjectionBookmark) {
        if let Ok(mut b) = self.bookmarks.write() {
            b.insert((bookmark.projection_name.clone(), bookmark.tenant_id), bookmark);
        }
    }

    fn clear(&self, projection_name: &str, tenant_id: TenantId) {
        if let Ok(mut b) = self.bookmarks.write() {
            b.remove(&(projection_name.to_string(), tenant_id));
        }
    }
}

impl ProjectionAppliedLedger for InMemoryBookmarkStore {
    fn has_applied(&self, projection_name: &str, tenant_id: TenantId, event_id: Uuid) -> bool {
        self.applied
            .read()
            .map(|a| a.contains(&(projection_name.to_string(), tenant_id, event_id)))
            .unwrap_or(false)
    }

    fn mark_applied(&self, projection_name: &str, tenant_id: TenantId, event_id: Uuid) {
        if let Ok(mut a) = self.applied.write() {
            a.insert((projection_name.to_string(), tenant_id, event_id));
        }
    }

    fn clear_applied(&self, projection_name: &str, tenant_id: TenantId) {
        if let Ok(mut a) = self.applied.write() {
            a.retain(|(name, t, _)| !(name == projection_name && *t == tenant_id));
        }
    }
}

/// Postgres-backed bookmark store and idempotency ledger, so
/// `rebuild-projection`/`run-projections` invocations made from separate CLI
/// process launches resume where the last one left off instead of
/// reprocessing the whole stream.
pub struct PostgresBookmarkStore {
    pool: Arc<sqlx::PgPool>,
}

impl PostgresBookmarkStore {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    fn run<F, T>(&self, fut: F) -> Option<T>
    where
        F: std::future::Future<Output = T>,
    {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => Some(handle.block_on(fut)),
            Err(_) => tokio::runtime::Runtime::new().ok().map(|rt| rt.block_on(fut)),
        }
    }
}

impl ProjectionBookmarkStore for PostgresBookmarkStore {
    fn get(&self, projection_name: &str, tenant_id: TenantId) -> Option<ProjectionBookmark> {
        let pool = self.pool.clone();
        let tenant_uuid = tenant_id.as_uuid();
        let name = projection_name.to_string();

        self.run(async move {
            sqlx::query(
                r#"
                SELECT last_event_id, last_stream_sequence, last_processed_at,
                       is_paused, error_count, last_error
                FROM projection_bookmarks
                WHERE projection_name = $1 AND tenant_id = $2
                "#,
            )
            .bind(&name)
            .bind(tenant_uuid)
            .fetch_optional(&*pool)
            .await
            .ok()
            .flatten()
            .map(|row| ProjectionBookmark {
                projection_name: name.clone(),
                tenant_id,
                last_event_id: row.try_get::<Option<Uuid>, _>("last_event_id").ok().flatten(),
                last_stream_sequence: row
                    .try_get::<i64, _>("last_stream_sequence")
                    .map(|v| v as u64)
                    .unwrap_or(0),
                last_processed_at: row.try_get("last_processed_at").ok(),
                is_paused: row.try_get("is_paused").unwrap_or(false),
                error_count: row.try_get::<i32, _>("error_count").map(|v| v as u32).unwrap_or(0),
                last_error: row.try_get("last_error").ok(),
            })
        })
        .flatten()
    }

    fn upsert(&self, bookmark: ProjectionBookmark) {
        let pool = self.pool.clone();
        let tenant_uuid = bookmark.tenant_id.as_uuid();

        self.run(async move {
            let _ = sqlx::query(
                r#"
                INSERT INTO projection_bookmarks (
                    projection_name, tenant_id, last_event_id, last_stream_sequence,
                    last_processed_at, is_paused, error_count, last_error
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ON CONFLICT (projection_name, tenant_id)
                DO UPDATE SET
                    last_event_id = EXCLUDED.last_event_id,
                    last_stream_sequence = EXCLUDED.last_stream_sequence,
                    last_processed_at = EXCLUDED.last_processed_at,
                    is_paused = EXCLUDED.is_paused,
                    error_count = EXCLUDED.error_count,
                    last_error = EXCLUDED.last_error
                "#,
            )
            .bind(&bookmark.projection_name)
            .bind(tenant_uuid)
            .bind(bookmark.last_event_id)
            .bind(bookmark.last_stream_sequence as i64)
            .bind(bookmark.last_processed_at)
            .bind(bookmark.is_paused)
            .bind(bookmark.error_count as i32)
            .bind(bookmark.last_error)
            .execute(&*pool)
            .await;
        });
    }

    fn clear(&self, projection_name: &str, tenant_id: TenantId) {
        let pool = self.pool.clone();
        let tenant_uuid = tenant_id.as_uuid();
        let name = projection_name.to_string();

        self.run(async move {
            let _ = sqlx::query(
                "DELETE FROM projection_bookmarks WHERE projection_name = $1 AND tenant_id = $2",
            )
            .bind(&name)
            .bind(tenant_uuid)
            .execute(&*pool)
            .await;
        });
    }
}

impl ProjectionAppliedLedger for PostgresBookmarkStore {
    fn has_applied(&self, projection_name: &str, tenant_id: TenantId, event_id: Uuid) -> bool {
        let pool = self.pool.clone();
        let tenant_uuid = tenant_id.as_uuid();
        let name = projection_name.to_string();

        self.run(async move {
            sqlx::query(
                r#"
                SELECT 1 AS present FROM projection_applied_events
                WHERE projection_name = $1 AND tenant_id = $2 AND event_id = $3
                "#,
            )
            .bind(&name)
            .bind(tenant_uuid)
            .bind(event_id)
            .fetch_optional(&*pool)
            .await
            .ok()
            .flatten()
            .is_some()
        })
        .unwrap_or(false)
    }

    fn mark_applied(&self, projection_name: &str, tenant_id: TenantId, event_id: Uuid) {
        let pool = self.pool.clone();
        let tenant_uuid = tenant_id.as_uuid();
        let name = projection_name.to_string();

        self.run(async move {
            let _ = sqlx::query(
                r#"
                INSERT INTO projection_applied_events (projection_name, tenant_id, event_id)
                VALUES ($1, $2, $3)
                ON CONFLICT (projection_name, tenant_id, event_id) DO NOTHING
                "#,
            )
            .bind(&name)
            .bind(tenant_uuid)
            .bind(event_id)
            .execute(&*pool)
            .await;
        });
    }

    fn clear_applied(&self, projection_name: &str, tenant_id: TenantId) {
        let pool = self.pool.clone();
        let tenant_uuid = tenant_id.as_uuid();
        let name = projection_name.to_string();

        self.run(async move {
            let _ = sqlx::query(
                "DELETE FROM projection_applied_events WHERE projection_name = $1 AND tenant_id = $2",
            )
            .bind(&name)
            .bind(tenant_uuid)
            .execute(&*pool)
            .await;
        });
    }
}

#[derive(Debug, Error)]
pub enum ProjectionEngineError {
    #[error("no projection registered with name '{0}'")]
    UnknownProjection(String),
    #[error("projection '{name}' failed on event {event_id}: {reason}")]
    HandlerFailed {
        name: String,
        event_id: Uuid,
        reason: String,
    },
    #[error(transparent)]
    Store(#[from] EventStoreError),
    #[error(transparent)]
    WriteBarrier(#[from] WriteBarrierError),
}

/// Marker entity gating writes to a projection's own read model. Only a
/// `Projection` handler running under the engine's processing loop (or
/// bootstrap/migration re-insertion) may write it.
pub struct ProjectionOwnedWrite;

impl WritableEntity for ProjectionOwnedWrite {
    const NAME: &'static str = "projection_read_model";

    fn allowed_contexts() -> &'static [WriteContext] {
        &[WriteContext::Projection, WriteContext::Bootstrap, WriteContext::Migration]
    }
}

/// A named, registered consumer of the event stream. `event_types` restricts
/// which events are dispatched to `handle`; an empty slice means "all
/// events". Implementations perform read-model writes from inside `handle`
/// under the `Projection` write context, which the engine enters before
/// calling it.
pub trait Projection: Send + Sync {
    fn name(&self) -> &str;

    fn event_types(&self) -> &[&str] {
        &[]
    }

    fn handle(&self, event: &BusinessEvent) -> Result<(), String>;

    /// Clears this projection's own read-model rows for `tenant_id`, used by
    /// `rebuild` before replaying from zero.
    fn clear_tenant_data(&self, tenant_id: TenantId);
}

/// Lag snapshot for a `(projection_name, tenant)` pair, as reported by a
/// health endpoint: how far behind the projection is, plus whatever error
/// state its bookmark is currently carrying.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionLag {
    pub projection_name: String,
    pub tenant_id: TenantId,
    pub unprocessed_events: u64,
    pub is_paused: bool,
    pub error_count: u32,
    pub last_error: Option<String>,
}

/// Drives registered [`Projection`]s over a tenant's event stream, tracking
/// progress per `(projection_name, tenant)` via a bookmark and guarding
/// against double-apply via the idempotency ledger. Generic over the
/// bookmark/ledger store `K` so a long-lived process (or a CLI re-invoked
/// across separate runs) can back it with something durable instead of
/// losing all progress between invocations.
pub struct ProjectionEngine<S, K = InMemoryBookmarkStore> {
    store: S,
    registry: RwLock<HashMap<String, Arc<dyn Projection>>>,
    bookmarks: K,
}

impl<S> ProjectionEngine<S, InMemoryBookmarkStore>
where
    S: EventQuery,
{
    pub fn new(store: S) -> Self {
        Self::with_bookmark_store(store, InMemoryBookmarkStore::new())
    }
}

impl<S, K> ProjectionEngine<S, K>
where
    S: EventQuery,
    K: ProjectionBookmarkStore + ProjectionAppliedLedger,
{
    pub fn with_bookmark_store(store: S, bookmarks: K) -> Self {
        Self {
            store,
            registry: RwLock::new(HashMap::new()),
            bookmarks,
        }
    }

    /// Registers a projection at process start. Registering the same name
    /// twice replaces the previous registration.
    pub fn register(&self, projection: Arc<dyn Projection>) {
        if let Ok(mut registry) = self.registry.write() {
            registry.insert(projection.name().to_string(), projection);
        }
    }

    /// Processes up to `limit` unapplied events for `(projection_name,
    /// tenant)`, returning the number actually applied.
    pub fn process_pending(
        &self,
        projection_name: &str,
        tenant_id: TenantId,
        limit: u32,
    ) -> Result<usize, ProjectionEngineError> {
        let projection = self.get_projection(projection_name)?;

        let mut bookmark = self
            .bookmarks
            .get(projection_name, tenant_id)
            .unwrap_or_else(|| ProjectionBookmark::new(projection_name, tenant_id));

        if bookmark.is_paused {
            return Ok(0);
        }

        let pending = self.fetch_pending(&*projection, tenant_id, bookmark.last_stream_sequence, limit)?;
        let mut processed = 0usize;

        for event in pending {
            ProjectionOwnedWrite::check(WriteContext::Projection)?;

            if !self.bookmarks.has_applied(projection_name, tenant_id, event.id) {
                if let Err(reason) = projection.handle(&event) {
                    bookmark.error_count += 1;
                    bookmark.last_error = Some(reason.clone());
                    self.bookmarks.upsert(bookmark);
                    return Err(ProjectionEngineError::HandlerFailed {
                        name: projection_name.to_string(),
                        event_id: event.id,
                        reason,
                    });
                }
                self.bookmarks.mark_applied(projection_name, tenant_id, event.id);
            }

            bookmark.last_event_id = Some(event.id);
            bookmark.last_stream_sequence = event.stream_sequence;
            bookmark.last_processed_at = Some(Utc::now());
            bookmark.last_error = None;
            processed += 1;
        }

        self.bookmarks.upsert(bookmark);
        Ok(processed)
    }

    /// Resets the bookmark and applied-event ledger for `(projection_name,
    /// tenant)`, clears the projection's own data, then drains the stream
    /// from zero.
    pub fn rebuild(
        &self,
        projection_name: &str,
        tenant_id: TenantId,
    ) -> Result<usize, ProjectionEngineError> {
        let projection = self.get_projection(projection_name)?;

        self.bookmarks.clear(projection_name, tenant_id);
        self.bookmarks.clear_applied(projection_name, tenant_id);
        projection.clear_tenant_data(tenant_id);

        let mut total = 0usize;
        loop {
            let n = self.process_pending(projection_name, tenant_id, 500)?;
            total += n;
            if n == 0 {
                break;
            }
        }
        Ok(total)
    }

    /// Lag snapshot for `(projection_name, tenant)`: how many events are not
    /// yet processed, plus the bookmark's current pause/error state.
    pub fn get_lag(
        &self,
        projection_name: &str,
        tenant_id: TenantId,
    ) -> Result<ProjectionLag, ProjectionEngineError> {
        let projection = self.get_projection(projection_name)?;
        let bookmark = self.bookmarks.get(projection_name, tenant_id);
        let after = bookmark.as_ref().map(|b| b.last_stream_sequence).unwrap_or(0);
        let pending = self.fetch_pending(&*projection, tenant_id, after, 10_000)?;

        Ok(ProjectionLag {
            projection_name: projection_name.to_string(),
            tenant_id,
            unprocessed_events: pending.len() as u64,
            is_paused: bookmark.as_ref().map(|b| b.is_paused).unwrap_or(false),
            error_count: bookmark.as_ref().map(|b| b.error_count).unwrap_or(0),
            last_error: bookmark.and_then(|b| b.last_error),
        })
    }

    fn get_projection(&self, name: &str) -> Result<Arc<dyn Projection>, ProjectionEngineError> {
        self.registry
            .read()
            .ok()
            .and_then(|r| r.get(name).cloned())
            .ok_or_else(|| ProjectionEngineError::UnknownProjection(name.to_string()))
    }

    fn fetch_pending(
        &self,
        projection: &dyn Projection,
        tenant_id: TenantId,
        after_stream_sequence: u64,
        limit: u32,
    ) -> Result<Vec<BusinessEvent>, EventStoreError> {
        let wanted_types = projection.event_types();
        let mut pending: Vec<BusinessEvent> = drain_tenant_stream_ordered(&self.store, tenant_id)?
            .into_iter()
            .filter(|e| e.stream_sequence > after_stream_sequence)
            .filter(|e| wanted_types.is_empty() || wanted_types.contains(&e.event_type.as_str()))
            .collect();

        pending.truncate(limit as usize);
        Ok(pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_store::{EventDraft, EventOrigin, EventStore, InMemoryEventStore, PayloadStorage};
    use ledger_core::{AggregateId, ExpectedVersion};
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProjection {
        applied: AtomicUsize,
    }

    impl Projection for CountingProjection {
        fn name(&self) -> &str {
            "counting"
        }

        fn handle(&self, _event: &BusinessEvent) -> Result<(), String> {
            self.applied.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn clear_tenant_data(&self, _tenant_id: TenantId) {
            self.applied.store(0, Ordering::SeqCst);
        }
    }

    fn append_event(store: &InMemoryEventStore, tenant_id: TenantId, idem: &str) -> BusinessEvent {
        store
            .append(
                EventDraft {
                    tenant_id,
                    aggregate_id: AggregateId::new(),
                    aggregate_type: "account".to_string(),
                    event_type: "account.created".to_string(),
                    schema_version: 1,
                    inline_data: serde_json::json!({}),
                    payload_storage: PayloadStorage::Inline,
                    payload_hash: String::new(),
                    payload_ref: None,
                    idempotency_key: idem.to_string(),
                    origin: EventOrigin::System,
                    caused_by_user_id: None,
                    caused_by_event_id: None,
                    occurred_at: Utc::now(),
                    metadata: BTreeMap::new(),
                },
                ExpectedVersion::Any,
            )
            .unwrap()
    }

    #[test]
    fn process_pending_applies_each_event_once_and_advances_bookmark() {
        let store = InMemoryEventStore::new();
        let tenant_id = TenantId::new();
        append_event(&store, tenant_id, "e1");
        append_event(&store, tenant_id, "e2");

        let engine = ProjectionEngine::new(store);
        let projection = Arc::new(CountingProjection { applied: AtomicUsize::new(0) });
        engine.register(projection.clone());

        let n = engine.process_pending("counting", tenant_id, 10).unwrap();
        assert_eq!(n, 2);
        assert_eq!(projection.applied.load(Ordering::SeqCst), 2);

        let n2 = engine.process_pending("counting", tenant_id, 10).unwrap();
        assert_eq!(n2, 0);
        assert_eq!(projection.applied.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn rebuild_clears_and_reprocesses_from_zero() {
        let store = InMemoryEventStore::new();
        let tenant_id = TenantId::new();
        append_event(&store, tenant_id, "e1");

        let engine = ProjectionEngine::new(store);
        let projection = Arc::new(CountingProjection { applied: AtomicUsize::new(0) });
        engine.register(projection.clone());
        engine.process_pending("counting", tenant_id, 10).unwrap();
        assert_eq!(projection.applied.load(Ordering::SeqCst), 1);

        let n = engine.rebuild("counting", tenant_id).unwrap();
        assert_eq!(n, 1);
        assert_eq!(projection.applied.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn get_lag_reports_unprocessed_count() {
        let store = InMemoryEventStore::new();
        let tenant_id = TenantId::new();
        append_event(&store, tenant_id, "e1");
        append_event(&store, tenant_id, "e2");

        let engine = ProjectionEngine::new(store);
        engine.register(Arc::new(CountingProjection { applied: AtomicUsize::new(0) }));

        assert_eq!(engine.get_lag("counting", tenant_id).unwrap().unprocessed_events, 2);
        engine.process_pending("counting", tenant_id, 1).unwrap();
        assert_eq!(engine.get_lag("counting", tenant_id).unwrap().unprocessed_events, 1);
    }
}
