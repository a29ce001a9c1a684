//! Migration orchestrator: moves a tenant between database handles
//! (shared <-> dedicated) via freeze -> export -> prepare -> import ->
//! replay -> verify -> cutover, with a rollback path on any failure.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use ledger_core::{AggregateId, ExpectedVersion, TenantId};
use ledger_directory::{
    IsolationMode, MigrationLog, MigrationResult, TenantDirectoryEntry, TenantStatus, WriteContext,
    WritableEntity,
};

use crate::emitter::EventLogWrite;
use crate::event_store::{
    drain_tenant_stream_ordered, BusinessEvent, EventDraft, EventOrigin, EventQuery, EventStore,
    EventStoreError, PayloadStorage,
};
use crate::payload::PayloadStore;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("no directory entry for tenant")]
    NoDirectoryEntry,
    #[error("tenant is not in a migratable state: {0:?}")]
    NotMigrating(TenantStatus),
    #[error("export/import record serialization failed: {0}")]
    Serialize(String),
    #[error(transparent)]
    Store(#[from] EventStoreError),
    #[error(transparent)]
    WriteBarrier(#[from] ledger_directory::WriteBarrierError),
}

/// Persists tenant directory entries and the migration audit log. A real
/// deployment backs this with Postgres; tests and local tooling use
/// [`InMemoryDirectoryStore`].
pub trait DirectoryStore: Send + Sync {
    fn get_entry(&self, tenant_id: TenantId) -> Option<TenantDirectoryEntry>;
    fn upsert_entry(&self, entry: TenantDirectoryEntry);
    fn append_migration_log(&self, log: MigrationLog);
}

#[derive(Debug, Default)]
pub struct InMemoryDirectoryStore {
    entries: RwLock<HashMap<TenantId, TenantDirectoryEntry>>,
    logs: RwLock<Vec<MigrationLog>>,
}

impl InMemoryDirectoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn logs(&self) -> Vec<MigrationLog> {
        self.logs.read().map(|l| l.clone()).unwrap_or_default()
    }
}

impl DirectoryStore for InMemoryDirectoryStore {
    fn get_entry(&self, tenant_id: TenantId) -> Option<TenantDirectoryEntry> {
        self.entries.read().ok()?.get(&tenant_id).cloned()
    }

    fn upsert_entry(&self, entry: TenantDirectoryEntry) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(entry.tenant_id, entry);
        }
    }

    fn append_migration_log(&self, log: MigrationLog) {
        if let Ok(mut logs) = self.logs.write() {
            logs.push(log);
        }
    }
}

/// Postgres-backed directory store for the migration orchestrator, using the
/// same sync-over-async bridge as the rest of the infra layer (falls back to
/// a fresh runtime when called from outside an ambient one, since the
/// `ledger-cli` binary drives these calls from `spawn_blocking`).
pub struct PostgresDirectoryStore {
    pool: std::sync::Arc<sqlx::PgPool>,
}

impl PostgresDirectoryStore {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool: std::sync::Arc::new(pool) }
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

impl DirectoryStore for PostgresDirectoryStore {
    fn get_entry(&self, tenant_id: TenantId) -> Option<TenantDirectoryEntry> {
        use sqlx::Row;
        let pool = self.pool.clone();
        let tenant_uuid = tenant_id.as_uuid();

        self.run(async move {
            sqlx::query(
                r#"
                SELECT mode, handle, status, migrated_at, migration_event_sequence,
                       migration_export_hash, migration_import_hash, migration_import_count,
                       created_at, updated_at, notes
                FROM tenant_directory
                WHERE tenant_id = $1
                "#,
            )
            .bind(tenant_uuid)
            .fetch_optional(&*pool)
            .await
            .ok()
            .flatten()
            .and_then(|row| {
                let mode: String = row.try_get("mode").ok()?;
                let status: String = row.try_get("status").ok()?;
                Some(TenantDirectoryEntry {
                    tenant_id,
                    mode: if mode == "dedicated" { IsolationMode::Dedicated } else { IsolationMode::Shared },
                    handle: row.try_get("handle").ok()?,
                    status: match status.as_str() {
                        "migrating" => TenantStatus::Migrating,
                        "read_only" => TenantStatus::ReadOnly,
                        "suspended" => TenantStatus::Suspended,
                        _ => TenantStatus::Active,
                    },
                    migrated_at: row.try_get("migrated_at").ok(),
                    migration_event_sequence: row
                        .try_get::<Option<i64>, _>("migration_event_sequence")
                        .ok()
                        .flatten()
                        .map(|v| v as u64),
                    migration_export_hash: row.try_get("migration_export_hash").ok(),
                    migration_import_hash: row.try_get("migration_import_hash").ok(),
                    migration_import_count: row
                        .try_get::<Option<i64>, _>("migration_import_count")
                        .ok()
                        .flatten()
                        .map(|v| v as u64),
                    created_at: row.try_get("created_at").ok()?,
                    updated_at: row.try_get("updated_at").ok()?,
                    notes: row.try_get("notes").ok()?,
                })
            })
        })
        .flatten()
    }

    fn upsert_entry(&self, entry: TenantDirectoryEntry) {
        let pool = self.pool.clone();
        let tenant_uuid = entry.tenant_id.as_uuid();
        let mode = match entry.mode {
            IsolationMode::Shared => "shared",
            IsolationMode::Dedicated => "dedicated",
        };
        let status = match entry.status {
            TenantStatus::Active => "active",
            TenantStatus::Migrating => "migrating",
            TenantStatus::ReadOnly => "read_only",
            TenantStatus::Suspended => "suspended",
        };

        self.run(async move {
            let _ = sqlx::query(
                r#"
                INSERT INTO tenant_directory (
                    tenant_id, mode, handle, status, migrated_at, migration_event_sequence,
                    migration_export_hash, migration_import_hash, migration_import_count,
                    created_at, updated_at, notes
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                ON CONFLICT (tenant_id) DO UPDATE SET
                    mode = EXCLUDED.mode,
                    handle = EXCLUDED.handle,
                    status = EXCLUDED.status,
                    migrated_at = EXCLUDED.migrated_at,
                    migration_event_sequence = EXCLUDED.migration_event_sequence,
                    migration_export_hash = EXCLUDED.migration_export_hash,
                    migration_import_hash = EXCLUDED.migration_import_hash,
                    migration_import_count = EXCLUDED.migration_import_count,
                    updated_at = EXCLUDED.updated_at,
                    notes = EXCLUDED.notes
                "#,
            )
            .bind(tenant_uuid)
            .bind(mode)
            .bind(&entry.handle)
            .bind(status)
            .bind(entry.migrated_at)
            .bind(entry.migration_event_sequence.map(|v| v as i64))
            .bind(&entry.migration_export_hash)
            .bind(&entry.migration_import_hash)
            .bind(entry.migration_import_count.map(|v| v as i64))
            .bind(entry.created_at)
            .bind(entry.updated_at)
            .bind(&entry.notes)
            .execute(&*pool)
            .await;
        });
    }

    fn append_migration_log(&self, log: MigrationLog) {
        let pool = self.pool.clone();
        let tenant_uuid = log.tenant_id.as_uuid();
        let from_mode = match log.from_mode {
            IsolationMode::Shared => "shared",
            IsolationMode::Dedicated => "dedicated",
        };
        let to_mode = match log.to_mode {
            IsolationMode::Shared => "shared",
            IsolationMode::Dedicated => "dedicated",
        };
        let result = match log.result {
            MigrationResult::Success => "success",
            MigrationResult::Failed => "failed",
            MigrationResult::RolledBack => "rolled_back",
            MigrationResult::InProgress => "in_progress",
        };

        self.run(async move {
            let _ = sqlx::query(
                r#"
                INSERT INTO migration_log (
                    tenant_id, from_mode, to_mode, from_handle, to_handle, started_at,
                    completed_at, export_event_count, import_event_count, export_hash,
                    import_hash, hashes_match, result, error_message, initiated_by
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
                "#,
            )
            .bind(tenant_uuid)
            .bind(from_mode)
            .bind(to_mode)
            .bind(&log.from_handle)
            .bind(&log.to_handle)
            .bind(log.started_at)
            .bind(log.completed_at)
            .bind(log.export_event_count.map(|v| v as i64))
            .bind(log.import_event_count.map(|v| v as i64))
            .bind(&log.export_hash)
            .bind(&log.import_hash)
            .bind(log.hashes_match)
            .bind(result)
            .bind(&log.error_message)
            .bind(&log.initiated_by)
            .execute(&*pool)
            .await;
        });
    }
}

/// One exported event, matching the on-disk export file schema. Either
/// `data` is populated (INLINE/CHUNKED) or `payload_ref_id` +
/// `payload_content_hash` are (EXTERNAL).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: Uuid,
    pub event_type: String,
    pub aggregate_type: String,
    pub aggregate_id: AggregateId,
    pub sequence: u64,
    pub stream_sequence: u64,
    pub idempotency_key: String,
    pub occurred_at: DateTime<Utc>,
    pub recorded_at: DateTime<Utc>,
    pub payload_storage: PayloadStorage,
    pub payload_hash: String,
    pub origin: EventOrigin,
    pub metadata: BTreeMap<String, JsonValue>,
    pub schema_version: u32,
    pub caused_by_user_id: Option<Uuid>,
    pub caused_by_event_id: Option<Uuid>,
    pub data: Option<JsonValue>,
    pub payload_ref_id: Option<Uuid>,
    pub payload_content_hash: Option<String>,
}

impl EventRecord {
    fn from_event(event: &BusinessEvent, include_payloads: bool, payloads: &dyn PayloadStore) -> Self {
        let (data, payload_ref_id, payload_content_hash) = match event.payload_storage {
            PayloadStorage::External => {
                let data = if include_payloads {
                    payloads.get_by_hash(&event.payload_hash).map(|b| b.data)
                } else {
                    None
                };
                (data, event.payload_ref, Some(event.payload_hash.clone()))
            }
            PayloadStorage::Inline | PayloadStorage::Chunked => {
                (Some(event.inline_data.clone()), None, None)
            }
        };

        Self {
            id: event.id,
            event_type: event.event_type.clone(),
            aggregate_type: event.aggregate_type.clone(),
            aggregate_id: event.aggregate_id,
            sequence: event.aggregate_sequence,
            stream_sequence: event.stream_sequence,
            idempotency_key: event.idempotency_key.clone(),
            occurred_at: event.occurred_at,
            recorded_at: event.recorded_at,
            payload_storage: event.payload_storage,
            payload_hash: event.payload_hash.clone(),
            origin: event.origin,
            metadata: event.metadata.clone(),
            schema_version: event.schema_version,
            caused_by_user_id: event.caused_by_user_id,
            caused_by_event_id: event.caused_by_event_id,
            data,
            payload_ref_id,
            payload_content_hash,
        }
    }

    /// Fields that identify *what happened*, independent of the store's own
    /// assignment of `id`/`stream_sequence`/`recorded_at`. `import` replays
    /// through `EventStore::append`, which assigns fresh values for those
    /// three on the target; comparing full records after a round trip would
    /// never match by construction, so content-equality checks use this
    /// instead of `export_hash`/`import_hash` directly.
    fn content_digest(&self) -> JsonValue {
        serde_json::json!({
            "event_type": self.event_type,
            "aggregate_type": self.aggregate_type,
            "aggregate_id": self.aggregate_id,
            "sequence": self.sequence,
            "idempotency_key": self.idempotency_key,
            "occurred_at": self.occurred_at,
            "payload_hash": self.payload_hash,
            "schema_version": self.schema_version,
            "origin": self.origin,
            "data": self.data,
            "payload_content_hash": self.payload_content_hash,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantExportInfo {
    pub id: TenantId,
    pub public_id: TenantId,
    pub slug: Option<String>,
}

/// The on-disk export file format (§6): version, tenant identity, event
/// count, per-event records, and a running hash over the records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportFile {
    pub version: String,
    pub exported_at: DateTime<Utc>,
    pub tenant: TenantExportInfo,
    pub source_handle: String,
    pub after_sequence: u64,
    pub event_count: u64,
    pub events: Vec<EventRecord>,
    pub export_hash: String,
}

fn compute_records_hash(records: &[EventRecord]) -> Result<String, MigrationError> {
    let mut concatenated = String::new();
    for record in records {
        let canonical = ledger_core::canonical_json(record)
            .map_err(|e| MigrationError::Serialize(e.to_string()))?;
        concatenated.push_str(&canonical);
    }
    Ok(ledger_core::compute_bytes_hash(concatenated.as_bytes()))
}

fn content_hash(records: &[EventRecord]) -> String {
    let digests: Vec<JsonValue> = records.iter().map(EventRecord::content_digest).collect();
    ledger_core::compute_payload_hash(&JsonValue::Array(digests))
}

#[derive(Debug, Clone)]
pub struct ImportReport {
    pub imported_count: u64,
    pub skipped_count: u64,
    pub import_hash: String,
    pub content_hash: String,
}

#[derive(Debug, Clone)]
pub struct VerifyReport {
    pub event_count_matches: bool,
    pub content_hash_matches: bool,
    pub trial_balance_matches: bool,
    pub is_valid: bool,
}

/// Drives a single tenant's move between database handles. `source`/`target`
/// are the event stores for the handles involved; `payloads` backs external
/// blob re-upload during import; `directory` tracks the tenant's lifecycle
/// status and the migration audit log.
pub struct MigrationOrchestrator<S, T, P, D> {
    source: S,
    target: T,
    payloads: P,
    directory: D,
}

impl<S, T, P, D> MigrationOrchestrator<S, T, P, D>
where
    S: EventStore + EventQuery,
    T: EventStore + EventQuery,
    P: PayloadStore,
    D: DirectoryStore,
{
    pub fn new(source: S, target: T, payloads: P, directory: D) -> Self {
        Self { source, target, payloads, directory }
    }

    /// Step 1: mark the tenant MIGRATING so the request edge refuses
    /// mutations for it.
    pub fn freeze(&self, tenant_id: TenantId) -> Result<TenantDirectoryEntry, MigrationError> {
        let mut entry = self
            .directory
            .get_entry(tenant_id)
            .unwrap_or_else(|| TenantDirectoryEntry::new_shared(tenant_id, Utc::now()));
        entry.status = TenantStatus::Migrating;
        entry.updated_at = Utc::now();
        self.directory.upsert_entry(entry.clone());
        Ok(entry)
    }

    /// Step 2: stream all events for the tenant from the source handle in
    /// `stream_sequence` order into a canonical export file.
    pub fn export(
        &self,
        tenant_id: TenantId,
        source_handle: &str,
        after_sequence: u64,
        include_payloads: bool,
    ) -> Result<ExportFile, MigrationError> {
        let events: Vec<EventRecord> = drain_tenant_stream_ordered(&self.source, tenant_id)?
            .into_iter()
            .filter(|e| e.stream_sequence > after_sequence)
            .map(|e| EventRecord::from_event(&e, include_payloads, &self.payloads))
            .collect();

        let export_hash = compute_records_hash(&events)?;

        Ok(ExportFile {
            version: "1.0".to_string(),
            exported_at: Utc::now(),
            tenant: TenantExportInfo { id: tenant_id, public_id: tenant_id, slug: None },
            source_handle: source_handle.to_string(),
            after_sequence,
            event_count: events.len() as u64,
            events,
            export_hash,
        })
    }

    /// Step 3: run schema migrations against the target handle. This crate
    /// owns no migration runner; callers with one should invoke it before
    /// `import`. Kept as an explicit step so the pipeline's shape matches
    /// the documented one even where this implementation is a no-op.
    pub fn prepare_target(&self) -> Result<(), MigrationError> {
        Ok(())
    }

    /// Step 4: re-insert each exported event into the target, re-uploading
    /// external payloads (deduped by hash). `EventStore::append` assigns its
    /// own `id`/`stream_sequence` on the target, so literal identity is not
    /// preserved across handles; `aggregate_sequence` ordering is, since
    /// events are replayed in their original order with `ExpectedVersion::Any`.
    pub fn import(
        &self,
        export: &ExportFile,
        skip_existing: bool,
    ) -> Result<ImportReport, MigrationError> {
        EventLogWrite::check(WriteContext::Migration)?;

        let tenant_id = export.tenant.id;
        let mut imported = 0u64;
        let mut skipped = 0u64;

        for record in &export.events {
            if skip_existing
                && self
                    .target
                    .find_by_idempotency_key(tenant_id, &record.idempotency_key)?
                    .is_some()
            {
                skipped += 1;
                continue;
            }

            let inline_data = match &record.data {
                Some(v) => v.clone(),
                None => record
                    .payload_content_hash
                    .as_deref()
                    .and_then(|hash| self.payloads.get_by_hash(hash))
                    .map(|blob| blob.data)
                    .unwrap_or(JsonValue::Null),
            };

            let draft = EventDraft {
                tenant_id,
                aggregate_id: record.aggregate_id,
                aggregate_type: record.aggregate_type.clone(),
                event_type: record.event_type.clone(),
                schema_version: record.schema_version,
                inline_data,
                payload_storage: record.payload_storage,
                payload_hash: record.payload_hash.clone(),
                payload_ref: record.payload_ref_id,
                idempotency_key: record.idempotency_key.clone(),
                origin: record.origin,
                caused_by_user_id: record.caused_by_user_id,
                caused_by_event_id: record.caused_by_event_id,
                occurred_at: record.occurred_at,
                metadata: record.metadata.clone(),
            };

            self.target.append(draft, ExpectedVersion::Any)?;
            imported += 1;
        }

        let reimported: Vec<EventRecord> = drain_tenant_stream_ordered(&self.target, tenant_id)?
            .into_iter()
            .map(|e| EventRecord::from_event(&e, true, &self.payloads))
            .collect();

        Ok(ImportReport {
            imported_count: imported,
            skipped_count: skipped,
            import_hash: compute_records_hash(&reimported)?,
            content_hash: content_hash(&reimported),
        })
    }

    /// Step 6: all must hold for the migration to proceed to cutover.
    /// `trial_balance_source`/`trial_balance_target` are supplied by the
    /// caller (computed from the accounting read models), since trial
    /// balance itself is an accounting concern, not this orchestrator's.
    pub fn verify(
        &self,
        export: &ExportFile,
        import_report: &ImportReport,
        trial_balance_source: i128,
        trial_balance_target: i128,
    ) -> VerifyReport {
        let event_count_matches = export.event_count == import_report.imported_count;
        let content_hash_matches = content_hash(&export.events) == import_report.content_hash;
        let trial_balance_matches = trial_balance_source == trial_balance_target;

        VerifyReport {
            event_count_matches,
            content_hash_matches,
            trial_balance_matches,
            is_valid: event_count_matches && content_hash_matches && trial_balance_matches,
        }
    }

    /// Step 7: point the directory entry at the target handle and mark the
    /// tenant ACTIVE again.
    pub fn cutover(
        &self,
        tenant_id: TenantId,
        target_handle: &str,
        export: &ExportFile,
        import_report: &ImportReport,
    ) -> Result<TenantDirectoryEntry, MigrationError> {
        let mut entry = self.directory.get_entry(tenant_id).ok_or(MigrationError::NoDirectoryEntry)?;
        if entry.status != TenantStatus::Migrating {
            return Err(MigrationError::NotMigrating(entry.status));
        }

        let from_mode = entry.mode;
        let from_handle = entry.handle.clone();
        let to_mode = match from_mode {
            IsolationMode::Shared => IsolationMode::Dedicated,
            IsolationMode::Dedicated => IsolationMode::Shared,
        };

        entry.mode = to_mode;
        entry.handle = target_handle.to_string();
        entry.status = TenantStatus::Active;
        entry.migrated_at = Some(Utc::now());
        entry.migration_event_sequence = export.events.last().map(|e| e.stream_sequence);
        entry.migration_export_hash = Some(export.export_hash.clone());
        entry.migration_import_hash = Some(import_report.import_hash.clone());
        entry.migration_import_count = Some(import_report.imported_count);
        entry.updated_at = Utc::now();
        self.directory.upsert_entry(entry.clone());

        self.directory.append_migration_log(MigrationLog {
            tenant_id,
            from_mode,
            to_mode,
            from_handle,
            to_handle: target_handle.to_string(),
            started_at: export.exported_at,
            completed_at: Some(Utc::now()),
            export_event_count: Some(export.event_count),
            import_event_count: Some(import_report.imported_count),
            export_hash: Some(export.export_hash.clone()),
            import_hash: Some(import_report.import_hash.clone()),
            hashes_match: Some(export.export_hash == import_report.import_hash),
            result: MigrationResult::Success,
            error_message: None,
            initiated_by: None,
        });

        Ok(entry)
    }

    /// Step 8: any failure reverts the source entry to ACTIVE with its
    /// original mode/handle and logs the failure. Target data is left in
    /// place for offline garbage collection.
    pub fn rollback(
        &self,
        tenant_id: TenantId,
        original_mode: IsolationMode,
        original_handle: &str,
        reason: &str,
    ) -> Result<TenantDirectoryEntry, MigrationError> {
        let mut entry = self.directory.get_entry(tenant_id).ok_or(MigrationError::NoDirectoryEntry)?;

        entry.mode = original_mode;
        entry.handle = original_handle.to_string();
        entry.status = TenantStatus::Active;
        entry.updated_at = Utc::now();
        self.directory.upsert_entry(entry.clone());

        self.directory.append_migration_log(MigrationLog {
            tenant_id,
            from_mode: original_mode,
            to_mode: original_mode,
            from_handle: original_handle.to_string(),
            to_handle: original_handle.to_string(),
            started_at: Utc::now(),
            completed_at: Some(Utc::now()),
            export_event_count: None,
            import_event_count: None,
            export_hash: None,
            import_hash: None,
            hashes_match: None,
            result: MigrationResult::RolledBack,
            error_message: Some(reason.to_string()),
            initiated_by: None,
        });

        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_store::InMemoryEventStore;
    use crate::payload::InMemoryPayloadStore;
    use ledger_core::ExpectedVersion;

    fn orchestrator() -> MigrationOrchestrator<
        InMemoryEventStore,
        InMemoryEventStore,
        InMemoryPayloadStore,
        InMemoryDirectoryStore,
    > {
        MigrationOrchestrator::new(
            InMemoryEventStore::new(),
            InMemoryEventStore::new(),
            InMemoryPayloadStore::new(),
            InMemoryDirectoryStore::new(),
        )
    }

    fn seed(store: &InMemoryEventStore, tenant_id: TenantId, n: usize) {
        for i in 0..n {
            store
                .append(
                    EventDraft {
                        tenant_id,
                        aggregate_id: AggregateId::new(),
                        aggregate_type: "account".to_string(),
                        event_type: "account.created".to_string(),
                        schema_version: 1,
                        inline_data: serde_json::json!({"i": i}),
                        payload_storage: PayloadStorage::Inline,
                        payload_hash: String::new(),
                        payload_ref: None,
                        idempotency_key: format!("seed:{i}"),
                        origin: EventOrigin::System,
                        caused_by_user_id: None,
                        caused_by_event_id: None,
                        occurred_at: Utc::now(),
                        metadata: BTreeMap::new(),
                    },
                    ExpectedVersion::Any,
                )
                .unwrap();
        }
    }

    #[test]
    fn full_cycle_freeze_export_import_verify_cutover() {
        let orchestrator = orchestrator();
        let tenant_id = TenantId::new();
        seed(&orchestrator.source, tenant_id, 3);

        let frozen = orchestrator.freeze(tenant_id).unwrap();
        assert_eq!(frozen.status, TenantStatus::Migrating);

        let export = orchestrator.export(tenant_id, "default", 0, true).unwrap();
        assert_eq!(export.event_count, 3);

        orchestrator.prepare_target().unwrap();
        let report = orchestrator.import(&export, false).unwrap();
        assert_eq!(report.imported_count, 3);
        assert_eq!(report.skipped_count, 0);

        let verify = orchestrator.verify(&export, &report, 0, 0);
        assert!(verify.event_count_matches);
        assert!(verify.content_hash_matches);
        assert!(verify.is_valid);

        let cutover = orchestrator.cutover(tenant_id, "tenant_acme", &export, &report).unwrap();
        assert_eq!(cutover.status, TenantStatus::Active);
        assert_eq!(cutover.handle, "tenant_acme");
        assert_eq!(orchestrator.directory.logs().len(), 1);
    }

    #[test]
    fn import_skip_existing_avoids_reimporting_seen_idempotency_keys() {
        let orchestrator = orchestrator();
        let tenant_id = TenantId::new();
        seed(&orchestrator.source, tenant_id, 2);
        let export = orchestrator.export(tenant_id, "default", 0, true).unwrap();

        orchestrator.import(&export, false).unwrap();
        let second = orchestrator.import(&export, true).unwrap();
        assert_eq!(second.imported_count, 0);
        assert_eq!(second.skipped_count, 2);
    }

    #[test]
    fn verify_fails_when_trial_balances_disagree() {
        let orchestrator = orchestrator();
        let tenant_id = TenantId::new();
        seed(&orchestrator.source, tenant_id, 1);
        let export = orchestrator.export(tenant_id, "default", 0, true).unwrap();
        let report = orchestrator.import(&export, false).unwrap();

        let verify = orchestrator.verify(&export, &report, 100, 50);
        assert!(!verify.trial_balance_matches);
        assert!(!verify.is_valid);
    }

    #[test]
    fn rollback_restores_source_entry_to_active() {
        let orchestrator = orchestrator();
        let tenant_id = TenantId::new();
        orchestrator.freeze(tenant_id).unwrap();

        let rolled_back = orchestrator
            .rollback(tenant_id, IsolationMode::Shared, "default", "target unreachable")
            .unwrap();
        assert_eq!(rolled_back.status, TenantStatus::Active);
        assert_eq!(rolled_back.handle, "default");
        assert_eq!(orchestrator.directory.logs().len(), 1);
        assert_eq!(orchestrator.directory.logs()[0].result, MigrationResult::RolledBack);
    }
}
