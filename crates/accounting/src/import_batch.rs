//! Bulk ingestion support: import batches and identity crosswalks.
//!
//! Actual file parsing is out of scope here; this module covers the batch
//! lifecycle (stage records, complete, fail) and the crosswalk lookup used
//! by commands to recognize a previously-imported external record rather
//! than create a duplicate.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use ledger_core::{Aggregate, AggregateRoot, AggregateId, DomainError, TenantId};
use ledger_events::Event;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportBatchStatus {
    Staging,
    Completed,
    Failed,
}

/// Outcome of mapping/validating a single staged record within a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordOutcome {
    Valid,
    Invalid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportBatch {
    id: AggregateId,
    tenant_id: Option<TenantId>,
    pub source_system_code: String,
    pub status: ImportBatchStatus,
    pub total_records: u32,
    pub valid_records: u32,
    pub invalid_records: u32,
    pub committed_entry_ids: Vec<AggregateId>,
    pub rejection_reason: Option<String>,
    version: u64,
    created: bool,
}

impl ImportBatch {
    pub fn empty(id: AggregateId) -> Self {
        Self {
            id,
            tenant_id: None,
            source_system_code: String::new(),
            status: ImportBatchStatus::Staging,
            total_records: 0,
            valid_records: 0,
            invalid_records: 0,
            committed_entry_ids: Vec::new(),
            rejection_reason: None,
            version: 0,
            created: false,
        }
    }
}

impl AggregateRoot for ImportBatch {
    type Id = AggregateId;
    fn id(&self) -> &Self::Id {
        &self.id
    }
    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateImportBatch {
    pub tenant_id: TenantId,
    pub batch_id: AggregateId,
    pub source_system_code: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageImportRecord {
    pub tenant_id: TenantId,
    pub batch_id: AggregateId,
    pub row_number: u32,
    pub raw_payload: JsonValue,
    pub outcome: RecordOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompleteImportBatch {
    pub tenant_id: TenantId,
    pub batch_id: AggregateId,
    pub committed_entry_ids: Vec<AggregateId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailImportBatch {
    pub tenant_id: TenantId,
    pub batch_id: AggregateId,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ImportBatchCommand {
    Create(CreateImportBatch),
    StageRecord(StageImportRecord),
    Complete(CompleteImportBatch),
    Fail(FailImportBatch),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportBatchCreated {
    pub tenant_id: TenantId,
    pub batch_id: AggregateId,
    pub source_system_code: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportRecordStaged {
    pub tenant_id: TenantId,
    pub batch_id: AggregateId,
    pub row_number: u32,
    pub raw_payload: JsonValue,
    pub outcome: RecordOutcome,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportBatchCompleted {
    pub tenant_id: TenantId,
    pub batch_id: AggregateId,
    pub committed_entry_ids: Vec<AggregateId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportBatchFailed {
    pub tenant_id: TenantId,
    pub batch_id: AggregateId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ImportBatchEvent {
    Created(ImportBatchCreated),
    RecordStaged(ImportRecordStaged),
    Completed(ImportBatchCompleted),
    Failed(ImportBatchFailed),
}

impl Event for ImportBatchEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ImportBatchEvent::Created(_) => "import_batch.created",
            ImportBatchEvent::RecordStaged(_) => "import_batch.record_staged",
            ImportBatchEvent::Completed(_) => "import_batch.completed",
            ImportBatchEvent::Failed(_) => "import_batch.failed",
        }
    }
    fn version(&self) -> u32 {
        1
    }
    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ImportBatchEvent::Created(e) => e.occurred_at,
            ImportBatchEvent::RecordStaged(e) => e.occurred_at,
            ImportBatchEvent::Completed(e) => e.occurred_at,
            ImportBatchEvent::Failed(e) => e.occurred_at,
        }
    }
}

impl Aggregate for ImportBatch {
    type Command = ImportBatchCommand;
    type Event = ImportBatchEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ImportBatchEvent::Created(e) => {
                self.tenant_id = Some(e.tenant_id);
                self.source_system_code = e.source_system_code.clone();
                self.created = true;
            }
            ImportBatchEvent::RecordStaged(e) => {
                self.total_records += 1;
                match e.outcome {
                    RecordOutcome::Valid => self.valid_records += 1,
                    RecordOutcome::Invalid => self.invalid_records += 1,
                }
            }
            ImportBatchEvent::Completed(e) => {
                self.status = ImportBatchStatus::Completed;
                self.committed_entry_ids = e.committed_entry_ids.clone();
            }
            ImportBatchEvent::Failed(e) => {
                self.status = ImportBatchStatus::Failed;
                self.rejection_reason = Some(e.reason.clone());
            }
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ImportBatchCommand::Create(cmd) => self.handle_create(cmd),
            ImportBatchCommand::StageRecord(cmd) => self.handle_stage_record(cmd),
            ImportBatchCommand::Complete(cmd) => self.handle_complete(cmd),
            ImportBatchCommand::Fail(cmd) => self.handle_fail(cmd),
        }
    }
}

impl ImportBatch {
    fn handle_create(&self, cmd: &CreateImportBatch) -> Result<Vec<ImportBatchEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("import batch already created"));
        }
        Ok(vec![ImportBatchEvent::Created(ImportBatchCreated {
            tenant_id: cmd.tenant_id,
            batch_id: cmd.batch_id,
            source_system_code: cmd.source_system_code.clone(),
            occurred_at: Utc::now(),
        })])
    }

    fn handle_stage_record(
        &self,
        cmd: &StageImportRecord,
    ) -> Result<Vec<ImportBatchEvent>, DomainError> {
        self.ensure_staging()?;
        Ok(vec![ImportBatchEvent::RecordStaged(ImportRecordStaged {
            tenant_id: cmd.tenant_id,
            batch_id: cmd.batch_id,
            row_number: cmd.row_number,
            raw_payload: cmd.raw_payload.clone(),
            outcome: cmd.outcome,
            occurred_at: Utc::now(),
        })])
    }

    fn handle_complete(
        &self,
        cmd: &CompleteImportBatch,
    ) -> Result<Vec<ImportBatchEvent>, DomainError> {
        self.ensure_staging()?;
        if self.invalid_records > 0 {
            return Err(DomainError::invariant(
                "cannot complete a batch with invalid staged records",
            ));
        }
        Ok(vec![ImportBatchEvent::Completed(ImportBatchCompleted {
            tenant_id: cmd.tenant_id,
            batch_id: cmd.batch_id,
            committed_entry_ids: cmd.committed_entry_ids.clone(),
            occurred_at: Utc::now(),
        })])
    }

    fn handle_fail(&self, cmd: &FailImportBatch) -> Result<Vec<ImportBatchEvent>, DomainError> {
        self.ensure_staging()?;
        Ok(vec![ImportBatchEvent::Failed(ImportBatchFailed {
            tenant_id: cmd.tenant_id,
            batch_id: cmd.batch_id,
            reason: cmd.reason.clone(),
            occurred_at: Utc::now(),
        })])
    }

    fn ensure_staging(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.status != ImportBatchStatus::Staging {
            return Err(DomainError::invariant(
                "batch is no longer accepting changes",
            ));
        }
        Ok(())
    }
}

/// A mapping from an external system's identifier to an internal `public_id`,
/// preventing a repeated import of the same external record from creating a
/// duplicate entry. Not itself event-sourced: callers look entries up via a
/// repository and insert new ones as imports are committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityCrosswalkEntry {
    pub tenant_id: TenantId,
    pub source_system_code: String,
    pub object_type: String,
    pub external_id: String,
    pub internal_public_id: AggregateId,
}

impl IdentityCrosswalkEntry {
    pub fn key(&self) -> CrosswalkKey {
        CrosswalkKey {
            tenant_id: self.tenant_id,
            source_system_code: self.source_system_code.clone(),
            object_type: self.object_type.clone(),
            external_id: self.external_id.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CrosswalkKey {
    pub tenant_id: TenantId,
    pub source_system_code: String,
    pub object_type: String,
    pub external_id: String,
}

/// In-memory crosswalk table, usable directly in tests and as a building
/// block for a persistent repository implementation elsewhere.
#[derive(Debug, Clone, Default)]
pub struct CrosswalkTable {
    entries: BTreeMap<CrosswalkKey, AggregateId>,
}

impl CrosswalkTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, key: &CrosswalkKey) -> Option<AggregateId> {
        self.entries.get(key).copied()
    }

    pub fn insert(&mut self, entry: IdentityCrosswalkEntry) {
        self.entries.insert(entry.key(), entry.internal_public_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_then_complete() {
        let tenant_id = TenantId::new();
        let batch_id = AggregateId::new();
        let mut batch = ImportBatch::empty(batch_id);

        let events = batch
            .handle(&ImportBatchCommand::Create(CreateImportBatch {
                tenant_id,
                batch_id,
                source_system_code: "shopify".to_string(),
            }))
            .unwrap();
        for e in &events {
            batch.apply(e);
        }

        let events = batch
            .handle(&ImportBatchCommand::StageRecord(StageImportRecord {
                tenant_id,
                batch_id,
                row_number: 1,
                raw_payload: serde_json::json!({"amount": "10.00"}),
                outcome: RecordOutcome::Valid,
            }))
            .unwrap();
        for e in &events {
            batch.apply(e);
        }
        assert_eq!(batch.total_records, 1);
        assert_eq!(batch.valid_records, 1);

        let entry_id = AggregateId::new();
        let events = batch
            .handle(&ImportBatchCommand::Complete(CompleteImportBatch {
                tenant_id,
                batch_id,
                committed_entry_ids: vec![entry_id],
            }))
            .unwrap();
        for e in &events {
            batch.apply(e);
        }
        assert_eq!(batch.status, ImportBatchStatus::Completed);
        assert_eq!(batch.committed_entry_ids, vec![entry_id]);
    }

    #[test]
    fn batch_with_invalid_records_cannot_complete() {
        let tenant_id = TenantId::new();
        let batch_id = AggregateId::new();
        let mut batch = ImportBatch::empty(batch_id);
        let events = batch
            .handle(&ImportBatchCommand::Create(CreateImportBatch {
                tenant_id,
                batch_id,
                source_system_code: "csv".to_string(),
            }))
            .unwrap();
        for e in &events {
            batch.apply(e);
        }
        let events = batch
            .handle(&ImportBatchCommand::StageRecord(StageImportRecord {
                tenant_id,
                batch_id,
                row_number: 1,
                raw_payload: serde_json::json!({}),
                outcome: RecordOutcome::Invalid,
            }))
            .unwrap();
        for e in &events {
            batch.apply(e);
        }

        let err = batch
            .handle(&ImportBatchCommand::Complete(CompleteImportBatch {
                tenant_id,
                batch_id,
                committed_entry_ids: vec![],
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn crosswalk_table_round_trips() {
        let tenant_id = TenantId::new();
        let internal_id = AggregateId::new();
        let mut table = CrosswalkTable::new();
        let entry = IdentityCrosswalkEntry {
            tenant_id,
            source_system_code: "shopify".to_string(),
            object_type: "customer".to_string(),
            external_id: "cust-123".to_string(),
            internal_public_id: internal_id,
        };
        table.insert(entry.clone());

        assert_eq!(table.lookup(&entry.key()), Some(internal_id));
    }
}
