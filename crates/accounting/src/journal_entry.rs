//! Journal entry aggregate.
//!
//! Supersedes the bare double-entry `Ledger` aggregate with the full
//! lifecycle observed in the original system: entries are built up
//! incrementally (`created`/`updated`), marked complete, posted, and may
//! later be reversed. Analysis tags are attached per line rather than at
//! the entry level.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use ledger_core::{Aggregate, AggregateRoot, AggregateId, DomainError, TenantId};
use ledger_events::Event;

use crate::account::FieldChange;

/// Above this many lines, a journal is emitted as a HEADER/CHUNK×N/FINALIZED
/// sequence instead of a single `journal_entry.created` event. The cap keeps
/// any single event's `inline_data` bounded regardless of entry size.
pub const MAX_LINES_PER_CHUNK: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JournalEntryKind {
    Normal,
    Reversal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JournalEntryStatus {
    /// Created but missing required fields (e.g. unbalanced, no lines).
    Incomplete,
    /// Complete and balanced, not yet posted.
    Draft,
    Posted,
    Reversed,
}

/// One line of a journal entry. Analysis tags (cost center, project, etc.)
/// are keyed by dimension code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalLine {
    pub line_no: u32,
    pub account_public_id: AggregateId,
    /// Positive amount in the entry's minor currency unit.
    pub amount: i64,
    pub is_debit: bool,
    pub memo: String,
    pub analysis_tags: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    id: AggregateId,
    tenant_id: Option<TenantId>,
    pub date: Option<NaiveDate>,
    pub memo: String,
    pub memo_ar: String,
    pub kind: JournalEntryKind,
    pub currency: String,
    pub exchange_rate: String,
    pub status: JournalEntryStatus,
    pub entry_number: Option<u64>,
    pub lines: Vec<JournalLine>,
    pub reverses_entry: Option<AggregateId>,
    pub deleted: bool,
    pub reversed: bool,
    version: u64,
    created: bool,
}

impl JournalEntry {
    pub fn empty(id: AggregateId) -> Self {
        Self {
            id,
            tenant_id: None,
            date: None,
            memo: String::new(),
            memo_ar: String::new(),
            kind: JournalEntryKind::Normal,
            currency: String::new(),
            exchange_rate: "1".to_string(),
            status: JournalEntryStatus::Incomplete,
            entry_number: None,
            lines: Vec::new(),
            reverses_entry: None,
            deleted: false,
            reversed: false,
            version: 0,
            created: false,
        }
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn total_debit(&self) -> i128 {
        self.lines
            .iter()
            .filter(|l| l.is_debit)
            .map(|l| l.amount as i128)
            .sum()
    }

    pub fn total_credit(&self) -> i128 {
        self.lines
            .iter()
            .filter(|l| !l.is_debit)
            .map(|l| l.amount as i128)
            .sum()
    }

    fn is_balanced(&self) -> bool {
        !self.lines.is_empty() && self.total_debit() == self.total_credit()
    }

    /// Splits `lines` into groups of at most [`MAX_LINES_PER_CHUNK`], in
    /// `line_no` order, for chunked emission.
    pub fn chunk_lines(lines: &[JournalLine]) -> Vec<Vec<JournalLine>> {
        let mut sorted = lines.to_vec();
        sorted.sort_by_key(|l| l.line_no);
        sorted
            .chunks(MAX_LINES_PER_CHUNK)
            .map(|c| c.to_vec())
            .collect()
    }
}

impl AggregateRoot for JournalEntry {
    type Id = AggregateId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateJournalEntry {
    pub tenant_id: TenantId,
    pub entry_id: AggregateId,
    pub date: NaiveDate,
    pub memo: String,
    pub memo_ar: String,
    pub kind: JournalEntryKind,
    pub currency: String,
    pub exchange_rate: String,
    pub lines: Vec<JournalLine>,
    pub reverses_entry: Option<AggregateId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateJournalEntry {
    pub tenant_id: TenantId,
    pub entry_id: AggregateId,
    pub changes: BTreeMap<String, FieldChange>,
    pub lines: Option<Vec<JournalLine>>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveJournalEntryComplete {
    pub tenant_id: TenantId,
    pub entry_id: AggregateId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostJournalEntry {
    pub tenant_id: TenantId,
    pub entry_id: AggregateId,
    pub entry_number: u64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReverseJournalEntry {
    pub tenant_id: TenantId,
    pub entry_id: AggregateId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteJournalEntry {
    pub tenant_id: TenantId,
    pub entry_id: AggregateId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetJournalLineAnalysis {
    pub tenant_id: TenantId,
    pub entry_id: AggregateId,
    pub line_no: u32,
    pub analysis_tags: BTreeMap<String, String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JournalEntryCommand {
    Create(CreateJournalEntry),
    Update(UpdateJournalEntry),
    SaveComplete(SaveJournalEntryComplete),
    Post(PostJournalEntry),
    Reverse(ReverseJournalEntry),
    Delete(DeleteJournalEntry),
    SetLineAnalysis(SetJournalLineAnalysis),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntryCreated {
    pub tenant_id: TenantId,
    pub entry_id: AggregateId,
    pub date: NaiveDate,
    pub memo: String,
    pub memo_ar: String,
    pub kind: JournalEntryKind,
    pub currency: String,
    pub exchange_rate: String,
    pub lines: Vec<JournalLine>,
    pub reverses_entry: Option<AggregateId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntryUpdated {
    pub tenant_id: TenantId,
    pub entry_id: AggregateId,
    pub changes: BTreeMap<String, FieldChange>,
    pub lines: Option<Vec<JournalLine>>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntrySavedComplete {
    pub tenant_id: TenantId,
    pub entry_id: AggregateId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntryPosted {
    pub tenant_id: TenantId,
    pub entry_id: AggregateId,
    pub entry_number: u64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntryReversed {
    pub tenant_id: TenantId,
    pub entry_id: AggregateId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntryDeleted {
    pub tenant_id: TenantId,
    pub entry_id: AggregateId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalLineAnalysisSet {
    pub tenant_id: TenantId,
    pub entry_id: AggregateId,
    pub line_no: u32,
    pub analysis_tags: BTreeMap<String, String>,
    pub occurred_at: DateTime<Utc>,
}

/// Header-only variant of [`JournalEntryCreated`], emitted in place of it when
/// the entry has more than [`MAX_LINES_PER_CHUNK`] lines. `lines` is always
/// empty here; lines arrive via subsequent [`JournalLinesChunkAdded`] events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntryChunkedCreated {
    pub tenant_id: TenantId,
    pub entry_id: AggregateId,
    pub date: NaiveDate,
    pub memo: String,
    pub memo_ar: String,
    pub kind: JournalEntryKind,
    pub currency: String,
    pub exchange_rate: String,
    pub reverses_entry: Option<AggregateId>,
    pub total_chunks: u32,
    pub occurred_at: DateTime<Utc>,
}

/// One chunk of up to [`MAX_LINES_PER_CHUNK`] lines, causally linked to the
/// header event that started the chunked emission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalLinesChunkAdded {
    pub tenant_id: TenantId,
    pub entry_id: AggregateId,
    pub chunk_index: u32,
    pub total_chunks: u32,
    pub lines: Vec<JournalLine>,
    pub occurred_at: DateTime<Utc>,
}

/// Closes a chunked emission. `final_status` mirrors whatever status the
/// equivalent unchunked event sequence would have left the entry in
/// (`Incomplete` after a plain create, `Draft` after a create-and-save, and
/// so on); `entry_number` is set only when the chunked entry arrives
/// already posted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntryFinalized {
    pub tenant_id: TenantId,
    pub entry_id: AggregateId,
    pub total_debit: i128,
    pub total_credit: i128,
    pub line_count: u32,
    pub chunk_count: u32,
    pub final_status: JournalEntryStatus,
    pub entry_number: Option<u64>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JournalEntryEvent {
    Created(JournalEntryCreated),
    Updated(JournalEntryUpdated),
    SavedComplete(JournalEntrySavedComplete),
    Posted(JournalEntryPosted),
    Reversed(JournalEntryReversed),
    Deleted(JournalEntryDeleted),
    LineAnalysisSet(JournalLineAnalysisSet),
    ChunkedCreated(JournalEntryChunkedCreated),
    LinesChunkAdded(JournalLinesChunkAdded),
    Finalized(JournalEntryFinalized),
}

impl Event for JournalEntryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            JournalEntryEvent::Created(_) => "journal_entry.created",
            JournalEntryEvent::Updated(_) => "journal_entry.updated",
            JournalEntryEvent::SavedComplete(_) => "journal_entry.saved_complete",
            JournalEntryEvent::Posted(_) => "journal_entry.posted",
            JournalEntryEvent::Reversed(_) => "journal_entry.reversed",
            JournalEntryEvent::Deleted(_) => "journal_entry.deleted",
            JournalEntryEvent::LineAnalysisSet(_) => "journal_line.analysis_set",
            JournalEntryEvent::ChunkedCreated(_) => "journal_entry.created",
            JournalEntryEvent::LinesChunkAdded(_) => "journal.lines_chunk_added",
            JournalEntryEvent::Finalized(_) => "journal.finalized",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            JournalEntryEvent::Created(e) => e.occurred_at,
            JournalEntryEvent::Updated(e) => e.occurred_at,
            JournalEntryEvent::SavedComplete(e) => e.occurred_at,
            JournalEntryEvent::Posted(e) => e.occurred_at,
            JournalEntryEvent::Reversed(e) => e.occurred_at,
            JournalEntryEvent::Deleted(e) => e.occurred_at,
            JournalEntryEvent::LineAnalysisSet(e) => e.occurred_at,
            JournalEntryEvent::ChunkedCreated(e) => e.occurred_at,
            JournalEntryEvent::LinesChunkAdded(e) => e.occurred_at,
            JournalEntryEvent::Finalized(e) => e.occurred_at,
        }
    }
}

impl Aggregate for JournalEntry {
    type Command = JournalEntryCommand;
    type Event = JournalEntryEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            JournalEntryEvent::Created(e) => {
                self.tenant_id = Some(e.tenant_id);
                self.date = Some(e.date);
                self.memo = e.memo.clone();
                self.memo_ar = e.memo_ar.clone();
                self.kind = e.kind;
                self.currency = e.currency.clone();
                self.exchange_rate = e.exchange_rate.clone();
                self.lines = e.lines.clone();
                self.reverses_entry = e.reverses_entry;
                self.status = JournalEntryStatus::Incomplete;
                self.created = true;
            }
            JournalEntryEvent::Updated(e) => {
                for (field, change) in &e.changes {
                    match field.as_str() {
                        "memo" => self.memo = change.new.clone().unwrap_or_default(),
                        "memo_ar" => self.memo_ar = change.new.clone().unwrap_or_default(),
                        "currency" => self.currency = change.new.clone().unwrap_or_default(),
                        "exchange_rate" => {
                            self.exchange_rate = change.new.clone().unwrap_or_else(|| "1".to_string())
                        }
                        "date" => {
                            if let Some(raw) = &change.new {
                                if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
                                    self.date = Some(date);
                                }
                            }
                        }
                        _ => {}
                    }
                }
                if let Some(lines) = &e.lines {
                    self.lines = lines.clone();
                }
                self.status = JournalEntryStatus::Incomplete;
            }
            JournalEntryEvent::SavedComplete(_) => {
                self.status = JournalEntryStatus::Draft;
            }
            JournalEntryEvent::Posted(e) => {
                self.entry_number = Some(e.entry_number);
                self.status = JournalEntryStatus::Posted;
            }
            JournalEntryEvent::Reversed(_) => {
                self.status = JournalEntryStatus::Reversed;
                self.reversed = true;
            }
            JournalEntryEvent::Deleted(_) => {
                self.deleted = true;
            }
            JournalEntryEvent::LineAnalysisSet(e) => {
                if let Some(line) = self.lines.iter_mut().find(|l| l.line_no == e.line_no) {
                    line.analysis_tags = e.analysis_tags.clone();
                }
            }
            JournalEntryEvent::ChunkedCreated(e) => {
                self.tenant_id = Some(e.tenant_id);
                self.date = Some(e.date);
                self.memo = e.memo.clone();
                self.memo_ar = e.memo_ar.clone();
                self.kind = e.kind;
                self.currency = e.currency.clone();
                self.exchange_rate = e.exchange_rate.clone();
                self.lines = Vec::new();
                self.reverses_entry = e.reverses_entry;
                self.status = JournalEntryStatus::Incomplete;
                self.created = true;
            }
            JournalEntryEvent::LinesChunkAdded(e) => {
                self.lines.extend(e.lines.iter().cloned());
            }
            JournalEntryEvent::Finalized(e) => {
                self.status = e.final_status;
                if let Some(entry_number) = e.entry_number {
                    self.entry_number = Some(entry_number);
                }
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            JournalEntryCommand::Create(cmd) => self.handle_create(cmd),
            JournalEntryCommand::Update(cmd) => self.handle_update(cmd),
            JournalEntryCommand::SaveComplete(cmd) => self.handle_save_complete(cmd),
            JournalEntryCommand::Post(cmd) => self.handle_post(cmd),
            JournalEntryCommand::Reverse(cmd) => self.handle_reverse(cmd),
            JournalEntryCommand::Delete(cmd) => self.handle_delete(cmd),
            JournalEntryCommand::SetLineAnalysis(cmd) => self.handle_set_line_analysis(cmd),
        }
    }
}

impl JournalEntry {
    fn handle_create(
        &self,
        cmd: &CreateJournalEntry,
    ) -> Result<Vec<JournalEntryEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("journal entry already created"));
        }

        if cmd.lines.len() > MAX_LINES_PER_CHUNK {
            return Ok(Self::emit_chunked_create(cmd));
        }

        Ok(vec![JournalEntryEvent::Created(JournalEntryCreated {
            tenant_id: cmd.tenant_id,
            entry_id: cmd.entry_id,
            date: cmd.date,
            memo: cmd.memo.clone(),
            memo_ar: cmd.memo_ar.clone(),
            kind: cmd.kind,
            currency: cmd.currency.clone(),
            exchange_rate: cmd.exchange_rate.clone(),
            lines: cmd.lines.clone(),
            reverses_entry: cmd.reverses_entry,
            occurred_at: cmd.occurred_at,
        })])
    }

    /// Builds the HEADER/CHUNK×N/FINALIZED sequence for a `CreateJournalEntry`
    /// whose line count exceeds [`MAX_LINES_PER_CHUNK`]. `final_status` is
    /// `Incomplete`, matching the status a plain `Created` event leaves the
    /// entry in.
    fn emit_chunked_create(cmd: &CreateJournalEntry) -> Vec<JournalEntryEvent> {
        let chunks = Self::chunk_lines(&cmd.lines);
        let total_chunks = chunks.len() as u32;
        let mut events = Vec::with_capacity(chunks.len() + 2);

        events.push(JournalEntryEvent::ChunkedCreated(JournalEntryChunkedCreated {
            tenant_id: cmd.tenant_id,
            entry_id: cmd.entry_id,
            date: cmd.date,
            memo: cmd.memo.clone(),
            memo_ar: cmd.memo_ar.clone(),
            kind: cmd.kind,
            currency: cmd.currency.clone(),
            exchange_rate: cmd.exchange_rate.clone(),
            reverses_entry: cmd.reverses_entry,
            total_chunks,
            occurred_at: cmd.occurred_at,
        }));

        for (chunk_index, lines) in chunks.into_iter().enumerate() {
            events.push(JournalEntryEvent::LinesChunkAdded(JournalLinesChunkAdded {
                tenant_id: cmd.tenant_id,
                entry_id: cmd.entry_id,
                chunk_index: chunk_index as u32,
                total_chunks,
                lines,
                occurred_at: cmd.occurred_at,
            }));
        }

        let total_debit: i128 = cmd.lines.iter().filter(|l| l.is_debit).map(|l| l.amount as i128).sum();
        let total_credit: i128 = cmd.lines.iter().filter(|l| !l.is_debit).map(|l| l.amount as i128).sum();

        events.push(JournalEntryEvent::Finalized(JournalEntryFinalized {
            tenant_id: cmd.tenant_id,
            entry_id: cmd.entry_id,
            total_debit,
            total_credit,
            line_count: cmd.lines.len() as u32,
            chunk_count: total_chunks,
            final_status: JournalEntryStatus::Incomplete,
            entry_number: None,
            occurred_at: cmd.occurred_at,
        }));

        events
    }

    fn handle_update(
        &self,
        cmd: &UpdateJournalEntry,
    ) -> Result<Vec<JournalEntryEvent>, DomainError> {
        self.ensure_editable()?;
        if cmd.changes.is_empty() && cmd.lines.is_none() {
            return Ok(Vec::new());
        }

        Ok(vec![JournalEntryEvent::Updated(JournalEntryUpdated {
            tenant_id: cmd.tenant_id,
            entry_id: cmd.entry_id,
            changes: cmd.changes.clone(),
            lines: cmd.lines.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_save_complete(
        &self,
        cmd: &SaveJournalEntryComplete,
    ) -> Result<Vec<JournalEntryEvent>, DomainError> {
        self.ensure_editable()?;
        if !self.is_balanced() {
            return Err(DomainError::invariant("debits must equal credits"));
        }

        Ok(vec![JournalEntryEvent::SavedComplete(
            JournalEntrySavedComplete {
                tenant_id: cmd.tenant_id,
                entry_id: cmd.entry_id,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_post(&self, cmd: &PostJournalEntry) -> Result<Vec<JournalEntryEvent>, DomainError> {
        if !self.created || self.deleted {
            return Err(DomainError::not_found());
        }
        if self.status != JournalEntryStatus::Draft {
            return Err(DomainError::invariant(
                "only a complete draft entry can be posted",
            ));
        }
        if !self.is_balanced() {
            return Err(DomainError::invariant("debits must equal credits"));
        }

        Ok(vec![JournalEntryEvent::Posted(JournalEntryPosted {
            tenant_id: cmd.tenant_id,
            entry_id: cmd.entry_id,
            entry_number: cmd.entry_number,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reverse(
        &self,
        cmd: &ReverseJournalEntry,
    ) -> Result<Vec<JournalEntryEvent>, DomainError> {
        if !self.created || self.deleted {
            return Err(DomainError::not_found());
        }
        if self.status != JournalEntryStatus::Posted {
            return Err(DomainError::invariant("only a posted entry can be reversed"));
        }

        Ok(vec![JournalEntryEvent::Reversed(JournalEntryReversed {
            tenant_id: cmd.tenant_id,
            entry_id: cmd.entry_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_delete(
        &self,
        cmd: &DeleteJournalEntry,
    ) -> Result<Vec<JournalEntryEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.deleted {
            return Ok(Vec::new());
        }
        if self.status == JournalEntryStatus::Posted || self.status == JournalEntryStatus::Reversed
        {
            return Err(DomainError::invariant(
                "posted or reversed entries cannot be deleted",
            ));
        }

        Ok(vec![JournalEntryEvent::Deleted(JournalEntryDeleted {
            tenant_id: cmd.tenant_id,
            entry_id: cmd.entry_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_set_line_analysis(
        &self,
        cmd: &SetJournalLineAnalysis,
    ) -> Result<Vec<JournalEntryEvent>, DomainError> {
        self.ensure_editable()?;
        if !self.lines.iter().any(|l| l.line_no == cmd.line_no) {
            return Err(DomainError::validation(format!(
                "no line with line_no {}",
                cmd.line_no
            )));
        }

        Ok(vec![JournalEntryEvent::LineAnalysisSet(
            JournalLineAnalysisSet {
                tenant_id: cmd.tenant_id,
                entry_id: cmd.entry_id,
                line_no: cmd.line_no,
                analysis_tags: cmd.analysis_tags.clone(),
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn ensure_editable(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.deleted {
            return Err(DomainError::invariant("cannot edit a deleted entry"));
        }
        if self.status == JournalEntryStatus::Posted || self.status == JournalEntryStatus::Reversed
        {
            return Err(DomainError::invariant(
                "posted or reversed entries cannot be edited",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tenant() -> TenantId {
        TenantId::new()
    }

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    fn balanced_lines() -> Vec<JournalLine> {
        vec![
            JournalLine {
                line_no: 1,
                account_public_id: AggregateId::new(),
                amount: 100,
                is_debit: true,
                memo: String::new(),
                analysis_tags: BTreeMap::new(),
            },
            JournalLine {
                line_no: 2,
                account_public_id: AggregateId::new(),
                amount: 100,
                is_debit: false,
                memo: String::new(),
                analysis_tags: BTreeMap::new(),
            },
        ]
    }

    fn apply_all(entry: &mut JournalEntry, events: Vec<JournalEntryEvent>) {
        for e in &events {
            entry.apply(e);
        }
    }

    #[test]
    fn full_lifecycle_create_complete_post_reverse() {
        let tenant_id = tenant();
        let entry_id = AggregateId::new();
        let mut entry = JournalEntry::empty(entry_id);

        let events = entry
            .handle(&JournalEntryCommand::Create(CreateJournalEntry {
                tenant_id,
                entry_id,
                date: NaiveDate::from_ymd_opt(2026, 1, 15).unwrap(),
                memo: "Opening balance".to_string(),
                memo_ar: String::new(),
                kind: JournalEntryKind::Normal,
                currency: "USD".to_string(),
                exchange_rate: "1".to_string(),
                lines: balanced_lines(),
                reverses_entry: None,
                occurred_at: now(),
            }))
            .unwrap();
        apply_all(&mut entry, events);
        assert_eq!(entry.status, JournalEntryStatus::Incomplete);

        let events = entry
            .handle(&JournalEntryCommand::SaveComplete(
                SaveJournalEntryComplete {
                    tenant_id,
                    entry_id,
                    occurred_at: now(),
                },
            ))
            .unwrap();
        apply_all(&mut entry, events);
        assert_eq!(entry.status, JournalEntryStatus::Draft);

        let events = entry
            .handle(&JournalEntryCommand::Post(PostJournalEntry {
                tenant_id,
                entry_id,
                entry_number: 42,
                occurred_at: now(),
            }))
            .unwrap();
        apply_all(&mut entry, events);
        assert_eq!(entry.status, JournalEntryStatus::Posted);
        assert_eq!(entry.entry_number, Some(42));

        let events = entry
            .handle(&JournalEntryCommand::Reverse(ReverseJournalEntry {
                tenant_id,
                entry_id,
                occurred_at: now(),
            }))
            .unwrap();
        apply_all(&mut entry, events);
        assert_eq!(entry.status, JournalEntryStatus::Reversed);
        assert!(entry.reversed);
    }

    #[test]
    fn unbalanced_entry_cannot_be_saved_complete() {
        let tenant_id = tenant();
        let entry_id = AggregateId::new();
        let mut entry = JournalEntry::empty(entry_id);

        let mut lines = balanced_lines();
        lines[1].amount = 50;

        let events = entry
            .handle(&JournalEntryCommand::Create(CreateJournalEntry {
                tenant_id,
                entry_id,
                date: NaiveDate::from_ymd_opt(2026, 1, 15).unwrap(),
                memo: String::new(),
                memo_ar: String::new(),
                kind: JournalEntryKind::Normal,
                currency: "USD".to_string(),
                exchange_rate: "1".to_string(),
                lines,
                reverses_entry: None,
                occurred_at: now(),
            }))
            .unwrap();
        apply_all(&mut entry, events);

        let err = entry
            .handle(&JournalEntryCommand::SaveComplete(
                SaveJournalEntryComplete {
                    tenant_id,
                    entry_id,
                    occurred_at: now(),
                },
            ))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn posted_entry_cannot_be_edited_or_deleted() {
        let tenant_id = tenant();
        let entry_id = AggregateId::new();
        let mut entry = JournalEntry::empty(entry_id);

        let events = entry
            .handle(&JournalEntryCommand::Create(CreateJournalEntry {
                tenant_id,
                entry_id,
                date: NaiveDate::from_ymd_opt(2026, 1, 15).unwrap(),
                memo: String::new(),
                memo_ar: String::new(),
                kind: JournalEntryKind::Normal,
                currency: "USD".to_string(),
                exchange_rate: "1".to_string(),
                lines: balanced_lines(),
                reverses_entry: None,
                occurred_at: now(),
            }))
            .unwrap();
        apply_all(&mut entry, events);
        let events = entry
            .handle(&JournalEntryCommand::SaveComplete(
                SaveJournalEntryComplete {
                    tenant_id,
                    entry_id,
                    occurred_at: now(),
                },
            ))
            .unwrap();
        apply_all(&mut entry, events);
        let events = entry
            .handle(&JournalEntryCommand::Post(PostJournalEntry {
                tenant_id,
                entry_id,
                entry_number: 1,
                occurred_at: now(),
            }))
            .unwrap();
        apply_all(&mut entry, events);

        let err = entry
            .handle(&JournalEntryCommand::Delete(DeleteJournalEntry {
                tenant_id,
                entry_id,
                occurred_at: now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    fn many_balanced_lines(n: usize) -> Vec<JournalLine> {
        (0..n)
            .map(|i| JournalLine {
                line_no: i as u32,
                account_public_id: AggregateId::new(),
                amount: 10,
                is_debit: i % 2 == 0,
                memo: String::new(),
                analysis_tags: BTreeMap::new(),
            })
            .collect()
    }

    #[test]
    fn over_threshold_create_emits_header_chunks_and_finalized() {
        let tenant_id = tenant();
        let entry_id = AggregateId::new();
        let mut entry = JournalEntry::empty(entry_id);
        let line_count = MAX_LINES_PER_CHUNK * 2 + 10;

        let events = entry
            .handle(&JournalEntryCommand::Create(CreateJournalEntry {
                tenant_id,
                entry_id,
                date: NaiveDate::from_ymd_opt(2026, 1, 15).unwrap(),
                memo: "Bulk import".to_string(),
                memo_ar: String::new(),
                kind: JournalEntryKind::Normal,
                currency: "USD".to_string(),
                exchange_rate: "1".to_string(),
                lines: many_balanced_lines(line_count),
                reverses_entry: None,
                occurred_at: now(),
            }))
            .unwrap();

        assert!(matches!(events[0], JournalEntryEvent::ChunkedCreated(_)));
        assert_eq!(events.len(), 3 + 2);
        assert!(matches!(events.last().unwrap(), JournalEntryEvent::Finalized(_)));
        for chunk_event in &events[1..events.len() - 1] {
            assert!(matches!(chunk_event, JournalEntryEvent::LinesChunkAdded(_)));
        }

        apply_all(&mut entry, events);
        assert_eq!(entry.lines.len(), line_count);
        assert_eq!(entry.status, JournalEntryStatus::Incomplete);
    }

    #[test]
    fn under_threshold_create_emits_single_event() {
        let tenant_id = tenant();
        let entry_id = AggregateId::new();
        let entry = JournalEntry::empty(entry_id);

        let events = entry
            .handle(&JournalEntryCommand::Create(CreateJournalEntry {
                tenant_id,
                entry_id,
                date: NaiveDate::from_ymd_opt(2026, 1, 15).unwrap(),
                memo: String::new(),
                memo_ar: String::new(),
                kind: JournalEntryKind::Normal,
                currency: "USD".to_string(),
                exchange_rate: "1".to_string(),
                lines: balanced_lines(),
                reverses_entry: None,
                occurred_at: now(),
            }))
            .unwrap();

        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], JournalEntryEvent::Created(_)));
    }
}
