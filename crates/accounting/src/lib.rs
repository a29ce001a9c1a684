//! Accounting domain (chart of accounts, journal entries, fiscal periods,
//! analysis dimensions), event-sourced.
//!
//! Pure domain logic only: no IO, no HTTP, no persistence concerns.

pub mod account;
pub mod analysis_dimension;
pub mod fiscal_period;
pub mod import_batch;
pub mod journal_entry;

pub use account::{
    Account, AccountCommand, AccountCreated, AccountDeleted, AccountEvent, AccountKind,
    AccountStatus, AccountUpdated, CreateAccount, DeleteAccount, FieldChange, UpdateAccount,
};
pub use analysis_dimension::{
    AccountAnalysisDefaultRemoved, AccountAnalysisDefaultSet, AnalysisDimension,
    AnalysisDimensionCommand, AnalysisDimensionCreated, AnalysisDimensionDeleted,
    AnalysisDimensionEvent, AnalysisDimensionUpdated, AnalysisDimensionValue,
    AnalysisDimensionValueCommand, AnalysisDimensionValueCreated, AnalysisDimensionValueDeleted,
    AnalysisDimensionValueEvent, AnalysisDimensionValueUpdated, CreateAnalysisDimension,
    CreateAnalysisDimensionValue, DeleteAnalysisDimension, DeleteAnalysisDimensionValue,
    UpdateAnalysisDimension, UpdateAnalysisDimensionValue,
};
pub use fiscal_period::{
    ClosePeriod, FiscalPeriod, FiscalPeriodClosed, FiscalPeriodCommand, FiscalPeriodEvent,
    FiscalPeriodOpened, FiscalPeriodRangeSet, OpenPeriod, SetPeriodRange,
    fiscal_period_aggregate_id,
};
pub use import_batch::{
    CompleteImportBatch, CreateImportBatch, CrosswalkKey, CrosswalkTable, FailImportBatch,
    IdentityCrosswalkEntry, ImportBatch, ImportBatchCommand, ImportBatchCompleted,
    ImportBatchCreated, ImportBatchEvent, ImportBatchFailed, ImportBatchStatus,
    ImportRecordStaged, RecordOutcome, StageImportRecord,
};
pub use journal_entry::{
    CreateJournalEntry, DeleteJournalEntry, JournalEntry, JournalEntryChunkedCreated,
    JournalEntryCommand, JournalEntryCreated, JournalEntryDeleted, JournalEntryEvent,
    JournalEntryFinalized, JournalEntryKind, JournalEntryPosted, JournalEntryReversed,
    JournalEntrySavedComplete, JournalEntryStatus, JournalEntryUpdated, JournalLine,
    JournalLineAnalysisSet, JournalLinesChunkAdded, PostJournalEntry, ReverseJournalEntry,
    SaveJournalEntryComplete, SetJournalLineAnalysis, UpdateJournalEntry, MAX_LINES_PER_CHUNK,
};
