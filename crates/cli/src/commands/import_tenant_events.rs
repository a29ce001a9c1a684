use anyhow::Result;
use tracing::info;

use ledger_infra::event_store::{EventStore, InMemoryEventStore};
use ledger_infra::migration::{ExportFile, InMemoryDirectoryStore, MigrationOrchestrator};

use super::stores;

pub fn run(
    database_url: Option<&str>,
    handle: &str,
    input: &str,
    skip_existing: bool,
    dry_run: bool,
) -> Result<()> {
    let database_url = super::require_database_url(database_url)?;
    let raw = std::fs::read_to_string(input)?;
    let export: ExportFile = serde_json::from_str(&raw)?;

    if dry_run {
        let target = stores::event_store(&database_url)?;
        let mut would_import = 0u64;
        let mut would_skip = 0u64;
        for record in &export.events {
            let exists = skip_existing
                && target
                    .find_by_idempotency_key(export.tenant.id, &record.idempotency_key)?
                    .is_some();
            if exists {
                would_skip += 1;
            } else {
                would_import += 1;
            }
        }
        info!(handle, would_import, would_skip, "dry run: would import");
        return Ok(());
    }

    let target = stores::event_store(&database_url)?;
    let payloads = stores::payload_store(&database_url)?;
    let orchestrator = MigrationOrchestrator::new(
        InMemoryEventStore::new(),
        target,
        payloads,
        InMemoryDirectoryStore::new(),
    );

    let report = orchestrator.import(&export, skip_existing)?;
    info!(
        handle,
        imported = report.imported_count,
        skipped = report.skipped_count,
        "import complete"
    );
    Ok(())
}
