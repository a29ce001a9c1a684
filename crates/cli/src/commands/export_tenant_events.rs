use anyhow::Result;
use tracing::info;

use ledger_infra::event_store::InMemoryEventStore;
use ledger_infra::migration::{InMemoryDirectoryStore, MigrationOrchestrator};

use super::{parse_tenant, require_database_url, stores};

pub fn run(
    database_url: Option<&str>,
    tenant: &str,
    out: &str,
    include_payloads: bool,
    after_sequence: u64,
) -> Result<()> {
    let tenant_id = parse_tenant(tenant)?;
    let database_url = require_database_url(database_url)?;

    let source = stores::event_store(&database_url)?;
    let payloads = stores::payload_store(&database_url)?;
    // export() only reads `source`/`payloads`; target/directory are unused
    // for this subcommand and stay in-memory.
    let orchestrator = MigrationOrchestrator::new(
        source,
        InMemoryEventStore::new(),
        payloads,
        InMemoryDirectoryStore::new(),
    );

    let export = orchestrator.export(tenant_id, "source", after_sequence, include_payloads)?;
    let file = std::fs::File::create(out)?;
    serde_json::to_writer_pretty(file, &export)?;

    info!(tenant = %tenant_id, events = export.event_count, out, "export complete");
    Ok(())
}
