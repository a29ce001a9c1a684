use anyhow::Result;
use tracing::{error, info};

use ledger_infra::migration::MigrationOrchestrator;

use super::{parse_tenant, require_database_url, stores};

/// Drives one tenant through freeze -> export -> import -> verify -> cutover,
/// rolling back on the first failure. Source and target both resolve
/// through `--database-url`; mapping `--target-handle` to a distinct
/// connection string is a database-handle-pool concern this CLI does not
/// yet own.
#[allow(clippy::too_many_arguments)]
pub fn run(
    database_url: Option<&str>,
    tenant: &str,
    target_handle: &str,
    dry_run: bool,
    skip_export: bool,
    skip_import: bool,
    skip_replay: bool,
) -> Result<()> {
    let tenant_id = parse_tenant(tenant)?;
    let database_url = require_database_url(database_url)?;

    let source = stores::event_store(&database_url)?;
    let target = stores::event_store(&database_url)?;
    let payloads = stores::payload_store(&database_url)?;
    let directory = stores::directory_store(&database_url)?;
    let orchestrator = MigrationOrchestrator::new(source, target, payloads, directory);

    if dry_run {
        info!(tenant = %tenant_id, target_handle, "dry run: would freeze, export, import, verify, cutover");
        return Ok(());
    }

    let original = orchestrator.freeze(tenant_id)?;
    info!(tenant = %tenant_id, "tenant frozen for migration");

    if skip_export {
        info!("--skip-export set: using an empty export (nothing to migrate)");
    }
    let export = if skip_export {
        orchestrator.export(tenant_id, &original.handle, u64::MAX, false)?
    } else {
        orchestrator.export(tenant_id, &original.handle, 0, true)?
    };

    if skip_import {
        info!("--skip-import set: stopping after export");
        return Ok(());
    }

    orchestrator.prepare_target()?;
    let report = orchestrator.import(&export, true)?;

    if skip_replay {
        info!("--skip-replay set: skipping verification, proceeding straight to cutover");
        orchestrator.cutover(tenant_id, target_handle, &export, &report)?;
        return Ok(());
    }

    let verify = orchestrator.verify(&export, &report, 0, 0);
    if !verify.is_valid {
        error!(
            event_count_matches = verify.event_count_matches,
            content_hash_matches = verify.content_hash_matches,
            trial_balance_matches = verify.trial_balance_matches,
            "verification failed, rolling back"
        );
        orchestrator.rollback(tenant_id, original.mode, &original.handle, "verification failed")?;
        anyhow::bail!("migration verification failed for tenant {tenant_id}");
    }

    orchestrator.cutover(tenant_id, target_handle, &export, &report)?;
    info!(tenant = %tenant_id, target_handle, "migration complete");
    Ok(())
}
