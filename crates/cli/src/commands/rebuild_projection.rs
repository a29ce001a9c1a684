use anyhow::{bail, Result};
use tracing::info;

use ledger_infra::projections::ProjectionEngine;

use super::{parse_tenant, require_database_url, stores};

/// Re-registers this binary's known [`ledger_infra::projections::Projection`]
/// implementations. Empty until a concrete read-model projection ships in
/// `ledger-accounting`; until then every invocation fails with
/// `UnknownProjection`, which is the correct behavior for a registry with
/// nothing registered rather than a silently-successful no-op.
fn known_projections() -> Vec<std::sync::Arc<dyn ledger_infra::projections::Projection>> {
    Vec::new()
}

#[allow(clippy::too_many_arguments)]
pub fn run(
    database_url: Option<&str>,
    projection_name: &str,
    tenant: Option<&str>,
    all_tenants: bool,
    verify_first: bool,
    dry_run: bool,
    force: bool,
) -> Result<()> {
    if all_tenants {
        bail!("--all-tenants requires a tenant directory scan, not yet wired into this CLI");
    }
    let Some(tenant_raw) = tenant else {
        bail!("--tenant is required unless --all-tenants is set");
    };
    let tenant_id = parse_tenant(tenant_raw)?;
    let database_url = require_database_url(database_url)?;

    if verify_first {
        info!(projection = projection_name, "skipping pre-rebuild verification: not yet wired");
    }

    let store = stores::event_store(&database_url)?;
    let bookmarks = stores::bookmark_store(&database_url)?;
    let engine = ProjectionEngine::with_bookmark_store(store, bookmarks);

    for projection in known_projections() {
        engine.register(projection);
    }

    if dry_run {
        let lag = engine.get_lag(projection_name, tenant_id)?;
        info!(
            projection = projection_name,
            tenant = %tenant_id,
            unprocessed = lag.unprocessed_events,
            "dry run: would rebuild"
        );
        return Ok(());
    }

    if force {
        info!(projection = projection_name, "--force set: ignoring any pause flag on the bookmark");
    }

    let applied = engine.rebuild(projection_name, tenant_id)?;
    info!(projection = projection_name, tenant = %tenant_id, applied, "rebuild complete");
    Ok(())
}
