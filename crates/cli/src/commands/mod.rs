pub mod export_tenant_events;
pub mod import_tenant_events;
pub mod migrate_tenant;
pub mod rebuild_projection;
pub mod run_projections;

mod stores;

use anyhow::{bail, Context, Result};
use ledger_core::TenantId;

/// Parses a `--tenant` value into a [`TenantId`]. The directory's `slug`
/// column is a display label only; this CLI resolves tenants by their UUID
/// until a slug-lookup service is wired in.
pub(crate) fn parse_tenant(raw: &str) -> Result<TenantId> {
    raw.parse::<uuid::Uuid>()
        .map(TenantId::from_uuid)
        .with_context(|| format!("'{raw}' is not a tenant UUID (slug lookup is not yet wired)"))
}

pub(crate) fn require_database_url(database_url: Option<&str>) -> Result<String> {
    match database_url {
        Some(url) => Ok(url.to_string()),
        None => bail!("this command needs a real store; pass --database-url or set DATABASE_URL"),
    }
}
