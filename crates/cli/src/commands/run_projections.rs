use std::thread::sleep;
use std::time::Duration;

use anyhow::Result;
use tracing::{error, info, warn};

use ledger_infra::projections::ProjectionEngine;

use super::{parse_tenant, require_database_url, stores};

#[allow(clippy::too_many_arguments)]
pub fn run(
    database_url: Option<&str>,
    projection_name: Option<&str>,
    tenant: Option<&str>,
    daemon: bool,
    interval: u64,
    verify_integrity: bool,
    strict: bool,
    diagnostics: Option<&str>,
) -> Result<()> {
    let database_url = require_database_url(database_url)?;
    let tenant_id = tenant.map(parse_tenant).transpose()?;

    let store = stores::event_store(&database_url)?;
    let bookmarks = stores::bookmark_store(&database_url)?;
    let engine = ProjectionEngine::with_bookmark_store(store, bookmarks);

    if verify_integrity {
        info!("integrity verification pass: not yet wired into this CLI");
    }

    loop {
        match (projection_name, tenant_id) {
            (Some(name), Some(tid)) => {
                let n = engine.process_pending(name, tid, 500)?;
                if n > 0 {
                    info!(projection = name, tenant = %tid, processed = n, "batch processed");
                }
            }
            _ => {
                warn!(
                    "run-projections without --projection/--tenant has no registry to scan \
                     across tenants yet; pass both explicitly"
                );
                if strict {
                    anyhow::bail!("--strict: refusing to proceed without an explicit projection/tenant");
                }
            }
        }

        if let Some(path) = diagnostics {
            if let Err(e) = write_diagnostics(path) {
                error!(error = %e, "failed to write diagnostics file");
            }
        }

        if !daemon {
            break;
        }
        sleep(Duration::from_secs(interval));
    }

    Ok(())
}

fn write_diagnostics(path: &str) -> Result<()> {
    std::fs::write(path, serde_json::json!({"status": "ok"}).to_string())?;
    Ok(())
}
