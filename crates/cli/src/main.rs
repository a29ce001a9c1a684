//! Operator's disaster-recovery toolkit for the ledger: rebuild/run
//! projections, export/import a tenant's event stream, and drive a tenant
//! migration between database handles.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "ledger-cli")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Postgres connection string. Falls back to `DATABASE_URL`; when
    /// neither is set, commands run against an ephemeral in-process store
    /// (useful for `--dry-run` rehearsals, useless for real recovery).
    #[arg(long, global = true, env = "DATABASE_URL")]
    database_url: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a projection from zero for one or all tenants.
    RebuildProjection {
        #[arg(long)]
        projection: String,
        #[arg(long)]
        tenant: Option<String>,
        #[arg(long)]
        all_tenants: bool,
        #[arg(long)]
        verify_first: bool,
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        force: bool,
    },

    /// Process pending events for registered projections.
    RunProjections {
        #[arg(long)]
        projection: Option<String>,
        #[arg(long)]
        tenant: Option<String>,
        #[arg(long)]
        daemon: bool,
        #[arg(long, default_value_t = 5)]
        interval: u64,
        #[arg(long)]
        verify_integrity: bool,
        #[arg(long)]
        strict: bool,
        #[arg(long)]
        diagnostics: Option<String>,
    },

    /// Stream a tenant's events to a canonical export file.
    ExportTenantEvents {
        #[arg(long)]
        tenant: String,
        #[arg(long)]
        out: String,
        #[arg(long)]
        include_payloads: bool,
        #[arg(long, default_value_t = 0)]
        after_sequence: u64,
    },

    /// Re-insert an export file's events into a target handle.
    ImportTenantEvents {
        #[arg(long)]
        handle: String,
        #[arg(long = "in")]
        input: String,
        #[arg(long)]
        skip_existing: bool,
        #[arg(long)]
        dry_run: bool,
    },

    /// Run the full freeze/export/import/verify/cutover pipeline for one tenant.
    MigrateTenant {
        #[arg(long)]
        tenant: String,
        #[arg(long)]
        target_handle: String,
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        skip_export: bool,
        #[arg(long)]
        skip_import: bool,
        #[arg(long)]
        skip_replay: bool,
    },
}

fn main() -> Result<()> {
    ledger_observability::init();

    let cli = Cli::parse();
    let database_url = cli.database_url.clone();

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        tokio::task::spawn_blocking(move || dispatch(cli.command, database_url)).await?
    })
}

/// Runs the chosen subcommand's (synchronous, sqlx-bridging) logic on a
/// blocking-pool thread, since every store call in `ledger-infra` assumes a
/// sync caller bridging into an ambient tokio runtime via `block_on` —
/// calling that directly from the async task driving `main` would panic.
fn dispatch(command: Commands, database_url: Option<String>) -> Result<()> {
    match command {
        Commands::RebuildProjection {
            projection,
            tenant,
            all_tenants,
            verify_first,
            dry_run,
            force,
        } => commands::rebuild_projection::run(
            database_url.as_deref(),
            &projection,
            tenant.as_deref(),
            all_tenants,
            verify_first,
            dry_run,
            force,
        ),
        Commands::RunProjections {
            projection,
            tenant,
            daemon,
            interval,
            verify_integrity,
            strict,
            diagnostics,
        } => commands::run_projections::run(
            database_url.as_deref(),
            projection.as_deref(),
            tenant.as_deref(),
            daemon,
            interval,
            verify_integrity,
            strict,
            diagnostics.as_deref(),
        ),
        Commands::ExportTenantEvents { tenant, out, include_payloads, after_sequence } => {
            commands::export_tenant_events::run(
                database_url.as_deref(),
                &tenant,
                &out,
                include_payloads,
                after_sequence,
            )
        }
        Commands::ImportTenantEvents { handle, input, skip_existing, dry_run } => {
            commands::import_tenant_events::run(
                database_url.as_deref(),
                &handle,
                &input,
                skip_existing,
                dry_run,
            )
        }
        Commands::MigrateTenant {
            tenant,
            target_handle,
            dry_run,
            skip_export,
            skip_import,
            skip_replay,
        } => commands::migrate_tenant::run(
            database_url.as_deref(),
            &tenant,
            &target_handle,
            dry_run,
            skip_export,
            skip_import,
            skip_replay,
        ),
    }
}
