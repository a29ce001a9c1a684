//! Builds the concrete store types each subcommand drives, from a
//! `--database-url`. Connections are lazy: a bad URL fails on first query,
//! not at process start.

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use ledger_infra::event_store::PostgresEventStore;
use ledger_infra::migration::PostgresDirectoryStore;
use ledger_infra::payload::PostgresPayloadStore;
use ledger_infra::projections::PostgresBookmarkStore;

pub(crate) fn pool(database_url: &str) -> Result<PgPool> {
    Ok(PgPoolOptions::new().max_connections(5).connect_lazy(database_url)?)
}

pub(crate) fn event_store(database_url: &str) -> Result<PostgresEventStore> {
    Ok(PostgresEventStore::new(pool(database_url)?))
}

pub(crate) fn payload_store(database_url: &str) -> Result<PostgresPayloadStore> {
    Ok(PostgresPayloadStore::new(pool(database_url)?))
}

pub(crate) fn bookmark_store(database_url: &str) -> Result<PostgresBookmarkStore> {
    Ok(PostgresBookmarkStore::new(pool(database_url)?))
}

pub(crate) fn directory_store(database_url: &str) -> Result<PostgresDirectoryStore> {
    Ok(PostgresDirectoryStore::new(pool(database_url)?))
}
