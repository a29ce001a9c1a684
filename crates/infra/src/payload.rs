//! External payload storage (LEPH: Large Event Payload Handling).
//!
//! Payloads above the inline threshold are stored content-addressed by
//! `SHA-256(canonical_json(payload))`. Two events with identical payloads
//! share one blob; the event row carries only the hash and a reference id.

use std::collections::HashMap;
use std::sync::RwLock;

use serde_json::Value as JsonValue;
use sqlx::{PgPool, Row};
use uuid::Uuid;

/// A stored external payload, content-addressed by `content_hash`.
#[derive(Debug, Clone, PartialEq)]
pub struct PayloadBlob {
    pub id: Uuid,
    pub content_hash: String,
    pub data: JsonValue,
}

pub trait PayloadStore: Send + Sync {
    /// Insert `data`, or return the existing blob if its hash already exists.
    /// Returns the blob id (new or pre-existing) in either case.
    fn store_payload(&self, data: &JsonValue) -> Uuid;

    fn get_payload(&self, id: Uuid) -> Option<PayloadBlob>;

    fn get_by_hash(&self, content_hash: &str) -> Option<PayloadBlob>;
}

/// In-memory payload store for tests and local tooling.
#[derive(Debug, Default)]
pub struct InMemoryPayloadStore {
    by_hash: RwLock<HashMap<String, Uuid>>,
    by_id: RwLock<HashMap<Uuid, PayloadBlob>>,
}

impl InMemoryPayloadStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PayloadStore for InMemoryPayloadStore {
    fn store_payload(&self, data: &JsonValue) -> Uuid {
        let content_hash = ledger_core::compute_payload_hash(data);

        if let Some(existing) = self.by_hash.read().ok().and_then(|m| m.get(&content_hash).copied()) {
            return existing;
        }

        let mut by_hash = match self.by_hash.write() {
            Ok(g) => g,
            Err(_) => return Uuid::now_v7(),
        };
        // Re-check under the write lock: another writer may have inserted
        // the same hash between our read and this acquisition.
        if let Some(existing) = by_hash.get(&content_hash) {
            return *existing;
        }

        let id = Uuid::now_v7();
        by_hash.insert(content_hash.clone(), id);
        if let Ok(mut by_id) = self.by_id.write() {
            by_id.insert(
                id,
                PayloadBlob {
                    id,
                    content_hash,
                    data: data.clone(),
                },
            );
        }
        id
    }

    fn get_payload(&self, id: Uuid) -> Option<PayloadBlob> {
        self.by_id.read().ok()?.get(&id).cloned()
    }

    fn get_by_hash(&self, content_hash: &str) -> Option<PayloadBlob> {
        let by_hash = self.by_hash.read().ok()?;
        let id = by_hash.get(content_hash)?;
        self.by_id.read().ok()?.get(id).cloned()
    }
}

/// Postgres-backed payload store, `ON CONFLICT (content_hash) DO NOTHING
/// RETURNING id` then re-query on conflict, matching the event store's
/// sync-over-async bridge (`tokio::runtime::Handle::try_current()` +
/// `block_on`).
pub struct PostgresPayloadStore {
    pool: PgPool,
}

impl PostgresPayloadStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl PayloadStore for PostgresPayloadStore {
    fn store_payload(&self, data: &JsonValue) -> Uuid {
        let content_hash = ledger_core::compute_payload_hash(data);
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return Uuid::now_v7();
        };

        let pool = self.pool.clone();
        let id = Uuid::now_v7();
        let data = data.clone();
        handle.block_on(async move {
            let inserted = sqlx::query(
                r#"
                INSERT INTO payload_blobs (id, content_hash, data)
                VALUES ($1, $2, $3)
                ON CONFLICT (content_hash) DO NOTHING
                RETURNING id
                "#,
            )
            .bind(id)
            .bind(&content_hash)
            .bind(&data)
            .fetch_optional(&pool)
            .await
            .ok()
            .flatten();

            if let Some(row) = inserted {
                return row.get::<Uuid, _>("id");
            }

            sqlx::query("SELECT id FROM payload_blobs WHERE content_hash = $1")
                .bind(&content_hash)
                .fetch_one(&pool)
                .await
                .map(|row| row.get::<Uuid, _>("id"))
                .unwrap_or(id)
        })
    }

    fn get_payload(&self, id: Uuid) -> Option<PayloadBlob> {
        let handle = tokio::runtime::Handle::try_current().ok()?;
        let pool = self.pool.clone();
        handle.block_on(async move {
            sqlx::query("SELECT id, content_hash, data FROM payload_blobs WHERE id = $1")
                .bind(id)
                .fetch_optional(&pool)
                .await
                .ok()
                .flatten()
                .map(|row| PayloadBlob {
                    id: row.get("id"),
                    content_hash: row.get("content_hash"),
                    data: row.get("data"),
                })
        })
    }

    fn get_by_hash(&self, content_hash: &str) -> Option<PayloadBlob> {
        let handle = tokio::runtime::Handle::try_current().ok()?;
        let pool = self.pool.clone();
        let content_hash = content_hash.to_string();
        handle.block_on(async move {
            sqlx::query("SELECT id, content_hash, data FROM payload_blobs WHERE content_hash = $1")
                .bind(&content_hash)
                .fetch_optional(&pool)
                .await
                .ok()
                .flatten()
                .map(|row| PayloadBlob {
                    id: row.get("id"),
                    content_hash: row.get("content_hash"),
                    data: row.get("data"),
                })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_payloads_dedup_to_the_same_blob() {
        let store = InMemoryPayloadStore::new();
        let payload = serde_json::json!({"a": 1, "b": 2});

        let id1 = store.store_payload(&payload);
        let id2 = store.store_payload(&payload);
        assert_eq!(id1, id2);
        assert_eq!(store.get_payload(id1).unwrap().data, payload);
    }

    #[test]
    fn distinct_payloads_get_distinct_blobs() {
        let store = InMemoryPayloadStore::new();
        let id1 = store.store_payload(&serde_json::json!({"a": 1}));
        let id2 = store.store_payload(&serde_json::json!({"a": 2}));
        assert_ne!(id1, id2);
    }
}
