use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ledger_core::TenantId;

/// How a tenant's data is isolated at the storage layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationMode {
    /// Shares a database handle with other tenants; row-filtering applies.
    Shared,
    /// Has its own database handle.
    Dedicated,
}

/// Lifecycle status of a tenant directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantStatus {
    Active,
    /// A migration between handles is in flight; writes are refused.
    Migrating,
    ReadOnly,
    Suspended,
}

/// Directory record for one tenant: which handle it lives on, and whether
/// it is currently writable.
///
/// A tenant with no directory entry at all is treated as shared + active,
/// for backward compatibility with tenants onboarded before the directory
/// existed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantDirectoryEntry {
    pub tenant_id: TenantId,
    pub mode: IsolationMode,
    /// Logical handle name ("default" for the shared database).
    pub handle: String,
    pub status: TenantStatus,
    pub migrated_at: Option<DateTime<Utc>>,
    pub migration_event_sequence: Option<u64>,
    pub migration_export_hash: Option<String>,
    pub migration_import_hash: Option<String>,
    pub migration_import_count: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub notes: Option<String>,
}

impl TenantDirectoryEntry {
    pub fn new_shared(tenant_id: TenantId, now: DateTime<Utc>) -> Self {
        Self {
            tenant_id,
            mode: IsolationMode::Shared,
            handle: "default".to_string(),
            status: TenantStatus::Active,
            migrated_at: None,
            migration_event_sequence: None,
            migration_export_hash: None,
            migration_import_hash: None,
            migration_import_count: None,
            created_at: now,
            updated_at: now,
            notes: None,
        }
    }

    pub fn is_shared(&self) -> bool {
        matches!(self.mode, IsolationMode::Shared)
    }

    pub fn is_dedicated(&self) -> bool {
        matches!(self.mode, IsolationMode::Dedicated)
    }

    /// A tenant may be written to only while `Active`. `Migrating` and
    /// `Suspended` refuse writes; `ReadOnly` is a deliberate post-migration
    /// hold that also refuses writes.
    pub fn is_writable(&self) -> bool {
        matches!(self.status, TenantStatus::Active)
    }
}

/// Resolution of "what handle and mode does this tenant use right now",
/// with the no-entry-found default baked in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantResolution {
    pub handle: String,
    pub is_shared: bool,
    pub status: TenantStatus,
    pub is_writable: bool,
}

impl TenantResolution {
    fn default_shared_active() -> Self {
        Self {
            handle: "default".to_string(),
            is_shared: true,
            status: TenantStatus::Active,
            is_writable: true,
        }
    }
}

/// Resolve a tenant's effective handle the way `TenantDirectory.get_db_alias_for_company`
/// does: no entry, or an entry mid-migration/suspended, falls back to the
/// shared default handle rather than the entry's (stale) dedicated handle.
pub fn resolve_db_handle(entry: Option<&TenantDirectoryEntry>) -> String {
    match entry {
        None => "default".to_string(),
        Some(e) => match e.status {
            TenantStatus::Active | TenantStatus::ReadOnly => e.handle.clone(),
            TenantStatus::Migrating | TenantStatus::Suspended => "default".to_string(),
        },
    }
}

/// Resolve the full tenant info the way `TenantDirectory.get_tenant_info` does.
pub fn resolve_tenant_info(entry: Option<&TenantDirectoryEntry>) -> TenantResolution {
    match entry {
        None => TenantResolution::default_shared_active(),
        Some(e) => TenantResolution {
            handle: resolve_db_handle(Some(e)),
            is_shared: e.is_shared(),
            status: e.status,
            is_writable: e.is_writable(),
        },
    }
}

/// Outcome of a tenant migration between handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationResult {
    Success,
    Failed,
    RolledBack,
    InProgress,
}

/// Audit record of a single tenant migration attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationLog {
    pub tenant_id: TenantId,
    pub from_mode: IsolationMode,
    pub to_mode: IsolationMode,
    pub from_handle: String,
    pub to_handle: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub export_event_count: Option<u64>,
    pub import_event_count: Option<u64>,
    pub export_hash: Option<String>,
    pub import_hash: Option<String>,
    pub hashes_match: Option<bool>,
    pub result: MigrationResult,
    pub error_message: Option<String>,
    pub initiated_by: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn no_entry_resolves_to_shared_active_default() {
        let info = resolve_tenant_info(None);
        assert_eq!(info.handle, "default");
        assert!(info.is_shared);
        assert!(info.is_writable);
    }

    #[test]
    fn migrating_dedicated_tenant_falls_back_to_default_handle() {
        let mut entry = TenantDirectoryEntry::new_shared(TenantId::new(), now());
        entry.mode = IsolationMode::Dedicated;
        entry.handle = "tenant_acme".to_string();
        entry.status = TenantStatus::Migrating;

        let info = resolve_tenant_info(Some(&entry));
        assert_eq!(info.handle, "default");
        assert!(!info.is_writable);
    }

    #[test]
    fn active_dedicated_tenant_resolves_to_its_own_handle() {
        let mut entry = TenantDirectoryEntry::new_shared(TenantId::new(), now());
        entry.mode = IsolationMode::Dedicated;
        entry.handle = "tenant_acme".to_string();
        entry.status = TenantStatus::Active;

        let info = resolve_tenant_info(Some(&entry));
        assert_eq!(info.handle, "tenant_acme");
        assert!(!info.is_shared);
        assert!(info.is_writable);
    }

    #[test]
    fn read_only_tenant_keeps_its_handle_but_refuses_writes() {
        let mut entry = TenantDirectoryEntry::new_shared(TenantId::new(), now());
        entry.mode = IsolationMode::Dedicated;
        entry.handle = "tenant_acme".to_string();
        entry.status = TenantStatus::ReadOnly;

        let info = resolve_tenant_info(Some(&entry));
        assert_eq!(info.handle, "tenant_acme");
        assert!(!info.is_writable);
    }

    #[test]
    fn suspended_tenant_falls_back_to_default_and_refuses_writes() {
        let mut entry = TenantDirectoryEntry::new_shared(TenantId::new(), now());
        entry.status = TenantStatus::Suspended;

        let info = resolve_tenant_info(Some(&entry));
        assert_eq!(info.handle, "default");
        assert!(!info.is_writable);
    }
}
