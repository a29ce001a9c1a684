//! Tenant directory, ambient tenant context, database routing, and the
//! write barrier that keeps commands and projections from writing over
//! each other's read models.

mod company;
mod context;
mod router;
mod row_filter;
mod tenant_directory;
mod write_barrier;

pub use company::{
    Company, CompanyCommand, CompanyDeactivated, CompanyEvent, CompanyRegistered,
    DeactivateCompany, RegisterCompany,
};
pub use context::{system_tenant_context, TenantContext};
pub use router::{DatabaseRouter, EntityClass, RoutingError};
pub use row_filter::{RowFilterError, RowFilterGuard};
pub use tenant_directory::{
    resolve_db_handle, resolve_tenant_info, IsolationMode, MigrationLog, MigrationResult,
    TenantDirectoryEntry, TenantResolution, TenantStatus,
};
pub use write_barrier::{WriteBarrierError, WriteContext, WritableEntity};
