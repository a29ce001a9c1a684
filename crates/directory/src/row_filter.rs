use ledger_core::TenantId;

use crate::context::TenantContext;

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum RowFilterError {
    /// A row's tenant id does not match the bound context, on a shared
    /// handle (where multiple tenants' rows coexist and a mismatch is a
    /// tenant-isolation breach, not a business error).
    #[error("row tenant {row_tenant} does not match bound context tenant {context_tenant}")]
    TenantMismatch {
        row_tenant: TenantId,
        context_tenant: TenantId,
    },
}

/// Row-level tenant isolation guard for shared (row-filtered) database
/// handles. On a dedicated handle there is only ever one tenant's data
/// present, so the guard is a no-op; on a shared handle it asserts the
/// row's tenant id matches the bound context before letting the
/// query/write proceed.
#[derive(Debug, Clone, Copy)]
pub struct RowFilterGuard<'a> {
    context: &'a TenantContext,
}

impl<'a> RowFilterGuard<'a> {
    pub fn new(context: &'a TenantContext) -> Self {
        Self { context }
    }

    /// Check a single row's tenant id against the bound context before
    /// reading or writing it.
    pub fn check(&self, row_tenant: TenantId) -> Result<(), RowFilterError> {
        if self.context.is_dedicated() {
            return Ok(());
        }
        if row_tenant != self.context.tenant_id() {
            return Err(RowFilterError::TenantMismatch {
                row_tenant,
                context_tenant: self.context.tenant_id(),
            });
        }
        Ok(())
    }

    /// Run `f` only if `check` passes.
    pub fn guard<T>(
        &self,
        row_tenant: TenantId,
        f: impl FnOnce() -> T,
    ) -> Result<T, RowFilterError> {
        self.check(row_tenant)?;
        Ok(f())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_handle_rejects_mismatched_tenant_row() {
        let owner = TenantId::new();
        let other = TenantId::new();
        let ctx = TenantContext::new(owner, "default", true);
        let guard = RowFilterGuard::new(&ctx);

        assert!(guard.check(owner).is_ok());
        assert_eq!(
            guard.check(other).unwrap_err(),
            RowFilterError::TenantMismatch {
                row_tenant: other,
                context_tenant: owner,
            }
        );
    }

    #[test]
    fn dedicated_handle_is_a_no_op() {
        let owner = TenantId::new();
        let other = TenantId::new();
        let ctx = TenantContext::new(owner, "tenant_acme", false);
        let guard = RowFilterGuard::new(&ctx);

        assert!(guard.check(other).is_ok());
    }
}
