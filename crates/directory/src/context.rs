use ledger_core::TenantId;

/// Ambient per-request tenant state, threaded explicitly through every call
/// that needs it.
///
/// The original implementation kept this in a `contextvars.ContextVar` so
/// deeply nested code could read "the current tenant" without a parameter.
/// Here it is an explicit value: constructed once at the request edge and
/// passed down, so a function's signature tells you whether it is
/// tenant-aware without having to read its body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TenantContext {
    tenant_id: TenantId,
    handle: &'static str,
    is_shared: bool,
}

impl TenantContext {
    pub fn new(tenant_id: TenantId, handle: &'static str, is_shared: bool) -> Self {
        Self {
            tenant_id,
            handle,
            is_shared,
        }
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn handle(&self) -> &'static str {
        self.handle
    }

    pub fn is_shared(&self) -> bool {
        self.is_shared
    }

    pub fn is_dedicated(&self) -> bool {
        !self.is_shared
    }
}

/// Construct the context used by system-initiated operations (migrations,
/// background jobs) that still act on behalf of a specific tenant but
/// bypass the request-edge directory lookup. Always binds to the default
/// handle in shared mode; call sites that need a dedicated handle must
/// build a `TenantContext` from a resolved `TenantDirectoryEntry` instead.
pub fn system_tenant_context(tenant_id: TenantId) -> TenantContext {
    TenantContext::new(tenant_id, "default", true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_context_is_shared_default() {
        let ctx = system_tenant_context(TenantId::new());
        assert_eq!(ctx.handle(), "default");
        assert!(ctx.is_shared());
        assert!(!ctx.is_dedicated());
    }
}
