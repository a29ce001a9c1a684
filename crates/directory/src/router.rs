use crate::context::TenantContext;

/// Classification of a persisted entity for database routing purposes.
///
/// `System` entities (users, companies, tenant directory entries, migration
/// logs, credential tokens) always live on the default handle, regardless of
/// any ambient tenant context. `Tenant` entities (events, payload blobs,
/// read models, projection bookmarks, applied-event ledgers, sequence
/// counters) route to whatever handle the current context names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityClass {
    System,
    Tenant,
}

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum RoutingError {
    /// A tenant-classed entity was accessed with no tenant context bound.
    #[error("no tenant context bound for a tenant-scoped operation")]
    NoTenantContext,
}

/// Resolves which database handle an operation on a given entity class
/// should use.
///
/// Holds no state of its own beyond the resolution rule; handle name →
/// connection pool lookup is the caller's job (this type only decides the
/// *name*).
#[derive(Debug, Default, Clone, Copy)]
pub struct DatabaseRouter;

impl DatabaseRouter {
    pub fn new() -> Self {
        Self
    }

    /// Resolve the handle name for an operation on `class`, given the
    /// (possibly absent) ambient tenant context.
    ///
    /// System entities always resolve to `"default"`. Tenant entities
    /// require a bound context; an endpoint that tries to touch a
    /// tenant-scoped entity with no context bound is a programmer error,
    /// not something to silently default.
    pub fn resolve_handle(
        &self,
        class: EntityClass,
        context: Option<&TenantContext>,
    ) -> Result<&'static str, RoutingError> {
        match class {
            EntityClass::System => Ok("default"),
            EntityClass::Tenant => context
                .map(|ctx| ctx.handle())
                .ok_or(RoutingError::NoTenantContext),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_core::TenantId;

    #[test]
    fn system_entity_always_routes_to_default() {
        let router = DatabaseRouter::new();
        assert_eq!(
            router.resolve_handle(EntityClass::System, None).unwrap(),
            "default"
        );
    }

    #[test]
    fn tenant_entity_without_context_is_an_error() {
        let router = DatabaseRouter::new();
        assert_eq!(
            router.resolve_handle(EntityClass::Tenant, None).unwrap_err(),
            RoutingError::NoTenantContext
        );
    }

    #[test]
    fn tenant_entity_routes_to_bound_handle() {
        let router = DatabaseRouter::new();
        let ctx = TenantContext::new(TenantId::new(), "tenant_acme", false);
        assert_eq!(
            router
                .resolve_handle(EntityClass::Tenant, Some(&ctx))
                .unwrap(),
            "tenant_acme"
        );
    }
}
