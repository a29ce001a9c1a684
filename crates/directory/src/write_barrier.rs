use thiserror::Error;

/// Ambient "who is allowed to write this" tag, constructed at the call site
/// that is about to perform a write and threaded explicitly into the
/// persistence call — never a thread-local or global stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteContext {
    /// Regular mutation via the command layer.
    Command,
    /// A projection applying an event to its own read model.
    Projection,
    /// Seed/fixture data loading; no replay guarantees apply.
    Bootstrap,
    /// The migration orchestrator moving a tenant between handles.
    Migration,
    /// Operator escape hatch. Can only be constructed when emergency writes
    /// are enabled in configuration.
    AdminEmergency,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WriteBarrierError {
    #[error("write context {context:?} is not permitted to write {entity}")]
    Forbidden {
        context: WriteContext,
        entity: &'static str,
    },
    #[error("admin emergency writes are disabled")]
    AdminEmergencyDisabled,
}

impl WriteContext {
    /// Construct the `AdminEmergency` context. Fails immediately unless the
    /// operator has explicitly enabled emergency writes in configuration.
    pub fn admin_emergency(allow_admin_emergency_writes: bool) -> Result<Self, WriteBarrierError> {
        if !allow_admin_emergency_writes {
            return Err(WriteBarrierError::AdminEmergencyDisabled);
        }
        Ok(WriteContext::AdminEmergency)
    }
}

/// A read-model entity that declares which write contexts may write it.
///
/// Implement this on a zero-sized marker type per entity (e.g. `struct
/// AccountBalanceRow;`) and call [`WritableEntity::check`] before persisting.
pub trait WritableEntity {
    /// Name used in barrier-violation error messages.
    const NAME: &'static str;

    /// Contexts allowed to write this entity.
    fn allowed_contexts() -> &'static [WriteContext];

    fn check(context: WriteContext) -> Result<(), WriteBarrierError> {
        if Self::allowed_contexts().contains(&context) {
            Ok(())
        } else {
            Err(WriteBarrierError::Forbidden {
                context,
                entity: Self::NAME,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AccountBalanceRow;
    impl WritableEntity for AccountBalanceRow {
        const NAME: &'static str = "account_balance";
        fn allowed_contexts() -> &'static [WriteContext] {
            &[WriteContext::Projection, WriteContext::Bootstrap]
        }
    }

    #[test]
    fn projection_write_to_projection_owned_entity_is_allowed() {
        assert!(AccountBalanceRow::check(WriteContext::Projection).is_ok());
    }

    #[test]
    fn command_write_to_projection_owned_entity_is_forbidden() {
        let err = AccountBalanceRow::check(WriteContext::Command).unwrap_err();
        assert_eq!(
            err,
            WriteBarrierError::Forbidden {
                context: WriteContext::Command,
                entity: "account_balance",
            }
        );
    }

    #[test]
    fn admin_emergency_context_requires_flag() {
        assert_eq!(
            WriteContext::admin_emergency(false).unwrap_err(),
            WriteBarrierError::AdminEmergencyDisabled
        );
        assert_eq!(
            WriteContext::admin_emergency(true).unwrap(),
            WriteContext::AdminEmergency
        );
    }
}
