use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ledger_core::{Aggregate, AggregateRoot, DomainError, TenantId};
use ledger_events::Event;

/// Externally-facing tenant root. Lives in the system database; never
/// destructively deleted (deactivated instead).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Company {
    pub tenant_id: TenantId,
    pub slug: String,
    pub display_name: String,
    pub base_currency: String,
    /// 1-12, the calendar month a fiscal year begins in.
    pub fiscal_year_start_month: u8,
    pub active: bool,
    version: u64,
    created: bool,
}

impl Company {
    pub fn empty(tenant_id: TenantId) -> Self {
        Self {
            tenant_id,
            slug: String::new(),
            display_name: String::new(),
            base_currency: String::new(),
            fiscal_year_start_month: 1,
            active: false,
            version: 0,
            created: false,
        }
    }
}

impl AggregateRoot for Company {
    type Id = TenantId;

    fn id(&self) -> &Self::Id {
        &self.tenant_id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterCompany {
    pub tenant_id: TenantId,
    pub slug: String,
    pub display_name: String,
    pub base_currency: String,
    pub fiscal_year_start_month: u8,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeactivateCompany {
    pub tenant_id: TenantId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompanyCommand {
    Register(RegisterCompany),
    Deactivate(DeactivateCompany),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyRegistered {
    pub tenant_id: TenantId,
    pub slug: String,
    pub display_name: String,
    pub base_currency: String,
    pub fiscal_year_start_month: u8,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyDeactivated {
    pub tenant_id: TenantId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompanyEvent {
    Registered(CompanyRegistered),
    Deactivated(CompanyDeactivated),
}

impl Event for CompanyEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CompanyEvent::Registered(_) => "directory.company.registered",
            CompanyEvent::Deactivated(_) => "directory.company.deactivated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            CompanyEvent::Registered(e) => e.occurred_at,
            CompanyEvent::Deactivated(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Company {
    type Command = CompanyCommand;
    type Event = CompanyEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            CompanyEvent::Registered(e) => {
                self.slug = e.slug.clone();
                self.display_name = e.display_name.clone();
                self.base_currency = e.base_currency.clone();
                self.fiscal_year_start_month = e.fiscal_year_start_month;
                self.active = true;
                self.created = true;
            }
            CompanyEvent::Deactivated(_) => {
                self.active = false;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            CompanyCommand::Register(cmd) => self.handle_register(cmd),
            CompanyCommand::Deactivate(cmd) => self.handle_deactivate(cmd),
        }
    }
}

impl Company {
    fn handle_register(&self, cmd: &RegisterCompany) -> Result<Vec<CompanyEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("company already registered"));
        }
        if cmd.slug.trim().is_empty() {
            return Err(DomainError::validation("slug must not be empty"));
        }
        if !(1..=12).contains(&cmd.fiscal_year_start_month) {
            return Err(DomainError::validation(
                "fiscal_year_start_month must be 1-12",
            ));
        }

        Ok(vec![CompanyEvent::Registered(CompanyRegistered {
            tenant_id: cmd.tenant_id,
            slug: cmd.slug.clone(),
            display_name: cmd.display_name.clone(),
            base_currency: cmd.base_currency.clone(),
            fiscal_year_start_month: cmd.fiscal_year_start_month,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_deactivate(&self, cmd: &DeactivateCompany) -> Result<Vec<CompanyEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if !self.active {
            return Ok(Vec::new());
        }

        Ok(vec![CompanyEvent::Deactivated(CompanyDeactivated {
            tenant_id: cmd.tenant_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn register_then_deactivate() {
        let tenant_id = TenantId::new();
        let mut company = Company::empty(tenant_id);

        let events = company
            .handle(&CompanyCommand::Register(RegisterCompany {
                tenant_id,
                slug: "acme".to_string(),
                display_name: "Acme Inc".to_string(),
                base_currency: "USD".to_string(),
                fiscal_year_start_month: 1,
                occurred_at: now(),
            }))
            .unwrap();
        for e in &events {
            company.apply(e);
        }
        assert!(company.active);

        let events = company
            .handle(&CompanyCommand::Deactivate(DeactivateCompany {
                tenant_id,
                occurred_at: now(),
            }))
            .unwrap();
        for e in &events {
            company.apply(e);
        }
        assert!(!company.active);
    }

    #[test]
    fn double_registration_is_rejected() {
        let tenant_id = TenantId::new();
        let mut company = Company::empty(tenant_id);
        let cmd = CompanyCommand::Register(RegisterCompany {
            tenant_id,
            slug: "acme".to_string(),
            display_name: "Acme Inc".to_string(),
            base_currency: "USD".to_string(),
            fiscal_year_start_month: 1,
            occurred_at: now(),
        });
        let events = company.handle(&cmd).unwrap();
        for e in &events {
            company.apply(e);
        }

        let err = company.handle(&cmd).unwrap_err();
        assert_eq!(err, DomainError::conflict("company already registered"));
    }
}
