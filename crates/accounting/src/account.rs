use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ledger_core::{Aggregate, AggregateRoot, AggregateId, DomainError, TenantId};
use ledger_events::Event;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountKind {
    Asset,
    Liability,
    Equity,
    Revenue,
    Expense,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    Active,
    Archived,
}

/// A single field changed by an `account.updated` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldChange {
    pub old: Option<String>,
    pub new: Option<String>,
}

/// Account aggregate root. Identified by `public_id`; belongs to a tenant's
/// chart of accounts hierarchy via `parent_public_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    id: AggregateId,
    tenant_id: Option<TenantId>,
    pub code: String,
    pub name: String,
    pub name_ar: String,
    pub kind: Option<AccountKind>,
    pub status: AccountStatus,
    pub description: String,
    pub description_ar: String,
    pub unit_of_measure: String,
    pub parent_public_id: Option<AggregateId>,
    /// A header account aggregates its children but cannot receive postings.
    pub is_header: bool,
    pub deleted: bool,
    version: u64,
    created: bool,
}

impl Account {
    pub fn empty(id: AggregateId) -> Self {
        Self {
            id,
            tenant_id: None,
            code: String::new(),
            name: String::new(),
            name_ar: String::new(),
            kind: None,
            status: AccountStatus::Active,
            description: String::new(),
            description_ar: String::new(),
            unit_of_measure: String::new(),
            parent_public_id: None,
            is_header: false,
            deleted: false,
            version: 0,
            created: false,
        }
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }
}

impl AggregateRoot for Account {
    type Id = AggregateId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateAccount {
    pub tenant_id: TenantId,
    pub account_id: AggregateId,
    pub code: String,
    pub name: String,
    pub name_ar: String,
    pub kind: AccountKind,
    pub description: String,
    pub description_ar: String,
    pub unit_of_measure: String,
    pub parent_public_id: Option<AggregateId>,
    pub is_header: bool,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateAccount {
    pub tenant_id: TenantId,
    pub account_id: AggregateId,
    pub changes: BTreeMap<String, FieldChange>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteAccount {
    pub tenant_id: TenantId,
    pub account_id: AggregateId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AccountCommand {
    Create(CreateAccount),
    Update(UpdateAccount),
    Delete(DeleteAccount),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountCreated {
    pub tenant_id: TenantId,
    pub account_id: AggregateId,
    pub code: String,
    pub name: String,
    pub name_ar: String,
    pub kind: AccountKind,
    pub description: String,
    pub description_ar: String,
    pub unit_of_measure: String,
    pub parent_public_id: Option<AggregateId>,
    pub is_header: bool,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountUpdated {
    pub tenant_id: TenantId,
    pub account_id: AggregateId,
    pub changes: BTreeMap<String, FieldChange>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountDeleted {
    pub tenant_id: TenantId,
    pub account_id: AggregateId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AccountEvent {
    Created(AccountCreated),
    Updated(AccountUpdated),
    Deleted(AccountDeleted),
}

impl Event for AccountEvent {
    fn event_type(&self) -> &'static str {
        match self {
            AccountEvent::Created(_) => "account.created",
            AccountEvent::Updated(_) => "account.updated",
            AccountEvent::Deleted(_) => "account.deleted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            AccountEvent::Created(e) => e.occurred_at,
            AccountEvent::Updated(e) => e.occurred_at,
            AccountEvent::Deleted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Account {
    type Command = AccountCommand;
    type Event = AccountEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            AccountEvent::Created(e) => {
                self.tenant_id = Some(e.tenant_id);
                self.code = e.code.clone();
                self.name = e.name.clone();
                self.name_ar = e.name_ar.clone();
                self.kind = Some(e.kind);
                self.description = e.description.clone();
                self.description_ar = e.description_ar.clone();
                self.unit_of_measure = e.unit_of_measure.clone();
                self.parent_public_id = e.parent_public_id;
                self.is_header = e.is_header;
                self.created = true;
            }
            AccountEvent::Updated(e) => {
                for (field, change) in &e.changes {
                    match field.as_str() {
                        "code" => self.code = change.new.clone().unwrap_or_default(),
                        "name" => self.name = change.new.clone().unwrap_or_default(),
                        "name_ar" => self.name_ar = change.new.clone().unwrap_or_default(),
                        "description" => self.description = change.new.clone().unwrap_or_default(),
                        "description_ar" => {
                            self.description_ar = change.new.clone().unwrap_or_default()
                        }
                        "unit_of_measure" => {
                            self.unit_of_measure = change.new.clone().unwrap_or_default()
                        }
                        "status" => {
                            self.status = match change.new.as_deref() {
                                Some("archived") => AccountStatus::Archived,
                                _ => AccountStatus::Active,
                            }
                        }
                        _ => {}
                    }
                }
            }
            AccountEvent::Deleted(_) => {
                self.deleted = true;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            AccountCommand::Create(cmd) => self.handle_create(cmd),
            AccountCommand::Update(cmd) => self.handle_update(cmd),
            AccountCommand::Delete(cmd) => self.handle_delete(cmd),
        }
    }
}

impl Account {
    fn handle_create(&self, cmd: &CreateAccount) -> Result<Vec<AccountEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("account already created"));
        }
        if cmd.code.trim().is_empty() {
            return Err(DomainError::validation("code must not be empty"));
        }

        Ok(vec![AccountEvent::Created(AccountCreated {
            tenant_id: cmd.tenant_id,
            account_id: cmd.account_id,
            code: cmd.code.clone(),
            name: cmd.name.clone(),
            name_ar: cmd.name_ar.clone(),
            kind: cmd.kind,
            description: cmd.description.clone(),
            description_ar: cmd.description_ar.clone(),
            unit_of_measure: cmd.unit_of_measure.clone(),
            parent_public_id: cmd.parent_public_id,
            is_header: cmd.is_header,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateAccount) -> Result<Vec<AccountEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.deleted {
            return Err(DomainError::invariant("cannot update a deleted account"));
        }
        if cmd.changes.is_empty() {
            return Ok(Vec::new());
        }

        Ok(vec![AccountEvent::Updated(AccountUpdated {
            tenant_id: cmd.tenant_id,
            account_id: cmd.account_id,
            changes: cmd.changes.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_delete(&self, cmd: &DeleteAccount) -> Result<Vec<AccountEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.deleted {
            return Ok(Vec::new());
        }
        if self.is_header {
            return Err(DomainError::invariant(
                "header accounts with postings history are not deleted directly",
            ));
        }

        Ok(vec![AccountEvent::Deleted(AccountDeleted {
            tenant_id: cmd.tenant_id,
            account_id: cmd.account_id,
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
    fn create_then_update_then_delete() {
        let tenant_id = TenantId::new();
        let account_id = AggregateId::new();
        let mut account = Account::empty(account_id);

        let events = account
            .handle(&AccountCommand::Create(CreateAccount {
                tenant_id,
                account_id,
                code: "1000".to_string(),
                name: "Cash".to_string(),
                name_ar: String::new(),
                kind: AccountKind::Asset,
                description: String::new(),
                description_ar: String::new(),
                unit_of_measure: String::new(),
                parent_public_id: None,
                is_header: false,
                occurred_at: now(),
            }))
            .unwrap();
        for e in &events {
            account.apply(e);
        }
        assert_eq!(account.code, "1000");

        let mut changes = BTreeMap::new();
        changes.insert(
            "name".to_string(),
            FieldChange {
                old: Some("Cash".to_string()),
                new: Some("Petty Cash".to_string()),
            },
        );
        let events = account
            .handle(&AccountCommand::Update(UpdateAccount {
                tenant_id,
                account_id,
                changes,
                occurred_at: now(),
            }))
            .unwrap();
        for e in &events {
            account.apply(e);
        }
        assert_eq!(account.name, "Petty Cash");

        let events = account
            .handle(&AccountCommand::Delete(DeleteAccount {
                tenant_id,
                account_id,
                occurred_at: now(),
            }))
            .unwrap();
        for e in &events {
            account.apply(e);
        }
        assert!(account.deleted);
    }

    #[test]
    fn header_account_cannot_be_deleted() {
        let tenant_id = TenantId::new();
        let account_id = AggregateId::new();
        let mut account = Account::empty(account_id);
        let events = account
            .handle(&AccountCommand::Create(CreateAccount {
                tenant_id,
                account_id,
                code: "1000".to_string(),
                name: "Assets".to_string(),
                name_ar: String::new(),
                kind: AccountKind::Asset,
                description: String::new(),
                description_ar: String::new(),
                unit_of_measure: String::new(),
                parent_public_id: None,
                is_header: true,
                occurred_at: now(),
            }))
            .unwrap();
        for e in &events {
            account.apply(e);
        }

        let err = account
            .handle(&AccountCommand::Delete(DeleteAccount {
                tenant_id,
                account_id,
                occurred_at: now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }
}
