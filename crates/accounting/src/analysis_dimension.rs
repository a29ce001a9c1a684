//! Analysis dimensions (cost center, project, ...) and their values.
//!
//! A dimension is a named axis; values are its members. Accounts may
//! declare a default value for a dimension, applied to journal lines that
//! omit it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ledger_core::{Aggregate, AggregateRoot, AggregateId, DomainError, TenantId};
use ledger_events::Event;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisDimension {
    id: AggregateId,
    tenant_id: Option<TenantId>,
    pub code: String,
    pub name: String,
    pub name_ar: String,
    pub deleted: bool,
    version: u64,
    created: bool,
}

impl AnalysisDimension {
    pub fn empty(id: AggregateId) -> Self {
        Self {
            id,
            tenant_id: None,
            code: String::new(),
            name: String::new(),
            name_ar: String::new(),
            deleted: false,
            version: 0,
            created: false,
        }
    }
}

impl AggregateRoot for AnalysisDimension {
    type Id = AggregateId;
    fn id(&self) -> &Self::Id {
        &self.id
    }
    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateAnalysisDimension {
    pub tenant_id: TenantId,
    pub dimension_id: AggregateId,
    pub code: String,
    pub name: String,
    pub name_ar: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateAnalysisDimension {
    pub tenant_id: TenantId,
    pub dimension_id: AggregateId,
    pub name: Option<String>,
    pub name_ar: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteAnalysisDimension {
    pub tenant_id: TenantId,
    pub dimension_id: AggregateId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnalysisDimensionCommand {
    Create(CreateAnalysisDimension),
    Update(UpdateAnalysisDimension),
    Delete(DeleteAnalysisDimension),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisDimensionCreated {
    pub tenant_id: TenantId,
    pub dimension_id: AggregateId,
    pub code: String,
    pub name: String,
    pub name_ar: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisDimensionUpdated {
    pub tenant_id: TenantId,
    pub dimension_id: AggregateId,
    pub name: Option<String>,
    pub name_ar: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisDimensionDeleted {
    pub tenant_id: TenantId,
    pub dimension_id: AggregateId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnalysisDimensionEvent {
    Created(AnalysisDimensionCreated),
    Updated(AnalysisDimensionUpdated),
    Deleted(AnalysisDimensionDeleted),
}

impl Event for AnalysisDimensionEvent {
    fn event_type(&self) -> &'static str {
        match self {
            AnalysisDimensionEvent::Created(_) => "analysis_dimension.created",
            AnalysisDimensionEvent::Updated(_) => "analysis_dimension.updated",
            AnalysisDimensionEvent::Deleted(_) => "analysis_dimension.deleted",
        }
    }
    fn version(&self) -> u32 {
        1
    }
    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            AnalysisDimensionEvent::Created(e) => e.occurred_at,
            AnalysisDimensionEvent::Updated(e) => e.occurred_at,
            AnalysisDimensionEvent::Deleted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for AnalysisDimension {
    type Command = AnalysisDimensionCommand;
    type Event = AnalysisDimensionEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            AnalysisDimensionEvent::Created(e) => {
                self.tenant_id = Some(e.tenant_id);
                self.code = e.code.clone();
                self.name = e.name.clone();
                self.name_ar = e.name_ar.clone();
                self.created = true;
            }
            AnalysisDimensionEvent::Updated(e) => {
                if let Some(name) = &e.name {
                    self.name = name.clone();
                }
                if let Some(name_ar) = &e.name_ar {
                    self.name_ar = name_ar.clone();
                }
            }
            AnalysisDimensionEvent::Deleted(_) => {
                self.deleted = true;
            }
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            AnalysisDimensionCommand::Create(cmd) => {
                if self.created {
                    return Err(DomainError::conflict("dimension already created"));
                }
                if cmd.code.trim().is_empty() {
                    return Err(DomainError::validation("code must not be empty"));
                }
                Ok(vec![AnalysisDimensionEvent::Created(
                    AnalysisDimensionCreated {
                        tenant_id: cmd.tenant_id,
                        dimension_id: cmd.dimension_id,
                        code: cmd.code.clone(),
                        name: cmd.name.clone(),
                        name_ar: cmd.name_ar.clone(),
                        occurred_at: Utc::now(),
                    },
                )])
            }
            AnalysisDimensionCommand::Update(cmd) => {
                if !self.created || self.deleted {
                    return Err(DomainError::not_found());
                }
                Ok(vec![AnalysisDimensionEvent::Updated(
                    AnalysisDimensionUpdated {
                        tenant_id: cmd.tenant_id,
                        dimension_id: cmd.dimension_id,
                        name: cmd.name.clone(),
                        name_ar: cmd.name_ar.clone(),
                        occurred_at: Utc::now(),
                    },
                )])
            }
            AnalysisDimensionCommand::Delete(cmd) => {
                if !self.created {
                    return Err(DomainError::not_found());
                }
                if self.deleted {
                    return Ok(Vec::new());
                }
                Ok(vec![AnalysisDimensionEvent::Deleted(
                    AnalysisDimensionDeleted {
                        tenant_id: cmd.tenant_id,
                        dimension_id: cmd.dimension_id,
                        occurred_at: Utc::now(),
                    },
                )])
            }
        }
    }
}

/// A member value of an [`AnalysisDimension`] (e.g. "Marketing" under "Cost Center").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisDimensionValue {
    id: AggregateId,
    tenant_id: Option<TenantId>,
    pub dimension_id: Option<AggregateId>,
    pub code: String,
    pub label: String,
    pub label_ar: String,
    pub deleted: bool,
    version: u64,
    created: bool,
}

impl AnalysisDimensionValue {
    pub fn empty(id: AggregateId) -> Self {
        Self {
            id,
            tenant_id: None,
            dimension_id: None,
            code: String::new(),
            label: String::new(),
            label_ar: String::new(),
            deleted: false,
            version: 0,
            created: false,
        }
    }
}

impl AggregateRoot for AnalysisDimensionValue {
    type Id = AggregateId;
    fn id(&self) -> &Self::Id {
        &self.id
    }
    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateAnalysisDimensionValue {
    pub tenant_id: TenantId,
    pub value_id: AggregateId,
    pub dimension_id: AggregateId,
    pub code: String,
    pub label: String,
    pub label_ar: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateAnalysisDimensionValue {
    pub tenant_id: TenantId,
    pub value_id: AggregateId,
    pub label: Option<String>,
    pub label_ar: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteAnalysisDimensionValue {
    pub tenant_id: TenantId,
    pub value_id: AggregateId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnalysisDimensionValueCommand {
    Create(CreateAnalysisDimensionValue),
    Update(UpdateAnalysisDimensionValue),
    Delete(DeleteAnalysisDimensionValue),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisDimensionValueCreated {
    pub tenant_id: TenantId,
    pub value_id: AggregateId,
    pub dimension_id: AggregateId,
    pub code: String,
    pub label: String,
    pub label_ar: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisDimensionValueUpdated {
    pub tenant_id: TenantId,
    pub value_id: AggregateId,
    pub label: Option<String>,
    pub label_ar: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisDimensionValueDeleted {
    pub tenant_id: TenantId,
    pub value_id: AggregateId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnalysisDimensionValueEvent {
    Created(AnalysisDimensionValueCreated),
    Updated(AnalysisDimensionValueUpdated),
    Deleted(AnalysisDimensionValueDeleted),
}

impl Event for AnalysisDimensionValueEvent {
    fn event_type(&self) -> &'static str {
        match self {
            AnalysisDimensionValueEvent::Created(_) => "analysis_dimension_value.created",
            AnalysisDimensionValueEvent::Updated(_) => "analysis_dimension_value.updated",
            AnalysisDimensionValueEvent::Deleted(_) => "analysis_dimension_value.deleted",
        }
    }
    fn version(&self) -> u32 {
        1
    }
    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            AnalysisDimensionValueEvent::Created(e) => e.occurred_at,
            AnalysisDimensionValueEvent::Updated(e) => e.occurred_at,
            AnalysisDimensionValueEvent::Deleted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for AnalysisDimensionValue {
    type Command = AnalysisDimensionValueCommand;
    type Event = AnalysisDimensionValueEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            AnalysisDimensionValueEvent::Created(e) => {
                self.tenant_id = Some(e.tenant_id);
                self.dimension_id = Some(e.dimension_id);
                self.code = e.code.clone();
                self.label = e.label.clone();
                self.label_ar = e.label_ar.clone();
                self.created = true;
            }
            AnalysisDimensionValueEvent::Updated(e) => {
                if let Some(label) = &e.label {
                    self.label = label.clone();
                }
                if let Some(label_ar) = &e.label_ar {
                    self.label_ar = label_ar.clone();
                }
            }
            AnalysisDimensionValueEvent::Deleted(_) => {
                self.deleted = true;
            }
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            AnalysisDimensionValueCommand::Create(cmd) => {
                if self.created {
                    return Err(DomainError::conflict("dimension value already created"));
                }
                Ok(vec![AnalysisDimensionValueEvent::Created(
                    AnalysisDimensionValueCreated {
                        tenant_id: cmd.tenant_id,
                        value_id: cmd.value_id,
                        dimension_id: cmd.dimension_id,
                        code: cmd.code.clone(),
                        label: cmd.label.clone(),
                        label_ar: cmd.label_ar.clone(),
                        occurred_at: Utc::now(),
                    },
                )])
            }
            AnalysisDimensionValueCommand::Update(cmd) => {
                if !self.created || self.deleted {
                    return Err(DomainError::not_found());
                }
                Ok(vec![AnalysisDimensionValueEvent::Updated(
                    AnalysisDimensionValueUpdated {
                        tenant_id: cmd.tenant_id,
                        value_id: cmd.value_id,
                        label: cmd.label.clone(),
                        label_ar: cmd.label_ar.clone(),
                        occurred_at: Utc::now(),
                    },
                )])
            }
            AnalysisDimensionValueCommand::Delete(cmd) => {
                if !self.created {
                    return Err(DomainError::not_found());
                }
                if self.deleted {
                    return Ok(Vec::new());
                }
                Ok(vec![AnalysisDimensionValueEvent::Deleted(
                    AnalysisDimensionValueDeleted {
                        tenant_id: cmd.tenant_id,
                        value_id: cmd.value_id,
                        occurred_at: Utc::now(),
                    },
                )])
            }
        }
    }
}

/// Declares (or clears) the dimension value applied to a journal line on an
/// account when the line omits that dimension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountAnalysisDefaultSet {
    pub tenant_id: TenantId,
    pub account_public_id: AggregateId,
    pub dimension_id: AggregateId,
    pub value_id: AggregateId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountAnalysisDefaultRemoved {
    pub tenant_id: TenantId,
    pub account_public_id: AggregateId,
    pub dimension_id: AggregateId,
    pub occurred_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_dimension_then_add_value() {
        let tenant_id = TenantId::new();
        let dim_id = AggregateId::new();
        let mut dim = AnalysisDimension::empty(dim_id);
        let events = dim
            .handle(&AnalysisDimensionCommand::Create(CreateAnalysisDimension {
                tenant_id,
                dimension_id: dim_id,
                code: "cost_center".to_string(),
                name: "Cost Center".to_string(),
                name_ar: String::new(),
            }))
            .unwrap();
        for e in &events {
            dim.apply(e);
        }
        assert_eq!(dim.code, "cost_center");

        let value_id = AggregateId::new();
        let mut value = AnalysisDimensionValue::empty(value_id);
        let events = value
            .handle(&AnalysisDimensionValueCommand::Create(
                CreateAnalysisDimensionValue {
                    tenant_id,
                    value_id,
                    dimension_id: dim_id,
                    code: "marketing".to_string(),
                    label: "Marketing".to_string(),
                    label_ar: String::new(),
                },
            ))
            .unwrap();
        for e in &events {
            value.apply(e);
        }
        assert_eq!(value.dimension_id, Some(dim_id));
    }

    #[test]
    fn delete_is_idempotent() {
        let tenant_id = TenantId::new();
        let dim_id = AggregateId::new();
        let mut dim = AnalysisDimension::empty(dim_id);
        let events = dim
            .handle(&AnalysisDimensionCommand::Create(CreateAnalysisDimension {
                tenant_id,
                dimension_id: dim_id,
                code: "project".to_string(),
                name: "Project".to_string(),
                name_ar: String::new(),
            }))
            .unwrap();
        for e in &events {
            dim.apply(e);
        }
        let events = dim
            .handle(&AnalysisDimensionCommand::Delete(DeleteAnalysisDimension {
                tenant_id,
                dimension_id: dim_id,
            }))
            .unwrap();
        for e in &events {
            dim.apply(e);
        }
        assert!(dim.deleted);
        let events2 = dim
            .handle(&AnalysisDimensionCommand::Delete(DeleteAnalysisDimension {
                tenant_id,
                dimension_id: dim_id,
            }))
            .unwrap();
        assert!(events2.is_empty());
    }
}
