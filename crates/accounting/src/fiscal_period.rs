//! Fiscal period aggregate.
//!
//! Identity is the triple `(tenant, fiscal_year, period)` rather than a
//! standalone UUID — periods are addressed by calendar position, not by an
//! opaque id. `aggregate_id` is derived deterministically from that triple
//! so the event store's per-aggregate stream still applies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use ledger_core::{Aggregate, AggregateRoot, AggregateId, DomainError, TenantId};
use ledger_events::Event;

/// Deterministically derives the aggregate id for a fiscal period so the
/// same `(company, fiscal_year, period)` triple always maps to the same
/// stream, independent of insertion order.
pub fn fiscal_period_aggregate_id(
    tenant_id: TenantId,
    fiscal_year: i32,
    period: u8,
) -> AggregateId {
    let namespace = Uuid::NAMESPACE_OID;
    let name = format!("{}:{fiscal_year}:{period}", tenant_id.as_uuid());
    AggregateId::from_uuid(Uuid::new_v5(&namespace, name.as_bytes()))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FiscalPeriod {
    id: AggregateId,
    tenant_id: Option<TenantId>,
    pub fiscal_year: i32,
    pub period: u8,
    pub closed: bool,
    version: u64,
    created: bool,
}

impl FiscalPeriod {
    pub fn empty(id: AggregateId) -> Self {
        Self {
            id,
            tenant_id: None,
            fiscal_year: 0,
            period: 0,
            closed: false,
            version: 0,
            created: false,
        }
    }
}

impl AggregateRoot for FiscalPeriod {
    type Id = AggregateId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosePeriod {
    pub tenant_id: TenantId,
    pub fiscal_year: i32,
    pub period: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenPeriod {
    pub tenant_id: TenantId,
    pub fiscal_year: i32,
    pub period: u8,
}

/// Sets the open range `[open_from, open_to]` for a fiscal year: any period
/// outside the inclusive range is closed, periods inside it are opened.
/// `open_from` defaults to 1 and `open_to` defaults to the target period
/// itself when not supplied, matching the source system's convention of
/// "open up through period N".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetPeriodRange {
    pub tenant_id: TenantId,
    pub fiscal_year: i32,
    pub period: u8,
    pub open_from: Option<u8>,
    pub open_to: Option<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FiscalPeriodCommand {
    Close(ClosePeriod),
    Open(OpenPeriod),
    SetRange(SetPeriodRange),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FiscalPeriodClosed {
    pub tenant_id: TenantId,
    pub fiscal_year: i32,
    pub period: u8,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FiscalPeriodOpened {
    pub tenant_id: TenantId,
    pub fiscal_year: i32,
    pub period: u8,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FiscalPeriodRangeSet {
    pub tenant_id: TenantId,
    pub fiscal_year: i32,
    pub period: u8,
    pub closed: bool,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FiscalPeriodEvent {
    Closed(FiscalPeriodClosed),
    Opened(FiscalPeriodOpened),
    RangeSet(FiscalPeriodRangeSet),
}

impl Event for FiscalPeriodEvent {
    fn event_type(&self) -> &'static str {
        match self {
            FiscalPeriodEvent::Closed(_) => "fiscal_period.closed",
            FiscalPeriodEvent::Opened(_) => "fiscal_period.opened",
            FiscalPeriodEvent::RangeSet(_) => "fiscal_period.range_set",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            FiscalPeriodEvent::Closed(e) => e.occurred_at,
            FiscalPeriodEvent::Opened(e) => e.occurred_at,
            FiscalPeriodEvent::RangeSet(e) => e.occurred_at,
        }
    }
}

impl Aggregate for FiscalPeriod {
    type Command = FiscalPeriodCommand;
    type Event = FiscalPeriodEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            FiscalPeriodEvent::Closed(e) => {
                self.tenant_id = Some(e.tenant_id);
                self.fiscal_year = e.fiscal_year;
                self.period = e.period;
                self.closed = true;
                self.created = true;
            }
            FiscalPeriodEvent::Opened(e) => {
                self.tenant_id = Some(e.tenant_id);
                self.fiscal_year = e.fiscal_year;
                self.period = e.period;
                self.closed = false;
                self.created = true;
            }
            FiscalPeriodEvent::RangeSet(e) => {
                self.tenant_id = Some(e.tenant_id);
                self.fiscal_year = e.fiscal_year;
                self.period = e.period;
                self.closed = e.closed;
                self.created = true;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            FiscalPeriodCommand::Close(cmd) => Ok(vec![FiscalPeriodEvent::Closed(
                FiscalPeriodClosed {
                    tenant_id: cmd.tenant_id,
                    fiscal_year: cmd.fiscal_year,
                    period: cmd.period,
                    occurred_at: Utc::now(),
                },
            )]),
            FiscalPeriodCommand::Open(cmd) => Ok(vec![FiscalPeriodEvent::Opened(
                FiscalPeriodOpened {
                    tenant_id: cmd.tenant_id,
                    fiscal_year: cmd.fiscal_year,
                    period: cmd.period,
                    occurred_at: Utc::now(),
                },
            )]),
            FiscalPeriodCommand::SetRange(cmd) => self.handle_set_range(cmd),
        }
    }
}

impl FiscalPeriod {
    fn handle_set_range(
        &self,
        cmd: &SetPeriodRange,
    ) -> Result<Vec<FiscalPeriodEvent>, DomainError> {
        let open_from = cmd.open_from.unwrap_or(1);
        let open_to = cmd.open_to.unwrap_or(cmd.period);
        if open_from == 0 || open_from > 12 || open_to == 0 || open_to > 12 {
            return Err(DomainError::validation("period must be in 1..=12"));
        }

        let closed = !(open_from <= cmd.period && cmd.period <= open_to);

        Ok(vec![FiscalPeriodEvent::RangeSet(FiscalPeriodRangeSet {
            tenant_id: cmd.tenant_id,
            fiscal_year: cmd.fiscal_year,
            period: cmd.period,
            closed,
            occurred_at: Utc::now(),
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tenant() -> TenantId {
        TenantId::new()
    }

    #[test]
    fn aggregate_id_is_deterministic_for_same_triple() {
        let tenant_id = tenant();
        let a = fiscal_period_aggregate_id(tenant_id, 2026, 3);
        let b = fiscal_period_aggregate_id(tenant_id, 2026, 3);
        assert_eq!(a, b);

        let c = fiscal_period_aggregate_id(tenant_id, 2026, 4);
        assert_ne!(a, c);
    }

    #[test]
    fn close_then_open() {
        let tenant_id = tenant();
        let id = fiscal_period_aggregate_id(tenant_id, 2026, 3);
        let mut period = FiscalPeriod::empty(id);

        let events = period
            .handle(&FiscalPeriodCommand::Close(ClosePeriod {
                tenant_id,
                fiscal_year: 2026,
                period: 3,
            }))
            .unwrap();
        for e in &events {
            period.apply(e);
        }
        assert!(period.closed);

        let events = period
            .handle(&FiscalPeriodCommand::Open(OpenPeriod {
                tenant_id,
                fiscal_year: 2026,
                period: 3,
            }))
            .unwrap();
        for e in &events {
            period.apply(e);
        }
        assert!(!period.closed);
    }

    #[test]
    fn range_set_closes_periods_outside_open_window() {
        let tenant_id = tenant();
        let id = fiscal_period_aggregate_id(tenant_id, 2026, 5);
        let mut period = FiscalPeriod::empty(id);

        // Opening through period 3 should leave period 5 closed.
        let events = period
            .handle(&FiscalPeriodCommand::SetRange(SetPeriodRange {
                tenant_id,
                fiscal_year: 2026,
                period: 5,
                open_from: None,
                open_to: Some(3),
            }))
            .unwrap();
        for e in &events {
            period.apply(e);
        }
        assert!(period.closed);
    }
}
