//! Aggregate root trait for event-sourced (and non-event-sourced) domain models.

/// Aggregate root marker + minimal interface.
///
/// This is intentionally small so domain modules can decide how they model state
/// transitions (pure functions, event application, etc.) without bringing in any
/// infrastructure concerns.
pub trait AggregateRoot {
    /// Strongly-typed aggregate identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the aggregate identifier.
    fn id(&self) -> &Self::Id;

    /// Monotonically increasing version of the aggregate's state.
    ///
    /// For event-sourced aggregates, this typically corresponds to the number of
    /// events applied (or the stream revision).
    fn version(&self) -> u64;
}

/// Full event-sourced aggregate contract: decide (`handle`), then fold (`apply`).
///
/// `handle` must be pure: given the aggregate's current state and a command it
/// either rejects the command or returns the events that would result from it,
/// without mutating `self`. `apply` must be deterministic: folding the same
/// event into the same state always produces the same next state, and replaying
/// a full event slice must reproduce exactly the state observed after the last
/// of those events was originally decided.
pub trait Aggregate: AggregateRoot {
    type Command;
    type Event;
    type Error;

    /// Fold a single historical or newly-decided event into the aggregate's
    /// state. Never fails: invalid events should never reach `apply` because
    /// `handle` is the only path that produces them.
    fn apply(&mut self, event: &Self::Event);

    /// Decide what events, if any, should result from `command` given the
    /// aggregate's current state.
    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error>;
}

/// Optimistic-concurrency expectation checked against an aggregate's current
/// version before an append is allowed to proceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// No assumption about the current version (e.g. a deliberately
    /// unchecked write).
    Any,
    /// The aggregate must not exist yet (version 0).
    New,
    /// The aggregate must be at exactly this version.
    Exact(u64),
}

impl ExpectedVersion {
    pub fn matches(&self, current: u64) -> bool {
        match self {
            ExpectedVersion::Any => true,
            ExpectedVersion::New => current == 0,
            ExpectedVersion::Exact(v) => *v == current,
        }
    }
}
