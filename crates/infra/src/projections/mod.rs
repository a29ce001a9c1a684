//! Projection implementations (read model builders).

pub mod cursor_store;
pub mod engine;

pub use cursor_store::{PostgresCursorStore, ProjectionCursorStore};
pub use engine::{
    InMemoryBookmarkStore, PostgresBookmarkStore, Projection, ProjectionAppliedLedger,
    ProjectionBookmark, ProjectionBookmarkStore, ProjectionEngine, ProjectionEngineError,
    ProjectionLag, ProjectionOwnedWrite,
};
