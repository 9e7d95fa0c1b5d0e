//! Per-invocation runtime for Herald.
//!
//! Hosts the event dispatcher that maps one incoming action event onto the
//! naming, directory, commit window and formatting operations of
//! `herald-core`.

pub mod event_context;
pub mod event_dispatcher;

pub use event_context::EventContext;
pub use event_dispatcher::{DispatchError, DispatchOutcome, DispatcherConfig, EventDispatcher};
