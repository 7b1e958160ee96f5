//! Event-sourcing seams shared by the account aggregate, event log client,
//! command service, and projector: the `Event` trait and the
//! `LoggedEvent` wrapper the log hands back once it has assigned a
//! position.

pub mod event;
pub mod record;

pub use event::Event;
pub use record::LoggedEvent;
