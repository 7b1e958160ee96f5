//! Aggregate root trait for the event-sourced account ledger.

use crate::id::AccountId;

/// Aggregate root marker + minimal interface.
///
/// Intentionally small: the account aggregate decides how it folds events
/// and validates commands (pure, no IO); this trait only fixes the shape
/// infrastructure needs to address and version it.
pub trait AggregateRoot {
    /// Returns the aggregate identifier.
    fn id(&self) -> &AccountId;

    /// Monotonically non-decreasing version of the aggregate's state,
    /// incremented by exactly one per event folded into it.
    fn version(&self) -> u64;
}
