//! HTTP compatibility edge for the account ledger (§6).
//!
//! Named an external collaborator by the spec and explicitly out of
//! scope for the write-side concurrency/projection work, but shipped
//! here as a thin `axum` binary so the command → publish → rehydrate →
//! project pipeline is runnable end to end. Nothing beyond the four
//! routes in §6 — no auth, no multi-tenancy, no health/readiness
//! surface.

pub mod app;
pub mod config;

pub use config::Config;
