//! Financial reconciliation and multi-currency reporting engine for a
//! multi-tenant property-management back office.
//!
//! The engine derives invoice statuses from live payment history, applies
//! payments (including two-currency splits) against invoices, allocates
//! revenue to property owners pro-rata, computes management fees in the
//! settlement currency, builds per-tenant ledgers, and persists idempotent
//! period report snapshots through the [`storage::FinanceStore`] boundary.
//!
//! All calculators are pure and synchronous; only the storage boundary and
//! the orchestrating services are async.

pub mod config;
pub mod domain;
pub mod error;
pub mod services;
pub mod storage;

pub use config::EngineConfig;
pub use error::{EngineError, EngineResult, Warning};
