//! Ledger
//!
//! Append-only record of every quantity movement, with conservation
//! verification and per-node and per-pool queries. [`LedgerTotals`] is the
//! read model handed to the reserve-ratio calculator.

pub mod manager;
pub mod models;

pub use manager::Ledger;
pub use models::*;
