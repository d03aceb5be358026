//! Propagation Engine
//!
//! Hop-weighted, exactly conserving distribution of an input quantity from
//! an origin node across the bond graph.

pub mod absorption;
pub mod config;
pub mod engine;
pub mod models;

pub use absorption::absorb;
pub use config::{PoolShare, PropagationConfig};
pub use engine::{distribute, ledger_events, FieldSnapshot, PropagationEngine};
pub use models::*;
