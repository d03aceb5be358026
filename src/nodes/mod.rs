//! Node Registry
//!
//! Participant identities, derived lifecycle state and the activity log
//! that gates eligibility to receive propagated quantity.

pub mod models;
pub mod registry;

pub use models::*;
pub use registry::{score_from_count, NodeRegistry};
