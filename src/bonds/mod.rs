//! Bond Graph
//!
//! Undirected, degree-bounded bonds between nodes. Each unordered pair has
//! at most one row; dissolution flips the row to INACTIVE and a later
//! formation brings the same row back.

pub mod graph;
pub mod models;
pub mod rules;

pub use graph::BondGraph;
pub use models::*;
pub use rules::{
    apply_write, BondCommit, BondPlanner, BondRules, BondView, BondWrite, DissolutionPlan,
    FormationPlan,
};
