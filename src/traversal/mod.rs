//! Graph Traversal
//!
//! Breadth-first queries over a consistent snapshot of ACTIVE bonds.

pub mod adjacency;
pub mod bfs;
pub mod stats;

pub use adjacency::{Adjacency, PeerSet};
pub use bfs::{hop_weight, reachable_from, shortest_path, PathResult, Reach, ReachedNode};
pub use stats::{FieldHealth, NodeStats, STATS_HOPS};
