//! Single-machine reference implementations
//!
//! Straightforward sequential versions of the toolkit algorithms, used as
//! oracles when testing the distributed programs.

pub mod common;
pub mod community;
pub mod pagerank;
pub mod pathfinding;

pub use common::{GraphView, NodeId};
pub use community::{weakly_connected_components, WccResult};
pub use pagerank::{page_rank, page_rank_closed_form, PageRankConfig};
pub use pathfinding::{dijkstra, shortest_distances, PathResult};
