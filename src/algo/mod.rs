//! Toolkit vertex programs
//!
//! Ready-made [`VertexProgram`](crate::engine::VertexProgram)s that run on
//! either engine:
//! - [`PageRank`]: damped rank propagation along in-edges
//! - [`ConnectedComponents`]: smallest-id labelling, ignoring edge direction
//! - [`ShortestPaths`]: single-source distances over non-negative weights

pub mod common;
pub mod components;
pub mod pagerank;
pub mod shortest_paths;

pub use common::{collect_vertex_data, MinLabel};
pub use components::ConnectedComponents;
pub use pagerank::PageRank;
pub use shortest_paths::ShortestPaths;
