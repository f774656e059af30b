//! Distributed graph data model
//!
//! This module implements the partitioned graph:
//! - Vertex placement by a pluggable [`Partitioner`]
//! - Open-state ingress with local duplicate and sentinel checks
//! - A collective finalize that shuffles records, places replicas and builds indices
//! - Arena storage with CSR-style in/out adjacency and borrowed handles

mod finalize;
pub mod handle;
mod ingress;
pub mod local;
pub mod partition;
pub mod store;
pub mod types;

// Re-export main types
pub use handle::{EdgeMut, EdgeRef, Edges, VertexMut, VertexRef};
pub use local::{LocalGraph, Mirror};
pub use partition::{HashPartitioner, ModuloPartitioner, Partitioner, PartitionerKind};
pub use store::{DistributedGraph, GraphError, GraphResult};
pub use types::{EdgeDirection, LocalEid, LocalVid, VertexId};
