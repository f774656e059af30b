//! Shared helpers for toolkit programs

use crate::graph::{DistributedGraph, GraphResult, VertexId};
use rustc_hash::FxHashMap;
use std::ops::AddAssign;

/// Gather value keeping the smallest label seen. Empty gathers yield
/// `u64::MAX`, which never lowers a label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MinLabel(pub u64);

impl Default for MinLabel {
    fn default() -> Self {
        MinLabel(u64::MAX)
    }
}

impl AddAssign for MinLabel {
    fn add_assign(&mut self, other: MinLabel) {
        self.0 = self.0.min(other.0);
    }
}

/// Collect the data of every vertex, on every machine. Collective.
///
/// Meant for result inspection on small graphs: every machine receives a
/// full copy.
pub async fn collect_vertex_data<V, E>(graph: &DistributedGraph<V, E>) -> GraphResult<FxHashMap<VertexId, V>>
where
    V: Clone + Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    let collected = graph
        .map_reduce_vertices(
            |v| vec![(v.id(), v.data().clone())],
            |mut a, b| {
                a.extend(b);
                a
            },
        )
        .await?;
    Ok(collected.unwrap_or_default().into_iter().collect())
}
