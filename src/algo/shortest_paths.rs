//! Single-source shortest paths
//!
//! Distances travel as [`MinValue`] signals: a vertex whose distance drops
//! offers `distance + weight` to each out-neighbor, and concurrent offers for
//! the same vertex merge to their minimum. With the priority scheduler the
//! closest pending vertex runs first, which approximates Dijkstra's order on
//! each machine.

use crate::engine::{Context, ProgramEdge, ProgramEdgeMut, ProgramVertex, ProgramVertexMut, VertexProgram};
use crate::graph::EdgeDirection;
use crate::scheduler::MinValue;

/// Initial data of every vertex; the source is reached by signalling it with
/// `MinValue(0.0)`.
pub const UNREACHED: f64 = f64::INFINITY;

#[derive(Debug, Clone)]
pub struct ShortestPaths {
    offered: f64,
    improved: bool,
}

impl Default for ShortestPaths {
    fn default() -> Self {
        Self {
            offered: UNREACHED,
            improved: false,
        }
    }
}

impl ShortestPaths {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VertexProgram for ShortestPaths {
    type VertexData = f64;
    /// Edge weight, expected non-negative
    type EdgeData = f64;
    /// Unused: distances arrive with the signal
    type Gather = f64;
    type Message = MinValue;

    fn init(&mut self, _ctx: &Context<'_, MinValue>, _vertex: ProgramVertex<'_, Self>, message: MinValue) {
        self.offered = message.0;
    }

    fn gather_edges(&self, _ctx: &Context<'_, MinValue>, _vertex: ProgramVertex<'_, Self>) -> EdgeDirection {
        EdgeDirection::None
    }

    fn gather(&self, _ctx: &Context<'_, MinValue>, _vertex: ProgramVertex<'_, Self>, _edge: ProgramEdge<'_, Self>) -> f64 {
        0.0
    }

    fn apply(&mut self, _ctx: &Context<'_, MinValue>, vertex: &mut ProgramVertexMut<'_, Self>, _total: f64) {
        self.improved = self.offered < *vertex.data();
        if self.improved {
            *vertex.data_mut() = self.offered;
        }
    }

    fn scatter_edges(&self, _ctx: &Context<'_, MinValue>, _vertex: ProgramVertex<'_, Self>) -> EdgeDirection {
        if self.improved {
            EdgeDirection::Out
        } else {
            EdgeDirection::None
        }
    }

    fn scatter(&self, ctx: &Context<'_, MinValue>, _vertex: ProgramVertex<'_, Self>, edge: &ProgramEdgeMut<'_, Self>) {
        let candidate = self.offered + *edge.data();
        let target = edge.target();
        if candidate < *target.data() {
            ctx.signal(target.id(), MinValue(candidate));
        }
    }
}
