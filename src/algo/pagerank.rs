//! PageRank
//!
//! Each activation recomputes `rank = (1 - d) + d * sum(rank(u) / out_degree(u))`
//! over in-neighbors `u`. With a tolerance, a vertex only signals its
//! out-neighbors when its rank moved by more than the tolerance, so the run
//! converges; without one, every vertex keeps signalling and the run is bounded
//! by the engine's iteration limit.

use crate::engine::{Context, ProgramEdge, ProgramEdgeMut, ProgramVertex, ProgramVertexMut, VertexProgram};
use crate::graph::EdgeDirection;

#[derive(Debug, Clone)]
pub struct PageRank {
    /// Damping factor
    pub damping: f64,
    /// Smallest rank change that reschedules neighbors
    pub tolerance: Option<f64>,
    delta: f64,
}

impl Default for PageRank {
    fn default() -> Self {
        Self {
            damping: 0.85,
            tolerance: Some(1e-3),
            delta: 0.0,
        }
    }
}

impl PageRank {
    pub fn new(damping: f64, tolerance: Option<f64>) -> Self {
        Self {
            damping,
            tolerance,
            delta: 0.0,
        }
    }

    /// Fixed-round PageRank: every vertex signals its out-neighbors after each update
    pub fn fixed(damping: f64) -> Self {
        Self::new(damping, None)
    }
}

impl VertexProgram for PageRank {
    type VertexData = f64;
    type EdgeData = ();
    type Gather = f64;
    type Message = ();

    fn gather(&self, _ctx: &Context<'_, ()>, _vertex: ProgramVertex<'_, Self>, edge: ProgramEdge<'_, Self>) -> f64 {
        let source = edge.source();
        let out_degree = source.num_out_edges().max(1) as f64;
        *source.data() / out_degree
    }

    fn apply(&mut self, _ctx: &Context<'_, ()>, vertex: &mut ProgramVertexMut<'_, Self>, total: f64) {
        let rank = (1.0 - self.damping) + self.damping * total;
        self.delta = (rank - *vertex.data()).abs();
        *vertex.data_mut() = rank;
    }

    fn scatter_edges(&self, _ctx: &Context<'_, ()>, _vertex: ProgramVertex<'_, Self>) -> EdgeDirection {
        match self.tolerance {
            Some(tolerance) if self.delta <= tolerance => EdgeDirection::None,
            _ => EdgeDirection::Out,
        }
    }

    fn scatter(&self, ctx: &Context<'_, ()>, _vertex: ProgramVertex<'_, Self>, edge: &ProgramEdgeMut<'_, Self>) {
        ctx.signal(edge.target().id(), ());
    }
}
