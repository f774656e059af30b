//! Weakly connected components by label propagation
//!
//! Every vertex starts labelled with its own id (see
//! [`ConnectedComponents::initial_label`]) and repeatedly adopts the smallest
//! label among its neighbors, ignoring edge direction. At quiescence each
//! vertex carries the smallest id of its component.

use super::common::MinLabel;
use crate::engine::{Context, ProgramEdge, ProgramEdgeMut, ProgramVertex, ProgramVertexMut, VertexProgram};
use crate::graph::{EdgeDirection, VertexId};

#[derive(Debug, Clone, Default)]
pub struct ConnectedComponents {
    changed: bool,
}

impl ConnectedComponents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn initial_label(id: VertexId) -> u64 {
        id.as_u64()
    }
}

impl VertexProgram for ConnectedComponents {
    type VertexData = u64;
    type EdgeData = ();
    type Gather = MinLabel;
    type Message = ();

    fn gather_edges(&self, _ctx: &Context<'_, ()>, _vertex: ProgramVertex<'_, Self>) -> EdgeDirection {
        EdgeDirection::All
    }

    fn gather(&self, _ctx: &Context<'_, ()>, vertex: ProgramVertex<'_, Self>, edge: ProgramEdge<'_, Self>) -> MinLabel {
        let label = *edge.other(vertex.id()).data();
        MinLabel(label)
    }

    fn apply(&mut self, _ctx: &Context<'_, ()>, vertex: &mut ProgramVertexMut<'_, Self>, total: MinLabel) {
        self.changed = total.0 < *vertex.data();
        if self.changed {
            *vertex.data_mut() = total.0;
        }
    }

    fn scatter_edges(&self, _ctx: &Context<'_, ()>, _vertex: ProgramVertex<'_, Self>) -> EdgeDirection {
        if self.changed {
            EdgeDirection::All
        } else {
            EdgeDirection::None
        }
    }

    fn scatter(&self, ctx: &Context<'_, ()>, vertex: ProgramVertex<'_, Self>, edge: &ProgramEdgeMut<'_, Self>) {
        let neighbor = edge.other(vertex.id());
        if *neighbor.data() > *vertex.data() {
            ctx.signal(neighbor.id(), ());
        }
    }
}
