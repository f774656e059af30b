//! The vertex program contract

use super::context::Context;
use crate::graph::{EdgeDirection, EdgeMut, EdgeRef, VertexMut, VertexRef};
use crate::scheduler::Message;
use std::ops::AddAssign;

/// Read-only vertex handle for program `P`
pub type ProgramVertex<'a, P> =
    VertexRef<'a, <P as VertexProgram>::VertexData, <P as VertexProgram>::EdgeData>;

/// Read-only edge handle for program `P`
pub type ProgramEdge<'a, P> = EdgeRef<'a, <P as VertexProgram>::VertexData, <P as VertexProgram>::EdgeData>;

/// Mutable vertex handle for program `P`
pub type ProgramVertexMut<'a, P> =
    VertexMut<'a, <P as VertexProgram>::VertexData, <P as VertexProgram>::EdgeData>;

/// Mutable edge handle for program `P`
pub type ProgramEdgeMut<'a, P> = EdgeMut<'a, <P as VertexProgram>::VertexData, <P as VertexProgram>::EdgeData>;

/// A Gather-Apply-Scatter vertex program.
///
/// The engine clones a prototype for every activation; the clone travels with
/// the activation to every machine holding the vertex's edges and is dropped
/// after scatter. State set in `init` or `apply` and read in `scatter` must
/// live in the program's fields.
///
/// Gather results for one vertex are combined with `+=` in unspecified order,
/// starting from the first gathered value; `apply` receives
/// `Gather::default()` when no edge was gathered.
pub trait VertexProgram: Clone + Send + Sync + 'static {
    type VertexData: Clone + Send + Sync + 'static;
    type EdgeData: Send + Sync + 'static;
    type Gather: Clone + Default + AddAssign + Send + Sync + 'static;
    type Message: Message;

    /// Receive the merged signal message for this activation
    fn init(&mut self, _ctx: &Context<'_, Self::Message>, _vertex: ProgramVertex<'_, Self>, _message: Self::Message) {}

    /// Edges to gather over
    fn gather_edges(&self, _ctx: &Context<'_, Self::Message>, _vertex: ProgramVertex<'_, Self>) -> EdgeDirection {
        EdgeDirection::In
    }

    fn gather(
        &self,
        ctx: &Context<'_, Self::Message>,
        vertex: ProgramVertex<'_, Self>,
        edge: ProgramEdge<'_, Self>,
    ) -> Self::Gather;

    /// The only phase allowed to change vertex data
    fn apply(&mut self, ctx: &Context<'_, Self::Message>, vertex: &mut ProgramVertexMut<'_, Self>, total: Self::Gather);

    /// Edges to scatter over, decided after apply
    fn scatter_edges(&self, _ctx: &Context<'_, Self::Message>, _vertex: ProgramVertex<'_, Self>) -> EdgeDirection {
        EdgeDirection::Out
    }

    fn scatter(
        &self,
        _ctx: &Context<'_, Self::Message>,
        _vertex: ProgramVertex<'_, Self>,
        _edge: &ProgramEdgeMut<'_, Self>,
    ) {
    }
}
