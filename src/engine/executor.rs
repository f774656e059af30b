//! GAS phase execution for one activation on one machine
//!
//! Every call into user code goes through [`guarded`], so a panicking
//! program surfaces as [`EngineError::VertexProgram`] instead of tearing down
//! the machine task.

use super::context::Context;
use super::program::VertexProgram;
use super::{EngineError, EngineResult};
use crate::graph::{EdgeDirection, EdgeMut, LocalGraph, LocalVid, VertexId, VertexMut};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Init,
    GatherEdges,
    Gather,
    Apply,
    ScatterEdges,
    Scatter,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Init => "init",
            Phase::GatherEdges => "gather_edges",
            Phase::Gather => "gather",
            Phase::Apply => "apply",
            Phase::ScatterEdges => "scatter_edges",
            Phase::Scatter => "scatter",
        };
        write!(f, "{}", name)
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Run one piece of user code, converting a panic into an error
pub(crate) fn guarded<T>(vertex: VertexId, phase: Phase, f: impl FnOnce() -> T) -> EngineResult<T> {
    catch_unwind(AssertUnwindSafe(f)).map_err(|payload| EngineError::VertexProgram {
        vertex,
        phase,
        message: panic_message(payload),
    })
}

type Graph<P> = LocalGraph<<P as VertexProgram>::VertexData, <P as VertexProgram>::EdgeData>;

/// `init` then `gather_edges`, on the owner
pub(crate) fn begin<P: VertexProgram>(
    program: &mut P,
    ctx: &Context<'_, P::Message>,
    graph: &Graph<P>,
    lvid: LocalVid,
    message: P::Message,
) -> EngineResult<EdgeDirection> {
    let vertex = graph.vertex(lvid);
    let id = vertex.id();
    guarded(id, Phase::Init, || program.init(ctx, vertex, message))?;
    guarded(id, Phase::GatherEdges, || program.gather_edges(ctx, vertex))
}

/// Combine `gather` over the local edges of `lvid`. `None` when no local
/// edge is selected.
pub(crate) fn gather_local<P: VertexProgram>(
    program: &P,
    ctx: &Context<'_, P::Message>,
    graph: &Graph<P>,
    lvid: LocalVid,
    direction: EdgeDirection,
) -> EngineResult<Option<P::Gather>> {
    let vertex = graph.vertex(lvid);
    let mut total: Option<P::Gather> = None;
    for edge in vertex.edges(direction) {
        let value = guarded(vertex.id(), Phase::Gather, || program.gather(ctx, vertex, edge))?;
        match total.as_mut() {
            Some(t) => *t += value,
            None => total = Some(value),
        }
    }
    Ok(total)
}

/// Fold a partial result into a running total
pub(crate) fn combine<G: std::ops::AddAssign>(total: &mut Option<G>, partial: Option<G>) {
    if let Some(partial) = partial {
        match total.as_mut() {
            Some(t) => *t += partial,
            None => *total = Some(partial),
        }
    }
}

/// `apply` then `scatter_edges`, on the owner
pub(crate) fn apply<P: VertexProgram>(
    program: &mut P,
    ctx: &Context<'_, P::Message>,
    graph: &Graph<P>,
    lvid: LocalVid,
    total: Option<P::Gather>,
) -> EngineResult<EdgeDirection> {
    let id = graph.vertex(lvid).id();
    guarded(id, Phase::Apply, || {
        let mut vertex = VertexMut::new(graph, lvid);
        program.apply(ctx, &mut vertex, total.unwrap_or_default());
    })?;
    let vertex = graph.vertex(lvid);
    guarded(id, Phase::ScatterEdges, || program.scatter_edges(ctx, vertex))
}

/// Run `scatter` over the local edges of `lvid`. Returns the number of edges visited.
pub(crate) fn scatter_local<P: VertexProgram>(
    program: &P,
    ctx: &Context<'_, P::Message>,
    graph: &Graph<P>,
    lvid: LocalVid,
    direction: EdgeDirection,
) -> EngineResult<usize> {
    let vertex = graph.vertex(lvid);
    let mut visited = 0;
    for edge in vertex.edges(direction) {
        let edge = EdgeMut::new(edge);
        guarded(vertex.id(), Phase::Scatter, || program.scatter(ctx, vertex, &edge))?;
        visited += 1;
    }
    Ok(visited)
}
