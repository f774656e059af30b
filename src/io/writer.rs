//! Record output for vertices and edges

use super::IoResult;
use crate::graph::{DistributedGraph, EdgeRef, VertexRef};
use serde::Serialize;
use std::io::Write;
use std::marker::PhantomData;
use tracing::debug;

/// Renders graph elements as output records
pub trait GraphWriter<V, E> {
    fn write_vertex(&mut self, out: &mut dyn Write, vertex: VertexRef<'_, V, E>) -> IoResult<()>;

    fn write_edge(&mut self, out: &mut dyn Write, edge: EdgeRef<'_, V, E>) -> IoResult<()>;
}

/// Write every vertex owned by this machine. Returns the number of records.
pub fn write_vertices<V, E, W>(graph: &DistributedGraph<V, E>, writer: &mut W, out: &mut dyn Write) -> IoResult<usize>
where
    V: Clone + Send + Sync + 'static,
    E: Send + Sync + 'static,
    W: GraphWriter<V, E>,
{
    let local = graph.local()?;
    let mut count = 0;
    for vertex in local.owned_vertices() {
        writer.write_vertex(out, vertex)?;
        count += 1;
    }
    out.flush()?;
    debug!("Machine {} wrote {} vertices", local.machine(), count);
    Ok(count)
}

/// Write every edge homed on this machine. Returns the number of records.
pub fn write_edges<V, E, W>(graph: &DistributedGraph<V, E>, writer: &mut W, out: &mut dyn Write) -> IoResult<usize>
where
    V: Clone + Send + Sync + 'static,
    E: Send + Sync + 'static,
    W: GraphWriter<V, E>,
{
    let local = graph.local()?;
    let mut count = 0;
    for edge in local.local_edges() {
        writer.write_edge(out, edge)?;
        count += 1;
    }
    out.flush()?;
    debug!("Machine {} wrote {} edges", local.machine(), count);
    Ok(count)
}

#[derive(Serialize)]
struct VertexRecord<'a, V> {
    id: u64,
    data: &'a V,
}

#[derive(Serialize)]
struct EdgeRecord<'a, E> {
    source: u64,
    target: u64,
    data: &'a E,
}

/// One JSON object per line: `{"id":..,"data":..}` for vertices and
/// `{"source":..,"target":..,"data":..}` for edges.
pub struct JsonLinesWriter<V, E> {
    _marker: PhantomData<fn(&V, &E)>,
}

impl<V, E> JsonLinesWriter<V, E> {
    pub fn new() -> Self {
        Self { _marker: PhantomData }
    }
}

impl<V, E> Default for JsonLinesWriter<V, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Serialize, E: Serialize> GraphWriter<V, E> for JsonLinesWriter<V, E> {
    fn write_vertex(&mut self, out: &mut dyn Write, vertex: VertexRef<'_, V, E>) -> IoResult<()> {
        let data = vertex.data();
        serde_json::to_writer(
            &mut *out,
            &VertexRecord {
                id: vertex.id().as_u64(),
                data: &*data,
            },
        )?;
        out.write_all(b"\n")?;
        Ok(())
    }

    fn write_edge(&mut self, out: &mut dyn Write, edge: EdgeRef<'_, V, E>) -> IoResult<()> {
        let data = edge.data();
        serde_json::to_writer(
            &mut *out,
            &EdgeRecord {
                source: edge.source().id().as_u64(),
                target: edge.target().id().as_u64(),
                data: &*data,
            },
        )?;
        out.write_all(b"\n")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::Cluster;
    use crate::graph::{ModuloPartitioner, VertexId};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_each_element_written_once() {
        let cluster = Cluster::new(2).unwrap();
        let results = cluster
            .run(|machine| async move {
                let mut graph: DistributedGraph<String, u32> =
                    DistributedGraph::with_partitioner(&machine, Arc::new(ModuloPartitioner)).unwrap();
                if machine.id() == 0 {
                    for id in 0..3 {
                        graph.add_vertex(VertexId::new(id), format!("v{}", id)).unwrap();
                    }
                    graph.add_edge(VertexId::new(0), VertexId::new(1), 7).unwrap();
                    graph.add_edge(VertexId::new(1), VertexId::new(2), 8).unwrap();
                }
                graph.finalize().await.unwrap();

                let mut writer = JsonLinesWriter::new();
                let mut vertices = Vec::new();
                let mut edges = Vec::new();
                write_vertices(&graph, &mut writer, &mut vertices).unwrap();
                write_edges(&graph, &mut writer, &mut edges).unwrap();
                (String::from_utf8(vertices).unwrap(), String::from_utf8(edges).unwrap())
            })
            .await
            .unwrap();

        // Modulo placement: machine 0 owns 0 and 2, machine 1 owns 1
        assert_eq!(results[0].0, "{\"id\":0,\"data\":\"v0\"}\n{\"id\":2,\"data\":\"v2\"}\n");
        assert_eq!(results[1].0, "{\"id\":1,\"data\":\"v1\"}\n");
        assert_eq!(results[0].1, "{\"source\":0,\"target\":1,\"data\":7}\n");
        assert_eq!(results[1].1, "{\"source\":1,\"target\":2,\"data\":8}\n");
    }

    #[tokio::test]
    async fn test_write_before_finalize_fails() {
        let cluster = Cluster::new(1).unwrap();
        let result = cluster
            .run(|machine| async move {
                let graph: DistributedGraph<u8, u8> = DistributedGraph::new(&machine).unwrap();
                let mut out = Vec::new();
                write_vertices(&graph, &mut JsonLinesWriter::new(), &mut out).is_err()
            })
            .await
            .unwrap();
        assert!(result[0]);
    }
}
