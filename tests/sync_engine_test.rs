use samyama_gas::algo::{collect_vertex_data, PageRank};
use samyama_gas::cluster::Cluster;
use samyama_gas::engine::{
    Context, Engine, EngineError, Phase, ProgramEdge, ProgramVertex, ProgramVertexMut, SynchronousEngine,
    TerminationReason, VertexProgram,
};
use samyama_gas::graph::{DistributedGraph, EdgeDirection, ModuloPartitioner, VertexId};
use samyama_gas::scheduler::Summed;
use samyama_gas::{EngineConfig, MachineContext};
use samyama_graph_algorithms::{page_rank_closed_form, GraphView};
use std::sync::Arc;

fn ring(len: u64) -> Vec<(u64, u64)> {
    (0..len).map(|i| (i, (i + 1) % len)).collect()
}

async fn build<V>(machine: &MachineContext, edges: &[(u64, u64)], initial: impl Fn(u64) -> V) -> DistributedGraph<V, ()>
where
    V: Clone + Send + Sync + 'static,
{
    let mut graph = DistributedGraph::with_partitioner(machine, Arc::new(ModuloPartitioner)).unwrap();
    if machine.id() == 0 {
        let mut ids: Vec<u64> = edges.iter().flat_map(|&(s, t)| [s, t]).collect();
        ids.sort_unstable();
        ids.dedup();
        for id in ids {
            graph.add_vertex(VertexId::new(id), initial(id)).unwrap();
        }
        for &(s, t) in edges {
            graph.add_edge(VertexId::new(s), VertexId::new(t), ()).unwrap();
        }
    }
    graph.finalize().await.unwrap();
    graph
}

async fn check_pagerank_cycle(initial: [f64; 4], rounds: usize) {
    let view = GraphView::from_pairs(&[], &ring(4));
    let expected = page_rank_closed_form(&view, 0.85, &initial, rounds as u32);

    for machines in 1..=4 {
        let results = Cluster::new(machines)
            .unwrap()
            .run(move |machine| async move {
                let graph = build(&machine, &ring(4), |id| initial[id as usize]).await;
                let config = EngineConfig::default().with_max_iterations(rounds);
                let mut engine = SynchronousEngine::new(&graph, PageRank::fixed(0.85), config).unwrap();
                engine.signal_all(());
                let summary = engine.start().await.unwrap();
                (summary, collect_vertex_data(&graph).await.unwrap())
            })
            .await
            .unwrap();

        for (summary, ranks) in &results {
            assert_eq!(summary.reason, TerminationReason::IterationLimit);
            assert_eq!(summary.iterations, rounds);
            assert_eq!(summary.updates, 4 * rounds as u64);
            for (idx, &id) in view.index_to_node.iter().enumerate() {
                let rank = ranks[&VertexId::new(id)];
                assert!(
                    (rank - expected[idx]).abs() < 1e-12,
                    "{} machines: vertex {} has {} instead of {}",
                    machines,
                    id,
                    rank,
                    expected[idx]
                );
            }
        }
    }
}

#[tokio::test]
async fn test_pagerank_cycle_matches_closed_form() {
    check_pagerank_cycle([1.0, 2.0, 3.0, 4.0], 6).await;
}

#[tokio::test]
async fn test_pagerank_cycle_from_uniform_base_rank() {
    // Every vertex starts at the base rank 1 - d
    for rounds in [1, 5, 20] {
        check_pagerank_cycle([0.15; 4], rounds).await;
    }
}

/// Counts activations and remembers the last merged message
#[derive(Clone, Default)]
struct Tally {
    received: f64,
    resignal_until: Option<usize>,
    stop_at: Option<usize>,
    panic_on: Option<u64>,
}

impl VertexProgram for Tally {
    type VertexData = (u32, f64);
    type EdgeData = ();
    type Gather = u32;
    type Message = Summed;

    fn init(&mut self, _ctx: &Context<'_, Summed>, _vertex: ProgramVertex<'_, Self>, message: Summed) {
        self.received = message.0;
    }

    fn gather_edges(&self, _ctx: &Context<'_, Summed>, _vertex: ProgramVertex<'_, Self>) -> EdgeDirection {
        EdgeDirection::In
    }

    fn gather(&self, _ctx: &Context<'_, Summed>, _vertex: ProgramVertex<'_, Self>, _edge: ProgramEdge<'_, Self>) -> u32 {
        1
    }

    fn apply(&mut self, ctx: &Context<'_, Summed>, vertex: &mut ProgramVertexMut<'_, Self>, _total: u32) {
        if self.panic_on == Some(vertex.id().as_u64()) {
            panic!("vertex {} refused", vertex.id());
        }
        let data = vertex.data_mut();
        data.0 += 1;
        data.1 = self.received;
        if self.stop_at == Some(ctx.iteration()) {
            ctx.stop();
        }
        if self.resignal_until.is_some_and(|last| ctx.iteration() < last) {
            ctx.signal(vertex.id(), Summed(1.0));
        }
    }

    fn scatter_edges(&self, _ctx: &Context<'_, Summed>, _vertex: ProgramVertex<'_, Self>) -> EdgeDirection {
        EdgeDirection::None
    }
}

#[tokio::test]
async fn test_signals_coalesce_into_one_activation() {
    let results = Cluster::new(3)
        .unwrap()
        .run(|machine| async move {
            let graph = build(&machine, &ring(6), |_| (0u32, 0.0)).await;
            let mut engine = SynchronousEngine::new(&graph, Tally::default(), EngineConfig::default()).unwrap();
            // Every machine signals vertex 4 twice
            engine.signal(VertexId::new(4), Summed(1.0));
            engine.signal(VertexId::new(4), Summed(2.0));
            let summary = engine.start().await.unwrap();
            (summary, collect_vertex_data(&graph).await.unwrap())
        })
        .await
        .unwrap();

    for (summary, data) in &results {
        assert_eq!(summary.reason, TerminationReason::Converged);
        assert_eq!(summary.iterations, 1);
        assert_eq!(summary.updates, 1);
        assert_eq!(data[&VertexId::new(4)], (1, 9.0));
        assert_eq!(data[&VertexId::new(3)], (0, 0.0));
    }
}

#[tokio::test]
async fn test_quiet_program_terminates_after_one_round() {
    let results = Cluster::new(2)
        .unwrap()
        .run(|machine| async move {
            let graph = build(&machine, &ring(5), |_| (0u32, 0.0)).await;
            let mut engine = SynchronousEngine::new(&graph, Tally::default(), EngineConfig::default()).unwrap();
            let idle = engine.start().await.unwrap();
            engine.signal_all(Summed(1.0));
            let busy = engine.start().await.unwrap();
            (idle, busy, engine.num_active())
        })
        .await
        .unwrap();

    for (idle, busy, remaining) in &results {
        assert_eq!((idle.reason, idle.iterations, idle.updates), (TerminationReason::Converged, 0, 0));
        assert_eq!((busy.reason, busy.iterations, busy.updates), (TerminationReason::Converged, 1, 5));
        assert_eq!(*remaining, 0);
    }
}

#[tokio::test]
async fn test_iteration_limit_and_stop() {
    let results = Cluster::new(2)
        .unwrap()
        .run(|machine| async move {
            let graph = build(&machine, &ring(4), |_| (0u32, 0.0)).await;

            let forever = Tally {
                resignal_until: Some(usize::MAX),
                ..Default::default()
            };
            let config = EngineConfig::default().with_max_iterations(3);
            let mut limited = SynchronousEngine::new(&graph, forever.clone(), config).unwrap();
            limited.signal_all(Summed(1.0));
            let limited = limited.start().await.unwrap();

            let stopping = Tally {
                stop_at: Some(1),
                ..forever
            };
            let mut stopped = SynchronousEngine::new(&graph, stopping, EngineConfig::default()).unwrap();
            stopped.signal(VertexId::new(0), Summed(1.0));
            let stopped = stopped.start().await.unwrap();
            (limited, stopped)
        })
        .await
        .unwrap();

    for (limited, stopped) in &results {
        assert_eq!(limited.reason, TerminationReason::IterationLimit);
        assert_eq!(limited.iterations, 3);
        assert_eq!(limited.updates, 12);
        // The stop requested in round 1 takes effect at the next barrier
        assert_eq!(stopped.reason, TerminationReason::Stopped);
        assert_eq!(stopped.iterations, 2);
    }
}

#[tokio::test]
async fn test_panicking_program_fails_run() {
    let results = Cluster::new(2)
        .unwrap()
        .run(|machine| async move {
            let graph = build(&machine, &ring(4), |_| (0u32, 0.0)).await;
            let program = Tally {
                panic_on: Some(3),
                ..Default::default()
            };
            let mut engine = SynchronousEngine::new(&graph, program, EngineConfig::default()).unwrap();
            engine.signal_all(Summed(1.0));
            let result = engine.start().await.map(|s| s.reason);
            (result, engine.num_active())
        })
        .await
        .unwrap();

    // Vertex 3 is owned by machine 1
    match &results[1].0 {
        Err(EngineError::VertexProgram { vertex, phase, message }) => {
            assert_eq!(*vertex, VertexId::new(3));
            assert_eq!(*phase, Phase::Apply);
            assert!(message.contains("refused"));
        }
        other => panic!("unexpected result {:?}", other),
    }
    assert_eq!(results[0].0, Err(EngineError::RemoteFailure { machine: 1 }));
    assert!(results.iter().all(|r| r.1 == 0));
}

#[tokio::test]
async fn test_engine_restarts_after_stop() {
    let results = Cluster::new(2)
        .unwrap()
        .run(|machine| async move {
            let graph = build(&machine, &ring(4), |_| (0u32, 0.0)).await;
            let mut engine = SynchronousEngine::new(&graph, Tally::default(), EngineConfig::default()).unwrap();
            engine.stop_handle().stop();
            engine.signal_all(Summed(1.0));
            let stopped = engine.start().await.unwrap();
            let left = engine.num_active();
            engine.signal_all(Summed(1.0));
            let resumed = engine.start().await.unwrap();
            (stopped, left, resumed)
        })
        .await
        .unwrap();

    for (stopped, left, resumed) in &results {
        assert_eq!((stopped.reason, stopped.iterations, stopped.updates), (TerminationReason::Stopped, 0, 0));
        assert_eq!(*left, 0);
        assert_eq!((resumed.reason, resumed.iterations, resumed.updates), (TerminationReason::Converged, 1, 4));
    }
}
