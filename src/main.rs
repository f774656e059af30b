use anyhow::Context as _;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use samyama_gas::algo::{collect_vertex_data, ConnectedComponents, PageRank, ShortestPaths};
use samyama_gas::engine::{AsynchronousEngine, Engine, SynchronousEngine};
use samyama_gas::graph::{DistributedGraph, VertexId};
use samyama_gas::scheduler::MinValue;
use samyama_gas::{Cluster, GasConfig, MachineContext, SchedulerKind};
use std::sync::Arc;

const NUM_VERTICES: u64 = 2_000;
const EDGES_PER_VERTEX: u64 = 4;
const SEED: u64 = 42;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    println!("Samyama GAS Engine v{}", samyama_gas::version());
    println!("==========================================");

    let config = match std::env::args().nth(1) {
        Some(path) => GasConfig::from_file(&path).with_context(|| format!("loading {}", path))?,
        None => GasConfig::default(),
    };
    println!(
        "Cluster: {} machines, {:?} placement",
        config.cluster.machines, config.cluster.partitioner
    );
    println!();

    let cluster = Cluster::new(config.cluster.machines)?;
    let config = Arc::new(config);
    let reports = cluster
        .run(move |machine| {
            let config = Arc::clone(&config);
            async move { run_machine(machine, config).await }
        })
        .await?;

    // Every machine computes the same summaries; print machine 0's
    for line in reports.into_iter().next().transpose()?.unwrap_or_default() {
        println!("{}", line);
    }
    Ok(())
}

/// Deterministic random edges, split across machines by source id
fn random_edges(machine: &MachineContext) -> Vec<(u64, u64, f64)> {
    let mut rng = StdRng::seed_from_u64(SEED);
    let mut edges = Vec::new();
    for source in 0..NUM_VERTICES {
        for _ in 0..EDGES_PER_VERTEX {
            let target = rng.gen_range(0..NUM_VERTICES);
            let weight = rng.gen_range(1.0..10.0);
            if source as usize % machine.num_machines() == machine.id() && target != source {
                edges.push((source, target, weight));
            }
        }
    }
    edges.sort_by_key(|&(s, t, _)| (s, t));
    edges.dedup_by_key(|e| (e.0, e.1));
    edges
}

async fn build_graph<V, E>(
    machine: &MachineContext,
    config: &GasConfig,
    initial: impl Fn(VertexId) -> V,
    edge_data: impl Fn(f64) -> E,
) -> anyhow::Result<DistributedGraph<V, E>>
where
    V: Clone + Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    let mut graph = DistributedGraph::with_partitioner(machine, config.cluster.partitioner.build())?;
    for id in 0..NUM_VERTICES {
        if id as usize % machine.num_machines() == machine.id() {
            let id = VertexId::new(id);
            graph.add_vertex(id, initial(id))?;
        }
    }
    for (s, t, w) in random_edges(machine) {
        graph.add_edge(VertexId::new(s), VertexId::new(t), edge_data(w))?;
    }
    graph.finalize().await?;
    Ok(graph)
}

async fn run_machine(machine: MachineContext, config: Arc<GasConfig>) -> anyhow::Result<Vec<String>> {
    let mut report = Vec::new();

    // Demo 1: PageRank on the synchronous engine
    let graph = build_graph(&machine, &config, |_| 1.0, |_| ()).await?;
    let mut engine = SynchronousEngine::new(&graph, PageRank::default(), config.engine.clone())?;
    engine.signal_all(());
    let summary = engine.start().await?;
    let ranks = collect_vertex_data(&graph).await?;
    let mut top: Vec<(VertexId, f64)> = ranks.into_iter().collect();
    top.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    report.push(format!(
        "=== PageRank (synchronous) ===\n{} vertices, {} edges: {} after {} rounds, {} updates in {:?}",
        graph.num_vertices()?,
        graph.num_edges()?,
        summary.reason,
        summary.iterations,
        summary.updates,
        summary.elapsed
    ));
    for (id, rank) in top.iter().take(5) {
        report.push(format!("  {} rank {:.4}", id, rank));
    }

    // Demo 2: connected components on the asynchronous engine
    let graph = build_graph(&machine, &config, ConnectedComponents::initial_label, |_| ()).await?;
    let mut engine = AsynchronousEngine::new(&graph, ConnectedComponents::new(), config.engine.clone())?;
    engine.signal_all(());
    let summary = engine.start().await?;
    let labels = collect_vertex_data(&graph).await?;
    let mut components: Vec<u64> = labels.values().copied().collect();
    components.sort_unstable();
    components.dedup();
    report.push(format!(
        "\n=== Connected components (asynchronous, {:?} consistency) ===\n{} components: {} with {} updates in {:?}",
        config.engine.consistency,
        components.len(),
        summary.reason,
        summary.updates,
        summary.elapsed
    ));

    // Demo 3: shortest paths with the priority scheduler
    let graph = build_graph(&machine, &config, |_| f64::INFINITY, |w| w).await?;
    let engine_config = config.engine.clone().with_scheduler(SchedulerKind::Priority);
    let mut engine = AsynchronousEngine::new(&graph, ShortestPaths::new(), engine_config)?;
    engine.signal(VertexId::new(0), MinValue(0.0));
    let summary = engine.start().await?;
    let reached = graph
        .map_reduce_vertices(|v| u64::from(v.data().is_finite()), |a, b| a + b)
        .await?
        .unwrap_or(0);
    let farthest = graph
        .map_reduce_vertices(
            |v| if v.data().is_finite() { *v.data() } else { 0.0 },
            f64::max,
        )
        .await?
        .unwrap_or(0.0);
    report.push(format!(
        "\n=== Shortest paths from {} (asynchronous, priority) ===\n{} reachable, farthest at {:.2}: {} with {} updates in {:?}",
        VertexId::new(0),
        reached,
        farthest,
        summary.reason,
        summary.updates,
        summary.elapsed
    ));

    Ok(report)
}
