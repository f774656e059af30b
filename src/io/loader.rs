//! Line-oriented graph loading

use super::IoResult;
use crate::graph::{DistributedGraph, GraphError, GraphResult, VertexId};
use rustc_hash::FxHashSet;
use std::io::BufRead;
use tracing::debug;

/// Parses one line of `source` into graph insertions.
///
/// Parse failures are reported as [`GraphError::Parse`]; [`load_lines`]
/// fills in the file and line number.
pub type LineParser<'a, V, E> = dyn FnMut(&DistributedGraph<V, E>, &str, &str) -> GraphResult<()> + 'a;

/// Feed every line of `reader` to `parser`. Returns the number of lines read.
pub fn load_lines<V, E>(
    graph: &DistributedGraph<V, E>,
    source: &str,
    reader: impl BufRead,
    parser: &mut LineParser<'_, V, E>,
) -> IoResult<usize>
where
    V: Clone + Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    let mut count = 0;
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        parser(graph, source, &line).map_err(|e| match e {
            GraphError::Parse { reason, .. } => GraphError::Parse {
                file: source.to_string(),
                line: index + 1,
                reason,
            },
            other => other,
        })?;
        count += 1;
    }
    debug!("Machine {} loaded {} lines from {}", graph.machine().id(), count, source);
    Ok(count)
}

/// Edge-list parser: `source target [weight]` per line, `#` starts a comment.
///
/// Both endpoints are added as vertices with `vertex_data`; the weight
/// defaults to 1.0. Call it from one machine per input line only, or the
/// edges will be rejected as duplicates at finalize.
pub fn parse_edge_list(
    vertex_data: f64,
) -> impl FnMut(&DistributedGraph<f64, f64>, &str, &str) -> GraphResult<()> {
    let mut seen: FxHashSet<VertexId> = FxHashSet::default();
    move |graph, _source, line| {
        let line = line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            return Ok(());
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 2 || fields.len() > 3 {
            return Err(parse_error(format!("expected 2 or 3 fields, found {}", fields.len())));
        }
        let source = parse_id(fields[0])?;
        let target = parse_id(fields[1])?;
        let weight = match fields.get(2) {
            Some(field) => field
                .parse::<f64>()
                .map_err(|_| parse_error(format!("invalid weight '{}'", field)))?,
            None => 1.0,
        };
        for id in [source, target] {
            if seen.insert(id) {
                graph.add_vertex(id, vertex_data)?;
            }
        }
        graph.add_edge(source, target, weight)
    }
}

fn parse_id(field: &str) -> GraphResult<VertexId> {
    field
        .parse::<u64>()
        .map(VertexId::new)
        .map_err(|_| parse_error(format!("invalid vertex id '{}'", field)))
}

fn parse_error(reason: String) -> GraphError {
    GraphError::Parse {
        file: String::new(),
        line: 0,
        reason,
    }
}
