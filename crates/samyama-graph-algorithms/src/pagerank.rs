//! PageRank algorithm implementation
//!
//! Uses the unnormalized formulation `rank = (1 - d) + d * sum(rank(u) / out_degree(u))`.

use super::common::{GraphView, NodeId};
use ndarray::{Array1, Array2};
use std::collections::HashMap;

/// PageRank configuration
pub struct PageRankConfig {
    /// Damping factor (usually 0.85)
    pub damping_factor: f64,
    /// Maximum number of iterations
    pub iterations: usize,
    /// Stop once the summed absolute change falls below this
    pub tolerance: f64,
}

impl Default for PageRankConfig {
    fn default() -> Self {
        Self {
            damping_factor: 0.85,
            iterations: 20,
            tolerance: 0.0001,
        }
    }
}

/// Calculate PageRank for the graph view, starting every node at 1.0
pub fn page_rank(view: &GraphView, config: PageRankConfig) -> HashMap<NodeId, f64> {
    let n = view.node_count;
    if n == 0 {
        return HashMap::new();
    }

    let mut scores = vec![1.0; n];
    let mut next_scores = vec![0.0; n];
    let d = config.damping_factor;
    let base_score = 1.0 - d;

    for _ in 0..config.iterations {
        let mut total_diff = 0.0;
        for i in 0..n {
            let sum_incoming: f64 = view
                .predecessors(i)
                .iter()
                .map(|&source_idx| scores[source_idx] / view.out_degree(source_idx) as f64)
                .sum();
            next_scores[i] = base_score + d * sum_incoming;
            total_diff += (next_scores[i] - scores[i]).abs();
        }

        // Swap buffers
        scores.copy_from_slice(&next_scores);

        if total_diff < config.tolerance {
            break;
        }
    }

    view.index_to_node.iter().copied().zip(scores).collect()
}

/// Exact ranks after `iterations` synchronous updates from `initial`
/// (indexed like `view.index_to_node`), computed as a power of the affine
/// update map: `[x; 1] -> [[d * M, (1 - d) * 1], [0, 1]] [x; 1]`.
pub fn page_rank_closed_form(view: &GraphView, damping: f64, initial: &[f64], iterations: u32) -> Vec<f64> {
    let n = view.node_count;
    assert_eq!(initial.len(), n, "one initial rank per node");

    let mut step = Array2::<f64>::zeros((n + 1, n + 1));
    for target in 0..n {
        for &source in view.predecessors(target) {
            step[[target, source]] += damping / view.out_degree(source) as f64;
        }
        step[[target, n]] = 1.0 - damping;
    }
    step[[n, n]] = 1.0;

    let power = matrix_power(step, iterations);
    let mut state = Array1::<f64>::ones(n + 1);
    for (i, &rank) in initial.iter().enumerate() {
        state[i] = rank;
    }
    let result = power.dot(&state);
    result.iter().take(n).copied().collect()
}

fn matrix_power(mut base: Array2<f64>, mut exponent: u32) -> Array2<f64> {
    let mut result = Array2::<f64>::eye(base.nrows());
    while exponent > 0 {
        if exponent & 1 == 1 {
            result = result.dot(&base);
        }
        base = base.dot(&base);
        exponent >>= 1;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagerank_star() {
        // Center 0 points to leaves 1 and 2, which point back
        let view = GraphView::from_pairs(&[], &[(0, 1), (0, 2), (1, 0), (2, 0)]);
        let scores = page_rank(
            &view,
            PageRankConfig {
                iterations: 200,
                tolerance: 1e-12,
                ..Default::default()
            },
        );
        assert!(scores[&0] > scores[&1]);
        assert!((scores[&0] - 0.405 / 0.2775).abs() < 1e-9);
    }

    #[test]
    fn test_closed_form_matches_iteration() {
        let view = GraphView::from_pairs(&[], &[(0, 1), (1, 2), (2, 3), (3, 0), (0, 2)]);
        let iterated = page_rank(
            &view,
            PageRankConfig {
                iterations: 7,
                tolerance: 0.0,
                ..Default::default()
            },
        );
        let exact = page_rank_closed_form(&view, 0.85, &[1.0; 4], 7);
        for (idx, id) in view.index_to_node.iter().enumerate() {
            assert!((iterated[id] - exact[idx]).abs() < 1e-12);
        }
    }
}
