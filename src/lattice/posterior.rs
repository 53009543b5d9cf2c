//! Forward-backward posterior computation over a lattice's log-semiring.
//!
//! Topological order comes from `petgraph`, since a lattice is a DAG by
//! construction (no token ever points forward in time) but the raw edge list
//! doesn't carry that order. The per-edge posterior pass is independent per
//! edge given alpha/beta, so it is the one place outside
//! [`crate::scorer::Scorer::score_batch`] where `rayon` parallelism is legal.

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use rayon::prelude::*;

use crate::token::{log_add_base, LOG_ZERO};

use super::Lattice;

/// Log-domain posterior probability for every edge, indexed identically to
/// [`Lattice::edges`].
pub struct Posteriors {
    pub edge_log_posterior: Vec<f64>,
    /// Total forward log-probability mass reaching an end node; the
    /// lattice's overall acoustic+language likelihood, `alpha(terminal)`.
    pub total_log_likelihood: f64,
    /// `beta(initial)`: the same total computed backward from every end
    /// node. Kept alongside `total_log_likelihood` only so callers (and
    /// tests) can check spec invariant #6 — that the two agree within
    /// tolerance — without re-running the whole DP.
    pub backward_total_log_likelihood: f64,
}

/// `log_base` must match the base the lattice's edge scores (and therefore
/// this crate's log-domain arithmetic generally) were accumulated in —
/// `Config::log_base`, never a hardcoded constant.
pub fn compute(lattice: &Lattice, log_base: f64) -> Posteriors {
    let n = lattice.nodes.len();
    if n == 0 || lattice.start.is_none() || lattice.ends.is_empty() {
        return Posteriors {
            edge_log_posterior: vec![LOG_ZERO; lattice.edges.len()],
            total_log_likelihood: LOG_ZERO,
            backward_total_log_likelihood: LOG_ZERO,
        };
    }
    let start = lattice.start.unwrap();

    let mut out_edges: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut in_edges: Vec<Vec<usize>> = vec![Vec::new(); n];
    for (i, e) in lattice.edges.iter().enumerate() {
        out_edges[e.from].push(i);
        in_edges[e.to].push(i);
    }

    let mut graph: DiGraph<(), ()> = DiGraph::new();
    let node_idx: Vec<NodeIndex> = (0..n).map(|_| graph.add_node(())).collect();
    for e in &lattice.edges {
        graph.add_edge(node_idx[e.from], node_idx[e.to], ());
    }
    let order: Vec<usize> = toposort(&graph, None)
        .expect("a lattice built from a token forest is acyclic")
        .into_iter()
        .map(|idx| idx.index())
        .collect();

    let mut alpha = vec![LOG_ZERO; n];
    alpha[start] = 0.0;
    for &node in &order {
        if node == start {
            continue;
        }
        let mut acc = LOG_ZERO;
        for &e in &in_edges[node] {
            let edge = &lattice.edges[e];
            acc = log_add_base(acc, alpha[edge.from] + edge.total_score(), log_base);
        }
        alpha[node] = acc;
    }

    let ends: std::collections::HashSet<usize> = lattice.ends.iter().copied().collect();
    let mut beta = vec![LOG_ZERO; n];
    for &end in &lattice.ends {
        beta[end] = 0.0;
    }
    for &node in order.iter().rev() {
        if ends.contains(&node) {
            continue;
        }
        let mut acc = LOG_ZERO;
        for &e in &out_edges[node] {
            let edge = &lattice.edges[e];
            acc = log_add_base(acc, edge.total_score() + beta[edge.to], log_base);
        }
        beta[node] = acc;
    }

    let total_log_likelihood = lattice
        .ends
        .iter()
        .map(|&e| alpha[e])
        .fold(LOG_ZERO, |acc, a| log_add_base(acc, a, log_base));
    let backward_total_log_likelihood = beta[start];

    let edge_log_posterior: Vec<f64> = lattice
        .edges
        .par_iter()
        .map(|e| alpha[e.from] + e.total_score() + beta[e.to] - total_log_likelihood)
        .collect();

    Posteriors {
        edge_log_posterior,
        total_log_likelihood,
        backward_total_log_likelihood,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lattice::{LatticeEdge, LatticeNode};

    #[test]
    fn single_path_lattice_has_unit_posterior() {
        let mut lattice = Lattice::new();
        lattice.nodes = vec![
            LatticeNode { frame: 0, word: None },
            LatticeNode { frame: 1, word: None },
        ];
        lattice.edges.push(LatticeEdge {
            from: 0,
            to: 1,
            acoustic_score: -3.0,
            language_score: -1.0,
            insertion_score: 0.0,
        });
        lattice.start = Some(0);
        lattice.ends = vec![1];

        let posteriors = compute(&lattice, std::f64::consts::E);
        assert_eq!(posteriors.edge_log_posterior.len(), 1);
        assert!(posteriors.edge_log_posterior[0].abs() < 1e-9); // log(1.0)
        assert!((posteriors.total_log_likelihood - (-4.0)).abs() < 1e-9);
        assert!(
            (posteriors.total_log_likelihood - posteriors.backward_total_log_likelihood).abs()
                < 1e-9
        );
    }

    #[test]
    fn two_competing_paths_split_posterior_mass() {
        let mut lattice = Lattice::new();
        lattice.nodes = vec![
            LatticeNode { frame: 0, word: None },
            LatticeNode { frame: 1, word: None },
            LatticeNode { frame: 2, word: None },
        ];
        // 0 -> 2 directly, and 0 -> 1 -> 2, with equal total score
        lattice.edges.push(LatticeEdge { from: 0, to: 2, acoustic_score: -1.0, language_score: 0.0, insertion_score: 0.0 });
        lattice.edges.push(LatticeEdge { from: 0, to: 1, acoustic_score: -0.5, language_score: 0.0, insertion_score: 0.0 });
        lattice.edges.push(LatticeEdge { from: 1, to: 2, acoustic_score: -0.5, language_score: 0.0, insertion_score: 0.0 });
        lattice.start = Some(0);
        lattice.ends = vec![2];

        let posteriors = compute(&lattice, std::f64::consts::E);
        // both paths have equal total score -1.0, so each should carry log(0.5)
        // of the total mass into node 2
        let direct = posteriors.edge_log_posterior[0];
        let via_mid = posteriors.edge_log_posterior[1];
        assert!((direct - via_mid).abs() < 1e-9);
        assert!(
            (posteriors.total_log_likelihood - posteriors.backward_total_log_likelihood).abs()
                < 1e-9
        );
    }

    /// Spec invariant #6: forward total (`alpha(terminal)`) and backward
    /// total (`beta(initial)`) must agree within tolerance on any lattice
    /// with branching and a re-merge, not just a single path.
    #[test]
    fn forward_and_backward_totals_agree_on_a_diamond_lattice() {
        let mut lattice = Lattice::new();
        lattice.nodes = vec![
            LatticeNode { frame: 0, word: None },
            LatticeNode { frame: 1, word: Some(std::sync::Arc::from("a")) },
            LatticeNode { frame: 1, word: Some(std::sync::Arc::from("b")) },
            LatticeNode { frame: 2, word: None },
        ];
        lattice.edges = vec![
            LatticeEdge { from: 0, to: 1, acoustic_score: -0.3, language_score: -0.1, insertion_score: 0.0 },
            LatticeEdge { from: 0, to: 2, acoustic_score: -1.2, language_score: 0.0, insertion_score: 0.0 },
            LatticeEdge { from: 1, to: 3, acoustic_score: -0.7, language_score: 0.0, insertion_score: -0.2 },
            LatticeEdge { from: 2, to: 3, acoustic_score: -0.4, language_score: -0.5, insertion_score: 0.0 },
        ];
        lattice.start = Some(0);
        lattice.ends = vec![3];

        let posteriors = compute(&lattice, std::f64::consts::E);
        let tolerance = 1e-4 * posteriors.total_log_likelihood.abs().max(1.0);
        assert!(
            (posteriors.total_log_likelihood - posteriors.backward_total_log_likelihood).abs()
                <= tolerance
        );
    }

    #[test]
    fn empty_lattice_yields_no_posteriors() {
        let lattice = Lattice::new();
        let posteriors = compute(&lattice, std::f64::consts::E);
        assert!(posteriors.edge_log_posterior.is_empty());
        assert_eq!(posteriors.total_log_likelihood, LOG_ZERO);
    }
}
