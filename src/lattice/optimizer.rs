//! Lattice cleanup: determinize/minimize by merging structurally equivalent
//! nodes, collapse duplicate parallel edges, and drop nodes that cannot lie
//! on any path from the start to an end node.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use ordered_float::OrderedFloat;

use crate::token::log_add_base;

use super::{Lattice, LatticeEdge, NodeId};

/// How two parallel edges between the same pair of nodes are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreMerge {
    /// Keep only the higher-scoring edge. The default: lattices feed
    /// best-path search downstream, where a discarded lower-scoring
    /// duplicate changes nothing.
    Max,
    /// Log-sum the two edges' total scores into the kept edge's acoustic
    /// component (language/insertion zeroed out, since the merged edge no
    /// longer corresponds to one linguist transition). Needed before a
    /// posterior pass, where probability mass from merged duplicates must
    /// not be discarded.
    LogSum,
}

impl Default for ScoreMerge {
    fn default() -> Self {
        ScoreMerge::Max
    }
}

/// Collapse duplicate parallel edges, then determinize/minimize: repeatedly
/// merge nodes that share a label and an identical entering- or
/// leaving-edge set, until no such pair remains. Dangling branches left by
/// the merge (or already present from pruned-away predecessors) are dropped
/// last.
/// `log_base` only matters for `ScoreMerge::LogSum`, where it must be the
/// same base the lattice's edge scores were accumulated in (`Config::log_base`)
/// so the merged score stays comparable to every other edge in the lattice.
pub fn optimize(lattice: &mut Lattice, merge: ScoreMerge, log_base: f64) {
    merge_parallel_edges(lattice, merge, log_base);
    loop {
        let forward = merge_equivalent_nodes(lattice, merge, true, log_base);
        let backward = merge_equivalent_nodes(lattice, merge, false, log_base);
        if !forward && !backward {
            break;
        }
    }
    remove_hanging_nodes(lattice);
}

type NodeSignature = (u64, Option<Arc<str>>, Vec<(NodeId, OrderedFloat<f64>)>);

/// One direction's fixpoint of structural node merging: `by_incoming = true`
/// determinizes (nodes with the same label and the same set of entering
/// edges are one node), `false` minimizes (same label, same leaving edges).
/// Runs to its own fixpoint since one round's merges can expose new
/// equivalences the next round over.
fn merge_equivalent_nodes(
    lattice: &mut Lattice,
    merge: ScoreMerge,
    by_incoming: bool,
    log_base: f64,
) -> bool {
    let mut changed = false;
    loop {
        if lattice.nodes.is_empty() {
            break;
        }
        let mut groups: HashMap<NodeSignature, Vec<NodeId>> = HashMap::new();
        for id in 0..lattice.nodes.len() {
            let mut neighbors: Vec<(NodeId, OrderedFloat<f64>)> = if by_incoming {
                lattice.incoming(id).map(|e| (e.from, OrderedFloat(e.total_score()))).collect()
            } else {
                lattice.outgoing(id).map(|e| (e.to, OrderedFloat(e.total_score()))).collect()
            };
            neighbors.sort();
            let node = &lattice.nodes[id];
            groups.entry((node.frame, node.word.clone(), neighbors)).or_default().push(id);
        }

        let mut redirect: HashMap<NodeId, NodeId> = HashMap::new();
        for mut members in groups.into_values() {
            if members.len() <= 1 {
                continue;
            }
            members.sort_unstable();
            let rep = members[0];
            for &dup in &members[1..] {
                redirect.insert(dup, rep);
            }
        }
        if redirect.is_empty() {
            break;
        }
        changed = true;
        apply_redirect(lattice, &redirect, merge, log_base);
    }
    changed
}

/// Fold each `dup -> rep` pair in `redirect` into one node: remap every edge
/// endpoint, re-collapse any parallel edges the fold created, then drop the
/// now-orphaned duplicate nodes and compact ids.
fn apply_redirect(
    lattice: &mut Lattice,
    redirect: &HashMap<NodeId, NodeId>,
    merge: ScoreMerge,
    log_base: f64,
) {
    let resolve = |id: NodeId| -> NodeId { *redirect.get(&id).unwrap_or(&id) };

    for e in lattice.edges.iter_mut() {
        e.from = resolve(e.from);
        e.to = resolve(e.to);
    }
    if let Some(s) = lattice.start {
        lattice.start = Some(resolve(s));
    }
    for end in lattice.ends.iter_mut() {
        *end = resolve(*end);
    }
    lattice.ends.sort_unstable();
    lattice.ends.dedup();

    merge_parallel_edges(lattice, merge, log_base);

    let old_len = lattice.nodes.len();
    let mut new_id_of: Vec<Option<NodeId>> = vec![None; old_len];
    let mut new_nodes = Vec::with_capacity(old_len);
    for old_id in 0..old_len {
        if redirect.contains_key(&old_id) {
            continue;
        }
        new_id_of[old_id] = Some(new_nodes.len());
        new_nodes.push(lattice.nodes[old_id].clone());
    }

    for e in lattice.edges.iter_mut() {
        e.from = new_id_of[e.from].expect("edge endpoint was dropped by node merge");
        e.to = new_id_of[e.to].expect("edge endpoint was dropped by node merge");
    }
    if let Some(s) = lattice.start {
        lattice.start = new_id_of[s];
    }
    for end in lattice.ends.iter_mut() {
        *end = new_id_of[*end].expect("end node was dropped by node merge");
    }
    lattice.nodes = new_nodes;
}

fn merge_parallel_edges(lattice: &mut Lattice, merge: ScoreMerge, log_base: f64) {
    let mut best: HashMap<(NodeId, NodeId), LatticeEdge> = HashMap::new();
    for edge in lattice.edges.drain(..) {
        let key = (edge.from, edge.to);
        best.entry(key)
            .and_modify(|kept| match merge {
                ScoreMerge::Max => {
                    if edge.total_score() > kept.total_score() {
                        *kept = edge.clone();
                    }
                }
                ScoreMerge::LogSum => {
                    let combined = log_add_base(kept.total_score(), edge.total_score(), log_base);
                    kept.acoustic_score = combined;
                    kept.language_score = 0.0;
                    kept.insertion_score = 0.0;
                }
            })
            .or_insert(edge);
    }
    lattice.edges = best.into_values().collect();
}

/// Drop every edge touching a node that is not reachable forward from
/// `start` and backward from some entry in `ends` — branches left dangling
/// after beam pruning discarded a path mid-utterance.
pub fn remove_hanging_nodes(lattice: &mut Lattice) {
    let Some(start) = lattice.start else {
        lattice.nodes.clear();
        lattice.edges.clear();
        lattice.ends.clear();
        return;
    };
    let reachable_fwd = reachable(lattice, start, true);
    let mut reachable_bwd: HashSet<NodeId> = HashSet::new();
    for &end in &lattice.ends {
        reachable_bwd.extend(reachable(lattice, end, false));
    }
    let keep: HashSet<NodeId> = reachable_fwd.intersection(&reachable_bwd).copied().collect();

    lattice.edges.retain(|e| keep.contains(&e.from) && keep.contains(&e.to));
    lattice.ends.retain(|n| keep.contains(n));
    if !keep.contains(&start) {
        lattice.start = None;
    }
}

fn reachable(lattice: &Lattice, from: NodeId, forward: bool) -> HashSet<NodeId> {
    let mut seen = HashSet::new();
    let mut stack = vec![from];
    while let Some(n) = stack.pop() {
        if !seen.insert(n) {
            continue;
        }
        let next: Vec<NodeId> = if forward {
            lattice.outgoing(n).map(|e| e.to).collect()
        } else {
            lattice.incoming(n).map(|e| e.from).collect()
        };
        stack.extend(next);
    }
    seen
}
