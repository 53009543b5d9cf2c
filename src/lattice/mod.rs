//! Word lattice: construction from a finished token forest, structural
//! optimization (determinize/minimize node merging, parallel-edge merging,
//! hanging-node removal), forward-backward posterior computation, and
//! HTK-SLF text persistence.

pub mod builder;
pub mod optimizer;
pub mod posterior;
pub mod slf;

use std::sync::Arc;

/// Index into [`Lattice::nodes`].
pub type NodeId = usize;

#[derive(Debug, Clone)]
pub struct LatticeNode {
    pub frame: u64,
    /// `None` for a node reached only through non-word states.
    pub word: Option<Arc<str>>,
}

#[derive(Debug, Clone)]
pub struct LatticeEdge {
    pub from: NodeId,
    pub to: NodeId,
    pub acoustic_score: f64,
    pub language_score: f64,
    pub insertion_score: f64,
}

impl LatticeEdge {
    pub fn total_score(&self) -> f64 {
        self.acoustic_score + self.language_score + self.insertion_score
    }
}

/// A directed acyclic graph of search states, built once per finished
/// utterance and then optimized before being handed to callers.
#[derive(Debug, Clone, Default)]
pub struct Lattice {
    pub nodes: Vec<LatticeNode>,
    pub edges: Vec<LatticeEdge>,
    pub start: Option<NodeId>,
    pub ends: Vec<NodeId>,
}

impl Lattice {
    pub fn new() -> Self {
        Lattice::default()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn outgoing(&self, node: NodeId) -> impl Iterator<Item = &LatticeEdge> {
        self.edges.iter().filter(move |e| e.from == node)
    }

    pub fn incoming(&self, node: NodeId) -> impl Iterator<Item = &LatticeEdge> {
        self.edges.iter().filter(move |e| e.to == node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_lattice_has_no_nodes() {
        let lattice = Lattice::new();
        assert!(lattice.is_empty());
        assert_eq!(lattice.outgoing(0).count(), 0);
    }
}
