//! HTK Standard Lattice Format (SLF) text persistence.
//!
//! A minimal but round-trippable subset: node records (`I`/`t`/`W`, word on
//! the node, per HTK convention) and link records (`J`/`S`/`E`/`a`/`l`),
//! enough to save a lattice built by [`crate::lattice::builder`] and read it
//! back with the same topology.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::error::DecoderError;

use super::{Lattice, LatticeEdge, LatticeNode, NodeId};

pub fn to_slf(lattice: &Lattice, frame_duration_ms: u64) -> String {
    let mut out = String::new();
    out.push_str("VERSION=1.1\n");
    out.push_str("base=2.718282\n");
    out.push_str(&format!("N={} L={}\n", lattice.nodes.len(), lattice.edges.len()));
    for (i, node) in lattice.nodes.iter().enumerate() {
        let t = (node.frame * frame_duration_ms) as f64 / 1000.0;
        let word = node.word.as_deref().unwrap_or("!NULL");
        out.push_str(&format!("I={i} t={t:.3} W={word}\n"));
    }
    for (i, edge) in lattice.edges.iter().enumerate() {
        out.push_str(&format!(
            "J={} S={} E={} a={:.6} l={:.6}\n",
            i, edge.from, edge.to, edge.acoustic_score, edge.language_score
        ));
    }
    out
}

pub fn from_slf(text: &str, frame_duration_ms: u64) -> Result<Lattice, DecoderError> {
    let mut node_frames: HashMap<NodeId, u64> = HashMap::new();
    let mut node_words: HashMap<NodeId, String> = HashMap::new();
    let mut edges_raw: Vec<(NodeId, NodeId, f64, f64)> = Vec::new();
    let mut max_node = 0usize;

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || !line.contains('=') {
            continue;
        }
        if line.starts_with("VERSION") || line.starts_with("base") || line.starts_with('N') {
            continue;
        }
        let fields = parse_fields(line);
        if let Some(i) = fields.get("I") {
            let idx: usize = i
                .parse()
                .map_err(|_| DecoderError::Graph("malformed SLF node id".into()))?;
            let t: f64 = fields.get("t").and_then(|v| v.parse().ok()).unwrap_or(0.0);
            let frame = if frame_duration_ms == 0 {
                0
            } else {
                ((t * 1000.0) / frame_duration_ms as f64).round() as u64
            };
            node_frames.insert(idx, frame);
            if let Some(w) = fields.get("W").filter(|w| **w != "!NULL") {
                node_words.insert(idx, w.to_string());
            }
            max_node = max_node.max(idx + 1);
        } else if fields.contains_key("J") {
            let s: usize = fields
                .get("S")
                .ok_or_else(|| DecoderError::Graph("SLF link missing S".into()))?
                .parse()
                .map_err(|_| DecoderError::Graph("malformed SLF link start".into()))?;
            let e: usize = fields
                .get("E")
                .ok_or_else(|| DecoderError::Graph("SLF link missing E".into()))?
                .parse()
                .map_err(|_| DecoderError::Graph("malformed SLF link end".into()))?;
            let a: f64 = fields.get("a").and_then(|v| v.parse().ok()).unwrap_or(0.0);
            let l: f64 = fields.get("l").and_then(|v| v.parse().ok()).unwrap_or(0.0);
            max_node = max_node.max(s + 1).max(e + 1);
            edges_raw.push((s, e, a, l));
        }
    }

    let mut nodes = vec![LatticeNode { frame: 0, word: None }; max_node];
    for (idx, frame) in node_frames {
        nodes[idx].frame = frame;
    }
    for (idx, word) in node_words {
        nodes[idx].word = Some(Arc::from(word.as_str()));
    }

    let mut edges = Vec::with_capacity(edges_raw.len());
    let mut has_incoming: HashSet<NodeId> = HashSet::new();
    let mut has_outgoing: HashSet<NodeId> = HashSet::new();
    for (s, e, a, l) in edges_raw {
        has_outgoing.insert(s);
        has_incoming.insert(e);
        edges.push(LatticeEdge {
            from: s,
            to: e,
            acoustic_score: a,
            language_score: l,
            insertion_score: 0.0,
        });
    }

    let start = (0..nodes.len()).find(|n| !has_incoming.contains(n));
    let ends = (0..nodes.len()).filter(|n| !has_outgoing.contains(n)).collect();

    Ok(Lattice {
        nodes,
        edges,
        start,
        ends,
    })
}

fn parse_fields(line: &str) -> HashMap<&str, &str> {
    line.split_whitespace()
        .filter_map(|tok| tok.split_once('='))
        .collect()
}
