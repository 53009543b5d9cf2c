//! Token forest -> lattice materialization.
//!
//! A lattice node is created only at a word boundary — a token where
//! `is_word()` holds, or the utterance's root — never for the intermediate
//! non-emitting-to-emitting-state tokens within a word. An edge between two
//! boundary nodes sums the acoustic/language/insertion scores of every token
//! along that word segment, so the edge carries the same total score the
//! per-frame tokens would have if walked one at a time. Recombination losers
//! parked in an [`AlternateHypothesisManager`] are spliced in the same way —
//! without them the lattice would only ever contain the single Viterbi-best
//! path through each search state. [`crate::lattice::optimizer`] collapses
//! the result afterward.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::alternate::AlternateHypothesisManager;
use crate::token::{Token, TokenId};

use super::{Lattice, LatticeEdge, LatticeNode, NodeId};

/// True for a token that starts a new lattice node: a word boundary, or the
/// root of the token forest (which has no predecessor to fold into).
fn is_boundary(tok: &Token) -> bool {
    tok.is_word() || tok.predecessor().is_none()
}

pub fn build(final_tokens: &[Token], alternates: &AlternateHypothesisManager) -> Lattice {
    let mut lattice = Lattice::new();
    let mut node_of: HashMap<TokenId, NodeId> = HashMap::new();
    let mut visited: HashSet<TokenId> = HashSet::new();
    let mut queue: VecDeque<Token> = VecDeque::new();

    for t in final_tokens {
        let node = ensure_node(&mut lattice, &mut node_of, t);
        if !lattice.ends.contains(&node) {
            lattice.ends.push(node);
        }
        queue.push_back(t.clone());
    }

    while let Some(tok) = queue.pop_front() {
        if !visited.insert(tok.id()) {
            continue;
        }
        let to = *node_of
            .get(&tok.id())
            .expect("every queued token already has a node");

        for alt in alternates.get_alternates(tok.id()) {
            link_segment(&mut lattice, &mut node_of, &mut queue, &alt, to);
        }
        link_segment(&mut lattice, &mut node_of, &mut queue, &tok, to);

        if tok.predecessor().is_none() {
            lattice.start.get_or_insert(to);
        }
    }

    lattice
}

fn ensure_node(lattice: &mut Lattice, node_of: &mut HashMap<TokenId, NodeId>, tok: &Token) -> NodeId {
    if let Some(&id) = node_of.get(&tok.id()) {
        return id;
    }
    lattice.nodes.push(LatticeNode {
        frame: tok.frame(),
        word: tok.state().word.clone(),
    });
    let id = lattice.nodes.len() - 1;
    node_of.insert(tok.id(), id);
    id
}

/// Walk back from `tok` (already materialized as node `to`) through its
/// non-boundary predecessors, summing scores, until the first boundary
/// predecessor — a word start or the utterance root — is reached. That
/// predecessor becomes the edge's source node and the one token re-queued
/// for further expansion; the tokens in between never get their own node.
fn link_segment(
    lattice: &mut Lattice,
    node_of: &mut HashMap<TokenId, NodeId>,
    queue: &mut VecDeque<Token>,
    tok: &Token,
    to: NodeId,
) {
    let mut acoustic_score = tok.acoustic_score();
    let mut language_score = tok.language_score();
    let mut insertion_score = tok.insertion_score();
    let mut cursor = tok.predecessor();

    loop {
        let Some(pred) = cursor else {
            return;
        };
        if is_boundary(pred) {
            let from = ensure_node(lattice, node_of, pred);
            lattice.edges.push(LatticeEdge {
                from,
                to,
                acoustic_score,
                language_score,
                insertion_score,
            });
            queue.push_back((**pred).clone());
            return;
        }
        acoustic_score += pred.acoustic_score();
        language_score += pred.language_score();
        insertion_score += pred.insertion_score();
        cursor = pred.predecessor();
    }
}
