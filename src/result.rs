//! Decode results: the token-forest snapshot handed back to callers after
//! each `recognize` call, and the flattened per-word summary derived from it.

use std::sync::Arc;

use ordered_float::OrderedFloat;

use crate::alternate::AlternateHypothesisManager;
use crate::lattice::optimizer::{self, ScoreMerge};
use crate::lattice::{self, posterior, Lattice, NodeId};
use crate::token::{log_add_base, Token, LOG_ONE, LOG_ZERO};

/// One recognized word with its frame-aligned timing and confidence.
#[derive(Debug, Clone)]
pub struct WordResult {
    pub word: Arc<str>,
    pub begin_ms: u64,
    pub end_ms: u64,
    pub score: f64,
    /// Log-domain posterior confidence, capped at `LOG_ONE`; computed from a
    /// determinized/minimized lattice's forward-backward pass (see
    /// [`crate::lattice::posterior`]). `LOG_ZERO` if the word boundary did
    /// not survive into the lattice (e.g. a hanging branch pruned mid-word).
    pub log_confidence: f64,
}

impl WordResult {
    pub fn confidence_linear(&self) -> f64 {
        self.log_confidence.exp()
    }

    /// True for conventional non-lexical tags (`<sil>`, `<unk>`, ...).
    pub fn is_filler(&self) -> bool {
        self.word.starts_with('<') && self.word.ends_with('>')
    }
}

/// Snapshot of the search state after a `recognize` call: either the active
/// tokens of an in-progress utterance, or the final token forest of a
/// completed one.
pub struct DecodeResult {
    active_tokens: Vec<Token>,
    is_final: bool,
    frame_duration_ms: u64,
    /// The decoder context's `Config::log_base`, carried along so the
    /// posterior pass this snapshot eventually runs uses the same base the
    /// tokens' scores were accumulated in.
    log_base: f64,
}

impl DecodeResult {
    pub fn new(
        active_tokens: Vec<Token>,
        is_final: bool,
        frame_duration_ms: u64,
        log_base: f64,
    ) -> Self {
        DecodeResult {
            active_tokens,
            is_final,
            frame_duration_ms,
            log_base,
        }
    }

    pub fn is_final(&self) -> bool {
        self.is_final
    }

    /// Highest-scoring token currently active, or the winning final token.
    /// `None` only for an utterance that produced no tokens at all, which is
    /// a legal, non-error outcome.
    pub fn best_token(&self) -> Option<&Token> {
        self.active_tokens
            .iter()
            .max_by_key(|t| OrderedFloat(t.score()))
    }

    pub fn active_tokens(&self) -> &[Token] {
        &self.active_tokens
    }

    /// Walk the best token's back-pointer chain and flatten it into a
    /// sequence of timed words, optionally dropping filler tags.
    ///
    /// Confidence is filled in from a forward-backward pass over the
    /// determinized/minimized lattice built from every currently surviving
    /// token (including `alternates`'s recombination losers), so a word's
    /// `log_confidence` reflects competing hypotheses, not just its own
    /// Viterbi path.
    pub fn get_timed_best_result(
        &self,
        with_fillers: bool,
        alternates: &AlternateHypothesisManager,
    ) -> Vec<WordResult> {
        let Some(best) = self.best_token() else {
            return Vec::new();
        };

        // collect (word, frame, score) at every word boundary, oldest first
        let mut boundaries: Vec<(Arc<str>, u64, f64)> = Vec::new();
        let mut cursor = Some(best);
        let mut owned: Option<Arc<Token>>;
        loop {
            let tok = match cursor {
                Some(t) => t,
                None => break,
            };
            if tok.is_word() {
                if let Some(word) = tok.state().word.clone() {
                    boundaries.push((word, tok.frame(), tok.score()));
                }
            }
            match tok.predecessor() {
                Some(pred) => {
                    owned = Some(pred.clone());
                    cursor = owned.as_deref();
                }
                None => break,
            }
        }
        boundaries.reverse();

        let mut lattice = self.get_lattice(alternates);
        optimizer::optimize(&mut lattice, ScoreMerge::Max, self.log_base);
        let posteriors = posterior::compute(&lattice, self.log_base);

        let mut results = Vec::with_capacity(boundaries.len());
        let mut prev_frame = 0u64;
        let mut prev_score = 0.0;
        for (word, frame, score) in boundaries {
            let log_confidence =
                word_boundary_log_posterior(&lattice, &posteriors, &word, frame, self.log_base);
            let wr = WordResult {
                word,
                begin_ms: prev_frame * self.frame_duration_ms,
                end_ms: frame * self.frame_duration_ms,
                score: score - prev_score,
                log_confidence,
            };
            prev_frame = frame;
            prev_score = score;
            if with_fillers || !wr.is_filler() {
                results.push(wr);
            }
        }
        results
    }

    /// Build the word lattice rooted at every currently active final token,
    /// pulling in recombination losers recorded in `alternates`.
    pub fn get_lattice(&self, alternates: &AlternateHypothesisManager) -> Lattice {
        lattice::builder::build(&self.active_tokens, alternates)
    }
}

/// Log-domain posterior for the lattice node matching `(word, end_frame)`,
/// summing over every node the optimizer left with that label and frame (the
/// common case is exactly one after determinize/minimize) and over every edge
/// entering it. `LOG_ZERO` if the word boundary did not survive pruning into
/// the lattice at all.
fn word_boundary_log_posterior(
    lattice: &Lattice,
    posteriors: &posterior::Posteriors,
    word: &str,
    end_frame: u64,
    log_base: f64,
) -> f64 {
    let matching_nodes: Vec<NodeId> = lattice
        .nodes
        .iter()
        .enumerate()
        .filter(|(_, n)| n.frame == end_frame && n.word.as_deref() == Some(word))
        .map(|(id, _)| id)
        .collect();
    if matching_nodes.is_empty() {
        return LOG_ZERO;
    }
    let mut acc = LOG_ZERO;
    for (i, edge) in lattice.edges.iter().enumerate() {
        if matching_nodes.contains(&edge.to) {
            acc = log_add_base(acc, posteriors.edge_log_posterior[i], log_base);
        }
    }
    acc.min(LOG_ONE)
}
