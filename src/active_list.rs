//! Active lists: the per-frame working set of surviving tokens, with Viterbi
//! recombination on add and beam commit at frame boundaries.
//!
//! Three variants share one contract through the [`ActiveList`] trait rather
//! than one struct with a mode flag, matching the capability-set/virtual
//! dispatch style used elsewhere in this crate for pluggable behavior seams.

use std::collections::HashMap;

use ordered_float::OrderedFloat;

use crate::alternate::AlternateHypothesisManager;
use crate::config::{BeamConfig, WordQuotaConfig};
use crate::pruner::{Pruner, SelectionStrategy};
use crate::token::Token;

/// The per-frame working set of tokens competing inside one beam.
///
/// `add` performs recombination as tokens arrive (same-signature collisions
/// keep only the higher-scoring token, the loser is archived via
/// [`AlternateHypothesisManager`]); `commit` applies the beam and returns the
/// frame's survivors in descending-score order.
pub trait ActiveList {
    /// Insert or recombine `token` at its destination signature.
    fn add(&mut self, token: Token, alternates: &AlternateHypothesisManager);

    /// Apply beam pruning to everything added since the last `commit` and
    /// return the survivors, clearing internal state for the next frame.
    fn commit(&mut self) -> Vec<Token>;

    /// Highest-scoring token currently held, before `commit`.
    fn best(&self) -> Option<&Token>;

    fn best_score(&self) -> f64 {
        self.best().map(Token::score).unwrap_or(f64::NEG_INFINITY)
    }

    /// Lowest score currently admissible under the relative beam, usable by
    /// callers deciding whether a not-yet-scored token could possibly
    /// survive.
    fn beam_threshold(&self) -> f64;

    fn worst_score(&self) -> Option<f64>;

    fn is_empty(&self) -> bool;

    fn len(&self) -> usize;

    /// This list's pruning policy, so callers can judge entry-time admission
    /// before a successor has its own acoustic score (spec §4.4).
    fn pruner(&self) -> &Pruner;

    /// Whether a not-yet-scored successor reached with `predecessor_score`
    /// may be admitted into this list before its own acoustic score is known,
    /// judged against the list's current best score. Delegates to
    /// [`Pruner::admits_before_scoring`], which is where `strict_pruning`'s
    /// timing rule actually lives.
    fn admits_before_scoring(&self, predecessor_score: f64) -> bool {
        self.pruner()
            .admits_before_scoring(predecessor_score, self.best_score())
    }
}

/// Shared recombination bookkeeping used by every variant below: a flat
/// token list plus a signature -> index map so collisions are O(1) to find.
struct Recombiner {
    tokens: Vec<Token>,
    by_signature: HashMap<u64, usize>,
}

impl Recombiner {
    fn new() -> Self {
        Recombiner {
            tokens: Vec::new(),
            by_signature: HashMap::new(),
        }
    }

    fn add(&mut self, token: Token, alternates: &AlternateHypothesisManager) {
        let sig = token.state().signature;
        match self.by_signature.get(&sig) {
            Some(&idx) => {
                let incumbent = &self.tokens[idx];
                if token.score() > incumbent.score() {
                    let loser = std::mem::replace(&mut self.tokens[idx], token);
                    alternates.add_alternate(&self.tokens[idx], loser);
                } else {
                    alternates.add_alternate(incumbent, token);
                }
            }
            None => {
                self.by_signature.insert(sig, self.tokens.len());
                self.tokens.push(token);
            }
        }
    }

    fn take(&mut self) -> Vec<Token> {
        self.by_signature.clear();
        std::mem::take(&mut self.tokens)
    }

    fn best(&self) -> Option<&Token> {
        self.tokens.iter().max_by_key(|t| OrderedFloat(t.score()))
    }

    fn worst_score(&self) -> Option<f64> {
        self.tokens
            .iter()
            .map(|t| OrderedFloat(t.score()))
            .min()
            .map(|o| o.0)
    }
}

/// Full-sort top-K active list. Simplest variant, used as the default and as
/// a correctness reference for [`PartitionedActiveList`].
pub struct SimpleActiveList {
    recombiner: Recombiner,
    pruner: Pruner,
}

impl SimpleActiveList {
    pub fn new(beam: BeamConfig, strict_pruning: bool) -> Self {
        SimpleActiveList {
            recombiner: Recombiner::new(),
            pruner: Pruner::new(
                beam.absolute_beam_width,
                beam.relative_beam_width,
                strict_pruning,
                SelectionStrategy::Simple,
            ),
        }
    }
}

impl ActiveList for SimpleActiveList {
    fn add(&mut self, token: Token, alternates: &AlternateHypothesisManager) {
        self.recombiner.add(token, alternates);
    }

    fn commit(&mut self) -> Vec<Token> {
        self.pruner.commit(self.recombiner.take())
    }

    fn best(&self) -> Option<&Token> {
        self.recombiner.best()
    }

    fn beam_threshold(&self) -> f64 {
        self.best_score() + self.pruner.relative_beam_width
    }

    fn worst_score(&self) -> Option<f64> {
        self.recombiner.worst_score()
    }

    fn is_empty(&self) -> bool {
        self.recombiner.tokens.is_empty()
    }

    fn len(&self) -> usize {
        self.recombiner.tokens.len()
    }

    fn pruner(&self) -> &Pruner {
        &self.pruner
    }
}

/// Quickselect-based top-K active list: `slice::select_nth_unstable` finds
/// the Kth-best boundary in expected-linear time instead of a full sort,
/// trading stability for speed at large beam widths.
pub struct PartitionedActiveList {
    recombiner: Recombiner,
    pruner: Pruner,
}

impl PartitionedActiveList {
    pub fn new(beam: BeamConfig, strict_pruning: bool) -> Self {
        PartitionedActiveList {
            recombiner: Recombiner::new(),
            pruner: Pruner::new(
                beam.absolute_beam_width,
                beam.relative_beam_width,
                strict_pruning,
                SelectionStrategy::Partitioned,
            ),
        }
    }
}

impl ActiveList for PartitionedActiveList {
    fn add(&mut self, token: Token, alternates: &AlternateHypothesisManager) {
        self.recombiner.add(token, alternates);
    }

    fn commit(&mut self) -> Vec<Token> {
        self.pruner.commit(self.recombiner.take())
    }

    fn best(&self) -> Option<&Token> {
        self.recombiner.best()
    }

    fn beam_threshold(&self) -> f64 {
        self.best_score() + self.pruner.relative_beam_width
    }

    fn worst_score(&self) -> Option<f64> {
        self.recombiner.worst_score()
    }

    fn is_empty(&self) -> bool {
        self.recombiner.tokens.is_empty()
    }

    fn len(&self) -> usize {
        self.recombiner.tokens.len()
    }

    fn pruner(&self) -> &Pruner {
        &self.pruner
    }
}

/// Active list that additionally enforces a per-word path quota and a
/// filler-word cap, on top of the usual absolute/relative beam.
pub struct WordActiveList {
    recombiner: Recombiner,
    pruner: Pruner,
    quota: WordQuotaConfig,
}

impl WordActiveList {
    pub fn new(beam: BeamConfig, quota: WordQuotaConfig, strict_pruning: bool) -> Self {
        WordActiveList {
            recombiner: Recombiner::new(),
            pruner: Pruner::new(
                beam.absolute_beam_width,
                beam.relative_beam_width,
                strict_pruning,
                SelectionStrategy::Simple,
            ),
            quota,
        }
    }

    /// Apply the per-word path cap after the beam has already run: keep at
    /// most `max_paths_per_word` survivors per distinct word (the token's
    /// nearest word-ancestor label, i.e. `Token::word()`), highest-scoring
    /// first; unlimited when the quota is 0. Filler tokens (conventional
    /// `<...>` tags) are additionally capped at `max_filler_words`
    /// regardless of the per-word quota, and share one quota bucket across
    /// all filler labels rather than one bucket per distinct filler tag.
    fn apply_word_quota(&self, mut tokens: Vec<Token>) -> Vec<Token> {
        if self.quota.max_paths_per_word == 0 {
            return tokens;
        }
        tokens.sort();
        let mut per_word: HashMap<Option<String>, usize> = HashMap::new();
        let mut filler_count = 0usize;
        tokens.retain(|t| {
            let word = t.word();
            let is_filler = word.is_some_and(|w| w.starts_with('<') && w.ends_with('>'));
            if is_filler {
                filler_count += 1;
                return filler_count <= self.quota.max_filler_words;
            }
            let key = word.map(|w| w.to_string());
            let count = per_word.entry(key).or_insert(0);
            *count += 1;
            *count <= self.quota.max_paths_per_word
        });
        tokens
    }
}

impl ActiveList for WordActiveList {
    fn add(&mut self, token: Token, alternates: &AlternateHypothesisManager) {
        self.recombiner.add(token, alternates);
    }

    fn commit(&mut self) -> Vec<Token> {
        let pruned = self.pruner.commit(self.recombiner.take());
        self.apply_word_quota(pruned)
    }

    fn best(&self) -> Option<&Token> {
        self.recombiner.best()
    }

    fn beam_threshold(&self) -> f64 {
        self.best_score() + self.pruner.relative_beam_width
    }

    fn worst_score(&self) -> Option<f64> {
        self.recombiner.worst_score()
    }

    fn is_empty(&self) -> bool {
        self.recombiner.tokens.is_empty()
    }

    fn len(&self) -> usize {
        self.recombiner.tokens.len()
    }

    fn pruner(&self) -> &Pruner {
        &self.pruner
    }
}
