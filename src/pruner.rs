//! Composable beam-pruning policies.
//!
//! [`Pruner`] is a small value type, not a trait object: its policies are
//! always applied together in the same fixed order (absolute, then relative,
//! then the strict-pruning timing rule), so there is no configuration axis
//! that needs virtual dispatch here — a static-dispatch counterpart to
//! [`crate::active_list::ActiveList`]'s virtual dispatch.

use crate::token::Token;

/// How top-K selection is performed during [`Pruner::commit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionStrategy {
    /// Full sort, then truncate. O(N log N), simplest, used by
    /// [`crate::active_list::SimpleActiveList`].
    Simple,
    /// `slice::select_nth_unstable_by` (quickselect/Hoare-partition family) to
    /// find the Kth-best boundary in expected linear time before a final sort
    /// of just the surviving K, used by
    /// [`crate::active_list::PartitionedActiveList`]. Matches the
    /// `pdqselect`-based top-K extraction in the `ctclib` beam-search decoder
    /// reference.
    Partitioned,
}

/// Absolute + relative beam pruning, with a strict/lenient timing rule for
/// when entry-time pruning may happen relative to acoustic scoring.
#[derive(Debug, Clone, Copy)]
pub struct Pruner {
    pub absolute_beam_width: usize,
    pub relative_beam_width: f64,
    pub strict_pruning: bool,
    pub selection: SelectionStrategy,
}

impl Pruner {
    pub fn new(
        absolute_beam_width: usize,
        relative_beam_width: f64,
        strict_pruning: bool,
        selection: SelectionStrategy,
    ) -> Self {
        Pruner {
            absolute_beam_width,
            relative_beam_width,
            strict_pruning,
            selection,
        }
    }

    /// Apply the relative beam, then the absolute beam, to `tokens`, which
    /// MUST already be sorted or will be sorted as part of selection.
    /// Returns the survivors in descending-score order.
    pub fn commit(&self, mut tokens: Vec<Token>) -> Vec<Token> {
        if tokens.is_empty() {
            return tokens;
        }
        // `relative_beam_width >= 0.0` means the relative beam is disabled
        // (spec default `0.0 = disabled`): a zero-width beam would otherwise
        // keep only tokens tied with the best score, collapsing every frame
        // to greedy best-path.
        if self.relative_beam_width < 0.0 {
            let best_score = tokens
                .iter()
                .map(Token::score)
                .fold(f64::NEG_INFINITY, f64::max);
            let threshold = best_score + self.relative_beam_width;
            tokens.retain(|t| t.score() >= threshold);
        }

        if tokens.len() > self.absolute_beam_width {
            match self.selection {
                SelectionStrategy::Simple => {
                    tokens.sort();
                    tokens.truncate(self.absolute_beam_width);
                }
                SelectionStrategy::Partitioned => {
                    let k = self.absolute_beam_width;
                    tokens.select_nth_unstable(k.saturating_sub(1).min(tokens.len() - 1));
                    tokens.truncate(k);
                    tokens.sort();
                }
            }
        } else {
            tokens.sort();
        }
        tokens
    }

    /// Whether a token may be discarded *before* its current-frame acoustic
    /// score is known, using only its predecessor's score as an estimate.
    /// When `strict_pruning` is true this always returns true (never prune
    /// early); the caller must wait for the real acoustic score.
    pub fn admits_before_scoring(&self, predecessor_score: f64, best_score_so_far: f64) -> bool {
        if self.strict_pruning || self.relative_beam_width >= 0.0 {
            return true;
        }
        predecessor_score >= best_score_so_far + self.relative_beam_width
    }
}
