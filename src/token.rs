//! Hypothesis tokens and log-domain score arithmetic.
//!
//! A [`Token`] is an immutable-after-commit node in the back-pointer forest
//! built by the search driver: a search-graph state, an accumulated score,
//! and a predecessor. Ancestry is shared via [`std::sync::Arc`] so that any
//! surviving token keeps its whole lineage alive without risking use-after-free
//! or requiring unsafe pointer arithmetic into a growable arena.

use std::sync::Arc;

use ordered_float::OrderedFloat;

use crate::graph::SearchState;

/// Floor value standing in for probability zero in the log domain.
pub const LOG_ZERO: f64 = f64::NEG_INFINITY;

/// Log-domain identity element (log of probability 1).
pub const LOG_ONE: f64 = 0.0;

/// Numerically stable `log(exp(a) + exp(b))`, in the natural-log domain.
///
/// `-infinity` operands are handled without producing `NaN`: adding a
/// [`LOG_ZERO`] to anything yields the other operand unchanged. A convenience
/// wrapper over [`log_add_base`] fixed at base `e`, which is what every
/// caller that never threads a decoder `Config` through (internal unit
/// tests, mostly) wants.
pub fn log_add(a: f64, b: f64) -> f64 {
    log_add_base(a, b, std::f64::consts::E)
}

/// Same as [`log_add`], but parameterized by `log_base` — the decoder
/// context's `Config::log_base` (spec §9: the log-math base must be an
/// explicit parameter, never an implicit process-wide constant). `a` and `b`
/// are both assumed to already be expressed in that base.
pub fn log_add_base(a: f64, b: f64, log_base: f64) -> f64 {
    if a == LOG_ZERO {
        return b;
    }
    if b == LOG_ZERO {
        return a;
    }
    let hi = a.max(b);
    let lo = a.min(b);
    let delta = lo - hi;
    if !delta.is_finite() {
        return hi;
    }
    if log_base == std::f64::consts::E {
        hi + delta.exp().ln_1p()
    } else {
        hi + (1.0 + log_base.powf(delta)).ln() / log_base.ln()
    }
}

/// Unique, stable identity for a [`Token`] independent of its score.
///
/// Used as the secondary sort key so that equal-score tokens never compare
/// equal unless they are the literal same token, and as the key type for
/// [`crate::alternate::AlternateHypothesisManager`].
pub type TokenId = u64;

/// One hypothesis node: a search-graph state plus an accumulated score and a
/// back-pointer to its predecessor.
///
/// Invariant: `score == predecessor.score + acoustic_score + language_score +
/// insertion_score`, checked by [`Token::is_score_consistent`] and exercised
/// in the unit tests below.
#[derive(Clone, Debug)]
pub struct Token {
    id: TokenId,
    state: SearchState,
    score: f64,
    acoustic_score: f64,
    language_score: f64,
    insertion_score: f64,
    frame_index: u64,
    predecessor: Option<Arc<Token>>,
    word: Option<Arc<str>>,
}

impl Token {
    /// Build the initial token at the graph's initial state, frame 0, with no
    /// predecessor. Used once per utterance by [`crate::search_manager::SearchManager`].
    pub fn initial(id: TokenId, state: SearchState) -> Self {
        let word = if state.is_word { state.word.clone() } else { None };
        Token {
            id,
            state,
            score: LOG_ONE,
            acoustic_score: LOG_ONE,
            language_score: LOG_ONE,
            insertion_score: LOG_ONE,
            frame_index: 0,
            predecessor: None,
            word,
        }
    }

    /// Build a successor token by traversing one arc from `predecessor`.
    ///
    /// `word` is the nearest word-state ancestor's word: if `state` is itself
    /// a word boundary its own word is used, otherwise the predecessor's
    /// `word()` is inherited.
    #[allow(clippy::too_many_arguments)]
    pub fn successor(
        id: TokenId,
        state: SearchState,
        predecessor: Arc<Token>,
        acoustic_score: f64,
        language_score: f64,
        insertion_score: f64,
        frame_index: u64,
    ) -> Self {
        let word = if state.is_word {
            state.word.clone()
        } else {
            predecessor.word.clone()
        };
        let score = predecessor.score + acoustic_score + language_score + insertion_score;
        Token {
            id,
            state,
            score,
            acoustic_score,
            language_score,
            insertion_score,
            frame_index,
            predecessor: Some(predecessor),
            word,
        }
    }

    /// Return a copy of this token with an updated acoustic score and total
    /// score, used when the scorer evaluates an emitting token for the
    /// current frame. Predecessor/id/state are shared, not duplicated.
    pub fn with_acoustic_score(&self, acoustic_score: f64) -> Self {
        let base = self.score - self.acoustic_score;
        Token {
            acoustic_score,
            score: base + acoustic_score,
            ..self.clone()
        }
    }

    pub fn id(&self) -> TokenId {
        self.id
    }

    pub fn score(&self) -> f64 {
        self.score
    }

    pub fn acoustic_score(&self) -> f64 {
        self.acoustic_score
    }

    pub fn language_score(&self) -> f64 {
        self.language_score
    }

    pub fn insertion_score(&self) -> f64 {
        self.insertion_score
    }

    pub fn frame(&self) -> u64 {
        self.frame_index
    }

    pub fn state(&self) -> &SearchState {
        &self.state
    }

    pub fn predecessor(&self) -> Option<&Arc<Token>> {
        self.predecessor.as_ref()
    }

    pub fn is_emitting(&self) -> bool {
        self.state.is_emitting
    }

    pub fn is_final(&self) -> bool {
        self.state.is_final
    }

    pub fn is_word(&self) -> bool {
        self.state.is_word
    }

    /// Nearest word-state ancestor's word, or `None` if no word boundary has
    /// been crossed yet.
    pub fn word(&self) -> Option<&str> {
        self.word.as_deref()
    }

    /// Checks the additive score-consistency invariant. Only meaningful for
    /// non-initial tokens.
    pub fn is_score_consistent(&self, tolerance: f64) -> bool {
        match &self.predecessor {
            Some(pred) => {
                let expected =
                    pred.score + self.acoustic_score + self.language_score + self.insertion_score;
                (self.score - expected).abs() <= tolerance
            }
            None => true,
        }
    }
}

/// Descending-score ordering with a stable tie-break on [`TokenId`], so that
/// two distinct tokens with the same score never compare equal — important
/// for `BinaryHeap`/`sort` based `ActiveList` variants.
impl PartialEq for Token {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
impl Eq for Token {}

impl PartialOrd for Token {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Token {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        OrderedFloat(other.score)
            .cmp(&OrderedFloat(self.score))
            .then_with(|| self.id.cmp(&other.id))
    }
}
