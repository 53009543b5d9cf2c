//! The linguist's search-graph contract.
//!
//! This module defines only the read-only view the search driver needs. The
//! linguist itself — pronunciation/grammar/language-model unfolding,
//! dictionary lookups, FST composition — is out of scope; the decoder only
//! ever sees [`SearchState`]/[`Arc`]-shared arcs through this trait.

use std::sync::Arc;

/// Identity and flags for one node of the linguist's search graph.
///
/// `signature` is the recombination key: two arcs whose destinations share a
/// signature are the same destination for Viterbi recombination purposes,
/// even if the linguist produced them as distinct objects (e.g. two
/// HMM-unfolding paths that happen to land on the same word-end).
#[derive(Clone, Debug)]
pub struct SearchState {
    pub signature: u64,
    pub is_emitting: bool,
    pub is_final: bool,
    pub is_word: bool,
    /// Populated only when `is_word` is true.
    pub word: Option<Arc<str>>,
}

/// One outgoing transition: destination state plus its language-model and
/// insertion log-scores.
#[derive(Clone, Debug)]
pub struct GraphArc {
    pub dest: SearchState,
    pub lm_score: f64,
    pub insertion_score: f64,
}

/// Read-only view of the linguist's search graph.
///
/// Implementations MUST be safe to call from a single decode thread and MUST
/// NOT assume the graph is finite or fully materialized ahead of time — arcs
/// may be generated lazily. `arcs()` returning an empty `Vec` is legal (a
/// dead end); the non-emitting fixed point and depth cap in
/// [`crate::search_manager`] guard against generation cycles.
pub trait SearchGraph: Send + Sync {
    fn initial_state(&self) -> SearchState;
    fn arcs(&self, state: &SearchState) -> Vec<GraphArc>;
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// A small linear graph `<s> -> w1 -> w2 -> ... -> </s>` used as a shared
    /// fixture by unit tests across modules.
    pub struct LinearGraph {
        /// one emitting state per word, each is itself the word boundary
        pub words: Vec<(&'static str, f64, f64)>, // (word, lm_score, insertion_score)
    }

    impl SearchGraph for LinearGraph {
        fn initial_state(&self) -> SearchState {
            SearchState {
                signature: 0,
                is_emitting: false,
                is_final: self.words.is_empty(),
                is_word: false,
                word: None,
            }
        }

        fn arcs(&self, state: &SearchState) -> Vec<GraphArc> {
            let idx = state.signature as usize;
            if idx >= self.words.len() {
                return Vec::new();
            }
            let (word, lm, ins) = self.words[idx];
            let is_final = idx + 1 == self.words.len();
            vec![GraphArc {
                dest: SearchState {
                    signature: (idx as u64) + 1,
                    is_emitting: true,
                    is_final,
                    is_word: true,
                    word: Some(Arc::from(word)),
                },
                lm_score: lm,
                insertion_score: ins,
            }]
        }
    }

    #[test]
    fn linear_graph_terminates_after_last_word() {
        let g = LinearGraph {
            words: vec![("hello", -0.1, 0.0)],
        };
        let init = g.initial_state();
        assert!(!init.is_final);
        let arcs = g.arcs(&init);
        assert_eq!(arcs.len(), 1);
        assert!(arcs[0].dest.is_final);
        assert!(g.arcs(&arcs[0].dest).is_empty());
    }
}
