//! Alternate-predecessor bookkeeping for N-best lattice construction.
//!
//! Viterbi recombination in [`crate::active_list::ActiveList::add`] keeps
//! only the highest-scoring token per destination signature and would
//! otherwise discard every other path reaching that state. This module
//! archives the losers so [`crate::lattice::builder`] can still explore them
//! as alternate back-paths when building the word lattice.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::token::{Token, TokenId};

/// `Token -> [Token]` map from a winning token to the losing tokens that were
/// recombined away at its search-graph state.
///
/// Writes are guarded by a single `RwLock` rather than a lock-free or
/// per-key-striped structure: within one utterance decode the search driver
/// is the only writer, so the lock exists to uphold the *safe to share*
/// contract, not to support genuine write contention. A lock-free structure
/// would be the natural next step for a decoder serving multiple scorer
/// worker threads that write directly into the map.
#[derive(Default)]
pub struct AlternateHypothesisManager {
    alternates: RwLock<HashMap<TokenId, Vec<Token>>>,
    max_edges: usize,
}

impl AlternateHypothesisManager {
    pub fn new(max_edges: usize) -> Self {
        AlternateHypothesisManager {
            alternates: RwLock::new(HashMap::new()),
            max_edges: max_edges.max(1),
        }
    }

    /// Record `loser` as an alternate path into the state currently won by
    /// `winner`. Skipped when `loser` and `winner` share the same
    /// predecessor — in that case the two paths diverge only in a single
    /// already-scored arc, not in any earlier word-level choice, so recording
    /// it would not add a distinct lattice back-path.
    pub fn add_alternate(&self, winner: &Token, loser: Token) {
        let same_predecessor = match (winner.predecessor(), loser.predecessor()) {
            (Some(w), Some(l)) => w.id() == l.id(),
            (None, None) => true,
            _ => false,
        };
        if same_predecessor {
            return;
        }
        let mut guard = self.alternates.write().expect("alternate map poisoned");
        guard.entry(winner.id()).or_default().push(loser);
    }

    pub fn has_alternates(&self, winner_id: TokenId) -> bool {
        let guard = self.alternates.read().expect("alternate map poisoned");
        guard.get(&winner_id).is_some_and(|v| !v.is_empty())
    }

    pub fn get_alternates(&self, winner_id: TokenId) -> Vec<Token> {
        let guard = self.alternates.read().expect("alternate map poisoned");
        guard.get(&winner_id).cloned().unwrap_or_default()
    }

    /// Truncate every list to `max_edges - 1` entries, keeping the
    /// highest-scoring losers.
    pub fn purge(&self) {
        let mut guard = self.alternates.write().expect("alternate map poisoned");
        let cap = self.max_edges.saturating_sub(1);
        for list in guard.values_mut() {
            list.sort_by(|a, b| {
                b.score()
                    .partial_cmp(&a.score())
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            list.truncate(cap);
        }
    }

    pub fn len(&self) -> usize {
        self.alternates.read().expect("alternate map poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::SearchState;
    use std::sync::Arc;

    fn state(sig: u64) -> SearchState {
        SearchState {
            signature: sig,
            is_emitting: true,
            is_final: false,
            is_word: false,
            word: None,
        }
    }

    #[test]
    fn records_loser_with_distinct_predecessor() {
        let root_a = Arc::new(Token::initial(0, state(0)));
        let root_b = Arc::new(Token::initial(1, state(0)));
        let winner = Token::successor(2, state(1), root_a, -1.0, 0.0, 0.0, 1);
        let loser = Token::successor(3, state(1), root_b, -2.0, 0.0, 0.0, 1);

        let mgr = AlternateHypothesisManager::new(4);
        mgr.add_alternate(&winner, loser.clone());

        assert!(mgr.has_alternates(winner.id()));
        let alts = mgr.get_alternates(winner.id());
        assert_eq!(alts.len(), 1);
        assert_eq!(alts[0].id(), loser.id());
    }

    #[test]
    fn skips_loser_sharing_predecessor() {
        let root = Arc::new(Token::initial(0, state(0)));
        let winner = Token::successor(1, state(1), root.clone(), -1.0, 0.0, 0.0, 1);
        let loser = Token::successor(2, state(1), root, -2.0, 0.0, 0.0, 1);

        let mgr = AlternateHypothesisManager::new(4);
        mgr.add_alternate(&winner, loser);

        assert!(!mgr.has_alternates(winner.id()));
    }

    #[test]
    fn purge_keeps_highest_scoring_losers_within_cap() {
        let root_a = Arc::new(Token::initial(0, state(0)));
        let root_b = Arc::new(Token::initial(1, state(0)));
        let root_c = Arc::new(Token::initial(2, state(0)));
        let winner = Token::successor(3, state(1), root_a, -1.0, 0.0, 0.0, 1);
        let loser1 = Token::successor(4, state(1), root_b, -5.0, 0.0, 0.0, 1);
        let loser2 = Token::successor(5, state(1), root_c, -2.0, 0.0, 0.0, 1);

        // max_edges = 2 -> keep at most 1 alternate
        let mgr = AlternateHypothesisManager::new(2);
        mgr.add_alternate(&winner, loser1);
        mgr.add_alternate(&winner, loser2.clone());
        mgr.purge();

        let alts = mgr.get_alternates(winner.id());
        assert_eq!(alts.len(), 1);
        assert_eq!(alts[0].id(), loser2.id());
    }

    #[test]
    fn empty_manager_reports_no_alternates() {
        let mgr = AlternateHypothesisManager::new(4);
        assert!(mgr.is_empty());
        assert!(!mgr.has_alternates(123));
        assert!(mgr.get_alternates(123).is_empty());
    }
}
