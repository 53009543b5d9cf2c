//! Frame-synchronous token-passing search driver.
//!
//! Owns the lifecycle of one decode: `allocate` -> `start_recognition` ->
//! repeated `recognize(n)` -> `stop_recognition` -> `deallocate` -> back to
//! `allocate` for the next utterance. This is the only component in the
//! crate that runs a loop across frames; everything else (scoring, pruning,
//! recombination) is a function it calls once per frame.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::active_list::{ActiveList, PartitionedActiveList, SimpleActiveList, WordActiveList};
use crate::alternate::AlternateHypothesisManager;
use crate::config::Config;
use crate::error::{DecoderError, DecoderResult};
use crate::graph::SearchGraph;
use crate::pruner::SelectionStrategy;
use crate::result::DecodeResult;
use crate::scorer::{Feature, Frontend, Scorer, DEFAULT_FRAME_DURATION_MS};
use crate::token::{Token, TokenId, LOG_ZERO};

/// Caps non-emitting fixed-point expansion so a search graph with an
/// accidental null-arc cycle fails loudly instead of hanging the decoder.
const MAX_NON_EMITTING_DEPTH: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    Idle,
    Allocated,
    Running,
    Drained,
}

fn make_active_list(config: &Config, selection: SelectionStrategy) -> Box<dyn ActiveList> {
    let quota = config.word_quota;
    // The per-word cap and the filler cap are independent policies (spec
    // §4.3): either one being active requires routing through
    // `WordActiveList`, not just the per-word cap.
    if quota.max_paths_per_word > 0 || quota.max_filler_words > 0 {
        Box::new(WordActiveList::new(
            config.word_beam,
            quota,
            config.strict_pruning,
        ))
    } else {
        match selection {
            SelectionStrategy::Simple => {
                Box::new(SimpleActiveList::new(config.beam, config.strict_pruning))
            }
            SelectionStrategy::Partitioned => {
                Box::new(PartitionedActiveList::new(config.beam, config.strict_pruning))
            }
        }
    }
}

pub struct SearchManager<G, S, F>
where
    G: SearchGraph,
    S: Scorer,
    F: Frontend,
{
    graph: G,
    scorer: S,
    frontend: F,
    config: Config,
    selection: SelectionStrategy,
    state: DecoderState,
    active: Option<Box<dyn ActiveList>>,
    alternates: AlternateHypothesisManager,
    next_token_id: TokenId,
    frame: u64,
    finished: bool,
    last_committed: Vec<Token>,
    /// Final tokens that were emitting when they reached a final state: once
    /// their own graph arcs run dry they would otherwise vanish from the
    /// active list even though they remain a valid completed hypothesis, so
    /// they are cached here by id and merged back into every snapshot.
    final_tokens: HashMap<TokenId, Token>,
}

impl<G, S, F> SearchManager<G, S, F>
where
    G: SearchGraph,
    S: Scorer,
    F: Frontend,
{
    pub fn new(
        graph: G,
        scorer: S,
        frontend: F,
        config: Config,
        selection: SelectionStrategy,
    ) -> DecoderResult<Self> {
        config.validate()?;
        let alt_max_edges = config.alt_hyp_max_edges;
        Ok(SearchManager {
            graph,
            scorer,
            frontend,
            config,
            selection,
            state: DecoderState::Idle,
            active: None,
            alternates: AlternateHypothesisManager::new(alt_max_edges),
            next_token_id: 0,
            frame: 0,
            finished: false,
            last_committed: Vec::new(),
            final_tokens: HashMap::new(),
        })
    }

    pub fn state(&self) -> DecoderState {
        self.state
    }

    pub fn alternates(&self) -> &AlternateHypothesisManager {
        &self.alternates
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn allocate(&mut self) -> DecoderResult<()> {
        if self.state != DecoderState::Idle {
            return Err(DecoderError::Graph(
                "allocate called outside the Idle state".into(),
            ));
        }
        self.active = Some(make_active_list(&self.config, self.selection));
        self.state = DecoderState::Allocated;
        Ok(())
    }

    pub fn start_recognition(&mut self) -> DecoderResult<()> {
        if self.state != DecoderState::Allocated {
            return Err(DecoderError::Graph(
                "start_recognition called outside the Allocated state".into(),
            ));
        }
        self.frame = 0;
        self.finished = false;
        self.next_token_id = 0;
        self.last_committed.clear();
        self.final_tokens.clear();

        let initial_state = self.graph.initial_state();
        let root = Token::initial(self.allocate_token_id(), initial_state);
        self.active
            .as_mut()
            .expect("allocate populates the active list")
            .add(root, &self.alternates);

        self.expand_non_emitting(0)?;
        self.state = DecoderState::Running;
        Ok(())
    }

    pub fn recognize(&mut self, num_frames: u64) -> DecoderResult<DecodeResult> {
        if self.state != DecoderState::Running {
            return Err(DecoderError::Graph(
                "recognize called outside the Running state".into(),
            ));
        }
        for _ in 0..num_frames {
            if self.finished {
                break;
            }
            match self.frontend.next_feature() {
                Some(feature) => self.process_frame(feature)?,
                None => self.finished = true,
            }
        }
        Ok(DecodeResult::new(
            self.last_committed.clone(),
            self.finished,
            DEFAULT_FRAME_DURATION_MS,
            self.config.log_base,
        ))
    }

    pub fn stop_recognition(&mut self) -> DecoderResult<DecodeResult> {
        if self.state != DecoderState::Running {
            return Err(DecoderError::Graph(
                "stop_recognition called outside the Running state".into(),
            ));
        }
        self.alternates.purge();
        self.state = DecoderState::Drained;
        Ok(DecodeResult::new(
            self.last_committed.clone(),
            true,
            DEFAULT_FRAME_DURATION_MS,
            self.config.log_base,
        ))
    }

    pub fn deallocate(&mut self) -> DecoderResult<()> {
        if self.state == DecoderState::Idle || self.state == DecoderState::Running {
            return Err(DecoderError::Graph(
                "deallocate called outside the Allocated/Drained state".into(),
            ));
        }
        self.active = None;
        self.last_committed.clear();
        self.state = DecoderState::Idle;
        Ok(())
    }

    fn allocate_token_id(&mut self) -> TokenId {
        let id = self.next_token_id;
        self.next_token_id += 1;
        id
    }

    /// Run one frame: rescore every emitting token against `feature`, expand
    /// its arcs into frame+1 candidates, then drive non-emitting expansion to
    /// a fixed point so the next call sees only emitting/final states.
    fn process_frame(&mut self, feature: Feature) -> DecoderResult<()> {
        let frontier = self.active.as_mut().unwrap().commit();
        let emitting: Vec<Token> = frontier.iter().filter(|t| t.is_emitting()).cloned().collect();
        if emitting.is_empty() {
            // Nothing left to score: every surviving token is a non-emitting
            // dead end, some of which (e.g. an immediately-final initial
            // state, or a final state that ran out of arcs) may themselves be
            // the utterance's result. Keep them, not just the scored-final
            // cache, or an all-non-emitting grammar would surface no tokens.
            self.last_committed = self.snapshot_with_finals(frontier);
            self.finished = true;
            return Ok(());
        }

        let states: Vec<_> = emitting.iter().map(|t| t.state().clone()).collect();
        let batch = self.scorer.score_batch(&feature, &states);
        if batch.scores.len() != emitting.len() {
            return Err(DecoderError::Scorer {
                frame: self.frame,
                reason: "scorer returned a different number of scores than states queried".into(),
            });
        }

        let mut next_active = make_active_list(&self.config, self.selection);
        for (token, score) in emitting.into_iter().zip(batch.scores) {
            let score = if score.is_finite() {
                score
            } else {
                tracing::warn!(frame = self.frame, "non-finite acoustic score clamped to LOG_ZERO");
                LOG_ZERO
            };
            let rescored = Arc::new(token.with_acoustic_score(score));
            if rescored.is_final() {
                self.final_tokens.insert(rescored.id(), (*rescored).clone());
            }
            if !next_active.admits_before_scoring(rescored.score()) {
                continue;
            }
            for arc in self.graph.arcs(rescored.state()) {
                let id = self.allocate_token_id();
                let successor = Token::successor(
                    id,
                    arc.dest,
                    rescored.clone(),
                    0.0,
                    arc.lm_score,
                    arc.insertion_score,
                    self.frame + 1,
                );
                next_active.add(successor, &self.alternates);
            }
        }

        self.active = Some(next_active);
        self.frame += 1;
        self.expand_non_emitting(self.frame)?;

        let committed = self.active.as_mut().unwrap().commit();
        self.last_committed = self.snapshot_with_finals(committed.clone());
        for t in committed {
            self.active.as_mut().unwrap().add(t, &self.alternates);
        }
        Ok(())
    }

    /// Merge cached final-but-now-dead-ended tokens into a live snapshot,
    /// preferring the live entry when a token id appears in both.
    fn snapshot_with_finals(&self, committed: Vec<Token>) -> Vec<Token> {
        let mut combined = committed;
        let present: HashSet<TokenId> = combined.iter().map(Token::id).collect();
        for (id, tok) in &self.final_tokens {
            if !present.contains(id) {
                combined.push(tok.clone());
            }
        }
        combined
    }

    /// Expand every non-emitting token to a fixed point: tokens that are
    /// already emitting or final pass through untouched, everything else
    /// spawns its successors and is dropped. Terminates when a whole pass
    /// produces no more non-emitting tokens, or errors past the depth cap.
    fn expand_non_emitting(&mut self, frame: u64) -> DecoderResult<()> {
        for _ in 0..MAX_NON_EMITTING_DEPTH {
            let frontier = self.active.as_mut().unwrap().commit();
            let mut any_non_emitting = false;

            for token in frontier {
                if token.is_emitting() || token.is_final() {
                    self.active.as_mut().unwrap().add(token, &self.alternates);
                    continue;
                }
                any_non_emitting = true;
                let token_arc = Arc::new(token);
                for arc in self.graph.arcs(token_arc.state()) {
                    let id = self.allocate_token_id();
                    let successor = Token::successor(
                        id,
                        arc.dest,
                        token_arc.clone(),
                        0.0,
                        arc.lm_score,
                        arc.insertion_score,
                        frame,
                    );
                    self.active.as_mut().unwrap().add(successor, &self.alternates);
                }
            }
            if !any_non_emitting {
                return Ok(());
            }
        }
        Err(DecoderError::Graph(
            "non-emitting expansion exceeded its depth cap; the search graph likely has a null-arc cycle".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::test_support::LinearGraph;
    use crate::scorer::test_support::{ConstantScorer, FixedFrameCount};

    fn manager(
        words: Vec<(&'static str, f64, f64)>,
        frames: u64,
    ) -> SearchManager<LinearGraph, ConstantScorer, FixedFrameCount> {
        SearchManager::new(
            LinearGraph { words },
            ConstantScorer { per_frame_score: -1.0 },
            FixedFrameCount::new(frames),
            Config::default(),
            SelectionStrategy::Simple,
        )
        .unwrap()
    }

    #[test]
    fn lifecycle_rejects_calls_out_of_order() {
        let mut mgr = manager(vec![("hi", -0.1, 0.0)], 2);
        assert!(mgr.start_recognition().is_err());
        assert!(mgr.recognize(1).is_err());
        mgr.allocate().unwrap();
        assert!(mgr.allocate().is_err());
        mgr.start_recognition().unwrap();
        assert_eq!(mgr.state(), DecoderState::Running);
    }

    #[test]
    fn recognizes_through_a_linear_graph_to_completion() {
        let mut mgr = manager(vec![("hello", -0.1, 0.0), ("world", -0.2, 0.0)], 3);
        mgr.allocate().unwrap();
        mgr.start_recognition().unwrap();

        let mut result = mgr.recognize(10).unwrap();
        while !result.is_final() {
            result = mgr.recognize(10).unwrap();
        }
        let words = result.get_timed_best_result(true, mgr.alternates());
        let names: Vec<_> = words.iter().map(|w| w.word.to_string()).collect();
        assert_eq!(names, vec!["hello".to_string(), "world".to_string()]);

        let stopped = mgr.stop_recognition().unwrap();
        assert!(stopped.is_final());
        mgr.deallocate().unwrap();
        assert_eq!(mgr.state(), DecoderState::Idle);
    }

    #[test]
    fn scorer_count_mismatch_is_a_scorer_error() {
        struct BadScorer;
        impl Scorer for BadScorer {
            fn score_batch(&self, _frame: &Feature, _states: &[crate::graph::SearchState]) -> crate::scorer::BatchScore {
                crate::scorer::BatchScore::new(Vec::new())
            }
        }
        let mut mgr = SearchManager::new(
            LinearGraph {
                words: vec![("hi", -0.1, 0.0)],
            },
            BadScorer,
            FixedFrameCount::new(2),
            Config::default(),
            SelectionStrategy::Simple,
        )
        .unwrap();
        mgr.allocate().unwrap();
        mgr.start_recognition().unwrap();
        let err = mgr.recognize(1).unwrap_err();
        assert!(matches!(err, DecoderError::Scorer { .. }));
    }

    /// Two branches that recombine into the same destination signature: a
    /// favored one and a disfavored one whose score gap exceeds the relative
    /// beam. `admits_before_scoring` (spec §4.4) never changes which token
    /// wins recombination — that's decided by score alone — but it decides
    /// whether the loser ever reaches `ActiveList::add` at all, and only a
    /// token that reaches `add` gets archived as a lattice alternate. Strict
    /// pruning lets the loser through to be recombined-and-archived; lenient
    /// pruning discards it before it is ever added, so no alternate is ever
    /// recorded for the winner.
    struct ConvergingGraph;

    impl SearchGraph for ConvergingGraph {
        fn initial_state(&self) -> crate::graph::SearchState {
            crate::graph::SearchState {
                signature: 0,
                is_emitting: false,
                is_final: false,
                is_word: false,
                word: None,
            }
        }

        fn arcs(&self, state: &crate::graph::SearchState) -> Vec<crate::graph::GraphArc> {
            use crate::graph::{GraphArc, SearchState};
            match state.signature {
                0 => vec![
                    GraphArc {
                        dest: SearchState { signature: 1, is_emitting: true, is_final: false, is_word: false, word: None },
                        lm_score: 0.0,
                        insertion_score: 0.0,
                    },
                    GraphArc {
                        dest: SearchState { signature: 2, is_emitting: true, is_final: false, is_word: false, word: None },
                        lm_score: 0.0,
                        insertion_score: 0.0,
                    },
                ],
                1 | 2 => vec![GraphArc {
                    dest: SearchState {
                        signature: 3,
                        is_emitting: true,
                        is_final: true,
                        is_word: true,
                        word: Some(std::sync::Arc::from("word")),
                    },
                    lm_score: 0.0,
                    insertion_score: 0.0,
                }],
                _ => Vec::new(),
            }
        }
    }

    struct ConvergingScorer;

    impl Scorer for ConvergingScorer {
        fn score_batch(&self, _frame: &Feature, states: &[crate::graph::SearchState]) -> crate::scorer::BatchScore {
            let scores = states
                .iter()
                .map(|s| match s.signature {
                    1 => -0.1,
                    2 => -10.0,
                    _ => -0.5,
                })
                .collect();
            crate::scorer::BatchScore::new(scores)
        }
    }

    fn converging_manager(strict_pruning: bool) -> SearchManager<ConvergingGraph, ConvergingScorer, FixedFrameCount> {
        let mut config = Config::default();
        config.beam.relative_beam_width = -2.0;
        config.strict_pruning = strict_pruning;
        SearchManager::new(
            ConvergingGraph,
            ConvergingScorer,
            FixedFrameCount::new(2),
            config,
            SelectionStrategy::Simple,
        )
        .unwrap()
    }

    #[test]
    fn strict_pruning_archives_a_recombination_loser_lenient_pruning_drops_it_early() {
        let mut strict = converging_manager(true);
        strict.allocate().unwrap();
        strict.start_recognition().unwrap();
        strict.recognize(1).unwrap();
        let winner = strict
            .active
            .as_ref()
            .unwrap()
            .best()
            .expect("one token survives recombination")
            .id();
        assert!(strict.alternates().has_alternates(winner));

        let mut lenient = converging_manager(false);
        lenient.allocate().unwrap();
        lenient.start_recognition().unwrap();
        lenient.recognize(1).unwrap();
        let winner = lenient
            .active
            .as_ref()
            .unwrap()
            .best()
            .expect("one token survives recombination")
            .id();
        assert!(!lenient.alternates().has_alternates(winner));
    }
}
