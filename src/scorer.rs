//! Acoustic scorer and frontend contracts.
//!
//! Both are external collaborators: the decoder never inspects a [`Feature`]
//! payload, and never computes likelihoods itself. The only parallelism the
//! search driver permits is *inside* [`Scorer::score_batch`] — the driver
//! always calls it once per frame with every emitting token's state, which is
//! exactly the seam a `rayon`-backed implementation needs.

use crate::graph::SearchState;

/// Default frame duration in milliseconds.
pub const DEFAULT_FRAME_DURATION_MS: u64 = 10;

/// One opaque acoustic feature vector, tagged with its frame index.
///
/// The decoder treats `data` as opaque; it exists only so scorers can
/// implement [`Scorer::score_batch`] without the frontend and scorer crates
/// needing to agree on anything beyond this type.
#[derive(Clone, Debug)]
pub struct Feature {
    pub frame_index: u64,
    pub data: Vec<f32>,
}

/// Pull interface for acoustic features.
pub trait Frontend: Send {
    /// Returns the next feature, or `None` at end-of-data.
    fn next_feature(&mut self) -> Option<Feature>;
}

/// Batched acoustic scoring for one frame across every emitting state that
/// needs a score this frame.
///
/// `score_batch` returns one log-likelihood per input state, in the same
/// order, plus the best of those scores (used by the search driver for
/// relative beaming without a second pass over the results).
pub trait Scorer: Send + Sync {
    fn score_batch(&self, frame: &Feature, states: &[SearchState]) -> BatchScore;
}

/// Result of scoring every emitting token's state against one frame.
pub struct BatchScore {
    pub scores: Vec<f64>,
    pub best_score: f64,
}

impl BatchScore {
    pub fn new(scores: Vec<f64>) -> Self {
        let best_score = scores
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max);
        BatchScore { scores, best_score }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use rayon::prelude::*;

    /// A scorer that returns a fixed per-frame log-likelihood regardless of
    /// state, optionally batching the (trivial) work across `rayon` to
    /// exercise the scorer's parallelism seam.
    pub struct ConstantScorer {
        pub per_frame_score: f64,
    }

    impl Scorer for ConstantScorer {
        fn score_batch(&self, _frame: &Feature, states: &[SearchState]) -> BatchScore {
            let scores: Vec<f64> = states.par_iter().map(|_| self.per_frame_score).collect();
            BatchScore::new(scores)
        }
    }

    /// A scorer driven by a fixed, pre-recorded score-per-frame sequence, to
    /// script scenarios like a scorer failure from a given frame onward.
    pub struct ScriptedScorer {
        pub scores_by_frame: Vec<f64>,
    }

    impl Scorer for ScriptedScorer {
        fn score_batch(&self, frame: &Feature, states: &[SearchState]) -> BatchScore {
            let s = self
                .scores_by_frame
                .get(frame.frame_index as usize)
                .copied()
                .unwrap_or(f64::NEG_INFINITY);
            BatchScore::new(vec![s; states.len()])
        }
    }

    /// A frontend that yields a fixed number of empty-payload frames.
    pub struct FixedFrameCount {
        pub remaining: u64,
        pub next_index: u64,
    }

    impl FixedFrameCount {
        pub fn new(n: u64) -> Self {
            FixedFrameCount {
                remaining: n,
                next_index: 0,
            }
        }
    }

    impl Frontend for FixedFrameCount {
        fn next_feature(&mut self) -> Option<Feature> {
            if self.remaining == 0 {
                return None;
            }
            self.remaining -= 1;
            let idx = self.next_index;
            self.next_index += 1;
            Some(Feature {
                frame_index: idx,
                data: Vec::new(),
            })
        }
    }

    #[test]
    fn batch_score_tracks_best() {
        let scores = vec![-5.0, -1.0, -3.0];
        let batch = BatchScore::new(scores);
        assert_eq!(batch.best_score, -1.0);
    }

    #[test]
    fn fixed_frame_count_terminates() {
        let mut fe = FixedFrameCount::new(2);
        assert!(fe.next_feature().is_some());
        assert!(fe.next_feature().is_some());
        assert!(fe.next_feature().is_none());
    }
}
