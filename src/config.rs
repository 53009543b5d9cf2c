//! Decoder configuration.
//!
//! Grouped into typed sub-records (`BeamConfig`, `WordQuotaConfig`, ...)
//! deserialized with `serde` + `#[serde(default)]` so a partial TOML
//! document is legal. This is never a process-wide `OnceLock` singleton:
//! `log_base` and every other knob here must be an explicit parameter of the
//! decoder context, not a singleton, so that independent utterances can run
//! with independent configurations.

use serde::Deserialize;

use crate::error::DecoderError;

/// Absolute + relative beam policy, used both for the main active list and
/// (with different values) the word-constrained active list.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct BeamConfig {
    #[serde(default = "default_absolute_beam_width")]
    pub absolute_beam_width: usize,
    /// Log-domain relative beam width; must be `<= 0.0`. `0.0` disables the
    /// relative beam entirely (see [`crate::pruner::Pruner::commit`]) rather
    /// than keeping only tokens tied with the best score.
    #[serde(default)]
    pub relative_beam_width: f64,
}

fn default_absolute_beam_width() -> usize {
    2000
}

impl Default for BeamConfig {
    fn default() -> Self {
        BeamConfig {
            absolute_beam_width: default_absolute_beam_width(),
            relative_beam_width: 0.0,
        }
    }
}

/// Per-word pruning quotas applied by [`crate::active_list::WordActiveList`].
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct WordQuotaConfig {
    /// 0 disables the cap.
    #[serde(default)]
    pub max_paths_per_word: usize,
    #[serde(default = "default_max_filler_words")]
    pub max_filler_words: usize,
}

fn default_max_filler_words() -> usize {
    1
}

impl Default for WordQuotaConfig {
    fn default() -> Self {
        WordQuotaConfig {
            max_paths_per_word: 0,
            max_filler_words: default_max_filler_words(),
        }
    }
}

/// Top-level decoder configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub beam: BeamConfig,
    #[serde(default)]
    pub word_beam: BeamConfig,
    #[serde(default)]
    pub word_quota: WordQuotaConfig,
    #[serde(default = "default_feature_block_size")]
    pub feature_block_size: usize,
    #[serde(default = "default_strict_pruning")]
    pub strict_pruning: bool,
    #[serde(default = "default_alt_hyp_max_edges")]
    pub alt_hyp_max_edges: usize,
    #[serde(default = "default_log_base")]
    pub log_base: f64,
}

fn default_feature_block_size() -> usize {
    usize::MAX
}
fn default_strict_pruning() -> bool {
    true
}
fn default_alt_hyp_max_edges() -> usize {
    4
}
fn default_log_base() -> f64 {
    std::f64::consts::E
}

impl Default for Config {
    fn default() -> Self {
        Config {
            beam: BeamConfig::default(),
            word_beam: BeamConfig::default(),
            word_quota: WordQuotaConfig::default(),
            feature_block_size: default_feature_block_size(),
            strict_pruning: default_strict_pruning(),
            alt_hyp_max_edges: default_alt_hyp_max_edges(),
            log_base: default_log_base(),
        }
    }
}

impl Config {
    /// Parse a (possibly partial) TOML document, filling in defaults for any
    /// omitted key, then validate it.
    pub fn from_toml(text: &str) -> Result<Self, DecoderError> {
        let config: Config =
            toml::from_str(text).map_err(|e| DecoderError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that can never produce a sensible decode
    /// (fatal at `allocate` time).
    pub fn validate(&self) -> Result<(), DecoderError> {
        if self.beam.absolute_beam_width == 0 {
            return Err(DecoderError::Config(
                "absolute_beam_width must be > 0".into(),
            ));
        }
        if self.beam.relative_beam_width > 0.0 {
            return Err(DecoderError::Config(
                "relative_beam_width must be <= 0.0".into(),
            ));
        }
        if self.alt_hyp_max_edges == 0 {
            return Err(DecoderError::Config("alt_hyp_max_edges must be > 0".into()));
        }
        if !(self.log_base > 1.0) {
            return Err(DecoderError::Config("log_base must be > 1.0".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let c = Config::default();
        assert_eq!(c.beam.absolute_beam_width, 2000);
        assert_eq!(c.beam.relative_beam_width, 0.0);
        assert_eq!(c.word_quota.max_filler_words, 1);
        assert_eq!(c.word_quota.max_paths_per_word, 0);
        assert!(c.strict_pruning);
        assert_eq!(c.log_base, std::f64::consts::E);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let c = Config::from_toml("[beam]\nabsolute_beam_width = 500\n").unwrap();
        assert_eq!(c.beam.absolute_beam_width, 500);
        assert_eq!(c.beam.relative_beam_width, 0.0);
        assert_eq!(c.word_quota.max_filler_words, 1);
    }

    #[test]
    fn rejects_zero_beam_width() {
        let c = Config {
            beam: BeamConfig {
                absolute_beam_width: 0,
                relative_beam_width: 0.0,
            },
            ..Config::default()
        };
        assert!(c.validate().is_err());
    }

    #[test]
    fn rejects_positive_relative_beam() {
        let c = Config {
            beam: BeamConfig {
                absolute_beam_width: 10,
                relative_beam_width: 1.0,
            },
            ..Config::default()
        };
        assert!(c.validate().is_err());
    }

    #[test]
    fn empty_toml_is_all_defaults() {
        let c = Config::from_toml("").unwrap();
        assert_eq!(c.beam.absolute_beam_width, Config::default().beam.absolute_beam_width);
    }
}
