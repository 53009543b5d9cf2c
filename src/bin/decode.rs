use std::fs;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::process;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use decoder_core::config::Config;
use decoder_core::graph::{GraphArc, SearchGraph, SearchState};
use decoder_core::lattice::optimizer::{self, ScoreMerge};
use decoder_core::lattice::slf;
use decoder_core::pruner::SelectionStrategy;
use decoder_core::scorer::{BatchScore, Feature, Frontend, Scorer};
use decoder_core::search_manager::SearchManager;

/// Unwrap a Result or print the error and exit.
macro_rules! die {
    ($result:expr, $($arg:tt)*) => {
        $result.unwrap_or_else(|e| {
            eprintln!($($arg)*, e);
            process::exit(1);
        })
    };
}

#[derive(Parser)]
#[command(name = "decode", about = "Token-passing beam search decoder driver")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Decode a demo word chain against a scripted per-frame feature file
    Run {
        /// Path to a word-chain grammar file (one "word lm_score ins_score"
        /// triple per line, traversed left to right)
        grammar_file: String,
        /// Path to a feature file (one whitespace-separated acoustic
        /// log-likelihood per line, one line per frame)
        features_file: String,
        /// Path to a decoder configuration TOML file (optional)
        #[arg(long)]
        config: Option<String>,
        /// Frames consumed per `recognize` call
        #[arg(long, default_value_t = 50)]
        block_size: u64,
        /// Include filler words (`<...>`) in the printed transcript
        #[arg(long)]
        with_fillers: bool,
        /// Write the optimized lattice to this path in HTK SLF format
        #[arg(long)]
        lattice_out: Option<String>,
    },
}

/// A linear word-chain search graph: `<s> -> word_0 -> word_1 -> ... -> </s>`,
/// one emitting state per word. Standing in for a real linguist, which would
/// unfold HMM states, pronunciations, and a language model graph lazily.
struct WordChainGraph {
    words: Vec<(String, f64, f64)>,
}

impl SearchGraph for WordChainGraph {
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
        let (ref word, lm_score, insertion_score) = self.words[idx];
        let is_final = idx + 1 == self.words.len();
        vec![GraphArc {
            dest: SearchState {
                signature: (idx as u64) + 1,
                is_emitting: true,
                is_final,
                is_word: true,
                word: Some(Arc::from(word.as_str())),
            },
            lm_score,
            insertion_score,
        }]
    }
}

fn parse_grammar(path: &str) -> Vec<(String, f64, f64)> {
    let file = die!(
        fs::File::open(path),
        "failed to open grammar file {path}: {}"
    );
    BufReader::new(file)
        .lines()
        .map(|l| die!(l, "failed to read grammar line: {}"))
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(|line| {
            let mut parts = line.split_whitespace();
            let word = parts.next().unwrap_or("<unk>").to_string();
            let lm_score: f64 = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0.0);
            let insertion_score: f64 = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0.0);
            (word, lm_score, insertion_score)
        })
        .collect()
}

/// A scorer that reads one pre-recorded log-likelihood per frame from a file,
/// applying it uniformly to every emitting state queried that frame. A
/// stand-in for a real acoustic model, which would score every HMM state
/// distinctly from the feature payload.
struct ScriptedScorer {
    scores: Vec<f64>,
}

impl Scorer for ScriptedScorer {
    fn score_batch(&self, frame: &Feature, states: &[SearchState]) -> BatchScore {
        let score = self
            .scores
            .get(frame.frame_index as usize)
            .copied()
            .unwrap_or(f64::NEG_INFINITY);
        BatchScore::new(vec![score; states.len()])
    }
}

struct FileFrontend {
    scores: Vec<f64>,
    next_index: usize,
}

impl Frontend for FileFrontend {
    fn next_feature(&mut self) -> Option<Feature> {
        if self.next_index >= self.scores.len() {
            return None;
        }
        let idx = self.next_index;
        self.next_index += 1;
        Some(Feature {
            frame_index: idx as u64,
            data: Vec::new(),
        })
    }
}

fn parse_features(path: &str) -> Vec<f64> {
    let file = die!(
        fs::File::open(path),
        "failed to open features file {path}: {}"
    );
    BufReader::new(file)
        .lines()
        .map(|l| die!(l, "failed to read features line: {}"))
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(|l| {
            l.split_whitespace()
                .next()
                .and_then(|tok| tok.parse::<f64>().ok())
                .unwrap_or_else(|| {
                    eprintln!("malformed feature line: {l}");
                    process::exit(1);
                })
        })
        .collect()
}

fn load_config(path: &Option<String>) -> Config {
    match path {
        None => Config::default(),
        Some(path) => {
            let text = die!(
                fs::read_to_string(Path::new(path)),
                "failed to read config file {path}: {}"
            );
            die!(Config::from_toml(&text), "invalid configuration: {}")
        }
    }
}

fn run(
    grammar_file: &str,
    features_file: &str,
    config_path: &Option<String>,
    block_size: u64,
    with_fillers: bool,
    lattice_out: &Option<String>,
) {
    decoder_core::trace::init_tracing();

    let words = parse_grammar(grammar_file);
    let scores = parse_features(features_file);
    let config = load_config(config_path);

    let graph = WordChainGraph { words };
    let scorer = ScriptedScorer { scores: scores.clone() };
    let frontend = FileFrontend { scores, next_index: 0 };

    let mut manager = die!(
        SearchManager::new(graph, scorer, frontend, config, SelectionStrategy::Simple),
        "failed to construct search manager: {}"
    );
    die!(manager.allocate(), "allocate failed: {}");
    die!(manager.start_recognition(), "start_recognition failed: {}");

    let mut result = die!(manager.recognize(block_size), "recognize failed: {}");
    while !result.is_final() {
        result = die!(manager.recognize(block_size), "recognize failed: {}");
    }
    let final_result = die!(manager.stop_recognition(), "stop_recognition failed: {}");

    let words = final_result.get_timed_best_result(with_fillers, manager.alternates());
    if words.is_empty() {
        println!("(no recognized words)");
    }
    for w in &words {
        println!(
            "{:>6}ms - {:<6}ms  {:<20} score={:.3} conf={:.3}",
            w.begin_ms,
            w.end_ms,
            w.word,
            w.score,
            w.confidence_linear()
        );
    }

    if let Some(out_path) = lattice_out {
        let mut lattice = final_result.get_lattice(manager.alternates());
        optimizer::optimize(&mut lattice, ScoreMerge::Max, manager.config().log_base);
        let text = slf::to_slf(&lattice, decoder_core::scorer::DEFAULT_FRAME_DURATION_MS);
        die!(
            fs::write(out_path, text),
            "failed to write lattice to {out_path}: {}"
        );
        eprintln!("lattice written to {out_path}");
    }

    die!(manager.deallocate(), "deallocate failed: {}");
}

fn main() {
    let cli = Cli::parse();
    match cli.command {
        Command::Run {
            grammar_file,
            features_file,
            config,
            block_size,
            with_fillers,
            lattice_out,
        } => run(
            &grammar_file,
            &features_file,
            &config,
            block_size,
            with_fillers,
            &lattice_out,
        ),
    }
}
