//! Frame-synchronous token-passing beam search core for a large-vocabulary
//! continuous speech recognition (LVCSR) decoder.
//!
//! This crate is the search driver, active-list/pruning, and lattice
//! construction/optimization/posterior subsystems of an LVCSR decoder. It
//! does not implement an acoustic front-end, acoustic model, or linguist
//! (dictionary/grammar/language-model graph) — those are external
//! collaborators reached through the [`graph::SearchGraph`] and
//! [`scorer::Scorer`]/[`scorer::Frontend`] traits.
//!
//! The top-level entry point is [`search_manager::SearchManager`], which owns
//! one decode's lifecycle: `allocate` -> `start_recognition` -> repeated
//! `recognize(n)` -> `stop_recognition` -> `deallocate`.

pub mod active_list;
pub mod alternate;
pub mod config;
pub mod error;
pub mod graph;
pub mod lattice;
pub mod pruner;
pub mod result;
pub mod scorer;
pub mod search_manager;
pub mod token;
pub mod trace;

pub use config::Config;
pub use error::{DecoderError, DecoderResult};
pub use result::{DecodeResult, WordResult};
pub use search_manager::{DecoderState, SearchManager};
pub use token::{log_add, log_add_base, Token, TokenId, LOG_ONE, LOG_ZERO};
