//! Free recall scoring and transition analysis.
//!
//! Raw study and recall events are scored into a [`TrialTable`] of merged
//! trial records, which the transition engine then reduces to per-subject
//! conditional response probabilities and clustering ranks.

pub mod analysis;
pub mod compound;
pub mod config;
pub mod engine;
pub mod error;
pub mod measures;
pub mod model;
pub mod parser;
pub mod report;
pub mod scoring;
pub mod statistics;
pub mod traits;
pub mod transitions;

pub use error::{AnalysisError, Result};
pub use model::{Event, Phase, TrialRecord, TrialTable, Value};
pub use scoring::{merge_free_recall, merge_lists, ScoreOptions};
pub use transitions::{ItemFilter, PairTest, TransitionOptions};
