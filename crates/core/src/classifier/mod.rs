//! Candidate filtering and classification.
//!
//! Raw indexer hits are parsed, checked against quality rule groups and the
//! search's filter arguments, and matched to a canonical identity. Accepted
//! hits become `CandidateRelease`s carrying a quality rank.

mod classifier;
mod rules;
mod types;

pub use classifier::{requested_seasons, CandidateClassifier};
pub use rules::{RuleBook, RuleError, RuleGroup, RuleSubject};
pub use types::*;
