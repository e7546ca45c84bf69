//! Schema Scorer — cue-typical content scoring for narratives.
//!
//! Builds a ranked dictionary of semantically related words for every cue
//! from a pretrained word-embedding space, then counts how many tokens of
//! each narrative fall inside its cue's dictionary and compares that count
//! against a mismatch baseline built from the other cues' dictionaries.

pub mod core;
pub mod schema;
