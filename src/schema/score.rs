use serde::{Deserialize, Serialize};

use super::narrative::{Narrative, NarrativeId};

/// Tokens of a narrative that fall inside one cue's truncated dictionary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaMatch {
    pub count: usize,
    /// Matched tokens in narrative order, repeats included.
    pub matched: Vec<String>,
}

/// Score of one narrative against its own cue and the mismatch baseline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    pub non_stopword_word_count: usize,
    pub schema_words_count: usize,
    pub schema_words_identified: Vec<String>,
    /// Mean count over the other cues' dictionaries. NaN when no other cue
    /// exists, since zero is a legitimate count.
    pub schema_mismatch_count: f64,
}

impl ScoreResult {
    /// True when the mismatch baseline could not be computed.
    pub fn mismatch_undefined(&self) -> bool {
        self.schema_mismatch_count.is_nan()
    }
}

/// One row of the score export: narrative metadata joined with its score.
///
/// A narrative that could not be scored still gets a row, with no schema
/// count, no identified words and a NaN mismatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub subject: u64,
    pub trial: u32,
    pub cue: String,
    pub non_stopword_word_count: usize,
    pub schema_words_count: Option<usize>,
    pub schema_words_identified: String,
    pub schema_mismatch_count: f64,
}

impl ScoreRecord {
    pub fn join(narrative: &Narrative, result: &ScoreResult) -> Self {
        Self {
            subject: narrative.id.subject,
            trial: narrative.id.trial,
            cue: narrative.cue.clone(),
            non_stopword_word_count: result.non_stopword_word_count,
            schema_words_count: Some(result.schema_words_count),
            schema_words_identified: result.schema_words_identified.join(" "),
            schema_mismatch_count: result.schema_mismatch_count,
        }
    }

    pub fn unscored(narrative: &Narrative) -> Self {
        Self {
            subject: narrative.id.subject,
            trial: narrative.id.trial,
            cue: narrative.cue.clone(),
            non_stopword_word_count: narrative.tokens.len(),
            schema_words_count: None,
            schema_words_identified: String::new(),
            schema_mismatch_count: f64::NAN,
        }
    }

    pub fn is_scored(&self) -> bool {
        self.schema_words_count.is_some()
    }
}

/// The scoring outcome for one narrative. Failures are isolated per narrative.
#[derive(Debug)]
pub struct NarrativeOutcome {
    pub id: NarrativeId,
    pub cue: String,
    pub result: Result<ScoreResult, crate::core::scoring::ScoringError>,
}
