use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::core::processor::NarrativeProcessor;

/// Identifies one narrative: the subject who produced it and the trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NarrativeId {
    pub subject: u64,
    pub trial: u32,
}

impl NarrativeId {
    pub fn new(subject: u64, trial: u32) -> Self {
        Self { subject, trial }
    }
}

impl std::fmt::Display for NarrativeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "subject {} trial {}", self.subject, self.trial)
    }
}

/// Normalize a cue string the way the vocabulary is keyed (trimmed, lowercase).
pub fn normalize_cue(cue: &str) -> String {
    cue.trim().to_lowercase()
}

/// One raw input row before tokenization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NarrativeRecord {
    pub subject: u64,
    pub trial: u32,
    pub cue: String,
    pub transcript: String,
}

/// A cleaned narrative: its id, cue, and tokens in source order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Narrative {
    pub id: NarrativeId,
    pub cue: String,
    pub tokens: Vec<String>,
}

/// The ordered collection of narratives scored in one run.
///
/// Narratives keep the order in which their ids were first seen; the score
/// export follows this order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Corpus {
    pub narratives: Vec<Narrative>,
}

impl Corpus {
    pub fn new(narratives: Vec<Narrative>) -> Self {
        Self { narratives }
    }

    /// Group `(narrative id, cue, token)` triples into narratives.
    ///
    /// Tokens of the same narrative are appended in arrival order and
    /// lowercased, since the vocabulary is keyed in lowercase. The cue of a
    /// narrative is taken from its first triple.
    pub fn from_triples<I, C, T>(triples: I) -> Self
    where
        I: IntoIterator<Item = (NarrativeId, C, T)>,
        C: AsRef<str>,
        T: AsRef<str>,
    {
        let mut positions: FxHashMap<NarrativeId, usize> = FxHashMap::default();
        let mut narratives: Vec<Narrative> = Vec::new();

        for (id, cue, token) in triples {
            let pos = *positions.entry(id).or_insert_with(|| {
                narratives.push(Narrative {
                    id,
                    cue: normalize_cue(cue.as_ref()),
                    tokens: Vec::new(),
                });
                narratives.len() - 1
            });
            narratives[pos].tokens.push(token.as_ref().to_lowercase());
        }

        Self { narratives }
    }

    /// Run raw records through a processor, one narrative per record.
    pub fn from_records<P>(records: &[NarrativeRecord], processor: &P) -> Self
    where
        P: NarrativeProcessor + ?Sized,
    {
        let narratives = records
            .iter()
            .map(|record| {
                let cue = normalize_cue(&record.cue);
                let tokens = processor.process(&record.transcript, &cue);
                Narrative {
                    id: NarrativeId::new(record.subject, record.trial),
                    cue,
                    tokens,
                }
            })
            .collect();
        Self { narratives }
    }

    /// Distinct cues observed in the corpus, sorted.
    pub fn cues(&self) -> BTreeSet<String> {
        self.narratives.iter().map(|n| n.cue.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.narratives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.narratives.is_empty()
    }
}

/// Load raw narrative records from a RON list.
pub fn load_records_from_ron(
    path: &std::path::Path,
) -> Result<Vec<NarrativeRecord>, crate::core::pipeline::PipelineError> {
    let contents = std::fs::read_to_string(path)?;
    let records: Vec<NarrativeRecord> = ron::from_str(&contents)?;
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn triples_group_by_id_in_first_seen_order() {
        let a = NarrativeId::new(2, 1);
        let b = NarrativeId::new(1, 1);
        let corpus = Corpus::from_triples(vec![
            (a, "Beach", "sand"),
            (b, "forest", "tree"),
            (a, "beach", "wave"),
            (b, "forest", "moss"),
        ]);

        assert_eq!(corpus.len(), 2);
        assert_eq!(corpus.narratives[0].id, a);
        assert_eq!(corpus.narratives[0].cue, "beach");
        assert_eq!(corpus.narratives[0].tokens, vec!["sand", "wave"]);
        assert_eq!(corpus.narratives[1].tokens, vec!["tree", "moss"]);
    }

    #[test]
    fn triple_tokens_are_lowercased() {
        let corpus = Corpus::from_triples(vec![
            (NarrativeId::new(1, 1), "beach", "Sand"),
            (NarrativeId::new(1, 1), "Beach", "WAVE"),
        ]);
        assert_eq!(corpus.narratives[0].tokens, vec!["sand", "wave"]);
    }

    #[test]
    fn cues_are_distinct_and_sorted() {
        let corpus = Corpus::from_triples(vec![
            (NarrativeId::new(1, 1), "forest", "a"),
            (NarrativeId::new(1, 2), "beach", "b"),
            (NarrativeId::new(2, 1), "forest", "c"),
        ]);
        let cues: Vec<String> = corpus.cues().into_iter().collect();
        assert_eq!(cues, vec!["beach", "forest"]);
    }

    #[test]
    fn narrative_id_display() {
        assert_eq!(NarrativeId::new(7, 3).to_string(), "subject 7 trial 3");
    }

    #[test]
    fn records_ron_parse() {
        let ron_text = r#"[
            (subject: 1, trial: 2, cue: "Beach", transcript: "We walked on the sand."),
        ]"#;
        let records: Vec<NarrativeRecord> = ron::from_str(ron_text).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].trial, 2);
        assert_eq!(normalize_cue(&records[0].cue), "beach");
    }
}
