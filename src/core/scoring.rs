//! Scoring engine — schema counts and the mismatch baseline per narrative.
//!
//! Constructed only from a finished [`DictionaryCache`], so every cue's
//! dictionary exists before any narrative is scored. All operations are pure
//! reads of that cache and can run concurrently.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHasher};
use std::hash::{Hash, Hasher};
use thiserror::Error;

use crate::core::config::{MismatchBaseline, ScoringConfig};
use crate::core::dictionary::DictionaryCache;
use crate::schema::narrative::{normalize_cue, Corpus, Narrative};
use crate::schema::score::{NarrativeOutcome, SchemaMatch, ScoreResult};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScoringError {
    #[error("no dictionary for cue '{0}'")]
    UnknownCue(String),
    #[error("working size {requested} exceeds dictionary build size {build_size}")]
    WorkingSizeTooLarge { requested: usize, build_size: usize },
}

/// Word → rank position within one cue's full dictionary.
type RankIndex = FxHashMap<String, usize>;

pub struct ScoringEngine {
    cache: DictionaryCache,
    ranks: FxHashMap<String, RankIndex>,
    /// Corpus cues with a dictionary, sorted.
    cues: Vec<String>,
    num_words: usize,
    baseline: MismatchBaseline,
}

impl ScoringEngine {
    /// `corpus_cues` is every distinct cue observed in the corpus. Cues with
    /// no dictionary (failed in Phase 1) are left out of every baseline.
    pub fn new<I, S>(
        cache: DictionaryCache,
        corpus_cues: I,
        config: &ScoringConfig,
    ) -> Result<Self, ScoringError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if config.num_words_to_use > cache.build_size() {
            return Err(ScoringError::WorkingSizeTooLarge {
                requested: config.num_words_to_use,
                build_size: cache.build_size(),
            });
        }

        let mut cues: Vec<String> = Vec::new();
        for cue in corpus_cues {
            let cue = normalize_cue(cue.as_ref());
            if cache.contains(&cue) {
                cues.push(cue);
            } else {
                tracing::warn!(cue = %cue, "cue has no dictionary; excluded from baselines");
            }
        }
        cues.sort();
        cues.dedup();

        let ranks = cues
            .par_iter()
            .filter_map(|cue| {
                let dictionary = cache.get(cue)?;
                let mut index = RankIndex::default();
                index.reserve(dictionary.len());
                for (rank, word) in dictionary.words().enumerate() {
                    index.entry(word.to_string()).or_insert(rank);
                }
                Some((cue.clone(), index))
            })
            .collect();

        Ok(Self {
            cache,
            ranks,
            cues,
            num_words: config.num_words_to_use,
            baseline: config.mismatch_baseline,
        })
    }

    pub fn cache(&self) -> &DictionaryCache {
        &self.cache
    }

    pub fn into_cache(self) -> DictionaryCache {
        self.cache
    }

    pub fn cues(&self) -> &[String] {
        &self.cues
    }

    pub fn num_words(&self) -> usize {
        self.num_words
    }

    /// Tokens of `tokens` inside `cue`'s dictionary truncated to `num_words`,
    /// in narrative order with repeats. `cue` is normalized first.
    pub fn schema_score<S: AsRef<str>>(
        &self,
        cue: &str,
        tokens: &[S],
        num_words: usize,
    ) -> Result<SchemaMatch, ScoringError> {
        self.check_working_size(num_words)?;
        let cue = normalize_cue(cue);
        let index = self
            .ranks
            .get(&cue)
            .ok_or(ScoringError::UnknownCue(cue))?;

        let matched: Vec<String> = tokens
            .iter()
            .map(AsRef::as_ref)
            .filter(|tok| index.get(*tok).is_some_and(|&rank| rank < num_words))
            .map(str::to_string)
            .collect();

        Ok(SchemaMatch {
            count: matched.len(),
            matched,
        })
    }

    /// Mean schema count of `tokens` over the other cues' dictionaries.
    ///
    /// NaN when there is no other cue.
    pub fn mismatch_score<S: AsRef<str>>(
        &self,
        cue: &str,
        tokens: &[S],
        num_words: usize,
    ) -> Result<f64, ScoringError> {
        self.check_working_size(num_words)?;
        let cue = normalize_cue(cue);
        let others = self.baseline_cues(&cue);
        if others.is_empty() {
            return Ok(f64::NAN);
        }

        let mut total = 0usize;
        for other in &others {
            total += self.schema_score(other, tokens, num_words)?.count;
        }
        Ok(total as f64 / others.len() as f64)
    }

    /// Own-cue score and baseline for one narrative at the configured size.
    pub fn score_narrative(&self, narrative: &Narrative) -> Result<ScoreResult, ScoringError> {
        let own = self.schema_score(&narrative.cue, &narrative.tokens, self.num_words)?;
        let mismatch = self.mismatch_score(&narrative.cue, &narrative.tokens, self.num_words)?;
        Ok(ScoreResult {
            non_stopword_word_count: narrative.tokens.len(),
            schema_words_count: own.count,
            schema_words_identified: own.matched,
            schema_mismatch_count: mismatch,
        })
    }

    /// Score every narrative in parallel; outcomes follow corpus order.
    pub fn score_corpus(&self, corpus: &Corpus) -> Vec<NarrativeOutcome> {
        tracing::info!(
            narratives = corpus.len(),
            cues = self.cues.len(),
            num_words = self.num_words,
            "scoring narratives"
        );
        corpus
            .narratives
            .par_iter()
            .map(|narrative| {
                let result = self.score_narrative(narrative);
                if let Err(ref error) = result {
                    tracing::debug!(narrative = %narrative.id, %error, "narrative not scored");
                }
                NarrativeOutcome {
                    id: narrative.id,
                    cue: narrative.cue.clone(),
                    result,
                }
            })
            .collect()
    }

    /// The cues whose counts are averaged for a narrative under `cue`, which
    /// must already be normalized.
    fn baseline_cues(&self, cue: &str) -> Vec<&str> {
        let mut others: Vec<&str> = self
            .cues
            .iter()
            .map(String::as_str)
            .filter(|c| *c != cue)
            .collect();

        if let MismatchBaseline::SampledOtherCues { count, seed } = self.baseline {
            if others.len() > count {
                let mut rng = StdRng::seed_from_u64(seed ^ cue_hash(cue));
                others.shuffle(&mut rng);
                others.truncate(count);
                others.sort_unstable();
            }
        }
        others
    }

    fn check_working_size(&self, num_words: usize) -> Result<(), ScoringError> {
        if num_words > self.cache.build_size() {
            return Err(ScoringError::WorkingSizeTooLarge {
                requested: num_words,
                build_size: self.cache.build_size(),
            });
        }
        Ok(())
    }
}

fn cue_hash(cue: &str) -> u64 {
    let mut hasher = FxHasher::default();
    cue.hash(&mut hasher);
    hasher.finish()
}
