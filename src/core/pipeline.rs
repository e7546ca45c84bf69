//! The scoring pipeline: embeddings → dictionaries → barrier → scores.
//!
//! Wires together the embedding store, the per-cue dictionary build, and the
//! scoring engine, and owns the worker pool both phases run on.

use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use thiserror::Error;

use crate::core::config::{ConfigError, ScoringConfig};
use crate::core::dictionary::{CueFailure, DictionaryCache, DictionaryCacheBuilder, DictionaryError};
use crate::core::embedding::{EmbeddingError, EmbeddingStore};
use crate::core::export::ExportError;
use crate::core::ranker::SimilarityRanker;
use crate::core::scoring::{ScoringEngine, ScoringError};
use crate::schema::narrative::Corpus;
use crate::schema::score::{NarrativeOutcome, ScoreRecord};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),
    #[error("dictionary error: {0}")]
    Dictionary(#[from] DictionaryError),
    #[error("scoring error: {0}")]
    Scoring(#[from] ScoringError),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("export error: {0}")]
    Export(#[from] ExportError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
    #[error("no embeddings provided")]
    MissingEmbeddings,
}

/// Everything one run produced.
#[derive(Debug)]
pub struct PipelineReport {
    pub dictionaries: DictionaryCache,
    pub cue_failures: Vec<CueFailure>,
    /// Dictionaries ranked in this run rather than taken from a saved cache.
    /// Nonzero means `dictionaries` holds something a saved cache lacks.
    pub newly_built: usize,
    /// One outcome per narrative, in corpus order.
    pub outcomes: Vec<NarrativeOutcome>,
}

impl PipelineReport {
    /// One row per narrative in corpus order. Failed narratives get an
    /// unscored row so every input keeps its place in the export.
    pub fn records(&self, corpus: &Corpus) -> Vec<ScoreRecord> {
        corpus
            .narratives
            .iter()
            .zip(&self.outcomes)
            .map(|(narrative, outcome)| match outcome.result {
                Ok(ref result) => ScoreRecord::join(narrative, result),
                Err(_) => ScoreRecord::unscored(narrative),
            })
            .collect()
    }

    pub fn failed_narratives(&self) -> impl Iterator<Item = &NarrativeOutcome> {
        self.outcomes.iter().filter(|o| o.result.is_err())
    }
}

/// The top-level scorer. Built via `SchemaPipeline::builder()`.
pub struct SchemaPipeline {
    store: EmbeddingStore,
    config: ScoringConfig,
    cached: Option<DictionaryCache>,
    cancel: Option<Arc<AtomicBool>>,
    pool: rayon::ThreadPool,
}

/// Builder for constructing a `SchemaPipeline`.
pub struct SchemaPipelineBuilder {
    embeddings_path: Option<PathBuf>,
    config_path: Option<PathBuf>,
    dictionary_cache_path: Option<PathBuf>,
    cancel: Option<Arc<AtomicBool>>,
    /// Directly provided embeddings (for testing without files).
    store: Option<EmbeddingStore>,
    /// Directly provided configuration.
    config: Option<ScoringConfig>,
}

impl SchemaPipeline {
    pub fn builder() -> SchemaPipelineBuilder {
        SchemaPipelineBuilder {
            embeddings_path: None,
            config_path: None,
            dictionary_cache_path: None,
            cancel: None,
            store: None,
            config: None,
        }
    }

    pub fn store(&self) -> &EmbeddingStore {
        &self.store
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Phase 1 only: dictionaries for `cues`, built in parallel.
    pub fn build_dictionaries<I, S>(
        &self,
        cues: I,
    ) -> Result<(DictionaryCache, Vec<CueFailure>), PipelineError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let (cache, failures, _) = self.build_phase_one(cues)?;
        Ok((cache, failures))
    }

    fn build_phase_one<I, S>(
        &self,
        cues: I,
    ) -> Result<(DictionaryCache, Vec<CueFailure>, usize), PipelineError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let cues: Vec<String> = cues.into_iter().map(|c| c.as_ref().to_string()).collect();
        let mut builder = DictionaryCacheBuilder::new(
            SimilarityRanker::new(&self.store),
            self.config.num_similar_words,
        );
        if let Some(ref flag) = self.cancel {
            builder = builder.with_cancel_flag(flag.clone());
        }
        if let Some(ref cached) = self.cached {
            builder = builder.with_cached(cached.clone())?;
        }

        let newly_built = self.pool.install(|| builder.build_all(&cues))?;
        let (cache, failures) = builder.finish();

        for failure in &failures {
            tracing::warn!(cue = %failure.cue, error = %failure.error, "cue cannot be scored");
        }
        Ok((cache, failures, newly_built))
    }

    /// Both phases over `corpus`. Scoring starts only after every cue in the
    /// corpus has been attempted.
    pub fn run(&self, corpus: &Corpus) -> Result<PipelineReport, PipelineError> {
        let cues = corpus.cues();
        let (dictionaries, cue_failures, newly_built) = self.build_phase_one(&cues)?;

        let engine = ScoringEngine::new(dictionaries, &cues, &self.config)?;
        let outcomes = self.pool.install(|| engine.score_corpus(corpus));

        let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
        tracing::info!(
            scored = outcomes.len() - failed,
            failed,
            "scoring complete"
        );

        Ok(PipelineReport {
            dictionaries: engine.into_cache(),
            cue_failures,
            newly_built,
            outcomes,
        })
    }
}

impl SchemaPipelineBuilder {
    pub fn embeddings_path(mut self, path: impl AsRef<Path>) -> Self {
        self.embeddings_path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn config_path(mut self, path: impl AsRef<Path>) -> Self {
        self.config_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Reuse a saved dictionary cache if the file exists.
    pub fn dictionary_cache_path(mut self, path: impl AsRef<Path>) -> Self {
        self.dictionary_cache_path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Provide embeddings directly (for testing without files).
    pub fn with_embeddings(mut self, store: EmbeddingStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_config(mut self, config: ScoringConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn build(self) -> Result<SchemaPipeline, PipelineError> {
        let config = match (self.config, self.config_path) {
            (Some(config), _) => {
                config.validate()?;
                config
            }
            (None, Some(path)) => ScoringConfig::load_from_ron(&path)?,
            (None, None) => ScoringConfig::default(),
        };

        let store = match (self.store, self.embeddings_path) {
            (Some(store), _) => store,
            (None, Some(path)) => EmbeddingStore::load_text(&path)?,
            (None, None) => return Err(PipelineError::MissingEmbeddings),
        };

        let cached = match self.dictionary_cache_path {
            Some(ref path) if path.exists() => {
                let cache = DictionaryCache::load_ron(path)?;
                if cache.build_size() >= config.num_similar_words {
                    Some(cache)
                } else {
                    tracing::info!(
                        cached = cache.build_size(),
                        requested = config.num_similar_words,
                        "dictionary cache too small; rebuilding"
                    );
                    None
                }
            }
            _ => None,
        };

        let mut pool = rayon::ThreadPoolBuilder::new();
        if let Some(threads) = config.threads {
            pool = pool.num_threads(threads);
        }

        Ok(SchemaPipeline {
            store,
            config,
            cached,
            cancel: self.cancel,
            pool: pool.build()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::narrative::NarrativeId;
    use std::sync::atomic::Ordering;

    fn toy_pipeline(config: ScoringConfig) -> SchemaPipeline {
        let store = EmbeddingStore::from_entries(vec![
            ("beach", vec![1.0, 0.0, 0.0]),
            ("forest", vec![0.0, 1.0, 0.0]),
            ("sand", vec![0.95, 0.0, 0.3]),
            ("wave", vec![0.7, 0.6, 0.0]),
            ("tree", vec![0.0, 0.95, -0.3]),
        ])
        .unwrap();
        SchemaPipeline::builder()
            .with_embeddings(store)
            .with_config(config)
            .build()
            .unwrap()
    }

    fn config() -> ScoringConfig {
        ScoringConfig {
            num_similar_words: 5,
            num_words_to_use: 3,
            threads: Some(2),
            ..ScoringConfig::default()
        }
    }

    #[test]
    fn build_without_embeddings_fails() {
        let result = SchemaPipeline::builder().with_config(config()).build();
        assert!(matches!(result, Err(PipelineError::MissingEmbeddings)));
    }

    #[test]
    fn invalid_config_is_rejected_at_build() {
        let bad = ScoringConfig {
            num_similar_words: 2,
            num_words_to_use: 3,
            ..ScoringConfig::default()
        };
        let store = EmbeddingStore::from_entries(vec![("a", vec![1.0])]).unwrap();
        let result = SchemaPipeline::builder()
            .with_embeddings(store)
            .with_config(bad)
            .build();
        assert!(matches!(result, Err(PipelineError::Config(_))));
    }

    #[test]
    fn run_scores_in_corpus_order() {
        let pipeline = toy_pipeline(config());
        let corpus = Corpus::from_triples(vec![
            (NarrativeId::new(9, 1), "forest", "tree"),
            (NarrativeId::new(1, 1), "beach", "sand"),
            (NarrativeId::new(1, 1), "beach", "wave"),
        ]);

        let report = pipeline.run(&corpus).unwrap();
        assert!(report.cue_failures.is_empty());
        assert_eq!(report.outcomes[0].id, NarrativeId::new(9, 1));
        assert_eq!(report.outcomes[1].id, NarrativeId::new(1, 1));

        let records = report.records(&corpus);
        assert_eq!(records[0].schema_words_count, Some(1));
        assert_eq!(records[1].schema_words_identified, "sand wave");
    }

    #[test]
    fn unknown_cue_fails_only_its_narratives() {
        let pipeline = toy_pipeline(config());
        let corpus = Corpus::from_triples(vec![
            (NarrativeId::new(1, 1), "volcano", "lava"),
            (NarrativeId::new(1, 2), "beach", "sand"),
            (NarrativeId::new(1, 3), "forest", "tree"),
        ]);

        let report = pipeline.run(&corpus).unwrap();
        assert_eq!(report.cue_failures.len(), 1);
        assert_eq!(report.cue_failures[0].cue, "volcano");
        assert_eq!(report.failed_narratives().count(), 1);
        assert!(matches!(
            report.outcomes[0].result,
            Err(ScoringError::UnknownCue(ref c)) if c == "volcano"
        ));
        assert!(report.outcomes[1].result.is_ok());

        let records = report.records(&corpus);
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].cue, "volcano");
        assert_eq!(records[0].non_stopword_word_count, 1);
        assert_eq!(records[0].schema_words_count, None);
        assert!(records[0].schema_mismatch_count.is_nan());
        assert_eq!(records[1].schema_words_count, Some(1));
        assert_eq!(records[1].schema_mismatch_count, 0.0);
    }

    #[test]
    fn cancelled_run_produces_no_report() {
        let flag = Arc::new(AtomicBool::new(false));
        let store = EmbeddingStore::from_entries(vec![("beach", vec![1.0, 0.0])]).unwrap();
        let pipeline = SchemaPipeline::builder()
            .with_embeddings(store)
            .with_config(config())
            .cancel_flag(flag.clone())
            .build()
            .unwrap();

        flag.store(true, Ordering::Relaxed);
        let corpus = Corpus::from_triples(vec![(NarrativeId::new(1, 1), "beach", "sand")]);
        assert!(matches!(
            pipeline.run(&corpus),
            Err(PipelineError::Dictionary(DictionaryError::Cancelled))
        ));
    }
}
