//! Dictionary cache — per-cue ranked neighbour lists, built once and sliced.

use rayon::prelude::*;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

use crate::core::ranker::{RankError, RankedWord, SimilarityRanker};
use crate::schema::narrative::normalize_cue;

#[derive(Debug, Error)]
pub enum DictionaryError {
    #[error("rank error: {0}")]
    Rank(#[from] RankError),
    #[error("dictionary build cancelled")]
    Cancelled,
    #[error("cached build size {cached} is smaller than requested {requested}")]
    CacheTooSmall { cached: usize, requested: usize },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("RON serialization error: {0}")]
    RonSer(#[from] ron::Error),
}

/// The ranked neighbours of one cue, best first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityDictionary {
    pub cue: String,
    pub entries: Vec<RankedWord>,
}

impl SimilarityDictionary {
    /// The first `min(n, len)` entries. Never re-ranks.
    pub fn truncate(&self, n: usize) -> &[RankedWord] {
        &self.entries[..n.min(self.entries.len())]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Words in rank order.
    pub fn words(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.word.as_str())
    }
}

/// A cue whose dictionary could not be built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CueFailure {
    pub cue: String,
    pub error: RankError,
}

/// Finished, immutable dictionaries for every successfully built cue.
///
/// Only obtainable from [`DictionaryCacheBuilder::finish`] or by loading a
/// previously saved cache, so holding one means Phase 1 is complete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DictionaryCache {
    build_size: usize,
    dictionaries: BTreeMap<String, SimilarityDictionary>,
}

impl DictionaryCache {
    pub fn build_size(&self) -> usize {
        self.build_size
    }

    pub fn get(&self, cue: &str) -> Option<&SimilarityDictionary> {
        self.dictionaries.get(cue)
    }

    pub fn contains(&self, cue: &str) -> bool {
        self.dictionaries.contains_key(cue)
    }

    /// Cues in sorted order.
    pub fn cues(&self) -> impl Iterator<Item = &str> {
        self.dictionaries.keys().map(|k| k.as_str())
    }

    pub fn dictionaries(&self) -> impl Iterator<Item = &SimilarityDictionary> {
        self.dictionaries.values()
    }

    pub fn len(&self) -> usize {
        self.dictionaries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dictionaries.is_empty()
    }

    pub fn save_ron(&self, path: &Path) -> Result<(), DictionaryError> {
        let serialized = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())?;
        std::fs::write(path, serialized)?;
        Ok(())
    }

    pub fn load_ron(path: &Path) -> Result<Self, DictionaryError> {
        let contents = std::fs::read_to_string(path)?;
        let cache: DictionaryCache = ron::from_str(&contents)?;
        tracing::info!(
            path = %path.display(),
            cues = cache.len(),
            build_size = cache.build_size,
            "loaded dictionary cache"
        );
        Ok(cache)
    }
}

/// Phase 1 state: ranks cues on demand and memoizes each result.
pub struct DictionaryCacheBuilder<'a> {
    ranker: SimilarityRanker<'a>,
    build_size: usize,
    dictionaries: FxHashMap<String, SimilarityDictionary>,
    failures: BTreeMap<String, RankError>,
    cancel: Option<Arc<AtomicBool>>,
}

impl<'a> DictionaryCacheBuilder<'a> {
    pub fn new(ranker: SimilarityRanker<'a>, build_size: usize) -> Self {
        Self {
            ranker,
            build_size,
            dictionaries: FxHashMap::default(),
            failures: BTreeMap::new(),
            cancel: None,
        }
    }

    /// Abort `build_all` once this flag is set.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Seed from a previously saved cache so its cues are not re-ranked.
    pub fn with_cached(mut self, cache: DictionaryCache) -> Result<Self, DictionaryError> {
        if cache.build_size < self.build_size {
            return Err(DictionaryError::CacheTooSmall {
                cached: cache.build_size,
                requested: self.build_size,
            });
        }
        for (cue, mut dictionary) in cache.dictionaries {
            dictionary.entries.truncate(self.build_size);
            self.dictionaries.insert(cue, dictionary);
        }
        Ok(self)
    }

    pub fn build_size(&self) -> usize {
        self.build_size
    }

    pub fn is_built(&self, cue: &str) -> bool {
        self.dictionaries.contains_key(&normalize_cue(cue))
    }

    /// The dictionary for `cue`, ranking it on first request only.
    pub fn build(&mut self, cue: &str) -> Result<&SimilarityDictionary, RankError> {
        let cue = normalize_cue(cue);
        if !self.dictionaries.contains_key(&cue) {
            let dictionary = rank_cue(self.ranker, &cue, self.build_size)?;
            self.dictionaries.insert(cue.clone(), dictionary);
        }
        self.dictionaries
            .get(&cue)
            .ok_or(RankError::UnknownCue(cue))
    }

    /// Build every cue not yet cached, in parallel, returning how many new
    /// dictionaries were ranked.
    ///
    /// A cue missing from the vocabulary is recorded as a failure without
    /// stopping the others. Cancellation discards nothing already cached but
    /// returns `Cancelled`, and the builder should then be dropped.
    pub fn build_all<I, S>(&mut self, cues: I) -> Result<usize, DictionaryError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut pending: Vec<String> = cues
            .into_iter()
            .map(|c| normalize_cue(c.as_ref()))
            .filter(|c| !self.dictionaries.contains_key(c))
            .collect();
        pending.sort();
        pending.dedup();

        if pending.is_empty() {
            return Ok(0);
        }
        tracing::info!(
            cues = pending.len(),
            build_size = self.build_size,
            "building similarity dictionaries"
        );

        let ranker = self.ranker;
        let build_size = self.build_size;
        let cancel = self.cancel.clone();

        let results: Vec<Option<(String, Result<SimilarityDictionary, RankError>)>> = pending
            .into_par_iter()
            .map(|cue| {
                if is_cancelled(&cancel) {
                    return None;
                }
                let result = rank_cue(ranker, &cue, build_size);
                Some((cue, result))
            })
            .collect();

        if is_cancelled(&self.cancel) || results.iter().any(Option::is_none) {
            tracing::warn!("dictionary build cancelled before completion");
            return Err(DictionaryError::Cancelled);
        }

        let mut built = 0;
        for (cue, result) in results.into_iter().flatten() {
            match result {
                Ok(dictionary) => {
                    tracing::debug!(cue = %cue, words = dictionary.len(), "dictionary built");
                    self.dictionaries.insert(cue, dictionary);
                    built += 1;
                }
                Err(error) => {
                    tracing::warn!(cue = %cue, %error, "cue dictionary failed");
                    self.failures.insert(cue, error);
                }
            }
        }
        Ok(built)
    }

    /// Close Phase 1: the immutable cache plus the cues that failed.
    pub fn finish(self) -> (DictionaryCache, Vec<CueFailure>) {
        let cache = DictionaryCache {
            build_size: self.build_size,
            dictionaries: self.dictionaries.into_iter().collect(),
        };
        let failures = self
            .failures
            .into_iter()
            .map(|(cue, error)| CueFailure { cue, error })
            .collect();
        (cache, failures)
    }
}

fn rank_cue(
    ranker: SimilarityRanker<'_>,
    cue: &str,
    build_size: usize,
) -> Result<SimilarityDictionary, RankError> {
    let entries = ranker.rank(cue, build_size)?;
    Ok(SimilarityDictionary {
        cue: cue.to_string(),
        entries,
    })
}

fn is_cancelled(flag: &Option<Arc<AtomicBool>>) -> bool {
    flag.as_ref().is_some_and(|f| f.load(Ordering::Relaxed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::embedding::EmbeddingStore;

    fn store() -> EmbeddingStore {
        EmbeddingStore::from_entries(vec![
            ("beach", vec![1.0, 0.0, 0.1]),
            ("forest", vec![0.0, 1.0, 0.1]),
            ("sand", vec![0.95, 0.05, 0.1]),
            ("wave", vec![0.6, 0.5, 0.1]),
            ("tree", vec![0.05, 0.95, 0.1]),
        ])
        .unwrap()
    }

    #[test]
    fn build_memoizes_by_cue() {
        let store = store();
        let mut builder = DictionaryCacheBuilder::new(SimilarityRanker::new(&store), 3);

        let first = builder.build("Beach").unwrap().clone();
        assert!(builder.is_built("beach"));
        let second = builder.build("beach").unwrap().clone();
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
    }

    #[test]
    fn truncate_is_a_prefix() {
        let store = store();
        let mut builder = DictionaryCacheBuilder::new(SimilarityRanker::new(&store), 5);
        let dictionary = builder.build("beach").unwrap();

        let small = dictionary.truncate(2);
        let large = dictionary.truncate(4);
        assert_eq!(small, &dictionary.entries[..2]);
        assert_eq!(&large[..2], small);
        assert_eq!(dictionary.truncate(99).len(), 5);
        assert!(dictionary.truncate(0).is_empty());
    }

    #[test]
    fn build_all_isolates_failures() {
        let store = store();
        let mut builder = DictionaryCacheBuilder::new(SimilarityRanker::new(&store), 3);
        assert_eq!(builder.build_all(["beach", "volcano", "forest"]).unwrap(), 2);

        let (cache, failures) = builder.finish();
        assert_eq!(cache.cues().collect::<Vec<_>>(), vec!["beach", "forest"]);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].cue, "volcano");
        assert_eq!(failures[0].error, RankError::UnknownCue("volcano".to_string()));
    }

    #[test]
    fn cancelled_build_returns_error() {
        let store = store();
        let flag = Arc::new(AtomicBool::new(true));
        let mut builder = DictionaryCacheBuilder::new(SimilarityRanker::new(&store), 3)
            .with_cancel_flag(flag);

        let result = builder.build_all(["beach", "forest"]);
        assert!(matches!(result, Err(DictionaryError::Cancelled)));
    }

    #[test]
    fn cached_cache_is_reused_and_truncated() {
        let store = store();
        let mut builder = DictionaryCacheBuilder::new(SimilarityRanker::new(&store), 5);
        builder.build_all(["beach"]).unwrap();
        let (cache, _) = builder.finish();

        let path = std::path::PathBuf::from("target/test_dictionary_cache.ron");
        std::fs::create_dir_all("target").unwrap();
        cache.save_ron(&path).unwrap();
        let loaded = DictionaryCache::load_ron(&path).unwrap();
        assert_eq!(loaded.build_size(), 5);
        assert_eq!(loaded.get("beach"), cache.get("beach"));

        let mut builder = DictionaryCacheBuilder::new(SimilarityRanker::new(&store), 2)
            .with_cached(loaded)
            .unwrap();
        assert!(builder.is_built("beach"));
        assert_eq!(builder.build_all(["Beach", "forest"]).unwrap(), 1);
        let (smaller, _) = builder.finish();
        assert_eq!(smaller.get("beach").unwrap().len(), 2);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn undersized_cache_is_rejected() {
        let store = store();
        let builder = DictionaryCacheBuilder::new(SimilarityRanker::new(&store), 2);
        let (cache, _) = builder.finish();

        let result = DictionaryCacheBuilder::new(SimilarityRanker::new(&store), 4).with_cached(cache);
        assert!(matches!(
            result,
            Err(DictionaryError::CacheTooSmall { cached: 2, requested: 4 })
        ));
    }
}
