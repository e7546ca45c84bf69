//! Similarity ranker — cosine nearest neighbours of a cue over the vocabulary.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use thiserror::Error;

use crate::core::embedding::EmbeddingStore;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RankError {
    #[error("cue '{0}' is not in the embedding vocabulary")]
    UnknownCue(String),
    #[error("query vector has {found} dimensions, vocabulary has {expected}")]
    DimensionMismatch { expected: usize, found: usize },
}

/// A vocabulary word with its cosine similarity to the cue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedWord {
    pub word: String,
    pub score: f32,
}

/// Ranks the whole vocabulary against one query vector at a time.
#[derive(Debug, Clone, Copy)]
pub struct SimilarityRanker<'a> {
    store: &'a EmbeddingStore,
}

impl<'a> SimilarityRanker<'a> {
    pub fn new(store: &'a EmbeddingStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &'a EmbeddingStore {
        self.store
    }

    /// The `top_n` words most similar to `cue`, best first.
    ///
    /// The cue itself is not excluded and ranks first with score 1.0, ahead
    /// of any other word that ties it (a scaled copy of its vector).
    pub fn rank(&self, cue: &str, top_n: usize) -> Result<Vec<RankedWord>, RankError> {
        let idx = self
            .store
            .index_of(cue)
            .ok_or_else(|| RankError::UnknownCue(cue.to_string()))?;
        Ok(self.rank_indexed(self.store.vector_at(idx), self.store.norm(idx), Some(idx), top_n))
    }

    /// The `top_n` words most similar to an arbitrary query vector.
    pub fn rank_vector(&self, query: &[f32], top_n: usize) -> Result<Vec<RankedWord>, RankError> {
        if query.len() != self.store.dimension() {
            return Err(RankError::DimensionMismatch {
                expected: self.store.dimension(),
                found: query.len(),
            });
        }
        let norm = query.iter().map(|&x| (x as f64) * (x as f64)).sum::<f64>().sqrt();
        Ok(self.rank_indexed(query, norm, None, top_n))
    }

    /// `pinned` wins every tie it takes part in.
    fn rank_indexed(
        &self,
        query: &[f32],
        query_norm: f64,
        pinned: Option<usize>,
        top_n: usize,
    ) -> Vec<RankedWord> {
        let store = self.store;
        let mut scored: Vec<(f64, usize)> = (0..store.size())
            .into_par_iter()
            .map(|idx| (cosine(query, query_norm, store.vector_at(idx), store.norm(idx)), idx))
            .collect();

        let keep = top_n.min(scored.len());
        if keep == 0 {
            return Vec::new();
        }
        let compare = |a: &(f64, usize), b: &(f64, usize)| compare_ranked(a, b, pinned);
        if keep < scored.len() {
            scored.select_nth_unstable_by(keep - 1, compare);
            scored.truncate(keep);
        }
        scored.par_sort_unstable_by(compare);

        scored
            .into_iter()
            .map(|(score, idx)| RankedWord {
                word: store.word(idx).to_string(),
                score: score as f32,
            })
            .collect()
    }
}

/// Cosine similarity; a zero-norm side yields -inf so the word sorts last.
fn cosine(a: &[f32], a_norm: f64, b: &[f32], b_norm: f64) -> f64 {
    let denom = a_norm * b_norm;
    if denom == 0.0 || !denom.is_finite() {
        return f64::NEG_INFINITY;
    }
    let dot: f64 = a.iter().zip(b).map(|(&x, &y)| (x as f64) * (y as f64)).sum();
    let score = dot / denom;
    if score.is_nan() {
        f64::NEG_INFINITY
    } else {
        score.clamp(-1.0, 1.0)
    }
}

/// Descending score, then the pinned index, then ascending vocabulary index.
fn compare_ranked(a: &(f64, usize), b: &(f64, usize), pinned: Option<usize>) -> Ordering {
    let unpinned = |idx: usize| Some(idx) != pinned;
    b.0.total_cmp(&a.0)
        .then(unpinned(a.1).cmp(&unpinned(b.1)))
        .then(a.1.cmp(&b.1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> EmbeddingStore {
        EmbeddingStore::from_entries(vec![
            ("beach", vec![1.0, 0.0, 0.0]),
            ("sand", vec![0.9, 0.1, 0.0]),
            ("wave", vec![0.7, 0.7, 0.0]),
            ("tree", vec![0.0, 1.0, 0.0]),
            ("void", vec![0.0, 0.0, 0.0]),
            ("anti", vec![-1.0, 0.0, 0.0]),
        ])
        .unwrap()
    }

    #[test]
    fn cue_ranks_first_with_unit_score() {
        let store = store();
        let ranked = SimilarityRanker::new(&store).rank("beach", 3).unwrap();
        assert_eq!(ranked[0].word, "beach");
        assert!((ranked[0].score - 1.0).abs() < 1e-6);
        let words: Vec<&str> = ranked.iter().map(|r| r.word.as_str()).collect();
        assert_eq!(words, vec!["beach", "sand", "wave"]);
    }

    #[test]
    fn zero_vector_sorts_last() {
        let store = store();
        let ranked = SimilarityRanker::new(&store).rank("beach", 100).unwrap();
        assert_eq!(ranked.len(), 6);
        assert_eq!(ranked[4].word, "anti");
        assert_eq!(ranked[5].word, "void");
        assert_eq!(ranked[5].score, f32::NEG_INFINITY);
    }

    #[test]
    fn ties_break_by_vocabulary_order() {
        let store = EmbeddingStore::from_entries(vec![
            ("cue", vec![1.0, 0.0]),
            ("zeta", vec![0.0, 1.0]),
            ("alpha", vec![0.0, 2.0]),
            ("mid", vec![0.0, 3.0]),
        ])
        .unwrap();
        let ranker = SimilarityRanker::new(&store);
        let ranked = ranker.rank("cue", 4).unwrap();
        let words: Vec<&str> = ranked.iter().map(|r| r.word.as_str()).collect();
        assert_eq!(words, vec!["cue", "zeta", "alpha", "mid"]);

        let top2 = ranker.rank("cue", 2).unwrap();
        assert_eq!(top2[1].word, "zeta");
    }

    #[test]
    fn cue_wins_tie_with_scaled_copy() {
        let store = EmbeddingStore::from_entries(vec![
            ("shore", vec![2.0, 0.0]),
            ("beach", vec![1.0, 0.0]),
            ("tree", vec![0.0, 1.0]),
        ])
        .unwrap();
        let ranker = SimilarityRanker::new(&store);

        let ranked = ranker.rank("beach", 3).unwrap();
        let words: Vec<&str> = ranked.iter().map(|r| r.word.as_str()).collect();
        assert_eq!(words, vec!["beach", "shore", "tree"]);
        assert_eq!(ranked[0].score, ranked[1].score);
        assert_eq!(ranker.rank("beach", 1).unwrap()[0].word, "beach");

        let shore = ranker.rank("shore", 2).unwrap();
        assert_eq!(shore[0].word, "shore");
        assert_eq!(shore[1].word, "beach");
    }

    #[test]
    fn unknown_cue_fails_eagerly() {
        let store = store();
        let err = SimilarityRanker::new(&store).rank("volcano", 3).unwrap_err();
        assert_eq!(err, RankError::UnknownCue("volcano".to_string()));
    }

    #[test]
    fn top_n_zero_is_empty() {
        let store = store();
        assert!(SimilarityRanker::new(&store).rank("beach", 0).unwrap().is_empty());
    }

    #[test]
    fn rank_vector_checks_dimension() {
        let store = store();
        let ranker = SimilarityRanker::new(&store);
        assert!(matches!(
            ranker.rank_vector(&[1.0, 0.0], 2),
            Err(RankError::DimensionMismatch { expected: 3, found: 2 })
        ));
        let ranked = ranker.rank_vector(&[0.0, 1.0, 0.0], 1).unwrap();
        assert_eq!(ranked[0].word, "tree");
    }

    #[test]
    fn zero_query_vector_ranks_in_vocabulary_order() {
        let store = store();
        let ranked = SimilarityRanker::new(&store).rank_vector(&[0.0, 0.0, 0.0], 2).unwrap();
        assert_eq!(ranked[0].word, "beach");
        assert_eq!(ranked[1].word, "sand");
    }
}
