//! Embedding store — the word → vector table, loaded once and read-only after.

use rustc_hash::FxHashMap;
use std::io::BufRead;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("unknown word: {0}")]
    UnknownWord(String),
    #[error("line {line}: expected {expected} dimensions, found {found}")]
    DimensionMismatch {
        line: usize,
        expected: usize,
        found: usize,
    },
    #[error("line {line}: malformed vector component '{value}'")]
    Malformed { line: usize, value: String },
    #[error("embedding table is empty")]
    Empty,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A fixed vocabulary of lowercase words with one D-dimensional vector each.
///
/// Vectors live in one flat buffer in vocabulary order; the position of a
/// word in that order is its vocabulary index, used as the ranking tie-break.
#[derive(Debug, Clone)]
pub struct EmbeddingStore {
    words: Vec<String>,
    index: FxHashMap<String, usize>,
    vectors: Vec<f32>,
    norms: Vec<f64>,
    dimension: usize,
}

impl EmbeddingStore {
    /// Build a store from in-memory entries.
    ///
    /// Words are lowercased; a repeated word keeps its first vector.
    pub fn from_entries<I, W>(entries: I) -> Result<Self, EmbeddingError>
    where
        I: IntoIterator<Item = (W, Vec<f32>)>,
        W: AsRef<str>,
    {
        let mut builder = StoreBuilder::default();
        for (line, (word, vector)) in entries.into_iter().enumerate() {
            builder.push(word.as_ref(), &vector, line + 1)?;
        }
        builder.finish()
    }

    /// Load a GloVe / word2vec text file: `word v1 v2 ... vD` per line.
    ///
    /// A word2vec `<count> <dim>` header line is skipped.
    pub fn load_text(path: &Path) -> Result<Self, EmbeddingError> {
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        let mut builder = StoreBuilder::default();
        let mut components: Vec<f32> = Vec::new();

        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            let line_no = i + 1;
            let mut parts = line.split_whitespace();
            let word = match parts.next() {
                Some(word) => word,
                None => continue,
            };

            components.clear();
            for value in parts {
                let parsed = value.parse::<f32>().map_err(|_| EmbeddingError::Malformed {
                    line: line_no,
                    value: value.to_string(),
                })?;
                components.push(parsed);
            }

            if line_no == 1 && is_word2vec_header(word, &components) {
                continue;
            }

            builder.push(word, &components, line_no)?;
        }

        let store = builder.finish()?;
        tracing::info!(
            path = %path.display(),
            words = store.size(),
            dimension = store.dimension(),
            "loaded embeddings"
        );
        Ok(store)
    }

    /// The vector for `word` (case-insensitive).
    pub fn vector(&self, word: &str) -> Result<&[f32], EmbeddingError> {
        let idx = self
            .index_of(word)
            .ok_or_else(|| EmbeddingError::UnknownWord(word.to_string()))?;
        Ok(self.vector_at(idx))
    }

    pub fn index_of(&self, word: &str) -> Option<usize> {
        match self.index.get(word) {
            Some(&idx) => Some(idx),
            None => self.index.get(&word.to_lowercase()).copied(),
        }
    }

    pub fn contains(&self, word: &str) -> bool {
        self.index_of(word).is_some()
    }

    pub fn word(&self, idx: usize) -> &str {
        &self.words[idx]
    }

    pub fn vector_at(&self, idx: usize) -> &[f32] {
        let start = idx * self.dimension;
        &self.vectors[start..start + self.dimension]
    }

    /// Euclidean norm of the vector at `idx`, computed once at load.
    pub fn norm(&self, idx: usize) -> f64 {
        self.norms[idx]
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn size(&self) -> usize {
        self.words.len()
    }
}

/// Accumulates rows while checking dimension consistency.
#[derive(Default)]
struct StoreBuilder {
    words: Vec<String>,
    index: FxHashMap<String, usize>,
    vectors: Vec<f32>,
    dimension: Option<usize>,
    duplicates: usize,
}

impl StoreBuilder {
    fn push(&mut self, word: &str, vector: &[f32], line: usize) -> Result<(), EmbeddingError> {
        let expected = *self.dimension.get_or_insert(vector.len());
        if vector.len() != expected || expected == 0 {
            return Err(EmbeddingError::DimensionMismatch {
                line,
                expected,
                found: vector.len(),
            });
        }

        let word = word.to_lowercase();
        if self.index.contains_key(&word) {
            self.duplicates += 1;
            return Ok(());
        }

        self.index.insert(word.clone(), self.words.len());
        self.words.push(word);
        self.vectors.extend_from_slice(vector);
        Ok(())
    }

    fn finish(self) -> Result<EmbeddingStore, EmbeddingError> {
        let dimension = match self.dimension {
            Some(d) if !self.words.is_empty() => d,
            _ => return Err(EmbeddingError::Empty),
        };

        if self.duplicates > 0 {
            tracing::warn!(
                skipped = self.duplicates,
                "duplicate vocabulary words after lowercasing; kept first occurrence"
            );
        }

        let norms = self
            .vectors
            .chunks_exact(dimension)
            .map(|v| v.iter().map(|&x| (x as f64) * (x as f64)).sum::<f64>().sqrt())
            .collect();

        Ok(EmbeddingStore {
            words: self.words,
            index: self.index,
            vectors: self.vectors,
            norms,
            dimension,
        })
    }
}

/// word2vec text files open with `<vocab size> <dimension>`.
fn is_word2vec_header(first: &str, rest: &[f32]) -> bool {
    rest.len() == 1 && first.parse::<usize>().is_ok() && rest[0].fract() == 0.0
}
