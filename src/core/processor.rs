//! Narrative processing seam — turns a transcript into cleaned tokens.
//!
//! Real lemmatization and stopword corpus assembly live upstream; the
//! processor here only tokenizes, lowercases, filters a supplied stopword
//! set and applies an optional lookup table of lemmas.

use rustc_hash::{FxHashMap, FxHashSet};
use std::io::BufRead;
use std::path::Path;

/// Supplies the cleaned token sequence for one narrative.
pub trait NarrativeProcessor: Sync {
    fn process(&self, transcript: &str, cue: &str) -> Vec<String>;
}

/// Tokenize, lowercase, lemma lookup, stopword filter.
#[derive(Debug, Clone, Default)]
pub struct TableProcessor {
    stopwords: FxHashSet<String>,
    lemmas: FxHashMap<String, String>,
    /// Words removed alongside stopwords, usually the corpus cue set.
    cue_words: FxHashSet<String>,
}

impl TableProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stopwords<I, S>(mut self, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.stopwords
            .extend(words.into_iter().map(|w| w.as_ref().to_lowercase()));
        self
    }

    pub fn with_lemmas<I, K, V>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        self.lemmas.extend(
            pairs
                .into_iter()
                .map(|(k, v)| (k.as_ref().to_lowercase(), v.as_ref().to_lowercase())),
        );
        self
    }

    /// Treat these cue words as stopwords so a cue never counts toward its
    /// own dictionary, where it always ranks first.
    pub fn with_cue_words<I, S>(mut self, cues: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.cue_words
            .extend(cues.into_iter().map(|w| w.as_ref().to_lowercase()));
        self
    }

    pub fn is_stopword(&self, word: &str) -> bool {
        self.stopwords.contains(word) || self.cue_words.contains(word)
    }
}

impl NarrativeProcessor for TableProcessor {
    fn process(&self, transcript: &str, _cue: &str) -> Vec<String> {
        tokenize(transcript)
            .into_iter()
            .map(|tok| match self.lemmas.get(&tok) {
                Some(lemma) => lemma.clone(),
                None => tok,
            })
            .filter(|tok| !self.is_stopword(tok))
            .collect()
    }
}

/// Split on whitespace and punctuation; keep alphanumeric runs (with inner
/// apostrophes) lowercased.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    for word in text.split_whitespace() {
        let mut current = String::new();
        for c in word.chars() {
            if c.is_alphanumeric() || (c == '\'' && !current.is_empty()) {
                current.extend(c.to_lowercase());
            } else if !current.is_empty() {
                tokens.push(trim_apostrophes(std::mem::take(&mut current)));
            }
        }
        if !current.is_empty() {
            tokens.push(trim_apostrophes(current));
        }
    }
    tokens.retain(|t| !t.is_empty());
    tokens
}

fn trim_apostrophes(mut token: String) -> String {
    while token.ends_with('\'') {
        token.pop();
    }
    token
}

/// Read a word list: one word per line, blank lines and `#` comments ignored.
pub fn load_word_list(path: &Path) -> Result<Vec<String>, std::io::Error> {
    let file = std::fs::File::open(path)?;
    let mut words = Vec::new();
    for line in std::io::BufReader::new(file).lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        words.push(trimmed.to_lowercase());
    }
    Ok(words)
}

/// Read a lemma table: `word<TAB>lemma` per line.
pub fn load_lemma_table(path: &Path) -> Result<Vec<(String, String)>, std::io::Error> {
    let file = std::fs::File::open(path)?;
    let mut pairs = Vec::new();
    for line in std::io::BufReader::new(file).lines() {
        let line = line?;
        if let Some((word, lemma)) = line.trim().split_once('\t') {
            pairs.push((word.trim().to_string(), lemma.trim().to_string()));
        }
    }
    Ok(pairs)
}
