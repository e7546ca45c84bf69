//! Run configuration, loaded from RON.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("num_words_to_use ({to_use}) exceeds num_similar_words ({similar})")]
    WorkingSizeTooLarge { to_use: usize, similar: usize },
    #[error("num_similar_words must be positive")]
    EmptyBuildSize,
    #[error("sampled mismatch baseline needs a positive cue count")]
    EmptySample,
    #[error("thread count must be positive")]
    ZeroThreads,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
}

/// How the chance-level baseline picks the cues it averages over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum MismatchBaseline {
    /// Unweighted mean over every other cue in the corpus.
    #[default]
    AllOtherCues,
    /// Mean over at most `count` other cues, drawn per cue from a seeded RNG.
    SampledOtherCues { count: usize, seed: u64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Ranked neighbours cached per cue.
    #[serde(default = "default_num_similar_words")]
    pub num_similar_words: usize,
    /// Neighbours actually used for matching.
    #[serde(default = "default_num_words_to_use")]
    pub num_words_to_use: usize,
    #[serde(default)]
    pub mismatch_baseline: MismatchBaseline,
    /// Worker threads for both phases; `None` uses the rayon default.
    #[serde(default)]
    pub threads: Option<usize>,
    /// Drop corpus cue words from narratives during processing.
    #[serde(default = "default_filter_cue_words")]
    pub filter_cue_words: bool,
}

fn default_num_similar_words() -> usize {
    50_000
}

fn default_num_words_to_use() -> usize {
    10_000
}

fn default_filter_cue_words() -> bool {
    true
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            num_similar_words: default_num_similar_words(),
            num_words_to_use: default_num_words_to_use(),
            mismatch_baseline: MismatchBaseline::default(),
            threads: None,
            filter_cue_words: default_filter_cue_words(),
        }
    }
}

impl ScoringConfig {
    pub fn load_from_ron(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: ScoringConfig = ron::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_similar_words == 0 {
            return Err(ConfigError::EmptyBuildSize);
        }
        if self.num_words_to_use > self.num_similar_words {
            return Err(ConfigError::WorkingSizeTooLarge {
                to_use: self.num_words_to_use,
                similar: self.num_similar_words,
            });
        }
        if let MismatchBaseline::SampledOtherCues { count: 0, .. } = self.mismatch_baseline {
            return Err(ConfigError::EmptySample);
        }
        if self.threads == Some(0) {
            return Err(ConfigError::ZeroThreads);
        }
        Ok(())
    }
}
