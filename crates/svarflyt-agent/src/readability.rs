//! LIX readability index.
//!
//! `lix = words / sentences + 100 * long_words / words`, where a long word
//! has more than six letters.

use serde::{Deserialize, Serialize};

/// Words with more letters than this are long.
const LONG_WORD_LETTERS: usize = 6;

/// Answers scoring above this are rewritten while revisions remain.
pub const REVISION_THRESHOLD: f64 = 35.0;

/// Maximum number of readability revisions per run.
pub const MAX_REVISIONS: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LixScore {
    pub num_words: usize,
    pub num_sentences: usize,
    pub num_long_words: usize,
    pub lix: f64,
}

/// Compute the LIX score of `text`.
///
/// Words are whitespace-separated tokens. Sentences are counted as the
/// number of `.`, `!` and `?` marks. Both counts are at least 1. Only
/// ASCII letters count toward a word's length.
pub fn lix(text: &str) -> LixScore {
    let words: Vec<&str> = text.split_whitespace().collect();
    let num_words = words.len().max(1);
    let num_sentences = (text.split(['.', '!', '?']).count() - 1).max(1);
    let num_long_words = words
        .iter()
        .filter(|w| w.chars().filter(char::is_ascii_alphabetic).count() > LONG_WORD_LETTERS)
        .count();

    let lix = num_words as f64 / num_sentences as f64
        + 100.0 * num_long_words as f64 / num_words as f64;

    LixScore {
        num_words,
        num_sentences,
        num_long_words,
        lix,
    }
}

/// Readability band of a LIX score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LixCategory {
    VeryEasy,
    Easy,
    Medium,
    Hard,
    VeryHard,
}

impl LixCategory {
    /// Norwegian description of the band.
    pub fn label(self) -> &'static str {
        match self {
            Self::VeryEasy => "Svært lettlest (for barn)",
            Self::Easy => "Lettlest (enkel litteratur, aviser)",
            Self::Medium => "Middels vanskelig (standard aviser, generell sakprosa)",
            Self::Hard => "Vanskelig (akademiske tekster, offisielle dokumenter)",
            Self::VeryHard => "Svært vanskelig (vitenskapelig litteratur)",
        }
    }
}

/// Map a score to its band. Each bound belongs to the harder band.
pub fn categorize_lix(lix: f64) -> LixCategory {
    if lix < 25.0 {
        LixCategory::VeryEasy
    } else if lix < 35.0 {
        LixCategory::Easy
    } else if lix < 45.0 {
        LixCategory::Medium
    } else if lix < 55.0 {
        LixCategory::Hard
    } else {
        LixCategory::VeryHard
    }
}

/// Loop guard for the revision cycle.
pub fn needs_revision(lix: f64, iterations: u32) -> bool {
    lix > REVISION_THRESHOLD && iterations < MAX_REVISIONS
}
