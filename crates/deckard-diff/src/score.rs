//! Change-magnitude scoring.
//!
//! A [`Scorer`] maps a commit's [`Diff`] to one number. Scoring must be pure:
//! the same diff always yields the same score. [`ChurnScorer`] is the default
//! strategy; anything implementing the trait can be injected instead.

use deckard_core::{DeckardError, Diff, ScoringConfig};

/// Strategy that turns a diff into a change-magnitude score.
pub trait Scorer: Send + Sync {
    /// Score `diff`.
    ///
    /// # Errors
    ///
    /// Implementations return [`DeckardError::Scoring`] when no meaningful
    /// score can be produced.
    fn score(&self, diff: &Diff) -> Result<f64, DeckardError>;
}

impl<F> Scorer for F
where
    F: Fn(&Diff) -> Result<f64, DeckardError> + Send + Sync,
{
    fn score(&self, diff: &Diff) -> Result<f64, DeckardError> {
        self(diff)
    }
}

/// Weighted sum of added and deleted lines.
///
/// With `normalize_by_files` the sum is divided by the number of files that
/// carry a path, so wide mechanical changes rank below deep edits of the
/// same size. Entries whose counts could not be parsed have no path and add
/// nothing.
///
/// # Examples
///
/// ```
/// use deckard_core::{Diff, NumStat};
/// use deckard_diff::score::{ChurnScorer, Scorer};
///
/// let diff = Diff {
///     stats: vec![
///         NumStat { added: 10, deleted: 2, file: "src/lib.rs".into() },
///         NumStat { added: 4, deleted: 0, file: "README.md".into() },
///     ],
/// };
/// assert_eq!(ChurnScorer::default().score(&diff).unwrap(), 16.0);
/// assert_eq!(ChurnScorer::default().score(&Diff::default()).unwrap(), 0.0);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ChurnScorer {
    pub added_weight: f64,
    pub deleted_weight: f64,
    pub normalize_by_files: bool,
}

impl Default for ChurnScorer {
    fn default() -> Self {
        Self::from_config(&ScoringConfig::default())
    }
}

impl ChurnScorer {
    pub fn from_config(config: &ScoringConfig) -> Self {
        Self {
            added_weight: config.added_weight,
            deleted_weight: config.deleted_weight,
            normalize_by_files: config.normalize_by_files,
        }
    }
}

impl Scorer for ChurnScorer {
    fn score(&self, diff: &Diff) -> Result<f64, DeckardError> {
        if !self.added_weight.is_finite() || !self.deleted_weight.is_finite() {
            return Err(DeckardError::Scoring(format!(
                "weights must be finite (added = {}, deleted = {})",
                self.added_weight, self.deleted_weight
            )));
        }

        let mut total = 0.0;
        let mut files = 0usize;
        for stat in diff.stats.iter().filter(|s| !s.file.is_empty()) {
            total += self.added_weight * stat.added as f64
                + self.deleted_weight * stat.deleted as f64;
            files += 1;
        }

        if self.normalize_by_files && files > 0 {
            total /= files as f64;
        }

        if !total.is_finite() {
            return Err(DeckardError::Scoring(format!("score overflowed: {total}")));
        }
        Ok(total)
    }
}
