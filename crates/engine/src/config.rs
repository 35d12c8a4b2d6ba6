//! Query settings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of recommendations returned when the caller does not say.
pub const DEFAULT_RECOMMENDATIONS: usize = 20;

/// How a neighbor distance becomes a similarity score.
///
/// Both are strictly decreasing in distance, so ranking is the same either
/// way; they differ only in the numbers shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreTransform {
    /// `1 / (1 + d)`: in (0, 1] for any distance, 1 for an identical vector
    #[default]
    Inverse,
    /// `1 - d`: only stays in [0, 1] while distances do, negative beyond
    Complement,
}

impl ScoreTransform {
    pub fn score(&self, distance: f64) -> f64 {
        match self {
            ScoreTransform::Inverse => 1.0 / (1.0 + distance),
            ScoreTransform::Complement => 1.0 - distance,
        }
    }
}

impl fmt::Display for ScoreTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScoreTransform::Inverse => f.write_str("inverse"),
            ScoreTransform::Complement => f.write_str("complement"),
        }
    }
}

impl FromStr for ScoreTransform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inverse" => Ok(ScoreTransform::Inverse),
            "complement" => Ok(ScoreTransform::Complement),
            other => Err(format!(
                "unknown score transform '{other}', expected inverse or complement"
            )),
        }
    }
}

/// Settings applied to every query of a [`crate::Recommender`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    pub score: ScoreTransform,
    pub default_count: usize,
    /// Multiplier applied to raw popularity in results
    pub popularity_scale: u32,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            score: ScoreTransform::default(),
            default_count: DEFAULT_RECOMMENDATIONS,
            popularity_scale: 5,
        }
    }
}

impl QueryConfig {
    pub fn with_score(mut self, score: ScoreTransform) -> Self {
        self.score = score;
        self
    }

    pub fn with_default_count(mut self, count: usize) -> Self {
        self.default_count = count;
        self
    }
}
