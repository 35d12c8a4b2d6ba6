//! Preparation settings.
//!
//! Every knob has a default, so an empty JSON object (or no config file at
//! all) gives the standard preparation: min-max scaling, KD-tree index,
//! Euclidean distance, fail on the first malformed record.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Per-column scaling fitted on the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Normalization {
    /// (x - min) / (max - min), every column lands in [0, 1]
    #[default]
    MinMax,
    /// (x - mean) / std with the population standard deviation
    ZScore,
}

/// What to do with a record that fails validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MalformedPolicy {
    /// Abort the whole run on the first malformed record
    #[default]
    Fail,
    /// Log and skip malformed records
    Drop,
}

/// Nearest-neighbor search structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexAlgorithm {
    #[default]
    KdTree,
    /// Exhaustive scan; same results as the tree, linear cost
    Brute,
}

/// Distance between feature vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    #[default]
    Euclidean,
    Manhattan,
}

/// Full preparation configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrepareConfig {
    pub normalization: Normalization,
    pub malformed_policy: MalformedPolicy,
    pub algorithm: IndexAlgorithm,
    pub metric: Metric,
}

impl PrepareConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_normalization(mut self, normalization: Normalization) -> Self {
        self.normalization = normalization;
        self
    }

    pub fn with_malformed_policy(mut self, policy: MalformedPolicy) -> Self {
        self.malformed_policy = policy;
        self
    }

    pub fn with_algorithm(mut self, algorithm: IndexAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn with_metric(mut self, metric: Metric) -> Self {
        self.metric = metric;
        self
    }
}

macro_rules! text_enum {
    ($ty:ty { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let text = match self {
                    $(Self::$variant => $text,)+
                };
                f.write_str(text)
            }
        }

        impl FromStr for $ty {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($text => Ok(Self::$variant),)+
                    other => Err(format!(
                        "unknown value '{}', expected one of: {}",
                        other,
                        [$($text),+].join(", ")
                    )),
                }
            }
        }
    };
}

text_enum!(Normalization { MinMax => "minmax", ZScore => "zscore" });
text_enum!(MalformedPolicy { Fail => "fail", Drop => "drop" });
text_enum!(IndexAlgorithm { KdTree => "kdtree", Brute => "brute" });
text_enum!(Metric { Euclidean => "euclidean", Manhattan => "manhattan" });

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PrepareConfig::default();
        assert_eq!(config.normalization, Normalization::MinMax);
        assert_eq!(config.malformed_policy, MalformedPolicy::Fail);
        assert_eq!(config.algorithm, IndexAlgorithm::KdTree);
        assert_eq!(config.metric, Metric::Euclidean);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: PrepareConfig =
            serde_json::from_str(r#"{ "normalization": "zscore", "malformed_policy": "drop" }"#)
                .unwrap();
        assert_eq!(config.normalization, Normalization::ZScore);
        assert_eq!(config.malformed_policy, MalformedPolicy::Drop);
        assert_eq!(config.algorithm, IndexAlgorithm::KdTree);

        let empty: PrepareConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(empty, PrepareConfig::default());
    }

    #[test]
    fn test_text_round_trip() {
        assert_eq!("ZScore".parse::<Normalization>().unwrap(), Normalization::ZScore);
        assert_eq!(Metric::Manhattan.to_string(), "manhattan");
        assert_eq!("brute".parse::<IndexAlgorithm>().unwrap(), IndexAlgorithm::Brute);
        assert!("cosine".parse::<Metric>().is_err());
    }
}
