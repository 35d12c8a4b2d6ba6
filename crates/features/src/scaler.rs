//! Per-attribute normalization.
//!
//! Parameters are fitted on the catalog being prepared so that no attribute
//! dominates distances just because of its unit (`duration_ms` would swamp
//! `danceability` otherwise). Column statistics are accumulated in row order
//! on one thread: the same catalog always yields the same bits.
//!
//! Any pair of finite inputs stays finite: differences are taken between
//! halved values and z-score moments are computed on values rescaled by the
//! column's largest magnitude, so neither can overflow.

use crate::config::Normalization;
use serde::{Deserialize, Serialize};

/// Fitted transform for one column.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ColumnScale {
    MinMax { min: f64, max: f64 },
    ZScore { mean: f64, std: f64 },
}

impl ColumnScale {
    /// Scale one value. Constant columns carry no information and map to 0.
    pub fn apply(&self, value: f64) -> f64 {
        match *self {
            ColumnScale::MinMax { min, max } => {
                let half_range = max / 2.0 - min / 2.0;
                if half_range > 0.0 { (value / 2.0 - min / 2.0) / half_range } else { 0.0 }
            }
            ColumnScale::ZScore { mean, std } => {
                if std > 0.0 { (value / 2.0 - mean / 2.0) / (std / 2.0) } else { 0.0 }
            }
        }
    }
}

/// Normalization fitted on a whole catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scaler {
    pub normalization: Normalization,
    pub columns: Vec<ColumnScale>,
}

impl Scaler {
    /// Fit column parameters over `rows`, each `dim` values wide.
    pub fn fit<R: AsRef<[f64]>>(rows: &[R], dim: usize, normalization: Normalization) -> Self {
        let columns = (0..dim)
            .map(|col| {
                let values = rows.iter().map(|r| r.as_ref()[col]);
                match normalization {
                    Normalization::MinMax => fit_min_max(values),
                    Normalization::ZScore => fit_z_score(values, rows.len()),
                }
            })
            .collect();

        Self {
            normalization,
            columns,
        }
    }

    pub fn dim(&self) -> usize {
        self.columns.len()
    }

    /// Scale one row. `values` must be `dim` wide.
    pub fn transform(&self, values: &[f64]) -> Vec<f64> {
        self.columns
            .iter()
            .zip(values)
            .map(|(scale, &v)| scale.apply(v))
            .collect()
    }
}

fn fit_min_max(values: impl Iterator<Item = f64>) -> ColumnScale {
    let (min, max) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    if min.is_finite() && max.is_finite() {
        ColumnScale::MinMax { min, max }
    } else {
        ColumnScale::MinMax { min: 0.0, max: 0.0 }
    }
}

fn fit_z_score(values: impl Iterator<Item = f64> + Clone, count: usize) -> ColumnScale {
    let magnitude = values.clone().fold(0.0, |acc: f64, v| acc.max(v.abs()));
    if count == 0 || magnitude == 0.0 || !magnitude.is_finite() {
        return ColumnScale::ZScore { mean: 0.0, std: 0.0 };
    }
    // Moments of v / magnitude lie within [-1, 1] and [0, 4]
    let n = count as f64;
    let unit_mean = values.clone().map(|v| v / magnitude).sum::<f64>() / n;
    let unit_variance = values
        .map(|v| {
            let d = v / magnitude - unit_mean;
            d * d
        })
        .sum::<f64>()
        / n;
    ColumnScale::ZScore {
        mean: unit_mean * magnitude,
        std: unit_variance.sqrt() * magnitude,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_min_max_maps_to_unit_range() {
        let rows = vec![vec![0.0, 10.0], vec![5.0, 20.0], vec![10.0, 30.0]];
        let scaler = Scaler::fit(&rows, 2, Normalization::MinMax);

        assert_eq!(scaler.transform(&rows[0]), vec![0.0, 0.0]);
        assert_eq!(scaler.transform(&rows[1]), vec![0.5, 0.5]);
        assert_eq!(scaler.transform(&rows[2]), vec![1.0, 1.0]);
    }

    #[test]
    fn test_z_score_centers_columns() {
        let rows = vec![vec![1.0], vec![2.0], vec![3.0], vec![4.0]];
        let scaler = Scaler::fit(&rows, 1, Normalization::ZScore);

        let scaled: Vec<f64> = rows.iter().map(|r| scaler.transform(r)[0]).collect();
        let mean: f64 = scaled.iter().sum::<f64>() / 4.0;
        let var: f64 = scaled.iter().map(|v| v * v).sum::<f64>() / 4.0;
        assert!(mean.abs() < 1e-12);
        assert!((var - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_constant_column_maps_to_zero() {
        let rows = vec![vec![7.0, 1.0], vec![7.0, 2.0]];

        let min_max = Scaler::fit(&rows, 2, Normalization::MinMax);
        assert_eq!(min_max.transform(&rows[1]), vec![0.0, 1.0]);

        let z = Scaler::fit(&rows, 2, Normalization::ZScore);
        assert_eq!(z.transform(&rows[0])[0], 0.0);
    }

    #[test]
    fn test_fit_is_deterministic() {
        let rows: Vec<Vec<f64>> = (0..500)
            .map(|i| vec![(i as f64 * 0.37).sin() * 1e3, (i as f64).sqrt()])
            .collect();
        let a = Scaler::fit(&rows, 2, Normalization::ZScore);
        let b = Scaler::fit(&rows, 2, Normalization::ZScore);
        assert_eq!(a, b);
    }

    #[test]
    fn test_extreme_values_stay_finite() {
        let rows = vec![vec![1e308], vec![-1e308], vec![0.0]];

        let min_max = Scaler::fit(&rows, 1, Normalization::MinMax);
        let scaled: Vec<f64> = rows.iter().map(|r| min_max.transform(r)[0]).collect();
        assert_eq!(scaled, vec![1.0, 0.0, 0.5]);

        let z = Scaler::fit(&rows, 1, Normalization::ZScore);
        for row in &rows {
            assert!(z.transform(row)[0].is_finite());
        }
        assert!(z.transform(&rows[0])[0] > 1.0);
        assert!(z.transform(&rows[1])[0] < -1.0);
    }
}
