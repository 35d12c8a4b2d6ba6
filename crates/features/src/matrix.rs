//! Row-major feature matrix.

use crate::error::{FeatureError, Result};
use serde::{Deserialize, Serialize};

/// `rows × dim` matrix of normalized feature values.
///
/// Row *i* always describes the song on row *i* of the song table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureMatrix {
    rows: usize,
    dim: usize,
    data: Vec<f64>,
}

impl FeatureMatrix {
    /// Build from equally wide rows.
    pub fn from_rows<R: AsRef<[f64]>>(rows: &[R], dim: usize) -> Result<Self> {
        let mut data = Vec::with_capacity(rows.len() * dim);
        for row in rows {
            let row = row.as_ref();
            if row.len() != dim {
                return Err(FeatureError::DimensionMismatch {
                    expected: dim,
                    found: row.len(),
                });
            }
            data.extend_from_slice(row);
        }
        Ok(Self {
            rows: rows.len(),
            dim,
            data,
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn row(&self, row: usize) -> Option<&[f64]> {
        if row >= self.rows {
            return None;
        }
        self.data.get(row * self.dim..(row + 1) * self.dim)
    }

    pub fn iter_rows(&self) -> impl Iterator<Item = &[f64]> {
        // chunks_exact(0) panics; a zero-width matrix has no usable rows anyway
        self.data.chunks_exact(self.dim.max(1)).take(self.rows)
    }

    /// The raw row-major buffer.
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// True when the stored dimensions agree with the buffer length.
    pub fn is_consistent(&self) -> bool {
        self.data.len() == self.rows * self.dim
    }
}
