//! KD-tree backend over `kiddo`.
//!
//! Kiddo's trees are fixed-width, so points narrower than [`FEATURE_DIM`] are
//! zero-padded; padding never changes a distance. The tree only proposes
//! candidates. Each one is re-measured against the stored point and ranked by
//! `(distance, row)`, the same order the exhaustive scan produces.
//!
//! Only the points are persisted; the tree is rebuilt when read back.

use super::{KnnHeap, NearestNeighbors, Neighbor};
use crate::config::Metric;
use crate::error::{FeatureError, Result};
use crate::matrix::FeatureMatrix;
use catalog::FEATURE_DIM;
use kiddo::{ImmutableKdTree, Manhattan, SquaredEuclidean};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::num::NonZero;

type Tree = ImmutableKdTree<f64, FEATURE_DIM>;

/// Relative slack on the tie-gathering radius, covering rounding differences
/// between kiddo's distances and [`Metric::reduced`].
const RADIUS_SLACK: f64 = 1e-9;

pub struct KdTree {
    metric: Metric,
    dim: usize,
    /// Row-major copy of the indexed points
    points: Vec<f64>,
    /// `None` for an empty matrix
    tree: Option<Tree>,
}

impl KdTree {
    pub fn build(matrix: &FeatureMatrix, metric: Metric) -> Result<Self> {
        Self::from_points(matrix.as_slice().to_vec(), matrix.dim(), metric)
    }

    fn from_points(points: Vec<f64>, dim: usize, metric: Metric) -> Result<Self> {
        if dim == 0 || dim > FEATURE_DIM || points.len() % dim != 0 {
            return Err(FeatureError::DimensionMismatch {
                expected: FEATURE_DIM,
                found: dim,
            });
        }
        let tree = build_tree(&points, dim);
        Ok(Self {
            metric,
            dim,
            points,
            tree,
        })
    }

    pub(crate) fn points(&self) -> &[f64] {
        &self.points
    }

    fn nearest_rows(&self, tree: &Tree, query: &[f64; FEATURE_DIM], qty: NonZero<usize>) -> Vec<usize> {
        let hits = match self.metric {
            Metric::Euclidean => tree.nearest_n::<SquaredEuclidean>(query, qty),
            Metric::Manhattan => tree.nearest_n::<Manhattan>(query, qty),
        };
        hits.into_iter().map(|hit| hit.item as usize).collect()
    }

    fn rows_within(&self, tree: &Tree, query: &[f64; FEATURE_DIM], radius: f64) -> Vec<usize> {
        let hits = match self.metric {
            Metric::Euclidean => tree.within::<SquaredEuclidean>(query, radius),
            Metric::Manhattan => tree.within::<Manhattan>(query, radius),
        };
        hits.into_iter().map(|hit| hit.item as usize).collect()
    }
}

fn pad(point: &[f64]) -> [f64; FEATURE_DIM] {
    let mut padded = [0.0; FEATURE_DIM];
    padded[..point.len()].copy_from_slice(point);
    padded
}

fn build_tree(points: &[f64], dim: usize) -> Option<Tree> {
    let padded: Vec<[f64; FEATURE_DIM]> = points.chunks_exact(dim).map(pad).collect();
    if padded.is_empty() {
        None
    } else {
        Some(Tree::new_from_slice(&padded))
    }
}

impl NearestNeighbors for KdTree {
    fn search(&self, query: &[f64], k: usize) -> Vec<Neighbor> {
        let (Some(tree), Some(qty)) = (&self.tree, NonZero::new(k.min(self.len()))) else {
            return Vec::new();
        };
        if query.len() != self.dim {
            return Vec::new();
        }
        let padded = pad(query);

        // Rows tied with the farthest of kiddo's picks may outrank it on row
        // index, so gather everything out to that distance before ranking.
        let nearest = self.nearest_rows(tree, &padded, qty);
        let radius = nearest
            .iter()
            .filter_map(|&row| self.point(row))
            .map(|point| self.metric.reduced(query, point))
            .fold(0.0, f64::max);
        let mut candidates = self.rows_within(tree, &padded, radius + radius * RADIUS_SLACK + f64::EPSILON);
        candidates.extend(nearest);
        candidates.sort_unstable();
        candidates.dedup();

        let mut heap = KnnHeap::new(k);
        for row in candidates {
            if let Some(point) = self.point(row) {
                heap.offer(self.metric.reduced(query, point), row);
            }
        }
        heap.into_neighbors(self.metric)
    }

    fn len(&self) -> usize {
        self.points.len() / self.dim
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn metric(&self) -> Metric {
        self.metric
    }

    fn point(&self, row: usize) -> Option<&[f64]> {
        self.points.get(row * self.dim..(row + 1) * self.dim)
    }
}

impl Clone for KdTree {
    fn clone(&self) -> Self {
        Self {
            metric: self.metric,
            dim: self.dim,
            points: self.points.clone(),
            tree: build_tree(&self.points, self.dim),
        }
    }
}

impl fmt::Debug for KdTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KdTree")
            .field("metric", &self.metric)
            .field("dim", &self.dim)
            .field("len", &self.len())
            .finish()
    }
}

#[derive(Serialize)]
struct StoredPointsRef<'a> {
    metric: Metric,
    dim: usize,
    points: &'a [f64],
}

#[derive(Deserialize)]
struct StoredPoints {
    metric: Metric,
    dim: usize,
    points: Vec<f64>,
}

impl Serialize for KdTree {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        StoredPointsRef {
            metric: self.metric,
            dim: self.dim,
            points: &self.points,
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for KdTree {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let stored = StoredPoints::deserialize(deserializer)?;
        KdTree::from_points(stored.points, stored.dim, stored.metric).map_err(serde::de::Error::custom)
    }
}
