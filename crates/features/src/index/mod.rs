//! Nearest-neighbor indices over the feature matrix.
//!
//! Both implementations return the `k` closest rows ordered by
//! `(distance, row)`. Breaking distance ties on the row index makes results
//! reproducible and identical between the tree and the exhaustive scan.

mod brute;
mod kdtree;

pub use brute::BruteForce;
pub use kdtree::KdTree;

use crate::config::{IndexAlgorithm, Metric};
use crate::error::Result;
use crate::matrix::FeatureMatrix;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// One search hit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub row: usize,
    pub distance: f64,
}

/// Core trait for k-nearest-neighbor search.
///
/// `Send + Sync` so one index can serve any number of concurrent queries.
pub trait NearestNeighbors: Send + Sync {
    /// The `k` closest rows to `query`, closest first. Fewer than `k` when
    /// the index holds fewer points.
    fn search(&self, query: &[f64], k: usize) -> Vec<Neighbor>;

    /// Number of indexed points
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Width of every indexed point
    fn dim(&self) -> usize;

    fn metric(&self) -> Metric;

    /// Stored copy of point `row`.
    fn point(&self, row: usize) -> Option<&[f64]>;
}

/// A fitted index of either kind, as persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "algorithm", rename_all = "lowercase")]
pub enum NeighborIndex {
    KdTree(KdTree),
    Brute(BruteForce),
}

impl NeighborIndex {
    /// Fit an index over every row of `matrix`.
    pub fn build(matrix: &FeatureMatrix, algorithm: IndexAlgorithm, metric: Metric) -> Result<Self> {
        Ok(match algorithm {
            IndexAlgorithm::KdTree => NeighborIndex::KdTree(KdTree::build(matrix, metric)?),
            IndexAlgorithm::Brute => NeighborIndex::Brute(BruteForce::build(matrix, metric)),
        })
    }

    pub fn algorithm(&self) -> IndexAlgorithm {
        match self {
            NeighborIndex::KdTree(_) => IndexAlgorithm::KdTree,
            NeighborIndex::Brute(_) => IndexAlgorithm::Brute,
        }
    }

    fn inner(&self) -> &dyn NearestNeighbors {
        match self {
            NeighborIndex::KdTree(tree) => tree,
            NeighborIndex::Brute(brute) => brute,
        }
    }

    /// True when the index holds exactly the points of `matrix`, in order.
    pub fn matches(&self, matrix: &FeatureMatrix) -> bool {
        let points = match self {
            NeighborIndex::KdTree(tree) => tree.points(),
            NeighborIndex::Brute(brute) if brute.is_well_formed() => brute.points(),
            NeighborIndex::Brute(_) => return false,
        };
        self.len() == matrix.rows()
            && self.dim() == matrix.dim()
            && points == matrix.as_slice()
    }
}

impl NearestNeighbors for NeighborIndex {
    fn search(&self, query: &[f64], k: usize) -> Vec<Neighbor> {
        self.inner().search(query, k)
    }

    fn len(&self) -> usize {
        self.inner().len()
    }

    fn dim(&self) -> usize {
        self.inner().dim()
    }

    fn metric(&self) -> Metric {
        self.inner().metric()
    }

    fn point(&self, row: usize) -> Option<&[f64]> {
        self.inner().point(row)
    }
}

// =============================================================================
// Distance helpers
// =============================================================================

impl Metric {
    /// Distance in "reduced" form: squared for Euclidean, so the square root
    /// is only taken once per returned hit.
    pub(crate) fn reduced(&self, a: &[f64], b: &[f64]) -> f64 {
        match self {
            Metric::Euclidean => a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum(),
            Metric::Manhattan => a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum(),
        }
    }

    /// Convert a reduced distance to the real one.
    pub(crate) fn finish(&self, reduced: f64) -> f64 {
        match self {
            Metric::Euclidean => reduced.sqrt(),
            Metric::Manhattan => reduced,
        }
    }

    /// Full distance between two vectors.
    pub fn distance(&self, a: &[f64], b: &[f64]) -> f64 {
        self.finish(self.reduced(a, b))
    }
}

/// Heap entry ordered by `(distance, row)`.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    reduced: f64,
    row: usize,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.reduced
            .total_cmp(&other.reduced)
            .then_with(|| self.row.cmp(&other.row))
    }
}

/// Bounded max-heap keeping the `k` best candidates seen so far.
pub(crate) struct KnnHeap {
    k: usize,
    heap: BinaryHeap<Candidate>,
}

impl KnnHeap {
    pub(crate) fn new(k: usize) -> Self {
        Self {
            k,
            heap: BinaryHeap::with_capacity(k.saturating_add(1).min(1024)),
        }
    }

    pub(crate) fn offer(&mut self, reduced: f64, row: usize) {
        if self.k == 0 {
            return;
        }
        let candidate = Candidate { reduced, row };
        if self.heap.len() < self.k {
            self.heap.push(candidate);
        } else if let Some(worst) = self.heap.peek() {
            if candidate < *worst {
                self.heap.pop();
                self.heap.push(candidate);
            }
        }
    }

    /// Kept candidates as `(reduced distance, row)`, best first.
    pub(crate) fn into_reduced(self) -> Vec<(f64, usize)> {
        self.heap
            .into_sorted_vec()
            .into_iter()
            .map(|c| (c.reduced, c.row))
            .collect()
    }

    pub(crate) fn into_neighbors(self, metric: Metric) -> Vec<Neighbor> {
        self.heap
            .into_sorted_vec()
            .into_iter()
            .map(|c| Neighbor {
                row: c.row,
                distance: metric.finish(c.reduced),
            })
            .collect()
    }
}
