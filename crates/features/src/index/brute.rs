//! Exhaustive scan. Linear per query, but no build cost and trivially
//! correct; also the reference the KD-tree is tested against.

use super::{KnnHeap, NearestNeighbors, Neighbor};
use crate::config::Metric;
use crate::matrix::FeatureMatrix;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Above this many points a scan is split across the rayon pool.
const PARALLEL_SCAN_MIN: usize = 50_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BruteForce {
    metric: Metric,
    dim: usize,
    points: Vec<f64>,
}

impl BruteForce {
    pub fn build(matrix: &FeatureMatrix, metric: Metric) -> Self {
        Self {
            metric,
            dim: matrix.dim(),
            points: matrix.as_slice().to_vec(),
        }
    }

    pub(crate) fn points(&self) -> &[f64] {
        &self.points
    }

    pub(crate) fn is_well_formed(&self) -> bool {
        self.dim > 0 && self.points.len() % self.dim == 0
    }

    fn scan(&self, query: &[f64], k: usize, range: std::ops::Range<usize>) -> KnnHeap {
        let mut heap = KnnHeap::new(k);
        for row in range {
            let point = &self.points[row * self.dim..(row + 1) * self.dim];
            heap.offer(self.metric.reduced(query, point), row);
        }
        heap
    }
}

impl NearestNeighbors for BruteForce {
    fn search(&self, query: &[f64], k: usize) -> Vec<Neighbor> {
        let len = self.len();
        if query.len() != self.dim || len == 0 {
            return Vec::new();
        }

        if len < PARALLEL_SCAN_MIN {
            return self.scan(query, k, 0..len).into_neighbors(self.metric);
        }

        // Each chunk keeps its own k best; merging them is exact because the
        // (distance, row) order is total.
        let chunk = PARALLEL_SCAN_MIN / 4;
        let starts: Vec<usize> = (0..len).step_by(chunk).collect();
        let partials: Vec<Vec<(f64, usize)>> = starts
            .par_iter()
            .map(|&start| self.scan(query, k, start..(start + chunk).min(len)).into_reduced())
            .collect();

        let mut merged = KnnHeap::new(k);
        for (reduced, row) in partials.into_iter().flatten() {
            merged.offer(reduced, row);
        }
        merged.into_neighbors(self.metric)
    }

    fn len(&self) -> usize {
        self.points.len().checked_div(self.dim).unwrap_or(0)
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn metric(&self) -> Metric {
        self.metric
    }

    fn point(&self, row: usize) -> Option<&[f64]> {
        if row < self.len() {
            Some(&self.points[row * self.dim..(row + 1) * self.dim])
        } else {
            None
        }
    }
}
