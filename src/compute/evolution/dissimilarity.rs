//! Pairwise dissimilarity matrices.
//!
//! The simulator computes the raw square matrix. Downstream code works on the
//! diagonal-free [`ComparisonMatrix`], where row `i` holds the dissimilarities
//! from genotype `i` to every other genotype.

use crate::schema::Normalization;

use super::simulator::Simulator;

/// Square row-major matrix of pairwise dissimilarities.
#[derive(Debug, Clone, PartialEq)]
pub struct DissimilarityMatrix {
    size: usize,
    values: Vec<f64>,
}

impl DissimilarityMatrix {
    /// All-zero `size x size` matrix.
    pub fn zeros(size: usize) -> Self {
        Self {
            size,
            values: vec![0.0; size * size],
        }
    }

    /// Matrix from rows; `None` unless the rows form a `size x size` square.
    pub fn from_rows(rows: Vec<Vec<f64>>, size: usize) -> Option<Self> {
        if rows.len() != size || rows.iter().any(|r| r.len() != size) {
            return None;
        }
        Some(Self {
            size,
            values: rows.into_iter().flatten().collect(),
        })
    }

    /// Number of genotypes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Dissimilarity between two genotypes.
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.values[row * self.size + col]
    }

    /// Dissimilarities from genotype `row`.
    pub fn row(&self, row: usize) -> &[f64] {
        &self.values[row * self.size..(row + 1) * self.size]
    }

    /// Check if every entry is zero.
    pub fn is_zero(&self) -> bool {
        self.values.iter().all(|&v| v == 0.0)
    }

    /// Drop the diagonal, leaving `size x (size - 1)` comparisons.
    pub fn without_diagonal(&self) -> ComparisonMatrix {
        let n = self.size;
        let cols = n.saturating_sub(1);
        let mut values = Vec::with_capacity(n * cols);
        for i in 0..n {
            values.extend(
                self.row(i)
                    .iter()
                    .enumerate()
                    .filter(|&(j, _)| j != i)
                    .map(|(_, &v)| v),
            );
        }
        ComparisonMatrix {
            rows: n,
            cols,
            values,
        }
    }
}

/// Dissimilarities without self-comparisons: entry `(i, x)` compares `i` with
/// genotype `x` if `x < i`, else with `x + 1`.
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonMatrix {
    rows: usize,
    cols: usize,
    values: Vec<f64>,
}

impl ComparisonMatrix {
    /// Number of genotypes.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Comparisons per genotype.
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Comparisons of genotype `row`.
    pub fn row(&self, row: usize) -> &[f64] {
        &self.values[row * self.cols..(row + 1) * self.cols]
    }

    /// Genotype index of column `col` in row `row`.
    pub fn genotype_index(row: usize, col: usize) -> usize {
        if col >= row { col + 1 } else { col }
    }

    /// Scale all entries by the largest entry or their sum. A zero divisor leaves
    /// the matrix untouched.
    pub fn normalize(&mut self, method: Normalization) {
        let divisor = match method {
            Normalization::None => return,
            Normalization::Max => self.values.iter().copied().fold(0.0, f64::max),
            Normalization::Sum => self.values.iter().sum(),
        };
        if divisor == 0.0 {
            return;
        }
        for v in self.values.iter_mut() {
            *v /= divisor;
        }
    }

    /// Mean of each row.
    pub fn row_means(&self) -> Vec<f64> {
        (0..self.rows).map(|i| mean(self.row(i))).collect()
    }

    /// Mean of the `k` smallest entries of each row; `k == 0` means every entry.
    pub fn knn_means(&self, k: usize) -> Vec<f64> {
        if k == 0 || k >= self.cols {
            return self.row_means();
        }
        (0..self.rows)
            .map(|i| {
                let mut row = self.row(i).to_vec();
                row.select_nth_unstable_by(k - 1, f64::total_cmp);
                mean(&row[..k])
            })
            .collect()
    }

    /// Genotype indices of the `k` nearest neighbours of row `row`, in no
    /// particular order. `k == 0` means every other genotype.
    pub fn nearest(&self, row: usize, k: usize) -> Vec<usize> {
        let mut cols: Vec<usize> = (0..self.cols).collect();
        if k > 0 && k < self.cols {
            let values = self.row(row);
            cols.select_nth_unstable_by(k - 1, |&a, &b| values[a].total_cmp(&values[b]));
            cols.truncate(k);
        }
        cols.into_iter()
            .map(|c| Self::genotype_index(row, c))
            .collect()
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Computes dissimilarity matrices through the simulator, degrading to an
/// all-zero matrix when the computation fails.
#[derive(Debug, Clone, Copy)]
pub struct DissimilarityEngine {
    method: i32,
}

impl DissimilarityEngine {
    /// Create an engine for a simulator dissimilarity method.
    pub fn new(method: i32) -> Self {
        Self { method }
    }

    /// Simulator dissimilarity method.
    pub fn method(&self) -> i32 {
        self.method
    }

    /// Dissimilarity matrix of `genotypes`, all zeros if the simulator fails.
    pub fn compute<S: Simulator + ?Sized>(
        &self,
        simulator: &mut S,
        genotypes: &[String],
    ) -> DissimilarityMatrix {
        let k = genotypes.len();
        match simulator.dissimilarity(genotypes, self.method) {
            Ok(rows) => DissimilarityMatrix::from_rows(rows, k).unwrap_or_else(|| {
                log::error!(
                    "Dissimilarity (method {}) returned a malformed matrix for {k} genotypes, using zeros",
                    self.method
                );
                DissimilarityMatrix::zeros(k)
            }),
            Err(e) => {
                log::error!(
                    "Dissimilarity (method {}) failed for {k} genotypes, using zeros: {e}",
                    self.method
                );
                DissimilarityMatrix::zeros(k)
            }
        }
    }
}
