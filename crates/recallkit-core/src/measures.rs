//! Concrete transition measures.

use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, Result};
use crate::model::{TrialRecord, TrialTable, Value};
use crate::traits::{BucketMeasure, DistanceMeasure};

fn int_value(record: &TrialRecord, key: &str) -> Option<i64> {
    record.get(key).and_then(|v| v.as_i64())
}

/// Lag between items on an integer column (serial position by default).
#[derive(Debug, Clone)]
pub struct LagMeasure {
    pub key: String,
    /// Largest absolute lag reported.
    pub max_lag: i64,
}

impl LagMeasure {
    /// Lags on `key` for lists of `list_length` items.
    pub fn new(key: impl Into<String>, list_length: i64) -> Self {
        Self {
            key: key.into(),
            max_lag: (list_length - 1).max(0),
        }
    }
}

impl BucketMeasure for LagMeasure {
    type Bucket = i64;

    fn bucket(&self, prev: &TrialRecord, candidate: &TrialRecord) -> Option<i64> {
        Some(int_value(candidate, &self.key)? - int_value(prev, &self.key)?)
    }

    fn domain(&self) -> Vec<i64> {
        (-self.max_lag..=self.max_lag).collect()
    }
}

/// Whether two items share a category label.
#[derive(Debug, Clone)]
pub struct CategoryMeasure {
    pub key: String,
}

impl BucketMeasure for CategoryMeasure {
    type Bucket = bool;

    fn bucket(&self, prev: &TrialRecord, candidate: &TrialRecord) -> Option<bool> {
        Some(prev.get(&self.key)? == candidate.get(&self.key)?)
    }

    fn domain(&self) -> Vec<bool> {
        vec![true]
    }

    fn count_unique(&self, _requested: bool) -> bool {
        true
    }
}

/// Square matrix of pairwise item distances, indexed from 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Vec<f64>>", into = "Vec<Vec<f64>>")]
pub struct DistanceMatrix {
    size: usize,
    values: Vec<f64>,
}

impl DistanceMatrix {
    pub fn new(rows: Vec<Vec<f64>>) -> Result<Self> {
        let size = rows.len();
        let mut values = Vec::with_capacity(size * size);
        for (row, cells) in rows.into_iter().enumerate() {
            if cells.len() != size {
                return Err(AnalysisError::NonSquareMatrix {
                    row,
                    found: cells.len(),
                    expected: size,
                });
            }
            if let Some(col) = cells.iter().position(|d| !d.is_finite()) {
                return Err(AnalysisError::invalid_value(
                    "distances",
                    format!("cell ({row}, {col}) is not a finite number"),
                ));
            }
            values.extend(cells);
        }
        Ok(Self { size, values })
    }

    /// Number of items.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn get(&self, i: usize, j: usize) -> Option<f64> {
        if i < self.size && j < self.size {
            Some(self.values[i * self.size + j])
        } else {
            None
        }
    }

    /// Matrix index addressed by a cell value.
    pub fn index_of(&self, value: &Value) -> Result<usize> {
        let index = value.as_i64().ok_or_else(|| AnalysisError::InvalidValue {
            column: "index".into(),
            message: format!("expected an integer item index, found {value}"),
        })?;
        usize::try_from(index)
            .ok()
            .filter(|&i| i < self.size)
            .ok_or(AnalysisError::IndexOutOfRange {
                index,
                size: self.size,
            })
    }

    /// Check that every studied or recalled item with an `index_key` value
    /// addresses the matrix.
    pub fn check_indices(&self, table: &TrialTable, index_key: &str) -> Result<()> {
        table.require_key(index_key)?;
        for record in table.records.iter().filter(|r| r.study || r.recall) {
            if let Some(value) = record.get(index_key) {
                self.index_of(&value).map_err(|e| match e {
                    AnalysisError::InvalidValue { message, .. } => {
                        AnalysisError::invalid_value(index_key, message)
                    }
                    other => other,
                })?;
            }
        }
        Ok(())
    }

    fn lookup(&self, prev: &TrialRecord, candidate: &TrialRecord, key: &str) -> Option<f64> {
        let i = usize::try_from(int_value(prev, key)?).ok()?;
        let j = usize::try_from(int_value(candidate, key)?).ok()?;
        self.get(i, j)
    }
}

impl TryFrom<Vec<Vec<f64>>> for DistanceMatrix {
    type Error = AnalysisError;

    fn try_from(rows: Vec<Vec<f64>>) -> Result<Self> {
        DistanceMatrix::new(rows)
    }
}

impl From<DistanceMatrix> for Vec<Vec<f64>> {
    fn from(matrix: DistanceMatrix) -> Self {
        if matrix.size == 0 {
            return Vec::new();
        }
        matrix
            .values
            .chunks(matrix.size)
            .map(|row| row.to_vec())
            .collect()
    }
}

/// Distance bins `(edges[i], edges[i + 1]]` with a label for each bin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistanceBins {
    edges: Vec<f64>,
    centers: Vec<f64>,
}

impl DistanceBins {
    /// Bins from strictly increasing edges. Labels default to the midpoint
    /// of each bin.
    pub fn new(edges: Vec<f64>, centers: Option<Vec<f64>>) -> Result<Self> {
        if edges.len() < 2
            || edges.iter().any(|e| e.is_nan())
            || edges.windows(2).any(|w| w[0] >= w[1])
        {
            return Err(AnalysisError::InvalidEdges);
        }
        let n_bins = edges.len() - 1;
        let centers = match centers {
            Some(centers) if centers.len() != n_bins => {
                return Err(AnalysisError::shape("bin centers", n_bins, centers.len()));
            }
            Some(centers) => centers,
            None => edges.windows(2).map(|w| w[0] + (w[1] - w[0]) / 2.0).collect(),
        };
        Ok(Self { edges, centers })
    }

    pub fn len(&self) -> usize {
        self.centers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.centers.is_empty()
    }

    pub fn edges(&self) -> &[f64] {
        &self.edges
    }

    pub fn centers(&self) -> &[f64] {
        &self.centers
    }

    /// Bin containing `distance`, if any.
    pub fn bin(&self, distance: f64) -> Option<usize> {
        self.edges
            .windows(2)
            .position(|w| w[0] < distance && distance <= w[1])
    }
}

/// Distance bin between items, looked up in a [`DistanceMatrix`].
#[derive(Debug, Clone)]
pub struct DistanceBinMeasure<'a> {
    pub index_key: &'a str,
    pub matrix: &'a DistanceMatrix,
    pub bins: &'a DistanceBins,
}

impl BucketMeasure for DistanceBinMeasure<'_> {
    type Bucket = usize;

    fn bucket(&self, prev: &TrialRecord, candidate: &TrialRecord) -> Option<usize> {
        let distance = self.matrix.lookup(prev, candidate, self.index_key)?;
        self.bins.bin(distance)
    }

    fn domain(&self) -> Vec<usize> {
        (0..self.bins.len()).collect()
    }
}

/// Transitions between specific item pairs, keyed by item index.
#[derive(Debug, Clone)]
pub struct PairMeasure {
    pub key: String,
    /// Number of distinct item indices, `0..n_items`.
    pub n_items: i64,
}

impl BucketMeasure for PairMeasure {
    type Bucket = (i64, i64);

    fn bucket(&self, prev: &TrialRecord, candidate: &TrialRecord) -> Option<(i64, i64)> {
        Some((int_value(prev, &self.key)?, int_value(candidate, &self.key)?))
    }

    fn domain(&self) -> Vec<(i64, i64)> {
        (0..self.n_items)
            .flat_map(|i| (0..self.n_items).map(move |j| (i, j)))
            .collect()
    }
}

/// Absolute lag between items.
#[derive(Debug, Clone)]
pub struct LagDistance {
    pub key: String,
}

impl DistanceMeasure for LagDistance {
    fn distance(&self, prev: &TrialRecord, candidate: &TrialRecord) -> Option<f64> {
        let lag = int_value(candidate, &self.key)? - int_value(prev, &self.key)?;
        Some(lag.abs() as f64)
    }
}

/// Distance between items looked up in a [`DistanceMatrix`].
#[derive(Debug, Clone)]
pub struct MatrixDistance<'a> {
    pub index_key: &'a str,
    pub matrix: &'a DistanceMatrix,
}

impl DistanceMeasure for MatrixDistance<'_> {
    fn distance(&self, prev: &TrialRecord, candidate: &TrialRecord) -> Option<f64> {
        self.matrix.lookup(prev, candidate, self.index_key)
    }
}
