//! Clustering analyses over a scored trial table.
//!
//! Each function returns one row per subject (and bucket), in canonical
//! subject order. Probabilities and ranks are `None` where nothing
//! was possible.

use serde::{Deserialize, Serialize};

use crate::engine::{mean_rank, ranks_by_subject, tally_by_subject};
use crate::error::{AnalysisError, Result};
use crate::measures::{
    CategoryMeasure, DistanceBinMeasure, DistanceBins, DistanceMatrix, LagDistance, LagMeasure,
    MatrixDistance, PairMeasure,
};
use crate::model::TrialTable;
use crate::traits::BucketMeasure;
use crate::transitions::TransitionOptions;

/// Lag-CRP cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LagCrpRow {
    pub subject: String,
    pub lag: i64,
    pub prob: Option<f64>,
    pub actual: u64,
    pub possible: u64,
}

/// Within-category transition probability for one subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryCrpRow {
    pub subject: String,
    pub prob: Option<f64>,
    pub actual: u64,
    pub possible: u64,
}

/// Distance-CRP bin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistanceCrpRow {
    pub subject: String,
    /// Bin index, starting at 0.
    pub bin: usize,
    /// Bin label.
    pub center: f64,
    pub prob: Option<f64>,
    pub actual: u64,
    pub possible: u64,
}

/// Item-pair CRP cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairCrpRow {
    pub subject: String,
    /// Index of the item recalled first.
    pub prev: i64,
    /// Index of the item recalled next.
    pub curr: i64,
    pub prob: Option<f64>,
    pub actual: u64,
    pub possible: u64,
}

/// Mean transition rank for one subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankRow {
    pub subject: String,
    pub rank: Option<f64>,
}

/// Validate the columns the options refer to.
pub(crate) fn check_options(table: &TrialTable, options: &TransitionOptions) -> Result<()> {
    if let Some(test) = &options.test {
        table.require_key(test.key())?;
    }
    Ok(())
}

/// Largest value of an integer column among studied items.
pub(crate) fn list_length(table: &TrialTable, key: &str) -> Result<i64> {
    table.require_key(key)?;
    table
        .max_study_value(key)
        .ok_or_else(|| AnalysisError::invalid_value(key, "no integer values among studied items"))
}

/// Conditional response probability by lag.
///
/// Lags run over `-(L - 1)..=(L - 1)` where `L` is the largest value of
/// `lag_key` among studied items.
pub fn lag_crp(
    table: &TrialTable,
    lag_key: &str,
    options: &TransitionOptions,
) -> Result<Vec<LagCrpRow>> {
    if table.is_empty() {
        return Ok(Vec::new());
    }
    check_options(table, options)?;
    let measure = LagMeasure::new(lag_key, list_length(table, lag_key)?);
    let lags = measure.domain();

    let mut rows = Vec::new();
    for (subject, tally) in tally_by_subject(table, &measure, options) {
        for &lag in &lags {
            rows.push(LagCrpRow {
                subject: subject.clone(),
                lag,
                prob: tally.prob(&lag),
                actual: tally.actual(&lag),
                possible: tally.possible(&lag),
            });
        }
    }
    Ok(rows)
}

/// Probability of a within-category transition when one was possible.
///
/// Possible transitions are counted once per transition.
pub fn category_crp(
    table: &TrialTable,
    category_key: &str,
    options: &TransitionOptions,
) -> Result<Vec<CategoryCrpRow>> {
    if table.is_empty() {
        return Ok(Vec::new());
    }
    check_options(table, options)?;
    table.require_key(category_key)?;
    let measure = CategoryMeasure {
        key: category_key.to_string(),
    };

    Ok(tally_by_subject(table, &measure, options)
        .into_iter()
        .map(|(subject, tally)| CategoryCrpRow {
            subject,
            prob: tally.prob(&true),
            actual: tally.actual(&true),
            possible: tally.possible(&true),
        })
        .collect())
}

/// Conditional response probability by binned item distance.
pub fn distance_crp(
    table: &TrialTable,
    index_key: &str,
    matrix: &DistanceMatrix,
    bins: &DistanceBins,
    options: &TransitionOptions,
) -> Result<Vec<DistanceCrpRow>> {
    if table.is_empty() {
        return Ok(Vec::new());
    }
    check_options(table, options)?;
    matrix.check_indices(table, index_key)?;
    let measure = DistanceBinMeasure {
        index_key,
        matrix,
        bins,
    };

    let mut rows = Vec::new();
    for (subject, tally) in tally_by_subject(table, &measure, options) {
        for (bin, &center) in bins.centers().iter().enumerate() {
            rows.push(DistanceCrpRow {
                subject: subject.clone(),
                bin,
                center,
                prob: tally.prob(&bin),
                actual: tally.actual(&bin),
                possible: tally.possible(&bin),
            });
        }
    }
    Ok(rows)
}

/// Conditional response probability for each pair of items.
///
/// Items are identified by the integer column `index_key`, numbered from 0.
pub fn pair_crp(
    table: &TrialTable,
    index_key: &str,
    options: &TransitionOptions,
) -> Result<Vec<PairCrpRow>> {
    if table.is_empty() {
        return Ok(Vec::new());
    }
    check_options(table, options)?;
    let measure = PairMeasure {
        key: index_key.to_string(),
        n_items: list_length(table, index_key)? + 1,
    };
    let cells = measure.domain();

    let mut rows = Vec::new();
    for (subject, tally) in tally_by_subject(table, &measure, options) {
        for cell in &cells {
            rows.push(PairCrpRow {
                subject: subject.clone(),
                prev: cell.0,
                curr: cell.1,
                prob: tally.prob(cell),
                actual: tally.actual(cell),
                possible: tally.possible(cell),
            });
        }
    }
    Ok(rows)
}

/// Mean percentile rank of absolute serial-position lags.
pub fn lag_rank(table: &TrialTable, options: &TransitionOptions) -> Result<Vec<RankRow>> {
    if table.is_empty() {
        return Ok(Vec::new());
    }
    check_options(table, options)?;
    let measure = LagDistance {
        key: "input".to_string(),
    };
    Ok(ranks_by_subject(table, &measure, options)
        .into_iter()
        .map(|(subject, ranks)| RankRow {
            subject,
            rank: mean_rank(&ranks),
        })
        .collect())
}

/// Mean percentile rank of transition distances.
pub fn distance_rank(
    table: &TrialTable,
    index_key: &str,
    matrix: &DistanceMatrix,
    options: &TransitionOptions,
) -> Result<Vec<RankRow>> {
    if table.is_empty() {
        return Ok(Vec::new());
    }
    check_options(table, options)?;
    matrix.check_indices(table, index_key)?;
    let measure = MatrixDistance { index_key, matrix };
    Ok(ranks_by_subject(table, &measure, options)
        .into_iter()
        .map(|(subject, ranks)| RankRow {
            subject,
            rank: mean_rank(&ranks),
        })
        .collect())
}
