//! Compound lag-CRP: transition lags conditioned on the previous lag.

use serde::{Deserialize, Serialize};

use rayon::prelude::*;

use crate::analysis::{check_options, list_length};
use crate::engine::{warn_if_filtered_out, Tally};
use crate::error::Result;
use crate::measures::LagMeasure;
use crate::model::{SubjectRecords, TrialTable};
use crate::traits::BucketMeasure;
use crate::transitions::{ListContext, TransitionOptions};

/// One (previous lag, current lag) cell for one subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompoundRow {
    pub subject: String,
    /// Lag of the transition before.
    pub previous: i64,
    /// Lag of the current transition.
    pub current: i64,
    pub prob: Option<f64>,
    pub actual: u64,
    pub possible: u64,
}

/// Tally transitions by the lag of the transition immediately before.
///
/// A transition is counted only when the previous transition ended on the
/// item it starts from, so the first transition of a list and the first one
/// after a repeat or intrusion are never counted.
pub fn tally_compound_subject(
    measure: &LagMeasure,
    subject: &SubjectRecords<'_>,
    options: &TransitionOptions,
) -> Tally<(i64, i64)> {
    let count_unique = measure.count_unique(options.count_unique);
    let mut tally = Tally::default();
    for list in &subject.lists {
        let context = ListContext::new(subject.subject, list, options.item_filter.as_ref());
        let transitions = context.transitions(options.test.as_ref());
        for pair in transitions.windows(2) {
            let (before, current) = (&pair[0], &pair[1]);
            if current.output != before.output + 1 {
                continue;
            }
            let Some(previous) = measure.bucket(before.prev, before.curr) else {
                continue;
            };
            let Some(actual) = measure.bucket(current.prev, current.curr) else {
                continue;
            };
            let candidates = current
                .candidates
                .iter()
                .filter_map(|c| measure.bucket(current.prev, c))
                .map(|lag| (previous, lag));
            tally.record((previous, actual), candidates, count_unique);
        }
    }
    tally
}

/// Lag-CRP conditioned on the previous transition's lag.
pub fn compound_lag_crp(
    table: &TrialTable,
    lag_key: &str,
    options: &TransitionOptions,
) -> Result<Vec<CompoundRow>> {
    if table.is_empty() {
        return Ok(Vec::new());
    }
    check_options(table, options)?;
    let measure = LagMeasure::new(lag_key, list_length(table, lag_key)?);
    warn_if_filtered_out(table, options);

    let lags = measure.domain();
    let tallies: Vec<(String, Tally<(i64, i64)>)> = table
        .subjects()
        .par_iter()
        .map(|s| (s.subject.to_string(), tally_compound_subject(&measure, s, options)))
        .collect();

    let mut rows = Vec::with_capacity(tallies.len() * lags.len() * lags.len());
    for (subject, tally) in tallies {
        for &previous in &lags {
            for &current in &lags {
                let cell = (previous, current);
                rows.push(CompoundRow {
                    subject: subject.clone(),
                    previous,
                    current,
                    prob: tally.prob(&cell),
                    actual: tally.actual(&cell),
                    possible: tally.possible(&cell),
                });
            }
        }
    }
    Ok(rows)
}
