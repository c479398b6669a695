//! Transition analysis engine.
//!
//! Tallies actual and possible transitions per subject for any
//! [`BucketMeasure`], and ranks actual transitions among their candidates for
//! any [`DistanceMeasure`]. Subjects are independent, so each one is
//! processed on the rayon pool with a private tally.

use std::collections::{BTreeMap, BTreeSet};

use rayon::prelude::*;

use crate::model::{SubjectRecords, TrialTable};
use crate::traits::{BucketMeasure, DistanceMeasure};
use crate::transitions::{ListContext, TransitionOptions};

/// Actual and possible transition counts by bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tally<B: Ord> {
    pub actual: BTreeMap<B, u64>,
    pub possible: BTreeMap<B, u64>,
    /// Number of transitions recorded.
    pub transitions: u64,
}

impl<B: Ord> Default for Tally<B> {
    fn default() -> Self {
        Self {
            actual: BTreeMap::new(),
            possible: BTreeMap::new(),
            transitions: 0,
        }
    }
}

impl<B: Ord + Clone> Tally<B> {
    /// Record one transition: its actual bucket and the buckets of every
    /// candidate that could have been recalled instead.
    pub fn record(
        &mut self,
        actual: B,
        candidates: impl IntoIterator<Item = B>,
        count_unique: bool,
    ) {
        *self.actual.entry(actual).or_insert(0) += 1;
        self.transitions += 1;
        if count_unique {
            let unique: BTreeSet<B> = candidates.into_iter().collect();
            for bucket in unique {
                *self.possible.entry(bucket).or_insert(0) += 1;
            }
        } else {
            for bucket in candidates {
                *self.possible.entry(bucket).or_insert(0) += 1;
            }
        }
    }

    pub fn merge(&mut self, other: Tally<B>) {
        for (bucket, n) in other.actual {
            *self.actual.entry(bucket).or_insert(0) += n;
        }
        for (bucket, n) in other.possible {
            *self.possible.entry(bucket).or_insert(0) += n;
        }
        self.transitions += other.transitions;
    }

    pub fn actual(&self, bucket: &B) -> u64 {
        self.actual.get(bucket).copied().unwrap_or(0)
    }

    pub fn possible(&self, bucket: &B) -> u64 {
        self.possible.get(bucket).copied().unwrap_or(0)
    }

    /// Conditional probability of a bucket; `None` when it was never possible.
    pub fn prob(&self, bucket: &B) -> Option<f64> {
        match self.possible(bucket) {
            0 => None,
            possible => Some(self.actual(bucket) as f64 / possible as f64),
        }
    }
}

pub(crate) fn warn_if_filtered_out(table: &TrialTable, options: &TransitionOptions) {
    let Some(filter) = &options.item_filter else {
        return;
    };
    let studied = table.records.iter().filter(|r| r.study);
    if !table.is_empty() && !studied.clone().any(|r| filter.matches(r)) {
        tracing::warn!(
            studied = studied.count(),
            "item filter excludes every studied item; no transitions will be counted"
        );
    }
}

/// Tally every transition of one subject.
///
/// Transitions whose actual bucket is undefined are skipped so that the
/// actual counts always sum to the number of recorded transitions.
pub fn tally_subject<M: BucketMeasure + ?Sized>(
    measure: &M,
    subject: &SubjectRecords<'_>,
    options: &TransitionOptions,
) -> Tally<M::Bucket> {
    let count_unique = measure.count_unique(options.count_unique);
    let mut tally = Tally::default();
    for list in &subject.lists {
        let context = ListContext::new(subject.subject, list, options.item_filter.as_ref());
        let mut list_tally = Tally::default();
        for transition in context.transitions(options.test.as_ref()) {
            let Some(actual) = measure.bucket(transition.prev, transition.curr) else {
                continue;
            };
            let candidates = transition
                .candidates
                .iter()
                .filter_map(|c| measure.bucket(transition.prev, c));
            list_tally.record(actual, candidates, count_unique);
        }
        tally.merge(list_tally);
    }
    tally
}

/// Tally each subject in parallel, in subject order.
pub fn tally_by_subject<M: BucketMeasure + ?Sized>(
    table: &TrialTable,
    measure: &M,
    options: &TransitionOptions,
) -> Vec<(String, Tally<M::Bucket>)> {
    warn_if_filtered_out(table, options);
    let subjects = table.subjects();
    let tallies: Vec<(String, Tally<M::Bucket>)> = subjects
        .par_iter()
        .map(|s| (s.subject.to_string(), tally_subject(measure, s, options)))
        .collect();
    tracing::debug!(
        subjects = tallies.len(),
        transitions = tallies.iter().map(|(_, t)| t.transitions).sum::<u64>(),
        "tallied transitions"
    );
    tallies
}

/// Percentile rank of an actual distance among the possible distances.
///
/// 1 means the actual item was the closest candidate and 0 the farthest.
/// Ties share the average of their rank positions. Non-finite candidate
/// distances are ignored. Undefined with fewer than two candidates or a
/// non-finite actual distance.
pub fn percentile_rank(actual: f64, possible: &[f64]) -> Option<f64> {
    if !actual.is_finite() {
        return None;
    }
    let finite: Vec<f64> = possible.iter().copied().filter(|d| d.is_finite()).collect();
    let n = finite.len();
    if n < 2 {
        return None;
    }
    let below = finite.iter().filter(|&&d| d < actual).count() as f64;
    let tied = finite.iter().filter(|&&d| d == actual).count() as f64;
    let rank = below + (tied + 1.0) / 2.0;
    Some(1.0 - (rank - 1.0) / (n as f64 - 1.0))
}

/// Rank of every transition of one subject, in list and output order.
pub fn transition_ranks<D: DistanceMeasure + ?Sized>(
    measure: &D,
    subject: &SubjectRecords<'_>,
    options: &TransitionOptions,
) -> Vec<Option<f64>> {
    let mut ranks = Vec::new();
    for list in &subject.lists {
        let context = ListContext::new(subject.subject, list, options.item_filter.as_ref());
        for transition in context.transitions(options.test.as_ref()) {
            let Some(actual) = measure.distance(transition.prev, transition.curr) else {
                continue;
            };
            let possible: Vec<f64> = transition
                .candidates
                .iter()
                .filter_map(|c| measure.distance(transition.prev, c))
                .collect();
            ranks.push(percentile_rank(actual, &possible));
        }
    }
    ranks
}

/// Mean of the defined ranks.
pub fn mean_rank(ranks: &[Option<f64>]) -> Option<f64> {
    let defined: Vec<f64> = ranks.iter().flatten().copied().collect();
    if defined.is_empty() {
        None
    } else {
        Some(defined.iter().sum::<f64>() / defined.len() as f64)
    }
}

/// Transition ranks for each subject in parallel, in subject order.
pub fn ranks_by_subject<D: DistanceMeasure + ?Sized>(
    table: &TrialTable,
    measure: &D,
    options: &TransitionOptions,
) -> Vec<(String, Vec<Option<f64>>)> {
    warn_if_filtered_out(table, options);
    table
        .subjects()
        .par_iter()
        .map(|s| (s.subject.to_string(), transition_ranks(measure, s, options)))
        .collect()
}
