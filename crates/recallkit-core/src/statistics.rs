//! Recall statistics that do not depend on transitions: serial position
//! curves, probability of nth recall, and prior-list intrusion lags.

use std::collections::{BTreeMap, BTreeSet};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::analysis::{check_options, list_length};
use crate::engine::{warn_if_filtered_out, Tally};
use crate::error::Result;
use crate::model::{SubjectRecords, TrialRecord, TrialTable};
use crate::transitions::{pool_index, ListContext, TransitionOptions};

/// Recall probability at one serial position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpcRow {
    pub subject: String,
    pub input: u32,
    pub recall: f64,
}

/// Probability of recalling serial position `input` at output position
/// `output`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PnrRow {
    pub subject: String,
    pub output: u32,
    pub input: u32,
    pub prob: Option<f64>,
    pub actual: u64,
    pub possible: u64,
}

/// Prior-list intrusions at one list lag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PliRow {
    pub subject: String,
    /// Current list minus the list the intruding item was studied in.
    pub list_lag: u32,
    pub count: u64,
    /// Count divided by the number of included lists.
    pub per_list: Option<f64>,
    /// Count divided by all intrusions in included lists.
    pub prob: Option<f64>,
}

/// Serial position curve: fraction of studied items recalled at each input
/// position.
pub fn spc(table: &TrialTable) -> Vec<SpcRow> {
    let mut rows = Vec::new();
    for subject in table.subjects() {
        let mut by_input: BTreeMap<u32, (u64, u64)> = BTreeMap::new();
        for record in subject.lists.iter().flat_map(|l| l.records.iter()) {
            let Some(input) = record.input.filter(|_| record.study) else {
                continue;
            };
            let entry = by_input.entry(input).or_insert((0, 0));
            entry.0 += record.recall as u64;
            entry.1 += 1;
        }
        rows.extend(by_input.into_iter().map(|(input, (recalled, studied))| SpcRow {
            subject: subject.subject.to_string(),
            input,
            recall: recalled as f64 / studied as f64,
        }));
    }
    rows
}

fn pnr_subject(subject: &SubjectRecords<'_>, options: &TransitionOptions) -> Tally<(u32, u32)> {
    let mut tally = Tally::default();
    for list in &subject.lists {
        let context = ListContext::new(subject.subject, list, options.item_filter.as_ref());
        let mut remaining: Vec<&TrialRecord> = context.pool().to_vec();
        let mut prev: Option<&TrialRecord> = None;
        let mut output = 0;

        for &recall in context.recalls() {
            if !recall.is_valid_recall() {
                continue;
            }
            let Some(idx) = pool_index(&remaining, recall) else {
                continue;
            };
            output += 1;

            let counted = match (prev, &options.test) {
                (Some(p), Some(test)) => test.passes(p, recall),
                _ => true,
            };
            if counted {
                let candidates = remaining
                    .iter()
                    .filter(|c| match (prev, &options.test) {
                        (Some(p), Some(test)) => test.passes(p, c),
                        _ => true,
                    })
                    .filter_map(|c| c.input.map(|input| (output, input)));
                if let Some(input) = recall.input {
                    tally.record((output, input), candidates, false);
                }
            }

            remaining.remove(idx);
            prev = Some(recall);
        }
    }
    tally
}

/// Probability of nth recall by output and serial position.
///
/// Repeats and intrusions do not advance the output position. With a pair
/// test, each output after the first is counted only when the recall passes
/// the test against the previous valid recall, and only candidates passing
/// it are possible.
pub fn pnr(table: &TrialTable, options: &TransitionOptions) -> Result<Vec<PnrRow>> {
    if table.is_empty() {
        return Ok(Vec::new());
    }
    check_options(table, options)?;
    let length = list_length(table, "input")?.max(0) as u32;
    warn_if_filtered_out(table, options);

    let tallies: Vec<(String, Tally<(u32, u32)>)> = table
        .subjects()
        .par_iter()
        .map(|s| (s.subject.to_string(), pnr_subject(s, options)))
        .collect();

    let mut rows = Vec::new();
    for (subject, tally) in tallies {
        for output in 1..=length {
            for input in 1..=length {
                let cell = (output, input);
                rows.push(PnrRow {
                    subject: subject.clone(),
                    output,
                    input,
                    prob: tally.prob(&cell),
                    actual: tally.actual(&cell),
                    possible: tally.possible(&cell),
                });
            }
        }
    }
    Ok(rows)
}

/// Prior-list intrusion counts by list lag, for lags `1..=max_lag`.
///
/// The first `max_lag` lists of each subject are excluded so that every lag
/// was possible for every included list.
pub fn pli_list_lag(table: &TrialTable, max_lag: u32) -> Vec<PliRow> {
    let mut rows = Vec::new();
    for subject in table.subjects() {
        let lists: BTreeSet<u32> = subject.lists.iter().map(|l| l.list).collect();
        if max_lag as usize >= lists.len() {
            tracing::warn!(
                subject = subject.subject,
                max_lag,
                lists = lists.len(),
                "all lists are excluded by max_lag"
            );
        }
        let included = lists.iter().filter(|&&l| l > max_lag).count();

        let intrusions: Vec<&TrialRecord> = subject
            .lists
            .iter()
            .filter(|l| l.list > max_lag)
            .flat_map(|l| l.records.iter().copied())
            .filter(|r| r.intrusion)
            .collect();

        let mut counts: BTreeMap<u32, u64> = BTreeMap::new();
        for record in &intrusions {
            if let Some(prior) = record.prior_list {
                *counts.entry(record.list - prior).or_insert(0) += 1;
            }
        }

        for list_lag in 1..=max_lag {
            let count = counts.get(&list_lag).copied().unwrap_or(0);
            rows.push(PliRow {
                subject: subject.subject.to_string(),
                list_lag,
                count,
                per_list: (included > 0).then(|| count as f64 / included as f64),
                prob: (!intrusions.is_empty()).then(|| count as f64 / intrusions.len() as f64),
            });
        }
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{table_from_lists, Event};
    use crate::scoring::{merge_free_recall, ScoreOptions};
    use crate::transitions::{PairTest, PairTestKind};

    fn scored() -> TrialTable {
        let events = table_from_lists(
            &["1", "1"],
            &[vec!["absence", "hollow", "pupil"], vec!["fountain", "piano", "pillow"]],
            &[vec!["hollow", "pupil", "empty"], vec!["pillow", "fountain", "pillow"]],
            None,
            &[],
        )
        .unwrap();
        merge_free_recall(&events, &ScoreOptions::default()).unwrap()
    }

    #[test]
    fn spc_by_serial_position() {
        let rows = spc(&scored());
        let recall: Vec<f64> = rows.iter().map(|r| r.recall).collect();
        assert_eq!(recall, vec![0.5, 0.5, 1.0]);
        assert_eq!(rows[0].input, 1);
    }

    #[test]
    fn pnr_ignores_invalid_recalls() {
        let rows = pnr(&scored(), &TransitionOptions::default()).unwrap();
        assert_eq!(rows.len(), 9);
        let prob: Vec<Option<f64>> = rows.iter().map(|r| r.prob).collect();
        assert_eq!(
            prob,
            vec![
                Some(0.0),
                Some(0.5),
                Some(0.5),
                Some(0.5),
                Some(0.0),
                Some(1.0),
                None,
                None,
                None
            ]
        );
        assert_eq!((rows[0].output, rows[0].input), (1, 1));
        assert_eq!((rows[3].output, rows[3].input), (2, 1));
    }

    #[test]
    fn pnr_with_test_limits_later_outputs() {
        let events = vec![
            Event::study("1", 1, 1, "a").with_attr("cat", 1),
            Event::study("1", 1, 2, "b").with_attr("cat", 2),
            Event::study("1", 1, 3, "c").with_attr("cat", 1),
            Event::recall("1", 1, 1, "a"),
            Event::recall("1", 1, 2, "b"),
            Event::recall("1", 1, 3, "c"),
        ];
        let options = ScoreOptions {
            study_keys: vec!["cat".into()],
            ..Default::default()
        };
        let table = merge_free_recall(&events, &options).unwrap();
        let test = TransitionOptions::default()
            .with_test(PairTest::from_kind("cat", PairTestKind::Same));
        let rows = pnr(&table, &test).unwrap();
        let cell = |output: u32, input: u32| {
            let r = rows
                .iter()
                .find(|r| r.output == output && r.input == input)
                .unwrap();
            (r.actual, r.possible)
        };
        assert_eq!(cell(1, 1), (1, 1));
        assert_eq!(cell(1, 2), (0, 1));
        // a -> b crosses categories, so output 2 is not counted
        assert_eq!(cell(2, 2), (0, 0));
        assert_eq!(cell(3, 3), (0, 0));
    }

    #[test]
    fn pli_counts_by_list_lag() {
        let events = table_from_lists(
            &["1", "1", "1"],
            &[vec!["a", "b"], vec!["c", "d"], vec!["e", "f"]],
            &[vec!["a"], vec!["b"], vec!["a", "c", "zebra"]],
            None,
            &[],
        )
        .unwrap();
        let table = merge_free_recall(&events, &ScoreOptions::default()).unwrap();

        let rows = pli_list_lag(&table, 2);
        assert_eq!(rows.len(), 2);
        assert_eq!((rows[0].list_lag, rows[0].count), (1, 1));
        assert_eq!((rows[1].list_lag, rows[1].count), (2, 1));
        assert_eq!(rows[0].per_list, Some(1.0));
        assert!((rows[0].prob.unwrap() - 1.0 / 3.0).abs() < 1e-12);

        let rows = pli_list_lag(&table, 1);
        assert_eq!(rows[0].count, 2);
        assert_eq!(rows[0].per_list, Some(1.0));
        assert_eq!(rows[0].prob, Some(0.5));
    }

    #[test]
    fn pli_with_every_list_excluded() {
        let rows = pli_list_lag(&scored(), 2);
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.count == 0 && r.per_list.is_none() && r.prob.is_none()));
    }
}
