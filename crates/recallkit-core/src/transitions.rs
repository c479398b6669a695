//! Transition context builder.
//!
//! For one list, derives the sequence of recall-to-recall transitions and
//! the pool of items that were still available at each step.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, Result};
use crate::model::{ListRecords, TrialRecord, Value};

type RecordPredicate = dyn Fn(&TrialRecord) -> bool + Send + Sync;
type ValuePredicate = dyn Fn(&Value, &Value) -> bool + Send + Sync;

/// Restricts which items of a list take part in an analysis.
///
/// Applied to studied items (the pool) and to recalls alike.
#[derive(Clone)]
pub struct ItemFilter(Arc<RecordPredicate>);

impl ItemFilter {
    pub fn new(predicate: impl Fn(&TrialRecord) -> bool + Send + Sync + 'static) -> Self {
        Self(Arc::new(predicate))
    }

    pub fn matches(&self, record: &TrialRecord) -> bool {
        (self.0)(record)
    }
}

impl fmt::Debug for ItemFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ItemFilter(..)")
    }
}

impl From<ItemCondition> for ItemFilter {
    fn from(condition: ItemCondition) -> Self {
        ItemFilter::new(move |record| condition.matches(record))
    }
}

/// A comparison between the previous item and another item on one column.
///
/// Both the actual transition and every candidate must pass. An item with
/// no value for the column fails the test.
#[derive(Clone)]
pub struct PairTest {
    key: String,
    test: Arc<ValuePredicate>,
}

impl PairTest {
    pub fn new(
        key: impl Into<String>,
        test: impl Fn(&Value, &Value) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            key: key.into(),
            test: Arc::new(test),
        }
    }

    pub fn from_kind(key: impl Into<String>, kind: PairTestKind) -> Self {
        Self::new(key, move |prev, curr| kind.evaluate(prev, curr))
    }

    /// Column the test reads.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn passes(&self, prev: &TrialRecord, other: &TrialRecord) -> bool {
        match (prev.get(&self.key), other.get(&self.key)) {
            (Some(a), Some(b)) => (self.test)(&a, &b),
            _ => false,
        }
    }
}

impl fmt::Debug for PairTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PairTest").field("key", &self.key).finish_non_exhaustive()
    }
}

/// Declarative item filter, written `key==value` or `key!=value`.
///
/// An item without the column never equals the value, so it fails
/// `Equals` and passes `NotEquals`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemCondition {
    Equals { key: String, value: Value },
    NotEquals { key: String, value: Value },
}

impl ItemCondition {
    pub fn key(&self) -> &str {
        match self {
            ItemCondition::Equals { key, .. } | ItemCondition::NotEquals { key, .. } => key,
        }
    }

    pub fn matches(&self, record: &TrialRecord) -> bool {
        match self {
            ItemCondition::Equals { key, value } => record.get(key).as_ref() == Some(value),
            ItemCondition::NotEquals { key, value } => record.get(key).as_ref() != Some(value),
        }
    }
}

/// Parse a literal written on the command line or in a config file.
pub fn parse_literal(text: &str) -> Value {
    let text = text.trim();
    if let Ok(i) = text.parse::<i64>() {
        Value::Int(i)
    } else if let Ok(f) = text.parse::<f64>() {
        Value::Float(f)
    } else if let Ok(b) = text.parse::<bool>() {
        Value::Bool(b)
    } else {
        Value::Text(text.trim_matches(|c| c == '"' || c == '\'').to_string())
    }
}

impl FromStr for ItemCondition {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || {
            AnalysisError::invalid_value(
                "item_query",
                format!("expected key==value or key!=value, found '{s}'"),
            )
        };
        if let Some((key, value)) = s.split_once("!=") {
            let key = key.trim();
            if key.is_empty() {
                return Err(invalid());
            }
            return Ok(ItemCondition::NotEquals {
                key: key.to_string(),
                value: parse_literal(value),
            });
        }
        let (key, value) = s
            .split_once("==")
            .or_else(|| s.split_once('='))
            .ok_or_else(invalid)?;
        let key = key.trim();
        if key.is_empty() {
            return Err(invalid());
        }
        Ok(ItemCondition::Equals {
            key: key.to_string(),
            value: parse_literal(value),
        })
    }
}

/// Declarative pair tests: `same`, `different`, or `within:<max>`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairTestKind {
    /// Both items share the value (within-category transitions).
    Same,
    /// The values differ (across-category transitions).
    Different,
    /// Numeric values differ by at most the given amount.
    Within(f64),
}

impl PairTestKind {
    pub fn evaluate(&self, prev: &Value, curr: &Value) -> bool {
        match self {
            PairTestKind::Same => prev == curr,
            PairTestKind::Different => prev != curr,
            PairTestKind::Within(max) => match (prev.as_f64(), curr.as_f64()) {
                (Some(a), Some(b)) => (a - b).abs() <= *max,
                _ => false,
            },
        }
    }
}

impl FromStr for PairTestKind {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().to_lowercase();
        match s.as_str() {
            "same" => Ok(PairTestKind::Same),
            "different" => Ok(PairTestKind::Different),
            other => other
                .strip_prefix("within:")
                .and_then(|n| n.trim().parse::<f64>().ok())
                .filter(|n| *n >= 0.0)
                .map(PairTestKind::Within)
                .ok_or_else(|| {
                    AnalysisError::invalid_value(
                        "test",
                        format!("expected same, different, or within:<max>, found '{other}'"),
                    )
                }),
        }
    }
}

/// Options shared by every transition measure.
#[derive(Debug, Clone, Default)]
pub struct TransitionOptions {
    /// Items excluded from the pool and the recall sequence.
    pub item_filter: Option<ItemFilter>,
    /// Restricts which transitions and candidates are compared.
    pub test: Option<PairTest>,
    /// Count each possible bucket once per transition.
    pub count_unique: bool,
}

impl TransitionOptions {
    pub fn with_item_filter(mut self, filter: impl Into<ItemFilter>) -> Self {
        self.item_filter = Some(filter.into());
        self
    }

    pub fn with_test(mut self, test: PairTest) -> Self {
        self.test = Some(test);
        self
    }

    pub fn with_count_unique(mut self, count_unique: bool) -> Self {
        self.count_unique = count_unique;
        self
    }
}

/// One transition between adjacent valid recalls.
#[derive(Debug, Clone)]
pub struct Transition<'a> {
    /// Output position of the previous item within the filtered recall
    /// sequence, starting at 1.
    pub output: u32,
    pub prev: &'a TrialRecord,
    pub curr: &'a TrialRecord,
    /// Items still available, the actual next item included.
    pub candidates: Vec<&'a TrialRecord>,
}

/// The studied pool and recall sequence of one list.
#[derive(Debug, Clone)]
pub struct ListContext<'a> {
    pub subject: &'a str,
    pub list: u32,
    pool: Vec<&'a TrialRecord>,
    recalls: Vec<&'a TrialRecord>,
}

impl<'a> ListContext<'a> {
    pub fn new(subject: &'a str, list: &ListRecords<'a>, filter: Option<&ItemFilter>) -> Self {
        let keep = |r: &&TrialRecord| filter.map_or(true, |f| f.matches(r));

        let mut pool: Vec<&TrialRecord> = list
            .records
            .iter()
            .copied()
            .filter(|r| r.study)
            .filter(keep)
            .collect();
        pool.sort_by_key(|r| r.input);

        let mut recalls: Vec<&TrialRecord> = list
            .records
            .iter()
            .copied()
            .filter(|r| r.recall)
            .filter(keep)
            .collect();
        recalls.sort_by_key(|r| r.output);

        Self {
            subject,
            list: list.list,
            pool,
            recalls,
        }
    }

    /// Studied items that passed the filter, in input order.
    pub fn pool(&self) -> &[&'a TrialRecord] {
        &self.pool
    }

    /// Recalls that passed the filter, repeats and intrusions included.
    pub fn recalls(&self) -> &[&'a TrialRecord] {
        &self.recalls
    }

    /// Walk the recall sequence, removing items from the pool as they are
    /// recalled.
    ///
    /// A pair of adjacent recalls forms a transition only when both are
    /// valid and the current item is still in the pool, so a repeat or an
    /// intrusion breaks the chain on both sides.
    pub fn transitions(&self, test: Option<&PairTest>) -> Vec<Transition<'a>> {
        let mut remaining = self.pool.clone();
        let mut transitions = Vec::new();

        for (n, pair) in self.recalls.windows(2).enumerate() {
            let (prev, curr) = (pair[0], pair[1]);
            let Some(idx) = pool_index(&remaining, prev) else {
                continue;
            };
            remaining.remove(idx);

            if !prev.is_valid_recall() || !curr.is_valid_recall() {
                continue;
            }
            if pool_index(&remaining, curr).is_none() {
                continue;
            }
            if let Some(test) = test {
                if !test.passes(prev, curr) {
                    continue;
                }
            }

            let candidates = remaining
                .iter()
                .copied()
                .filter(|c| test.map_or(true, |t| t.passes(prev, c)))
                .collect();
            transitions.push(Transition {
                output: n as u32 + 1,
                prev,
                curr,
                candidates,
            });
        }
        transitions
    }
}

pub(crate) fn pool_index(pool: &[&TrialRecord], record: &TrialRecord) -> Option<usize> {
    let input = record.input?;
    pool.iter().position(|r| r.input == Some(input))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::model::{table_from_lists, AuxColumn, TrialTable};
    use crate::scoring::{merge_free_recall, ScoreOptions};

    /// An eight item list in two categories, recalled as
    /// `[1, 3, 4, 8, 5, 4, 7, 6]` with one repeat.
    pub(crate) fn category_list() -> TrialTable {
        let study: Vec<String> = (1..=8).map(|i| format!("w{i}")).collect();
        let recall: Vec<String> = [1, 3, 4, 8, 5, 4, 7, 6]
            .iter()
            .map(|i| format!("w{i}"))
            .collect();
        let category = |items: &[i64]| items.iter().map(|&c| Value::Int(c)).collect::<Vec<_>>();
        let column = AuxColumn {
            name: "category".into(),
            study: Some(vec![category(&[1, 1, 1, 1, 2, 2, 2, 2])]),
            recall: None,
        };
        let events = table_from_lists(&["1"], &[study], &[recall], None, &[column]).unwrap();
        let options = ScoreOptions {
            study_keys: vec!["category".into()],
            ..Default::default()
        };
        merge_free_recall(&events, &options).unwrap()
    }

    type Step = (u32, i64, i64, Vec<i64>);

    fn steps(table: &TrialTable, key: &str, test: Option<&PairTest>) -> Vec<Step> {
        let subjects = table.subjects();
        let context = ListContext::new(subjects[0].subject, &subjects[0].lists[0], None);
        let value = |r: &TrialRecord| r.get(key).and_then(|v| v.as_i64()).unwrap();
        context
            .transitions(test)
            .iter()
            .map(|t| {
                (
                    t.output,
                    value(t.prev),
                    value(t.curr),
                    t.candidates.iter().map(|&c| value(c)).collect(),
                )
            })
            .collect()
    }

    #[test]
    fn transitions_by_position() {
        let table = category_list();
        assert_eq!(
            steps(&table, "input", None),
            vec![
                (1, 1, 3, vec![2, 3, 4, 5, 6, 7, 8]),
                (2, 3, 4, vec![2, 4, 5, 6, 7, 8]),
                (3, 4, 8, vec![2, 5, 6, 7, 8]),
                (4, 8, 5, vec![2, 5, 6, 7]),
                (7, 7, 6, vec![2, 6]),
            ]
        );
    }

    #[test]
    fn transitions_by_category() {
        let table = category_list();
        assert_eq!(
            steps(&table, "category", None),
            vec![
                (1, 1, 1, vec![1, 1, 1, 2, 2, 2, 2]),
                (2, 1, 1, vec![1, 1, 2, 2, 2, 2]),
                (3, 1, 2, vec![1, 2, 2, 2, 2]),
                (4, 2, 2, vec![1, 2, 2, 2]),
                (7, 2, 2, vec![1, 2]),
            ]
        );
    }

    #[test]
    fn within_category_test_limits_transitions_and_candidates() {
        let table = category_list();
        let test = PairTest::from_kind("category", PairTestKind::Same);
        assert_eq!(
            steps(&table, "input", Some(&test)),
            vec![
                (1, 1, 3, vec![2, 3, 4]),
                (2, 3, 4, vec![2, 4]),
                (4, 8, 5, vec![5, 6, 7]),
                (7, 7, 6, vec![6]),
            ]
        );
    }

    #[test]
    fn short_lag_test_on_category_output() {
        let table = category_list();
        let test = PairTest::from_kind("input", PairTestKind::Within(3.0));
        assert_eq!(
            steps(&table, "category", Some(&test)),
            vec![
                (1, 1, 1, vec![1, 1, 1]),
                (2, 1, 1, vec![1, 1, 2, 2]),
                (4, 2, 2, vec![2, 2, 2]),
                (7, 2, 2, vec![2]),
            ]
        );
    }

    #[test]
    fn pool_never_grows() {
        let table = category_list();
        let subjects = table.subjects();
        let context = ListContext::new(subjects[0].subject, &subjects[0].lists[0], None);
        let sizes: Vec<usize> = context
            .transitions(None)
            .iter()
            .map(|t| t.candidates.len())
            .collect();
        assert!(sizes.windows(2).all(|w| w[1] <= w[0]));
    }

    #[test]
    fn item_filter_applies_to_pool_and_recalls() {
        let table = category_list();
        let subjects = table.subjects();
        let filter = ItemFilter::from("category==1".parse::<ItemCondition>().unwrap());
        let context = ListContext::new(subjects[0].subject, &subjects[0].lists[0], Some(&filter));
        assert_eq!(context.pool().len(), 4);
        assert_eq!(context.recalls().len(), 4);
        let outputs: Vec<u32> = context.transitions(None).iter().map(|t| t.output).collect();
        assert_eq!(outputs, vec![1, 2]);
    }

    #[test]
    fn parse_item_conditions() {
        assert_eq!(
            "input != 2".parse::<ItemCondition>().unwrap(),
            ItemCondition::NotEquals {
                key: "input".into(),
                value: Value::Int(2)
            }
        );
        assert_eq!(
            "category==animal".parse::<ItemCondition>().unwrap(),
            ItemCondition::Equals {
                key: "category".into(),
                value: Value::Text("animal".into())
            }
        );
        assert!("nothing".parse::<ItemCondition>().is_err());
        assert!("==3".parse::<ItemCondition>().is_err());
    }

    #[test]
    fn parse_pair_test_kinds() {
        assert_eq!("Same".parse::<PairTestKind>().unwrap(), PairTestKind::Same);
        assert_eq!("different".parse::<PairTestKind>().unwrap(), PairTestKind::Different);
        assert_eq!("within:2.5".parse::<PairTestKind>().unwrap(), PairTestKind::Within(2.5));
        assert!("within:-1".parse::<PairTestKind>().is_err());
        assert!("closer".parse::<PairTestKind>().is_err());
    }

    #[test]
    fn missing_test_value_fails() {
        let table = category_list();
        let test = PairTest::from_kind("task", PairTestKind::Same);
        assert!(!test.passes(&table.records[0], &table.records[1]));
    }
}
