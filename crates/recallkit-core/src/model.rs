//! Core data model types for recallkit.
//!
//! Raw study and recall [`Event`]s go into the scoring engine; the merged
//! [`TrialRecord`] table that comes out is what every analysis reads.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, Result};

/// A dynamically typed cell of an auxiliary column.
///
/// Numbers compare by value regardless of representation, so `Int(2)` and
/// `Float(2.0)` are equal and hash alike.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    /// Numeric view of the value.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Integer view of the value. Floats qualify only when integral.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Float(f) if f.is_finite() && f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Convert a JSON cell. `null` means the cell is absent.
    pub fn from_json(column: &str, value: &serde_json::Value) -> Result<Option<Value>> {
        match value {
            serde_json::Value::Null => Ok(None),
            serde_json::Value::Bool(b) => Ok(Some(Value::Bool(*b))),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(Some(Value::Int(i)))
                } else if let Some(f) = n.as_f64() {
                    Ok(Some(Value::Float(f)))
                } else {
                    Err(AnalysisError::invalid_value(column, format!("unsupported number {n}")))
                }
            }
            serde_json::Value::String(s) => Ok(Some(Value::Text(s.clone()))),
            other => Err(AnalysisError::invalid_value(
                column,
                format!("expected a scalar, found {other}"),
            )),
        }
    }

    fn type_rank(&self) -> u8 {
        match self {
            Value::Bool(_) => 0,
            Value::Int(_) | Value::Float(_) => 1,
            Value::Text(_) => 2,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => a.total_cmp(&b),
                _ => self.type_rank().cmp(&other.type_rank()),
            },
        }
    }
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_rank().hash(state);
        match self {
            Value::Bool(b) => b.hash(state),
            Value::Int(_) | Value::Float(_) => {
                let f = self.as_f64().unwrap_or_default();
                let f = if f == 0.0 { 0.0 } else { f };
                f.to_bits().hash(state);
            }
            Value::Text(s) => s.hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

/// Phase of an experiment event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Study,
    Recall,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Study => write!(f, "study"),
            Phase::Recall => write!(f, "recall"),
        }
    }
}

impl FromStr for Phase {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "study" => Ok(Phase::Study),
            "recall" => Ok(Phase::Recall),
            other => Err(AnalysisError::InvalidPhase(other.to_string())),
        }
    }
}

/// One presented or recalled item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Subject identifier.
    pub subject: String,
    /// List identifier, unique within subject.
    pub list: u32,
    /// Study or recall.
    #[serde(alias = "trial_type")]
    pub phase: Phase,
    /// Serial position (study) or output order (recall), starting at 1.
    pub position: u32,
    /// Item identity.
    pub item: String,
    /// Auxiliary columns.
    #[serde(flatten, default)]
    pub attrs: BTreeMap<String, Value>,
}

/// Columns every event row must provide.
pub const REQUIRED_COLUMNS: [&str; 5] = ["subject", "list", "phase", "position", "item"];

impl Event {
    pub fn study(subject: &str, list: u32, position: u32, item: &str) -> Self {
        Self::new(subject, list, Phase::Study, position, item)
    }

    pub fn recall(subject: &str, list: u32, position: u32, item: &str) -> Self {
        Self::new(subject, list, Phase::Recall, position, item)
    }

    fn new(subject: &str, list: u32, phase: Phase, position: u32, item: &str) -> Self {
        Self {
            subject: subject.to_string(),
            list,
            phase,
            position,
            item: item.to_string(),
            attrs: BTreeMap::new(),
        }
    }

    /// Attach an auxiliary column value.
    pub fn with_attr(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.attrs.insert(key.to_string(), value.into());
        self
    }

    /// Build an event from a row of named JSON cells.
    ///
    /// The phase column may be named `phase` or `trial_type`. Any column
    /// other than the required ones becomes an auxiliary attribute; `null`
    /// cells are dropped.
    pub fn from_row(row: &serde_json::Map<String, serde_json::Value>) -> Result<Self> {
        let subject = label_cell(row, "subject")?;
        let list = count_cell(row, "list")?;
        let position = count_cell(row, "position")?;
        let item = label_cell(row, "item")?;

        let phase_column = if row.contains_key("phase") {
            "phase"
        } else {
            "trial_type"
        };
        let phase = match row.get(phase_column) {
            Some(serde_json::Value::String(s)) => s.parse()?,
            Some(other) => return Err(AnalysisError::InvalidPhase(other.to_string())),
            None => return Err(AnalysisError::MissingColumn("phase".into())),
        };

        let mut attrs = BTreeMap::new();
        for (key, cell) in row {
            if REQUIRED_COLUMNS.contains(&key.as_str()) || key == "trial_type" {
                continue;
            }
            if let Some(value) = Value::from_json(key, cell)? {
                attrs.insert(key.clone(), value);
            }
        }

        Ok(Self {
            subject,
            list,
            phase,
            position,
            item,
            attrs,
        })
    }
}

fn label_cell(row: &serde_json::Map<String, serde_json::Value>, column: &str) -> Result<String> {
    match row.get(column) {
        None | Some(serde_json::Value::Null) => {
            Err(AnalysisError::MissingColumn(column.to_string()))
        }
        Some(cell @ (serde_json::Value::String(_) | serde_json::Value::Number(_))) => {
            Value::from_json(column, cell)?
                .map(|value| value.to_string())
                .ok_or_else(|| AnalysisError::MissingColumn(column.to_string()))
        }
        Some(other) => Err(AnalysisError::invalid_value(
            column,
            format!("expected a string or number, found {other}"),
        )),
    }
}

fn count_cell(row: &serde_json::Map<String, serde_json::Value>, column: &str) -> Result<u32> {
    let cell = row
        .get(column)
        .ok_or_else(|| AnalysisError::MissingColumn(column.to_string()))?;
    let value = Value::from_json(column, cell)?
        .ok_or_else(|| AnalysisError::MissingColumn(column.to_string()))?;
    value
        .as_i64()
        .and_then(|v| u32::try_from(v).ok())
        .ok_or_else(|| {
            AnalysisError::invalid_value(column, format!("expected a count, found {value}"))
        })
}

/// Check that positions are dense `1..N` within each subject, list, and phase.
pub fn check_events(events: &[Event]) -> Result<()> {
    let mut positions: HashMap<(&str, u32, Phase), Vec<u32>> = HashMap::new();
    for event in events {
        positions
            .entry((event.subject.as_str(), event.list, event.phase))
            .or_default()
            .push(event.position);
    }

    for ((subject, list, phase), mut found) in positions {
        found.sort_unstable();
        let dense = found
            .iter()
            .enumerate()
            .all(|(i, &pos)| pos as usize == i + 1);
        if !dense {
            return Err(AnalysisError::InvalidPositions {
                subject: subject.to_string(),
                list,
                phase: phase.to_string(),
                count: found.len(),
            });
        }
    }
    Ok(())
}

/// An auxiliary column for [`table_from_lists`], nested like the item lists.
#[derive(Debug, Clone, Default)]
pub struct AuxColumn {
    pub name: String,
    /// One value per study item, or `None` when the column has no study values.
    pub study: Option<Vec<Vec<Value>>>,
    /// One value per recalled item, or `None` when the column has no recall values.
    pub recall: Option<Vec<Vec<Value>>>,
}

/// Build raw events from list-of-lists data.
///
/// Entry `i` of `subjects`, `study`, and `recall` describes one list. Lists
/// are numbered from 1 within each subject unless `lists` gives explicit
/// numbers.
pub fn table_from_lists<S: AsRef<str>, I: AsRef<str>>(
    subjects: &[S],
    study: &[Vec<I>],
    recall: &[Vec<I>],
    lists: Option<&[u32]>,
    columns: &[AuxColumn],
) -> Result<Vec<Event>> {
    let n = subjects.len();
    if study.len() != n {
        return Err(AnalysisError::shape("study lists", n, study.len()));
    }
    if recall.len() != n {
        return Err(AnalysisError::shape("recall lists", n, recall.len()));
    }
    if let Some(lists) = lists {
        if lists.len() != n {
            return Err(AnalysisError::shape("list numbers", n, lists.len()));
        }
    }
    for column in columns {
        check_nested(&column.name, "study", column.study.as_deref(), study)?;
        check_nested(&column.name, "recall", column.recall.as_deref(), recall)?;
    }

    let mut events = Vec::new();
    let mut prev_subject: Option<&str> = None;
    let mut current_list = 1u32;
    for i in 0..n {
        let subject = subjects[i].as_ref();
        if let Some(lists) = lists {
            current_list = lists[i];
        } else if prev_subject != Some(subject) {
            current_list = 1;
        }

        for (j, item) in study[i].iter().enumerate() {
            let mut event = Event::study(subject, current_list, j as u32 + 1, item.as_ref());
            for column in columns {
                if let Some(values) = &column.study {
                    event.attrs.insert(column.name.clone(), values[i][j].clone());
                }
            }
            events.push(event);
        }

        for (j, item) in recall[i].iter().enumerate() {
            let mut event = Event::recall(subject, current_list, j as u32 + 1, item.as_ref());
            for column in columns {
                if let Some(values) = &column.recall {
                    event.attrs.insert(column.name.clone(), values[i][j].clone());
                }
            }
            events.push(event);
        }

        current_list += 1;
        prev_subject = Some(subject);
    }
    Ok(events)
}

fn check_nested<I>(
    name: &str,
    phase: &str,
    values: Option<&[Vec<Value>]>,
    items: &[Vec<I>],
) -> Result<()> {
    let Some(values) = values else {
        return Ok(());
    };
    if values.len() != items.len() {
        return Err(AnalysisError::shape(
            format!("{phase} values of column '{name}'"),
            items.len(),
            values.len(),
        ));
    }
    for (i, (v, list)) in values.iter().zip(items).enumerate() {
        if v.len() != list.len() {
            return Err(AnalysisError::shape(
                format!("{phase} values of column '{name}' in list {}", i + 1),
                list.len(),
                v.len(),
            ));
        }
    }
    Ok(())
}

/// One aligned (subject, list, item) row produced by scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialRecord {
    pub subject: String,
    pub list: u32,
    pub item: String,
    /// Study serial position; `None` for intrusions.
    pub input: Option<u32>,
    /// Recall output position; `None` if never recalled.
    pub output: Option<u32>,
    /// True for the unique study event of the item.
    pub study: bool,
    /// True when the row carries a recall event.
    pub recall: bool,
    /// 0 for the first recall of an item, counting up for each repeat.
    pub repeat: u32,
    /// Recalled but not studied in this list.
    pub intrusion: bool,
    /// For prior-list intrusions, the list the item was studied in.
    pub prior_list: Option<u32>,
    /// For prior-list intrusions, the serial position in that list.
    pub prior_input: Option<u32>,
    /// Auxiliary columns carried through scoring.
    #[serde(flatten, default)]
    pub attrs: BTreeMap<String, Value>,
}

/// Columns every scored record provides.
pub const CORE_KEYS: [&str; 11] = [
    "subject",
    "list",
    "item",
    "input",
    "output",
    "study",
    "recall",
    "repeat",
    "intrusion",
    "prior_list",
    "prior_input",
];

impl TrialRecord {
    /// Look up a column by name, core or auxiliary.
    pub fn get(&self, key: &str) -> Option<Value> {
        let count = |v: Option<u32>| v.map(|v| Value::Int(v as i64));
        match key {
            "subject" => Some(Value::Text(self.subject.clone())),
            "list" => Some(Value::Int(self.list as i64)),
            "item" => Some(Value::Text(self.item.clone())),
            "input" => count(self.input),
            "output" => count(self.output),
            "study" => Some(Value::Bool(self.study)),
            "recall" => Some(Value::Bool(self.recall)),
            "repeat" => Some(Value::Int(self.repeat as i64)),
            "intrusion" => Some(Value::Bool(self.intrusion)),
            "prior_list" => count(self.prior_list),
            "prior_input" => count(self.prior_input),
            other => self.attrs.get(other).cloned(),
        }
    }

    /// True for a recall that can take part in a transition.
    pub fn is_valid_recall(&self) -> bool {
        self.recall && self.repeat == 0 && !self.intrusion
    }
}

/// Counts of data problems corrected during scoring.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringDiagnostics {
    /// Intrusions matching an item studied only in the same or a later list.
    /// Their prior-list fields are left empty.
    pub future_list_intrusions: usize,
    /// Repeated presentations of one item within a study list; only the
    /// first presentation is scored.
    pub duplicate_study_events: usize,
}

/// Canonical subject order: integer labels numerically, then other labels
/// lexically.
pub fn subject_order(a: &str, b: &str) -> Ordering {
    match (a.parse::<i64>(), b.parse::<i64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

/// The merged trial table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrialTable {
    pub records: Vec<TrialRecord>,
    #[serde(default)]
    pub diagnostics: ScoringDiagnostics,
}

/// Records of one list, in table order.
#[derive(Debug, Clone)]
pub struct ListRecords<'a> {
    pub list: u32,
    pub records: Vec<&'a TrialRecord>,
}

/// Records of one subject, grouped by list in ascending list order.
#[derive(Debug, Clone)]
pub struct SubjectRecords<'a> {
    pub subject: &'a str,
    pub lists: Vec<ListRecords<'a>>,
}

impl TrialTable {
    pub fn new(records: Vec<TrialRecord>) -> Self {
        Self {
            records,
            diagnostics: ScoringDiagnostics::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Group records by subject and list, in [`subject_order`].
    pub fn subjects(&self) -> Vec<SubjectRecords<'_>> {
        let mut order: Vec<&str> = Vec::new();
        let mut grouped: HashMap<&str, BTreeMap<u32, Vec<&TrialRecord>>> = HashMap::new();
        for record in &self.records {
            let lists = grouped.entry(record.subject.as_str()).or_insert_with(|| {
                order.push(record.subject.as_str());
                BTreeMap::new()
            });
            lists.entry(record.list).or_default().push(record);
        }

        order.sort_by(|a, b| subject_order(a, b));
        order
            .into_iter()
            .map(|subject| {
                let lists = grouped
                    .remove(subject)
                    .unwrap_or_default()
                    .into_iter()
                    .map(|(list, records)| ListRecords { list, records })
                    .collect();
                SubjectRecords { subject, lists }
            })
            .collect()
    }

    /// Whether any record can supply `key`.
    pub fn has_key(&self, key: &str) -> bool {
        CORE_KEYS.contains(&key) || self.records.iter().any(|r| r.attrs.contains_key(key))
    }

    /// Fail with [`AnalysisError::InvalidKey`] unless the table supplies `key`.
    pub fn require_key(&self, key: &str) -> Result<()> {
        if self.has_key(key) {
            Ok(())
        } else {
            Err(AnalysisError::InvalidKey(key.to_string()))
        }
    }

    /// Largest integer value of `key` among studied items.
    pub fn max_study_value(&self, key: &str) -> Option<i64> {
        self.records
            .iter()
            .filter(|r| r.study)
            .filter_map(|r| r.get(key).and_then(|v| v.as_i64()))
            .max()
    }
}

/// Export one column of a scored table in list format.
///
/// Returns one vector per (subject, list): study rows in input order, or
/// recall rows (repeats and intrusions included) in output order.
pub fn split_lists(table: &TrialTable, phase: Phase, key: &str) -> Result<Vec<Vec<Option<Value>>>> {
    table.require_key(key)?;
    let mut split = Vec::new();
    for subject in table.subjects() {
        for list in &subject.lists {
            let mut rows: Vec<&TrialRecord> = match phase {
                Phase::Study => list.records.iter().copied().filter(|r| r.study).collect(),
                Phase::Recall => list.records.iter().copied().filter(|r| r.recall).collect(),
            };
            match phase {
                Phase::Study => rows.sort_by_key(|r| r.input),
                Phase::Recall => rows.sort_by_key(|r| r.output),
            }
            split.push(rows.iter().map(|r| r.get(key)).collect());
        }
    }
    Ok(split)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_numeric_equality_ignores_representation() {
        assert_eq!(Value::Int(2), Value::Float(2.0));
        assert_ne!(Value::Int(2), Value::Text("2".into()));
        assert!(Value::Int(1) < Value::Float(1.5));
        assert_eq!(Value::Float(3.0).as_i64(), Some(3));
        assert_eq!(Value::Float(3.5).as_i64(), None);

        let mut seen = std::collections::HashSet::new();
        seen.insert(Value::Int(4));
        assert!(seen.contains(&Value::Float(4.0)));
    }

    #[test]
    fn value_serde_untagged() {
        let values: Vec<Value> = serde_json::from_str(r#"[1, 2.5, "a", true]"#).unwrap();
        assert!(matches!(values[0], Value::Int(1)));
        assert!(matches!(values[1], Value::Float(_)));
        assert!(matches!(values[2], Value::Text(_)));
        assert!(matches!(values[3], Value::Bool(true)));
    }

    #[test]
    fn phase_display_and_parse() {
        assert_eq!(Phase::Study.to_string(), "study");
        assert_eq!("Recall".parse::<Phase>().unwrap(), Phase::Recall);
        assert!(matches!(
            "test".parse::<Phase>(),
            Err(AnalysisError::InvalidPhase(_))
        ));
    }

    #[test]
    fn table_from_lists_numbers_lists_per_subject() {
        let events = table_from_lists(
            &["1", "1", "2", "2"],
            &[vec!["a", "b"], vec!["c", "d"], vec!["e", "f"], vec!["g", "h"]],
            &[vec!["b"], vec!["d", "c"], vec!["f", "e"], vec![]],
            None,
            &[],
        )
        .unwrap();

        assert_eq!(events.len(), 13);
        assert_eq!(events[2], Event::recall("1", 1, 1, "b"));
        assert_eq!(events[5], Event::recall("1", 2, 1, "d"));
        assert_eq!(events[6], Event::recall("1", 2, 2, "c"));
        assert_eq!(events[7], Event::study("2", 1, 1, "e"));
        assert_eq!(events[12], Event::study("2", 2, 2, "h"));
    }

    #[test]
    fn table_from_lists_aux_columns() {
        let col1 = AuxColumn {
            name: "col1".into(),
            study: Some(vec![vec![1.into(), 2.into()], vec![1.into(), 2.into()]]),
            recall: Some(vec![vec![2.into()], vec![2.into(), 1.into()]]),
        };
        let col2 = AuxColumn {
            name: "col2".into(),
            study: Some(vec![vec![1.into(), 1.into()], vec![2.into(), 2.into()]]),
            recall: None,
        };
        let events = table_from_lists(
            &["1", "1"],
            &[vec!["a", "b"], vec!["c", "d"]],
            &[vec!["b"], vec!["d", "c"]],
            Some(&[3, 4]),
            &[col1, col2],
        )
        .unwrap();

        assert_eq!(events[0].list, 3);
        assert_eq!(events[3].list, 4);
        assert_eq!(events[2].attrs.get("col1"), Some(&Value::Int(2)));
        assert!(events[2].attrs.get("col2").is_none());
        assert_eq!(events[4].attrs.get("col2"), Some(&Value::Int(2)));
    }

    #[test]
    fn table_from_lists_shape_mismatch() {
        let err = table_from_lists(&["1", "1"], &[vec!["a"]], &[vec![], vec![]], None, &[])
            .unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::ShapeMismatch {
                expected: 2,
                found: 1,
                ..
            }
        ));

        let column = AuxColumn {
            name: "task".into(),
            study: Some(vec![vec![1.into()]]),
            recall: None,
        };
        let err = table_from_lists(&["1"], &[vec!["a", "b"]], &[vec![]], None, &[column])
            .unwrap_err();
        assert!(matches!(err, AnalysisError::ShapeMismatch { .. }));
    }

    #[test]
    fn check_events_requires_dense_positions() {
        let good = vec![Event::study("1", 1, 1, "a"), Event::study("1", 1, 2, "b")];
        assert!(check_events(&good).is_ok());

        let bad = vec![Event::study("1", 1, 1, "a"), Event::study("1", 1, 3, "b")];
        assert!(matches!(
            check_events(&bad),
            Err(AnalysisError::InvalidPositions { list: 1, .. })
        ));
    }

    #[test]
    fn from_row_validates_schema() {
        let row: serde_json::Map<String, serde_json::Value> = serde_json::from_str(
            r#"{"subject": 1, "list": 2, "trial_type": "study", "position": 3, "item": "cat", "category": "animal", "onset": null}"#,
        )
        .unwrap();
        let event = Event::from_row(&row).unwrap();
        assert_eq!(event.subject, "1");
        assert_eq!(event.phase, Phase::Study);
        assert_eq!(event.attrs.get("category"), Some(&Value::from("animal")));
        assert!(!event.attrs.contains_key("onset"));

        let row: serde_json::Map<String, serde_json::Value> =
            serde_json::from_str(r#"{"subject": 1, "list": 1, "position": 1, "item": "a"}"#)
                .unwrap();
        assert!(matches!(
            Event::from_row(&row),
            Err(AnalysisError::MissingColumn(c)) if c == "phase"
        ));

        let row: serde_json::Map<String, serde_json::Value> = serde_json::from_str(
            r#"{"subject": 1, "list": 1, "phase": "encode", "position": 1, "item": "a"}"#,
        )
        .unwrap();
        assert!(matches!(
            Event::from_row(&row),
            Err(AnalysisError::InvalidPhase(_))
        ));
    }

    fn apple() -> TrialRecord {
        let mut attrs = BTreeMap::new();
        attrs.insert("category".to_string(), Value::from("fruit"));
        TrialRecord {
            subject: "1".into(),
            list: 2,
            item: "apple".into(),
            input: Some(3),
            output: None,
            study: true,
            recall: false,
            repeat: 0,
            intrusion: false,
            prior_list: None,
            prior_input: None,
            attrs,
        }
    }

    #[test]
    fn record_get_covers_core_and_aux_keys() {
        let record = apple();
        assert_eq!(record.get("input"), Some(Value::Int(3)));
        assert_eq!(record.get("output"), None);
        assert_eq!(record.get("category"), Some(Value::from("fruit")));
        assert_eq!(record.get("missing"), None);
        assert!(!record.is_valid_recall());
    }

    #[test]
    fn split_lists_rejects_unknown_key() {
        let table = TrialTable::new(vec![apple()]);
        assert!(matches!(
            split_lists(&table, Phase::Study, "color"),
            Err(AnalysisError::InvalidKey(k)) if k == "color"
        ));
        let categories = split_lists(&table, Phase::Study, "category").unwrap();
        assert_eq!(categories, vec![vec![Some(Value::from("fruit"))]]);
    }

    #[test]
    fn whole_float_labels_match_integer_labels() {
        let rows: Vec<serde_json::Map<String, serde_json::Value>> = serde_json::from_str(
            r#"[
                {"subject": 1, "list": 1, "phase": "study", "position": 1, "item": 7},
                {"subject": 1.0, "list": 1, "phase": "recall", "position": 1, "item": 7.0},
                {"subject": 1.5, "list": 1, "phase": "study", "position": 1, "item": "a"}
            ]"#,
        )
        .unwrap();
        let events: Vec<Event> = rows.iter().map(|r| Event::from_row(r).unwrap()).collect();
        assert_eq!((events[0].subject.as_str(), events[0].item.as_str()), ("1", "7"));
        assert_eq!((events[1].subject.as_str(), events[1].item.as_str()), ("1", "7"));
        assert_eq!(events[2].subject, "1.5");
    }

    #[test]
    fn subject_order_is_numeric_then_lexical() {
        let mut subjects = vec!["b", "10", "a", "2", "s1"];
        subjects.sort_by(|a, b| subject_order(a, b));
        assert_eq!(subjects, vec!["2", "10", "a", "b", "s1"]);
    }
}
