//! Scoring engine: aligns study and recall events into trial records.
//!
//! [`merge_lists`] matches events within each list. [`merge_free_recall`]
//! additionally traces intrusions back to the earlier list where the item
//! was studied.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, Result};
use crate::model::{check_events, subject_order, Event, Phase, TrialRecord, TrialTable, Value};

/// Auxiliary columns to carry through scoring.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreOptions {
    /// Columns shared by study and recall events. They extend the match key,
    /// so events whose values differ are not paired.
    pub list_keys: Vec<String>,
    /// Columns taken from study events only.
    pub study_keys: Vec<String>,
    /// Columns taken from recall events only.
    pub recall_keys: Vec<String>,
}

type MatchKey<'a> = (&'a str, u32, &'a str, Vec<Option<Value>>);

fn match_key<'a>(event: &'a Event, list_keys: &[String]) -> MatchKey<'a> {
    let values = list_keys
        .iter()
        .map(|key| event.attrs.get(key).cloned())
        .collect();
    (event.subject.as_str(), event.list, event.item.as_str(), values)
}

fn require_columns(events: &[Event], keys: &[String]) -> Result<()> {
    if events.is_empty() {
        return Ok(());
    }
    for key in keys {
        if !events.iter().any(|e| e.attrs.contains_key(key)) {
            return Err(AnalysisError::MissingColumn(key.clone()));
        }
    }
    Ok(())
}

fn copy_attrs(target: &mut BTreeMap<String, Value>, event: &Event, keys: &[String]) {
    for key in keys {
        if let Some(value) = event.attrs.get(key) {
            target.insert(key.clone(), value.clone());
        }
    }
}

/// Merge study and recall events list by list.
///
/// Each recall is paired with the study event of the same subject, list,
/// and item (plus any `list_keys`). Repeated recalls of an item are kept as
/// separate rows with an increasing `repeat` count; studied items that were
/// never recalled get a row without an output position.
pub fn merge_lists(
    study: &[Event],
    recall: &[Event],
    options: &ScoreOptions,
) -> Result<TrialTable> {
    require_columns(study, &options.list_keys)?;
    require_columns(recall, &options.list_keys)?;
    require_columns(study, &options.study_keys)?;
    require_columns(recall, &options.recall_keys)?;

    let mut table = TrialTable::default();

    let mut studied: HashMap<MatchKey<'_>, usize> = HashMap::new();
    let mut kept = Vec::with_capacity(study.len());
    for (idx, event) in study.iter().enumerate() {
        let key = match_key(event, &options.list_keys);
        if studied.contains_key(&key) {
            tracing::warn!(
                subject = %event.subject,
                list = event.list,
                item = %event.item,
                position = event.position,
                "item presented more than once in a study list; keeping the first presentation"
            );
            table.diagnostics.duplicate_study_events += 1;
            continue;
        }
        studied.insert(key, idx);
        kept.push(idx);
    }

    let mut matched: HashSet<usize> = HashSet::new();
    let mut recall_counts: HashMap<(&str, u32, &str), u32> = HashMap::new();
    let mut records = Vec::with_capacity(study.len() + recall.len());

    for event in recall {
        let count = recall_counts
            .entry((event.subject.as_str(), event.list, event.item.as_str()))
            .or_insert(0);
        let repeat = *count;
        *count += 1;

        let study_event = studied
            .get(&match_key(event, &options.list_keys))
            .map(|&idx| {
                matched.insert(idx);
                &study[idx]
            });

        let mut attrs = BTreeMap::new();
        match study_event {
            Some(s) => {
                copy_attrs(&mut attrs, s, &options.list_keys);
                copy_attrs(&mut attrs, s, &options.study_keys);
            }
            None => copy_attrs(&mut attrs, event, &options.list_keys),
        }
        copy_attrs(&mut attrs, event, &options.recall_keys);

        records.push(new_record(
            event,
            study_event.map(|s| s.position),
            Some(event.position),
            repeat,
            attrs,
        ));
    }

    for idx in kept {
        if matched.contains(&idx) {
            continue;
        }
        let event = &study[idx];
        let mut attrs = BTreeMap::new();
        copy_attrs(&mut attrs, event, &options.list_keys);
        copy_attrs(&mut attrs, event, &options.study_keys);
        records.push(new_record(event, Some(event.position), None, 0, attrs));
    }

    records.sort_by(|a, b| {
        subject_order(&a.subject, &b.subject)
            .then_with(|| row_order(a).cmp(&row_order(b)))
    });
    table.records = records;

    tracing::debug!(
        study = study.len(),
        recall = recall.len(),
        records = table.records.len(),
        "merged study and recall events"
    );
    Ok(table)
}

/// Within-subject order: list, then input position with unstudied rows last,
/// then output position.
fn row_order(r: &TrialRecord) -> (u32, bool, Option<u32>, bool, Option<u32>) {
    (r.list, r.input.is_none(), r.input, r.output.is_none(), r.output)
}

fn new_record(
    event: &Event,
    input: Option<u32>,
    output: Option<u32>,
    repeat: u32,
    attrs: BTreeMap<String, Value>,
) -> TrialRecord {
    TrialRecord {
        subject: event.subject.clone(),
        list: event.list,
        item: event.item.clone(),
        input,
        output,
        study: input.is_some() && repeat == 0,
        recall: output.is_some(),
        repeat,
        intrusion: input.is_none(),
        prior_list: None,
        prior_input: None,
        attrs,
    }
}

/// Score a free recall event log.
///
/// Runs [`merge_lists`] over the study and recall events, then looks up
/// each intrusion among the subject's study events in other lists. The most
/// recent earlier list is reported as the intrusion's prior list. An item
/// studied only in the same or a later list is not a prior-list intrusion;
/// those cases are left empty and counted in the table diagnostics.
pub fn merge_free_recall(events: &[Event], options: &ScoreOptions) -> Result<TrialTable> {
    check_events(events)?;

    let (study, recall): (Vec<Event>, Vec<Event>) = events
        .iter()
        .cloned()
        .partition(|e| e.phase == Phase::Study);
    let mut table = merge_lists(&study, &recall, options)?;

    let mut presentations: HashMap<(&str, &str), Vec<(u32, u32)>> = HashMap::new();
    for event in &study {
        presentations
            .entry((event.subject.as_str(), event.item.as_str()))
            .or_default()
            .push((event.list, event.position));
    }

    let mut future = 0;
    for record in table.records.iter_mut().filter(|r| r.intrusion) {
        let Some(found) = presentations.get(&(record.subject.as_str(), record.item.as_str())) else {
            continue;
        };
        let prior = found
            .iter()
            .filter(|(list, _)| *list < record.list)
            .max_by_key(|(list, _)| *list);
        match prior {
            Some(&(list, position)) => {
                record.prior_list = Some(list);
                record.prior_input = Some(position);
            }
            None => future += 1,
        }
    }

    if future > 0 {
        tracing::warn!(
            count = future,
            "intrusions matched items studied only in the same or a later list; prior list left empty"
        );
    }
    table.diagnostics.future_list_intrusions = future;
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{split_lists, table_from_lists};

    /// Two lists for one subject with an intrusion, a forgotten item, and a
    /// repeated recall.
    fn raw_events() -> Vec<Event> {
        vec![
            tagged(Event::study("1", 1, 1, "absence"), 0, 1, 1),
            tagged(Event::study("1", 1, 2, "hollow"), 1, 2, 2),
            tagged(Event::study("1", 1, 3, "pupil"), 2, 1, 2),
            tagged(Event::recall("1", 1, 1, "hollow"), 1, 2, 2),
            tagged(Event::recall("1", 1, 2, "pupil"), 2, 1, 2),
            Event::recall("1", 1, 3, "empty"),
            tagged(Event::study("1", 2, 1, "fountain"), 3, 1, 1),
            tagged(Event::study("1", 2, 2, "piano"), 4, 2, 1),
            tagged(Event::study("1", 2, 3, "pillow"), 5, 1, 2),
            tagged(Event::recall("1", 2, 1, "pillow"), 5, 1, 2),
            tagged(Event::recall("1", 2, 2, "fountain"), 3, 1, 1),
            tagged(Event::recall("1", 2, 3, "pillow"), 5, 1, 2),
        ]
    }

    fn tagged(event: Event, index: i64, task: i64, block: i64) -> Event {
        event
            .with_attr("item_index", index)
            .with_attr("task", task)
            .with_attr("block", block)
    }

    fn split(events: &[Event]) -> (Vec<Event>, Vec<Event>) {
        events.iter().cloned().partition(|e| e.phase == Phase::Study)
    }

    fn find<'a>(table: &'a TrialTable, item: &str, output: Option<u32>) -> &'a TrialRecord {
        table
            .records
            .iter()
            .find(|r| r.item == item && (output.is_none() || r.output == output))
            .unwrap()
    }

    #[test]
    fn merge_single_list() {
        let study = vec![Event::study("1", 1, 1, "a"), Event::study("1", 1, 2, "b")];
        let recall = vec![Event::recall("1", 1, 1, "b")];
        let table = merge_lists(&study, &recall, &ScoreOptions::default()).unwrap();

        assert_eq!(table.len(), 2);
        let a = &table.records[0];
        assert_eq!((a.item.as_str(), a.input, a.output), ("a", Some(1), None));
        assert!(a.study && !a.recall && !a.intrusion);
        let b = &table.records[1];
        assert_eq!((b.item.as_str(), b.input, b.output), ("b", Some(2), Some(1)));
        assert!(b.study && b.recall);
    }

    #[test]
    fn merge_flags_correct_forgotten_intrusion_and_repeat() {
        let (study, recall) = split(&raw_events());
        let table = merge_lists(&study, &recall, &ScoreOptions::default()).unwrap();

        let correct = find(&table, "pupil", None);
        assert_eq!(correct.input, Some(3));
        assert!(correct.study && correct.recall && !correct.intrusion);
        assert_eq!(correct.repeat, 0);

        let forgot = find(&table, "piano", None);
        assert_eq!(forgot.input, Some(2));
        assert!(forgot.study && !forgot.recall && !forgot.intrusion);

        let intrusion = find(&table, "empty", None);
        assert_eq!(intrusion.input, None);
        assert!(!intrusion.study && intrusion.recall && intrusion.intrusion);
        assert_eq!(intrusion.repeat, 0);

        let repeat = find(&table, "pillow", Some(3));
        assert_eq!(repeat.input, Some(3));
        assert!(!repeat.study && repeat.recall && !repeat.intrusion);
        assert_eq!(repeat.repeat, 1);
    }

    #[test]
    fn merge_orders_rows_by_list_then_input() {
        let (study, recall) = split(&raw_events());
        let table = merge_lists(&study, &recall, &ScoreOptions::default()).unwrap();
        let order: Vec<(u32, &str)> = table
            .records
            .iter()
            .map(|r| (r.list, r.item.as_str()))
            .collect();
        assert_eq!(
            order,
            vec![
                (1, "absence"),
                (1, "hollow"),
                (1, "pupil"),
                (1, "empty"),
                (2, "fountain"),
                (2, "piano"),
                (2, "pillow"),
                (2, "pillow"),
            ]
        );
    }

    #[test]
    fn keys_are_carried_by_phase() {
        let events = raw_events();
        let options = ScoreOptions {
            list_keys: vec!["item_index".into()],
            study_keys: vec!["task".into(), "block".into()],
            recall_keys: vec![],
        };
        let table = merge_free_recall(&events, &options).unwrap();

        let repeat = find(&table, "pillow", Some(3));
        assert_eq!(repeat.get("task"), Some(Value::Int(1)));
        assert_eq!(repeat.get("item_index"), Some(Value::Int(5)));
        assert_eq!(find(&table, "empty", None).get("task"), None);

        let study = split_lists(&table, Phase::Study, "input").unwrap();
        assert_eq!(study[1], vec![Some(Value::Int(1)), Some(Value::Int(2)), Some(Value::Int(3))]);
        let recall = split_lists(&table, Phase::Recall, "input").unwrap();
        assert_eq!(recall[0], vec![Some(Value::Int(2)), Some(Value::Int(3)), None]);
        assert_eq!(recall[1], vec![Some(Value::Int(3)), Some(Value::Int(1)), Some(Value::Int(3))]);
    }

    #[test]
    fn list_keys_must_agree_to_match() {
        let study = vec![Event::study("1", 1, 1, "a").with_attr("condition", 1)];
        let recall = vec![Event::recall("1", 1, 1, "a").with_attr("condition", 2)];
        let options = ScoreOptions {
            list_keys: vec!["condition".into()],
            ..Default::default()
        };
        let table = merge_lists(&study, &recall, &options).unwrap();
        assert_eq!(table.len(), 2);
        assert!(table.records.iter().any(|r| r.intrusion && r.output == Some(1)));
        assert!(table.records.iter().any(|r| r.study && !r.recall));
    }

    #[test]
    fn declared_key_must_exist() {
        let (study, recall) = split(&raw_events());
        let options = ScoreOptions {
            recall_keys: vec!["onset".into()],
            ..Default::default()
        };
        let err = merge_lists(&study, &recall, &options).unwrap_err();
        assert!(matches!(err, AnalysisError::MissingColumn(c) if c == "onset"));
    }

    #[test]
    fn duplicate_study_items_keep_first_presentation() {
        let study = vec![
            Event::study("1", 1, 1, "a"),
            Event::study("1", 1, 2, "b"),
            Event::study("1", 1, 3, "a"),
        ];
        let recall = vec![Event::recall("1", 1, 1, "a")];
        let table = merge_lists(&study, &recall, &ScoreOptions::default()).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.diagnostics.duplicate_study_events, 1);
        assert_eq!(find(&table, "a", None).input, Some(1));
    }

    #[test]
    fn round_trip_through_split_lists() {
        let study = vec![vec!["a", "b"], vec!["c", "d"]];
        let recall = vec![vec!["b"], vec!["d", "c"]];
        let events = table_from_lists(&["1", "1"], &study, &recall, None, &[]).unwrap();
        let table = merge_free_recall(&events, &ScoreOptions::default()).unwrap();

        let d = find(&table, "d", None);
        assert_eq!((d.output, d.intrusion), (Some(1), false));
        let c = find(&table, "c", None);
        assert_eq!((c.output, c.intrusion), (Some(2), false));

        let as_items = |lists: Vec<Vec<Option<Value>>>| -> Vec<Vec<String>> {
            lists
                .into_iter()
                .map(|l| l.into_iter().map(|v| v.unwrap().to_string()).collect())
                .collect()
        };
        assert_eq!(as_items(split_lists(&table, Phase::Study, "item").unwrap()), study);
        assert_eq!(as_items(split_lists(&table, Phase::Recall, "item").unwrap()), recall);
    }

    #[test]
    fn prior_list_intrusions() {
        let events = table_from_lists(
            &["1", "1", "1"],
            &[vec!["absence", "hollow"], vec!["fountain", "piano"], vec!["pupil", "empty"]],
            &[vec!["absence"], vec!["piano", "hollow", "empty"], vec![]],
            None,
            &[],
        )
        .unwrap();
        let table = merge_free_recall(&events, &ScoreOptions::default()).unwrap();

        let hollow = table
            .records
            .iter()
            .find(|r| r.item == "hollow" && r.intrusion)
            .unwrap();
        assert_eq!(hollow.list, 2);
        assert_eq!((hollow.prior_list, hollow.prior_input), (Some(1), Some(2)));

        let empty = table
            .records
            .iter()
            .find(|r| r.item == "empty" && r.intrusion)
            .unwrap();
        assert_eq!((empty.prior_list, empty.prior_input), (None, None));
        assert_eq!(table.diagnostics.future_list_intrusions, 1);
    }

    #[test]
    fn most_recent_prior_list_wins() {
        let events = table_from_lists(
            &["1", "1", "1"],
            &[vec!["a", "b"], vec!["c", "a"], vec!["d", "e"]],
            &[vec![], vec![], vec!["a"]],
            None,
            &[],
        )
        .unwrap();
        let table = merge_free_recall(&events, &ScoreOptions::default()).unwrap();
        let a = table.records.iter().find(|r| r.intrusion).unwrap();
        assert_eq!((a.prior_list, a.prior_input), (Some(2), Some(2)));
    }

    #[test]
    fn subjects_are_sorted_regardless_of_event_order() {
        let events = table_from_lists(
            &["10", "2", "b", "a"],
            &[vec!["x"], vec!["y"], vec!["z"], vec!["w"]],
            &[vec!["x"], vec![], vec!["z"], vec![]],
            None,
            &[],
        )
        .unwrap();
        let subjects = |events: &[Event]| -> Vec<String> {
            let table = merge_free_recall(events, &ScoreOptions::default()).unwrap();
            table.subjects().iter().map(|s| s.subject.to_string()).collect()
        };

        let reversed: Vec<Event> = events.iter().rev().cloned().collect();
        assert_eq!(subjects(&events), vec!["2", "10", "a", "b"]);
        assert_eq!(subjects(&reversed), subjects(&events));

        let forward = merge_free_recall(&events, &ScoreOptions::default()).unwrap();
        let backward = merge_free_recall(&reversed, &ScoreOptions::default()).unwrap();
        assert_eq!(forward.records, backward.records);
    }
}
