//! JSON event and distance matrix loading.
//!
//! Event files hold either an array of row objects (one per study or recall
//! event) or a list-of-lists document with parallel `subjects`, `study`, and
//! `recall` arrays.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::measures::DistanceMatrix;
use crate::model::{check_events, table_from_lists, AuxColumn, Event, Phase, Value};

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum EventFile {
    Rows(Vec<serde_json::Map<String, serde_json::Value>>),
    Lists(ListsFile),
}

#[derive(Debug, Deserialize)]
struct ListsFile {
    subjects: Vec<Value>,
    study: Vec<Vec<Value>>,
    recall: Vec<Vec<Value>>,
    #[serde(default)]
    lists: Option<Vec<u32>>,
    #[serde(default)]
    columns: BTreeMap<String, ListsColumn>,
}

#[derive(Debug, Deserialize)]
struct ListsColumn {
    #[serde(default)]
    study: Option<Vec<Vec<Value>>>,
    #[serde(default)]
    recall: Option<Vec<Vec<Value>>>,
}

fn labels(lists: &[Vec<Value>]) -> Vec<Vec<String>> {
    lists
        .iter()
        .map(|list| list.iter().map(|v| v.to_string()).collect())
        .collect()
}

/// Parse a single JSON file into events.
pub fn parse_events(path: &Path) -> Result<Vec<Event>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read events file: {}", path.display()))?;

    parse_events_str(&content, path)
}

/// Parse a JSON string into events (useful for testing).
pub fn parse_events_str(content: &str, source_path: &Path) -> Result<Vec<Event>> {
    let parsed: EventFile = serde_json::from_str(content)
        .with_context(|| format!("failed to parse JSON: {}", source_path.display()))?;

    let events = match parsed {
        EventFile::Rows(rows) => rows
            .iter()
            .enumerate()
            .map(|(i, row)| {
                Event::from_row(row).with_context(|| {
                    format!("invalid event at row {} of {}", i + 1, source_path.display())
                })
            })
            .collect::<Result<Vec<_>>>()?,
        EventFile::Lists(lists) => {
            let subjects: Vec<String> = lists.subjects.iter().map(|s| s.to_string()).collect();
            let columns: Vec<AuxColumn> = lists
                .columns
                .into_iter()
                .map(|(name, column)| AuxColumn {
                    name,
                    study: column.study,
                    recall: column.recall,
                })
                .collect();
            table_from_lists(
                &subjects,
                &labels(&lists.study),
                &labels(&lists.recall),
                lists.lists.as_deref(),
                &columns,
            )
            .with_context(|| format!("invalid list data in {}", source_path.display()))?
        }
    };

    tracing::debug!(events = events.len(), path = %source_path.display(), "parsed events");
    Ok(events)
}

/// Recursively load all `.json` event files from a directory.
///
/// Files are read in path order. Files that fail to parse are skipped with a
/// warning.
pub fn load_events_directory(dir: &Path) -> Result<Vec<Event>> {
    if !dir.is_dir() {
        anyhow::bail!("not a directory: {}", dir.display());
    }

    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<_>>()?;
    paths.sort();

    let mut events = Vec::new();
    for path in paths {
        if path.is_dir() {
            events.extend(load_events_directory(&path)?);
        } else if path.extension().is_some_and(|ext| ext == "json") {
            match parse_events(&path) {
                Ok(parsed) => events.extend(parsed),
                Err(e) => {
                    tracing::warn!("skipping {}: {:#}", path.display(), e);
                }
            }
        }
    }

    Ok(events)
}

/// Load events from a file or a directory of files.
pub fn load_events(path: &Path) -> Result<Vec<Event>> {
    if path.is_dir() {
        load_events_directory(path)
    } else {
        parse_events(path)
    }
}

/// Load a square distance matrix stored as a JSON array of rows.
pub fn parse_distance_matrix(path: &Path) -> Result<DistanceMatrix> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read distance matrix: {}", path.display()))?;
    let rows: Vec<Vec<f64>> = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse distance matrix: {}", path.display()))?;
    DistanceMatrix::new(rows)
        .with_context(|| format!("invalid distance matrix: {}", path.display()))
}

/// A warning from event validation.
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    /// The subject, if the warning concerns one.
    pub subject: Option<String>,
    /// The list, if the warning concerns one.
    pub list: Option<u32>,
    /// Warning message.
    pub message: String,
}

/// Check events for problems that scoring tolerates but that usually point
/// at bad data.
pub fn validate_events(events: &[Event]) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();

    if let Err(e) = check_events(events) {
        warnings.push(ValidationWarning {
            subject: None,
            list: None,
            message: e.to_string(),
        });
    }

    let mut study: BTreeMap<(&str, u32), Vec<&str>> = BTreeMap::new();
    let mut recalled: HashSet<(&str, u32)> = HashSet::new();
    for event in events {
        let key = (event.subject.as_str(), event.list);
        match event.phase {
            Phase::Study => study.entry(key).or_default().push(event.item.as_str()),
            Phase::Recall => {
                recalled.insert(key);
            }
        }
    }

    for (&(subject, list), items) in &study {
        if !recalled.contains(&(subject, list)) {
            warnings.push(ValidationWarning {
                subject: Some(subject.to_string()),
                list: Some(list),
                message: "list has no recall events".into(),
            });
        }

        let mut seen = HashSet::new();
        for item in items {
            if !seen.insert(item) {
                warnings.push(ValidationWarning {
                    subject: Some(subject.to_string()),
                    list: Some(list),
                    message: format!("item '{item}' is studied more than once"),
                });
            }
        }
    }

    let mut lengths: BTreeMap<&str, HashMap<usize, usize>> = BTreeMap::new();
    for (&(subject, _), items) in &study {
        *lengths.entry(subject).or_default().entry(items.len()).or_insert(0) += 1;
    }
    for (subject, counts) in lengths {
        if counts.len() > 1 {
            let mut found: Vec<usize> = counts.into_keys().collect();
            found.sort_unstable();
            warnings.push(ValidationWarning {
                subject: Some(subject.to_string()),
                list: None,
                message: format!("study lists have uneven lengths: {found:?}"),
            });
        }
    }

    warnings
}
