//! The `recallkit validate` command.

use std::collections::BTreeSet;
use std::path::PathBuf;

use anyhow::Result;

use recallkit_core::parser;

pub fn execute(events_path: PathBuf) -> Result<()> {
    let events = parser::load_events(&events_path)?;

    let subjects: BTreeSet<&str> = events.iter().map(|e| e.subject.as_str()).collect();
    let lists: BTreeSet<(&str, u32)> = events
        .iter()
        .map(|e| (e.subject.as_str(), e.list))
        .collect();
    println!(
        "Events: {} ({} subjects, {} lists)",
        events.len(),
        subjects.len(),
        lists.len()
    );

    let warnings = parser::validate_events(&events);
    for w in &warnings {
        let prefix = match (&w.subject, w.list) {
            (Some(subject), Some(list)) => format!("  [{subject}/{list}]"),
            (Some(subject), None) => format!("  [{subject}]"),
            _ => "  ".to_string(),
        };
        println!("{prefix} WARNING: {}", w.message);
    }

    if warnings.is_empty() {
        println!("All events valid.");
    } else {
        println!("\n{} warning(s) found.", warnings.len());
    }

    Ok(())
}
