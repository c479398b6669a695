//! The `recallkit score` command.

use std::path::PathBuf;

use anyhow::{Context, Result};

use recallkit_core::config::load_config_from;
use recallkit_core::model::TrialTable;
use recallkit_core::parser;
use recallkit_core::scoring::merge_free_recall;

pub fn execute(
    events_path: PathBuf,
    output: Option<PathBuf>,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let events = parser::load_events(&events_path)?;
    anyhow::ensure!(
        !events.is_empty(),
        "no events found in {}",
        events_path.display()
    );

    let table = merge_free_recall(&events, &config.scoring)
        .with_context(|| format!("failed to score {}", events_path.display()))?;

    tracing::info!(
        events = events.len(),
        records = table.len(),
        subjects = table.subjects().len(),
        "scored events"
    );
    print_summary(&table);

    let diagnostics = &table.diagnostics;
    if diagnostics.future_list_intrusions > 0 {
        println!(
            "{} intrusion(s) matched only the same or a later list; prior list left empty.",
            diagnostics.future_list_intrusions
        );
    }
    if diagnostics.duplicate_study_events > 0 {
        println!(
            "{} duplicate study presentation(s) ignored.",
            diagnostics.duplicate_study_events
        );
    }

    let output = output.unwrap_or(config.output_dir);
    std::fs::create_dir_all(&output)
        .with_context(|| format!("failed to create {}", output.display()))?;
    let timestamp = chrono::Utc::now().format("%Y-%m-%dT%H%M%S");
    let path = output.join(format!("scored-{timestamp}.json"));
    let json = serde_json::to_string_pretty(&table).context("failed to serialize scored table")?;
    std::fs::write(&path, json)
        .with_context(|| format!("failed to write {}", path.display()))?;
    println!("Scored table saved to: {}", path.display());

    Ok(())
}

fn print_summary(table: &TrialTable) {
    use comfy_table::{Cell, Table};

    let mut summary = Table::new();
    summary.set_header(vec![
        "Subject",
        "Lists",
        "Studied",
        "Recalled",
        "Recall %",
        "Intrusions",
        "Repeats",
    ]);

    for subject in table.subjects() {
        let records = || subject.lists.iter().flat_map(|l| l.records.iter());
        let studied = records().filter(|r| r.study).count();
        let recalled = records().filter(|r| r.study && r.recall).count();
        let intrusions = records().filter(|r| r.intrusion).count();
        let repeats = records().filter(|r| r.repeat > 0).count();
        let rate = if studied > 0 {
            recalled as f64 / studied as f64
        } else {
            0.0
        };
        summary.add_row(vec![
            Cell::new(subject.subject),
            Cell::new(subject.lists.len()),
            Cell::new(studied),
            Cell::new(recalled),
            Cell::new(format!("{:.1}%", rate * 100.0)),
            Cell::new(intrusions),
            Cell::new(repeats),
        ]);
    }

    println!("{summary}");
}
