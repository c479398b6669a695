//! Analysis reports with JSON persistence and markdown rendering.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::analysis::{CategoryCrpRow, DistanceCrpRow, LagCrpRow, PairCrpRow, RankRow};
use crate::compound::CompoundRow;
use crate::statistics::{PliRow, PnrRow, SpcRow};

/// Report file format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Json,
    Markdown,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Markdown => "md",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Markdown => write!(f, "markdown"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            other => Err(format!("unknown output format: {other}")),
        }
    }
}

/// Per-subject result rows of one measure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "measure", content = "rows", rename_all = "kebab-case")]
pub enum MeasureTable {
    LagCrp(Vec<LagCrpRow>),
    CategoryCrp(Vec<CategoryCrpRow>),
    DistanceCrp(Vec<DistanceCrpRow>),
    PairCrp(Vec<PairCrpRow>),
    LagRank(Vec<RankRow>),
    DistanceRank(Vec<RankRow>),
    CompoundLagCrp(Vec<CompoundRow>),
    Spc(Vec<SpcRow>),
    Pnr(Vec<PnrRow>),
    PliListLag(Vec<PliRow>),
}

fn prob(p: Option<f64>) -> String {
    p.map(|p| format!("{p:.3}")).unwrap_or_else(|| "-".into())
}

impl MeasureTable {
    /// Name of the measure, as used on the command line.
    pub fn measure(&self) -> &'static str {
        match self {
            MeasureTable::LagCrp(_) => "lag-crp",
            MeasureTable::CategoryCrp(_) => "category-crp",
            MeasureTable::DistanceCrp(_) => "distance-crp",
            MeasureTable::PairCrp(_) => "pair-crp",
            MeasureTable::LagRank(_) => "lag-rank",
            MeasureTable::DistanceRank(_) => "distance-rank",
            MeasureTable::CompoundLagCrp(_) => "compound-lag-crp",
            MeasureTable::Spc(_) => "spc",
            MeasureTable::Pnr(_) => "pnr",
            MeasureTable::PliListLag(_) => "pli-list-lag",
        }
    }

    /// Subject of every row, in row order.
    pub fn subjects(&self) -> Vec<&str> {
        match self {
            MeasureTable::LagCrp(rows) => rows.iter().map(|r| r.subject.as_str()).collect(),
            MeasureTable::CategoryCrp(rows) => rows.iter().map(|r| r.subject.as_str()).collect(),
            MeasureTable::DistanceCrp(rows) => rows.iter().map(|r| r.subject.as_str()).collect(),
            MeasureTable::PairCrp(rows) => rows.iter().map(|r| r.subject.as_str()).collect(),
            MeasureTable::LagRank(rows) | MeasureTable::DistanceRank(rows) => {
                rows.iter().map(|r| r.subject.as_str()).collect()
            }
            MeasureTable::CompoundLagCrp(rows) => {
                rows.iter().map(|r| r.subject.as_str()).collect()
            }
            MeasureTable::Spc(rows) => rows.iter().map(|r| r.subject.as_str()).collect(),
            MeasureTable::Pnr(rows) => rows.iter().map(|r| r.subject.as_str()).collect(),
            MeasureTable::PliListLag(rows) => rows.iter().map(|r| r.subject.as_str()).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.subjects().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn headers(&self) -> Vec<&'static str> {
        match self {
            MeasureTable::LagCrp(_) => vec!["subject", "lag", "prob", "actual", "possible"],
            MeasureTable::CategoryCrp(_) => vec!["subject", "prob", "actual", "possible"],
            MeasureTable::DistanceCrp(_) => {
                vec!["subject", "bin", "center", "prob", "actual", "possible"]
            }
            MeasureTable::PairCrp(_) => {
                vec!["subject", "prev", "curr", "prob", "actual", "possible"]
            }
            MeasureTable::LagRank(_) | MeasureTable::DistanceRank(_) => vec!["subject", "rank"],
            MeasureTable::CompoundLagCrp(_) => {
                vec!["subject", "previous", "current", "prob", "actual", "possible"]
            }
            MeasureTable::Spc(_) => vec!["subject", "input", "recall"],
            MeasureTable::Pnr(_) => {
                vec!["subject", "output", "input", "prob", "actual", "possible"]
            }
            MeasureTable::PliListLag(_) => {
                vec!["subject", "list_lag", "count", "per_list", "prob"]
            }
        }
    }

    /// Rows formatted as text cells matching [`MeasureTable::headers`].
    pub fn cells(&self) -> Vec<Vec<String>> {
        match self {
            MeasureTable::LagCrp(rows) => rows
                .iter()
                .map(|r| {
                    vec![
                        r.subject.clone(),
                        r.lag.to_string(),
                        prob(r.prob),
                        r.actual.to_string(),
                        r.possible.to_string(),
                    ]
                })
                .collect(),
            MeasureTable::CategoryCrp(rows) => rows
                .iter()
                .map(|r| {
                    vec![
                        r.subject.clone(),
                        prob(r.prob),
                        r.actual.to_string(),
                        r.possible.to_string(),
                    ]
                })
                .collect(),
            MeasureTable::DistanceCrp(rows) => rows
                .iter()
                .map(|r| {
                    vec![
                        r.subject.clone(),
                        r.bin.to_string(),
                        format!("{:.3}", r.center),
                        prob(r.prob),
                        r.actual.to_string(),
                        r.possible.to_string(),
                    ]
                })
                .collect(),
            MeasureTable::PairCrp(rows) => rows
                .iter()
                .map(|r| {
                    vec![
                        r.subject.clone(),
                        r.prev.to_string(),
                        r.curr.to_string(),
                        prob(r.prob),
                        r.actual.to_string(),
                        r.possible.to_string(),
                    ]
                })
                .collect(),
            MeasureTable::LagRank(rows) | MeasureTable::DistanceRank(rows) => rows
                .iter()
                .map(|r| vec![r.subject.clone(), prob(r.rank)])
                .collect(),
            MeasureTable::CompoundLagCrp(rows) => rows
                .iter()
                .map(|r| {
                    vec![
                        r.subject.clone(),
                        r.previous.to_string(),
                        r.current.to_string(),
                        prob(r.prob),
                        r.actual.to_string(),
                        r.possible.to_string(),
                    ]
                })
                .collect(),
            MeasureTable::Spc(rows) => rows
                .iter()
                .map(|r| {
                    vec![
                        r.subject.clone(),
                        r.input.to_string(),
                        format!("{:.3}", r.recall),
                    ]
                })
                .collect(),
            MeasureTable::Pnr(rows) => rows
                .iter()
                .map(|r| {
                    vec![
                        r.subject.clone(),
                        r.output.to_string(),
                        r.input.to_string(),
                        prob(r.prob),
                        r.actual.to_string(),
                        r.possible.to_string(),
                    ]
                })
                .collect(),
            MeasureTable::PliListLag(rows) => rows
                .iter()
                .map(|r| {
                    vec![
                        r.subject.clone(),
                        r.list_lag.to_string(),
                        r.count.to_string(),
                        prob(r.per_list),
                        prob(r.prob),
                    ]
                })
                .collect(),
        }
    }
}

/// A complete analysis report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    /// Unique report identifier.
    pub id: Uuid,
    /// When the report was created.
    pub created_at: DateTime<Utc>,
    /// Number of distinct subjects in the table.
    pub subject_count: usize,
    /// Options the measure was computed with, for the record.
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
    pub table: MeasureTable,
}

impl AnalysisReport {
    pub fn new(table: MeasureTable, parameters: BTreeMap<String, String>) -> Self {
        let subject_count = table.subjects().into_iter().collect::<HashSet<_>>().len();
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            subject_count,
            parameters,
            table,
        }
    }

    pub fn measure(&self) -> &'static str {
        self.table.measure()
    }

    /// Save the report as JSON to a file.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize report")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        Ok(())
    }

    /// Load a report from a JSON file.
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read report from {}", path.display()))?;
        let report: AnalysisReport =
            serde_json::from_str(&content).context("failed to parse report JSON")?;
        Ok(report)
    }

    /// Save the report in the given format.
    pub fn save(&self, path: &Path, format: OutputFormat) -> Result<()> {
        match format {
            OutputFormat::Json => self.save_json(path),
            OutputFormat::Markdown => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(path, self.to_markdown())
                    .with_context(|| format!("failed to write report to {}", path.display()))
            }
        }
    }

    /// Format the report as markdown.
    pub fn to_markdown(&self) -> String {
        let mut md = String::new();
        md.push_str(&format!("# {}\n\n", self.measure()));
        md.push_str(&format!(
            "**Report:** {} ({})\n\n",
            self.id,
            self.created_at.format("%Y-%m-%d %H:%M:%S UTC")
        ));
        md.push_str(&format!("**Subjects:** {}\n\n", self.subject_count));

        if !self.parameters.is_empty() {
            md.push_str("**Parameters:**\n\n");
            for (key, value) in &self.parameters {
                md.push_str(&format!("- {key}: {value}\n"));
            }
            md.push('\n');
        }

        let headers = self.table.headers();
        md.push_str(&format!("| {} |\n", headers.join(" | ")));
        md.push_str(&format!(
            "|{}\n",
            headers.iter().map(|_| "------|").collect::<String>()
        ));
        for row in self.table.cells() {
            md.push_str(&format!("| {} |\n", row.join(" | ")));
        }
        md
    }
}
