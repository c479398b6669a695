//! The `recallkit analyze` command.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};

use recallkit_core::analysis;
use recallkit_core::compound::compound_lag_crp;
use recallkit_core::config::{load_config_from, RecallConfig};
use recallkit_core::measures::{DistanceBins, DistanceMatrix};
use recallkit_core::model::{Event, Phase, TrialTable, CORE_KEYS};
use recallkit_core::parser;
use recallkit_core::report::{AnalysisReport, MeasureTable, OutputFormat};
use recallkit_core::scoring::{merge_free_recall, ScoreOptions};
use recallkit_core::statistics;
use recallkit_core::transitions::{ItemCondition, PairTest, PairTestKind, TransitionOptions};

/// Rows printed to the console before the table is cut short.
const PREVIEW_ROWS: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Measure {
    LagCrp,
    CategoryCrp,
    DistanceCrp,
    PairCrp,
    LagRank,
    DistanceRank,
    CompoundLagCrp,
    Spc,
    Pnr,
    PliListLag,
}

#[derive(Debug, Args)]
pub struct AnalyzeArgs {
    /// Path to a JSON events file or directory
    #[arg(long)]
    pub events: PathBuf,

    /// Measure to compute
    #[arg(long, value_enum)]
    pub measure: Measure,

    /// Column holding serial positions for lag measures
    #[arg(long, default_value = "input")]
    pub lag_key: String,

    /// Column holding item categories (category-crp)
    #[arg(long)]
    pub category_key: Option<String>,

    /// Integer column indexing the distance matrix (distance and pair measures)
    #[arg(long, default_value = "item_index")]
    pub index_key: String,

    /// JSON distance matrix (distance-crp, distance-rank)
    #[arg(long)]
    pub distances: Option<PathBuf>,

    /// Comma-separated distance bin edges (distance-crp)
    #[arg(long)]
    pub edges: Option<String>,

    /// Comma-separated bin labels, one per bin (default: midpoints)
    #[arg(long)]
    pub centers: Option<String>,

    /// Count each possible bucket once per transition
    #[arg(long)]
    pub count_unique: bool,

    /// Only include items matching key==value or key!=value
    #[arg(long)]
    pub item_query: Option<String>,

    /// Column compared by --test
    #[arg(long, requires = "test")]
    pub test_key: Option<String>,

    /// Pair test on --test-key: same, different, or within:<max>
    #[arg(long, requires = "test_key")]
    pub test: Option<String>,

    /// Largest list lag for pli-list-lag
    #[arg(long, default_value = "3")]
    pub max_lag: u32,

    /// Output directory (default: from config)
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Output format: json or markdown (default: from config)
    #[arg(long)]
    pub format: Option<String>,

    /// Worker threads (0 lets rayon decide; default: from config)
    #[arg(long)]
    pub parallelism: Option<usize>,

    /// Config file path
    #[arg(long)]
    pub config: Option<PathBuf>,
}

pub fn execute(args: AnalyzeArgs) -> Result<()> {
    let config = load_config_from(args.config.as_deref())?;
    super::init_thread_pool(args.parallelism.unwrap_or(config.parallelism))?;

    let format = match &args.format {
        Some(f) => f.parse::<OutputFormat>().map_err(|e| anyhow::anyhow!(e))?,
        None => config.default_format,
    };

    let item_query = args
        .item_query
        .as_deref()
        .map(str::parse::<ItemCondition>)
        .transpose()
        .context("invalid --item-query")?;
    let test = match (&args.test_key, &args.test) {
        (Some(key), Some(kind)) => {
            let kind: PairTestKind = kind.parse().context("invalid --test")?;
            Some(PairTest::from_kind(key.clone(), kind))
        }
        _ => None,
    };

    let events = parser::load_events(&args.events)?;
    anyhow::ensure!(
        !events.is_empty(),
        "no events found in {}",
        args.events.display()
    );
    let options = score_options(&config, &args, item_query.as_ref(), &events);
    let table = merge_free_recall(&events, &options)
        .with_context(|| format!("failed to score {}", args.events.display()))?;

    let mut transitions = TransitionOptions::default().with_count_unique(args.count_unique);
    if let Some(condition) = item_query.clone() {
        transitions = transitions.with_item_filter(condition);
    }
    if let Some(test) = test {
        transitions = transitions.with_test(test);
    }

    let rows = compute(&args, &table, &transitions)?;
    tracing::info!(measure = rows.measure(), rows = rows.len(), "computed measure");
    let report = AnalysisReport::new(rows, parameters(&args));
    print_summary(&report);

    let output = args.output.unwrap_or(config.output_dir);
    let timestamp = chrono::Utc::now().format("%Y-%m-%dT%H%M%S");
    let path = output.join(format!(
        "{}-{timestamp}.{}",
        report.measure(),
        format.extension()
    ));
    report.save(&path, format)?;
    println!("Report saved to: {}", path.display());

    Ok(())
}

/// Scoring options from config, plus any auxiliary column the analysis reads.
///
/// Columns are carried from study events when any study event has them, else
/// from recall events. Columns found on neither are left for the analysis to
/// reject.
fn score_options(
    config: &RecallConfig,
    args: &AnalyzeArgs,
    item_query: Option<&ItemCondition>,
    events: &[Event],
) -> ScoreOptions {
    let mut options = config.scoring.clone();
    let mut needed: Vec<&str> = Vec::new();
    if matches!(args.measure, Measure::LagCrp | Measure::CompoundLagCrp) {
        needed.push(args.lag_key.as_str());
    }
    needed.extend(args.category_key.as_deref());
    needed.extend(args.test_key.as_deref());
    needed.extend(item_query.map(|c| c.key()));
    if matches!(
        args.measure,
        Measure::DistanceCrp | Measure::DistanceRank | Measure::PairCrp
    ) {
        needed.push(args.index_key.as_str());
    }

    for key in needed {
        let declared = options
            .list_keys
            .iter()
            .chain(&options.study_keys)
            .chain(&options.recall_keys)
            .any(|k| k == key);
        if declared || CORE_KEYS.contains(&key) {
            continue;
        }
        let carried_by = |phase: Phase| {
            events
                .iter()
                .any(|e| e.phase == phase && e.attrs.contains_key(key))
        };
        if carried_by(Phase::Study) {
            options.study_keys.push(key.to_string());
        } else if carried_by(Phase::Recall) {
            options.recall_keys.push(key.to_string());
        }
    }
    options
}

fn load_matrix(args: &AnalyzeArgs) -> Result<DistanceMatrix> {
    let path = args
        .distances
        .as_ref()
        .context("--distances is required for this measure")?;
    parser::parse_distance_matrix(path)
}

fn parse_floats(flag: &str, text: &str) -> Result<Vec<f64>> {
    text.split(',')
        .map(|s| {
            s.trim()
                .parse::<f64>()
                .map_err(|_| anyhow::anyhow!("invalid {flag} value: '{}'", s.trim()))
        })
        .collect()
}

fn compute(
    args: &AnalyzeArgs,
    table: &TrialTable,
    options: &TransitionOptions,
) -> Result<MeasureTable> {
    let rows = match args.measure {
        Measure::LagCrp => MeasureTable::LagCrp(analysis::lag_crp(table, &args.lag_key, options)?),
        Measure::CategoryCrp => {
            let key = args
                .category_key
                .as_deref()
                .context("--category-key is required for category-crp")?;
            MeasureTable::CategoryCrp(analysis::category_crp(table, key, options)?)
        }
        Measure::DistanceCrp => {
            let matrix = load_matrix(args)?;
            let edges = args
                .edges
                .as_deref()
                .context("--edges is required for distance-crp")?;
            let centers = args
                .centers
                .as_deref()
                .map(|c| parse_floats("--centers", c))
                .transpose()?;
            let bins = DistanceBins::new(parse_floats("--edges", edges)?, centers)?;
            MeasureTable::DistanceCrp(analysis::distance_crp(
                table,
                &args.index_key,
                &matrix,
                &bins,
                options,
            )?)
        }
        Measure::PairCrp => {
            MeasureTable::PairCrp(analysis::pair_crp(table, &args.index_key, options)?)
        }
        Measure::LagRank => MeasureTable::LagRank(analysis::lag_rank(table, options)?),
        Measure::DistanceRank => {
            let matrix = load_matrix(args)?;
            MeasureTable::DistanceRank(analysis::distance_rank(
                table,
                &args.index_key,
                &matrix,
                options,
            )?)
        }
        Measure::CompoundLagCrp => {
            MeasureTable::CompoundLagCrp(compound_lag_crp(table, &args.lag_key, options)?)
        }
        Measure::Spc => MeasureTable::Spc(statistics::spc(table)),
        Measure::Pnr => MeasureTable::Pnr(statistics::pnr(table, options)?),
        Measure::PliListLag => {
            anyhow::ensure!(args.max_lag >= 1, "--max-lag must be at least 1");
            MeasureTable::PliListLag(statistics::pli_list_lag(table, args.max_lag))
        }
    };
    Ok(rows)
}

fn parameters(args: &AnalyzeArgs) -> BTreeMap<String, String> {
    let mut params = BTreeMap::new();
    params.insert("events".to_string(), args.events.display().to_string());
    match args.measure {
        Measure::LagCrp | Measure::CompoundLagCrp => {
            params.insert("lag_key".into(), args.lag_key.clone());
        }
        Measure::CategoryCrp => {
            if let Some(key) = &args.category_key {
                params.insert("category_key".into(), key.clone());
            }
        }
        Measure::DistanceCrp | Measure::DistanceRank | Measure::PairCrp => {
            params.insert("index_key".into(), args.index_key.clone());
            if let Some(edges) = &args.edges {
                params.insert("edges".into(), edges.clone());
            }
        }
        Measure::PliListLag => {
            params.insert("max_lag".into(), args.max_lag.to_string());
        }
        Measure::LagRank | Measure::Spc | Measure::Pnr => {}
    }
    if args.count_unique {
        params.insert("count_unique".into(), "true".into());
    }
    if let Some(query) = &args.item_query {
        params.insert("item_query".into(), query.clone());
    }
    if let (Some(key), Some(test)) = (&args.test_key, &args.test) {
        params.insert("test".into(), format!("{test}:{key}"));
    }
    params
}

fn print_summary(report: &AnalysisReport) {
    use comfy_table::{Cell, Table};

    let mut table = Table::new();
    table.set_header(report.table.headers());
    let cells = report.table.cells();
    for row in cells.iter().take(PREVIEW_ROWS) {
        table.add_row(row.iter().map(Cell::new));
    }

    println!(
        "{} for {} subject(s)\n{table}",
        report.measure(),
        report.subject_count
    );
    if cells.len() > PREVIEW_ROWS {
        println!("... {} more row(s)", cells.len() - PREVIEW_ROWS);
    }
}
