//! recallkit CLI: score free recall events and analyze recall transitions.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "recallkit",
    version,
    about = "Free recall scoring and transition analysis"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score study and recall events into trial records
    Score {
        /// Path to a JSON events file or directory
        #[arg(long)]
        events: PathBuf,

        /// Output directory (default: from config)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Compute a transition or recall measure per subject
    Analyze(commands::analyze::AnalyzeArgs),

    /// Check event files for common data problems
    Validate {
        /// Path to a JSON events file or directory
        #[arg(long)]
        events: PathBuf,
    },

    /// Create a starter config and example data
    Init,
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(
                "recallkit=info"
                    .parse()
                    .unwrap_or_else(|_| tracing_subscriber::filter::LevelFilter::INFO.into()),
            ),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Score {
            events,
            output,
            config,
        } => commands::score::execute(events, output, config),
        Commands::Analyze(args) => commands::analyze::execute(args),
        Commands::Validate { events } => commands::validate::execute(events),
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
