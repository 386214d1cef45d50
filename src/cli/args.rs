use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::analyzers::CorrelationMethod;

#[derive(Parser)]
#[command(name = "weather-etl")]
#[command(about = "Load weather station CSV exports into a canonical SQLite table")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long, global = true, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(
        short,
        long,
        global = true,
        conflicts_with = "verbose",
        help = "Only log warnings and hide progress bars"
    )]
    pub quiet: bool,

    #[arg(long, global = true, help = "Log file path")]
    pub log_file: Option<PathBuf>,

    #[arg(
        short,
        long,
        global = true,
        help = "Config file [default: weather-etl.toml if present]"
    )]
    pub config: Option<PathBuf>,

    #[arg(long, global = true, help = "SQLite database path (overrides config)")]
    pub database: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create or upgrade the database schema
    Migrate,

    /// Load CSV files from a directory (or a single file) into the store
    Load {
        #[arg(help = "Directory or CSV file [default: data_dir from config]")]
        path: Option<PathBuf>,

        #[arg(long, help = "Where loaded files are moved [default: <PATH>/processed]")]
        processed_dir: Option<PathBuf>,

        #[arg(long, help = "Rows per insert chunk")]
        batch_size: Option<usize>,

        #[arg(long, help = "Skip rows whose (timestamp, station) is already stored")]
        skip_existing: bool,

        #[arg(long, help = "Map and report without writing or moving files")]
        dry_run: bool,

        #[arg(long, help = "Also write the run report as JSON to this file")]
        report_json: Option<PathBuf>,
    },

    /// List the registered source formats
    Formats,

    /// Detect a file's format and show how its columns map
    Inspect {
        file: PathBuf,

        #[arg(short, long, default_value = "5", help = "Mapped rows to print")]
        sample: usize,
    },

    /// Daily aggregates per station
    Daily {
        #[arg(short, long)]
        station: Option<String>,

        #[arg(long, help = "First UTC date (YYYY-MM-DD), inclusive")]
        from: Option<NaiveDate>,

        #[arg(long, help = "Last UTC date (YYYY-MM-DD), inclusive")]
        to: Option<NaiveDate>,

        #[arg(long)]
        json: bool,
    },

    /// Stations in the store with their observation span
    Stations {
        #[arg(long)]
        json: bool,
    },

    /// Missing values per column
    Quality {
        #[arg(long)]
        json: bool,
    },

    /// Correlations between measurement fields
    Correlations {
        #[arg(short, long)]
        station: Option<String>,

        #[arg(long, help = "First UTC date (YYYY-MM-DD), inclusive")]
        from: Option<NaiveDate>,

        #[arg(long, help = "Last UTC date (YYYY-MM-DD), inclusive")]
        to: Option<NaiveDate>,

        #[arg(short, long, value_enum, default_value_t = CorrelationMethod::Pearson)]
        method: CorrelationMethod,

        #[arg(long, default_value = "30", help = "Values a field needs to be included")]
        min_observations: usize,

        #[arg(long, default_value = "0.7", help = "Smallest |r| listed as strong")]
        threshold: f64,

        #[arg(long, help = "Track correlations over rolling windows of this many days")]
        window_days: Option<i64>,

        #[arg(long, default_value = "7", help = "Days between window starts")]
        step_days: i64,

        #[arg(long)]
        json: bool,
    },
}
