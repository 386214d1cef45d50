use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use crate::analyzers::correlation::DEFAULT_STABILITY_FIELDS;
use crate::analyzers::{
    daily_aggregates, daily_summary, CompletenessReport, CorrelationMatrix, CorrelationOptions,
    StabilityReport, StationInventory,
};
use crate::cli::args::{Cli, Commands};
use crate::config::{ConfigOverrides, EtlConfig};
use crate::mapping::{ColumnMapper, FormatRegistry, RowOutcome, UnitConversion};
use crate::processors::{EtlLoader, LoaderOptions};
use crate::readers::CsvReader;
use crate::store::{DuplicatePolicy, ObservationFilter, SqliteStore};
use crate::utils::filename::station_from_filename;
use crate::utils::progress::ProgressReporter;

/// How a successful invocation ended, mapped to the process exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Success,
    FileFailures,
}

impl RunStatus {
    pub fn exit_code(&self) -> u8 {
        match self {
            RunStatus::Success => 0,
            RunStatus::FileFailures => 1,
        }
    }
}

/// Run a command. `Err` means setup failed (config, store) before any file
/// was attempted.
pub fn run(cli: Cli) -> Result<RunStatus> {
    let mut config = EtlConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    config.apply_overrides(ConfigOverrides {
        database: cli.database.clone(),
        ..Default::default()
    })?;

    match cli.command {
        Commands::Migrate => {
            let mut store = open_store(&config.database)?;
            let applied = store.migrate()?;
            if applied.is_empty() {
                println!(
                    "Schema already at version {} ({})",
                    store.schema_version()?,
                    config.database.display()
                );
            } else {
                println!(
                    "Applied migration(s) {:?}, schema now at version {}",
                    applied,
                    store.schema_version()?
                );
            }
            Ok(RunStatus::Success)
        }

        Commands::Load {
            path,
            processed_dir,
            batch_size,
            skip_existing,
            dry_run,
            report_json,
        } => {
            config.apply_overrides(ConfigOverrides {
                processed_dir,
                batch_size,
                duplicate_policy: skip_existing.then_some(DuplicatePolicy::SkipExisting),
                ..Default::default()
            })?;
            let path = path.unwrap_or_else(|| config.data_dir.clone());
            let registry = config.registry()?;

            // A dry run never touches the real database
            let mut store = if dry_run {
                SqliteStore::open_in_memory()?
            } else {
                let mut store = open_store(&config.database)?;
                store.migrate()?;
                store
            };

            let files = EtlLoader::<SqliteStore>::discover(&path)
                .with_context(|| format!("Cannot read input {}", path.display()))?;
            let progress =
                ProgressReporter::new(files.len() as u64, "Loading CSV files...", cli.quiet);

            let options = LoaderOptions {
                processed_dir: config.processed_dir.clone(),
                batch_size: config.batch_size,
                duplicate_policy: config.duplicate_policy,
                dry_run,
            };
            let mut loader = EtlLoader::new(&registry, &mut store).with_options(options);
            let report = loader.load_path(&path, Some(&progress))?;

            println!("\n{}", report.summary());

            if let Some(report_path) = report_json {
                fs::write(&report_path, report.to_json()?)
                    .with_context(|| format!("Failed to write {}", report_path.display()))?;
                info!("Wrote JSON report to {}", report_path.display());
            }

            if report.has_failures() {
                warn!("{} file(s) failed", report.totals.files_failed);
                Ok(RunStatus::FileFailures)
            } else {
                Ok(RunStatus::Success)
            }
        }

        Commands::Formats => {
            let registry = config.registry()?;
            print!("{}", describe_formats(&registry));
            Ok(RunStatus::Success)
        }

        Commands::Inspect { file, sample } => {
            let registry = config.registry()?;
            inspect(&registry, &file, sample)
        }

        Commands::Daily {
            station,
            from,
            to,
            json,
        } => {
            let store = open_migrated(&config.database)?;
            let filter = ObservationFilter {
                station_id: station,
                from,
                to,
            };
            let days = daily_aggregates(&store, &filter)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&days)?);
            } else {
                print!("{}", daily_summary(&days));
            }
            Ok(RunStatus::Success)
        }

        Commands::Stations { json } => {
            let store = open_migrated(&config.database)?;
            let inventory = StationInventory::from_store(&store)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&inventory)?);
            } else {
                print!("{}", inventory.summary());
            }
            Ok(RunStatus::Success)
        }

        Commands::Quality { json } => {
            let store = open_migrated(&config.database)?;
            let report = CompletenessReport::from_store(&store)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{}", report.summary());
            }
            Ok(RunStatus::Success)
        }

        Commands::Correlations {
            station,
            from,
            to,
            method,
            min_observations,
            threshold,
            window_days,
            step_days,
            json,
        } => {
            let store = open_migrated(&config.database)?;
            let filter = ObservationFilter {
                station_id: station,
                from,
                to,
            };
            let mut options = CorrelationOptions {
                method,
                min_observations,
                threshold,
                ..Default::default()
            };

            match window_days {
                Some(window_days) => {
                    options.fields = DEFAULT_STABILITY_FIELDS.to_vec();
                    let observations: Vec<_> = store
                        .observations(&filter)?
                        .into_iter()
                        .map(|s| s.observation)
                        .collect();
                    let report =
                        StabilityReport::compute(&observations, &options, window_days, step_days)?;
                    if json {
                        println!("{}", serde_json::to_string_pretty(&report)?);
                    } else {
                        print!("{}", report.summary());
                    }
                }
                None => {
                    let matrix = CorrelationMatrix::from_store(&store, &filter, &options)
                        .context("Cannot compute correlations")?;
                    if json {
                        let strong = matrix.strong_correlations(options.threshold);
                        let value = serde_json::json!({ "matrix": matrix, "strong": strong });
                        println!("{}", serde_json::to_string_pretty(&value)?);
                    } else {
                        print!("{}", matrix.summary(options.threshold));
                    }
                }
            }
            Ok(RunStatus::Success)
        }
    }
}

fn open_store(path: &Path) -> Result<SqliteStore> {
    SqliteStore::open(path).with_context(|| format!("Failed to open store {}", path.display()))
}

fn open_migrated(path: &Path) -> Result<SqliteStore> {
    let mut store = open_store(path)?;
    store.migrate()?;
    Ok(store)
}

fn describe_unit(unit: &UnitConversion) -> String {
    match unit {
        UnitConversion::Identity => String::new(),
        UnitConversion::Scale { factor } => format!(" (x{})", factor),
        UnitConversion::Offset { delta } => format!(" (+{})", delta),
        UnitConversion::FahrenheitToCelsius => " (°F -> °C)".to_string(),
        UnitConversion::KilometresPerHourToMetresPerSecond => " (km/h -> m/s)".to_string(),
    }
}

pub fn describe_formats(registry: &FormatRegistry) -> String {
    let mut out = String::new();

    for format in registry.formats() {
        out.push_str(&format!(
            "{} - {} (decimal '{}', UTC offset {} min)\n",
            format.id,
            format.name,
            format.decimal_separator.as_char(),
            format.utc_offset_minutes
        ));
        out.push_str(&format!(
            "  timestamps: {}\n",
            format.timestamp_formats.join(" | ")
        ));
        for rule in &format.columns {
            out.push_str(&format!(
                "  {:<20} <- {}{}{}\n",
                rule.field.column(),
                rule.aliases.join(" | "),
                describe_unit(&rule.unit),
                if rule.required { " [required]" } else { "" }
            ));
        }
        out.push('\n');
    }

    out
}

fn inspect(registry: &FormatRegistry, file: &Path, sample: usize) -> Result<RunStatus> {
    let raw = CsvReader::new().read(file)?;
    println!("File: {}", file.display());
    println!(
        "Encoding: {}, delimiter: {:?}, rows: {}",
        raw.encoding,
        char::from(raw.delimiter),
        raw.row_count()
    );

    let format = match registry.detect(&raw.headers) {
        Ok(format) => format,
        Err(e) => {
            println!("{}", e);
            return Ok(RunStatus::FileFailures);
        }
    };
    println!("Format: {} ({})", format.id, format.name);

    let mapper = ColumnMapper::new(format, &raw.headers);
    println!("\nMapped columns:");
    for (column, field) in mapper.mapped_columns() {
        println!("  {:<30} -> {}", column, field);
    }
    if !mapper.unmapped_columns().is_empty() {
        println!("\nUnmapped columns:");
        for column in mapper.unmapped_columns() {
            println!("  {}", column);
        }
    }

    let fallback = station_from_filename(file);
    let mut mapped = 0;
    let mut dropped = 0;
    let mut reasons: BTreeMap<String, usize> = BTreeMap::new();
    let mut samples = Vec::new();

    for record in &raw.records {
        let outcome = mapper.map_row(record, fallback.as_deref());
        for warning in outcome.warnings() {
            *reasons.entry(warning.reason()).or_default() += 1;
        }
        match outcome {
            RowOutcome::Mapped { observation, .. } => {
                mapped += 1;
                if samples.len() < sample {
                    samples.push(observation);
                }
            }
            RowOutcome::Dropped { .. } => dropped += 1,
        }
    }

    println!("\nRows: {} mapped, {} dropped", mapped, dropped);
    for (reason, count) in &reasons {
        println!("  {:>6}  {}", count, reason);
    }

    if !samples.is_empty() {
        println!("\nSample:");
        for observation in &samples {
            println!("  {}", serde_json::to_string(observation)?);
        }
    }

    Ok(RunStatus::Success)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(RunStatus::Success.exit_code(), 0);
        assert_eq!(RunStatus::FileFailures.exit_code(), 1);
    }

    #[test]
    fn test_describe_formats_lists_builtin_columns() {
        let text = describe_formats(&FormatRegistry::builtin());
        assert!(text.contains("standard"));
        assert!(text.contains("italian"));
        assert!(text.contains("wsp_ana"));
        assert!(text.contains("Data e ora"));
        assert!(text.contains("[required]"));
    }
}
