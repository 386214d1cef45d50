use chrono::{DateTime, SubsecRound, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::{EtlError, Result};
use crate::mapping::{ColumnMapper, FormatRegistry, RowOutcome};
use crate::processors::report::{FileReport, FileStatus, LoadReport};
use crate::readers::CsvReader;
use crate::store::{DuplicatePolicy, ObservationStore};
use crate::utils::constants::{CSV_EXTENSION, DEFAULT_BATCH_SIZE, PROCESSED_DIR};
use crate::utils::filename::{archive_destination, has_extension, station_from_filename};
use crate::utils::progress::ProgressReporter;

#[derive(Debug, Clone)]
pub struct LoaderOptions {
    /// Where loaded files go. Defaults to `processed/` next to the input.
    pub processed_dir: Option<PathBuf>,
    pub batch_size: usize,
    pub duplicate_policy: DuplicatePolicy,
    pub dry_run: bool,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            processed_dir: None,
            batch_size: DEFAULT_BATCH_SIZE,
            duplicate_policy: DuplicatePolicy::default(),
            dry_run: false,
        }
    }
}

/// Loads CSV files into an [`ObservationStore`], one transaction per file.
///
/// A file is moved to the processed directory only after its rows are
/// committed, so the unprocessed set is exactly what still needs loading.
pub struct EtlLoader<'a, S: ObservationStore> {
    registry: &'a FormatRegistry,
    store: &'a mut S,
    reader: CsvReader,
    options: LoaderOptions,
}

impl<'a, S: ObservationStore> EtlLoader<'a, S> {
    pub fn new(registry: &'a FormatRegistry, store: &'a mut S) -> Self {
        Self {
            registry,
            store,
            reader: CsvReader::new(),
            options: LoaderOptions::default(),
        }
    }

    pub fn with_options(mut self, options: LoaderOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_reader(mut self, reader: CsvReader) -> Self {
        self.reader = reader;
        self
    }

    /// CSV files directly inside `path` (or `path` itself), sorted by name.
    pub fn discover(path: &Path) -> Result<Vec<PathBuf>> {
        if path.is_file() {
            return Ok(vec![path.to_path_buf()]);
        }
        if !path.is_dir() {
            return Err(EtlError::ReadFailure {
                path: path.to_path_buf(),
                message: "no such file or directory".to_string(),
            });
        }

        let mut files = Vec::new();
        for entry in fs::read_dir(path)? {
            let entry_path = entry?.path();
            if entry_path.is_file() && has_extension(&entry_path, CSV_EXTENSION) {
                files.push(entry_path);
            }
        }
        files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

        Ok(files)
    }

    pub fn processed_dir_for(&self, path: &Path) -> PathBuf {
        if let Some(dir) = &self.options.processed_dir {
            return dir.clone();
        }
        let base = if path.is_file() {
            path.parent().unwrap_or_else(|| Path::new("."))
        } else {
            path
        };
        base.join(PROCESSED_DIR)
    }

    /// Load every CSV file under `path`. File failures are recorded in the
    /// report and never abort the run; only an unreadable `path` is an error.
    pub fn load_path(
        &mut self,
        path: &Path,
        progress: Option<&ProgressReporter>,
    ) -> Result<LoadReport> {
        let files = Self::discover(path)?;
        let processed_dir = self.processed_dir_for(path);
        let mut report = LoadReport::new(Utc::now(), self.options.dry_run);

        info!(
            "Found {} CSV file(s) in {}, processed files go to {}",
            files.len(),
            path.display(),
            processed_dir.display()
        );

        for file in &files {
            if let Some(p) = progress {
                p.set_message(&format!("Loading {}", file.display()));
            }

            report.push(self.load_file(file, &processed_dir));

            if let Some(p) = progress {
                p.increment(1);
            }
        }

        if let Some(p) = progress {
            p.finish_with_message(&format!("Processed {} file(s)", files.len()));
        }

        report.finish(Utc::now());
        Ok(report)
    }

    pub fn load_file(&mut self, path: &Path, processed_dir: &Path) -> FileReport {
        let mut report = FileReport::new(path);
        let loaded_at = Utc::now().trunc_subsecs(0);

        match self.try_load_file(path, processed_dir, loaded_at, &mut report) {
            Ok(()) => {
                info!(
                    file = %path.display(),
                    format = report.format.as_deref().unwrap_or("?"),
                    rows_read = report.rows_read,
                    rows_loaded = report.rows_loaded,
                    rows_dropped = report.rows_dropped,
                    rows_skipped = report.rows_skipped,
                    "File {}",
                    if self.options.dry_run { "checked" } else { "loaded" }
                );
                if report.field_warnings > 0 {
                    warn!(
                        file = %path.display(),
                        "{} field warning(s): {}",
                        report.field_warnings,
                        report
                            .warning_reasons
                            .iter()
                            .map(|(reason, count)| format!("{} x{}", reason, count))
                            .collect::<Vec<_>>()
                            .join(", ")
                    );
                }
            }
            Err(e) => {
                warn!(file = %path.display(), kind = e.kind(), "File failed: {}", e);
                report.fail(&e);
            }
        }

        report
    }

    fn try_load_file(
        &mut self,
        path: &Path,
        processed_dir: &Path,
        loaded_at: DateTime<Utc>,
        report: &mut FileReport,
    ) -> Result<()> {
        let raw = self.reader.read(path)?;
        report.encoding = Some(raw.encoding.to_string());
        report.delimiter = Some(char::from(raw.delimiter));
        report.rows_read = raw.row_count();

        let format = self.registry.detect(&raw.headers)?;
        report.format = Some(format.id.clone());
        debug!(file = %path.display(), format = %format.id, "Detected format");

        let mapper = ColumnMapper::new(format, &raw.headers);
        report.unmapped_columns = mapper.unmapped_columns().to_vec();
        if !report.unmapped_columns.is_empty() {
            warn!(
                file = %path.display(),
                format = %format.id,
                "{} column(s) not loaded: {}",
                report.unmapped_columns.len(),
                report.unmapped_columns.join(", ")
            );
        }
        let fallback_station = station_from_filename(path);

        let mut observations = Vec::with_capacity(raw.row_count());
        for (index, record) in raw.records.iter().enumerate() {
            let outcome = mapper.map_row(record, fallback_station.as_deref());
            report.record_warnings(outcome.warnings());

            match outcome {
                RowOutcome::Mapped { observation, .. } => observations.push(observation),
                RowOutcome::Dropped { reason, .. } => {
                    // +2: one for the header, one for 1-based numbering
                    debug!(
                        file = %path.display(),
                        line = index + 2,
                        "Row dropped: {}",
                        reason.describe()
                    );
                    report.record_drop(reason);
                }
            }
        }

        if self.options.dry_run {
            report.rows_loaded = observations.len();
            report.status = FileStatus::DryRun;
            return Ok(());
        }

        let outcome = self.store.insert_batch(
            &observations,
            loaded_at,
            self.options.duplicate_policy,
            self.options.batch_size,
        )?;
        report.rows_loaded = outcome.inserted;
        report.rows_skipped = outcome.skipped;

        let destination = archive_destination(processed_dir, path, loaded_at);
        move_file(path, &destination).map_err(|e| EtlError::ArchiveFailure {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        debug!("Moved {} to {}", path.display(), destination.display());

        report.archived_to = Some(destination);
        report.status = FileStatus::Loaded;
        Ok(())
    }
}

/// Rename, falling back to copy and remove when the rename is refused
/// (e.g. across filesystems).
fn move_file(source: &Path, destination: &Path) -> std::io::Result<()> {
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent)?;
    }

    match fs::rename(source, destination) {
        Ok(()) => Ok(()),
        Err(rename_err) => {
            debug!("Rename failed ({}), copying instead", rename_err);
            fs::copy(source, destination)?;
            if let Err(e) = fs::remove_file(source) {
                // Leave a single copy behind so the file is not archived twice
                let _ = fs::remove_file(destination);
                return Err(e);
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_discover_sorts_and_filters() -> Result<()> {
        let dir = TempDir::new()?;
        fs::write(dir.path().join("b.csv"), "x")?;
        fs::write(dir.path().join("a.CSV"), "x")?;
        fs::write(dir.path().join("notes.txt"), "x")?;
        fs::create_dir(dir.path().join(PROCESSED_DIR))?;
        fs::write(dir.path().join(PROCESSED_DIR).join("old.csv"), "x")?;

        let files = EtlLoader::<crate::store::SqliteStore>::discover(dir.path())?;
        let names: Vec<_> = files
            .iter()
            .map(|f| f.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.CSV", "b.csv"]);
        Ok(())
    }

    #[test]
    fn test_discover_missing_path() {
        let err = EtlLoader::<crate::store::SqliteStore>::discover(Path::new("/nonexistent/dir"))
            .unwrap_err();
        assert!(matches!(err, EtlError::ReadFailure { .. }));
    }

    #[test]
    fn test_move_file_creates_destination_dir() -> Result<()> {
        let dir = TempDir::new()?;
        let source = dir.path().join("a.csv");
        fs::write(&source, "x")?;
        let destination = dir.path().join("processed").join("a.csv");

        move_file(&source, &destination)?;
        assert!(!source.exists());
        assert_eq!(fs::read_to_string(&destination)?, "x");
        Ok(())
    }
}
