use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{EtlError, Result};
use crate::mapping::{DropReason, FieldWarning};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Pending,
    Loaded,
    DryRun,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileFailure {
    pub kind: String,
    pub message: String,
}

/// Outcome of loading one CSV file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileReport {
    pub path: PathBuf,
    pub status: FileStatus,
    pub format: Option<String>,
    pub encoding: Option<String>,
    pub delimiter: Option<char>,
    pub rows_read: usize,
    pub rows_loaded: usize,
    pub rows_dropped: usize,
    pub rows_skipped: usize,
    pub field_warnings: usize,
    pub warning_reasons: BTreeMap<String, usize>,
    pub drop_reasons: BTreeMap<String, usize>,
    /// Source columns the detected format has no rule for.
    pub unmapped_columns: Vec<String>,
    pub archived_to: Option<PathBuf>,
    pub error: Option<FileFailure>,
}

impl FileReport {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            status: FileStatus::Pending,
            format: None,
            encoding: None,
            delimiter: None,
            rows_read: 0,
            rows_loaded: 0,
            rows_dropped: 0,
            rows_skipped: 0,
            field_warnings: 0,
            warning_reasons: BTreeMap::new(),
            drop_reasons: BTreeMap::new(),
            unmapped_columns: Vec::new(),
            archived_to: None,
            error: None,
        }
    }

    pub fn record_warnings(&mut self, warnings: &[FieldWarning]) {
        for warning in warnings {
            self.field_warnings += 1;
            *self.warning_reasons.entry(warning.reason()).or_default() += 1;
        }
    }

    pub fn record_drop(&mut self, reason: DropReason) {
        self.rows_dropped += 1;
        *self.drop_reasons.entry(reason.describe()).or_default() += 1;
    }

    pub fn fail(&mut self, error: &EtlError) {
        self.status = FileStatus::Failed;
        self.error = Some(FileFailure {
            kind: error.kind().to_string(),
            message: error.to_string(),
        });
    }

    pub fn is_failure(&self) -> bool {
        self.status == FileStatus::Failed
    }

    pub fn summary_line(&self) -> String {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string());

        match (&self.status, &self.error) {
            (FileStatus::Failed, Some(failure)) => {
                format!("{}: FAILED ({}) {}", name, failure.kind, failure.message)
            }
            (status, _) => format!(
                "{}: {} [{}] read={} loaded={} dropped={} skipped={} warnings={}",
                name,
                match status {
                    FileStatus::DryRun => "dry-run",
                    FileStatus::Pending => "pending",
                    _ => "loaded",
                },
                self.format.as_deref().unwrap_or("?"),
                self.rows_read,
                self.rows_loaded,
                self.rows_dropped,
                self.rows_skipped,
                self.field_warnings,
            ),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadTotals {
    pub files: usize,
    pub files_loaded: usize,
    pub files_failed: usize,
    pub rows_read: usize,
    pub rows_loaded: usize,
    pub rows_dropped: usize,
    pub rows_skipped: usize,
    pub field_warnings: usize,
}

/// Everything one `load` invocation did, file by file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub dry_run: bool,
    pub totals: LoadTotals,
    pub files: Vec<FileReport>,
}

impl LoadReport {
    pub fn new(started_at: DateTime<Utc>, dry_run: bool) -> Self {
        Self {
            started_at,
            finished_at: None,
            dry_run,
            totals: LoadTotals::default(),
            files: Vec::new(),
        }
    }

    pub fn push(&mut self, file: FileReport) {
        let totals = &mut self.totals;
        totals.files += 1;
        if file.is_failure() {
            totals.files_failed += 1;
        } else {
            totals.files_loaded += 1;
        }
        totals.rows_read += file.rows_read;
        totals.rows_loaded += file.rows_loaded;
        totals.rows_dropped += file.rows_dropped;
        totals.rows_skipped += file.rows_skipped;
        totals.field_warnings += file.field_warnings;

        self.files.push(file);
    }

    pub fn finish(&mut self, finished_at: DateTime<Utc>) {
        self.finished_at = Some(finished_at);
    }

    pub fn has_failures(&self) -> bool {
        self.totals.files_failed > 0
    }

    pub fn failures(&self) -> impl Iterator<Item = &FileReport> {
        self.files.iter().filter(|f| f.is_failure())
    }

    /// Warning reasons summed over every file.
    pub fn warning_reasons(&self) -> BTreeMap<String, usize> {
        let mut reasons = BTreeMap::new();
        for file in &self.files {
            for (reason, count) in &file.warning_reasons {
                *reasons.entry(reason.clone()).or_default() += count;
            }
        }
        reasons
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn summary(&self) -> String {
        let mut summary = String::new();
        let totals = &self.totals;

        summary.push_str("=== Load Report ===\n");
        if self.dry_run {
            summary.push_str("Mode: dry run (nothing written or moved)\n");
        }
        summary.push_str(&format!(
            "Files: {} (loaded {}, failed {})\n",
            totals.files, totals.files_loaded, totals.files_failed
        ));
        summary.push_str(&format!("Rows Read: {}\n", totals.rows_read));
        summary.push_str(&format!("Rows Loaded: {}\n", totals.rows_loaded));
        summary.push_str(&format!("Rows Dropped: {}\n", totals.rows_dropped));
        summary.push_str(&format!("Rows Skipped: {}\n", totals.rows_skipped));
        summary.push_str(&format!("Field Warnings: {}\n", totals.field_warnings));

        if !self.files.is_empty() {
            summary.push_str("\nFiles:\n");
            for file in &self.files {
                summary.push_str(&format!("  {}\n", file.summary_line()));
            }
        }

        let ignored: Vec<&FileReport> = self
            .files
            .iter()
            .filter(|f| !f.unmapped_columns.is_empty())
            .collect();
        if !ignored.is_empty() {
            summary.push_str("\nUnmapped Columns (not loaded):\n");
            for file in ignored {
                summary.push_str(&format!(
                    "  {}: {}\n",
                    file.path.display(),
                    file.unmapped_columns.join(", ")
                ));
            }
        }

        let reasons = self.warning_reasons();
        if !reasons.is_empty() {
            summary.push_str("\nWarning Reasons:\n");
            for (reason, count) in &reasons {
                summary.push_str(&format!("  {:>6}  {}\n", count, reason));
            }
        }

        if self.has_failures() {
            summary.push_str("\nFailures:\n");
            for (i, file) in self.failures().enumerate() {
                if let Some(failure) = &file.error {
                    summary.push_str(&format!(
                        "  {}. {}: {}\n",
                        i + 1,
                        file.path.display(),
                        failure.message
                    ));
                }
            }
        }

        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::WarningKind;
    use crate::models::CanonicalField;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn started() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()
    }

    fn wind_warning() -> FieldWarning {
        FieldWarning {
            field: CanonicalField::WindSpeed,
            column: "wsp_ana".to_string(),
            raw: "calm".to_string(),
            kind: WarningKind::NotNumeric,
        }
    }

    #[test]
    fn test_file_report_counts_reasons() {
        let mut file = FileReport::new(Path::new("263_may.csv"));
        file.record_warnings(&[wind_warning(), wind_warning()]);
        file.record_drop(DropReason::RequiredFieldMissing(CanonicalField::Timestamp));

        assert_eq!(file.field_warnings, 2);
        assert_eq!(file.warning_reasons.get("wind_speed: non-numeric value"), Some(&2));
        assert_eq!(file.rows_dropped, 1);
        assert_eq!(
            file.drop_reasons.get("timestamp missing or unparseable"),
            Some(&1)
        );
    }

    #[test]
    fn test_load_report_totals_and_failures() {
        let mut report = LoadReport::new(started(), false);

        let mut good = FileReport::new(Path::new("a.csv"));
        good.status = FileStatus::Loaded;
        good.rows_read = 3;
        good.rows_loaded = 3;
        good.record_warnings(&[wind_warning()]);
        report.push(good);

        let mut bad = FileReport::new(Path::new("b.csv"));
        bad.fail(&EtlError::UnrecognizedFormat {
            headers: vec!["foo".to_string()],
        });
        report.push(bad);

        assert!(report.has_failures());
        assert_eq!(
            report.totals,
            LoadTotals {
                files: 2,
                files_loaded: 1,
                files_failed: 1,
                rows_read: 3,
                rows_loaded: 3,
                rows_dropped: 0,
                rows_skipped: 0,
                field_warnings: 1,
            }
        );

        let summary = report.summary();
        assert!(summary.contains("Files: 2 (loaded 1, failed 1)"));
        assert!(summary.contains("wind_speed: non-numeric value"));
        assert!(summary.contains("b.csv: FAILED (unrecognized_format)"));
        assert!(!summary.contains("Unmapped Columns"));
    }

    #[test]
    fn test_summary_lists_unmapped_columns() {
        let mut report = LoadReport::new(started(), false);
        let mut file = FileReport::new(Path::new("263_may.csv"));
        file.status = FileStatus::Loaded;
        file.unmapped_columns = vec!["batteria (V)".to_string(), "note".to_string()];
        report.push(file);

        let summary = report.summary();
        assert!(summary.contains("Unmapped Columns (not loaded):"));
        assert!(summary.contains("263_may.csv: batteria (V), note"));
    }

    #[test]
    fn test_json_report_shape() -> Result<()> {
        let mut report = LoadReport::new(started(), true);
        let mut file = FileReport::new(Path::new("a.csv"));
        file.status = FileStatus::DryRun;
        file.delimiter = Some(';');
        file.unmapped_columns = vec!["note".to_string()];
        report.push(file);

        let value: serde_json::Value = serde_json::from_str(&report.to_json()?)?;
        assert_eq!(value["dry_run"], true);
        assert_eq!(value["files"][0]["status"], "dry_run");
        assert_eq!(value["files"][0]["delimiter"], ";");
        assert_eq!(value["files"][0]["unmapped_columns"][0], "note");
        assert_eq!(value["totals"]["files_loaded"], 1);
        Ok(())
    }
}
