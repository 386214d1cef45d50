use serde::Serialize;

use crate::error::Result;
use crate::models::CanonicalField;
use crate::store::{NullCounts, SqliteStore};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnCompleteness {
    pub field: CanonicalField,
    pub null_count: usize,
    pub null_percentage: f64,
}

/// Missing values per column across the whole table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletenessReport {
    pub total_rows: usize,
    pub columns: Vec<ColumnCompleteness>,
}

impl CompletenessReport {
    pub fn from_store(store: &SqliteStore) -> Result<Self> {
        Ok(Self::from_counts(&store.null_counts()?))
    }

    pub fn from_counts(counts: &NullCounts) -> Self {
        let columns = counts
            .nulls
            .iter()
            .map(|(field, nulls)| ColumnCompleteness {
                field: *field,
                null_count: *nulls,
                null_percentage: if counts.total_rows == 0 {
                    0.0
                } else {
                    100.0 * *nulls as f64 / counts.total_rows as f64
                },
            })
            .collect();

        Self {
            total_rows: counts.total_rows,
            columns,
        }
    }

    /// Columns with no value in any row.
    pub fn empty_columns(&self) -> Vec<CanonicalField> {
        if self.total_rows == 0 {
            return Vec::new();
        }
        self.columns
            .iter()
            .filter(|c| c.null_count == self.total_rows)
            .map(|c| c.field)
            .collect()
    }

    pub fn summary(&self) -> String {
        let mut summary = String::new();
        summary.push_str("=== Data Completeness ===\n");
        summary.push_str(&format!("Total Rows: {}\n", self.total_rows));
        for column in &self.columns {
            summary.push_str(&format!(
                "  {:<20} missing {:>8} ({:.1}%)\n",
                column.field.column(),
                column.null_count,
                column.null_percentage
            ));
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentages() {
        let counts = NullCounts {
            total_rows: 4,
            nulls: vec![
                (CanonicalField::Temperature, 1),
                (CanonicalField::Radiation, 4),
            ],
        };
        let report = CompletenessReport::from_counts(&counts);

        assert_eq!(report.columns[0].null_percentage, 25.0);
        assert_eq!(report.empty_columns(), vec![CanonicalField::Radiation]);
        assert!(report.summary().contains("temperature"));
    }

    #[test]
    fn test_empty_table_has_no_percentages() {
        let counts = NullCounts {
            total_rows: 0,
            nulls: vec![(CanonicalField::Temperature, 0)],
        };
        let report = CompletenessReport::from_counts(&counts);
        assert_eq!(report.columns[0].null_percentage, 0.0);
        assert!(report.empty_columns().is_empty());
    }
}
