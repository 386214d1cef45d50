pub mod schema;
pub mod sqlite;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{CanonicalField, Observation};

pub use sqlite::SqliteStore;

/// What to do with a row whose `(timestamp, station_id)` is already stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DuplicatePolicy {
    /// Insert anyway. Reloading a file duplicates its rows.
    #[default]
    Append,
    /// Leave the stored row alone and count the new one as skipped.
    SkipExisting,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct InsertOutcome {
    pub inserted: usize,
    pub skipped: usize,
}

/// Station and inclusive UTC date bounds for read queries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObservationFilter {
    pub station_id: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

/// Null counts per nullable column over the whole table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NullCounts {
    pub total_rows: usize,
    pub nulls: Vec<(CanonicalField, usize)>,
}

/// Destination for canonical observations.
pub trait ObservationStore {
    /// Insert every row or none of them.
    fn insert_batch(
        &mut self,
        rows: &[Observation],
        loaded_at: DateTime<Utc>,
        policy: DuplicatePolicy,
        chunk_size: usize,
    ) -> Result<InsertOutcome>;

    fn count(&self) -> Result<usize>;
}
