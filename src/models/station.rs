use chrono::{DateTime, Utc};
use serde::Serialize;

/// One station in the store with the span of its observations.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationSummary {
    pub station_id: String,
    pub observation_count: usize,
    pub first_observation: DateTime<Utc>,
    pub last_observation: DateTime<Utc>,
}

impl StationSummary {
    pub fn new(
        station_id: String,
        observation_count: usize,
        first_observation: DateTime<Utc>,
        last_observation: DateTime<Utc>,
    ) -> Self {
        Self {
            station_id,
            observation_count,
            first_observation,
            last_observation,
        }
    }

    /// Whole days between the first and last observation, inclusive.
    pub fn days_covered(&self) -> i64 {
        (self.last_observation.date_naive() - self.first_observation.date_naive()).num_days() + 1
    }
}
