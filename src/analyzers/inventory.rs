use serde::Serialize;

use crate::error::Result;
use crate::models::StationSummary;
use crate::store::SqliteStore;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationInventory {
    pub stations: Vec<StationSummary>,
}

impl StationInventory {
    pub fn from_store(store: &SqliteStore) -> Result<Self> {
        Ok(Self {
            stations: store.stations()?,
        })
    }

    pub fn total_observations(&self) -> usize {
        self.stations.iter().map(|s| s.observation_count).sum()
    }

    pub fn summary(&self) -> String {
        let mut summary = String::new();
        summary.push_str("=== Station Inventory ===\n");
        summary.push_str(&format!(
            "Stations: {}, Observations: {}\n",
            self.stations.len(),
            self.total_observations()
        ));

        for station in &self.stations {
            summary.push_str(&format!(
                "  {:<12} {:>8} obs  {} -> {} ({} days)\n",
                station.station_id,
                station.observation_count,
                station.first_observation.format("%Y-%m-%d %H:%M"),
                station.last_observation.format("%Y-%m-%d %H:%M"),
                station.days_covered()
            ));
        }

        summary
    }
}
