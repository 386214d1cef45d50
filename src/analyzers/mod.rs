pub mod completeness;
pub mod correlation;
pub mod daily;
pub mod inventory;

pub use completeness::{ColumnCompleteness, CompletenessReport};
pub use correlation::{
    CorrelationMatrix, CorrelationMethod, CorrelationOptions, StabilityReport, StrongCorrelation,
};
pub use daily::{aggregate_daily, daily_aggregates, daily_summary};
pub use inventory::StationInventory;
