pub mod daily;
pub mod observation;
pub mod station;

pub use daily::{DailyAggregate, FieldAggregate};
pub use observation::{CanonicalField, FieldKind, Observation, ObservationBuilder, StoredObservation};
pub use station::StationSummary;
