pub mod constants;
pub mod filename;
pub mod progress;

pub use constants::*;
pub use filename::{archive_destination, has_extension, station_from_filename};
pub use progress::ProgressReporter;
