pub mod loader;
pub mod report;

pub use loader::{EtlLoader, LoaderOptions};
pub use report::{FileFailure, FileReport, FileStatus, LoadReport, LoadTotals};
