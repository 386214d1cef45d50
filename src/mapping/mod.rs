pub mod coercion;
pub mod descriptor;
pub mod mapper;

pub use coercion::{FieldWarning, WarningKind};
pub use descriptor::{ColumnRule, DecimalSeparator, FormatRegistry, SourceFormat, UnitConversion};
pub use mapper::{ColumnMapper, DropReason, RowOutcome};
