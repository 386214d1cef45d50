use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::borrow::Cow;
use std::str::FromStr;

use crate::mapping::descriptor::{DecimalSeparator, SourceFormat, UnitConversion};
use crate::models::CanonicalField;
use crate::utils::constants::{MAX_ABS_LATITUDE, MAX_ABS_LONGITUDE};

/// Why a single field was degraded to null.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    Sentinel,
    NotNumeric,
    NotInteger,
    OutOfRange,
}

impl WarningKind {
    pub fn describe(&self) -> &'static str {
        match self {
            WarningKind::Sentinel => "sensor fault sentinel",
            WarningKind::NotNumeric => "non-numeric value",
            WarningKind::NotInteger => "non-integer value",
            WarningKind::OutOfRange => "value out of range",
        }
    }
}

/// A field coercion failure: the field is stored as null and the row kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldWarning {
    pub field: CanonicalField,
    pub column: String,
    pub raw: String,
    pub kind: WarningKind,
}

impl FieldWarning {
    /// Grouping key for run reports, e.g. `wind_speed: non-numeric value`.
    pub fn reason(&self) -> String {
        format!("{}: {}", self.field, self.kind.describe())
    }
}

impl std::fmt::Display for FieldWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} from column '{}' ({:?}): {}",
            self.field,
            self.column,
            self.raw,
            self.kind.describe()
        )
    }
}

/// `Ok(None)` is an empty cell; `Err` degrades the field with a warning.
pub type Coerced<T> = std::result::Result<Option<T>, WarningKind>;

/// Rewrite locale decimals into the form `Decimal::from_str` expects.
pub fn normalize_decimal_text(raw: &str, separator: DecimalSeparator) -> Cow<'_, str> {
    match separator {
        DecimalSeparator::Period => Cow::Borrowed(raw),
        DecimalSeparator::Comma if raw.contains(',') => Cow::Owned(raw.replace(',', ".")),
        DecimalSeparator::Comma => Cow::Borrowed(raw),
    }
}

pub fn parse_decimal(text: &str) -> Option<Decimal> {
    Decimal::from_str(text)
        .or_else(|_| Decimal::from_scientific(text))
        .ok()
}

fn is_sentinel(format: &SourceFormat, trimmed: &str, value: Option<Decimal>) -> bool {
    if format.is_sentinel(trimmed) {
        return true;
    }
    match value {
        Some(value) => format
            .sentinels
            .iter()
            .filter_map(|s| parse_decimal(s))
            .any(|sentinel| sentinel == value),
        None => false,
    }
}

pub fn coerce_decimal(raw: &str, format: &SourceFormat, unit: UnitConversion) -> Coerced<Decimal> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let parsed = parse_decimal(&normalize_decimal_text(trimmed, format.decimal_separator));
    if is_sentinel(format, trimmed, parsed) {
        return Err(WarningKind::Sentinel);
    }

    match parsed {
        Some(value) => unit
            .apply(value)
            .map(|v| Some(v.normalize()))
            .ok_or(WarningKind::OutOfRange),
        None => Err(WarningKind::NotNumeric),
    }
}

pub fn coerce_integer(raw: &str, format: &SourceFormat, unit: UnitConversion) -> Coerced<i64> {
    let Some(value) = coerce_decimal(raw, format, unit)? else {
        return Ok(None);
    };

    if !value.fract().is_zero() {
        return Err(WarningKind::NotInteger);
    }
    i64::try_from(value).map(Some).map_err(|_| WarningKind::OutOfRange)
}

/// Coordinates outside the globe are sensor or export faults.
pub fn check_range(field: CanonicalField, value: Decimal) -> Coerced<Decimal> {
    let limit = match field {
        CanonicalField::Latitude => Decimal::from(MAX_ABS_LATITUDE),
        CanonicalField::Longitude => Decimal::from(MAX_ABS_LONGITUDE),
        _ => return Ok(Some(value)),
    };

    if value.abs() > limit {
        Err(WarningKind::OutOfRange)
    } else {
        Ok(Some(value))
    }
}

/// Parse a source timestamp into UTC.
///
/// RFC 3339 strings carry their own offset; naive strings are read in the
/// format's configured offset.
pub fn parse_timestamp(raw: &str, format: &SourceFormat) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }

    let offset = FixedOffset::east_opt(format.utc_offset_minutes * 60)?;
    format
        .timestamp_formats
        .iter()
        .find_map(|layout| NaiveDateTime::parse_from_str(trimmed, layout).ok())
        .and_then(|naive| offset.from_local_datetime(&naive).single())
        .map(|dt| dt.with_timezone(&Utc))
}

pub fn parse_station_id(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_coerce_decimal_standard() {
        let format = SourceFormat::standard();
        let unit = UnitConversion::Identity;
        assert_eq!(coerce_decimal(" 12.5 ", &format, unit), Ok(Some(dec("12.5"))));
        assert_eq!(coerce_decimal("-3", &format, unit), Ok(Some(dec("-3"))));
        assert_eq!(coerce_decimal("1.2e2", &format, unit), Ok(Some(dec("120"))));
        assert_eq!(coerce_decimal("", &format, unit), Ok(None));
        assert_eq!(coerce_decimal("abc", &format, unit), Err(WarningKind::NotNumeric));
        // Comma decimals are not accepted by a period format
        assert_eq!(coerce_decimal("1,5", &format, unit), Err(WarningKind::NotNumeric));
    }

    #[test]
    fn test_coerce_decimal_comma_format() {
        let format = SourceFormat::italian();
        let unit = UnitConversion::Identity;
        assert_eq!(coerce_decimal("1,5", &format, unit), Ok(Some(dec("1.5"))));
        assert_eq!(coerce_decimal("21", &format, unit), Ok(Some(dec("21"))));
        assert_eq!(coerce_decimal("1.234,5", &format, unit), Err(WarningKind::NotNumeric));
    }

    #[test]
    fn test_sentinels_map_to_warning() {
        let format = SourceFormat::standard();
        let unit = UnitConversion::Identity;
        assert_eq!(coerce_decimal("NaN", &format, unit), Err(WarningKind::Sentinel));
        assert_eq!(coerce_decimal("-9999", &format, unit), Err(WarningKind::Sentinel));
        assert_eq!(coerce_decimal("-9999.00", &format, unit), Err(WarningKind::Sentinel));
    }

    #[test]
    fn test_wide_values_do_not_overflow() {
        let format = SourceFormat::standard();
        let value = coerce_decimal("4294967296123.75", &format, UnitConversion::Identity);
        assert_eq!(value, Ok(Some(dec("4294967296123.75"))));
    }

    #[test]
    fn test_conversion_overflow_degrades_field() {
        let format = SourceFormat::standard();
        let huge = "50000000000000000000000000000";
        assert_eq!(
            coerce_decimal(huge, &format, UnitConversion::Scale { factor: dec("10") }),
            Err(WarningKind::OutOfRange)
        );
        assert_eq!(
            coerce_decimal(&format!("-{}", huge), &format, UnitConversion::FahrenheitToCelsius),
            Err(WarningKind::OutOfRange)
        );
        assert_eq!(
            coerce_decimal(huge, &format, UnitConversion::Identity),
            Ok(Some(dec(huge)))
        );
    }

    #[test]
    fn test_coerce_integer() {
        let format = SourceFormat::italian();
        let unit = UnitConversion::Identity;
        assert_eq!(coerce_integer("12", &format, unit), Ok(Some(12)));
        assert_eq!(coerce_integer("12,0", &format, unit), Ok(Some(12)));
        assert_eq!(coerce_integer("1,5", &format, unit), Err(WarningKind::NotInteger));
        assert_eq!(coerce_integer("", &format, unit), Ok(None));
        assert_eq!(coerce_integer("x", &format, unit), Err(WarningKind::NotNumeric));
    }

    #[test]
    fn test_check_range() {
        assert_eq!(
            check_range(CanonicalField::Latitude, dec("91")),
            Err(WarningKind::OutOfRange)
        );
        assert_eq!(
            check_range(CanonicalField::Longitude, dec("-179.9")),
            Ok(Some(dec("-179.9")))
        );
        assert_eq!(
            check_range(CanonicalField::WindDirection, dec("720")),
            Ok(Some(dec("720")))
        );
    }

    #[test]
    fn test_parse_timestamp_layouts() {
        let standard = SourceFormat::standard();
        let ts = parse_timestamp("2024-05-01 13:45:00", &standard).unwrap();
        assert_eq!(ts.to_rfc3339(), "2024-05-01T13:45:00+00:00");

        let ts = parse_timestamp("2024-05-01T13:45:00+02:00", &standard).unwrap();
        assert_eq!(ts.hour(), 11);

        let italian = SourceFormat::italian();
        let ts = parse_timestamp("01/05/2024 13:45", &italian).unwrap();
        assert_eq!(ts.to_rfc3339(), "2024-05-01T13:45:00+00:00");

        assert!(parse_timestamp("yesterday", &standard).is_none());
        assert!(parse_timestamp("", &standard).is_none());
    }

    #[test]
    fn test_parse_timestamp_applies_offset() {
        let mut format = SourceFormat::italian();
        format.utc_offset_minutes = 60;
        let ts = parse_timestamp("01/05/2024 13:45", &format).unwrap();
        assert_eq!(ts.to_rfc3339(), "2024-05-01T12:45:00+00:00");
    }

    #[test]
    fn test_warning_reason() {
        let warning = FieldWarning {
            field: CanonicalField::WindSpeed,
            column: "wsp_ana".to_string(),
            raw: "n/a".to_string(),
            kind: WarningKind::NotNumeric,
        };
        assert_eq!(warning.reason(), "wind_speed: non-numeric value");
    }
}
