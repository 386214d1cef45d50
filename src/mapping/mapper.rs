use csv::StringRecord;
use serde::Serialize;
use std::collections::HashSet;

use crate::mapping::coercion::{
    check_range, coerce_decimal, coerce_integer, parse_station_id, parse_timestamp, FieldWarning,
    WarningKind,
};
use crate::mapping::descriptor::{ColumnRule, SourceFormat};
use crate::models::{CanonicalField, FieldKind, Observation, ObservationBuilder};

/// Why a row was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(tag = "kind", content = "field", rename_all = "snake_case")]
pub enum DropReason {
    RequiredFieldMissing(CanonicalField),
}

impl DropReason {
    pub fn describe(&self) -> String {
        match self {
            DropReason::RequiredFieldMissing(field) => {
                format!("{} missing or unparseable", field)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RowOutcome {
    Mapped {
        observation: Observation,
        warnings: Vec<FieldWarning>,
    },
    Dropped {
        reason: DropReason,
        warnings: Vec<FieldWarning>,
    },
}

impl RowOutcome {
    pub fn warnings(&self) -> &[FieldWarning] {
        match self {
            RowOutcome::Mapped { warnings, .. } | RowOutcome::Dropped { warnings, .. } => warnings,
        }
    }

    pub fn observation(&self) -> Option<&Observation> {
        match self {
            RowOutcome::Mapped { observation, .. } => Some(observation),
            RowOutcome::Dropped { .. } => None,
        }
    }
}

#[derive(Debug, Clone)]
struct Binding<'a> {
    index: usize,
    header: String,
    rule: &'a ColumnRule,
}

/// Maps rows of one file, with header positions resolved once up front.
#[derive(Debug, Clone)]
pub struct ColumnMapper<'a> {
    format: &'a SourceFormat,
    bindings: Vec<Binding<'a>>,
    unmapped: Vec<String>,
}

impl<'a> ColumnMapper<'a> {
    pub fn new(format: &'a SourceFormat, headers: &[String]) -> Self {
        let mut bindings: Vec<Binding<'a>> = Vec::new();
        let mut unmapped = Vec::new();
        let mut bound_fields = HashSet::new();

        for (index, header) in headers.iter().enumerate() {
            match format.rule_for(header) {
                // First column wins when two aliases of one field are present
                Some(rule) if bound_fields.insert(rule.field) => bindings.push(Binding {
                    index,
                    header: header.clone(),
                    rule,
                }),
                Some(_) => unmapped.push(header.clone()),
                None => unmapped.push(header.clone()),
            }
        }

        Self {
            format,
            bindings,
            unmapped,
        }
    }

    pub fn format(&self) -> &SourceFormat {
        self.format
    }

    /// `(source column, canonical field)` pairs in header order.
    pub fn mapped_columns(&self) -> Vec<(&str, CanonicalField)> {
        self.bindings
            .iter()
            .map(|b| (b.header.as_str(), b.rule.field))
            .collect()
    }

    pub fn unmapped_columns(&self) -> &[String] {
        &self.unmapped
    }

    pub fn has_field(&self, field: CanonicalField) -> bool {
        self.bindings.iter().any(|b| b.rule.field == field)
    }

    /// Map one row. Field problems become warnings; only a missing
    /// timestamp or station drops the row.
    pub fn map_row(&self, row: &StringRecord, fallback_station: Option<&str>) -> RowOutcome {
        let mut builder = ObservationBuilder::new();
        let mut warnings = Vec::new();

        for binding in &self.bindings {
            let raw = row.get(binding.index).unwrap_or("");
            let field = binding.rule.field;

            match field.kind() {
                FieldKind::Timestamp => {
                    if let Some(ts) = parse_timestamp(raw, self.format) {
                        builder = builder.timestamp(ts);
                    }
                }
                FieldKind::Text => {
                    if let Some(station) = parse_station_id(raw) {
                        builder = builder.station_id(station);
                    }
                }
                FieldKind::Decimal => {
                    let value = coerce_decimal(raw, self.format, binding.rule.unit)
                        .and_then(|v| match v {
                            Some(v) => check_range(field, v),
                            None => Ok(None),
                        });
                    match value {
                        Ok(value) => builder.set_decimal(field, value),
                        Err(kind) => warnings.push(self.warning(binding, raw, kind)),
                    }
                }
                FieldKind::Integer => {
                    match coerce_integer(raw, self.format, binding.rule.unit) {
                        Ok(value) => builder.set_integer(field, value),
                        Err(kind) => warnings.push(self.warning(binding, raw, kind)),
                    }
                }
            }
        }

        if !builder.has_station_id() {
            if let Some(station) = fallback_station.and_then(parse_station_id) {
                builder = builder.station_id(station);
            }
        }

        if !builder.has_timestamp() {
            return RowOutcome::Dropped {
                reason: DropReason::RequiredFieldMissing(CanonicalField::Timestamp),
                warnings,
            };
        }
        if !builder.has_station_id() {
            return RowOutcome::Dropped {
                reason: DropReason::RequiredFieldMissing(CanonicalField::StationId),
                warnings,
            };
        }

        match builder.build() {
            Ok(observation) => RowOutcome::Mapped {
                observation,
                warnings,
            },
            // Unreachable given the checks above, but keep the row accounted for
            Err(_) => RowOutcome::Dropped {
                reason: DropReason::RequiredFieldMissing(CanonicalField::Timestamp),
                warnings,
            },
        }
    }

    fn warning(&self, binding: &Binding<'_>, raw: &str, kind: WarningKind) -> FieldWarning {
        FieldWarning {
            field: binding.rule.field,
            column: binding.header.clone(),
            raw: raw.to_string(),
            kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::descriptor::FormatRegistry;
    use pretty_assertions::assert_eq;
    use rust_decimal::prelude::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    const STANDARD_HEADERS: [&str; 10] = [
        "Time",
        "station_id",
        "latitude",
        "longitude",
        "extT",
        "rh",
        "pluv",
        "wsp_ana",
        "wdir_ana",
        "radN",
    ];

    const ITALIAN_HEADERS: [&str; 8] = [
        "Data e ora",
        "T aria (°C)",
        "Umidità aria (%)",
        "pioggia (mm)",
        "pioggia (count)",
        "radiazione globale(W/m2)",
        "direzione vento (gradi)",
        "velocità vento (m/sec)",
    ];

    #[test]
    fn test_standard_full_row_has_every_field() {
        let format = SourceFormat::standard();
        let mapper = ColumnMapper::new(&format, &headers(&STANDARD_HEADERS));
        let row = StringRecord::from(vec![
            "2024-05-01 10:00:00",
            "ST01",
            "45.07",
            "7.68",
            "18.4",
            "62",
            "0.2",
            "3.1",
            "270",
            "512.5",
        ]);

        let outcome = mapper.map_row(&row, None);
        assert!(outcome.warnings().is_empty());
        let observation = outcome.observation().unwrap();
        assert_eq!(observation.station_id, "ST01");
        assert_eq!(observation.latitude, Some(dec("45.07")));
        assert_eq!(observation.longitude, Some(dec("7.68")));
        assert_eq!(observation.temperature, Some(dec("18.4")));
        assert_eq!(observation.humidity, Some(dec("62")));
        assert_eq!(observation.precipitation, Some(dec("0.2")));
        assert_eq!(observation.wind_speed, Some(dec("3.1")));
        assert_eq!(observation.wind_direction, Some(dec("270")));
        assert_eq!(observation.radiation, Some(dec("512.5")));
        assert_eq!(observation.precipitation_count, None);
        assert!(mapper.unmapped_columns().is_empty());
    }

    #[test]
    fn test_italian_full_row_has_every_field() {
        let format = SourceFormat::italian();
        let mapper = ColumnMapper::new(&format, &headers(&ITALIAN_HEADERS));
        let row = StringRecord::from(vec![
            "01/05/2024 10:00",
            "18,4",
            "62,5",
            "0,2",
            "3",
            "512,5",
            "270",
            "3,1",
        ]);

        let outcome = mapper.map_row(&row, Some("263"));
        assert!(outcome.warnings().is_empty());
        let observation = outcome.observation().unwrap();
        assert_eq!(observation.station_id, "263");
        assert_eq!(observation.temperature, Some(dec("18.4")));
        assert_eq!(observation.humidity, Some(dec("62.5")));
        assert_eq!(observation.precipitation, Some(dec("0.2")));
        assert_eq!(observation.precipitation_count, Some(3));
        assert_eq!(observation.radiation, Some(dec("512.5")));
        assert_eq!(observation.wind_direction, Some(dec("270")));
        assert_eq!(observation.wind_speed, Some(dec("3.1")));
    }

    #[test]
    fn test_sentinel_nulls_only_that_field() {
        let format = SourceFormat::standard();
        let mapper = ColumnMapper::new(&format, &headers(&STANDARD_HEADERS));
        let row = StringRecord::from(vec![
            "2024-05-01 10:00:00",
            "ST01",
            "45.07",
            "7.68",
            "18.4",
            "62",
            "0.2",
            "NaN",
            "270",
            "512.5",
        ]);

        let outcome = mapper.map_row(&row, None);
        assert_eq!(outcome.warnings().len(), 1);
        assert_eq!(outcome.warnings()[0].field, CanonicalField::WindSpeed);
        assert_eq!(outcome.warnings()[0].kind, WarningKind::Sentinel);

        let observation = outcome.observation().unwrap();
        assert_eq!(observation.wind_speed, None);
        assert_eq!(observation.wind_direction, Some(dec("270")));
        assert_eq!(observation.temperature, Some(dec("18.4")));
    }

    #[test]
    fn test_missing_timestamp_drops_row() {
        let format = SourceFormat::standard();
        let mapper = ColumnMapper::new(&format, &headers(&["Time", "station_id", "extT"]));
        let row = StringRecord::from(vec!["not a date", "ST01", "abc"]);

        match mapper.map_row(&row, None) {
            RowOutcome::Dropped { reason, warnings } => {
                assert_eq!(
                    reason,
                    DropReason::RequiredFieldMissing(CanonicalField::Timestamp)
                );
                assert_eq!(warnings.len(), 1);
            }
            other => panic!("expected dropped row, got {:?}", other),
        }
    }

    #[test]
    fn test_station_falls_back_to_filename() {
        let format = SourceFormat::standard();
        let mapper = ColumnMapper::new(&format, &headers(&["Time", "station_id", "extT"]));

        let row = StringRecord::from(vec!["2024-05-01 10:00:00", "", "12"]);
        let outcome = mapper.map_row(&row, Some("S42"));
        assert_eq!(outcome.observation().unwrap().station_id, "S42");

        let outcome = mapper.map_row(&row, None);
        assert!(matches!(
            outcome,
            RowOutcome::Dropped {
                reason: DropReason::RequiredFieldMissing(CanonicalField::StationId),
                ..
            }
        ));
    }

    #[test]
    fn test_short_rows_read_as_empty() {
        let format = SourceFormat::standard();
        let mapper = ColumnMapper::new(&format, &headers(&["Time", "extT", "rh"]));
        let row = StringRecord::from(vec!["2024-05-01 10:00:00", "12"]);

        let outcome = mapper.map_row(&row, Some("ST01"));
        let observation = outcome.observation().unwrap();
        assert_eq!(observation.temperature, Some(dec("12")));
        assert_eq!(observation.humidity, None);
        assert!(outcome.warnings().is_empty());
    }

    #[test]
    fn test_out_of_range_coordinates() {
        let format = SourceFormat::standard();
        let mapper = ColumnMapper::new(&format, &headers(&["Time", "latitude", "longitude"]));
        let row = StringRecord::from(vec!["2024-05-01 10:00:00", "145.0", "7.6"]);

        let outcome = mapper.map_row(&row, Some("ST01"));
        assert_eq!(outcome.warnings()[0].kind, WarningKind::OutOfRange);
        assert_eq!(outcome.observation().unwrap().latitude, None);
        assert_eq!(outcome.observation().unwrap().longitude, Some(dec("7.6")));
    }

    #[test]
    fn test_unmapped_and_duplicate_columns() {
        let registry = FormatRegistry::builtin();
        let columns = headers(&["Data", "T aria (°C)", "T aria (\u{FFFD}C)", "note"]);
        let format = registry.detect(&columns).unwrap();
        let mapper = ColumnMapper::new(format, &columns);

        assert_eq!(
            mapper.mapped_columns(),
            vec![
                ("Data", CanonicalField::Timestamp),
                ("T aria (°C)", CanonicalField::Temperature)
            ]
        );
        assert_eq!(mapper.unmapped_columns(), &["T aria (\u{FFFD}C)", "note"]);
        assert!(mapper.has_field(CanonicalField::Temperature));
        assert!(!mapper.has_field(CanonicalField::Radiation));
    }
}
