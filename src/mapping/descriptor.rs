//! Source format descriptors and the registry that detects them.
//!
//! A descriptor is plain data: which source columns feed which canonical
//! field, how decimals are written, which timestamp layouts to accept and
//! which tokens mean "sensor fault". Detection is a pure predicate over the
//! header set, so adding a station family means adding a descriptor, never
//! touching the loader.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use validator::Validate;

use crate::error::{EtlError, Result};
use crate::models::CanonicalField;
use crate::utils::constants::DEFAULT_SENTINELS;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecimalSeparator {
    #[default]
    #[serde(rename = ".", alias = "period")]
    Period,
    #[serde(rename = ",", alias = "comma")]
    Comma,
}

impl DecimalSeparator {
    pub fn as_char(&self) -> char {
        match self {
            DecimalSeparator::Period => '.',
            DecimalSeparator::Comma => ',',
        }
    }
}

/// Unit normalization applied after a value has been parsed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UnitConversion {
    #[default]
    Identity,
    Scale {
        factor: Decimal,
    },
    Offset {
        delta: Decimal,
    },
    FahrenheitToCelsius,
    KilometresPerHourToMetresPerSecond,
}

impl UnitConversion {
    /// `None` when the converted value does not fit in a `Decimal`.
    pub fn apply(&self, value: Decimal) -> Option<Decimal> {
        match self {
            UnitConversion::Identity => Some(value),
            UnitConversion::Scale { factor } => value.checked_mul(*factor),
            UnitConversion::Offset { delta } => value.checked_add(*delta),
            UnitConversion::FahrenheitToCelsius => value
                .checked_sub(Decimal::from(32))?
                .checked_mul(Decimal::from(5))?
                .checked_div(Decimal::from(9))
                .map(|c| c.round_dp(4)),
            UnitConversion::KilometresPerHourToMetresPerSecond => value
                .checked_div(Decimal::new(36, 1))
                .map(|ms| ms.round_dp(4)),
        }
    }
}

/// One source column (under any of its spellings) feeding one canonical field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct ColumnRule {
    #[validate(length(min = 1))]
    pub aliases: Vec<String>,

    pub field: CanonicalField,

    #[serde(default)]
    pub unit: UnitConversion,

    /// Detection only matches when one of the aliases is present.
    #[serde(default)]
    pub required: bool,
}

impl ColumnRule {
    pub fn new(aliases: &[&str], field: CanonicalField) -> Self {
        Self {
            aliases: aliases.iter().map(|a| a.to_string()).collect(),
            field,
            unit: UnitConversion::Identity,
            required: false,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_unit(mut self, unit: UnitConversion) -> Self {
        self.unit = unit;
        self
    }

    pub fn matches(&self, header: &str) -> bool {
        self.aliases.iter().any(|a| a == header)
    }
}

fn default_timestamp_formats() -> Vec<String> {
    vec![
        "%Y-%m-%d %H:%M:%S".to_string(),
        "%Y-%m-%dT%H:%M:%S".to_string(),
        "%Y-%m-%d %H:%M".to_string(),
    ]
}

fn default_sentinels() -> Vec<String> {
    DEFAULT_SENTINELS.iter().map(|s| s.to_string()).collect()
}

/// Column layout and conventions of one station family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct SourceFormat {
    #[validate(length(min = 1))]
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub decimal_separator: DecimalSeparator,

    /// chrono layouts tried in order after RFC 3339.
    #[serde(default = "default_timestamp_formats")]
    pub timestamp_formats: Vec<String>,

    /// Offset of naive source timestamps from UTC.
    #[serde(default)]
    pub utc_offset_minutes: i32,

    #[serde(default = "default_sentinels")]
    pub sentinels: Vec<String>,

    #[validate(length(min = 1))]
    #[validate(nested)]
    pub columns: Vec<ColumnRule>,
}

impl SourceFormat {
    /// English-labelled export used by most stations.
    pub fn standard() -> Self {
        Self {
            id: "standard".to_string(),
            name: "Standard (English labels)".to_string(),
            decimal_separator: DecimalSeparator::Period,
            timestamp_formats: default_timestamp_formats(),
            utc_offset_minutes: 0,
            sentinels: default_sentinels(),
            columns: vec![
                ColumnRule::new(&["Time"], CanonicalField::Timestamp).required(),
                ColumnRule::new(&["station_id"], CanonicalField::StationId),
                ColumnRule::new(&["latitude"], CanonicalField::Latitude),
                ColumnRule::new(&["longitude"], CanonicalField::Longitude),
                ColumnRule::new(&["extT"], CanonicalField::Temperature),
                ColumnRule::new(&["rh"], CanonicalField::Humidity),
                ColumnRule::new(&["pluv"], CanonicalField::Precipitation),
                ColumnRule::new(&["wsp_ana"], CanonicalField::WindSpeed),
                ColumnRule::new(&["wdir_ana"], CanonicalField::WindDirection),
                ColumnRule::new(&["radN"], CanonicalField::Radiation),
            ],
        }
    }

    /// Italian-labelled export with comma decimals and day-first dates.
    ///
    /// The `\u{FFFD}` aliases cover files that were re-saved with a broken
    /// encoding before they reached us.
    pub fn italian() -> Self {
        Self {
            id: "italian".to_string(),
            name: "Italian labels, comma decimals".to_string(),
            decimal_separator: DecimalSeparator::Comma,
            timestamp_formats: vec![
                "%d/%m/%Y %H:%M".to_string(),
                "%d/%m/%Y %H:%M:%S".to_string(),
                "%Y-%m-%d %H:%M:%S".to_string(),
                "%Y-%m-%dT%H:%M:%S".to_string(),
                "%Y-%m-%d %H:%M".to_string(),
            ],
            utc_offset_minutes: 0,
            sentinels: default_sentinels(),
            columns: vec![
                ColumnRule::new(
                    &["Data e ora", "Data/Ora", "Data", "Time"],
                    CanonicalField::Timestamp,
                )
                .required(),
                ColumnRule::new(&["stazione", "station_id"], CanonicalField::StationId),
                ColumnRule::new(&["latitudine", "latitude"], CanonicalField::Latitude),
                ColumnRule::new(&["longitudine", "longitude"], CanonicalField::Longitude),
                ColumnRule::new(&["T aria (°C)", "T aria (\u{FFFD}C)"], CanonicalField::Temperature)
                    .required(),
                ColumnRule::new(
                    &["Umidità aria (%)", "Umidit\u{FFFD} aria (%)"],
                    CanonicalField::Humidity,
                ),
                ColumnRule::new(&["pioggia (mm)"], CanonicalField::Precipitation),
                ColumnRule::new(&["pioggia (count)"], CanonicalField::PrecipitationCount),
                ColumnRule::new(
                    &["radiazione globale(W/m2)", "radiazione globale (W/m2)"],
                    CanonicalField::Radiation,
                ),
                ColumnRule::new(
                    &["direzione vento (gradi)", "direzone vento (gradi)"],
                    CanonicalField::WindDirection,
                ),
                ColumnRule::new(
                    &["velocità vento (m/sec)", "velocit\u{FFFD} vento (m/sec)"],
                    CanonicalField::WindSpeed,
                ),
            ],
        }
    }

    /// True when every required rule has at least one alias in `headers`.
    pub fn matches(&self, headers: &HashSet<&str>) -> bool {
        self.columns
            .iter()
            .filter(|rule| rule.required)
            .all(|rule| rule.aliases.iter().any(|a| headers.contains(a.as_str())))
    }

    pub fn required_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|rule| rule.required)
            .filter_map(|rule| rule.aliases.first().map(String::as_str))
            .collect()
    }

    pub fn rule_for(&self, header: &str) -> Option<&ColumnRule> {
        self.columns.iter().find(|rule| rule.matches(header))
    }

    pub fn is_sentinel(&self, raw: &str) -> bool {
        self.sentinels.iter().any(|s| s == raw)
    }

    /// Structural checks beyond the derive rules.
    pub fn check(&self) -> Result<()> {
        self.validate()?;

        let timestamp_rule = self
            .columns
            .iter()
            .find(|rule| rule.field == CanonicalField::Timestamp);
        match timestamp_rule {
            Some(rule) if rule.required => {}
            Some(_) => {
                return Err(EtlError::Config(format!(
                    "format '{}': the timestamp column must be required",
                    self.id
                )))
            }
            None => {
                return Err(EtlError::Config(format!(
                    "format '{}' has no timestamp column",
                    self.id
                )))
            }
        }

        if !(-14 * 60..=14 * 60).contains(&self.utc_offset_minutes) {
            return Err(EtlError::Config(format!(
                "format '{}': utc_offset_minutes {} out of range",
                self.id, self.utc_offset_minutes
            )));
        }

        Ok(())
    }
}

/// Ordered set of known formats; detection picks the first match.
#[derive(Debug, Clone)]
pub struct FormatRegistry {
    formats: Vec<SourceFormat>,
}

impl FormatRegistry {
    /// Italian comes first: both families use `Time`, and only the Italian
    /// one also requires its temperature column.
    pub fn builtin() -> Self {
        Self {
            formats: vec![SourceFormat::italian(), SourceFormat::standard()],
        }
    }

    pub fn empty() -> Self {
        Self {
            formats: Vec::new(),
        }
    }

    /// Append a format after the existing ones.
    pub fn register(&mut self, format: SourceFormat) -> Result<()> {
        format.check()?;
        if self.get(&format.id).is_some() {
            return Err(EtlError::Config(format!(
                "source format '{}' is already registered",
                format.id
            )));
        }
        self.formats.push(format);
        Ok(())
    }

    pub fn with_formats(mut self, formats: Vec<SourceFormat>) -> Result<Self> {
        for format in formats {
            self.register(format)?;
        }
        Ok(self)
    }

    pub fn get(&self, id: &str) -> Option<&SourceFormat> {
        self.formats.iter().find(|f| f.id == id)
    }

    pub fn formats(&self) -> &[SourceFormat] {
        &self.formats
    }

    pub fn len(&self) -> usize {
        self.formats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.formats.is_empty()
    }

    pub fn detect(&self, headers: &[String]) -> Result<&SourceFormat> {
        let header_set: HashSet<&str> = headers.iter().map(String::as_str).collect();

        self.formats
            .iter()
            .find(|format| format.matches(&header_set))
            .ok_or_else(|| EtlError::UnrecognizedFormat {
                headers: headers.to_vec(),
            })
    }
}

impl Default for FormatRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
