use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{EtlError, Result};

/// Value kind stored in a canonical column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Timestamp,
    Text,
    Decimal,
    Integer,
}

/// Targets a source column can be mapped onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalField {
    Timestamp,
    StationId,
    Latitude,
    Longitude,
    Temperature,
    Humidity,
    WindSpeed,
    WindDirection,
    Precipitation,
    PrecipitationCount,
    Radiation,
}

impl CanonicalField {
    pub const ALL: [CanonicalField; 11] = [
        CanonicalField::Timestamp,
        CanonicalField::StationId,
        CanonicalField::Latitude,
        CanonicalField::Longitude,
        CanonicalField::Temperature,
        CanonicalField::Humidity,
        CanonicalField::WindSpeed,
        CanonicalField::WindDirection,
        CanonicalField::Precipitation,
        CanonicalField::PrecipitationCount,
        CanonicalField::Radiation,
    ];

    /// Decimal measurement columns, in table order.
    pub const MEASUREMENTS: [CanonicalField; 8] = [
        CanonicalField::Latitude,
        CanonicalField::Longitude,
        CanonicalField::Temperature,
        CanonicalField::Humidity,
        CanonicalField::WindSpeed,
        CanonicalField::WindDirection,
        CanonicalField::Precipitation,
        CanonicalField::Radiation,
    ];

    pub fn column(&self) -> &'static str {
        match self {
            CanonicalField::Timestamp => "timestamp",
            CanonicalField::StationId => "station_id",
            CanonicalField::Latitude => "latitude",
            CanonicalField::Longitude => "longitude",
            CanonicalField::Temperature => "temperature",
            CanonicalField::Humidity => "humidity",
            CanonicalField::WindSpeed => "wind_speed",
            CanonicalField::WindDirection => "wind_direction",
            CanonicalField::Precipitation => "precipitation",
            CanonicalField::PrecipitationCount => "precipitation_count",
            CanonicalField::Radiation => "radiation",
        }
    }

    pub fn kind(&self) -> FieldKind {
        match self {
            CanonicalField::Timestamp => FieldKind::Timestamp,
            CanonicalField::StationId => FieldKind::Text,
            CanonicalField::PrecipitationCount => FieldKind::Integer,
            _ => FieldKind::Decimal,
        }
    }

    pub fn is_required(&self) -> bool {
        matches!(self, CanonicalField::Timestamp | CanonicalField::StationId)
    }
}

impl std::fmt::Display for CanonicalField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.column())
    }
}

/// Normalized weather record for one station at one instant.
///
/// Absent measurements are `None`; they are never defaulted to zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub timestamp: DateTime<Utc>,
    pub station_id: String,
    pub latitude: Option<Decimal>,
    pub longitude: Option<Decimal>,
    pub temperature: Option<Decimal>,
    pub humidity: Option<Decimal>,
    pub wind_speed: Option<Decimal>,
    pub wind_direction: Option<Decimal>,
    pub precipitation: Option<Decimal>,
    pub precipitation_count: Option<i64>,
    pub radiation: Option<Decimal>,
}

impl Observation {
    pub fn builder() -> ObservationBuilder {
        ObservationBuilder::new()
    }

    /// Decimal value of a measurement field, `None` for non-decimal fields.
    pub fn decimal(&self, field: CanonicalField) -> Option<Decimal> {
        match field {
            CanonicalField::Latitude => self.latitude,
            CanonicalField::Longitude => self.longitude,
            CanonicalField::Temperature => self.temperature,
            CanonicalField::Humidity => self.humidity,
            CanonicalField::WindSpeed => self.wind_speed,
            CanonicalField::WindDirection => self.wind_direction,
            CanonicalField::Precipitation => self.precipitation,
            CanonicalField::Radiation => self.radiation,
            CanonicalField::PrecipitationCount => self.precipitation_count.map(Decimal::from),
            CanonicalField::Timestamp | CanonicalField::StationId => None,
        }
    }

    pub fn populated_fields(&self) -> Vec<CanonicalField> {
        let mut fields = vec![CanonicalField::Timestamp, CanonicalField::StationId];
        fields.extend(
            CanonicalField::ALL
                .iter()
                .copied()
                .filter(|f| !f.is_required() && self.decimal(*f).is_some()),
        );
        fields
    }
}

/// Observation as read back from the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredObservation {
    pub id: i64,
    #[serde(flatten)]
    pub observation: Observation,
    pub loaded_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct ObservationBuilder {
    timestamp: Option<DateTime<Utc>>,
    station_id: Option<String>,
    latitude: Option<Decimal>,
    longitude: Option<Decimal>,
    temperature: Option<Decimal>,
    humidity: Option<Decimal>,
    wind_speed: Option<Decimal>,
    wind_direction: Option<Decimal>,
    precipitation: Option<Decimal>,
    precipitation_count: Option<i64>,
    radiation: Option<Decimal>,
}

impl ObservationBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn station_id(mut self, station_id: impl Into<String>) -> Self {
        self.station_id = Some(station_id.into());
        self
    }

    pub fn coordinates(mut self, latitude: Decimal, longitude: Decimal) -> Self {
        self.latitude = Some(latitude);
        self.longitude = Some(longitude);
        self
    }

    pub fn temperature(mut self, value: Decimal) -> Self {
        self.temperature = Some(value);
        self
    }

    pub fn humidity(mut self, value: Decimal) -> Self {
        self.humidity = Some(value);
        self
    }

    pub fn wind(mut self, speed: Decimal, direction: Decimal) -> Self {
        self.wind_speed = Some(speed);
        self.wind_direction = Some(direction);
        self
    }

    pub fn precipitation(mut self, value: Decimal) -> Self {
        self.precipitation = Some(value);
        self
    }

    pub fn precipitation_count(mut self, value: i64) -> Self {
        self.precipitation_count = Some(value);
        self
    }

    pub fn radiation(mut self, value: Decimal) -> Self {
        self.radiation = Some(value);
        self
    }

    /// Set a decimal measurement by field. Non-decimal fields are ignored.
    pub fn set_decimal(&mut self, field: CanonicalField, value: Option<Decimal>) {
        let slot = match field {
            CanonicalField::Latitude => &mut self.latitude,
            CanonicalField::Longitude => &mut self.longitude,
            CanonicalField::Temperature => &mut self.temperature,
            CanonicalField::Humidity => &mut self.humidity,
            CanonicalField::WindSpeed => &mut self.wind_speed,
            CanonicalField::WindDirection => &mut self.wind_direction,
            CanonicalField::Precipitation => &mut self.precipitation,
            CanonicalField::Radiation => &mut self.radiation,
            CanonicalField::Timestamp
            | CanonicalField::StationId
            | CanonicalField::PrecipitationCount => return,
        };
        *slot = value;
    }

    pub fn set_integer(&mut self, field: CanonicalField, value: Option<i64>) {
        if field == CanonicalField::PrecipitationCount {
            self.precipitation_count = value;
        }
    }

    pub fn has_timestamp(&self) -> bool {
        self.timestamp.is_some()
    }

    pub fn has_station_id(&self) -> bool {
        self.station_id.as_deref().is_some_and(|s| !s.is_empty())
    }

    pub fn build(self) -> Result<Observation> {
        let station_id = self
            .station_id
            .filter(|s| !s.is_empty())
            .ok_or_else(|| EtlError::MissingData("station_id".to_string()))?;

        Ok(Observation {
            timestamp: self
                .timestamp
                .ok_or_else(|| EtlError::MissingData("timestamp".to_string()))?,
            station_id,
            latitude: self.latitude,
            longitude: self.longitude,
            temperature: self.temperature,
            humidity: self.humidity,
            wind_speed: self.wind_speed,
            wind_direction: self.wind_direction,
            precipitation: self.precipitation,
            precipitation_count: self.precipitation_count,
            radiation: self.radiation,
        })
    }
}
