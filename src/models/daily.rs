use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::ser::{Serialize, SerializeStruct, Serializer};

use crate::models::CanonicalField;
use crate::utils::constants::AVERAGE_DECIMAL_PLACES;

/// Running aggregate over the non-null values of one field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldAggregate {
    pub count: usize,
    pub sum: Option<Decimal>,
    pub min: Option<Decimal>,
    pub max: Option<Decimal>,
}

impl FieldAggregate {
    /// Nulls are skipped so they never drag an average towards zero.
    ///
    /// A sum that leaves the `Decimal` range stays `None` for the rest of the
    /// group, which also clears the average; `min` and `max` are unaffected.
    pub fn push(&mut self, value: Option<Decimal>) {
        let Some(value) = value else {
            return;
        };

        self.sum = if self.count == 0 {
            Some(value)
        } else {
            self.sum.and_then(|s| s.checked_add(value))
        };
        self.count += 1;
        self.min = Some(self.min.map_or(value, |m| m.min(value)));
        self.max = Some(self.max.map_or(value, |m| m.max(value)));
    }

    pub fn avg(&self) -> Option<Decimal> {
        if self.count == 0 {
            return None;
        }
        self.sum
            .and_then(|sum| sum.checked_div(Decimal::from(self.count)))
            .map(|avg| avg.round_dp(AVERAGE_DECIMAL_PLACES).normalize())
    }
}

impl Serialize for FieldAggregate {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("FieldAggregate", 5)?;
        state.serialize_field("count", &self.count)?;
        state.serialize_field("avg", &self.avg())?;
        state.serialize_field("min", &self.min)?;
        state.serialize_field("max", &self.max)?;
        state.serialize_field("sum", &self.sum)?;
        state.end()
    }
}

/// One row of the daily view: a station's observations on one UTC date.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct DailyAggregate {
    pub date: NaiveDate,
    pub station_id: String,
    pub observation_count: usize,
    pub temperature: FieldAggregate,
    pub humidity: FieldAggregate,
    pub wind_speed: FieldAggregate,
    pub wind_direction: FieldAggregate,
    pub precipitation: FieldAggregate,
    pub precipitation_count: FieldAggregate,
    pub radiation: FieldAggregate,
}

impl DailyAggregate {
    pub fn new(date: NaiveDate, station_id: String) -> Self {
        Self {
            date,
            station_id,
            observation_count: 0,
            temperature: FieldAggregate::default(),
            humidity: FieldAggregate::default(),
            wind_speed: FieldAggregate::default(),
            wind_direction: FieldAggregate::default(),
            precipitation: FieldAggregate::default(),
            precipitation_count: FieldAggregate::default(),
            radiation: FieldAggregate::default(),
        }
    }

    pub fn field(&self, field: CanonicalField) -> Option<&FieldAggregate> {
        match field {
            CanonicalField::Temperature => Some(&self.temperature),
            CanonicalField::Humidity => Some(&self.humidity),
            CanonicalField::WindSpeed => Some(&self.wind_speed),
            CanonicalField::WindDirection => Some(&self.wind_direction),
            CanonicalField::Precipitation => Some(&self.precipitation),
            CanonicalField::PrecipitationCount => Some(&self.precipitation_count),
            CanonicalField::Radiation => Some(&self.radiation),
            _ => None,
        }
    }

    pub fn avg_temperature(&self) -> Option<Decimal> {
        self.temperature.avg()
    }

    pub fn min_temperature(&self) -> Option<Decimal> {
        self.temperature.min
    }

    pub fn max_temperature(&self) -> Option<Decimal> {
        self.temperature.max
    }

    pub fn total_precipitation(&self) -> Option<Decimal> {
        self.precipitation.sum
    }

    pub fn summary_line(&self) -> String {
        fn show(value: Option<Decimal>) -> String {
            value.map_or_else(|| "-".to_string(), |v| v.to_string())
        }

        format!(
            "{} {:<12} n={:<4} temp avg={} min={} max={} | rh avg={} | wind avg={} max={} | rain sum={} | rad avg={}",
            self.date,
            self.station_id,
            self.observation_count,
            show(self.temperature.avg()),
            show(self.temperature.min),
            show(self.temperature.max),
            show(self.humidity.avg()),
            show(self.wind_speed.avg()),
            show(self.wind_speed.max),
            show(self.precipitation.sum),
            show(self.radiation.avg()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::prelude::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_field_aggregate_skips_nulls() {
        let mut agg = FieldAggregate::default();
        agg.push(None);
        agg.push(Some(dec("10.0")));
        agg.push(None);
        agg.push(Some(dec("14.0")));

        assert_eq!(agg.count, 2);
        assert_eq!(agg.avg(), Some(dec("12")));
        assert_eq!(agg.min, Some(dec("10.0")));
        assert_eq!(agg.max, Some(dec("14.0")));
        assert_eq!(agg.sum, Some(dec("24.0")));
    }

    #[test]
    fn test_field_aggregate_all_null() {
        let mut agg = FieldAggregate::default();
        agg.push(None);
        assert_eq!(agg.count, 0);
        assert_eq!(agg.avg(), None);
        assert_eq!(agg.sum, None);
    }

    #[test]
    fn test_average_rounding() {
        let mut agg = FieldAggregate::default();
        agg.push(Some(dec("1")));
        agg.push(Some(dec("1")));
        agg.push(Some(dec("2")));
        assert_eq!(agg.avg(), Some(dec("1.3333")));
    }

    #[test]
    fn test_sum_overflow_clears_sum_and_average() {
        let huge = dec("50000000000000000000000000000");
        let mut agg = FieldAggregate::default();
        agg.push(Some(huge));
        agg.push(Some(huge));
        agg.push(Some(dec("1")));

        assert_eq!(agg.count, 3);
        assert_eq!(agg.sum, None);
        assert_eq!(agg.avg(), None);
        assert_eq!(agg.min, Some(dec("1")));
        assert_eq!(agg.max, Some(huge));
    }

    #[test]
    fn test_json_includes_average() {
        let mut agg = FieldAggregate::default();
        agg.push(Some(dec("20.5")));
        agg.push(None);

        let value = serde_json::to_value(&agg).unwrap();
        assert_eq!(value["count"], 1);
        assert_eq!(value["avg"], "20.5");
        assert_eq!(value["sum"], "20.5");
    }
}
