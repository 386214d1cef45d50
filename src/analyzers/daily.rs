use chrono::NaiveDate;
use std::collections::BTreeMap;

use crate::error::Result;
use crate::models::{DailyAggregate, Observation};
use crate::store::{ObservationFilter, SqliteStore};

/// Daily view for the rows matching `filter`, computed on demand.
pub fn daily_aggregates(
    store: &SqliteStore,
    filter: &ObservationFilter,
) -> Result<Vec<DailyAggregate>> {
    let stored = store.observations(filter)?;
    Ok(aggregate_daily(stored.iter().map(|s| &s.observation)))
}

/// Group observations by UTC date and station, ordered by date then station.
pub fn aggregate_daily<'a>(
    observations: impl IntoIterator<Item = &'a Observation>,
) -> Vec<DailyAggregate> {
    let mut days: BTreeMap<(NaiveDate, &'a str), DailyAggregate> = BTreeMap::new();

    for observation in observations {
        let date = observation.timestamp.date_naive();
        let day = days
            .entry((date, observation.station_id.as_str()))
            .or_insert_with(|| DailyAggregate::new(date, observation.station_id.clone()));

        day.observation_count += 1;
        day.temperature.push(observation.temperature);
        day.humidity.push(observation.humidity);
        day.wind_speed.push(observation.wind_speed);
        day.wind_direction.push(observation.wind_direction);
        day.precipitation.push(observation.precipitation);
        day.precipitation_count
            .push(observation.precipitation_count.map(Into::into));
        day.radiation.push(observation.radiation);
    }

    days.into_values().collect()
}

pub fn daily_summary(days: &[DailyAggregate]) -> String {
    let mut summary = String::new();
    summary.push_str("=== Daily Aggregates ===\n");
    if days.is_empty() {
        summary.push_str("No observations match the filter\n");
    }
    for day in days {
        summary.push_str(&day.summary_line());
        summary.push('\n');
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rust_decimal::prelude::*;

    fn observation(station: &str, day: u32, hour: u32, temperature: Option<&str>) -> Observation {
        let mut builder = Observation::builder()
            .timestamp(Utc.with_ymd_and_hms(2024, 5, day, hour, 0, 0).unwrap())
            .station_id(station)
            .precipitation(Decimal::from_str("0.2").unwrap());
        if let Some(t) = temperature {
            builder = builder.temperature(Decimal::from_str(t).unwrap());
        }
        builder.build().unwrap()
    }

    #[test]
    fn test_null_temperature_is_excluded_from_average() {
        let rows = vec![
            observation("S1", 1, 10, Some("20.0")),
            observation("S1", 1, 11, None),
        ];
        let days = aggregate_daily(&rows);

        assert_eq!(days.len(), 1);
        assert_eq!(days[0].observation_count, 2);
        assert_eq!(days[0].temperature.count, 1);
        assert_eq!(days[0].avg_temperature(), Decimal::from_str("20").ok());
        assert_eq!(days[0].total_precipitation(), Decimal::from_str("0.4").ok());
    }

    #[test]
    fn test_grouped_by_date_and_station() {
        let rows = vec![
            observation("S2", 1, 10, Some("1")),
            observation("S1", 2, 0, Some("2")),
            observation("S1", 1, 23, Some("3")),
        ];
        let days = aggregate_daily(&rows);

        let keys: Vec<(String, &str)> = days
            .iter()
            .map(|d| (d.date.to_string(), d.station_id.as_str()))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("2024-05-01".to_string(), "S1"),
                ("2024-05-01".to_string(), "S2"),
                ("2024-05-02".to_string(), "S1"),
            ]
        );
    }

    #[test]
    fn test_huge_wind_directions_do_not_panic() {
        let huge = Decimal::from_str("50000000000000000000000000000").unwrap();
        let rows: Vec<Observation> = (10..12)
            .map(|hour| {
                Observation::builder()
                    .timestamp(Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0).unwrap())
                    .station_id("S1")
                    .wind(Decimal::ONE, huge)
                    .build()
                    .unwrap()
            })
            .collect();

        let days = aggregate_daily(&rows);
        assert_eq!(days[0].wind_direction.count, 2);
        assert_eq!(days[0].wind_direction.avg(), None);
        assert_eq!(days[0].wind_direction.max, Some(huge));
        assert_eq!(days[0].wind_speed.avg(), Some(Decimal::ONE));
        assert!(days[0].summary_line().contains("S1"));
    }

    #[test]
    fn test_summary_for_empty_view() {
        assert!(daily_summary(&[]).contains("No observations"));
    }
}
