use chrono::{DateTime, Days, NaiveDate, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

use crate::error::{EtlError, Result};
use crate::models::{CanonicalField, Observation, StationSummary, StoredObservation};
use crate::store::schema;
use crate::store::{
    DuplicatePolicy, InsertOutcome, NullCounts, ObservationFilter, ObservationStore,
};
use crate::utils::constants::{OBSERVATION_TABLE, STORE_TIMESTAMP_FORMAT};

const INSERT_COLUMNS: [&str; 12] = [
    "timestamp",
    "station_id",
    "latitude",
    "longitude",
    "temperature",
    "humidity",
    "wind_speed",
    "wind_direction",
    "precipitation",
    "precipitation_count",
    "radiation",
    "loaded_at",
];

/// Bundled SQLite allows 32766 bound parameters per statement.
const MAX_ROWS_PER_STATEMENT: usize = 32766 / INSERT_COLUMNS.len();

const EXISTS_SQL: &str =
    "SELECT 1 FROM weather_raw WHERE station_id = ?1 AND timestamp = ?2 LIMIT 1";

const SELECT_SQL: &str = r#"
    SELECT id, timestamp, station_id, latitude, longitude, temperature, humidity,
           wind_speed, wind_direction, precipitation, precipitation_count,
           radiation, loaded_at
    FROM weather_raw
    WHERE (?1 IS NULL OR station_id = ?1)
      AND (?2 IS NULL OR timestamp >= ?2)
      AND (?3 IS NULL OR timestamp < ?3)
    ORDER BY station_id, timestamp, id
"#;

pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format(STORE_TIMESTAMP_FORMAT).to_string()
}

fn day_start(date: NaiveDate) -> String {
    format!("{}T00:00:00Z", date.format("%Y-%m-%d"))
}

fn decimal_text(value: Option<Decimal>) -> Option<String> {
    value.map(|d| d.to_string())
}

fn decimal_value(value: Option<Decimal>) -> Value {
    decimal_text(value).map_or(Value::Null, Value::Text)
}

/// One `INSERT` carrying `rows` value tuples.
fn insert_sql(rows: usize) -> String {
    let placeholders = format!("({})", vec!["?"; INSERT_COLUMNS.len()].join(", "));
    format!(
        "INSERT INTO {} ({}) VALUES {}",
        OBSERVATION_TABLE,
        INSERT_COLUMNS.join(", "),
        vec![placeholders.as_str(); rows].join(", ")
    )
}

/// Bound values in `INSERT_COLUMNS` order.
fn row_values(row: &Observation, timestamp: String, loaded_at: &str) -> [Value; 12] {
    [
        Value::Text(timestamp),
        Value::Text(row.station_id.clone()),
        decimal_value(row.latitude),
        decimal_value(row.longitude),
        decimal_value(row.temperature),
        decimal_value(row.humidity),
        decimal_value(row.wind_speed),
        decimal_value(row.wind_direction),
        decimal_value(row.precipitation),
        row.precipitation_count.map_or(Value::Null, Value::Integer),
        decimal_value(row.radiation),
        Value::Text(loaded_at.to_string()),
    ]
}

fn decimal_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Decimal>> {
    let text: Option<String> = row.get(idx)?;
    text.map(|t| {
        Decimal::from_str(&t)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

fn timestamp_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn read_observation(row: &Row<'_>) -> rusqlite::Result<StoredObservation> {
    Ok(StoredObservation {
        id: row.get(0)?,
        observation: Observation {
            timestamp: timestamp_column(row, 1)?,
            station_id: row.get(2)?,
            latitude: decimal_column(row, 3)?,
            longitude: decimal_column(row, 4)?,
            temperature: decimal_column(row, 5)?,
            humidity: decimal_column(row, 6)?,
            wind_speed: decimal_column(row, 7)?,
            wind_direction: decimal_column(row, 8)?,
            precipitation: decimal_column(row, 9)?,
            precipitation_count: row.get(10)?,
            radiation: decimal_column(row, 11)?,
        },
        loaded_at: timestamp_column(row, 12)?,
    })
}

/// Canonical store backed by a SQLite database.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        debug!("Opened store at {}", path.display());
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
        })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Bring the schema up to date. Returns the migration versions applied.
    pub fn migrate(&mut self) -> Result<Vec<u32>> {
        schema::apply_migrations(&mut self.conn)
    }

    pub fn schema_version(&self) -> Result<u32> {
        schema::current_version(&self.conn)
    }

    pub fn observations(&self, filter: &ObservationFilter) -> Result<Vec<StoredObservation>> {
        let from = filter.from.map(day_start);
        let until = match filter.to {
            Some(to) => Some(day_start(to.checked_add_days(Days::new(1)).ok_or_else(|| {
                EtlError::InvalidFormat(format!("date {} is out of range", to))
            })?)),
            None => None,
        };

        let mut stmt = self.conn.prepare(SELECT_SQL)?;
        let rows = stmt.query_map(params![filter.station_id, from, until], read_observation)?;

        let mut observations = Vec::new();
        for row in rows {
            observations.push(row?);
        }
        Ok(observations)
    }

    /// Distinct stations with their observation count and time span.
    pub fn stations(&self) -> Result<Vec<StationSummary>> {
        let mut stmt = self.conn.prepare(
            "SELECT station_id, COUNT(*), MIN(timestamp), MAX(timestamp)
             FROM weather_raw
             GROUP BY station_id
             ORDER BY station_id",
        )?;
        let rows = stmt.query_map([], |row| {
            let count: i64 = row.get(1)?;
            Ok(StationSummary::new(
                row.get(0)?,
                count as usize,
                timestamp_column(row, 2)?,
                timestamp_column(row, 3)?,
            ))
        })?;

        let mut stations = Vec::new();
        for row in rows {
            stations.push(row?);
        }
        Ok(stations)
    }

    pub fn null_counts(&self) -> Result<NullCounts> {
        let nullable: Vec<CanonicalField> = CanonicalField::ALL
            .iter()
            .copied()
            .filter(|f| !f.is_required())
            .collect();

        let columns: Vec<String> = nullable
            .iter()
            .map(|f| format!("COUNT(*) - COUNT({})", f.column()))
            .collect();
        let sql = format!(
            "SELECT COUNT(*), {} FROM {}",
            columns.join(", "),
            OBSERVATION_TABLE
        );

        self.conn
            .query_row(&sql, [], |row| {
                let total: i64 = row.get(0)?;
                let mut nulls = Vec::with_capacity(nullable.len());
                for (i, field) in nullable.iter().enumerate() {
                    let count: i64 = row.get(i + 1)?;
                    nulls.push((*field, count as usize));
                }
                Ok(NullCounts {
                    total_rows: total as usize,
                    nulls,
                })
            })
            .map_err(EtlError::from)
    }

    /// Each chunk of `chunk_size` rows (capped by the parameter limit) is
    /// written by one multi-row `INSERT`; all chunks share one transaction.
    fn insert_all(
        &mut self,
        rows: &[Observation],
        loaded_at: DateTime<Utc>,
        policy: DuplicatePolicy,
        chunk_size: usize,
    ) -> rusqlite::Result<InsertOutcome> {
        let loaded_at = format_timestamp(&loaded_at);
        let chunk_size = chunk_size.clamp(1, MAX_ROWS_PER_STATEMENT);
        let mut outcome = InsertOutcome::default();
        // Keys written earlier in this batch, for the skip-existing check
        let mut batch_keys: HashSet<(&str, String)> = HashSet::new();

        let tx = self.conn.transaction()?;
        {
            let mut exists = tx.prepare_cached(EXISTS_SQL)?;

            for (chunk_index, chunk) in rows.chunks(chunk_size).enumerate() {
                let mut values: Vec<Value> = Vec::with_capacity(chunk.len() * INSERT_COLUMNS.len());
                let mut pending = 0;

                for row in chunk {
                    let timestamp = format_timestamp(&row.timestamp);

                    if policy == DuplicatePolicy::SkipExisting {
                        let seen = batch_keys.contains(&(row.station_id.as_str(), timestamp.clone()))
                            || exists
                                .query_row(params![row.station_id, timestamp], |_| Ok(()))
                                .optional()?
                                .is_some();
                        if seen {
                            outcome.skipped += 1;
                            continue;
                        }
                        batch_keys.insert((row.station_id.as_str(), timestamp.clone()));
                    }

                    values.extend(row_values(row, timestamp, &loaded_at));
                    pending += 1;
                }

                if pending > 0 {
                    let mut insert = tx.prepare_cached(&insert_sql(pending))?;
                    insert.execute(params_from_iter(values.iter()))?;
                    outcome.inserted += pending;
                }
                debug!(chunk = chunk_index, rows = pending, "Inserted chunk");
            }
        }
        tx.commit()?;

        Ok(outcome)
    }
}

impl ObservationStore for SqliteStore {
    fn insert_batch(
        &mut self,
        rows: &[Observation],
        loaded_at: DateTime<Utc>,
        policy: DuplicatePolicy,
        chunk_size: usize,
    ) -> Result<InsertOutcome> {
        // Dropping the transaction on error rolls the whole batch back
        self.insert_all(rows, loaded_at, policy, chunk_size)
            .map_err(|e| EtlError::StoreWriteFailure(e.to_string()))
    }

    fn count(&self) -> Result<usize> {
        let sql = format!("SELECT COUNT(*) FROM {}", OBSERVATION_TABLE);
        let count: i64 = self.conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(count as usize)
    }
}
