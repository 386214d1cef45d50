//! Versioned schema migrations, tracked with `PRAGMA user_version`.
//!
//! Steps are append-only. Measurement columns are declared `TEXT` so SQLite
//! keeps the canonical decimal text instead of coercing it to a float.

use rusqlite::Connection;
use tracing::info;

use crate::error::Result;

pub struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "create weather_raw",
        sql: r#"
            CREATE TABLE IF NOT EXISTS weather_raw (
                id                  INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp           TEXT NOT NULL,
                station_id          TEXT NOT NULL,
                latitude            TEXT,
                longitude           TEXT,
                temperature         TEXT,
                humidity            TEXT,
                wind_speed          TEXT,
                wind_direction      TEXT,
                precipitation       TEXT,
                precipitation_count INTEGER,
                radiation           TEXT,
                loaded_at           TEXT NOT NULL
            );
        "#,
    },
    Migration {
        version: 2,
        description: "index weather_raw by station and time",
        sql: r#"
            CREATE INDEX IF NOT EXISTS idx_weather_raw_station_time
            ON weather_raw(station_id, timestamp);
        "#,
    },
];

pub fn current_version(conn: &Connection) -> Result<u32> {
    Ok(conn.query_row("PRAGMA user_version", [], |row| row.get(0))?)
}

pub fn latest_version() -> u32 {
    MIGRATIONS.last().map_or(0, |m| m.version)
}

/// Apply every migration above the current version, one transaction each.
/// Returns the versions applied.
pub fn apply_migrations(conn: &mut Connection) -> Result<Vec<u32>> {
    let current = current_version(conn)?;
    let mut applied = Vec::new();

    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        let tx = conn.transaction()?;
        tx.execute_batch(migration.sql)?;
        tx.pragma_update(None, "user_version", migration.version)?;
        tx.commit()?;

        info!(
            version = migration.version,
            "Applied migration: {}", migration.description
        );
        applied.push(migration.version);
    }

    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_are_ordered() {
        let versions: Vec<u32> = MIGRATIONS.iter().map(|m| m.version).collect();
        let mut sorted = versions.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(versions, sorted);
    }

    #[test]
    fn test_apply_is_idempotent() -> Result<()> {
        let mut conn = Connection::open_in_memory()?;
        assert_eq!(current_version(&conn)?, 0);

        let applied = apply_migrations(&mut conn)?;
        assert_eq!(applied, vec![1, 2]);
        assert_eq!(current_version(&conn)?, latest_version());

        let applied = apply_migrations(&mut conn)?;
        assert!(applied.is_empty());

        Ok(())
    }

    #[test]
    fn test_wind_direction_keeps_decimal_text() -> Result<()> {
        let mut conn = Connection::open_in_memory()?;
        apply_migrations(&mut conn)?;
        conn.execute(
            "INSERT INTO weather_raw (timestamp, station_id, wind_direction, loaded_at)
             VALUES ('2024-01-01T00:00:00Z', 'S1', '99999999999.50', '2024-01-02T00:00:00Z')",
            [],
        )?;
        let stored: String =
            conn.query_row("SELECT wind_direction FROM weather_raw", [], |r| r.get(0))?;
        assert_eq!(stored, "99999999999.50");
        Ok(())
    }
}
