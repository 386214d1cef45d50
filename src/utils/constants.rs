/// Table and directory names
pub const OBSERVATION_TABLE: &str = "weather_raw";
pub const PROCESSED_DIR: &str = "processed";
pub const CSV_EXTENSION: &str = "csv";

/// Default configuration file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "weather-etl.toml";
pub const ENV_PREFIX: &str = "WEATHER_ETL";

/// Processing defaults
pub const DEFAULT_BATCH_SIZE: usize = 1000;
pub const DEFAULT_DATABASE: &str = "weather.db";
pub const DEFAULT_DATA_DIR: &str = "data";

/// Candidate CSV delimiters, in tie-break order
pub const CANDIDATE_DELIMITERS: [u8; 3] = [b';', b',', b'\t'];

/// Geographic bounds for coordinate fields
pub const MAX_ABS_LATITUDE: i64 = 90;
pub const MAX_ABS_LONGITUDE: i64 = 180;

/// Aggregates
pub const AVERAGE_DECIMAL_PLACES: u32 = 4;

/// Timestamp format persisted in the store (RFC 3339, UTC, second precision)
pub const STORE_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Sensor-fault markers shared by the built-in formats
pub const DEFAULT_SENTINELS: [&str; 6] = ["NaN", "nan", "NAN", "-9999", "-999.9", "-9999.0"];
