use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

/// Station identifier encoded in a file name: the stem up to the first `_`
/// (e.g. `263_2024-05.csv` -> `263`).
pub fn station_from_filename(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    let prefix = stem.split('_').next()?.trim();

    if prefix.is_empty() {
        None
    } else {
        Some(prefix.to_string())
    }
}

pub fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(extension))
}

/// Where a processed file should land, never clobbering an earlier copy.
///
/// An existing name gets a UTC stamp before the extension:
/// `263_may.csv` -> `263_may.20240501T101500Z.csv`.
pub fn archive_destination(processed_dir: &Path, source: &Path, now: DateTime<Utc>) -> PathBuf {
    let file_name = source
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    let candidate = processed_dir.join(&file_name);
    if !candidate.exists() {
        return candidate;
    }

    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stamp = now.format("%Y%m%dT%H%M%SZ");
    let stamped = match source.extension() {
        Some(ext) => format!("{}.{}.{}", stem, stamp, ext.to_string_lossy()),
        None => format!("{}.{}", stem, stamp),
    };

    let mut destination = processed_dir.join(&stamped);
    let mut attempt = 1;
    while destination.exists() {
        destination = processed_dir.join(format!("{}-{}", attempt, stamped));
        attempt += 1;
    }
    destination
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    #[test]
    fn test_station_from_filename() {
        assert_eq!(
            station_from_filename(Path::new("/data/263_2024-05.csv")),
            Some("263".to_string())
        );
        assert_eq!(
            station_from_filename(Path::new("TO_CENTRO.csv")),
            Some("TO".to_string())
        );
        assert_eq!(
            station_from_filename(Path::new("station.csv")),
            Some("station".to_string())
        );
        assert_eq!(station_from_filename(Path::new("_2024.csv")), None);
    }

    #[test]
    fn test_has_extension() {
        assert!(has_extension(Path::new("a.csv"), "csv"));
        assert!(has_extension(Path::new("a.CSV"), "csv"));
        assert!(!has_extension(Path::new("a.csv.bak"), "csv"));
        assert!(!has_extension(Path::new("csv"), "csv"));
    }

    #[test]
    fn test_archive_destination_avoids_overwrite() -> std::io::Result<()> {
        let dir = TempDir::new()?;
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 10, 15, 0).unwrap();
        let source = Path::new("/incoming/263_may.csv");

        let first = archive_destination(dir.path(), source, now);
        assert_eq!(first, dir.path().join("263_may.csv"));

        std::fs::write(&first, "x")?;
        let second = archive_destination(dir.path(), source, now);
        assert_eq!(second, dir.path().join("263_may.20240501T101500Z.csv"));

        std::fs::write(&second, "x")?;
        let third = archive_destination(dir.path(), source, now);
        assert_eq!(third, dir.path().join("1-263_may.20240501T101500Z.csv"));

        Ok(())
    }
}
