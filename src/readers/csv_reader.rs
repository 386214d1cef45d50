use csv::{ReaderBuilder, StringRecord, Trim};
use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};
use std::borrow::Cow;
use std::fs;
use std::path::Path;

use crate::error::{EtlError, Result};
use crate::utils::constants::CANDIDATE_DELIMITERS;

/// A fully read CSV file: header, raw rows and how it was decoded.
#[derive(Debug, Clone)]
pub struct RawCsv {
    pub headers: Vec<String>,
    pub records: Vec<StringRecord>,
    pub encoding: &'static str,
    pub delimiter: u8,
}

impl RawCsv {
    pub fn row_count(&self) -> usize {
        self.records.len()
    }
}

pub struct CsvReader {
    delimiter: Option<u8>,
}

impl CsvReader {
    pub fn new() -> Self {
        Self { delimiter: None }
    }

    /// Skip sniffing and always split on `delimiter`.
    pub fn with_delimiter(delimiter: u8) -> Self {
        Self {
            delimiter: Some(delimiter),
        }
    }

    /// Read a whole file. Every row is materialised before mapping starts, so
    /// a malformed record fails the file before anything reaches the store.
    pub fn read(&self, path: &Path) -> Result<RawCsv> {
        let bytes = fs::read(path).map_err(|e| EtlError::ReadFailure {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        self.read_bytes(&bytes).map_err(|e| match e {
            EtlError::ReadFailure { .. } => e,
            other => EtlError::ReadFailure {
                path: path.to_path_buf(),
                message: other.to_string(),
            },
        })
    }

    pub fn read_bytes(&self, bytes: &[u8]) -> Result<RawCsv> {
        let (text, encoding) = decode(bytes);

        let header_line = text.lines().find(|l| !l.trim().is_empty()).ok_or_else(|| {
            EtlError::InvalidFormat("file is empty, expected a header row".to_string())
        })?;
        let delimiter = self
            .delimiter
            .unwrap_or_else(|| sniff_delimiter(header_line));

        let mut reader = ReaderBuilder::new()
            .delimiter(delimiter)
            .flexible(true)
            .trim(Trim::All)
            .from_reader(text.as_bytes());

        let headers: Vec<String> = reader
            .headers()?
            .iter()
            .map(normalize_header)
            .collect();

        let mut records = Vec::new();
        for record in reader.records() {
            records.push(record?);
        }

        Ok(RawCsv {
            headers,
            records,
            encoding,
            delimiter,
        })
    }
}

impl Default for CsvReader {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode bytes as UTF-8, falling back to Windows-1252 (a Latin-1 superset).
pub fn decode(bytes: &[u8]) -> (Cow<'_, str>, &'static str) {
    if let Some((encoding, bom_len)) = Encoding::for_bom(bytes) {
        let (text, _) = encoding.decode_without_bom_handling(&bytes[bom_len..]);
        return (text, encoding.name());
    }

    match UTF_8.decode_without_bom_handling_and_without_replacement(bytes) {
        Some(text) => (text, UTF_8.name()),
        None => {
            let (text, _) = WINDOWS_1252.decode_without_bom_handling(bytes);
            (text, WINDOWS_1252.name())
        }
    }
}

/// Most frequent candidate delimiter in the header line.
pub fn sniff_delimiter(header_line: &str) -> u8 {
    let mut best = CANDIDATE_DELIMITERS[0];
    let mut best_count = 0;

    for candidate in CANDIDATE_DELIMITERS {
        let count = header_line.bytes().filter(|b| *b == candidate).count();
        if count > best_count {
            best = candidate;
            best_count = count;
        }
    }

    best
}

fn normalize_header(raw: &str) -> String {
    raw.trim_start_matches('\u{feff}').trim().to_string()
}
