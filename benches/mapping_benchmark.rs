use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use csv::StringRecord;
use weather_etl::mapping::{ColumnMapper, FormatRegistry, SourceFormat};
use weather_etl::models::Observation;
use weather_etl::readers::CsvReader;
use weather_etl::store::{DuplicatePolicy, ObservationStore, SqliteStore};

const STANDARD_HEADERS: [&str; 10] = [
    "Time", "station_id", "latitude", "longitude", "extT", "rh", "pluv", "wsp_ana", "wdir_ana",
    "radN",
];

// Hourly rows for one station, with the odd sentinel and bad value mixed in
fn create_standard_csv(rows: usize) -> Vec<u8> {
    let mut text = STANDARD_HEADERS.join(";");
    text.push('\n');

    for i in 0..rows {
        let day = 1 + (i / 24) % 28;
        let hour = i % 24;
        let temperature = match i % 50 {
            0 => "-9999".to_string(),
            _ => format!("{:.1}", 10.0 + (i % 15) as f64 * 0.7),
        };
        let wind = if i % 97 == 0 { "calm".to_string() } else { format!("{:.1}", (i % 9) as f64 * 0.4) };
        text.push_str(&format!(
            "2024-05-{:02} {:02}:00:00;ST01;45.07;7.68;{};{};0.0;{};{};{:.1}\n",
            day,
            hour,
            temperature,
            40 + i % 50,
            wind,
            i % 360,
            (i % 800) as f64 * 1.1
        ));
    }

    text.into_bytes()
}

fn map_all(bytes: &[u8]) -> Vec<Observation> {
    let raw = CsvReader::new().read_bytes(bytes).unwrap();
    let registry = FormatRegistry::builtin();
    let format = registry.detect(&raw.headers).unwrap();
    let mapper = ColumnMapper::new(format, &raw.headers);

    raw.records
        .iter()
        .filter_map(|r| mapper.map_row(r, None).observation().cloned())
        .collect()
}

fn benchmark_map_row(c: &mut Criterion) {
    let format = SourceFormat::italian();
    let headers: Vec<String> = [
        "Data e ora",
        "T aria (°C)",
        "Umidità aria (%)",
        "pioggia (mm)",
        "pioggia (count)",
        "velocità vento (m/sec)",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    let mapper = ColumnMapper::new(&format, &headers);
    let row = StringRecord::from(vec!["01/05/2024 10:00", "18,4", "62,5", "0,2", "3", "3,1"]);

    c.bench_function("map_row_italian", |b| {
        b.iter(|| black_box(mapper.map_row(black_box(&row), Some("263"))))
    });
}

fn benchmark_read_and_map(c: &mut Criterion) {
    let mut group = c.benchmark_group("read_and_map_by_rows");

    for &rows in &[100, 1_000, 10_000] {
        let bytes = create_standard_csv(rows);
        group.bench_with_input(BenchmarkId::new("rows", rows), &bytes, |b, bytes| {
            b.iter(|| black_box(map_all(bytes).len()))
        });
    }

    group.finish();
}

fn benchmark_insert_batch(c: &mut Criterion) {
    let observations = map_all(&create_standard_csv(1_000));

    c.bench_function("sqlite_insert_1000_rows", |b| {
        b.iter(|| {
            let mut store = SqliteStore::open_in_memory().unwrap();
            store.migrate().unwrap();
            let outcome = store
                .insert_batch(&observations, chrono::Utc::now(), DuplicatePolicy::Append, 500)
                .unwrap();
            black_box(outcome.inserted)
        })
    });
}

criterion_group!(
    benches,
    benchmark_map_row,
    benchmark_read_and_map,
    benchmark_insert_batch
);
criterion_main!(benches);
