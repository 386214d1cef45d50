use chrono::{DateTime, Duration, NaiveTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{EtlError, Result};
use crate::models::{CanonicalField, Observation};
use crate::store::{ObservationFilter, SqliteStore};

/// Fields correlated when the caller does not pick any.
pub const DEFAULT_CORRELATION_FIELDS: [CanonicalField; 6] = [
    CanonicalField::Temperature,
    CanonicalField::Humidity,
    CanonicalField::WindSpeed,
    CanonicalField::WindDirection,
    CanonicalField::Radiation,
    CanonicalField::Precipitation,
];

/// Fields tracked across rolling windows.
pub const DEFAULT_STABILITY_FIELDS: [CanonicalField; 4] = [
    CanonicalField::Temperature,
    CanonicalField::Humidity,
    CanonicalField::WindSpeed,
    CanonicalField::Radiation,
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum CorrelationMethod {
    /// Linear relationship on the raw values
    #[default]
    Pearson,
    /// Monotonic relationship on ranks, ties averaged
    Spearman,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CorrelationOptions {
    pub method: CorrelationMethod,
    pub fields: Vec<CanonicalField>,
    /// Non-null values a field needs to take part at all.
    pub min_observations: usize,
    /// Smallest |r| reported as a strong correlation.
    pub threshold: f64,
}

impl Default for CorrelationOptions {
    fn default() -> Self {
        Self {
            method: CorrelationMethod::Pearson,
            fields: DEFAULT_CORRELATION_FIELDS.to_vec(),
            min_observations: 30,
            threshold: 0.7,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExcludedField {
    pub field: CanonicalField,
    pub observations: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrongCorrelation {
    pub first: CanonicalField,
    pub second: CanonicalField,
    pub coefficient: f64,
    pub pairs: usize,
}

/// Pairwise correlation coefficients between measurement fields.
///
/// Each coefficient uses only the rows where both fields are present. A
/// coefficient is `None` when fewer than two such rows exist or one side is
/// constant over them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationMatrix {
    pub method: CorrelationMethod,
    pub observations: usize,
    pub fields: Vec<CanonicalField>,
    pub excluded: Vec<ExcludedField>,
    pub coefficients: Vec<Vec<Option<f64>>>,
    pub pair_counts: Vec<Vec<usize>>,
}

impl CorrelationMatrix {
    pub fn from_store(
        store: &SqliteStore,
        filter: &ObservationFilter,
        options: &CorrelationOptions,
    ) -> Result<Self> {
        let stored = store.observations(filter)?;
        let observations: Vec<Observation> = stored.into_iter().map(|s| s.observation).collect();
        Self::compute(&observations, options)
    }

    pub fn compute(observations: &[Observation], options: &CorrelationOptions) -> Result<Self> {
        let mut fields = Vec::new();
        let mut columns = Vec::new();
        let mut excluded = Vec::new();

        for &field in &options.fields {
            let column = field_values(observations, field);
            let present = column.iter().filter(|v| v.is_some()).count();
            if present >= options.min_observations {
                fields.push(field);
                columns.push(column);
            } else {
                warn!("Excluding {} from correlations: only {} value(s)", field, present);
                excluded.push(ExcludedField {
                    field,
                    observations: present,
                });
            }
        }

        if fields.len() < 2 {
            return Err(EtlError::MissingData(format!(
                "correlations need two fields with at least {} values each, found {}",
                options.min_observations,
                fields.len()
            )));
        }

        let n = fields.len();
        let mut coefficients = vec![vec![None; n]; n];
        let mut pair_counts = vec![vec![0; n]; n];

        for i in 0..n {
            for j in i..n {
                let (xs, ys) = complete_pairs(&columns[i], &columns[j]);
                let r = if i == j && xs.len() >= 2 {
                    Some(1.0)
                } else {
                    correlate(&xs, &ys, options.method)
                };
                coefficients[i][j] = r;
                coefficients[j][i] = r;
                pair_counts[i][j] = xs.len();
                pair_counts[j][i] = xs.len();
            }
        }

        debug!(
            method = ?options.method,
            fields = n,
            rows = observations.len(),
            "Computed correlation matrix"
        );

        Ok(Self {
            method: options.method,
            observations: observations.len(),
            fields,
            excluded,
            coefficients,
            pair_counts,
        })
    }

    pub fn coefficient(&self, first: CanonicalField, second: CanonicalField) -> Option<f64> {
        let i = self.fields.iter().position(|f| *f == first)?;
        let j = self.fields.iter().position(|f| *f == second)?;
        self.coefficients[i][j]
    }

    /// Distinct pairs with |r| at or above `threshold`, strongest first.
    pub fn strong_correlations(&self, threshold: f64) -> Vec<StrongCorrelation> {
        let mut strong = Vec::new();
        for i in 0..self.fields.len() {
            for j in (i + 1)..self.fields.len() {
                if let Some(r) = self.coefficients[i][j] {
                    if r.abs() >= threshold {
                        strong.push(StrongCorrelation {
                            first: self.fields[i],
                            second: self.fields[j],
                            coefficient: r,
                            pairs: self.pair_counts[i][j],
                        });
                    }
                }
            }
        }
        strong.sort_by(|a, b| b.coefficient.abs().total_cmp(&a.coefficient.abs()));
        strong
    }

    pub fn summary(&self, threshold: f64) -> String {
        let mut summary = String::new();
        summary.push_str(&format!(
            "=== Correlations ({}) ===\n",
            match self.method {
                CorrelationMethod::Pearson => "pearson",
                CorrelationMethod::Spearman => "spearman",
            }
        ));
        summary.push_str(&format!("Observations: {}\n\n", self.observations));

        summary.push_str(&format!("{:<16}", ""));
        for field in &self.fields {
            summary.push_str(&format!("{:>16}", field.column()));
        }
        summary.push('\n');
        for (i, field) in self.fields.iter().enumerate() {
            summary.push_str(&format!("{:<16}", field.column()));
            for r in &self.coefficients[i] {
                match r {
                    Some(r) => summary.push_str(&format!("{:>16.3}", r)),
                    None => summary.push_str(&format!("{:>16}", "-")),
                }
            }
            summary.push('\n');
        }

        let strong = self.strong_correlations(threshold);
        summary.push_str(&format!("\nStrong Correlations (|r| >= {}):\n", threshold));
        if strong.is_empty() {
            summary.push_str("  none\n");
        }
        for pair in &strong {
            summary.push_str(&format!(
                "  {} vs {}: {:.3} over {} rows\n",
                pair.first, pair.second, pair.coefficient, pair.pairs
            ));
        }

        if !self.excluded.is_empty() {
            summary.push_str("\nExcluded (too few values):\n");
            for excluded in &self.excluded {
                summary.push_str(&format!("  {}: {}\n", excluded.field, excluded.observations));
            }
        }

        summary
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairSeries {
    pub first: CanonicalField,
    pub second: CanonicalField,
    /// One coefficient per window, aligned with `StabilityReport::windows`.
    pub coefficients: Vec<Option<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub observations: usize,
}

/// How pairwise correlations move across rolling time windows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StabilityReport {
    pub method: CorrelationMethod,
    pub window_days: i64,
    pub step_days: i64,
    pub windows: Vec<CorrelationWindow>,
    pub pairs: Vec<PairSeries>,
}

impl StabilityReport {
    /// Slide a `window_days` window by `step_days` over the UTC days spanned
    /// by the observations; a window must end by midnight after the last
    /// one. Windows with fewer than `min_observations` rows, or where fewer
    /// than two fields qualify, are skipped.
    pub fn compute(
        observations: &[Observation],
        options: &CorrelationOptions,
        window_days: i64,
        step_days: i64,
    ) -> Result<Self> {
        if window_days < 1 || step_days < 1 {
            return Err(EtlError::InvalidFormat(
                "window and step must be at least one day".to_string(),
            ));
        }

        let mut pairs = Vec::new();
        for (i, &first) in options.fields.iter().enumerate() {
            for &second in &options.fields[i + 1..] {
                pairs.push(PairSeries {
                    first,
                    second,
                    coefficients: Vec::new(),
                });
            }
        }

        let mut report = Self {
            method: options.method,
            window_days,
            step_days,
            windows: Vec::new(),
            pairs,
        };

        let first_ts = observations.iter().map(|o| o.timestamp).min();
        let last_ts = observations.iter().map(|o| o.timestamp).max();
        let (Some(first_ts), Some(last_ts)) = (first_ts, last_ts) else {
            return Ok(report);
        };

        let window = Duration::days(window_days);
        let step = Duration::days(step_days);
        let mut start = first_ts.date_naive().and_time(NaiveTime::MIN).and_utc();
        let range_end = last_ts.date_naive().and_time(NaiveTime::MIN).and_utc() + Duration::days(1);

        while start + window <= range_end {
            let end = start + window;
            let rows: Vec<Observation> = observations
                .iter()
                .filter(|o| o.timestamp >= start && o.timestamp < end)
                .cloned()
                .collect();

            if rows.len() >= options.min_observations {
                match CorrelationMatrix::compute(&rows, options) {
                    Ok(matrix) => {
                        report.windows.push(CorrelationWindow {
                            start,
                            end,
                            observations: rows.len(),
                        });
                        for pair in &mut report.pairs {
                            pair.coefficients
                                .push(matrix.coefficient(pair.first, pair.second));
                        }
                    }
                    Err(e) => warn!("Skipping window {} to {}: {}", start, end, e),
                }
            }

            start += step;
        }

        Ok(report)
    }

    pub fn summary(&self) -> String {
        let mut summary = String::new();
        summary.push_str(&format!(
            "=== Correlation Stability ({}-day windows, {}-day step) ===\n",
            self.window_days, self.step_days
        ));
        summary.push_str(&format!("Windows: {}\n", self.windows.len()));
        if self.windows.is_empty() {
            return summary;
        }

        for pair in &self.pairs {
            let values: Vec<f64> = pair.coefficients.iter().flatten().copied().collect();
            if values.is_empty() {
                summary.push_str(&format!("  {} vs {}: -\n", pair.first, pair.second));
                continue;
            }
            let mean = values.iter().sum::<f64>() / values.len() as f64;
            let min = values.iter().copied().fold(f64::INFINITY, f64::min);
            let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            summary.push_str(&format!(
                "  {} vs {}: mean {:.3} range [{:.3}, {:.3}] over {} window(s)\n",
                pair.first,
                pair.second,
                mean,
                min,
                max,
                values.len()
            ));
        }
        summary
    }
}

/// Decimal values become f64 here, at the edge of the view.
fn field_values(observations: &[Observation], field: CanonicalField) -> Vec<Option<f64>> {
    observations
        .iter()
        .map(|o| o.decimal(field).and_then(|d| d.to_f64()))
        .collect()
}

fn complete_pairs(xs: &[Option<f64>], ys: &[Option<f64>]) -> (Vec<f64>, Vec<f64>) {
    xs.iter()
        .zip(ys)
        .filter_map(|(x, y)| Some(((*x)?, (*y)?)))
        .unzip()
}

fn correlate(xs: &[f64], ys: &[f64], method: CorrelationMethod) -> Option<f64> {
    match method {
        CorrelationMethod::Pearson => pearson(xs, ys),
        CorrelationMethod::Spearman => pearson(&ranks(xs), &ranks(ys)),
    }
}

pub fn pearson(xs: &[f64], ys: &[f64]) -> Option<f64> {
    if xs.len() != ys.len() || xs.len() < 2 {
        return None;
    }

    let n = xs.len() as f64;
    let mean_x = xs.iter().sum::<f64>() / n;
    let mean_y = ys.iter().sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        let dx = x - mean_x;
        let dy = y - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    if var_x == 0.0 || var_y == 0.0 {
        return None;
    }
    let r = cov / (var_x * var_y).sqrt();
    r.is_finite().then(|| r.clamp(-1.0, 1.0))
}

/// 1-based ranks; tied values share the mean of their positions.
pub fn ranks(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut ranks = vec![0.0; values.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && values[order[j + 1]] == values[order[i]] {
            j += 1;
        }
        let rank = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            ranks[idx] = rank;
        }
        i = j + 1;
    }
    ranks
}
