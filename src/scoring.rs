//! Ranking and composite scoring over completed test results.
//!
//! Rankings are computed once, after all tests finish, as a pure function of
//! the result collection: per-metric top-N tables plus one weighted
//! composite ordering. Failed results never appear in a metric table but are
//! still counted by the reliability statistics in the run report.

use serde::Serialize;

use crate::results::TestResult;

/// Values closer than this are treated as equal during normalization.
const NORMALIZE_EPSILON: f64 = 1e-12;

/// Weights for the composite score, one per metric, summing to 1.0.
///
/// These are configuration, not constants: each weight has a CLI flag so
/// alternate weighting policies can be tested without code changes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreWeights {
    pub download: f64,
    pub upload: f64,
    pub latency: f64,
    pub connection_time: f64,
    pub reliability: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            download: 0.35,
            upload: 0.15,
            latency: 0.25,
            connection_time: 0.10,
            reliability: 0.15,
        }
    }
}

impl ScoreWeights {
    /// Check the weights are non-negative and sum to 1.0.
    pub fn validate(&self) -> Result<(), String> {
        let weights =
            [self.download, self.upload, self.latency, self.connection_time, self.reliability];

        if weights.iter().any(|w| *w < 0.0) {
            return Err("score weights must be non-negative".to_string());
        }

        let sum: f64 = weights.iter().sum();
        if (sum - 1.0).abs() > 1e-6 {
            return Err(format!("score weights must sum to 1.0 (got {:.4})", sum));
        }

        Ok(())
    }
}

/// One row of a per-metric ranking table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricEntry {
    pub hostname: String,
    pub city: String,
    pub country: String,
    pub value: f64,
}

/// One row of the composite ranking.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompositeEntry {
    pub hostname: String,
    pub city: String,
    pub country: String,
    pub distance_km: f64,
    /// Weighted sum of normalized metric components, in [0, 1].
    pub score: f64,
}

/// Per-metric top-N tables plus the composite ordering.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Ranking {
    pub by_distance: Vec<MetricEntry>,
    pub by_connection_time: Vec<MetricEntry>,
    pub by_download: Vec<MetricEntry>,
    pub by_upload: Vec<MetricEntry>,
    pub by_latency: Vec<MetricEntry>,
    /// Successful servers ordered by lowest packet loss.
    pub by_reliability: Vec<MetricEntry>,
    pub composite: Vec<CompositeEntry>,
}

/// Compute all rankings from the final result collection.
///
/// Pure: identical inputs yield identical output. Only results whose
/// connection succeeded participate; within those, a metric table only
/// lists servers where that metric was actually measured.
pub fn rank(results: &[TestResult], weights: &ScoreWeights, top_n: usize) -> Ranking {
    let successes: Vec<&TestResult> = results.iter().filter(|r| r.succeeded).collect();

    Ranking {
        by_distance: metric_table(&successes, top_n, false, |r| Some(r.distance_km)),
        by_connection_time: metric_table(&successes, top_n, false, |r| r.connection_time_s),
        by_download: metric_table(&successes, top_n, true, |r| r.download_mbps),
        by_upload: metric_table(&successes, top_n, true, |r| r.upload_mbps),
        by_latency: metric_table(&successes, top_n, false, |r| r.latency_ms),
        by_reliability: metric_table(&successes, top_n, false, |r| r.packet_loss_pct),
        composite: composite_table(&successes, weights),
    }
}

fn metric_table(
    successes: &[&TestResult],
    top_n: usize,
    descending: bool,
    metric: impl Fn(&TestResult) -> Option<f64>,
) -> Vec<MetricEntry> {
    let mut entries: Vec<MetricEntry> = successes
        .iter()
        .filter_map(|result| {
            metric(result).map(|value| MetricEntry {
                hostname: result.hostname.clone(),
                city: result.city.clone(),
                country: result.country.clone(),
                value,
            })
        })
        .collect();

    entries.sort_by(|a, b| {
        let ordering = a.value.partial_cmp(&b.value).unwrap_or(std::cmp::Ordering::Equal);
        if descending {
            ordering.reverse()
        } else {
            ordering
        }
    });

    entries.truncate(top_n);
    entries
}

fn composite_table(successes: &[&TestResult], weights: &ScoreWeights) -> Vec<CompositeEntry> {
    let download = Normalizer::over(successes, |r| r.download_mbps, true);
    let upload = Normalizer::over(successes, |r| r.upload_mbps, true);
    let latency = Normalizer::over(successes, |r| r.latency_ms, false);
    let connection = Normalizer::over(successes, |r| r.connection_time_s, false);
    let reliability = Normalizer::over(successes, |r| r.packet_loss_pct, false);

    let mut entries: Vec<CompositeEntry> = successes
        .iter()
        .map(|result| {
            let score = weights.download * download.component(result.download_mbps)
                + weights.upload * upload.component(result.upload_mbps)
                + weights.latency * latency.component(result.latency_ms)
                + weights.connection_time * connection.component(result.connection_time_s)
                + weights.reliability * reliability.component(result.packet_loss_pct);

            CompositeEntry {
                hostname: result.hostname.clone(),
                city: result.city.clone(),
                country: result.country.clone(),
                distance_km: result.distance_km,
                score,
            }
        })
        .collect();

    // Descending by score; ties go to the nearer server, then input order
    // (the sort is stable).
    entries.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.distance_km.partial_cmp(&b.distance_km).unwrap_or(std::cmp::Ordering::Equal))
    });

    entries
}

/// Min-max scaler for one metric over the successful subset.
struct Normalizer {
    min: f64,
    max: f64,
    higher_is_better: bool,
    any: bool,
}

impl Normalizer {
    fn over(
        successes: &[&TestResult],
        metric: impl Fn(&TestResult) -> Option<f64>,
        higher_is_better: bool,
    ) -> Self {
        let values: Vec<f64> = successes.iter().filter_map(|r| metric(r)).collect();

        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        Self { min, max, higher_is_better, any: !values.is_empty() }
    }

    /// Normalized component in [0, 1]; higher is always better here.
    ///
    /// An unmeasured metric scores 0: a server that could not be measured
    /// must not outrank one with real numbers.
    fn component(&self, value: Option<f64>) -> f64 {
        let Some(value) = value else { return 0.0 };
        if !self.any {
            return 0.0;
        }

        if (self.max - self.min).abs() < NORMALIZE_EPSILON {
            // Every measured server tied on this metric.
            return 1.0;
        }

        let scaled = (value - self.min) / (self.max - self.min);
        if self.higher_is_better {
            scaled
        } else {
            1.0 - scaled
        }
    }
}
