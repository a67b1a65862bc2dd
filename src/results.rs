//! Result data structures for a benchmark run.
//!
//! One [`TestResult`] is produced per attempted candidate and appended to
//! the run's collection; missing measurements are `None` rather than zero so
//! a degraded test is distinguishable from a genuinely slow one. The
//! [`RunReport`] aggregates the collection for the final summary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::geo::{Candidate, Protocol};
use crate::locations::Continent;
use crate::stats::{mean, median, percentile};

/// Why a test cycle failed, or why a successful one is missing metrics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FailureReason {
    /// The tunnel did not come up within the timeout budget.
    ConnectTimeout,
    /// The VPN client reported a connection error.
    ConnectError(String),
    /// The latency/jitter/loss probe failed after a successful connection.
    ProbeError(String),
    /// The throughput measurement failed after a successful connection.
    MeasureError(String),
}

impl FailureReason {
    /// Short label used for aggregate failure counts in the report.
    pub fn label(&self) -> &'static str {
        match self {
            FailureReason::ConnectTimeout => "connect timeout",
            FailureReason::ConnectError(_) => "connect error",
            FailureReason::ProbeError(_) => "probe error",
            FailureReason::MeasureError(_) => "measure error",
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::ConnectTimeout => f.write_str("connect timeout"),
            FailureReason::ConnectError(detail) => write!(f, "connect error: {}", detail),
            FailureReason::ProbeError(detail) => write!(f, "probe error: {}", detail),
            FailureReason::MeasureError(detail) => write!(f, "measure error: {}", detail),
        }
    }
}

/// The outcome of one connect → measure → disconnect cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    pub hostname: String,
    pub city: String,
    pub country: String,
    pub continent: Continent,
    pub protocol: Protocol,
    pub distance_km: f64,
    /// True if the tunnel came up, even when later measurements degraded.
    pub succeeded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_time_s: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_mbps: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload_mbps: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jitter_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub packet_loss_pct: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<FailureReason>,
    pub timestamp: DateTime<Utc>,
}

impl TestResult {
    /// Skeleton result for a candidate, with nothing measured yet.
    pub fn for_candidate(candidate: &Candidate) -> Self {
        Self {
            hostname: candidate.location.hostname.clone(),
            city: candidate.location.city.clone(),
            country: candidate.location.country.clone(),
            continent: candidate.location.continent,
            protocol: candidate.location.protocol,
            distance_km: candidate.distance_km,
            succeeded: false,
            connection_time_s: None,
            download_mbps: None,
            upload_mbps: None,
            latency_ms: None,
            jitter_ms: None,
            packet_loss_pct: None,
            failure_reason: None,
            timestamp: Utc::now(),
        }
    }

    /// A result for a cycle that never established a connection.
    pub fn connect_failed(candidate: &Candidate, reason: FailureReason) -> Self {
        let mut result = Self::for_candidate(candidate);
        result.failure_reason = Some(reason);
        result
    }

    /// Whether this server counts toward the viability target.
    pub fn is_viable(&self, min_download_mbps: f64) -> bool {
        self.succeeded && self.download_mbps.is_some_and(|mbps| mbps >= min_download_mbps)
    }
}

/// Aggregate statistics over successful tests, shown in the final summary.
#[derive(Debug, Clone, Serialize)]
pub struct OverallStats {
    pub avg_connection_time_s: f64,
    pub avg_download_mbps: f64,
    /// Median is less sensitive to a single outlier server than the mean.
    pub median_download_mbps: f64,
    /// 90th percentile download, the headline "best case" figure.
    pub p90_download_mbps: f64,
    pub avg_upload_mbps: f64,
    pub avg_latency_ms: f64,
}

/// Final run summary: attempt counts, viability, and failure breakdown.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub attempts: usize,
    pub successes: usize,
    pub viable: usize,
    pub min_viable: usize,
    /// True when the run stopped below the viability target.
    pub degraded: bool,
    /// Failure counts keyed by reason label.
    pub failure_counts: BTreeMap<String, usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<OverallStats>,
}

impl RunReport {
    pub fn from_results(results: &[TestResult], min_download_mbps: f64, min_viable: usize) -> Self {
        let successes = results.iter().filter(|r| r.succeeded).count();
        let viable = results.iter().filter(|r| r.is_viable(min_download_mbps)).count();

        let mut failure_counts: BTreeMap<String, usize> = BTreeMap::new();
        for result in results {
            if let Some(ref reason) = result.failure_reason {
                *failure_counts.entry(reason.label().to_string()).or_insert(0) += 1;
            }
        }

        let connection_times: Vec<f64> =
            results.iter().filter_map(|r| r.connection_time_s).collect();
        let downloads: Vec<f64> = results.iter().filter_map(|r| r.download_mbps).collect();
        let uploads: Vec<f64> = results.iter().filter_map(|r| r.upload_mbps).collect();
        let latencies: Vec<f64> = results.iter().filter_map(|r| r.latency_ms).collect();

        let stats = if downloads.is_empty() {
            None
        } else {
            Some(OverallStats {
                avg_connection_time_s: mean(&connection_times),
                avg_download_mbps: mean(&downloads),
                median_download_mbps: median(&downloads),
                p90_download_mbps: percentile(&downloads, 0.9),
                avg_upload_mbps: mean(&uploads),
                avg_latency_ms: mean(&latencies),
            })
        };

        Self {
            attempts: results.len(),
            successes,
            viable,
            min_viable,
            degraded: viable < min_viable,
            failure_counts,
            stats,
        }
    }
}
