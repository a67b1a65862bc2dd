//! Route-quality and throughput probe adapters.
//!
//! The route probe wraps `mtr` in report mode; the throughput probe wraps
//! `speedtest-cli --json`. Both return structured metrics or a typed error,
//! never a raw exit status.

use log::debug;
use serde::Deserialize;

use crate::vpn::mullvad::run_command;
use crate::vpn::{MeasureError, ProbeError, RouteMetrics, RouteProbe, Throughput, ThroughputProbe};

/// `mtr` report-mode probe toward a fixed target host.
pub struct MtrProbe {
    /// Packets sent per report (`-c`).
    pub cycles: u32,
}

impl MtrProbe {
    pub fn new() -> Self {
        Self { cycles: 20 }
    }
}

impl Default for MtrProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl RouteProbe for MtrProbe {
    async fn probe(&self, target: &str) -> Result<RouteMetrics, ProbeError> {
        debug!("Running mtr toward {} ({} cycles)", target, self.cycles);
        let cycles = self.cycles.to_string();
        let output = run_command("mtr", &["-n", "-c", &cycles, "-r", target])
            .await
            .map_err(ProbeError)?;

        parse_mtr_report(&output)
    }
}

/// Parse an `mtr -r` report, taking the final hop's figures.
///
/// Report rows look like:
/// `  9.|-- 8.8.8.8   0.0%    20   12.3  13.1  11.2  20.1   2.2`
/// with columns Loss%, Snt, Last, Avg, Best, Wrst, StDev after the host.
/// StDev stands in for jitter.
fn parse_mtr_report(output: &str) -> Result<RouteMetrics, ProbeError> {
    let last_hop = output
        .lines()
        .filter(|line| line.contains("|--"))
        .next_back()
        .ok_or_else(|| ProbeError("no hops in mtr report".to_string()))?;

    let fields: Vec<&str> = last_hop.split_whitespace().collect();
    if fields.len() < 9 {
        return Err(ProbeError(format!("malformed mtr report line: {}", last_hop.trim())));
    }

    let parse = |field: &str, name: &str| {
        field
            .trim_end_matches('%')
            .parse::<f64>()
            .map_err(|_| ProbeError(format!("bad {} in mtr report: {}", name, field)))
    };

    Ok(RouteMetrics {
        packet_loss_pct: parse(fields[2], "loss")?,
        latency_ms: parse(fields[5], "average latency")?,
        jitter_ms: parse(fields[8], "jitter")?,
    })
}

/// `speedtest-cli --json` throughput probe.
pub struct SpeedtestCli;

#[derive(Debug, Deserialize)]
struct SpeedtestReport {
    /// Download rate in bits per second.
    download: f64,
    /// Upload rate in bits per second.
    upload: f64,
}

impl ThroughputProbe for SpeedtestCli {
    async fn measure(&self) -> Result<Throughput, MeasureError> {
        debug!("Running speedtest-cli...");
        let output = run_command("speedtest-cli", &["--json"]).await.map_err(MeasureError)?;

        let report: SpeedtestReport = serde_json::from_str(&output)
            .map_err(|e| MeasureError(format!("bad speedtest-cli output: {}", e)))?;

        Ok(Throughput {
            download_mbps: report.download / 1_000_000.0,
            upload_mbps: report.upload / 1_000_000.0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MTR_REPORT: &str = "\
Start: 2025-06-01T12:00:00+0000
HOST: testhost          Loss%   Snt   Last   Avg  Best  Wrst StDev
  1.|-- 10.64.0.1        0.0%    20    1.1   1.3   1.0   2.4   0.3
  2.|-- 185.1.2.1        0.0%    20    8.7   9.2   8.1  14.0   1.4
  3.|-- 8.8.8.8          5.0%    20   12.3  13.1  11.2  20.1   2.2
";

    #[test]
    fn test_parse_mtr_report_last_hop() {
        let metrics = parse_mtr_report(MTR_REPORT).unwrap();
        assert!((metrics.latency_ms - 13.1).abs() < 1e-9);
        assert!((metrics.jitter_ms - 2.2).abs() < 1e-9);
        assert!((metrics.packet_loss_pct - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_parse_mtr_report_without_hops() {
        let error = parse_mtr_report("Start: 2025-06-01\nHOST: x Loss% Snt\n").unwrap_err();
        assert!(error.0.contains("no hops"));
    }

    #[test]
    fn test_parse_mtr_report_malformed_row() {
        let error = parse_mtr_report("  1.|-- 8.8.8.8 garbage\n").unwrap_err();
        assert!(error.0.contains("malformed"));
    }

    #[test]
    fn test_speedtest_report_deserializes_and_converts() {
        let json = r#"{"download": 52500000.0, "upload": 21000000.0, "ping": 14.2}"#;
        let report: SpeedtestReport = serde_json::from_str(json).unwrap();
        assert!((report.download / 1_000_000.0 - 52.5).abs() < 1e-9);
        assert!((report.upload / 1_000_000.0 - 21.0).abs() < 1e-9);
    }
}
