//! End-to-end run orchestration.
//!
//! Ties calibration, selection, testing, persistence and ranking together.
//! Everything on the tunnel path is strictly sequential: one server at a
//! time, one connect and one disconnect per cycle. Cancellation is checked
//! between cycles, so an interrupt lets the in-flight cycle finish its
//! disconnect before the run winds down.

use log::{info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::calibrate::{calibrate, CalibrationConfig};
use crate::geo::Candidate;
use crate::results::{RunReport, TestResult};
use crate::scoring::{self, Ranking, ScoreWeights};
use crate::selector::{AdaptiveSelector, SelectorConfig};
use crate::tester::ServerTester;
use crate::vpn::{ResultSink, RouteProbe, ThroughputProbe, VpnClient};

/// Everything a run needs besides its collaborators.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub selector: SelectorConfig,
    pub calibration: CalibrationConfig,
    pub weights: ScoreWeights,
    pub top: usize,
}

/// What a finished (or interrupted) run produced.
pub struct RunOutcome {
    pub results: Vec<TestResult>,
    pub report: RunReport,
    pub ranking: Ranking,
    pub interrupted: bool,
}

/// Run the full benchmark: calibrate, then test candidates until the
/// selector says stop or `cancel` is raised.
///
/// Results are persisted as they arrive, so an interrupted run still
/// leaves everything measured so far on disk and in the outcome.
pub async fn run<C, R, T, S>(
    config: &RunnerConfig,
    candidates: Vec<Candidate>,
    client: &mut C,
    tester: &ServerTester<R, T>,
    sink: &mut S,
    cancel: Arc<AtomicBool>,
) -> RunOutcome
where
    C: VpnClient,
    R: RouteProbe,
    T: ThroughputProbe,
    S: ResultSink,
{
    let profile = calibrate(&config.calibration, &candidates, client).await;
    if !profile.is_calibrated() {
        info!("Proceeding with the default connect timeout for every continent");
    }

    let mut selector = AdaptiveSelector::new(candidates, config.selector.clone());
    selector.finish_calibration();

    let mut results = Vec::new();
    let mut interrupted = false;

    loop {
        if cancel.load(Ordering::SeqCst) {
            info!("Interrupted; stopping before the next server");
            interrupted = true;
            break;
        }

        let Some(candidate) = selector.next_candidate() else { break };

        let connect_timeout = profile.timeout_for(candidate.location.continent);
        let result = tester.test(client, &candidate, connect_timeout).await;

        if let Err(err) = sink.record(&result) {
            warn!("Could not persist result for {}: {}", result.hostname, err);
        }

        selector.record(&result);
        results.push(result);
    }

    if selector.is_degraded() {
        warn!(
            "Stopped with {} viable server(s), below the target of {}",
            selector.viability().viable(),
            config.selector.min_viable
        );
    }

    let report = RunReport::from_results(
        &results,
        config.selector.min_download_mbps,
        config.selector.min_viable,
    );
    let ranking = scoring::rank(&results, &config.weights, config.top);

    info!(
        "Run finished: {} tested, {} succeeded, {} viable{}",
        report.attempts,
        report.successes,
        report.viable,
        if interrupted { " (interrupted)" } else { "" }
    );

    RunOutcome { results, report, ranking, interrupted }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::{Coordinate, Protocol, ServerLocation};
    use crate::locations::Continent;
    use crate::tester::TesterConfig;
    use crate::vpn::{
        ConnectError, ConnectionInfo, MeasureError, ProbeError, RouteMetrics, Throughput,
    };
    use std::collections::HashSet;
    use std::time::Duration;

    fn candidate(hostname: &str, continent: Continent, distance_km: f64) -> Candidate {
        Candidate {
            location: ServerLocation {
                hostname: hostname.to_string(),
                city: "Test".to_string(),
                country: "Test".to_string(),
                protocol: Protocol::WireGuard,
                coordinate: Coordinate::new(0.0, 0.0),
                continent,
            },
            distance_km,
        }
    }

    /// Connects instantly to every hostname except those in `refuse`.
    struct FakeClient {
        refuse: HashSet<String>,
        connects: usize,
        disconnects: usize,
    }

    impl FakeClient {
        fn new(refuse: &[&str]) -> Self {
            Self {
                refuse: refuse.iter().map(|s| s.to_string()).collect(),
                connects: 0,
                disconnects: 0,
            }
        }
    }

    impl VpnClient for FakeClient {
        async fn connect(&mut self, hostname: &str, _protocol: Protocol) -> Result<(), ConnectError> {
            self.connects += 1;
            if self.refuse.contains(hostname) {
                Err(ConnectError(format!("refused: {}", hostname)))
            } else {
                Ok(())
            }
        }

        async fn disconnect(&mut self) {
            self.disconnects += 1;
        }

        async fn status(&self) -> ConnectionInfo {
            ConnectionInfo { connected: false, server: None }
        }
    }

    struct FakeRoute;

    impl RouteProbe for FakeRoute {
        async fn probe(&self, _target: &str) -> Result<RouteMetrics, ProbeError> {
            Ok(RouteMetrics { latency_ms: 20.0, jitter_ms: 1.0, packet_loss_pct: 0.0 })
        }
    }

    struct FakeThroughput {
        download_mbps: f64,
    }

    impl ThroughputProbe for FakeThroughput {
        async fn measure(&self) -> Result<Throughput, MeasureError> {
            Ok(Throughput { download_mbps: self.download_mbps, upload_mbps: 10.0 })
        }
    }

    struct MemorySink {
        recorded: Vec<TestResult>,
    }

    impl ResultSink for MemorySink {
        fn record(&mut self, result: &TestResult) -> std::io::Result<()> {
            self.recorded.push(result.clone());
            Ok(())
        }

        fn load_history(&self) -> std::io::Result<Vec<TestResult>> {
            Ok(self.recorded.clone())
        }
    }

    fn runner_config(min_viable: usize) -> RunnerConfig {
        RunnerConfig {
            selector: SelectorConfig { min_viable, ..SelectorConfig::default() },
            calibration: CalibrationConfig {
                max_probes: 1,
                default_timeout: Duration::from_secs(5),
                ..CalibrationConfig::default()
            },
            weights: ScoreWeights::default(),
            top: 10,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_once_enough_viable_servers() {
        let candidates = vec![
            candidate("a", Continent::Europe, 10.0),
            candidate("b", Continent::Europe, 500.0),
            candidate("c", Continent::Asia, 9000.0),
        ];
        let mut client = FakeClient::new(&[]);
        let tester =
            ServerTester::new(FakeRoute, FakeThroughput { download_mbps: 50.0 }, TesterConfig::default());
        let mut sink = MemorySink { recorded: Vec::new() };

        let outcome = run(
            &runner_config(1),
            candidates,
            &mut client,
            &tester,
            &mut sink,
            Arc::new(AtomicBool::new(false)),
        )
        .await;

        assert!(!outcome.interrupted);
        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.results[0].hostname, "a");
        assert!(!outcome.report.degraded);
        assert_eq!(sink.recorded.len(), 1);
        // One calibration probe plus one test cycle, each with a disconnect.
        assert_eq!(client.connects, 2);
        assert_eq!(client.disconnects, 2);
        assert_eq!(outcome.ranking.composite.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_persists_failures_and_reports_degraded() {
        let candidates = vec![
            candidate("a", Continent::Europe, 10.0),
            candidate("b", Continent::Asia, 9000.0),
        ];
        let mut client = FakeClient::new(&["a", "b"]);
        let tester =
            ServerTester::new(FakeRoute, FakeThroughput { download_mbps: 50.0 }, TesterConfig::default());
        let mut sink = MemorySink { recorded: Vec::new() };

        let outcome = run(
            &runner_config(1),
            candidates,
            &mut client,
            &tester,
            &mut sink,
            Arc::new(AtomicBool::new(false)),
        )
        .await;

        assert_eq!(outcome.results.len(), 2);
        assert!(outcome.results.iter().all(|r| !r.succeeded));
        assert!(outcome.report.degraded);
        assert_eq!(sink.recorded.len(), 2);
        assert!(outcome.ranking.composite.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_before_first_cycle_keeps_partial_output() {
        let candidates = vec![
            candidate("a", Continent::Europe, 10.0),
            candidate("b", Continent::Europe, 500.0),
        ];
        let mut client = FakeClient::new(&[]);
        let tester =
            ServerTester::new(FakeRoute, FakeThroughput { download_mbps: 50.0 }, TesterConfig::default());
        let mut sink = MemorySink { recorded: Vec::new() };

        let outcome = run(
            &runner_config(5),
            candidates,
            &mut client,
            &tester,
            &mut sink,
            Arc::new(AtomicBool::new(true)),
        )
        .await;

        assert!(outcome.interrupted);
        assert!(outcome.results.is_empty());
        // Calibration still ran, and its tunnel was torn down.
        assert_eq!(client.connects, 1);
        assert_eq!(client.disconnects, 1);
    }
}
