//! One end-to-end test cycle for a single candidate.
//!
//! Sequence: connect (within the calibrated budget), route probe,
//! throughput measurement, disconnect. Disconnect is issued exactly once
//! per cycle on every path, including connect timeout, so a half-open
//! tunnel can never leak into the next candidate's test. A failed
//! measurement degrades the result instead of discarding it; partial data
//! still ranks.

use log::{info, warn};
use std::time::Duration;
use tokio::time::Instant;

use crate::geo::Candidate;
use crate::results::{FailureReason, TestResult};
use crate::vpn::{RouteProbe, ThroughputProbe, VpnClient};

/// Budgets and targets for the measurement sub-steps.
#[derive(Debug, Clone)]
pub struct TesterConfig {
    /// Target host for the route-quality probe.
    pub target_host: String,
    /// Budget for the route probe.
    pub probe_timeout: Duration,
    /// Budget for the throughput measurement.
    pub measure_timeout: Duration,
}

impl Default for TesterConfig {
    fn default() -> Self {
        Self {
            target_host: "8.8.8.8".to_string(),
            probe_timeout: Duration::from_secs(90),
            measure_timeout: Duration::from_secs(180),
        }
    }
}

/// Drives test cycles against the collaborator probes. The VPN client is
/// passed per call so calibration and testing can share it sequentially.
pub struct ServerTester<R, T> {
    route_probe: R,
    throughput_probe: T,
    config: TesterConfig,
}

impl<R: RouteProbe, T: ThroughputProbe> ServerTester<R, T> {
    pub fn new(route_probe: R, throughput_probe: T, config: TesterConfig) -> Self {
        Self { route_probe, throughput_probe, config }
    }

    /// Run one connect → measure → disconnect cycle.
    ///
    /// Never returns an error: every failure mode is folded into the
    /// returned [`TestResult`].
    pub async fn test<C: VpnClient>(
        &self,
        client: &mut C,
        candidate: &Candidate,
        connect_timeout: Duration,
    ) -> TestResult {
        info!(
            "Testing {} ({}, {}, {:.0} km)",
            candidate.location.hostname,
            candidate.location.city,
            candidate.location.country,
            candidate.distance_km
        );

        let mut result = TestResult::for_candidate(candidate);

        let started = Instant::now();
        let connected = tokio::time::timeout(
            connect_timeout,
            client.connect(&candidate.location.hostname, candidate.location.protocol),
        )
        .await;

        match connected {
            Ok(Ok(())) => {
                result.succeeded = true;
                result.connection_time_s = Some(started.elapsed().as_secs_f64());
                info!(
                    "Connected to {} in {:.2}s",
                    candidate.location.hostname,
                    started.elapsed().as_secs_f64()
                );

                self.measure(&mut result).await;
            }
            Ok(Err(error)) => {
                warn!("Connect to {} failed: {}", candidate.location.hostname, error);
                result.failure_reason = Some(FailureReason::ConnectError(error.0));
            }
            Err(_) => {
                warn!(
                    "Connect to {} timed out after {:.0}s",
                    candidate.location.hostname,
                    connect_timeout.as_secs_f64()
                );
                result.failure_reason = Some(FailureReason::ConnectTimeout);
            }
        }

        // The single disconnect per cycle, reached on every path above.
        client.disconnect().await;

        result
    }

    /// Run the measurement sub-steps over an established tunnel, degrading
    /// the result on sub-step failure. The first failure is recorded as the
    /// result's failure reason; `succeeded` stays true.
    async fn measure(&self, result: &mut TestResult) {
        let probed =
            tokio::time::timeout(self.config.probe_timeout, self.route_probe.probe(&self.config.target_host))
                .await;

        match probed {
            Ok(Ok(metrics)) => {
                result.latency_ms = Some(metrics.latency_ms);
                result.jitter_ms = Some(metrics.jitter_ms);
                result.packet_loss_pct = Some(metrics.packet_loss_pct);
            }
            Ok(Err(error)) => {
                warn!("Route probe failed on {}: {}", result.hostname, error);
                result.failure_reason.get_or_insert(FailureReason::ProbeError(error.0));
            }
            Err(_) => {
                warn!("Route probe timed out on {}", result.hostname);
                result.failure_reason.get_or_insert(FailureReason::ProbeError(format!(
                    "timed out after {:.0}s",
                    self.config.probe_timeout.as_secs_f64()
                )));
            }
        }

        let measured =
            tokio::time::timeout(self.config.measure_timeout, self.throughput_probe.measure()).await;

        match measured {
            Ok(Ok(throughput)) => {
                result.download_mbps = Some(throughput.download_mbps);
                result.upload_mbps = Some(throughput.upload_mbps);
                info!(
                    "{}: {:.2} Mbps down, {:.2} Mbps up",
                    result.hostname, throughput.download_mbps, throughput.upload_mbps
                );
            }
            Ok(Err(error)) => {
                warn!("Throughput measurement failed on {}: {}", result.hostname, error);
                result.failure_reason.get_or_insert(FailureReason::MeasureError(error.0));
            }
            Err(_) => {
                warn!("Throughput measurement timed out on {}", result.hostname);
                result.failure_reason.get_or_insert(FailureReason::MeasureError(format!(
                    "timed out after {:.0}s",
                    self.config.measure_timeout.as_secs_f64()
                )));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::{Coordinate, Protocol, ServerLocation};
    use crate::locations::Continent;
    use crate::vpn::{ConnectError, ConnectionInfo, MeasureError, ProbeError, RouteMetrics, Throughput};

    fn candidate() -> Candidate {
        Candidate {
            location: ServerLocation {
                hostname: "de-ber-wg-001".to_string(),
                city: "Berlin".to_string(),
                country: "Germany".to_string(),
                protocol: Protocol::WireGuard,
                coordinate: Coordinate::new(52.52, 13.405),
                continent: Continent::Europe,
            },
            distance_km: 10.0,
        }
    }

    /// Scripted behavior for one collaborator call.
    #[derive(Clone)]
    enum Behavior<T> {
        Succeed(T),
        Fail(String),
        Hang,
    }

    struct MockClient {
        connect: Behavior<Duration>,
        connects: usize,
        disconnects: usize,
    }

    impl MockClient {
        fn new(connect: Behavior<Duration>) -> Self {
            Self { connect, connects: 0, disconnects: 0 }
        }
    }

    impl VpnClient for MockClient {
        async fn connect(&mut self, _hostname: &str, _protocol: Protocol) -> Result<(), ConnectError> {
            self.connects += 1;
            match self.connect.clone() {
                Behavior::Succeed(delay) => {
                    tokio::time::sleep(delay).await;
                    Ok(())
                }
                Behavior::Fail(message) => Err(ConnectError(message)),
                Behavior::Hang => {
                    std::future::pending::<()>().await;
                    unreachable!()
                }
            }
        }

        async fn disconnect(&mut self) {
            self.disconnects += 1;
        }

        async fn status(&self) -> ConnectionInfo {
            ConnectionInfo { connected: false, server: None }
        }
    }

    struct MockRoute(Behavior<RouteMetrics>);

    impl RouteProbe for MockRoute {
        async fn probe(&self, _target: &str) -> Result<RouteMetrics, ProbeError> {
            match self.0.clone() {
                Behavior::Succeed(metrics) => Ok(metrics),
                Behavior::Fail(message) => Err(ProbeError(message)),
                Behavior::Hang => {
                    std::future::pending::<()>().await;
                    unreachable!()
                }
            }
        }
    }

    struct MockThroughput(Behavior<Throughput>);

    impl ThroughputProbe for MockThroughput {
        async fn measure(&self) -> Result<Throughput, MeasureError> {
            match self.0.clone() {
                Behavior::Succeed(throughput) => Ok(throughput),
                Behavior::Fail(message) => Err(MeasureError(message)),
                Behavior::Hang => {
                    std::future::pending::<()>().await;
                    unreachable!()
                }
            }
        }
    }

    fn metrics() -> RouteMetrics {
        RouteMetrics { latency_ms: 25.0, jitter_ms: 2.5, packet_loss_pct: 0.0 }
    }

    fn throughput() -> Throughput {
        Throughput { download_mbps: 52.5, upload_mbps: 21.0 }
    }

    fn tester(route: Behavior<RouteMetrics>, thr: Behavior<Throughput>) -> ServerTester<MockRoute, MockThroughput> {
        ServerTester::new(MockRoute(route), MockThroughput(thr), TesterConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_cycle_success() {
        let tester = tester(Behavior::Succeed(metrics()), Behavior::Succeed(throughput()));
        let mut client = MockClient::new(Behavior::Succeed(Duration::from_secs(3)));

        let result = tester.test(&mut client, &candidate(), Duration::from_secs(60)).await;

        assert!(result.succeeded);
        assert!(result.failure_reason.is_none());
        assert!((result.connection_time_s.unwrap() - 3.0).abs() < 0.1);
        assert_eq!(result.latency_ms, Some(25.0));
        assert_eq!(result.jitter_ms, Some(2.5));
        assert_eq!(result.download_mbps, Some(52.5));
        assert_eq!(result.upload_mbps, Some(21.0));
        assert_eq!(client.connects, 1);
        assert_eq!(client.disconnects, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_timeout_returns_immediately_without_metrics() {
        let tester = tester(Behavior::Succeed(metrics()), Behavior::Succeed(throughput()));
        let mut client = MockClient::new(Behavior::Hang);

        let result = tester.test(&mut client, &candidate(), Duration::from_secs(5)).await;

        assert!(!result.succeeded);
        assert_eq!(result.failure_reason, Some(FailureReason::ConnectTimeout));
        assert!(result.connection_time_s.is_none());
        assert!(result.latency_ms.is_none());
        assert!(result.download_mbps.is_none());
        // Cleanup is guaranteed even on the timeout path.
        assert_eq!(client.disconnects, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_error_recorded() {
        let tester = tester(Behavior::Succeed(metrics()), Behavior::Succeed(throughput()));
        let mut client = MockClient::new(Behavior::Fail("relay rejected".to_string()));

        let result = tester.test(&mut client, &candidate(), Duration::from_secs(60)).await;

        assert!(!result.succeeded);
        assert_eq!(
            result.failure_reason,
            Some(FailureReason::ConnectError("relay rejected".to_string()))
        );
        assert_eq!(client.disconnects, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_failure_degrades_but_keeps_success() {
        let tester = tester(Behavior::Fail("mtr crashed".to_string()), Behavior::Succeed(throughput()));
        let mut client = MockClient::new(Behavior::Succeed(Duration::from_secs(1)));

        let result = tester.test(&mut client, &candidate(), Duration::from_secs(60)).await;

        assert!(result.succeeded);
        assert!(result.latency_ms.is_none());
        assert!(result.packet_loss_pct.is_none());
        // Throughput still measured after the probe failed.
        assert_eq!(result.download_mbps, Some(52.5));
        assert_eq!(result.failure_reason, Some(FailureReason::ProbeError("mtr crashed".to_string())));
        assert_eq!(client.disconnects, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_measure_failure_degrades_but_keeps_success() {
        let tester = tester(Behavior::Succeed(metrics()), Behavior::Fail("speedtest died".to_string()));
        let mut client = MockClient::new(Behavior::Succeed(Duration::from_secs(1)));

        let result = tester.test(&mut client, &candidate(), Duration::from_secs(60)).await;

        assert!(result.succeeded);
        assert_eq!(result.latency_ms, Some(25.0));
        assert!(result.download_mbps.is_none());
        assert!(result.upload_mbps.is_none());
        assert_eq!(
            result.failure_reason,
            Some(FailureReason::MeasureError("speedtest died".to_string()))
        );
        assert_eq!(client.disconnects, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_probe_hits_its_own_budget() {
        let tester = tester(Behavior::Hang, Behavior::Succeed(throughput()));
        let mut client = MockClient::new(Behavior::Succeed(Duration::from_secs(1)));

        let result = tester.test(&mut client, &candidate(), Duration::from_secs(60)).await;

        assert!(result.succeeded);
        assert!(matches!(result.failure_reason, Some(FailureReason::ProbeError(_))));
        assert_eq!(result.download_mbps, Some(52.5));
        assert_eq!(client.disconnects, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_failure_wins_as_reason() {
        let tester = tester(
            Behavior::Fail("probe down".to_string()),
            Behavior::Fail("measure down".to_string()),
        );
        let mut client = MockClient::new(Behavior::Succeed(Duration::from_secs(1)));

        let result = tester.test(&mut client, &candidate(), Duration::from_secs(60)).await;

        assert_eq!(result.failure_reason, Some(FailureReason::ProbeError("probe down".to_string())));
    }
}
