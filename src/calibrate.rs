//! Connection-timeout calibration.
//!
//! Before the run proper, a small set of candidates spanning distinct
//! continents is connected once each to observe baseline tunnel
//! establishment time. Each probed continent then gets a timeout budget
//! scaled from its observation, so distant regions are not cut off by a
//! budget tuned for nearby ones. Calibration failing entirely is a
//! degradation, not an error: every continent falls back to the default.

use log::{debug, info, warn};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::time::Instant;

use crate::geo::Candidate;
use crate::locations::Continent;
use crate::vpn::VpnClient;

/// Tunables for calibration. The multiplier is deliberately configuration
/// rather than a constant; see `--timeout-multiplier`.
#[derive(Debug, Clone)]
pub struct CalibrationConfig {
    /// Maximum number of continents to probe.
    pub max_probes: usize,
    /// Safety multiplier applied to each observed connect time.
    pub timeout_multiplier: f64,
    /// Timeout for the calibration connects themselves, and the fallback
    /// budget for unprobed continents.
    pub default_timeout: Duration,
    /// Floor for calibrated budgets so a lucky fast probe cannot produce an
    /// unusably tight timeout.
    pub min_timeout: Duration,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            max_probes: 3,
            timeout_multiplier: 3.0,
            default_timeout: Duration::from_secs(60),
            min_timeout: Duration::from_secs(1),
        }
    }
}

/// Per-continent connect budgets derived from calibration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeoutProfile {
    default: Duration,
    per_continent: HashMap<Continent, Duration>,
}

impl TimeoutProfile {
    /// A profile that applies one budget everywhere.
    pub fn uniform(default: Duration) -> Self {
        Self { default, per_continent: HashMap::new() }
    }

    /// The connect budget for a candidate on the given continent.
    pub fn timeout_for(&self, continent: Continent) -> Duration {
        self.per_continent.get(&continent).copied().unwrap_or(self.default)
    }

    /// Whether any continent was actually calibrated.
    pub fn is_calibrated(&self) -> bool {
        !self.per_continent.is_empty()
    }
}

/// Pick calibration probes: the nearest untested candidate of each distinct
/// continent, in ascending distance order, up to `max_probes`.
fn select_probes(candidates: &[Candidate], max_probes: usize) -> Vec<&Candidate> {
    let mut seen: HashSet<Continent> = HashSet::new();
    let mut picked = Vec::new();

    for candidate in candidates {
        if picked.len() == max_probes {
            break;
        }
        if seen.insert(candidate.location.continent) {
            picked.push(candidate);
        }
    }

    picked
}

/// Run calibration against the proximity-ranked candidate list.
///
/// Probes are sequential, like everything else touching the tunnel, and
/// each probe disconnects before the next begins.
pub async fn calibrate<C: VpnClient>(
    config: &CalibrationConfig,
    candidates: &[Candidate],
    client: &mut C,
) -> TimeoutProfile {
    let probes = select_probes(candidates, config.max_probes);
    if probes.is_empty() {
        warn!("No candidates available for calibration; using the default timeout everywhere");
        return TimeoutProfile::uniform(config.default_timeout);
    }

    info!(
        "Calibrating connect timeouts against {} continent(s): {}",
        probes.len(),
        probes.iter().map(|p| p.location.continent.name()).collect::<Vec<_>>().join(", ")
    );

    let mut per_continent = HashMap::new();

    for probe in probes {
        let continent = probe.location.continent;
        let started = Instant::now();

        let connected = tokio::time::timeout(
            config.default_timeout,
            client.connect(&probe.location.hostname, probe.location.protocol),
        )
        .await;

        let observed = started.elapsed();
        client.disconnect().await;

        match connected {
            Ok(Ok(())) => {
                let scaled = observed.mul_f64(config.timeout_multiplier);
                let budget = scaled.clamp(config.min_timeout, config.default_timeout);
                debug!(
                    "{}: connected to {} in {:.2}s, budget {:.2}s",
                    continent,
                    probe.location.hostname,
                    observed.as_secs_f64(),
                    budget.as_secs_f64()
                );
                per_continent.insert(continent, budget);
            }
            Ok(Err(error)) => {
                warn!("Calibration probe to {} ({}) failed: {}", probe.location.hostname, continent, error);
            }
            Err(_) => {
                warn!(
                    "Calibration probe to {} ({}) timed out after {:.0}s",
                    probe.location.hostname,
                    continent,
                    config.default_timeout.as_secs_f64()
                );
            }
        }
    }

    if per_continent.is_empty() {
        warn!("All calibration probes failed; using the default timeout everywhere");
        return TimeoutProfile::uniform(config.default_timeout);
    }

    TimeoutProfile { default: config.default_timeout, per_continent }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::{Coordinate, Protocol, ServerLocation};
    use crate::vpn::{ConnectError, ConnectionInfo};
    use std::collections::HashMap as Map;

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

    /// Scripted VPN client: per-hostname connect behavior, disconnect count.
    struct ScriptedClient {
        /// hostname -> simulated connect duration, or None for failure.
        behavior: Map<String, Option<Duration>>,
        disconnects: usize,
    }

    impl VpnClient for ScriptedClient {
        async fn connect(&mut self, hostname: &str, _protocol: Protocol) -> Result<(), ConnectError> {
            match self.behavior.get(hostname).cloned().flatten() {
                Some(delay) => {
                    tokio::time::sleep(delay).await;
                    Ok(())
                }
                None => Err(ConnectError("scripted failure".to_string())),
            }
        }

        async fn disconnect(&mut self) {
            self.disconnects += 1;
        }

        async fn status(&self) -> ConnectionInfo {
            ConnectionInfo { connected: false, server: None }
        }
    }

    fn spread_candidates() -> Vec<Candidate> {
        vec![
            candidate("eu-1", Continent::Europe, 100.0),
            candidate("eu-2", Continent::Europe, 200.0),
            candidate("as-1", Continent::Asia, 7000.0),
            candidate("na-1", Continent::NorthAmerica, 9000.0),
            candidate("oc-1", Continent::Oceania, 15000.0),
        ]
    }

    #[test]
    fn test_select_probes_spans_distinct_continents() {
        let candidates = spread_candidates();
        let probes = select_probes(&candidates, 3);

        let hostnames: Vec<&str> =
            probes.iter().map(|p| p.location.hostname.as_str()).collect();
        // Nearest representative of each continent, never two from one.
        assert_eq!(hostnames, vec!["eu-1", "as-1", "na-1"]);
    }

    #[test]
    fn test_select_probes_limited_by_available_continents() {
        let candidates = vec![
            candidate("eu-1", Continent::Europe, 100.0),
            candidate("eu-2", Continent::Europe, 200.0),
        ];
        assert_eq!(select_probes(&candidates, 3).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_probes_failing_falls_back_to_default() {
        let config = CalibrationConfig::default();
        let mut client = ScriptedClient { behavior: Map::new(), disconnects: 0 };

        let profile = calibrate(&config, &spread_candidates(), &mut client).await;

        assert!(!profile.is_calibrated());
        assert_eq!(profile.timeout_for(Continent::Europe), config.default_timeout);
        assert_eq!(profile.timeout_for(Continent::Oceania), config.default_timeout);
        // One disconnect per probe even though every connect failed.
        assert_eq!(client.disconnects, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_observed_latency_scales_the_budget() {
        let config = CalibrationConfig::default();
        let mut behavior = Map::new();
        behavior.insert("eu-1".to_string(), Some(Duration::from_secs(2)));
        behavior.insert("as-1".to_string(), Some(Duration::from_secs(10)));
        behavior.insert("na-1".to_string(), None);
        let mut client = ScriptedClient { behavior, disconnects: 0 };

        let profile = calibrate(&config, &spread_candidates(), &mut client).await;

        assert!(profile.is_calibrated());
        assert_eq!(profile.timeout_for(Continent::Europe), Duration::from_secs(6));
        assert_eq!(profile.timeout_for(Continent::Asia), Duration::from_secs(30));
        // Unprobed and failed continents use the default.
        assert_eq!(profile.timeout_for(Continent::NorthAmerica), config.default_timeout);
        assert_eq!(profile.timeout_for(Continent::Oceania), config.default_timeout);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fast_probe_clamped_to_minimum() {
        let config = CalibrationConfig::default();
        let mut behavior = Map::new();
        behavior.insert("eu-1".to_string(), Some(Duration::from_millis(50)));
        let mut client = ScriptedClient { behavior, disconnects: 0 };

        let candidates = vec![candidate("eu-1", Continent::Europe, 100.0)];
        let profile = calibrate(&config, &candidates, &mut client).await;

        assert_eq!(profile.timeout_for(Continent::Europe), config.min_timeout);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_probe_times_out_and_still_disconnects() {
        let config = CalibrationConfig {
            default_timeout: Duration::from_secs(5),
            ..CalibrationConfig::default()
        };
        let mut behavior = Map::new();
        behavior.insert("eu-1".to_string(), Some(Duration::from_secs(30)));
        let mut client = ScriptedClient { behavior, disconnects: 0 };

        let candidates = vec![candidate("eu-1", Continent::Europe, 100.0)];
        let profile = calibrate(&config, &candidates, &mut client).await;

        assert!(!profile.is_calibrated());
        assert_eq!(client.disconnects, 1);
    }
}
