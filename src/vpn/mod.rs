//! External collaborator interfaces.
//!
//! Everything the pipeline needs from the outside world goes through one of
//! these traits: the VPN client CLI, the route-quality probe, the throughput
//! probe, the geocoder, and the result sink. Adapters shell out to the real
//! tools; tests substitute in-memory fakes. A raw subprocess exit status
//! never crosses this boundary, only the typed errors below.

pub mod geocoder;
pub mod mullvad;
pub mod probes;
pub mod sink;

use std::fmt;

use crate::geo::{Coordinate, Protocol};
use crate::results::TestResult;

/// Connection state reported by the VPN client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub connected: bool,
    /// Hostname of the connected relay, when the client reports one.
    pub server: Option<String>,
}

/// Latency, jitter, and loss from the route-quality probe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RouteMetrics {
    pub latency_ms: f64,
    pub jitter_ms: f64,
    pub packet_loss_pct: f64,
}

/// Download and upload throughput in Mbps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Throughput {
    pub download_mbps: f64,
    pub upload_mbps: f64,
}

macro_rules! collaborator_error {
    ($name:ident, $label:literal) => {
        #[derive(Debug, Clone, PartialEq, Eq)]
        pub struct $name(pub String);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($label, ": {}"), self.0)
            }
        }

        impl std::error::Error for $name {}
    };
}

collaborator_error!(ConnectError, "connect failed");
collaborator_error!(ProbeError, "route probe failed");
collaborator_error!(MeasureError, "throughput measurement failed");

/// The external VPN client (connect, disconnect, status).
pub trait VpnClient {
    /// Connect to the given relay. Returns once the tunnel is up; callers
    /// enforce the timeout budget around this.
    async fn connect(&mut self, hostname: &str, protocol: Protocol) -> Result<(), ConnectError>;

    /// Tear down the tunnel. Idempotent; safe when already disconnected.
    async fn disconnect(&mut self);

    /// Current connection state.
    async fn status(&self) -> ConnectionInfo;
}

/// Route-quality probe (latency, jitter, packet loss) toward a target host.
pub trait RouteProbe {
    async fn probe(&self, target: &str) -> Result<RouteMetrics, ProbeError>;
}

/// Throughput probe (download/upload) over the active tunnel.
pub trait ThroughputProbe {
    async fn measure(&self) -> Result<Throughput, MeasureError>;
}

/// Resolves a free-form location string to coordinates.
pub trait Geocoder {
    /// `None` means the location could not be resolved; the caller decides
    /// whether a fallback exists or the run must abort.
    async fn resolve(&self, location: &str) -> Option<Coordinate>;
}

/// Destination for completed test results.
pub trait ResultSink {
    fn record(&mut self, result: &TestResult) -> std::io::Result<()>;

    /// Read back results persisted by an earlier run.
    fn load_history(&self) -> std::io::Result<Vec<TestResult>>;
}
