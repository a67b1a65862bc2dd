//! Server geography: coordinates, great-circle distance, proximity ranking.

use serde::{Deserialize, Serialize};

use crate::locations::Continent;

/// Mean Earth radius in kilometers, used by the haversine formula.
const EARTH_RADIUS_KM: f64 = 6371.0;

/// A latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

impl std::fmt::Display for Coordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.4}, {:.4})", self.lat, self.lon)
    }
}

/// VPN tunnel protocol offered by a relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    WireGuard,
    OpenVpn,
}

impl Protocol {
    pub fn name(&self) -> &'static str {
        match self {
            Protocol::WireGuard => "WireGuard",
            Protocol::OpenVpn => "OpenVPN",
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Immutable reference data for one relay, built once at startup from the
/// relay list and the coordinate database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerLocation {
    /// Relay hostname, e.g. `de-ber-wg-001`.
    pub hostname: String,
    pub city: String,
    pub country: String,
    pub protocol: Protocol,
    pub coordinate: Coordinate,
    pub continent: Continent,
}

/// A [`ServerLocation`] plus its computed distance from the reference point.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub location: ServerLocation,
    pub distance_km: f64,
}

/// Great-circle distance between two coordinates in kilometers (haversine).
pub fn distance_km(a: Coordinate, b: Coordinate) -> f64 {
    let lat_a = a.lat.to_radians();
    let lat_b = b.lat.to_radians();
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lon = (b.lon - a.lon).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat_a.cos() * lat_b.cos() * (d_lon / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}

/// Rank all known servers by ascending distance from the reference point.
///
/// The sort is stable: servers at equal distance keep their relay-list
/// order.
pub fn rank_by_distance(reference: Coordinate, servers: &[ServerLocation]) -> Vec<Candidate> {
    let mut candidates: Vec<Candidate> = servers
        .iter()
        .map(|location| Candidate {
            location: location.clone(),
            distance_km: distance_km(reference, location.coordinate),
        })
        .collect();

    candidates.sort_by(|a, b| {
        a.distance_km.partial_cmp(&b.distance_km).unwrap_or(std::cmp::Ordering::Equal)
    });

    candidates
}
