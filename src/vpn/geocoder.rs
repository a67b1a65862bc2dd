//! Reference-location geocoding via the Nominatim search API.
//!
//! Used only to resolve the operator-supplied reference location when it is
//! not already in the built-in coordinate database. A failure here is not
//! fatal by itself; the caller falls back to `--default-lat/--default-lon`
//! if supplied.

use log::{debug, warn};
use serde::Deserialize;

use crate::geo::Coordinate;
use crate::vpn::Geocoder;

const ENDPOINT: &str = "https://nominatim.openstreetmap.org/search";

/// Nominatim geocoder client.
pub struct Nominatim {
    client: reqwest::Client,
}

impl Nominatim {
    pub fn new() -> Self {
        Self { client: reqwest::Client::new() }
    }
}

impl Default for Nominatim {
    fn default() -> Self {
        Self::new()
    }
}

/// One search hit; Nominatim serializes coordinates as strings.
#[derive(Debug, Deserialize)]
struct Place {
    lat: String,
    lon: String,
    #[serde(default)]
    display_name: String,
}

impl Place {
    fn coordinate(&self) -> Option<Coordinate> {
        let lat = self.lat.parse::<f64>().ok()?;
        let lon = self.lon.parse::<f64>().ok()?;
        Some(Coordinate::new(lat, lon))
    }
}

impl Geocoder for Nominatim {
    async fn resolve(&self, location: &str) -> Option<Coordinate> {
        let response = self
            .client
            .get(ENDPOINT)
            .query(&[("q", location), ("format", "json"), ("limit", "1")])
            .header(reqwest::header::USER_AGENT, concat!("tunnelrank/", env!("CARGO_PKG_VERSION")))
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(error) => {
                warn!("Geocoding request for \"{}\" failed: {}", location, error);
                return None;
            }
        };

        let places: Vec<Place> = match response.json().await {
            Ok(places) => places,
            Err(error) => {
                warn!("Geocoding response for \"{}\" unreadable: {}", location, error);
                return None;
            }
        };

        let place = places.first()?;
        let coordinate = place.coordinate()?;
        debug!("Resolved \"{}\" to {} ({})", location, coordinate, place.display_name);
        Some(coordinate)
    }
}
