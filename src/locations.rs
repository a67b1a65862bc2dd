//! Static coordinate database for known relay locations.
//!
//! Relay list output from the VPN client has carried incorrect coordinates
//! in the past, so distances are computed from this curated table instead.
//! Each entry also carries the continent used by the adaptive selector when
//! it expands the search for geographic diversity.

use serde::{Deserialize, Serialize};

use crate::geo::Coordinate;

/// Continents used for calibration probes and search expansion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Continent {
    Africa,
    Asia,
    Europe,
    NorthAmerica,
    Oceania,
    SouthAmerica,
}

impl Continent {
    pub fn name(&self) -> &'static str {
        match self {
            Continent::Africa => "Africa",
            Continent::Asia => "Asia",
            Continent::Europe => "Europe",
            Continent::NorthAmerica => "North America",
            Continent::Oceania => "Oceania",
            Continent::SouthAmerica => "South America",
        }
    }
}

impl std::fmt::Display for Continent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One known relay location: `"City, Country"` key, coordinates, continent.
type Entry = (&'static str, f64, f64, Continent);

#[rustfmt::skip]
static COORDINATES: &[Entry] = &[
    // Oceania
    ("Perth, Australia", -31.9535, 115.8571, Continent::Oceania),
    ("Sydney, Australia", -33.8688, 151.2093, Continent::Oceania),
    ("Melbourne, Australia", -37.8136, 144.9631, Continent::Oceania),
    ("Brisbane, Australia", -27.4698, 153.0251, Continent::Oceania),
    ("Adelaide, Australia", -34.9285, 138.6007, Continent::Oceania),
    ("Auckland, New Zealand", -36.8509, 174.7645, Continent::Oceania),

    // North America
    ("Calgary, Canada", 51.0447, -114.0719, Continent::NorthAmerica),
    ("Montreal, Canada", 45.5017, -73.5673, Continent::NorthAmerica),
    ("Toronto, Canada", 43.6532, -79.3832, Continent::NorthAmerica),
    ("Vancouver, Canada", 49.2827, -123.1207, Continent::NorthAmerica),
    ("New York, NY, USA", 40.7128, -74.0060, Continent::NorthAmerica),
    ("Los Angeles, CA, USA", 34.0522, -118.2437, Continent::NorthAmerica),
    ("Chicago, IL, USA", 41.8781, -87.6298, Continent::NorthAmerica),
    ("Dallas, TX, USA", 32.7767, -96.7970, Continent::NorthAmerica),
    ("Seattle, WA, USA", 47.6062, -122.3321, Continent::NorthAmerica),
    ("Miami, FL, USA", 25.7617, -80.1918, Continent::NorthAmerica),
    ("Atlanta, GA, USA", 33.7490, -84.3880, Continent::NorthAmerica),
    ("Phoenix, AZ, USA", 33.4484, -112.0740, Continent::NorthAmerica),
    ("Denver, CO, USA", 39.7392, -104.9903, Continent::NorthAmerica),
    ("Salt Lake City, UT, USA", 40.7608, -111.8910, Continent::NorthAmerica),
    ("Raleigh, NC, USA", 35.7796, -78.6382, Continent::NorthAmerica),
    ("San Jose, CA, USA", 37.3382, -121.8863, Continent::NorthAmerica),
    ("McAllen, TX, USA", 26.2034, -98.2300, Continent::NorthAmerica),
    ("Boston, MA, USA", 42.3601, -71.0589, Continent::NorthAmerica),
    ("Houston, TX, USA", 29.7604, -95.3698, Continent::NorthAmerica),
    ("Detroit, MI, USA", 42.3314, -83.0458, Continent::NorthAmerica),
    ("Ashburn, VA, USA", 39.0438, -77.4874, Continent::NorthAmerica),
    ("Washington DC, USA", 38.9072, -77.0369, Continent::NorthAmerica),
    ("Secaucus, NJ, USA", 40.7895, -74.0565, Continent::NorthAmerica),
    ("Queretaro, Mexico", 20.5881, -100.3889, Continent::NorthAmerica),

    // Europe
    ("London, UK", 51.5074, -0.1278, Continent::Europe),
    ("Manchester, UK", 53.4808, -2.2426, Continent::Europe),
    ("Glasgow, UK", 55.8642, -4.2518, Continent::Europe),
    ("Amsterdam, Netherlands", 52.3676, 4.9041, Continent::Europe),
    ("Paris, France", 48.8566, 2.3522, Continent::Europe),
    ("Bordeaux, France", 44.8378, -0.5792, Continent::Europe),
    ("Marseille, France", 43.2965, 5.3698, Continent::Europe),
    ("Frankfurt, Germany", 50.1109, 8.6821, Continent::Europe),
    ("Berlin, Germany", 52.5200, 13.4050, Continent::Europe),
    ("Brussels, Belgium", 50.8503, 4.3517, Continent::Europe),
    ("Copenhagen, Denmark", 55.6761, 12.5683, Continent::Europe),
    ("Dusseldorf, Germany", 51.2277, 6.7735, Continent::Europe),
    ("Stockholm, Sweden", 59.3293, 18.0686, Continent::Europe),
    ("Gothenburg, Sweden", 57.7089, 11.9746, Continent::Europe),
    ("Oslo, Norway", 59.9139, 10.7522, Continent::Europe),
    ("Helsinki, Finland", 60.1699, 24.9384, Continent::Europe),
    ("Zurich, Switzerland", 47.3769, 8.5417, Continent::Europe),
    ("Vienna, Austria", 48.2082, 16.3738, Continent::Europe),
    ("Madrid, Spain", 40.4168, -3.7038, Continent::Europe),
    ("Barcelona, Spain", 41.3851, 2.1734, Continent::Europe),
    ("Valencia, Spain", 39.4699, -0.3763, Continent::Europe),
    ("Rome, Italy", 41.9028, 12.4964, Continent::Europe),
    ("Milan, Italy", 45.4642, 9.1900, Continent::Europe),
    ("Palermo, Italy", 38.1157, 13.3615, Continent::Europe),
    ("Warsaw, Poland", 52.2297, 21.0122, Continent::Europe),
    ("Prague, Czech Republic", 50.0755, 14.4378, Continent::Europe),
    ("Budapest, Hungary", 47.4979, 19.0402, Continent::Europe),
    ("Bucharest, Romania", 44.4268, 26.1025, Continent::Europe),
    ("Sofia, Bulgaria", 42.6977, 23.3219, Continent::Europe),
    ("Athens, Greece", 37.9838, 23.7275, Continent::Europe),
    ("Tirana, Albania", 41.3275, 19.8187, Continent::Europe),
    ("Stavanger, Norway", 58.9690, 5.7331, Continent::Europe),
    ("Dublin, Ireland", 53.3498, -6.2603, Continent::Europe),
    ("Lisbon, Portugal", 38.7223, -9.1393, Continent::Europe),
    ("Zagreb, Croatia", 45.8150, 15.9819, Continent::Europe),
    ("Belgrade, Serbia", 44.7866, 20.4489, Continent::Europe),
    ("Ljubljana, Slovenia", 46.0569, 14.5058, Continent::Europe),
    ("Bratislava, Slovakia", 48.1486, 17.1077, Continent::Europe),
    ("Tallinn, Estonia", 59.4370, 24.7536, Continent::Europe),
    ("Nicosia, Cyprus", 35.1856, 33.3823, Continent::Europe),
    ("Istanbul, Turkey", 41.0082, 28.9784, Continent::Europe),
    ("Kyiv, Ukraine", 50.4501, 30.5234, Continent::Europe),

    // Asia
    ("Tokyo, Japan", 35.6762, 139.6503, Continent::Asia),
    ("Osaka, Japan", 34.6937, 135.5023, Continent::Asia),
    ("Singapore, Singapore", 1.3521, 103.8198, Continent::Asia),
    ("Hong Kong, Hong Kong", 22.3193, 114.1694, Continent::Asia),
    ("Seoul, South Korea", 37.5665, 126.9780, Continent::Asia),
    ("Taipei, Taiwan", 25.0330, 121.5654, Continent::Asia),
    ("Bangkok, Thailand", 13.7563, 100.5018, Continent::Asia),
    ("Jakarta, Indonesia", -6.2088, 106.8456, Continent::Asia),
    ("Kuala Lumpur, Malaysia", 3.1390, 101.6869, Continent::Asia),
    ("Manila, Philippines", 14.5995, 120.9842, Continent::Asia),
    ("Tel Aviv, Israel", 32.0853, 34.7818, Continent::Asia),
    ("Lijiang, China", 26.8721, 100.2299, Continent::Asia),

    // South America
    ("Sao Paulo, Brazil", -23.5505, -46.6333, Continent::SouthAmerica),
    ("Santiago, Chile", -33.4489, -70.6693, Continent::SouthAmerica),
    ("Bogota, Colombia", 4.7110, -74.0721, Continent::SouthAmerica),
    ("Lima, Peru", -12.0464, -77.0428, Continent::SouthAmerica),

    // Africa
    ("Lagos, Nigeria", 6.5244, 3.3792, Continent::Africa),
    ("Johannesburg, South Africa", -26.2041, 28.0473, Continent::Africa),
];

/// Look up coordinates and continent for a city/country pair.
///
/// Returns `None` for locations not in the table; callers skip such relays
/// rather than guessing a position for them.
pub fn lookup(city: &str, country: &str) -> Option<(Coordinate, Continent)> {
    let key = format!("{}, {}", city, country);
    COORDINATES
        .iter()
        .find(|(name, _, _, _)| *name == key)
        .map(|&(_, lat, lon, continent)| (Coordinate::new(lat, lon), continent))
}

/// Look up a reference location string against the table directly.
///
/// Accepts the same `"City, Country"` form as [`lookup`], matched
/// case-insensitively, so common reference points resolve without a network
/// round trip to the geocoder.
pub fn lookup_reference(location: &str) -> Option<Coordinate> {
    let wanted = location.trim().to_lowercase();
    COORDINATES
        .iter()
        .find(|(name, _, _, _)| name.to_lowercase() == wanted)
        .map(|&(_, lat, lon, _)| Coordinate::new(lat, lon))
}
