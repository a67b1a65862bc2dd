//! Adapter for the Mullvad CLI.
//!
//! Shells out to `mullvad` for the relay list, connection control, and
//! status. Relay coordinates come from the built-in database in
//! [`crate::locations`], not from the CLI output. Relays whose city is
//! unknown to that database are skipped: they could never be drawn by the
//! proximity ranking anyway.

use log::{debug, info, warn};
use std::time::Duration;
use tokio::process::Command;

use crate::errors::RunError;
use crate::geo::{Protocol, ServerLocation};
use crate::locations;
use crate::vpn::{ConnectError, ConnectionInfo, VpnClient};

/// How often connection establishment is polled via `mullvad status`.
const STATUS_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Mullvad CLI wrapper. One instance drives the single host tunnel, so
/// connects are strictly sequential by construction.
pub struct MullvadCli {
    program: String,
}

impl MullvadCli {
    pub fn new() -> Self {
        Self { program: "mullvad".to_string() }
    }

    /// Fetch and parse the relay list, filtered to the requested protocol.
    pub async fn fetch_relay_list(&self, protocol: Protocol) -> Result<Vec<ServerLocation>, RunError> {
        info!("Fetching relay list...");
        let output = run_command(&self.program, &["relay", "list"]).await.map_err(|e| {
            RunError::missing_tool("mullvad", "Install the Mullvad app and make sure the CLI is on PATH.")
                .with_source(std::io::Error::other(e))
        })?;

        let servers: Vec<ServerLocation> = parse_relay_list(&output)
            .into_iter()
            .filter(|server| server.protocol == protocol)
            .collect();

        info!("Found {} {} relays with known coordinates", servers.len(), protocol);
        Ok(servers)
    }
}

impl Default for MullvadCli {
    fn default() -> Self {
        Self::new()
    }
}

impl VpnClient for MullvadCli {
    async fn connect(&mut self, hostname: &str, protocol: Protocol) -> Result<(), ConnectError> {
        debug!("Selecting relay {} ({})", hostname, protocol);
        run_command(&self.program, &["relay", "set", "location", hostname])
            .await
            .map_err(ConnectError)?;

        run_command(&self.program, &["connect"]).await.map_err(ConnectError)?;

        // Poll until the tunnel is up. The caller wraps this future in its
        // timeout budget, so the loop itself has no exit condition beyond
        // success.
        loop {
            tokio::time::sleep(STATUS_POLL_INTERVAL).await;
            let status = self.status().await;
            if status.connected {
                if let Some(server) = status.server {
                    debug!("Tunnel up on {}", server);
                }
                return Ok(());
            }
        }
    }

    async fn disconnect(&mut self) {
        if let Err(error) = run_command(&self.program, &["disconnect"]).await {
            // Already-disconnected is fine; anything else is logged and the
            // next cycle's connect will surface a real problem.
            warn!("mullvad disconnect: {}", error);
        }
    }

    async fn status(&self) -> ConnectionInfo {
        match run_command(&self.program, &["status"]).await {
            Ok(output) => parse_status(&output),
            Err(error) => {
                warn!("mullvad status: {}", error);
                ConnectionInfo { connected: false, server: None }
            }
        }
    }
}

/// Run an external command, mapping non-zero exit or spawn failure to a
/// message. Collaborator traits re-wrap this into their typed errors.
pub(crate) async fn run_command(program: &str, args: &[&str]) -> Result<String, String> {
    let output = Command::new(program)
        .args(args)
        .output()
        .await
        .map_err(|e| format!("failed to run {}: {}", program, e))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!("{} {} exited with {}: {}", program, args.join(" "), output.status, stderr.trim()));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Check that a required external tool responds to `--version`.
pub async fn check_tool(program: &str, install_hint: &str) -> Result<(), RunError> {
    match run_command(program, &["--version"]).await {
        Ok(_) => Ok(()),
        Err(error) => Err(RunError::missing_tool(program, install_hint)
            .with_source(std::io::Error::other(error))),
    }
}

/// Parse `mullvad relay list` output.
///
/// The format is indentation-structured:
/// ```text
/// Germany (de)
///     Berlin (ber) @ 52.52000°N, 13.40500°E
///         de-ber-wg-001 (1.2.3.4) - WireGuard, hosted by X (rented)
/// ```
fn parse_relay_list(output: &str) -> Vec<ServerLocation> {
    let mut servers = Vec::new();
    let mut country = String::new();
    let mut city: Option<(String, crate::geo::Coordinate, locations::Continent)> = None;

    for raw in output.lines() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        if !raw.starts_with([' ', '\t']) {
            // Country header: "Germany (de)".
            country = match line.rsplit_once(" (") {
                Some((name, _)) => name.trim().to_string(),
                None => line.to_string(),
            };
            city = None;
            continue;
        }

        if line.contains('@') {
            // City header: "Berlin (ber) @ 52.52000°N, 13.40500°E".
            let name = match line.split_once(" (") {
                Some((name, _)) => name.trim().to_string(),
                None => continue,
            };

            city = match locations::lookup(&name, &country) {
                Some((coordinate, continent)) => Some((name, coordinate, continent)),
                None => {
                    debug!("Skipping relays in {}, {}: not in coordinate database", name, country);
                    None
                }
            };
            continue;
        }

        // Server line; the hostname is the first token.
        let Some(hostname) = line.split_whitespace().next() else { continue };
        let protocol = if hostname.contains("-wg-") {
            Protocol::WireGuard
        } else if hostname.contains("-ovpn-") {
            Protocol::OpenVpn
        } else {
            continue;
        };

        if let Some((ref city_name, coordinate, continent)) = city {
            servers.push(ServerLocation {
                hostname: hostname.to_string(),
                city: city_name.clone(),
                country: country.clone(),
                protocol,
                coordinate,
                continent,
            });
        }
    }

    servers
}

/// Parse `mullvad status` output, e.g.
/// `Connected to de-ber-wg-001 in Berlin, Germany`.
fn parse_status(output: &str) -> ConnectionInfo {
    let line = output.trim();
    if !line.starts_with("Connected") {
        return ConnectionInfo { connected: false, server: None };
    }

    let server = line
        .strip_prefix("Connected to ")
        .and_then(|rest| rest.split_whitespace().next())
        .map(str::to_string);

    ConnectionInfo { connected: true, server }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
Australia (au)
\tSydney (syd) @ -33.86880°N, 151.20930°E
\t\tau-syd-wg-001 (103.1.2.3) - WireGuard, hosted by X (rented)
\t\tau-syd-ovpn-301 (103.1.2.4) - OpenVPN (rented)
Germany (de)
\tBerlin (ber) @ 52.52000°N, 13.40500°E
\t\tde-ber-wg-001 (185.1.2.3) - WireGuard (owned)
\t\tde-ber-wg-002 (185.1.2.4) - WireGuard (owned)
\tNowhere (nwh) @ 0.00000°N, 0.00000°E
\t\tde-nwh-wg-001 (185.9.9.9) - WireGuard (rented)
";

    #[test]
    fn test_parse_relay_list() {
        let servers = parse_relay_list(SAMPLE);

        // de-nwh is dropped: "Nowhere, Germany" is not in the database.
        assert_eq!(servers.len(), 4);

        let sydney = &servers[0];
        assert_eq!(sydney.hostname, "au-syd-wg-001");
        assert_eq!(sydney.city, "Sydney");
        assert_eq!(sydney.country, "Australia");
        assert_eq!(sydney.protocol, Protocol::WireGuard);
        assert!((sydney.coordinate.lat + 33.8688).abs() < 0.001);
        assert_eq!(sydney.continent, locations::Continent::Oceania);

        assert_eq!(servers[1].protocol, Protocol::OpenVpn);
        assert_eq!(servers[2].hostname, "de-ber-wg-001");
        assert_eq!(servers[3].hostname, "de-ber-wg-002");
    }

    #[test]
    fn test_parse_relay_list_empty() {
        assert!(parse_relay_list("").is_empty());
    }

    #[test]
    fn test_parse_status_connected() {
        let info = parse_status("Connected to de-ber-wg-001 in Berlin, Germany\n");
        assert!(info.connected);
        assert_eq!(info.server.as_deref(), Some("de-ber-wg-001"));
    }

    #[test]
    fn test_parse_status_disconnected() {
        let info = parse_status("Disconnected\n");
        assert!(!info.connected);
        assert!(info.server.is_none());
    }

    #[test]
    fn test_parse_status_connecting() {
        let info = parse_status("Connecting to de-ber-wg-001...\n");
        assert!(!info.connected);
    }
}
