mod calibrate;
mod errors;
mod geo;
mod locations;
mod results;
mod runner;
mod scoring;
mod selector;
mod stats;
mod tester;
mod vpn;

use clap::Parser;
use clap_verbosity_flag::{InfoLevel, Verbosity};
use colored::Colorize;
use log::warn;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::calibrate::CalibrationConfig;
use crate::errors::{exit_codes, RunError};
use crate::geo::{rank_by_distance, Coordinate, Protocol};
use crate::results::RunReport;
use crate::runner::{run, RunOutcome, RunnerConfig};
use crate::scoring::{CompositeEntry, MetricEntry, ScoreWeights};
use crate::selector::SelectorConfig;
use crate::tester::{ServerTester, TesterConfig};
use crate::vpn::geocoder::Nominatim;
use crate::vpn::mullvad::{check_tool, MullvadCli};
use crate::vpn::probes::{MtrProbe, SpeedtestCli};
use crate::vpn::sink::{default_path, JsonlSink};
use crate::vpn::Geocoder;

/// Find the best VPN servers near you: rank Mullvad relays by distance,
/// connect to each in turn, and score them on speed, latency and
/// reliability.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Reference location to measure server distance from.
    #[arg(long, default_value = "Lijiang, Yunnan, China")]
    location: String,

    /// Fallback latitude when the location cannot be geocoded.
    #[arg(long, requires = "default_lon", allow_hyphen_values = true)]
    default_lat: Option<f64>,

    /// Fallback longitude when the location cannot be geocoded.
    #[arg(long, requires = "default_lat", allow_hyphen_values = true)]
    default_lon: Option<f64>,

    /// Tunnel protocol to test (wireguard or openvpn).
    #[arg(long, default_value = "wireguard", value_parser = parse_protocol)]
    protocol: Protocol,

    /// Attempt budget for the nearby-server phase.
    #[arg(long, default_value_t = 20)]
    max_servers: usize,

    /// Absolute cap on servers tested in one run.
    #[arg(long, default_value_t = 40)]
    hard_limit: usize,

    /// Only test nearby servers within this many kilometres.
    #[arg(long, value_name = "KM")]
    max_distance: Option<f64>,

    /// Minimum download speed (Mbps) for a server to count as viable.
    #[arg(long, default_value_t = 3.0)]
    min_download: f64,

    /// Stop once this many viable servers have been found.
    #[arg(long, default_value_t = 5)]
    min_viable: usize,

    /// Default connect budget in seconds, before calibration.
    #[arg(long, value_name = "SECS", default_value_t = 60)]
    connect_timeout: u64,

    /// Number of continents probed while calibrating connect timeouts.
    #[arg(long, default_value_t = 3)]
    calibration_probes: usize,

    /// Safety multiplier applied to calibrated connect times.
    #[arg(long, default_value_t = 3.0)]
    timeout_multiplier: f64,

    /// Target host for the route (mtr) probe.
    #[arg(long, default_value = "8.8.8.8")]
    target_host: String,

    /// Rows shown per ranking table.
    #[arg(long, default_value_t = 10)]
    top: usize,

    /// Results file path (defaults to tunnelrank_<timestamp>_<protocol>.jsonl).
    #[arg(long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Weight of download speed in the composite score.
    #[arg(long = "w-download", default_value_t = 0.35)]
    w_download: f64,

    /// Weight of upload speed in the composite score.
    #[arg(long = "w-upload", default_value_t = 0.15)]
    w_upload: f64,

    /// Weight of latency in the composite score.
    #[arg(long = "w-latency", default_value_t = 0.25)]
    w_latency: f64,

    /// Weight of connection time in the composite score.
    #[arg(long = "w-connect", default_value_t = 0.10)]
    w_connect: f64,

    /// Weight of packet loss in the composite score.
    #[arg(long = "w-reliability", default_value_t = 0.15)]
    w_reliability: f64,

    #[command(flatten)]
    verbosity: Verbosity<InfoLevel>,
}

fn parse_protocol(value: &str) -> Result<Protocol, String> {
    match value.to_lowercase().as_str() {
        "wireguard" => Ok(Protocol::WireGuard),
        "openvpn" => Ok(Protocol::OpenVpn),
        other => Err(format!("unknown protocol \"{}\" (expected wireguard or openvpn)", other)),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.verbosity.log_level_filter())
        .format_timestamp(None)
        .init();

    match benchmark(cli).await {
        Ok(code) => std::process::exit(code),
        Err(error) => {
            eprintln!("{} {}", "error:".bright_red().bold(), error);
            std::process::exit(error.exit_code());
        }
    }
}

async fn benchmark(cli: Cli) -> Result<i32, RunError> {
    let weights = ScoreWeights {
        download: cli.w_download,
        upload: cli.w_upload,
        latency: cli.w_latency,
        connection_time: cli.w_connect,
        reliability: cli.w_reliability,
    };
    weights.validate().map_err(RunError::config)?;

    check_tool("mullvad", "Install the Mullvad app and make sure its CLI is on PATH.").await?;
    check_tool("mtr", "Install mtr with your package manager (apt install mtr, brew install mtr).")
        .await?;
    check_tool("speedtest-cli", "Install speedtest-cli (pip install speedtest-cli).").await?;

    let reference = resolve_reference(&cli).await?;
    println!(
        "{} {} {}",
        "Reference:".bold().white(),
        cli.location.bright_blue(),
        format!("{}", reference).bright_blue()
    );

    let mullvad = MullvadCli::new();
    let servers = mullvad.fetch_relay_list(cli.protocol).await?;
    if servers.is_empty() {
        return Err(RunError::runtime(format!(
            "no {} relays with known coordinates were found in the relay list",
            cli.protocol
        )));
    }

    let candidates = rank_by_distance(reference, &servers);
    println!(
        "{} {} {} servers, nearest {}",
        "Candidates:".bold().white(),
        candidates.len().to_string().bright_blue(),
        cli.protocol.to_string().bright_blue(),
        format!("{:.0} km", candidates[0].distance_km).bright_blue()
    );

    let results_path = cli.output.clone().unwrap_or_else(|| default_path(cli.protocol));
    let mut sink = JsonlSink::create(results_path.as_path()).map_err(|error| {
        RunError::runtime(format!("could not create results file {}", results_path.display()))
            .with_source(error)
    })?;
    println!(
        "{} {}",
        "Results file:".bold().white(),
        sink.path().display().to_string().bright_blue()
    );

    let cancel = Arc::new(AtomicBool::new(false));
    let flag = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; finishing the current server before stopping");
            flag.store(true, Ordering::SeqCst);
        }
    });

    let config = RunnerConfig {
        selector: SelectorConfig {
            min_viable: cli.min_viable,
            max_servers: cli.max_servers,
            hard_limit: cli.hard_limit,
            max_distance_km: cli.max_distance,
            min_download_mbps: cli.min_download,
        },
        calibration: CalibrationConfig {
            max_probes: cli.calibration_probes,
            timeout_multiplier: cli.timeout_multiplier,
            default_timeout: Duration::from_secs(cli.connect_timeout),
            ..CalibrationConfig::default()
        },
        weights,
        top: cli.top,
    };

    let tester = ServerTester::new(
        MtrProbe::new(),
        SpeedtestCli,
        TesterConfig { target_host: cli.target_host.clone(), ..TesterConfig::default() },
    );

    let mut client = MullvadCli::new();
    let outcome = run(&config, candidates, &mut client, &tester, &mut sink, cancel).await;

    print_report(&outcome);

    if outcome.report.degraded || outcome.interrupted {
        Ok(exit_codes::PARTIAL_RESULTS)
    } else {
        Ok(exit_codes::SUCCESS)
    }
}

/// Resolve the reference location: built-in city table first, then the
/// geocoder, then the fallback coordinates if given.
async fn resolve_reference(cli: &Cli) -> Result<Coordinate, RunError> {
    if let Some(coordinate) = locations::lookup_reference(&cli.location) {
        return Ok(coordinate);
    }

    if let Some(coordinate) = Nominatim::new().resolve(&cli.location).await {
        return Ok(coordinate);
    }

    if let (Some(lat), Some(lon)) = (cli.default_lat, cli.default_lon) {
        warn!("Could not geocode \"{}\"; using fallback coordinates", cli.location);
        return Ok(Coordinate::new(lat, lon));
    }

    Err(RunError::location_unresolved(&cli.location))
}

fn print_report(outcome: &RunOutcome) {
    if outcome.interrupted {
        println!("\n{}", "Run interrupted; showing partial results.".yellow().bold());
    }

    println!("\n{}", "Tested servers".bold().white());
    for result in &outcome.results {
        if result.succeeded {
            let download = result
                .download_mbps
                .map(|mbps| format!("{:.2} Mbps", mbps))
                .unwrap_or_else(|| "no speed data".to_string());
            let latency = result
                .latency_ms
                .map(|ms| format!("{:.1} ms", ms))
                .unwrap_or_else(|| "no latency data".to_string());
            println!(
                "  {} {:<22} {:<18} {:>8} {}  {}",
                "ok".bright_green(),
                result.hostname,
                result.city,
                format!("{:.0} km", result.distance_km),
                download.bright_cyan(),
                latency
            );
        } else {
            let reason = result
                .failure_reason
                .as_ref()
                .map(|r| r.label().to_string())
                .unwrap_or_else(|| "unknown".to_string());
            println!(
                "  {} {:<22} {:<18} {:>8} {}",
                "no".bright_red(),
                result.hostname,
                result.city,
                format!("{:.0} km", result.distance_km),
                reason.bright_red()
            );
        }
    }

    let ranking = &outcome.ranking;
    print_metric_table("Closest", &ranking.by_distance, "km");
    print_metric_table("Fastest to connect", &ranking.by_connection_time, "s");
    print_metric_table("Fastest download", &ranking.by_download, "Mbps");
    print_metric_table("Fastest upload", &ranking.by_upload, "Mbps");
    print_metric_table("Lowest latency", &ranking.by_latency, "ms");
    print_metric_table("Most reliable", &ranking.by_reliability, "% loss");
    print_composite_table(&ranking.composite);

    print_summary(&outcome.report);
}

fn print_metric_table(title: &str, entries: &[MetricEntry], unit: &str) {
    if entries.is_empty() {
        return;
    }

    println!("\n{}", title.bold().white());
    for (rank, entry) in entries.iter().enumerate() {
        println!(
            "  {:>2}. {:<22} {:<18} {}",
            rank + 1,
            entry.hostname,
            entry.city,
            format!("{:.2} {}", entry.value, unit).bright_cyan()
        );
    }
}

fn print_composite_table(entries: &[CompositeEntry]) {
    if entries.is_empty() {
        return;
    }

    println!("\n{}", "Best overall".bold().white());
    for (rank, entry) in entries.iter().enumerate() {
        println!(
            "  {:>2}. {:<22} {:<18} {} {:>9}",
            rank + 1,
            entry.hostname,
            entry.city,
            format!("score {:.3}", entry.score).bright_cyan(),
            format!("{:.0} km", entry.distance_km)
        );
    }
}

fn print_summary(report: &RunReport) {
    println!("\n{}", "Summary".bold().white());
    println!(
        "  {} tested, {} connected, {} viable (wanted {})",
        report.attempts.to_string().bright_blue(),
        report.successes.to_string().bright_blue(),
        report.viable.to_string().bright_green(),
        report.min_viable
    );

    if !report.failure_counts.is_empty() {
        let breakdown: Vec<String> = report
            .failure_counts
            .iter()
            .map(|(label, count)| format!("{} x {}", count, label))
            .collect();
        println!("  {} {}", "Failures:".bold().white(), breakdown.join(", ").bright_red());
    }

    if let Some(ref stats) = report.stats {
        println!(
            "  {} connect {}, download {}, upload {}, latency {}",
            "Averages:".bold().white(),
            format!("{:.1} s", stats.avg_connection_time_s).bright_cyan(),
            format!("{:.2} Mbps", stats.avg_download_mbps).bright_cyan(),
            format!("{:.2} Mbps", stats.avg_upload_mbps).bright_cyan(),
            format!("{:.1} ms", stats.avg_latency_ms).bright_cyan()
        );
        println!(
            "  {} median {}, 90th percentile {}",
            "Download:".bold().white(),
            format!("{:.2} Mbps", stats.median_download_mbps).bright_cyan(),
            format!("{:.2} Mbps", stats.p90_download_mbps).bright_cyan()
        );
    }

    if report.degraded {
        println!(
            "\n{}",
            format!(
                "Found only {} of {} viable servers; consider raising --max-distance or --hard-limit.",
                report.viable, report.min_viable
            )
            .yellow()
        );
    }
}
