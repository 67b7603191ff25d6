//! CLI command implementations

use std::time::Duration;

use anyhow::{Context, bail};
use clap::Subcommand;
use tidesim_core::{CongestionAlgorithm, DataRate, SimTime, TidesimConfig};
use tidesim_sim::scenarios::{FlowSpec, ScenarioBuilder, ScenarioKind, ScenarioReport, Traffic};

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Run a reference scenario and check its expected behavior
    Scenario {
        /// Scenario to run: a (paced), b (comparison) or c (loss recovery)
        kind: ScenarioKind,
        /// Random seed for the loss model
        #[arg(long)]
        seed: Option<u64>,
        /// Print the full report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run every reference scenario
    All {
        /// Random seed for the loss model
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Run a single paced flow over a point-to-point link
    Flow {
        /// Congestion control of the sender
        #[arg(short, long, value_enum, default_value_t = CongestionAlgorithm::NewReno)]
        algorithm: CongestionAlgorithm,
        /// Link rate, e.g. 10Mbps
        #[arg(long, default_value = "10Mbps")]
        rate: DataRate,
        /// One-way propagation delay in milliseconds
        #[arg(long, default_value_t = 2.0)]
        delay_ms: f64,
        /// Messages to send
        #[arg(long, default_value_t = 100)]
        packets: u64,
        /// Bytes per message
        #[arg(long, default_value_t = 1024)]
        packet_size: u64,
        /// Milliseconds between messages
        #[arg(long, default_value_t = 10.0)]
        interval_ms: f64,
        /// Simulated seconds to run
        #[arg(long, default_value_t = 10.0)]
        stop_secs: f64,
        /// Drop the first data packet at or after this many seconds
        #[arg(long)]
        loss_at: Option<f64>,
        /// Fraction of data packets lost at random
        #[arg(long, default_value_t = 0.0)]
        loss_rate: f64,
        /// Print the full report as JSON
        #[arg(long)]
        json: bool,
    },
}

impl Commands {
    /// Name of the run, used for its log file
    pub fn run_name(&self) -> String {
        match self {
            Commands::Scenario { kind, .. } => format!("scenario-{kind}"),
            Commands::All { .. } => "all".to_string(),
            Commands::Flow { algorithm, .. } => format!("flow-{algorithm}"),
        }
    }
}

/// Handle the CLI command
///
/// # Errors
/// Returns the error of the scenario that failed, or a summary of violated expectations
pub fn handle_command(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Scenario { kind, seed, json } => run_scenario(kind, seed, json),
        Commands::All { seed } => run_all(seed),
        Commands::Flow {
            algorithm,
            rate,
            delay_ms,
            packets,
            packet_size,
            interval_ms,
            stop_secs,
            loss_at,
            loss_rate,
            json,
        } => {
            let mut config = TidesimConfig::from_env();
            config.link.random_loss_rate = loss_rate;
            let stop_time = seconds(stop_secs, "stop time")?;
            let mut flow = FlowSpec::new(
                "flow",
                Traffic::Paced {
                    message_size: packet_size,
                    count: packets,
                    interval: millis(interval_ms, "interval")?,
                    start_at: SimTime::from_secs(1),
                },
            )
            .algorithm(algorithm)
            .link(rate, millis(delay_ms, "delay")?);
            if let Some(at) = loss_at {
                flow = flow.inject_loss_at(seconds(at, "loss time")?);
            }

            let report = ScenarioBuilder::new("flow")
                .config(config)
                .stop_time(stop_time)
                .flow(flow)
                .run()?;
            print_report(&report, json)
        }
    }
}

/// Run one reference scenario and verify it
///
/// # Errors
/// - `SimError` - Scenario could not be assembled or the run aborted
/// - Expectation violations of the scenario
pub fn run_scenario(kind: ScenarioKind, seed: Option<u64>, json: bool) -> anyhow::Result<()> {
    tracing::info!(scenario = %kind, ?seed, "Running scenario");
    let report = kind
        .run(config_with_seed(seed))
        .with_context(|| format!("scenario {kind} failed"))?;
    print_report(&report, json)?;

    let violations = kind.verify(&report);
    if !violations.is_empty() {
        bail!(
            "scenario {kind} violated {} expectation(s):\n  {}",
            violations.len(),
            violations.join("\n  ")
        );
    }
    if !json {
        println!("Scenario {kind}: all expectations hold");
    }
    Ok(())
}

/// Run every reference scenario in order
///
/// # Errors
/// Fails on the first scenario that errors or violates its expectations
pub fn run_all(seed: Option<u64>) -> anyhow::Result<()> {
    for kind in ScenarioKind::ALL {
        run_scenario(kind, seed, false)?;
        println!();
    }
    Ok(())
}

fn config_with_seed(seed: Option<u64>) -> TidesimConfig {
    let mut config = TidesimConfig::from_env();
    if let Some(seed) = seed {
        config.simulation.seed = seed;
    }
    config
}

fn seconds(value: f64, what: &str) -> anyhow::Result<SimTime> {
    SimTime::try_from_secs_f64(value)
        .with_context(|| format!("{what} must be a non-negative number of seconds, got {value}"))
}

fn millis(value: f64, what: &str) -> anyhow::Result<Duration> {
    Duration::try_from_secs_f64(value / 1000.0)
        .with_context(|| format!("{what} must be a non-negative number of milliseconds, got {value}"))
}

fn print_report(report: &ScenarioReport, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", report.to_json()?);
    } else {
        print!("{}", report.summary());
    }
    Ok(())
}
