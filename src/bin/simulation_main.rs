// simulation_main.rs
use anyhow::{Context, Result};
use clap::Parser;
use intersection_network::communication::messages::{run_event_printer, EventLog};
use intersection_network::config::{LogFormat, SimulationConfig};
use intersection_network::simulation_engine::network::Network;
use intersection_network::simulation_engine::simulation::Simulation;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "simulation_main")]
#[command(about = "Concurrent simulation of a small network of signalled intersections")]
struct Cli {
    /// Seconds between right-of-way toggles
    #[arg(long, default_value_t = 3)]
    cycle_secs: u64,

    /// Milliseconds a blocked vehicle waits before checking again
    #[arg(long, default_value_t = 1000)]
    retry_ms: u64,

    /// Upper bound of the random pause between new vehicles, in seconds
    #[arg(long, default_value_t = 2)]
    max_spawn_delay_secs: u64,

    /// Generator back-off after a failed vehicle build, in milliseconds
    #[arg(long, default_value_t = 1000)]
    backoff_ms: u64,

    /// Distance covered while crossing an intersection, in metres
    #[arg(long, default_value_t = 500.0)]
    distance: f64,

    /// Cap on live vehicle tasks (unlimited when omitted)
    #[arg(long)]
    max_live_vehicles: Option<usize>,

    /// RNG seed for a reproducible vehicle stream
    #[arg(long)]
    seed: Option<u64>,

    /// Stop after this many seconds instead of waiting for Ctrl-C
    #[arg(long)]
    run_for_secs: Option<u64>,

    /// Event log format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

impl Cli {
    fn into_config(self) -> SimulationConfig {
        SimulationConfig {
            cycle_period: Duration::from_secs(self.cycle_secs),
            retry_interval: Duration::from_millis(self.retry_ms),
            max_spawn_delay_secs: self.max_spawn_delay_secs,
            backoff_interval: Duration::from_millis(self.backoff_ms),
            crossing_distance_m: self.distance,
            max_live_vehicles: self.max_live_vehicles,
            seed: self.seed,
            log_format: self.log_format,
            ..SimulationConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let run_for = cli.run_for_secs.map(Duration::from_secs);
    let config = cli.into_config();
    config.validate().context("Invalid simulation settings")?;
    log::info!(
        "Configuration: {}",
        serde_json::to_string(&config).context("Failed to serialize configuration")?
    );

    let network = Arc::new(Network::reference().context("Failed to build the network")?);
    let (events, rx) = EventLog::channel();
    let printer = tokio::spawn(run_event_printer(rx, config.log_format));

    let simulation = Simulation::new(network, config, events);
    let summary = simulation
        .run_until(async move {
            match run_for {
                Some(limit) => tokio::time::sleep(limit).await,
                None => {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        log::error!("Failed to listen for Ctrl-C: {}", e);
                        std::future::pending::<()>().await;
                    }
                }
            }
        })
        .await;

    // The simulation owned the last EventLog handles, so the printer drains and stops.
    let printed = printer.await.context("Event printer failed")?;

    log::info!("=== SIMULATION COMPLETE ===");
    log::info!("Vehicles spawned: {}", summary.spawned);
    log::info!("Vehicles exited: {}", summary.exited);
    log::info!("Vehicles aborted: {}", summary.aborted);
    log::info!("Vehicles rejected: {}", summary.rejected);
    log::info!("Vehicles cancelled at shutdown: {}", summary.live);
    log::info!("Signal cycles: {}", summary.cycles);
    log::info!("Events printed: {}", printed);
    Ok(())
}
