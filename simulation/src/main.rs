//! qnet - quantum network simulator CLI
//!
//! Runs the bundled scenarios over many seeded trials and prints the
//! aggregate report.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use qnet_logging::{LogConfig, QnetSubscriberBuilder};
use qnet_simulation::{NetworkConfig, SimConfig, Simulation, SimulationReport, scenarios};

#[derive(Parser)]
#[command(
    name = "qnet-sim",
    about = "Concurrent quantum network simulator",
    version
)]
struct Cli {
    /// Enable verbose, human-readable logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Also write JSONL logs into this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Print reports as JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    /// Number of trials per run
    #[arg(short, long, global = true, default_value = "10")]
    trials: usize,

    /// Base seed; random when omitted
    #[arg(short, long, global = true)]
    seed: Option<u64>,

    /// Limit on each blocking receive, in milliseconds
    #[arg(long, global = true)]
    receive_timeout_ms: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send single qubits over fibers of increasing length
    FiberSweep {
        /// Fiber lengths in km
        #[arg(short, long, value_delimiter = ',', default_values_t = vec![0.0, 10.0, 25.0, 50.0, 100.0])]
        lengths: Vec<f64>,

        /// Qubits sent per trial
        #[arg(short, long, default_value = "100")]
        qubits: usize,

        /// Run a single network from a JSON file instead of the sweep
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Bounce a classical counter between two agents
    Ping {
        /// Link length in km
        #[arg(short, long, default_value = "10.0")]
        length: f64,

        #[arg(short, long, default_value = "5")]
        rounds: i64,
    },

    /// Bell pairs relayed through an eavesdropper
    Relay {
        #[arg(short, long, default_value = "4")]
        pairs: usize,

        /// Length of each fiber hop in km
        #[arg(short, long, default_value = "5.0")]
        length: f64,
    },
}

fn print_report(report: &SimulationReport, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        println!("{}", report);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // logs go to stderr, so stdout carries only the report
    let _guard = match &cli.log_dir {
        Some(dir) => {
            let builder = QnetSubscriberBuilder::new().with_config(LogConfig::batch(dir.clone()));
            let builder = if cli.verbose { builder.with_level("debug") } else { builder };
            builder.init()?
        }
        None if cli.verbose => qnet_logging::init_development()?,
        None => qnet_logging::init_default()?,
    };

    let mut config = SimConfig::default().with_trials(cli.trials);
    config.seed = cli.seed;
    config.receive_timeout_ms = cli.receive_timeout_ms;

    match cli.command {
        Commands::FiberSweep {
            config: Some(path), ..
        } => {
            let network = NetworkConfig::from_path(&path)?;
            let topology = scenarios::fiber_topology(network);
            println!("{}", topology.visualize());
            let report = Simulation::new(topology, config).run().await?;
            print_report(&report, cli.json)?;
        }
        Commands::FiberSweep {
            lengths,
            qubits,
            config: None,
        } => {
            let points = scenarios::fiber_sweep(&lengths, qubits, &config).await?;
            println!("{:>10} {:>10} {:>10} {:>10} {:>10}", "length", "delivered", "lost", "loss", "expected");
            for p in points {
                println!(
                    "{:>10.1} {:>10} {:>10} {:>10.3} {:>10.3}",
                    p.length,
                    p.delivered,
                    p.lost,
                    p.loss_rate(),
                    p.expected_loss
                );
            }
        }
        Commands::Ping { length, rounds } => {
            let report = scenarios::ping(length, rounds, &config).await?;
            print_report(&report, cli.json)?;
        }
        Commands::Relay { pairs, length } => {
            let report = scenarios::relay(pairs, length, &config).await?;
            print_report(&report, cli.json)?;
        }
    }

    Ok(())
}
