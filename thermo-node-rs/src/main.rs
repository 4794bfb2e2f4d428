//! Thermo Node - coordinator and peripheral CLI
//!
//! # Usage
//!
//! ```bash
//! # Coordinator with initial central temperature 0, listening on 5000
//! thermo-node coordinator 0
//!
//! # Four peripherals
//! thermo-node peripheral 1 10
//! thermo-node peripheral 2 10 --host 127.0.0.1 --port 5000
//! ```

use clap::{Parser, Subcommand};
use thermo_core::config::round_timeout_from_secs;
use thermo_core::{coordinator, peripheral, CoordinatorConfig, PeripheralConfig, DEFAULT_PORT};
use tracing::{error, info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Distributed thermal equilibrium node
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    role: Role,

    /// Log level (trace, debug, info, warn, error); RUST_LOG overrides it
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Role {
    /// Run the central node and wait for all peripherals
    Coordinator {
        /// Initial central temperature
        #[arg(allow_negative_numbers = true)]
        initial: f64,

        /// TCP port to listen on
        #[arg(short, long, default_value_t = DEFAULT_PORT)]
        port: u16,

        /// Address to bind
        #[arg(long, default_value = "0.0.0.0")]
        bind: String,

        /// Per-round deadline in seconds (0 waits forever)
        #[arg(long, default_value = "30")]
        round_timeout_secs: u64,

        /// Print the final summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run one peripheral node
    Peripheral {
        /// Node id (1..=4)
        id: u32,

        /// Initial external temperature
        #[arg(allow_negative_numbers = true)]
        initial: f64,

        /// Coordinator host
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Coordinator port
        #[arg(short, long, default_value_t = DEFAULT_PORT)]
        port: u16,

        /// Deadline in seconds for each message from the coordinator (0 waits forever)
        #[arg(long, default_value = "30")]
        round_timeout_secs: u64,

        /// Print the outcome as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Setup logging
    if std::env::var_os("RUST_LOG").is_some() {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(EnvFilter::from_default_env())
            .with_target(false)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let level = match args.log_level.as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        };
        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .with_target(false)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }

    if let Err(e) = run(args.role).await {
        error!("{}", e);
        std::process::exit(1);
    }
    Ok(())
}

async fn run(role: Role) -> Result<(), Box<dyn std::error::Error>> {
    match role {
        Role::Coordinator {
            initial,
            port,
            bind,
            round_timeout_secs,
            json,
        } => {
            let config = CoordinatorConfig::new(port)
                .with_bind_addr(bind)
                .with_round_timeout(round_timeout_from_secs(round_timeout_secs));
            config.validate()?;

            info!("Thermo coordinator starting (peers={})", config.peer_count);
            let summary = coordinator::serve(config, initial).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!("Stabilized after {} rounds", summary.rounds);
                println!("Final central={:.6}", summary.central_value);
                for record in &summary.peripherals {
                    println!("Final ext[{}]={:.6}", record.id, record.current_value);
                }
            }
        }
        Role::Peripheral {
            id,
            initial,
            host,
            port,
            round_timeout_secs,
            json,
        } => {
            let config = PeripheralConfig::new(id)
                .with_host(host)
                .with_port(port)
                .with_round_timeout(round_timeout_from_secs(round_timeout_secs));
            config.validate()?;

            info!("Thermo peripheral #{} starting", id);
            let outcome = peripheral::connect_and_run(&config, initial).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                println!(
                    "Peripheral {} done after {} rounds: central={:.6} ext={:.6}",
                    outcome.id, outcome.rounds, outcome.final_central, outcome.external_value
                );
            }
        }
    }
    Ok(())
}
