//! Navigation development tools

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use nav_tools::bench::{run_bench, BenchParams};
use nav_tools::validate::validate_config_file;

#[derive(Parser)]
#[command(name = "nav-tools")]
#[command(about = "Development tools for the navigation core")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a passability class configuration
    Validate {
        /// Path to the RON file
        config: PathBuf,
    },
    /// Run path requests on a seeded obstacle map
    Bench {
        /// Map side in terrain tiles
        size: u16,
        /// Number of path requests
        requests: u32,
        /// RNG seed
        seed: u64,
        /// Path workers (0 = one per core)
        #[arg(long, default_value_t = 0)]
        workers: usize,
    },
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(e) => {
            tracing::error!("Failed to encode report: {e}");
            std::process::exit(1);
        }
    }
}

fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { config } => {
            tracing::info!("Validating passability config: {}", config.display());
            match validate_config_file(&config) {
                Ok(report) => {
                    tracing::info!("Validation passed");
                    print_json(&report);
                }
                Err(e) => {
                    tracing::error!("Validation failed: {e}");
                    std::process::exit(1);
                }
            }
        }
        Commands::Bench {
            size,
            requests,
            seed,
            workers,
        } => {
            if size < 4 {
                tracing::error!("Map size must be at least 4 tiles");
                std::process::exit(1);
            }
            let report = run_bench(&BenchParams {
                tiles: size,
                requests,
                seed,
                workers,
            });
            print_json(&report);
        }
    }
}
