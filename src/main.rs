// Copyright 2025 The Drasi Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// Allow println! in main.rs for CLI user-facing output
#![allow(clippy::print_stdout)]

use anyhow::Result;
use clap::{Parser, Subcommand};
use log::{debug, info};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use pgbouncer_exporter::config::{check_config, Config};

#[derive(Parser)]
#[command(name = "pgbouncer-exporter")]
#[command(about = "Prometheus exporter for PgBouncer")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(long_version = concat!(
    env!("CARGO_PKG_VERSION"),
    "\nrustc: ",
    env!("PGBOUNCER_EXPORTER_RUSTC_VERSION"),
))]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to the configuration file
    #[arg(short, long, default_value = "config.yml", global = true)]
    config: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a configuration file (default if no subcommand specified)
    Validate {
        /// Print the connection string of each pooler, with masked passwords
        #[arg(long)]
        show_connections: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Some(Commands::Validate { show_connections }) => {
            validate_config(&cli.config, show_connections)
        }
        None => validate_config(&cli.config, false),
    }
}

/// Load a `.env` file next to the config file, if there is one.
fn load_env_file(config_path: &Path) {
    let Some(config_dir) = config_path.parent() else {
        return;
    };
    let env_file = config_dir.join(".env");
    if !env_file.exists() {
        return;
    }
    match dotenvy::from_path(&env_file) {
        Ok(()) => info!("Loaded environment variables from {}", env_file.display()),
        Err(e) => eprintln!("Warning: Failed to load .env file: {e}"),
    }
}

/// Validate a configuration file
fn validate_config(config_path: &Path, show_connections: bool) -> Result<()> {
    println!("Validating configuration: {}", config_path.display());
    println!();

    if !config_path.exists() {
        println!(
            "[ERROR] Configuration file not found: {}",
            config_path.display()
        );
        std::process::exit(1);
    }

    load_env_file(config_path);

    let config = match Config::load(config_path) {
        Ok(config) => config,
        Err(e) => {
            println!("[ERROR] Configuration could not be loaded:");
            println!("  {e}");
            std::process::exit(1);
        }
    };
    debug!("Loaded configuration: {config:?}");

    if let Err(e) = check_config(&config) {
        println!("[ERROR] Configuration is invalid:");
        println!("  {e}");
        std::process::exit(1);
    }

    println!("[OK] Configuration file is valid");
    println!();
    println!("Summary:");
    println!("  Exporter: {}:{}", config.exporter_host(), config.exporter_port());
    println!("  Poolers: {}", config.poolers().len());

    if show_connections {
        println!();
        println!("Connections:");
        for (i, pooler) in config.poolers().iter().enumerate() {
            // check_config already parsed every DSN
            let connection = pooler.get_key_value_connection(true)?;
            println!("  [{i}] {connection}");
            if !pooler.extra_labels().is_empty() {
                let labels: Vec<String> = pooler
                    .extra_labels()
                    .iter()
                    .map(|(k, v)| format!("{k}={v}"))
                    .collect();
                println!("      labels: {}", labels.join(", "));
            }
        }
    }

    Ok(())
}
