// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Thin CLI front-end over [`ddspipe::config::PipeConfiguration`].
//!
//! Wiring up concrete participants (RTPS, shared memory, ...) and a YAML
//! configuration loader is the job of an external collaborator; this binary
//! only generates and validates the TOML configuration surface the core
//! understands.

use clap::{Parser, Subcommand};
use ddspipe::config::{ConfigError, PipeConfiguration};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "ddspiped")]
#[command(about = "Pub/sub routing core - configuration tooling")]
#[command(version)]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate an example configuration file
    GenConfig {
        #[arg(short, long, default_value = "ddspipe.toml")]
        output: PathBuf,
    },

    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match args.command {
        Commands::GenConfig { output } => cmd_gen_config(output),
        Commands::Validate { config } => cmd_validate(config),
    }
}

fn cmd_gen_config(output: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let config = PipeConfiguration::default();
    let toml_str = toml::to_string_pretty(&config)?;

    let content = format!(
        "# ddspipe configuration\n# Generated by `ddspiped gen-config`\n\n{}\n",
        toml_str
    );

    std::fs::write(&output, content)?;
    println!("Generated configuration file: {}", output.display());
    Ok(())
}

fn cmd_validate(config_path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    match PipeConfiguration::from_file(&config_path) {
        Ok(config) => {
            println!("Configuration valid!");
            println!();
            println!("Routes: {}", config.routes.len());
            println!("Topic routes: {}", config.topic_routes.len());
            println!("Allowlist entries: {}", config.allowlist.len());
            println!("Blocklist entries: {}", config.blocklist.len());
            println!("Entity creation trigger: {:?}", config.entity_creation_trigger);
            Ok(())
        }
        Err(ConfigError::Invalid(msg)) => {
            eprintln!("Configuration invalid: {}", msg);
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("Failed to read configuration: {}", e);
            std::process::exit(1);
        }
    }
}
