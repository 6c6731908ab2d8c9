mod cli;

use anyhow::Result;
use chunkvault::config::ClusterConfig;
use chunkvault::utils::logging::{init_logging, parse_level};
use clap::Parser;
use cli::args::Arguments;
use log::{error, info, LevelFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Arguments::parse();

    // Load the configuration, then layer environment and command-line overrides on top
    let mut config = match &args.config {
        Some(config_path) => ClusterConfig::parse_from_file(config_path).map_err(|e| {
            eprintln!("Failed to read configuration file '{}': {:#}", config_path, e);
            e
        })?,
        None => ClusterConfig::default(),
    };
    config.apply_env_overrides()?;
    apply_cli_overrides(&mut config, &args);
    config.validate()?;

    // Initialize logging based on verbosity
    if args.verbose {
        init_logging(LevelFilter::Debug);
    } else {
        init_logging(parse_level(&config.log_level));
    }
    info!(
        "Starting cluster: {} nodes, chunk size {} B, replication factor {}",
        config.node_count, config.chunk_size, config.replication_factor
    );

    cli::scenario::run(config, args.json).await.map_err(|e| {
        error!("Scenario failed: {:#}", e);
        e
    })
}

fn apply_cli_overrides(config: &mut ClusterConfig, args: &Arguments) {
    if let Some(nodes) = args.nodes {
        config.node_count = nodes;
    }
    if let Some(chunk_size) = args.chunk_size {
        config.chunk_size = chunk_size;
    }
    if let Some(replication_factor) = args.replication_factor {
        config.replication_factor = replication_factor;
    }
}
