//! `swapline` inspects a swapline deployment: the chain as bitcoind sees it, the node core's
//! persisted artifacts and the swaps in the swap database.

use std::{fs, path::Path};

use anyhow::Context;
use clap::Parser;
use config::Config;
use serde::de::DeserializeOwned;
use swapline_common::{logging, logging::LoggerConfig};
use tokio::runtime;
use tracing::{debug, info, trace};

mod args;
mod commands;
mod config;

fn main() -> anyhow::Result<()> {
    logging::init(LoggerConfig::from_env("swapline"));

    let cli = args::Cli::parse();
    info!(command = %cli.command, "starting swapline");

    let config = parse_toml::<Config>(&cli.config)?;
    config.swap.validate()?;

    let runtime = runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("must be able to create runtime")?;

    runtime.block_on(commands::run(cli.command, config))
}

/// Reads and parses a TOML file from the given path into the given type `T`.
fn parse_toml<T>(path: impl AsRef<Path>) -> anyhow::Result<T>
where
    T: std::fmt::Debug + DeserializeOwned,
{
    let path = path.as_ref();
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read TOML file {}", path.display()))?;
    trace!(?contents, "read file");

    let parsed = toml::from_str::<T>(&contents).context("failed to parse TOML file")?;
    debug!(?parsed, "parsed TOML file");

    Ok(parsed)
}
