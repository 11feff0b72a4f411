//! Parses command-line arguments for the swapline CLI.

use std::{fmt::Display, path::PathBuf};

use clap::{crate_version, Parser, Subcommand};

#[derive(Debug, Parser)]
#[clap(
    name = "swapline",
    about = "Operator tooling for the swapline Lightning node and its submarine swaps",
    version = crate_version!()
)]
pub(crate) struct Cli {
    #[clap(
        long,
        short = 'c',
        help = "The file containing the configuration",
        default_value = "config.toml"
    )]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub(crate) enum Command {
    /// Print the chain tip reported by bitcoind.
    Tip,

    /// List the node core artifacts persisted in the data directory.
    Artifacts,

    /// List stored swaps. Only pending ones unless `--all` is given.
    Swaps {
        #[arg(long, help = "Include committed and canceled swaps")]
        all: bool,
    },

    /// Print the hash commitment of a hex-encoded 32-byte preimage.
    Commitment {
        #[arg(help = "The preimage, hex-encoded")]
        preimage: String,
    },
}

impl Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Tip => write!(f, "tip"),
            Command::Artifacts => write!(f, "artifacts"),
            Command::Swaps { .. } => write!(f, "swaps"),
            Command::Commitment { .. } => write!(f, "commitment"),
        }
    }
}
