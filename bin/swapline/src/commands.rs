//! The subcommands.

use anyhow::{bail, Context};
use bitcoin::hashes::{sha256, Hash};
use swapline_chain::{BitcoindRpc, ChainSource};
use swapline_node::{ArtifactStore, FsArtifactStore, PersistedArtifact};
use swapline_swap::{SqliteSwapStore, SwapStatus, SwapStore};
use tracing::{info, warn};

use crate::{args::Command, config::Config};

pub(crate) async fn run(command: Command, config: Config) -> anyhow::Result<()> {
    match command {
        Command::Tip => tip(&config).await,
        Command::Artifacts => artifacts(&config).await,
        Command::Swaps { all } => swaps(&config, all).await,
        Command::Commitment { preimage } => commitment(&preimage),
    }
}

async fn tip(config: &Config) -> anyhow::Result<()> {
    let rpc = BitcoindRpc::new(&config.bitcoind).context("failed to build bitcoind client")?;
    let tip = rpc.chaintip().await.context("failed to read chain tip")?;
    info!(%tip, "read chain tip");
    println!("{tip}");
    Ok(())
}

async fn artifacts(config: &Config) -> anyhow::Result<()> {
    let store = FsArtifactStore::new(config.node.artifacts_dir())?;
    for artifact in PersistedArtifact::ALL {
        match store.read(artifact).await? {
            Some(bytes) => println!(
                "{artifact}\t{} bytes\tsha256 {}",
                bytes.len(),
                sha256::Hash::hash(&bytes)
            ),
            None => {
                if artifact == PersistedArtifact::Manager {
                    warn!(path = %store.path_of(artifact).display(), "no channel manager persisted");
                }
                println!("{artifact}\tmissing");
            }
        }
    }
    Ok(())
}

async fn swaps(config: &Config, all: bool) -> anyhow::Result<()> {
    let store = SqliteSwapStore::connect(&config.swap_db)
        .await
        .context("failed to open swap database")?;
    let records = if all {
        store.load_all().await?
    } else {
        store.load_by_status(SwapStatus::Opened).await?
    };

    for record in &records {
        let funding = match (record.funding_txid, record.send_pending) {
            (Some(txid), _) => txid.to_string(),
            (None, true) => "unrecorded".to_string(),
            (None, false) => "-".to_string(),
        };
        println!(
            "{}\t{}\t{}\t{} sat\t{}\tfunding {funding}",
            record.info.hash,
            record.role,
            record.info.status,
            record.info.amount_sat,
            record.info.counterparty_l1_address,
        );
    }
    info!(count = records.len(), %all, "listed swaps");
    Ok(())
}

fn commitment(preimage: &str) -> anyhow::Result<()> {
    let bytes = hex::decode(preimage.trim()).context("preimage must be hex-encoded")?;
    if bytes.len() != 32 {
        bail!("preimage must be 32 bytes, got {}", bytes.len());
    }
    println!("{}", sha256::Hash::hash(&bytes));
    Ok(())
}
