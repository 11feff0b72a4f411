use serde::{Deserialize, Serialize};
use swapline_chain::BitcoindConfig;
use swapline_node::NodeConfig;
use swapline_swap::SwapConfig;

/// The configuration of a swapline deployment.
///
/// Nothing in here is shared with a counterparty. Both sides of a swap only need to agree on the
/// hash, the amount and the on-chain address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct Config {
    /// The bitcoind instance used as chain source.
    pub bitcoind: BitcoindConfig,

    /// The node integration layer.
    pub node: NodeConfig,

    /// How swaps are run.
    pub swap: SwapConfig,

    /// The sqlite URL of the swap database, e.g. `sqlite://.data/swaps.db?mode=rwc`.
    pub swap_db: String,
}
