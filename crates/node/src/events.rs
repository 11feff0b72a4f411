//! Events emitted by the node core.
use bitcoin::{hashes::sha256, ScriptBuf};
use serde::{Deserialize, Serialize};

/// Identifier of a payment channel.
pub type ChannelId = [u8; 32];

/// An event emitted by the node core for the application to act upon.
///
/// Events are immutable once emitted and are delivered in emission order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeEvent {
    /// An incoming payment was claimed.
    PaymentReceived {
        /// Hash of the payment.
        payment_hash: sha256::Hash,

        /// Amount received.
        amount_msat: u64,
    },

    /// An outgoing payment succeeded.
    PaymentSent {
        /// Hash of the payment.
        payment_hash: sha256::Hash,

        /// The preimage released by the recipient.
        payment_preimage: [u8; 32],

        /// Total routing fee, when known.
        fee_paid_msat: Option<u64>,
    },

    /// An outgoing payment failed permanently.
    PaymentFailed {
        /// Hash of the payment.
        payment_hash: sha256::Hash,

        /// Why the payment failed.
        reason: String,
    },

    /// A channel was closed.
    ChannelClosed {
        /// The closed channel.
        channel_id: ChannelId,

        /// Why the channel was closed.
        reason: String,
    },

    /// The application must fund a channel by paying to `output_script`.
    FundingGenerationReady {
        /// Temporary id of the channel being opened.
        temporary_channel_id: ChannelId,

        /// Value of the funding output.
        channel_value_sat: u64,

        /// Script the funding output must pay to.
        output_script: ScriptBuf,
    },

    /// Any other event, carried through unchanged.
    Opaque {
        /// A name describing the event.
        kind: String,

        /// The serialized event.
        payload: Vec<u8>,
    },
}

impl NodeEvent {
    /// Short name of the event for logging.
    pub fn kind(&self) -> &str {
        match self {
            NodeEvent::PaymentReceived { .. } => "payment_received",
            NodeEvent::PaymentSent { .. } => "payment_sent",
            NodeEvent::PaymentFailed { .. } => "payment_failed",
            NodeEvent::ChannelClosed { .. } => "channel_closed",
            NodeEvent::FundingGenerationReady { .. } => "funding_generation_ready",
            NodeEvent::Opaque { kind, .. } => kind,
        }
    }
}

/// An event owned by the tracker until its handler has processed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEventRecord {
    /// The event.
    pub event: NodeEvent,

    /// Whether the handler has processed the event.
    pub delivered: bool,
}

impl PendingEventRecord {
    /// Wraps an undelivered event.
    pub const fn new(event: NodeEvent) -> Self {
        Self {
            event,
            delivered: false,
        }
    }
}
