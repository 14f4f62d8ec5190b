// Payment bookkeeping (§4.4 incoming, §4.5 outgoing). Channels only know
// about individual HTLCs; a payment is the orchestrator-level concept that
// ties one or more HTLCs (MPP parts) to a Bolt-11 invoice or an outgoing
// send request.

pub mod incoming;
pub mod outgoing;

pub use incoming::{IncomingPayment, Received, ReceivedWith};
pub use outgoing::{
    OutgoingLightningPayment, OutgoingPart, OutgoingPaymentDetails, PartStatus, PaymentStatus,
};

use thiserror::Error;

/// Ambient payment-layer errors (§7): distinct from [`crate::channel::ChannelError`]
/// since nothing here is BOLT channel policy.
#[derive(Clone, Debug, Error)]
pub enum PaymentError {
    #[error("no invoice found for payment hash {0:x?}")]
    UnknownInvoice([u8; 32]),

    #[error("invoice for payment hash {0:x?} has expired")]
    InvoiceExpired([u8; 32]),

    #[error("received amount does not match the invoice's requested amount")]
    AmountMismatch,

    #[error("could not decode the supplied Bolt-11 invoice")]
    InvalidInvoice,

    #[error("no route to destination could be constructed")]
    NoRoute,

    #[error("estimated routing/funding fee {fee} exceeds the configured policy limit {limit}")]
    FeeExceedsPolicy { fee: crate::wallet::MilliSatoshi, limit: crate::wallet::MilliSatoshi },

    #[error("payment is not connected to any usable channel")]
    NotConnected,

    #[error(transparent)]
    Channel(#[from] crate::channel::ChannelError),
}

/// Why an outgoing payment attempt ultimately failed (§4.5, surfaced via
/// [`crate::events::DomainEvent::PaymentNotSent`]).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FinalFailure {
    NoRouteFound,
    InsufficientBalance,
    FeePolicyViolation,
    RecipientRejected,
    Timeout,
    ChannelClosed,
}

/// The data needed to have a [`crate::collaborators::Bolt11Invoicer`] mint a
/// new invoice for an incoming payment (§4.4).
#[derive(Clone, Debug)]
pub struct InvoiceDraft {
    pub amount_msat: Option<u64>,
    pub description: String,
    pub expiry: std::time::Duration,
    pub payment_hash: [u8; 32],
    pub payment_secret: [u8; 32],
    /// Routing hint for the single virtual hop into this node (§4.4): this
    /// node doesn't gossip, so without one a sender has no fee/cltv policy
    /// to budget for on the last hop.
    pub extra_hops: Vec<ExtraHop>,
}

/// A remote peer's advertised fee/cltv policy for one of our channels,
/// learned from its `channel_update`s — the raw material
/// [`synthesize_extra_hop`] maxes over (§4.4).
#[derive(Clone, Copy, Debug)]
pub struct ChannelFeePolicy {
    pub fee_base_msat: u32,
    pub fee_proportional_millionths: u32,
    pub cltv_expiry_delta: u16,
}

impl Default for ChannelFeePolicy {
    fn default() -> Self {
        ChannelFeePolicy { fee_base_msat: 1_000, fee_proportional_millionths: 100, cltv_expiry_delta: 144 }
    }
}

/// A BOLT-11 `r` field hop hint describing the single virtual hop into this
/// node (§4.4).
#[derive(Clone, Copy, Debug)]
pub struct ExtraHop {
    pub src_node_id: secp256k1::PublicKey,
    pub short_channel_id: u64,
    pub fee_base_msat: u32,
    pub fee_proportional_millionths: u32,
    pub cltv_expiry_delta: u16,
}

/// §4.4: synthesizes the hop hint's policy as the *maximum* `fee_base_msat`,
/// `fee_proportional_millionths` and `cltv_expiry_delta` across every known
/// channel update, falling back to `defaults` field-by-field where nothing
/// has been observed yet. Maximizing (rather than averaging or taking the
/// cheapest) means a sender that budgets for this hint never under-pays
/// whichever of our channels the HTLC actually lands on.
pub fn synthesize_extra_hop(
    src_node_id: secp256k1::PublicKey,
    short_channel_id: u64,
    known: &[ChannelFeePolicy],
    defaults: ChannelFeePolicy,
) -> ExtraHop {
    let fee_base_msat =
        known.iter().map(|p| p.fee_base_msat).max().unwrap_or(defaults.fee_base_msat);
    let fee_proportional_millionths = known
        .iter()
        .map(|p| p.fee_proportional_millionths)
        .max()
        .unwrap_or(defaults.fee_proportional_millionths);
    let cltv_expiry_delta =
        known.iter().map(|p| p.cltv_expiry_delta).max().unwrap_or(defaults.cltv_expiry_delta);
    ExtraHop { src_node_id, short_channel_id, fee_base_msat, fee_proportional_millionths, cltv_expiry_delta }
}

/// The fields this node needs out of a peer-supplied Bolt-11 invoice string
/// (§4.5): everything else (routing hints, feature bits) is the invoicer's
/// concern, not ours.
#[derive(Clone, Debug)]
pub struct DecodedInvoice {
    pub payment_hash: [u8; 32],
    pub payment_secret: [u8; 32],
    pub amount_msat: Option<u64>,
    pub destination: secp256k1::PublicKey,
    pub min_final_cltv_expiry: u32,
    pub expiry: std::time::Duration,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl DecodedInvoice {
    pub fn is_expired(&self, now: chrono::DateTime<chrono::Utc>) -> bool {
        match chrono::Duration::from_std(self.expiry) {
            Ok(expiry) => now > self.timestamp + expiry,
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node() -> secp256k1::PublicKey { dumb_pubkey!() }

    #[test]
    fn extra_hop_falls_back_to_defaults_with_no_known_updates() {
        let defaults = ChannelFeePolicy::default();
        let hop = synthesize_extra_hop(node(), 42, &[], defaults);
        assert_eq!(hop.fee_base_msat, defaults.fee_base_msat);
        assert_eq!(hop.fee_proportional_millionths, defaults.fee_proportional_millionths);
        assert_eq!(hop.cltv_expiry_delta, defaults.cltv_expiry_delta);
    }

    #[test]
    fn extra_hop_takes_the_maximum_across_known_updates() {
        let known = vec![
            ChannelFeePolicy { fee_base_msat: 500, fee_proportional_millionths: 10, cltv_expiry_delta: 40 },
            ChannelFeePolicy { fee_base_msat: 2_000, fee_proportional_millionths: 5, cltv_expiry_delta: 80 },
        ];
        let hop = synthesize_extra_hop(node(), 7, &known, ChannelFeePolicy::default());
        assert_eq!(hop.fee_base_msat, 2_000);
        assert_eq!(hop.fee_proportional_millionths, 10);
        assert_eq!(hop.cltv_expiry_delta, 80);
    }
}
