// Node-wide and per-channel configuration.
//
// These are plain, serializable parameter bags rather than a CLI-flags
// layer: this crate exposes no command-line surface, the embedding
// application is responsible for sourcing these values (from a config file,
// a mobile app's settings store, or hardcoded defaults) and constructing
// them.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use wire::ChannelId;

/// Node-wide parameters threaded through the peer orchestrator and, via
/// [`crate::channel::ChannelContext`], into every channel transition.
///
/// Not `Serialize`: `wire::InitFeatures` only derives it when the `wire`
/// crate's own `serde` feature is enabled, which this crate does not turn
/// on. Persist the feature bits separately if a caller needs that.
#[derive(Clone, Debug)]
pub struct NodeParams {
    /// Genesis hash of the chain this node operates on.
    pub chain_hash: bitcoin::BlockHash,

    /// Local feature bits advertised in `init`.
    pub features: wire::InitFeatures,

    /// Keep-alive ping interval on an established connection.
    pub ping_interval: Duration,

    /// How often the outgoing-payment handler sweeps for MPP/trampoline
    /// timeouts.
    pub payment_timeout_sweep_interval: Duration,

    /// Connection-establishment timeout (TCP connect).
    pub connect_timeout: Duration,

    /// Noise handshake timeout.
    pub handshake_timeout: Duration,
}

impl Default for NodeParams {
    fn default() -> Self {
        NodeParams {
            chain_hash: bitcoin::BlockHash::default(),
            features: wire::InitFeatures::default(),
            ping_interval: Duration::from_secs(30),
            payment_timeout_sweep_interval: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(10),
            handshake_timeout: Duration::from_secs(10),
        }
    }
}

/// User-configurable thresholds for accepting a peer-initiated liquidity
/// event (`please_open_channel` fee quote or a `pay_to_open_request`).
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct LiquidityPolicy {
    /// Maximum acceptable mining fee rate, expressed in sat/vbyte, for a
    /// peer-initiated channel open or splice.
    pub max_fee_rate_sat_per_vbyte: u32,
    /// Maximum acceptable total absolute fee, in satoshis, regardless of
    /// rate (protects against large low-feerate UTXO sets).
    pub max_absolute_fee_sat: u64,
    /// Whether pay-to-open (on-the-fly channel creation for an incoming
    /// HTLC) is allowed at all.
    pub allow_pay_to_open: bool,
}

impl Default for LiquidityPolicy {
    fn default() -> Self {
        LiquidityPolicy {
            max_fee_rate_sat_per_vbyte: 50,
            max_absolute_fee_sat: 5_000,
            allow_pay_to_open: true,
        }
    }
}

/// Parameters governing the swap-in manager's UTXO selection rule (see
/// [`crate::swapin`]).
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct SwapInParams {
    /// Minimum confirmations before a UTXO is eligible for swap-in.
    pub min_confirmations: u32,
    /// Maximum confirmations; beyond this the UTXO is assumed to have
    /// already been offered (or is otherwise stale) and is left alone.
    pub max_confirmations: u32,
    /// Relative refund delay (in blocks) encoded in the swap-in script;
    /// UTXOs within `refund_delay` of becoming refundable are excluded.
    pub refund_delay: u32,
}

impl Default for SwapInParams {
    fn default() -> Self {
        SwapInParams {
            min_confirmations: 3,
            max_confirmations: 720,
            refund_delay: 2016,
        }
    }
}

/// Identifies a specific channel for configuration lookups keyed by id
/// rather than by index.
pub type ChannelKey = ChannelId;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swap_in_defaults_leave_headroom_before_refund() {
        let p = SwapInParams::default();
        assert!(p.max_confirmations < p.refund_delay);
        assert!(p.min_confirmations < p.max_confirmations);
    }
}
