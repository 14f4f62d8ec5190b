// Domain events broadcast on the peer orchestrator's event bus (§4.2, §7).

use wire::ChannelId;

use crate::payments::{FinalFailure, OutgoingLightningPayment};
use crate::wallet::MilliSatoshi;

/// Events the embedding application subscribes to. Broadcast with a small
/// replay buffer; a lagging subscriber observes a gap, never blocks the
/// orchestrator.
#[derive(Clone, Debug)]
pub enum DomainEvent {
    /// An incoming payment (possibly multi-part) has been fully received.
    PaymentReceived {
        payment_hash: [u8; 32],
        amount: MilliSatoshi,
        fees: MilliSatoshi,
    },

    /// A new part has arrived for a payment that has not yet completed.
    PaymentProgress {
        payment_hash: [u8; 32],
        amount_so_far: MilliSatoshi,
    },

    /// An outgoing payment completed successfully.
    PaymentSent(OutgoingLightningPayment),

    /// An outgoing payment could not be completed.
    PaymentNotSent {
        payment_id: uuid::Uuid,
        final_failure: FinalFailure,
    },

    /// A channel has begun its closing flow (mutual or unilateral).
    ChannelClosing { channel_id: ChannelId },

    /// A persisted channel's backup TLV could not be fully deserialized
    /// because it was written by a newer protocol version than this node
    /// understands. The channel is left untouched; it is neither
    /// force-closed nor treated as stale.
    UpgradeRequired { channel_id: ChannelId },

    /// Legacy-node migration notice, surfaced for phones coming from an
    /// older app generation (see `wire::trampoline::PhoenixAndroidLegacyInfo`).
    LegacyMigrationInfo { has_channels: bool },
}
