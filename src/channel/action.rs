// The channel output alphabet (§4.1's "Actions"). `process` never performs
// I/O itself; it returns a list of these for the peer orchestrator to carry
// out against the collaborators (§2, §4.2).

use bitcoin::{OutPoint, Transaction};
use wire::Messages;

use crate::channel::command::HtlcInfo;
use crate::channel::commitments::PersistedChannel;
use crate::wallet::Satoshi;

/// Outcome of an `AddHtlc`/`FulfillHtlc`/`FailHtlc`/`SpliceRequest` command,
/// reported back so [`crate::payments`] and [`crate::swapin`] can resolve the
/// future they handed the orchestrator rather than polling channel state.
#[derive(Clone, Debug)]
pub enum CmdResult {
    HtlcAdded { part_id: uuid::Uuid, htlc_id: u64 },
    HtlcAddFailed { part_id: uuid::Uuid, reason: String },
    HtlcFulfilled { htlc_id: u64, preimage: [u8; 32] },
    HtlcFailed { htlc_id: u64, reason: Vec<u8> },
    SpliceAccepted,
    SpliceRejected { reason: String },
}

/// One effect a channel asks the orchestrator to perform.
#[derive(Debug)]
pub enum ChannelAction {
    /// Send a wire message to the channel's peer.
    SendMessage(Messages),

    /// Ask the chain watcher to notify on confirmation of `outpoint`'s
    /// containing transaction.
    WatchConfirmed { outpoint: OutPoint, min_depth: u32 },
    /// Ask the chain watcher to notify if `outpoint` is ever spent.
    WatchSpent { outpoint: OutPoint },
    /// Broadcast a fully-signed transaction (mutual close, force-close
    /// commitment, or a penalty transaction).
    PublishTx(Box<Transaction>),

    /// Persist the channel's durable state. Issued after every command that
    /// changes [`crate::channel::commitments::Commitments`] (§3, §6).
    Store(Box<PersistedChannel>),
    /// Delete a channel's persisted record once `Closed` is reached and its
    /// closing transaction is buried (§6).
    DeleteChannel { channel_id: wire::ChannelId },

    /// Fetch the historical HTLC set for a revoked commitment so a penalty
    /// transaction can sweep every HTLC output, not just the main outputs
    /// (§4.1).
    GetHtlcInfos { channel_id: wire::ChannelId, revoked_commitment_txid: bitcoin::Txid },

    /// Report the outcome of a previously-issued command (§4.4/§4.5/§4.3).
    Report(CmdResult),

    /// A penalty was detected and swept: surfaced as a
    /// [`crate::events::DomainEvent::ChannelClosing`].
    NotifyClosing { channel_id: wire::ChannelId },
    /// The peer's `init` advertised a feature this node no longer
    /// understands as mandatory (§4.4's upgrade-required event).
    NotifyUpgradeRequired { channel_id: wire::ChannelId },

    /// A splice or new channel open wants additional wallet UTXOs; routed to
    /// [`crate::swapin`]'s reservation bookkeeping so the same coins aren't
    /// double-spent across concurrent fundings (§4.3).
    ReserveUtxos { channel_id: wire::ChannelId, amount: Satoshi },

    /// Buffered changes were just materialized into `commitment_number`;
    /// the orchestrator must call
    /// [`crate::collaborators::KeyManager::sign_commitment`] and send the
    /// resulting `commitment_signed` itself (§4.1, §7: signing key material
    /// never enters the channel state machine).
    RequestCommitmentSignature { channel_id: wire::ChannelId, commitment_number: u64 },
    /// A `commitment_signed` was accepted; the orchestrator must derive our
    /// next revocation secret/point via `KeyManager` and send
    /// `revoke_and_ack` itself.
    RequestRevocation { channel_id: wire::ChannelId, commitment_number: u64 },
}

/// Echoes [`HtlcInfo`] back out through [`ChannelAction::Report`] style
/// plumbing when building a penalty transaction; kept distinct from
/// [`CmdResult`] since it isn't a response to a command the orchestrator
/// issued on a payment/swap's behalf.
#[derive(Clone, Debug)]
pub struct PenaltyContext {
    pub revoked_commitment_txid: bitcoin::Txid,
    pub htlcs: Vec<HtlcInfo>,
}
