// The channel input alphabet (§4.1's "Commands").

use bitcoin::{OutPoint, Script, Transaction, Txid};
use wire::bolt1::Init;
use wire::Messages;

use crate::channel::commitments::PersistedChannel;
use crate::channel::keyset::LocalKeyset;
use crate::wallet::{Satoshi, UnspentItem};

/// A blockchain observation routed into a channel (§4.1's "Blockchain"
/// category). The chain-watcher collaborator is the producer; the
/// orchestrator only forwards.
#[derive(Clone, Debug)]
pub enum WatchEvent {
    /// The funding (or a splice) transaction reached its first confirmation.
    FundingConfirmed { outpoint: OutPoint, height: u32 },
    /// A funding output this channel knows about was spent. `spending_tx` is
    /// the full transaction so the state machine can tell our own
    /// (splice/close) spend apart from a revoked-commitment broadcast.
    FundingSpent { outpoint: OutPoint, spending_tx: Box<Transaction> },
    /// The chain tip advanced; carried separately from `CheckHtlcTimeout` so
    /// a channel can react to reorgs (e.g. a funding losing its
    /// confirmation) without re-running timeout checks.
    NewTip { height: u32 },
}

/// A request to add an outgoing HTLC, issued by
/// [`crate::payments::outgoing::OutgoingPaymentHandler`] (§4.5).
#[derive(Clone, Debug)]
pub struct AddHtlcRequest {
    pub amount_msat: u64,
    pub payment_hash: [u8; 32],
    pub cltv_expiry: u32,
    pub onion_routing_packet: wire::bolt2::OnionPacket,
    /// Correlates the eventual `ProcessCmdRes.*` action back to the
    /// originating payment part.
    pub part_id: uuid::Uuid,
}

/// One side of a requested splice (§4.1 "Splicing").
#[derive(Clone, Debug)]
pub struct SpliceIn {
    pub wallet_inputs: Vec<UnspentItem>,
}

#[derive(Clone, Debug)]
pub struct SpliceOut {
    pub amount: Satoshi,
    pub script_pubkey: Script,
}

/// `Splice.Request` (§4.1/§4.3): `reply_to` is resolved by
/// [`crate::channel::action::ChannelAction::ReplySplice`] once the
/// interactive negotiation either starts successfully or is rejected.
#[derive(Debug)]
pub struct SpliceRequest {
    pub splice_in: Option<SpliceIn>,
    pub splice_out: Option<SpliceOut>,
    pub feerate_per_kw: u32,
}

/// Historical HTLC data for a revoked commitment, fetched from storage when
/// building a penalty transaction (`Storage.GetHtlcInfos` /
/// `GetHtlcInfosResponse`, §4.1).
#[derive(Clone, Debug)]
pub struct HtlcInfo {
    pub commitment_number: u64,
    pub revoked_commitment_txid: Txid,
    pub htlc_id: u64,
    pub cltv_expiry: u32,
    pub payment_hash: [u8; 32],
    pub offered: bool,
}

/// The full channel input alphabet (§4.1).
#[derive(Debug)]
pub enum ChannelCommand {
    // -- Lifecycle --
    /// Rehydrates a channel from its last persisted state on process start.
    InitRestore(PersistedChannel),
    /// We are the funding initiator of a brand-new channel. `local_keyset`
    /// is derived up front by [`crate::collaborators::KeyManager`] so
    /// `process` itself never needs to await a collaborator (§4.1).
    InitInitiator {
        temporary_channel_id: wire::TempChannelId,
        funding_amount: Satoshi,
        push_amount_msat: u64,
        funding_feerate_per_kw: u32,
        local_keyset: LocalKeyset,
    },
    /// The peer is initiating; we are the acceptor.
    InitNonInitiator { temporary_channel_id: wire::TempChannelId, local_keyset: LocalKeyset },
    Connected { our_init: Init, their_init: Init },
    Disconnected,

    // -- Wire --
    MessageReceived(Messages),
    /// The peer orchestrator's interactive transaction builder
    /// (`connection.rs`) finished the `tx_add_input`/`tx_add_output`/
    /// `tx_complete`/`tx_signatures` round trip for this channel's funding
    /// or a splice. `process` itself never drives that per-message
    /// back-and-forth; it only consumes the finished transaction.
    FundingNegotiated {
        outpoint: OutPoint,
        script_pubkey: Script,
        amount: Satoshi,
        contributed_inputs: Vec<OutPoint>,
        min_depth: u32,
    },

    // -- Blockchain --
    WatchReceived(WatchEvent),

    // -- Commitment --
    /// Materializes buffered proposed changes into a new commitment number
    /// and sends `commitment_signed` (§4.1 "Normal operation").
    Sign,
    CheckHtlcTimeout { current_tip: u32 },
    AddHtlc(AddHtlcRequest),
    FulfillHtlc { htlc_id: u64, preimage: [u8; 32] },
    FailHtlc { htlc_id: u64, reason: Vec<u8> },
    SpliceRequest(SpliceRequest),

    // -- Closing --
    Close { script_pubkey: Option<Script>, feerate_per_kw: Option<u32> },
    ForceClose,
    /// Answers a previously-issued `GetHtlcInfos` action; `htlcs` is empty
    /// when the revoked commitment carried no outstanding HTLCs, but the
    /// main-output penalty sweep still has to happen (§4.1).
    GetHtlcInfosResponse { revoked_commitment_txid: Txid, htlcs: Vec<HtlcInfo> },
}
