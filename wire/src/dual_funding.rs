// Dual-funding channel establishment (BOLT-2 `option_dual_fund`) and the
// interactive transaction construction protocol it is built on top of.

use bitcoin::{BlockHash, OutPoint, Script, Txid};
use secp256k1::ecdsa::Signature;
use secp256k1::PublicKey;

use crate::tlv::Stream as TlvStream;
use crate::{ChannelId, TempChannelId};

#[derive(Clone, PartialEq, Eq, Debug, Display)]
#[derive(LightningEncode, LightningDecode)]
#[cfg_attr(feature = "strict_encoding", derive(StrictEncode, StrictDecode))]
#[lightning_encoding(use_tlv)]
#[display("open_channel2({chain_hash}, {temporary_channel_id}, {funding_satoshis}, ...)")]
pub struct OpenChannel2 {
    pub chain_hash: BlockHash,
    pub temporary_channel_id: TempChannelId,
    pub funding_feerate_per_kw: u32,
    pub commitment_feerate_per_kw: u32,
    pub funding_satoshis: u64,
    pub dust_limit_satoshis: u64,
    pub max_htlc_value_in_flight_msat: u64,
    pub htlc_minimum_msat: u64,
    pub to_self_delay: u16,
    pub max_accepted_htlcs: u16,
    pub locktime: u32,
    pub funding_pubkey: PublicKey,
    pub revocation_basepoint: PublicKey,
    pub payment_basepoint: PublicKey,
    pub delayed_payment_basepoint: PublicKey,
    pub htlc_basepoint: PublicKey,
    pub first_per_commitment_point: PublicKey,
    pub second_per_commitment_point: PublicKey,
    pub channel_flags: u8,

    #[lightning_encoding(tlv = 0)]
    pub shutdown_scriptpubkey: Option<Script>,

    /// Minimum number of confirmations the initiator requires for funding
    /// inputs it does not control, a mobile-client addition so a peer that
    /// contributes liquidity cannot be forced to accept unconfirmed change.
    #[lightning_encoding(tlv = 2)]
    pub require_confirmed_inputs: Option<()>,

    #[lightning_encoding(unknown_tlvs)]
    pub unknown_tlvs: TlvStream,
}

#[derive(Clone, PartialEq, Eq, Debug, Display)]
#[derive(LightningEncode, LightningDecode)]
#[cfg_attr(feature = "strict_encoding", derive(StrictEncode, StrictDecode))]
#[lightning_encoding(use_tlv)]
#[display("accept_channel2({temporary_channel_id}, {funding_satoshis}, ...)")]
pub struct AcceptChannel2 {
    pub temporary_channel_id: TempChannelId,
    pub funding_satoshis: u64,
    pub dust_limit_satoshis: u64,
    pub max_htlc_value_in_flight_msat: u64,
    pub htlc_minimum_msat: u64,
    pub minimum_depth: u32,
    pub to_self_delay: u16,
    pub max_accepted_htlcs: u16,
    pub funding_pubkey: PublicKey,
    pub revocation_basepoint: PublicKey,
    pub payment_basepoint: PublicKey,
    pub delayed_payment_basepoint: PublicKey,
    pub htlc_basepoint: PublicKey,
    pub first_per_commitment_point: PublicKey,
    pub second_per_commitment_point: PublicKey,

    #[lightning_encoding(tlv = 0)]
    pub shutdown_scriptpubkey: Option<Script>,

    #[lightning_encoding(tlv = 2)]
    pub require_confirmed_inputs: Option<()>,

    #[lightning_encoding(unknown_tlvs)]
    pub unknown_tlvs: TlvStream,
}

/// One leg of the interactive transaction construction protocol (BOLT-2):
/// peers alternate adding and removing inputs/outputs until both send
/// `tx_complete`.
#[derive(Clone, PartialEq, Eq, Debug, Display)]
#[derive(LightningEncode, LightningDecode)]
#[cfg_attr(feature = "strict_encoding", derive(StrictEncode, StrictDecode))]
#[display("tx_add_input({channel_id}, {serial_id})")]
pub struct TxAddInput {
    pub channel_id: ChannelId,
    pub serial_id: u64,
    pub prevtx: Vec<u8>,
    pub prevtx_out: u32,
    pub sequence: u32,
}

#[derive(Clone, PartialEq, Eq, Debug, Display)]
#[derive(LightningEncode, LightningDecode)]
#[cfg_attr(feature = "strict_encoding", derive(StrictEncode, StrictDecode))]
#[display("tx_add_output({channel_id}, {serial_id}, {sats})")]
pub struct TxAddOutput {
    pub channel_id: ChannelId,
    pub serial_id: u64,
    pub sats: u64,
    pub scriptpubkey: Script,
}

#[derive(Clone, PartialEq, Eq, Debug, Display)]
#[derive(LightningEncode, LightningDecode)]
#[cfg_attr(feature = "strict_encoding", derive(StrictEncode, StrictDecode))]
#[display("tx_remove_input({channel_id}, {serial_id})")]
pub struct TxRemoveInput {
    pub channel_id: ChannelId,
    pub serial_id: u64,
}

#[derive(Clone, PartialEq, Eq, Debug, Display)]
#[derive(LightningEncode, LightningDecode)]
#[cfg_attr(feature = "strict_encoding", derive(StrictEncode, StrictDecode))]
#[display("tx_remove_output({channel_id}, {serial_id})")]
pub struct TxRemoveOutput {
    pub channel_id: ChannelId,
    pub serial_id: u64,
}

#[derive(Clone, PartialEq, Eq, Debug, Display)]
#[derive(LightningEncode, LightningDecode)]
#[cfg_attr(feature = "strict_encoding", derive(StrictEncode, StrictDecode))]
#[display("tx_complete({channel_id})")]
pub struct TxComplete {
    pub channel_id: ChannelId,
}

#[derive(Clone, PartialEq, Eq, Debug, Display)]
#[derive(LightningEncode, LightningDecode)]
#[cfg_attr(feature = "strict_encoding", derive(StrictEncode, StrictDecode))]
#[display("tx_signatures({channel_id}, {txid}, ...)")]
pub struct TxSignatures {
    pub channel_id: ChannelId,
    pub txid: Txid,
    pub witnesses: Vec<Vec<Vec<u8>>>,
}

#[derive(Clone, PartialEq, Eq, Debug, Display)]
#[derive(LightningEncode, LightningDecode)]
#[cfg_attr(feature = "strict_encoding", derive(StrictEncode, StrictDecode))]
#[display("tx_init_rbf({channel_id}, {locktime}, {funding_output_contribution})")]
pub struct TxInitRbf {
    pub channel_id: ChannelId,
    pub locktime: u32,
    pub feerate_per_kw: u32,
    pub funding_output_contribution: i64,
}

#[derive(Clone, PartialEq, Eq, Debug, Display)]
#[derive(LightningEncode, LightningDecode)]
#[cfg_attr(feature = "strict_encoding", derive(StrictEncode, StrictDecode))]
#[display("tx_ack_rbf({channel_id}, {funding_output_contribution})")]
pub struct TxAckRbf {
    pub channel_id: ChannelId,
    pub funding_output_contribution: i64,
}

#[derive(Clone, PartialEq, Eq, Debug, Display)]
#[derive(LightningEncode, LightningDecode)]
#[cfg_attr(feature = "strict_encoding", derive(StrictEncode, StrictDecode))]
#[display("tx_abort({channel_id}, ...)")]
pub struct TxAbort {
    pub channel_id: ChannelId,
    pub data: Vec<u8>,
}

/// Identifies a not-yet-broadcast funding transaction by its constructed
/// outpoint before `tx_signatures` has been exchanged.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct PendingFunding {
    pub outpoint: OutPoint,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serial_id_parity_marks_initiator() {
        // BOLT-2: even serial_ids belong to the funder, odd ones to the
        // fundee, so both sides can add inputs/outputs without colliding.
        let initiator_serial: u64 = 4;
        let acceptor_serial: u64 = 5;
        assert_eq!(initiator_serial % 2, 0);
        assert_eq!(acceptor_serial % 2, 1);
    }
}
