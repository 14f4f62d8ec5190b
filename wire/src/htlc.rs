// BOLT-2 HTLC update and commitment exchange messages.

use bitcoin::hashes::sha256;
use secp256k1::ecdsa::Signature;

use crate::bolt2::OnionPacket;
use crate::tlv::Stream as TlvStream;
use crate::ChannelId;

#[derive(Clone, PartialEq, Eq, Debug, Display)]
#[derive(LightningEncode, LightningDecode)]
#[cfg_attr(feature = "strict_encoding", derive(StrictEncode, StrictDecode))]
#[lightning_encoding(use_tlv)]
#[display("update_add_htlc({channel_id}, {htlc_id}, {amount_msat}, ...)")]
pub struct UpdateAddHtlc {
    pub channel_id: ChannelId,
    pub htlc_id: u64,
    pub amount_msat: u64,
    pub payment_hash: sha256::Hash,
    pub cltv_expiry: u32,
    pub onion_routing_packet: OnionPacket,

    /// The trampoline onion carried as a TLV when this node forwards the
    /// payment to its single trusted trampoline peer instead of routing it
    /// itself.
    #[lightning_encoding(tlv = 4)]
    pub trampoline_onion_packet: Option<OnionPacket>,

    #[lightning_encoding(unknown_tlvs)]
    pub unknown_tlvs: TlvStream,
}

#[derive(Clone, PartialEq, Eq, Debug, Display)]
#[derive(LightningEncode, LightningDecode)]
#[cfg_attr(feature = "strict_encoding", derive(StrictEncode, StrictDecode))]
#[display("update_fulfill_htlc({channel_id}, {htlc_id}, ...)")]
pub struct UpdateFulfillHtlc {
    pub channel_id: ChannelId,
    pub htlc_id: u64,
    pub payment_preimage: [u8; 32],
}

#[derive(Clone, PartialEq, Eq, Debug, Display)]
#[derive(LightningEncode, LightningDecode)]
#[cfg_attr(feature = "strict_encoding", derive(StrictEncode, StrictDecode))]
#[display("update_fail_htlc({channel_id}, {htlc_id}, ...)")]
pub struct UpdateFailHtlc {
    pub channel_id: ChannelId,
    pub htlc_id: u64,
    pub reason: Vec<u8>,
}

#[derive(Clone, PartialEq, Eq, Debug, Display)]
#[derive(LightningEncode, LightningDecode)]
#[cfg_attr(feature = "strict_encoding", derive(StrictEncode, StrictDecode))]
#[display("update_fail_malformed_htlc({channel_id}, {htlc_id}, {failure_code})")]
pub struct UpdateFailMalformedHtlc {
    pub channel_id: ChannelId,
    pub htlc_id: u64,
    pub sha256_of_onion: sha256::Hash,
    pub failure_code: u16,
}

#[derive(Clone, PartialEq, Eq, Debug, Display)]
#[derive(LightningEncode, LightningDecode)]
#[cfg_attr(feature = "strict_encoding", derive(StrictEncode, StrictDecode))]
#[display("commitment_signed({channel_id}, ...)")]
pub struct CommitmentSigned {
    pub channel_id: ChannelId,
    pub signature: Signature,
    pub htlc_signatures: Vec<Signature>,
}

#[derive(Clone, PartialEq, Eq, Debug, Display)]
#[derive(LightningEncode, LightningDecode)]
#[cfg_attr(feature = "strict_encoding", derive(StrictEncode, StrictDecode))]
#[display("revoke_and_ack({channel_id}, {next_per_commitment_point}, ...)")]
pub struct RevokeAndAck {
    pub channel_id: ChannelId,
    pub per_commitment_secret: [u8; 32],
    pub next_per_commitment_point: secp256k1::PublicKey,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_code_bolt4_bit_flags() {
        // BOLT-4 failure codes use the top bits to signal BADONION/PERM/NODE.
        const BADONION: u16 = 0x8000;
        const PERM: u16 = 0x4000;
        let invalid_onion_hmac = BADONION | PERM | 5;
        assert_eq!(invalid_onion_hmac & BADONION, BADONION);
    }
}
