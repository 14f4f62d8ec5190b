// Messages specific to a single-trusted-trampoline-peer mobile client: the
// pay-to-open / swap-in funding request flow, legacy-wallet handshake info
// and push-notification token registration. None of these are part of the
// base BOLT specifications; they are the wire surface of this node's
// trampoline relationship with its one peer.

use bitcoin::BlockHash;

use crate::tlv::Stream as TlvStream;

/// Identifies a single swap-in / pay-to-open request end to end, so the
/// peer's eventual `pay_to_open_request` can be matched back to the
/// `please_open_channel` that triggered it.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Display, Default)]
#[derive(LightningEncode, LightningDecode)]
#[cfg_attr(feature = "strict_encoding", derive(StrictEncode, StrictDecode))]
#[display(LowerHex)]
pub struct RequestId([u8; 16]);

impl RequestId {
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        RequestId(bytes)
    }

    pub fn to_bytes(self) -> [u8; 16] {
        self.0
    }
}

impl std::fmt::LowerHex for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for byte in self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// Sent when the swap-in manager has confirmed wallet inputs but no
/// splice-capable channel exists to receive them: asks the trampoline peer
/// to open (or splice into) a channel funded by those inputs.
#[derive(Clone, PartialEq, Eq, Debug, Display)]
#[derive(LightningEncode, LightningDecode)]
#[cfg_attr(feature = "strict_encoding", derive(StrictEncode, StrictDecode))]
#[lightning_encoding(use_tlv)]
#[display("please_open_channel({chain_hash}, {request_id}, {balance_satoshis}, {num_inputs}, {weight})")]
pub struct PleaseOpenChannel {
    pub chain_hash: BlockHash,
    pub request_id: RequestId,
    pub balance_satoshis: u64,
    pub num_inputs: u32,
    /// Estimated weight of the spliced/opening transaction's inputs, used by
    /// the peer to size its funding fee quote without seeing the UTXOs.
    pub weight: u32,

    /// Txids of the confirmed transactions funding each wallet input, so the
    /// peer can independently verify input maturity from its own chain view.
    pub grandparents: Vec<bitcoin::Txid>,

    #[lightning_encoding(unknown_tlvs)]
    pub unknown_tlvs: TlvStream,
}

/// The trampoline peer's funding-fee quote in response to
/// [`PleaseOpenChannel`]: the client accepts by proceeding with
/// `open_channel2`/`splice_init` referencing the same `request_id`, or lets
/// it lapse.
#[derive(Clone, PartialEq, Eq, Debug, Display)]
#[derive(LightningEncode, LightningDecode)]
#[cfg_attr(feature = "strict_encoding", derive(StrictEncode, StrictDecode))]
#[lightning_encoding(use_tlv)]
#[display("pay_to_open_request({request_id}, {amount_msat}, {fee_satoshis})")]
pub struct PayToOpenRequest {
    pub chain_hash: BlockHash,
    pub request_id: RequestId,
    pub amount_msat: u64,
    pub fee_satoshis: u64,
    pub payment_hash: bitcoin::hashes::sha256::Hash,
    pub expiry: u32,

    #[lightning_encoding(unknown_tlvs)]
    pub unknown_tlvs: TlvStream,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Display)]
#[derive(LightningEncode, LightningDecode)]
#[cfg_attr(feature = "strict_encoding", derive(StrictEncode, StrictDecode))]
pub enum PayToOpenResult {
    #[display("accepted")]
    Accepted,
    #[display("rejected")]
    Rejected,
}

#[derive(Clone, PartialEq, Eq, Debug, Display)]
#[derive(LightningEncode, LightningDecode)]
#[cfg_attr(feature = "strict_encoding", derive(StrictEncode, StrictDecode))]
#[display("pay_to_open_response({request_id}, {result})")]
pub struct PayToOpenResponse {
    pub request_id: RequestId,
    pub result: PayToOpenResult,
    pub payment_preimage: Option<[u8; 32]>,
}

/// Sent once, right after `init`, so the trampoline peer can special-case a
/// client migrating from a legacy Android wallet that has no splicing
/// support and needs its old channels treated as final rather than
/// swap-in-backed.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Display)]
#[derive(LightningEncode, LightningDecode)]
#[cfg_attr(feature = "strict_encoding", derive(StrictEncode, StrictDecode))]
#[display("phoenix_android_legacy_info({has_channels})")]
pub struct PhoenixAndroidLegacyInfo {
    pub has_channels: bool,
}

#[derive(Clone, PartialEq, Eq, Debug, Display)]
#[derive(LightningEncode, LightningDecode)]
#[cfg_attr(feature = "strict_encoding", derive(StrictEncode, StrictDecode))]
#[display("fcm_token({token})")]
pub struct FcmToken {
    /// Firebase Cloud Messaging token the trampoline peer should push a
    /// wake-up notification to when it has a pending `pay_to_open_request`
    /// and the client's transport connection is not currently open.
    pub token: String,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Display)]
#[derive(LightningEncode, LightningDecode)]
#[cfg_attr(feature = "strict_encoding", derive(StrictEncode, StrictDecode))]
#[display("unset_fcm_token")]
pub struct UnsetFcmToken;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_id_roundtrips_through_raw_bytes() {
        let bytes = [7u8; 16];
        let id = RequestId::from_bytes(bytes);
        assert_eq!(id.to_bytes(), bytes);
    }
}
