// Mutual close fee negotiation extensions on top of the base
// shutdown/closing_signed exchange in [`crate::bolt2`].

use secp256k1::ecdsa::Signature;

use crate::tlv::Stream as TlvStream;
use crate::ChannelId;

/// `closing_signed`'s `fee_range` TLV: bounds within which the sender will
/// accept a counter-proposed fee, letting both sides converge in one round
/// trip instead of repeatedly bisecting.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Display)]
#[derive(LightningEncode, LightningDecode)]
#[cfg_attr(feature = "strict_encoding", derive(StrictEncode, StrictDecode))]
#[display("fee_range({min_fee_satoshis}..={max_fee_satoshis})")]
pub struct FeeRange {
    pub min_fee_satoshis: u64,
    pub max_fee_satoshis: u64,
}

impl FeeRange {
    pub fn overlaps(&self, other: &FeeRange) -> bool {
        self.min_fee_satoshis <= other.max_fee_satoshis
            && other.min_fee_satoshis <= self.max_fee_satoshis
    }

    /// The fee both sides can agree to without another round trip: the
    /// midpoint of the overlapping range, per BOLT-2.
    pub fn agreed_fee(&self, other: &FeeRange) -> Option<u64> {
        if !self.overlaps(other) {
            return None;
        }
        let lo = self.min_fee_satoshis.max(other.min_fee_satoshis);
        let hi = self.max_fee_satoshis.min(other.max_fee_satoshis);
        Some(lo + (hi - lo) / 2)
    }
}

/// RBF'd mutual close, replacing plain `closing_signed` once both peers
/// support `option_simple_close`: either side may resend a higher-feerate
/// `closing_complete` until one signature set confirms.
#[derive(Clone, PartialEq, Eq, Debug, Display)]
#[derive(LightningEncode, LightningDecode)]
#[cfg_attr(feature = "strict_encoding", derive(StrictEncode, StrictDecode))]
#[lightning_encoding(use_tlv)]
#[display("closing_complete({channel_id}, {fee_satoshis}, {locktime})")]
pub struct ClosingComplete {
    pub channel_id: ChannelId,
    pub fee_satoshis: u64,
    pub locktime: u32,

    #[lightning_encoding(unknown_tlvs)]
    pub unknown_tlvs: TlvStream,
}

#[derive(Clone, PartialEq, Eq, Debug, Display)]
#[derive(LightningEncode, LightningDecode)]
#[cfg_attr(feature = "strict_encoding", derive(StrictEncode, StrictDecode))]
#[display("closing_sig({channel_id}, ...)")]
pub struct ClosingSig {
    pub channel_id: ChannelId,
    pub closer_and_closee_signature: Signature,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disjoint_ranges_do_not_agree() {
        let ours = FeeRange { min_fee_satoshis: 1000, max_fee_satoshis: 2000 };
        let theirs = FeeRange { min_fee_satoshis: 3000, max_fee_satoshis: 4000 };
        assert_eq!(ours.agreed_fee(&theirs), None);
    }

    #[test]
    fn overlapping_ranges_agree_on_midpoint() {
        let ours = FeeRange { min_fee_satoshis: 1000, max_fee_satoshis: 3000 };
        let theirs = FeeRange { min_fee_satoshis: 2000, max_fee_satoshis: 4000 };
        assert_eq!(ours.agreed_fee(&theirs), Some(2500));
    }
}
