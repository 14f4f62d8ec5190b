// BOLT-2 `channel_reestablish` and the data-loss-protection fields that let
// a mobile client recover after it reconnects from an out-of-date backup.

use secp256k1::PublicKey;

use crate::tlv::Stream as TlvStream;
use crate::ChannelId;

#[derive(Clone, PartialEq, Eq, Debug, Display)]
#[derive(LightningEncode, LightningDecode)]
#[cfg_attr(feature = "strict_encoding", derive(StrictEncode, StrictDecode))]
#[lightning_encoding(use_tlv)]
#[display("channel_reestablish({channel_id}, {next_commitment_number}, {next_revocation_number})")]
pub struct ChannelReestablish {
    pub channel_id: ChannelId,
    pub next_commitment_number: u64,
    pub next_revocation_number: u64,

    /// Proof that the sender has fallen behind: the per-commitment secret of
    /// the recipient's last revoked state. All-zero when the sender has no
    /// prior state to prove (e.g. a fresh channel).
    pub your_last_per_commitment_secret: [u8; 32],

    pub my_current_per_commitment_point: PublicKey,

    /// Our persisted channel backup, so a mobile client that reconnects
    /// after an app reinstall can prove its obligations to the counterparty
    /// without replaying the whole channel history locally.
    #[lightning_encoding(tlv = 0)]
    pub channel_data: Option<Vec<u8>>,

    #[lightning_encoding(unknown_tlvs)]
    pub unknown_tlvs: TlvStream,
}

impl ChannelReestablish {
    /// `true` when `your_last_per_commitment_secret` proves the counterparty
    /// holds a commitment state more recent than ours, per the
    /// data-loss-protection rule in BOLT-2: we must not broadcast and should
    /// request recovery instead.
    pub fn signals_data_loss(&self, expected_secret: Option<[u8; 32]>) -> bool {
        match expected_secret {
            Some(expected) => {
                self.your_last_per_commitment_secret != [0u8; 32]
                    && self.your_last_per_commitment_secret != expected
            }
            None => self.your_last_per_commitment_secret != [0u8; 32],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_zero_secret_signals_fresh_channel() {
        let msg = ChannelReestablish {
            channel_id: ChannelId::default(),
            next_commitment_number: 1,
            next_revocation_number: 0,
            your_last_per_commitment_secret: [0u8; 32],
            my_current_per_commitment_point: dumb_pubkey!(),
            channel_data: None,
            unknown_tlvs: TlvStream::default(),
        };
        assert!(!msg.signals_data_loss(None));
    }

    #[test]
    fn mismatched_secret_signals_data_loss() {
        let msg = ChannelReestablish {
            channel_id: ChannelId::default(),
            next_commitment_number: 1,
            next_revocation_number: 0,
            your_last_per_commitment_secret: [7u8; 32],
            my_current_per_commitment_point: dumb_pubkey!(),
            channel_data: None,
            unknown_tlvs: TlvStream::default(),
        };
        assert!(msg.signals_data_loss(Some([9u8; 32])));
    }
}
