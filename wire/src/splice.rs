// Splicing (BOLT-2 `option_splice`): adding or removing funds from a live
// channel by negotiating a new funding transaction without closing it.

use bitcoin::{OutPoint, Txid};

use crate::ChannelId;

#[derive(Clone, PartialEq, Eq, Debug, Display)]
#[derive(LightningEncode, LightningDecode)]
#[cfg_attr(feature = "strict_encoding", derive(StrictEncode, StrictDecode))]
#[display("splice_init({channel_id}, {funding_contribution_satoshis}, {feerate_per_kw})")]
pub struct SpliceInit {
    pub channel_id: ChannelId,
    /// Signed: a negative value removes funds from the channel.
    pub funding_contribution_satoshis: i64,
    pub feerate_per_kw: u32,
    pub locktime: u32,
    pub funding_pubkey: secp256k1::PublicKey,
}

#[derive(Clone, PartialEq, Eq, Debug, Display)]
#[derive(LightningEncode, LightningDecode)]
#[cfg_attr(feature = "strict_encoding", derive(StrictEncode, StrictDecode))]
#[display("splice_ack({channel_id}, {funding_contribution_satoshis})")]
pub struct SpliceAck {
    pub channel_id: ChannelId,
    pub funding_contribution_satoshis: i64,
    pub funding_pubkey: secp256k1::PublicKey,
}

#[derive(Clone, PartialEq, Eq, Debug, Display)]
#[derive(LightningEncode, LightningDecode)]
#[cfg_attr(feature = "strict_encoding", derive(StrictEncode, StrictDecode))]
#[display("splice_locked({channel_id}, {splice_txid})")]
pub struct SpliceLocked {
    pub channel_id: ChannelId,
    pub splice_txid: Txid,
}

/// The outpoint of the confirmed splice transaction that will replace the
/// channel's current funding outpoint once `splice_locked` has been
/// exchanged in both directions.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct PendingSplice {
    pub prior_funding: OutPoint,
    pub new_funding: OutPoint,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_contribution_is_a_splice_out() {
        let init = SpliceInit {
            channel_id: ChannelId::default(),
            funding_contribution_satoshis: -50_000,
            feerate_per_kw: 253,
            locktime: 0,
            funding_pubkey: dumb_pubkey!(),
        };
        assert!(init.funding_contribution_satoshis < 0);
    }
}
