// Splice negotiation (§4.1 "Splicing", BOLT-2 `option_splice`). The
// interactive transaction construction round trip itself
// (`tx_add_input`/`tx_add_output`/`tx_complete`/`tx_signatures`) is owned by
// [`crate::channel::process`], which drives it the same way it drives the
// initial dual-funding round trip; this module only computes the net
// contribution and turns it into the initiating/accepting messages.

use amplify::Wrapper;
use bitcoin::Script;
use wire::splice::{SpliceAck, SpliceInit};
use wire::ChannelId;

use crate::channel::command::{SpliceIn, SpliceOut};
use crate::wallet::{Satoshi, UnspentItem};

/// The net effect of a requested splice on the channel's funding amount:
/// positive adds funds, negative removes them.
pub fn net_contribution(splice_in: &Option<SpliceIn>, splice_out: &Option<SpliceOut>) -> i64 {
    let added: u64 = splice_in
        .as_ref()
        .map(|i| i.wallet_inputs.iter().map(|u| u.amount.into_inner()).sum())
        .unwrap_or(0);
    let removed = splice_out.as_ref().map(|o| o.amount.into_inner()).unwrap_or(0);
    added as i64 - removed as i64
}

pub fn build_splice_init(
    channel_id: ChannelId,
    contribution_sats: i64,
    feerate_per_kw: u32,
    funding_pubkey: secp256k1::PublicKey,
) -> SpliceInit {
    SpliceInit {
        channel_id,
        funding_contribution_satoshis: contribution_sats,
        feerate_per_kw,
        locktime: 0,
        funding_pubkey,
    }
}

pub fn build_splice_ack(
    channel_id: ChannelId,
    our_contribution_sats: i64,
    funding_pubkey: secp256k1::PublicKey,
) -> SpliceAck {
    SpliceAck { channel_id, funding_contribution_satoshis: our_contribution_sats, funding_pubkey }
}

/// Whether a splice-out's destination is one we can hand straight to the
/// interactive tx builder, or whether it must first be produced by our own
/// wallet (the splice-out destination always is: §4.1 only lets a channel
/// peer contribute inputs, never choose our outputs).
pub fn validate_splice_out_script(script_pubkey: &Script) -> bool {
    !script_pubkey.is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splice_out_only_is_a_negative_contribution() {
        let out = SpliceOut { amount: Satoshi::from(50_000u64), script_pubkey: Script::new() };
        assert_eq!(net_contribution(&None, &Some(out)), -50_000);
    }
}
