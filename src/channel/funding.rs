// One channel's current funding transaction (§3): either the initial
// funding negotiated through dual-funding, or a later splice replacing it.
// Built from the interactive transaction construction protocol
// (`tx_add_input`/`tx_add_output`/`tx_complete`, BOLT-2 `option_dual_fund`),
// not a single-shot PSBT the way the teacher's legacy single-funder
// `Funding` was.

use bitcoin::{OutPoint, Script};

use crate::wallet::Satoshi;

/// The funding output backing one [`super::commitments::Commitment`], plus
/// enough bookkeeping to track its confirmation and the wallet inputs that
/// contributed to it (needed by the swap-in manager to compute
/// `channelUtxos`, §4.3).
#[derive(Clone, Debug, StrictEncode, StrictDecode)]
pub struct FundingInfo {
    pub outpoint: OutPoint,
    pub script_pubkey: Script,
    pub amount: Satoshi,

    /// Wallet inputs we contributed to this funding transaction (empty for
    /// a funding this node did not fund itself, e.g. a peer-initiated
    /// `please_open_channel` reply where the peer is the sole funder).
    pub contributed_inputs: Vec<OutPoint>,

    /// Confirmations required before `channel_ready`/`splice_locked` may be
    /// exchanged.
    pub min_depth: u32,
    /// Set once the funding transaction is observed on chain.
    pub confirmed_height: Option<u32>,
    /// Set once `channel_ready`/`splice_locked` has been exchanged in both
    /// directions for this funding.
    pub locked: bool,
}

impl FundingInfo {
    pub fn is_confirmed(&self) -> bool {
        self.confirmed_height.is_some()
    }

    pub fn depth(&self, current_tip: u32) -> u32 {
        match self.confirmed_height {
            Some(h) if current_tip >= h => current_tip - h + 1,
            _ => 0,
        }
    }

    pub fn reaches_min_depth(&self, current_tip: u32) -> bool {
        self.depth(current_tip) >= self.min_depth
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::hashes::Hash;
    use bitcoin::Txid;

    fn funding(min_depth: u32, confirmed_height: Option<u32>) -> FundingInfo {
        FundingInfo {
            outpoint: OutPoint::new(Txid::all_zeros(), 0),
            script_pubkey: Script::new(),
            amount: Satoshi::from(100_000u64),
            contributed_inputs: vec![],
            min_depth,
            confirmed_height,
            locked: false,
        }
    }

    #[test]
    fn unconfirmed_funding_has_zero_depth() {
        let f = funding(3, None);
        assert_eq!(f.depth(1_000), 0);
        assert!(!f.reaches_min_depth(1_000));
    }

    #[test]
    fn depth_is_inclusive_of_the_confirming_block() {
        let f = funding(3, Some(100));
        assert_eq!(f.depth(100), 1);
        assert_eq!(f.depth(102), 3);
        assert!(f.reaches_min_depth(102));
        assert!(!f.reaches_min_depth(101));
    }
}
