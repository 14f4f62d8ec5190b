// Wallet snapshot types (§3) and the two money newtypes used throughout the
// crate so a call site cannot silently mix satoshi and millisatoshi units.

use std::collections::BTreeMap;
use std::ops::{Add, Sub};

use bitcoin::{OutPoint, Transaction, Txid};

/// An amount in satoshis (on-chain granularity).
#[derive(
    Wrapper, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Display, From,
)]
#[display("{0} sat")]
pub struct Satoshi(u64);

/// An amount in millisatoshis (Lightning granularity).
#[derive(
    Wrapper, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Display, From,
)]
#[display("{0} msat")]
pub struct MilliSatoshi(u64);

impl MilliSatoshi {
    pub const ZERO: MilliSatoshi = MilliSatoshi(0);

    pub fn sats_floor(self) -> Satoshi {
        Satoshi(self.0 / 1000)
    }
}

impl From<Satoshi> for MilliSatoshi {
    fn from(sat: Satoshi) -> Self {
        MilliSatoshi(sat.0 * 1000)
    }
}

impl Add for MilliSatoshi {
    type Output = MilliSatoshi;
    fn add(self, rhs: Self) -> Self::Output {
        MilliSatoshi(self.0 + rhs.0)
    }
}

impl Sub for MilliSatoshi {
    type Output = MilliSatoshi;
    fn sub(self, rhs: Self) -> Self::Output {
        MilliSatoshi(self.0.saturating_sub(rhs.0))
    }
}

/// A single unspent output known to the wallet, as surfaced by the
/// `ChainWatcher` collaborator.
#[derive(Clone, Debug)]
pub struct UnspentItem {
    pub parent_txid: Txid,
    pub output_index: u32,
    pub amount: Satoshi,
    /// Zero means unconfirmed.
    pub block_height: u32,
}

impl UnspentItem {
    pub fn outpoint(&self) -> OutPoint {
        OutPoint::new(self.parent_txid, self.output_index)
    }

    pub fn confirmations(&self, current_height: u32) -> u32 {
        if self.block_height == 0 {
            0
        } else {
            current_height.saturating_sub(self.block_height) + 1
        }
    }
}

/// A snapshot of the wallet's unspent outputs, keyed by owning address, plus
/// the parent transactions referenced by those outputs (needed to build
/// interactive-tx `tx_add_input` messages without a second round-trip to the
/// chain watcher).
#[derive(Clone, Debug, Default)]
pub struct WalletSnapshot {
    pub utxos_by_address: BTreeMap<String, Vec<UnspentItem>>,
    pub parent_txs: BTreeMap<Txid, Transaction>,
}

impl WalletSnapshot {
    pub fn all_utxos(&self) -> impl Iterator<Item = &UnspentItem> {
        self.utxos_by_address.values().flatten()
    }

    /// `true` if every UTXO's parent transaction is present in the
    /// snapshot.
    pub fn is_consistent(&self) -> bool {
        self.all_utxos()
            .all(|utxo| self.parent_txs.contains_key(&utxo.parent_txid))
    }
}

#[cfg(test)]
mod tests {
    use bitcoin::hashes::Hash;

    use super::*;

    #[test]
    fn msat_to_sat_floors() {
        assert_eq!(MilliSatoshi(1999).sats_floor(), Satoshi(1));
    }

    #[test]
    fn confirmations_treats_unconfirmed_as_zero() {
        let utxo = UnspentItem {
            parent_txid: Txid::all_zeros(),
            output_index: 0,
            amount: Satoshi(1000),
            block_height: 0,
        };
        assert_eq!(utxo.confirmations(500), 0);
    }

    #[test]
    fn confirmations_are_inclusive_of_the_confirming_block() {
        let utxo = UnspentItem {
            parent_txid: Txid::all_zeros(),
            output_index: 0,
            amount: Satoshi(1000),
            block_height: 100,
        };
        assert_eq!(utxo.confirmations(100), 1);
    }
}
