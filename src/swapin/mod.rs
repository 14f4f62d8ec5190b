// Swap-in (§4.3): turning on-chain wallet UTXOs into inbound Lightning
// liquidity by asking the trusted trampoline peer to open (or splice into)
// a channel, via `please_open_channel`/BOLT-12's pay-to-open extension.

use std::collections::HashSet;

use amplify::Wrapper;
use bitcoin::{OutPoint, Txid};
use thiserror::Error;

use crate::config::SwapInParams;
use crate::wallet::{Satoshi, UnspentItem, WalletSnapshot};
use wire::trampoline::{PayToOpenRequest, PayToOpenResponse, PayToOpenResult, PleaseOpenChannel, RequestId};

#[derive(Clone, Debug, Error)]
pub enum SwapInError {
    #[error("no eligible UTXOs: wallet holds funds but none meet the confirmation window")]
    NoEligibleUtxos,

    #[error("requested amount {requested} exceeds eligible UTXO total {available}")]
    InsufficientFunds { requested: Satoshi, available: Satoshi },

    #[error("estimated fee {fee} sat exceeds policy limit {limit} sat")]
    FeeExceedsPolicy { fee: u64, limit: u64 },

    #[error("pay-to-open is disabled by local policy")]
    PayToOpenDisabled,

    /// §4.4's pay-to-open boundary scenario: no `Normal` channel exists yet,
    /// but one is already mid-open/mid-splice, so accepting now would race
    /// that channel's own funding flow.
    #[error("a channel is already initializing; pay-to-open is rejected until it reaches Normal")]
    ChannelInitializing,
}

/// Selects UTXOs eligible for a swap-in (§4.3): confirmed within
/// `[min_confirmations, max_confirmations]`. `max_confirmations` is set
/// well short of `refund_delay` (enforced by [`SwapInParams`]'s own
/// invariant) precisely so a UTXO never sits this close to its refund
/// path becoming spendable while still being offered as swap-in input.
pub fn eligible_utxos<'a>(
    utxos: impl IntoIterator<Item = &'a UnspentItem>,
    current_height: u32,
    params: &SwapInParams,
) -> Vec<&'a UnspentItem> {
    utxos
        .into_iter()
        .filter(|u| {
            let confs = u.confirmations(current_height);
            confs >= params.min_confirmations && confs <= params.max_confirmations
        })
        .collect()
}

/// Greedily selects UTXOs (largest first) until `target` is covered,
/// returning the selected set and its total. `None` if the eligible set
/// can't cover `target` at all.
pub fn select_utxos<'a>(
    mut eligible: Vec<&'a UnspentItem>,
    target: Satoshi,
) -> Option<(Vec<&'a UnspentItem>, Satoshi)> {
    eligible.sort_by_key(|u| std::cmp::Reverse(u.amount));
    let mut total = Satoshi::from(0u64);
    let mut selected = Vec::new();
    for utxo in eligible {
        if total >= target {
            break;
        }
        total = Satoshi::from(total.into_inner() + utxo.amount.into_inner());
        selected.push(utxo);
    }
    if total >= target {
        Some((selected, total))
    } else {
        None
    }
}

/// Builds the `please_open_channel` request for a chosen UTXO set (§4.3).
/// `grandparents` lets the peer verify the selected inputs' own funding
/// chain without a second round-trip, per BOLT-12's swap-in extension.
pub fn build_please_open_channel(
    chain_hash: bitcoin::BlockHash,
    request_id: RequestId,
    selected: &[&UnspentItem],
    grandparents: Vec<bitcoin::Txid>,
) -> PleaseOpenChannel {
    let balance_satoshis: u64 = selected.iter().map(|u| u.amount.into_inner()).sum();
    PleaseOpenChannel {
        chain_hash,
        request_id,
        balance_satoshis,
        num_inputs: selected.len() as u32,
        // Standard P2WPKH input weight; a real estimate would come from the
        // actual scripts once the wallet's output descriptors are known.
        weight: selected.len() as u32 * 272,
        grandparents,
        unknown_tlvs: Default::default(),
    }
}

/// Evaluates whether an incoming `pay_to_open_request` should be accepted
/// (§4.3, §7's `LiquidityPolicy`): the peer is offering to front an HTLC
/// against a not-yet-existing (or under-provisioned) channel, for a fee.
/// `any_channel_initializing` is `true` when no `Normal` channel exists but
/// a `WaitForFunding*`/`WaitForChannelReady` one does (§4.4's boundary
/// scenario: accepting here would race that channel's own funding flow).
pub fn evaluate_pay_to_open(
    request: &PayToOpenRequest,
    policy: &crate::config::LiquidityPolicy,
    assumed_channel_open_vbytes: u64,
    any_channel_initializing: bool,
) -> Result<(), SwapInError> {
    if !policy.allow_pay_to_open {
        return Err(SwapInError::PayToOpenDisabled);
    }
    if any_channel_initializing {
        return Err(SwapInError::ChannelInitializing);
    }
    if request.fee_satoshis > policy.max_absolute_fee_sat {
        return Err(SwapInError::FeeExceedsPolicy {
            fee: request.fee_satoshis,
            limit: policy.max_absolute_fee_sat,
        });
    }
    let implied_feerate = request.fee_satoshis.saturating_div(assumed_channel_open_vbytes.max(1));
    if implied_feerate > policy.max_fee_rate_sat_per_vbyte as u64 {
        return Err(SwapInError::FeeExceedsPolicy {
            fee: implied_feerate,
            limit: policy.max_fee_rate_sat_per_vbyte as u64,
        });
    }
    Ok(())
}

pub fn accept_pay_to_open(request_id: RequestId, preimage: [u8; 32]) -> PayToOpenResponse {
    PayToOpenResponse { request_id, result: PayToOpenResult::Accepted, payment_preimage: Some(preimage) }
}

pub fn reject_pay_to_open(request_id: RequestId) -> PayToOpenResponse {
    PayToOpenResponse { request_id, result: PayToOpenResult::Rejected, payment_preimage: None }
}

/// Tracks wallet UTXOs currently committed to an in-flight funding/splice
/// so two concurrent operations can't both spend the same coin (§4.3's
/// `ChannelAction::ReserveUtxos`). Purely in-memory: a reservation is only
/// ever as durable as the orchestrator process itself, which is fine since
/// losing it just means re-deriving eligibility from the wallet snapshot
/// on restart.
#[derive(Default)]
pub struct ReservationTracker {
    reserved: std::collections::HashSet<bitcoin::OutPoint>,
}

impl ReservationTracker {
    pub fn new() -> Self { Self::default() }

    /// Reserves every UTXO in `candidates`, returning `false` (reserving
    /// nothing) if any of them is already committed elsewhere.
    pub fn try_reserve(&mut self, candidates: &[bitcoin::OutPoint]) -> bool {
        if candidates.iter().any(|o| self.reserved.contains(o)) {
            return false;
        }
        self.reserved.extend(candidates.iter().copied());
        true
    }

    pub fn release(&mut self, candidates: &[bitcoin::OutPoint]) {
        for o in candidates {
            self.reserved.remove(o);
        }
    }

    pub fn is_reserved(&self, outpoint: &bitcoin::OutPoint) -> bool { self.reserved.contains(outpoint) }

    /// The full §4.3 selection rule in one call: skip anything already
    /// reserved or already committed to a known channel funding, accept a
    /// UTXO within `[min_confirmations, max_confirmations]` as long as it
    /// isn't already close enough to its refund path
    /// (`refund_delay - confs <= 0`), and bypass the confirmation window
    /// entirely for a migration `trusted_txs` parent. Reserves every
    /// outpoint it selects before returning, so a second concurrent call
    /// against the same wallet snapshot can never double-offer a coin.
    pub fn try_swap_in(
        &mut self,
        current_height: u32,
        wallet: &WalletSnapshot,
        params: &SwapInParams,
        channel_utxos: &HashSet<OutPoint>,
        trusted_txs: &HashSet<Txid>,
    ) -> Option<SwapInRequest> {
        let selected: Vec<UnspentItem> = wallet
            .all_utxos()
            .filter(|utxo| {
                let outpoint = utxo.outpoint();
                if self.reserved.contains(&outpoint) || channel_utxos.contains(&outpoint) {
                    return false;
                }
                if trusted_txs.contains(&utxo.parent_txid) {
                    return true;
                }
                let confs = utxo.confirmations(current_height);
                if confs < params.min_confirmations || confs > params.max_confirmations {
                    return false;
                }
                params.refund_delay > confs
            })
            .cloned()
            .collect();

        if selected.is_empty() {
            return None;
        }

        let outpoints: Vec<OutPoint> = selected.iter().map(UnspentItem::outpoint).collect();
        self.reserved.extend(outpoints);
        Some(SwapInRequest { request_id: RequestId::from_bytes(*uuid::Uuid::new_v4().as_bytes()), wallet_inputs: selected })
    }
}

/// The single channel-open/splice request [`ReservationTracker::try_swap_in`]
/// produces for a wallet snapshot, already holding its inputs reserved
/// (§4.3).
#[derive(Clone, Debug)]
pub struct SwapInRequest {
    pub request_id: RequestId,
    pub wallet_inputs: Vec<UnspentItem>,
}

#[cfg(test)]
mod tests {
    use bitcoin::hashes::Hash;

    use super::*;

    fn utxo(amount: u64, block_height: u32) -> UnspentItem {
        // Each call gets a distinct output_index (the amount, which is
        // always unique across the UTXOs in any one test here) so two
        // UTXOs in the same wallet never collide on the same `OutPoint`.
        UnspentItem {
            parent_txid: bitcoin::Txid::default(),
            output_index: amount as u32,
            amount: Satoshi::from(amount),
            block_height,
        }
    }

    #[test]
    fn select_utxos_picks_largest_first_until_target_met() {
        let a = utxo(10_000, 100);
        let b = utxo(30_000, 100);
        let c = utxo(5_000, 100);
        let (selected, total) =
            select_utxos(vec![&a, &b, &c], Satoshi::from(20_000u64)).expect("covers target");
        assert_eq!(selected.len(), 1);
        assert_eq!(total, Satoshi::from(30_000u64));
    }

    #[test]
    fn select_utxos_returns_none_when_total_is_insufficient() {
        let a = utxo(1_000, 100);
        assert!(select_utxos(vec![&a], Satoshi::from(5_000u64)).is_none());
    }

    #[test]
    fn evaluate_pay_to_open_rejects_when_policy_disables_it() {
        let policy = crate::config::LiquidityPolicy { allow_pay_to_open: false, ..Default::default() };
        let request = PayToOpenRequest {
            chain_hash: bitcoin::BlockHash::default(),
            request_id: RequestId::from_bytes([0u8; 16]),
            amount_msat: 1_000_000,
            fee_satoshis: 10,
            payment_hash: bitcoin::hashes::sha256::Hash::from_inner([0u8; 32]),
            expiry: 3600,
            unknown_tlvs: Default::default(),
        };
        let err = evaluate_pay_to_open(&request, &policy, 200, false).unwrap_err();
        assert!(matches!(err, SwapInError::PayToOpenDisabled));
    }

    // §8 boundary scenario: pay-to-open is rejected while a channel is
    // mid-open/mid-splice and no `Normal` fallback exists yet.
    #[test]
    fn evaluate_pay_to_open_rejects_while_a_channel_is_initializing() {
        let policy = crate::config::LiquidityPolicy::default();
        let request = PayToOpenRequest {
            chain_hash: bitcoin::BlockHash::default(),
            request_id: RequestId::from_bytes([0u8; 16]),
            amount_msat: 1_000_000,
            fee_satoshis: 10,
            payment_hash: bitcoin::hashes::sha256::Hash::from_inner([0u8; 32]),
            expiry: 3600,
            unknown_tlvs: Default::default(),
        };
        let err = evaluate_pay_to_open(&request, &policy, 200, true).unwrap_err();
        assert!(matches!(err, SwapInError::ChannelInitializing));
    }

    #[test]
    fn reservation_tracker_refuses_a_double_spend_of_the_same_utxo() {
        let mut tracker = ReservationTracker::new();
        let outpoint = bitcoin::OutPoint::new(bitcoin::Txid::default(), 0);
        assert!(tracker.try_reserve(&[outpoint]));
        assert!(!tracker.try_reserve(&[outpoint]));
        tracker.release(&[outpoint]);
        assert!(tracker.try_reserve(&[outpoint]));
    }

    fn wallet_with(utxos: Vec<UnspentItem>) -> WalletSnapshot {
        let mut snapshot = WalletSnapshot::default();
        snapshot.utxos_by_address.insert("addr".to_string(), utxos);
        snapshot
    }

    // §8 scenario 6: a deeply confirmed UTXO is selected, a barely-confirmed
    // one below `min_confirmations` is not.
    #[test]
    fn try_swap_in_respects_the_confirmation_window() {
        let deep = utxo(100_000, 100);
        let shallow = utxo(50_000, 149);
        let wallet = wallet_with(vec![deep.clone(), shallow.clone()]);
        let params = SwapInParams { min_confirmations: 3, max_confirmations: 720, refund_delay: 2016 };

        let mut tracker = ReservationTracker::new();
        let request = tracker
            .try_swap_in(150, &wallet, &params, &Default::default(), &Default::default())
            .expect("deep utxo is eligible");

        assert_eq!(request.wallet_inputs.len(), 1);
        assert_eq!(request.wallet_inputs[0].block_height, 100);
    }

    // §8 scenario 7: a second call against the same (unchanged) wallet
    // yields nothing until the first request's inputs are unlocked.
    #[test]
    fn try_swap_in_reserves_inputs_until_unlocked() {
        let deep = utxo(100_000, 100);
        let wallet = wallet_with(vec![deep]);
        let params = SwapInParams::default();

        let mut tracker = ReservationTracker::new();
        let first = tracker
            .try_swap_in(500, &wallet, &params, &Default::default(), &Default::default())
            .expect("first call reserves the utxo");
        assert!(tracker
            .try_swap_in(500, &wallet, &params, &Default::default(), &Default::default())
            .is_none());

        let outpoints: Vec<bitcoin::OutPoint> =
            first.wallet_inputs.iter().map(UnspentItem::outpoint).collect();
        tracker.release(&outpoints);

        assert!(tracker
            .try_swap_in(500, &wallet, &params, &Default::default(), &Default::default())
            .is_some());
    }

    #[test]
    fn try_swap_in_skips_utxos_already_claimed_by_a_known_channel() {
        let deep = utxo(100_000, 100);
        let outpoint = deep.outpoint();
        let wallet = wallet_with(vec![deep]);
        let params = SwapInParams::default();
        let mut channel_utxos = std::collections::HashSet::new();
        channel_utxos.insert(outpoint);

        let mut tracker = ReservationTracker::new();
        assert!(tracker.try_swap_in(500, &wallet, &params, &channel_utxos, &Default::default()).is_none());
    }

    #[test]
    fn try_swap_in_bypasses_confirmation_window_for_trusted_migration_txids() {
        let unconfirmed = utxo(100_000, 0);
        let parent_txid = unconfirmed.parent_txid;
        let wallet = wallet_with(vec![unconfirmed]);
        let params = SwapInParams::default();
        let mut trusted = std::collections::HashSet::new();
        trusted.insert(parent_txid);

        let mut tracker = ReservationTracker::new();
        let request = tracker
            .try_swap_in(500, &wallet, &params, &Default::default(), &trusted)
            .expect("trusted migration utxo bypasses the confirmation window");
        assert_eq!(request.wallet_inputs.len(), 1);
    }
}
