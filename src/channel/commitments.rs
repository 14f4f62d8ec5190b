// Durable core of a channel (§3 "Commitments"): channel parameters, keys, and
// the active/inactive funding history. This is the only part of a channel
// that is ever persisted; everything else in [`crate::channel::state`] is
// reconstructible from it plus the command stream.

use wire::{ActiveChannelId, ChannelId, InitFeatures, TempChannelId};

use crate::channel::funding::FundingInfo;
use crate::channel::htlc::InFlightHtlc;
use crate::channel::keyset::{LocalKeyset, RemoteKeyset};
use crate::wallet::{MilliSatoshi, Satoshi};

/// Negotiated channel parameters, fixed for the lifetime of the channel
/// (splicing changes the funding, never these).
#[derive(Clone, Debug, StrictEncode, StrictDecode)]
pub struct ChannelParams {
    pub local_keyset: LocalKeyset,
    pub remote_keyset: RemoteKeyset,
    pub dust_limit: Satoshi,
    pub reserve: Satoshi,
    pub max_htlc_value_in_flight: MilliSatoshi,
    pub max_accepted_htlcs: u16,
    pub to_self_delay: u16,
    pub is_initiator: bool,
    pub features: InitFeatures,
}

/// One funding transaction's worth of commitment state. The channel keeps
/// one of these per active (unconfirmed-or-not-yet-pruned) funding; `active`
/// may briefly hold more than one while a splice is confirming (§4.1).
#[derive(Clone, Debug, StrictEncode, StrictDecode)]
pub struct Commitment {
    pub funding: FundingInfo,

    /// Commitment number on our side; strictly increases with every signed
    /// update (§3's monotonicity invariant).
    pub local_commitment_number: u64,
    /// Commitment number we believe the remote side is at.
    pub remote_commitment_number: u64,

    pub local_balance: MilliSatoshi,
    pub remote_balance: MilliSatoshi,

    pub htlcs: Vec<InFlightHtlc>,

    /// Our view of the point the remote side will use for its next
    /// commitment, needed to construct the next `commitment_signed` before
    /// we have received the matching `revoke_and_ack`.
    pub remote_next_per_commitment_point: secp256k1::PublicKey,

    /// The per-commitment secret for the commitment one before
    /// `local_commitment_number`, revealed to us by the last `revoke_and_ack`
    /// we received. `None` only before the first revocation.
    pub remote_per_commitment_secret: Option<[u8; 32]>,

    /// Proposed changes (HTLC add/fulfill/fail) buffered since the last
    /// `commitment_signed`, materializing into the next commitment number at
    /// `Sign` (§4.1 "Normal operation").
    pub proposed_local_changes: Vec<ProposedChange>,
    pub proposed_remote_changes: Vec<ProposedChange>,
}

/// A buffered but not-yet-signed HTLC change.
#[derive(Clone, Debug, StrictEncode, StrictDecode)]
pub enum ProposedChange {
    Add(InFlightHtlc),
    Fulfill { htlc_id: u64, preimage: [u8; 32] },
    Fail { htlc_id: u64, reason: Vec<u8> },
}

impl Commitment {
    /// §3 invariant: `local_balance + remote_balance + Σ(htlc amounts) ==
    /// funding_amount`.
    pub fn balances_reconcile(&self) -> bool {
        let htlc_total = self
            .htlcs
            .iter()
            .fold(MilliSatoshi::ZERO, |acc, h| acc + h.amount);
        let total = self.local_balance + self.remote_balance + htlc_total;
        MilliSatoshi::from(self.funding.amount) == total
    }

    /// One past the highest `htlc_id` committed to *or* already buffered in
    /// either proposed-change list (§4.1): several `AddHtlc`s can land
    /// between two `Sign`s, and `commitment.htlcs` alone doesn't see the
    /// ones still waiting in `proposed_local_changes`/`proposed_remote_changes`.
    pub fn next_htlc_id(&self) -> u64 {
        self.htlcs
            .iter()
            .map(|h| h.htlc_id)
            .chain(Self::buffered_add_ids(&self.proposed_local_changes))
            .chain(Self::buffered_add_ids(&self.proposed_remote_changes))
            .max()
            .map_or(0, |id| id + 1)
    }

    fn buffered_add_ids(changes: &[ProposedChange]) -> impl Iterator<Item = u64> + '_ {
        changes.iter().filter_map(|c| match c {
            ProposedChange::Add(h) => Some(h.htlc_id),
            ProposedChange::Fulfill { .. } | ProposedChange::Fail { .. } => None,
        })
    }

    /// The HTLCs a new `AddHtlc` must be checked against (§4.1): every
    /// still-unresolved committed HTLC plus every buffered-but-unsigned add,
    /// minus any already buffered fulfill/fail for that id. Without this, two
    /// adds issued back-to-back before the next `Sign` would each validate
    /// against the same stale `commitment.htlcs` and could jointly blow the
    /// in-flight count/value caps or the reserve before either ever
    /// materializes.
    pub fn pending_htlcs(&self) -> Vec<&InFlightHtlc> {
        let mut resolved = std::collections::HashSet::new();
        for change in self.proposed_local_changes.iter().chain(&self.proposed_remote_changes) {
            match change {
                ProposedChange::Fulfill { htlc_id, .. } | ProposedChange::Fail { htlc_id, .. } => {
                    resolved.insert(*htlc_id);
                }
                ProposedChange::Add(_) => {}
            }
        }
        let committed = self.htlcs.iter().filter(|h| h.outcome.is_none() && !resolved.contains(&h.htlc_id));
        let buffered = self
            .proposed_local_changes
            .iter()
            .chain(&self.proposed_remote_changes)
            .filter_map(|c| match c {
                ProposedChange::Add(h) if !resolved.contains(&h.htlc_id) => Some(h),
                _ => None,
            });
        committed.chain(buffered).collect()
    }

    /// Local balance netted against already-buffered-but-unsigned local adds
    /// (§4.1): `local_balance` itself isn't decremented until `Sign`
    /// materializes a `ProposedChange::Add`, so a second add issued before
    /// that point would otherwise be checked against a balance that hasn't
    /// yet accounted for the first.
    pub fn pending_local_balance(&self) -> MilliSatoshi {
        let buffered = self
            .proposed_local_changes
            .iter()
            .filter_map(|c| match c {
                ProposedChange::Add(h) => Some(h.amount),
                ProposedChange::Fulfill { .. } | ProposedChange::Fail { .. } => None,
            })
            .fold(MilliSatoshi::ZERO, |acc, amount| acc + amount);
        self.local_balance - buffered
    }

    pub fn find_htlc(&self, htlc_id: u64) -> Option<&InFlightHtlc> {
        self.htlcs.iter().find(|h| h.htlc_id == htlc_id)
    }

    pub fn find_htlc_mut(&mut self, htlc_id: u64) -> Option<&mut InFlightHtlc> {
        self.htlcs.iter_mut().find(|h| h.htlc_id == htlc_id)
    }

    pub fn has_pending_changes(&self) -> bool {
        !self.proposed_local_changes.is_empty()
    }
}

/// The durable core (§3): channel parameters/keys plus the ordered funding
/// history. `active.first()` is always the latest funding.
#[derive(Clone, Debug, StrictEncode, StrictDecode)]
pub struct Commitments {
    pub channel_id: ChannelId,
    /// Retained so inbound messages addressed by the now-retired temporary
    /// id are still routed correctly (§3).
    pub temporary_channel_id: Option<TempChannelId>,
    pub params: ChannelParams,
    pub active: Vec<Commitment>,
    pub inactive: Vec<Commitment>,
}

impl Commitments {
    pub fn active_channel_id(&self) -> ActiveChannelId {
        match self.temporary_channel_id {
            Some(temporary) => ActiveChannelId::Both { temporary, channel: self.channel_id },
            None => ActiveChannelId::Final(self.channel_id),
        }
    }

    /// §3: "at least one active commitment exists".
    pub fn latest(&self) -> &Commitment {
        self.active.first().expect("Commitments::active is never empty")
    }

    pub fn latest_mut(&mut self) -> &mut Commitment {
        self.active.first_mut().expect("Commitments::active is never empty")
    }

    /// `true` while a splice is confirming: more than one active funding.
    pub fn has_pending_splice(&self) -> bool {
        self.active.len() > 1
    }

    /// Moves the now-superseded funding (everything but the head) into
    /// `inactive` once a splice reaches `splice_locked` on both sides
    /// (§4.1).
    pub fn prune_superseded_fundings(&mut self) {
        if self.active.len() > 1 {
            let superseded = self.active.split_off(1);
            self.inactive.extend(superseded);
        }
    }

    pub fn all_htlcs(&self) -> impl Iterator<Item = &InFlightHtlc> {
        self.active.iter().flat_map(|c| c.htlcs.iter())
    }

    /// Every outpoint ever referenced as this channel's funding input, used
    /// by the swap-in manager to compute `channelUtxos` (§4.3) so a UTXO
    /// already committed to this channel isn't offered again.
    pub fn funding_input_outpoints(&self) -> impl Iterator<Item = bitcoin::OutPoint> + '_ {
        self.active
            .iter()
            .chain(self.inactive.iter())
            .flat_map(|c| c.funding.contributed_inputs.iter().copied())
    }

    /// Upper bound on a new locally-added HTLC right now: local balance, net
    /// of already-buffered-but-unsigned local adds, minus the channel
    /// reserve (§4.5's candidate-channel selection). Must stay netted the
    /// same way `pending_local_balance()` is, or candidate selection and
    /// `policy::check_add_htlc`'s reserve check would disagree about how
    /// much a channel can still carry between two `Sign`s. `check_add_htlc`'s
    /// in-flight count/value caps still apply on top of this.
    pub fn spendable_balance(&self) -> MilliSatoshi {
        self.latest().pending_local_balance() - MilliSatoshi::from(self.params.reserve)
    }
}

/// Which durable states carry a [`Commitments`] record and are persisted
/// (§3: "only states from `WaitForFundingSigned` onward").
#[derive(Clone, Copy, PartialEq, Eq, Debug, StrictEncode, StrictDecode)]
pub enum PersistedStateTag {
    WaitForFundingSigned,
    WaitForFundingConfirmed,
    WaitForChannelReady,
    Normal,
    ShuttingDown,
    Negotiating,
    Closing,
    Closed,
    LegacyWaitForFundingConfirmed,
}

/// The on-disk representation of a channel: a state tag plus the
/// [`Commitments`] it was persisted with. [`crate::collaborators::PaymentsDb`]
/// stores and lists these; `Init.Restore` rehydrates a [`super::ChannelState`]
/// from one.
#[derive(Clone, Debug, StrictEncode, StrictDecode)]
pub struct PersistedChannel {
    pub state_tag: PersistedStateTag,
    pub commitments: Commitments,
}

/// Shared fixture builders for other modules' `#[cfg(test)]` code
/// (`channel::state`, `channel::process`, ...): a minimal-but-consistent
/// [`Commitments`] value, so every test file doesn't hand-roll its own.
#[cfg(test)]
pub mod tests_support {
    use super::*;
    use crate::channel::htlc::{HtlcDirection, HtlcOutcome, InFlightHtlc};
    use bitcoin::hashes::Hash;

    pub fn dummy_funding(amount: u64) -> FundingInfo {
        FundingInfo {
            outpoint: bitcoin::OutPoint::new(bitcoin::Txid::all_zeros(), 0),
            script_pubkey: bitcoin::Script::new(),
            amount: Satoshi::from(amount),
            contributed_inputs: vec![],
            min_depth: 1,
            confirmed_height: None,
            locked: false,
        }
    }

    pub fn dummy_commitment(funding_amount: u64, local: u64, remote: u64) -> Commitment {
        Commitment {
            funding: dummy_funding(funding_amount),
            local_commitment_number: 0,
            remote_commitment_number: 0,
            local_balance: MilliSatoshi::from(local),
            remote_balance: MilliSatoshi::from(remote),
            htlcs: vec![],
            remote_next_per_commitment_point: dumb_pubkey!(),
            remote_per_commitment_secret: None,
            proposed_local_changes: vec![],
            proposed_remote_changes: vec![],
        }
    }

    pub fn dummy_params() -> ChannelParams {
        use amplify::DumbDefault;
        ChannelParams {
            local_keyset: LocalKeyset::dumb_default(),
            remote_keyset: RemoteKeyset::dumb_default(),
            dust_limit: Satoshi::from(354u64),
            reserve: Satoshi::from(10_000u64),
            max_htlc_value_in_flight: MilliSatoshi::from(100_000_000u64),
            max_accepted_htlcs: 30,
            to_self_delay: 144,
            is_initiator: true,
            features: wire::InitFeatures::default(),
        }
    }

    pub fn dummy_commitments() -> Commitments {
        Commitments {
            channel_id: ChannelId::default(),
            temporary_channel_id: None,
            params: dummy_params(),
            active: vec![dummy_commitment(1_000_000, 900_000_000, 100_000_000)],
            inactive: vec![],
        }
    }

    pub fn add_htlc(
        commitments: &mut Commitments,
        htlc_id: u64,
        direction: HtlcDirection,
        amount_msat: u64,
        cltv_expiry: u32,
    ) {
        commitments.latest_mut().htlcs.push(InFlightHtlc {
            htlc_id,
            direction,
            amount: MilliSatoshi::from(amount_msat),
            payment_hash: [0u8; 32],
            cltv_expiry,
            outcome: None::<HtlcOutcome>,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::funding::FundingInfo;
    use bitcoin::hashes::Hash;

    fn commitment(funding_amount: u64, local: u64, remote: u64) -> Commitment {
        Commitment {
            funding: FundingInfo {
                outpoint: bitcoin::OutPoint::new(bitcoin::Txid::all_zeros(), 0),
                script_pubkey: bitcoin::Script::new(),
                amount: Satoshi::from(funding_amount),
                contributed_inputs: vec![],
                min_depth: 1,
                confirmed_height: None,
                locked: false,
            },
            local_commitment_number: 0,
            remote_commitment_number: 0,
            local_balance: MilliSatoshi::from(local),
            remote_balance: MilliSatoshi::from(remote),
            htlcs: vec![],
            remote_next_per_commitment_point: dumb_pubkey!(),
            remote_per_commitment_secret: None,
            proposed_local_changes: vec![],
            proposed_remote_changes: vec![],
        }
    }

    #[test]
    fn balances_must_reconcile_with_funding_amount() {
        let c = commitment(100_000, 60_000_000, 40_000_000);
        assert!(c.balances_reconcile());
        let mut bad = c.clone();
        bad.local_balance = MilliSatoshi::from(1u64);
        assert!(!bad.balances_reconcile());
    }

    #[test]
    fn next_htlc_id_is_one_past_the_highest_seen() {
        let mut c = commitment(100_000, 100_000_000, 0);
        assert_eq!(c.next_htlc_id(), 0);
        c.htlcs.push(InFlightHtlc {
            htlc_id: 5,
            direction: crate::channel::htlc::HtlcDirection::Outgoing,
            amount: MilliSatoshi::ZERO,
            payment_hash: [0u8; 32],
            cltv_expiry: 0,
            outcome: None,
        });
        assert_eq!(c.next_htlc_id(), 6);
    }

    #[test]
    fn next_htlc_id_skips_ids_only_buffered_in_proposed_changes() {
        let mut c = commitment(100_000, 100_000_000, 0);
        c.proposed_local_changes.push(ProposedChange::Add(InFlightHtlc {
            htlc_id: 0,
            direction: crate::channel::htlc::HtlcDirection::Outgoing,
            amount: MilliSatoshi::from(10_000u64),
            payment_hash: [0u8; 32],
            cltv_expiry: 0,
            outcome: None,
        }));
        assert_eq!(c.next_htlc_id(), 1, "a second add before Sign must not reuse the first's htlc_id");
    }

    #[test]
    fn pending_local_balance_is_netted_against_buffered_local_adds() {
        let mut c = commitment(100_000, 100_000_000, 0);
        c.proposed_local_changes.push(ProposedChange::Add(InFlightHtlc {
            htlc_id: 0,
            direction: crate::channel::htlc::HtlcDirection::Outgoing,
            amount: MilliSatoshi::from(30_000_000u64),
            payment_hash: [0u8; 32],
            cltv_expiry: 0,
            outcome: None,
        }));
        assert_eq!(c.local_balance, MilliSatoshi::from(100_000_000u64));
        assert_eq!(c.pending_local_balance(), MilliSatoshi::from(70_000_000u64));
    }

    #[test]
    fn pending_htlcs_excludes_buffered_adds_already_resolved() {
        let mut c = commitment(100_000, 100_000_000, 0);
        c.proposed_local_changes.push(ProposedChange::Add(InFlightHtlc {
            htlc_id: 0,
            direction: crate::channel::htlc::HtlcDirection::Outgoing,
            amount: MilliSatoshi::from(10_000u64),
            payment_hash: [0u8; 32],
            cltv_expiry: 0,
            outcome: None,
        }));
        assert_eq!(c.pending_htlcs().len(), 1);
        c.proposed_local_changes.push(ProposedChange::Fail { htlc_id: 0, reason: vec![] });
        assert!(c.pending_htlcs().is_empty(), "a buffered fail must cancel out its buffered add");
    }
}
