// Outgoing payments (§4.5): a single `send_payment` call fans out into one
// or more parts, each riding an HTLC on a different channel when the
// payment amount is split (MPP) or a route is retried.

use std::collections::{HashMap, HashSet};

use amplify::Wrapper;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::channel::command::AddHtlcRequest;
use crate::events::DomainEvent;
use crate::payments::FinalFailure;
use crate::wallet::{MilliSatoshi, Satoshi};

/// The lifecycle of one outgoing HTLC attempt (§4.5).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PartStatus {
    /// `update_add_htlc` sent, awaiting the peer's `commitment_signed`.
    InFlight,
    /// Fulfilled with the preimage; irrevocably settled on our side once
    /// the matching `revoke_and_ack` lands.
    Succeeded,
    /// Failed back (routing failure, expiry, or we gave up on the route).
    Failed,
}

/// One HTLC's worth of an outgoing payment.
#[derive(Clone, Debug)]
pub struct OutgoingPart {
    pub part_id: Uuid,
    pub channel_id: wire::ChannelId,
    pub htlc_id: Option<u64>,
    pub amount: MilliSatoshi,
    pub fees: MilliSatoshi,
    pub status: PartStatus,
    pub created_at: DateTime<Utc>,
}

/// Overall status of a (possibly multi-part) outgoing payment (§4.5).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PaymentStatus {
    Pending,
    Succeeded,
    Failed,
}

/// What this payment is actually for (§3): a normal invoice payment, or the
/// Lightning leg of a swap-out, which additionally carries an on-chain
/// destination and a mining fee that isn't visible in any HTLC amount.
#[derive(Clone, Debug)]
pub enum OutgoingPaymentDetails {
    Normal { invoice: String },
    SwapOut { address: String, mining_fee: Satoshi },
}

/// A send-payment request and everything learned about its parts so far.
/// Identified by `payment_id` (the parent), distinct from `payment_hash`
/// since the same invoice could in principle be paid more than once
/// (e.g. after a first attempt definitively fails).
///
/// `recipient_amount` is what was promised to the recipient at creation
/// time and never changes. `amount` starts out equal to it and, once the
/// payment succeeds, is overwritten with the actual settled total
/// (`Σ succeeded_part.amount`) per §3 — the two can differ by the routing
/// fee actually paid.
#[derive(Clone, Debug)]
pub struct OutgoingLightningPayment {
    pub payment_id: Uuid,
    pub payment_hash: [u8; 32],
    pub destination: secp256k1::PublicKey,
    pub recipient_amount: MilliSatoshi,
    pub amount: MilliSatoshi,
    pub details: OutgoingPaymentDetails,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub parts: Vec<OutgoingPart>,
}

impl OutgoingLightningPayment {
    pub fn new(
        payment_hash: [u8; 32],
        destination: secp256k1::PublicKey,
        recipient_amount: MilliSatoshi,
        details: OutgoingPaymentDetails,
        created_at: DateTime<Utc>,
    ) -> Self {
        OutgoingLightningPayment {
            payment_id: Uuid::new_v4(),
            payment_hash,
            destination,
            recipient_amount,
            amount: recipient_amount,
            details,
            status: PaymentStatus::Pending,
            created_at,
            parts: vec![],
        }
    }

    /// `Σ(succeeded_part.amount) − recipient_amount`, plus the swap's own
    /// on-chain mining fee when this is a `SwapOut` (§8 scenario 5): that
    /// fee is never covered by any HTLC amount, so it is additive rather
    /// than folded into the HTLC/recipient difference.
    pub fn total_fees(&self) -> MilliSatoshi {
        let routing_fee = self.amount_succeeded() - self.recipient_amount;
        match self.details {
            OutgoingPaymentDetails::Normal { .. } => routing_fee,
            OutgoingPaymentDetails::SwapOut { mining_fee, .. } => {
                routing_fee + MilliSatoshi::from(mining_fee)
            }
        }
    }

    pub fn amount_in_flight(&self) -> MilliSatoshi {
        self.parts
            .iter()
            .filter(|p| p.status == PartStatus::InFlight)
            .fold(MilliSatoshi::ZERO, |acc, p| acc + p.amount)
    }

    pub fn amount_succeeded(&self) -> MilliSatoshi {
        self.parts
            .iter()
            .filter(|p| p.status == PartStatus::Succeeded)
            .fold(MilliSatoshi::ZERO, |acc, p| acc + p.amount)
    }

    /// Recomputes `status` from the current parts: succeeded once the full
    /// amount has settled, failed once nothing remains in flight and the
    /// settled amount still falls short, otherwise still pending (§4.5).
    /// On success `amount` is overwritten with the settled total and
    /// previously-failed parts are dropped from the retained view (§3).
    pub fn recompute_status(&mut self) {
        if self.amount_succeeded() >= self.recipient_amount {
            self.amount = self.amount_succeeded();
            self.status = PaymentStatus::Succeeded;
            self.parts.retain(|p| p.status != PartStatus::Failed);
            return;
        }
        let anything_outstanding =
            self.parts.iter().any(|p| p.status == PartStatus::InFlight);
        self.status =
            if anything_outstanding { PaymentStatus::Pending } else { PaymentStatus::Failed };
    }
}

/// How many times a single part is retried on a different channel before
/// the whole payment is given up on (§4.5).
pub const MAX_PART_ATTEMPTS: usize = 3;

/// A channel this node could route an outgoing part through, along with how
/// much it can still carry right now (§4.5's candidate-channel selection).
#[derive(Clone, Copy, Debug)]
pub struct CandidateChannel {
    pub channel_id: wire::ChannelId,
    pub spendable: MilliSatoshi,
}

/// An `AddHtlc` command the caller still has to dispatch into the named
/// channel; returned rather than sent directly since only the orchestrator
/// holds the channel map (§4.5).
#[derive(Debug)]
pub struct PartDispatch {
    pub channel_id: wire::ChannelId,
    pub request: AddHtlcRequest,
}

/// What the caller should do after reacting to a channel's `CmdResult`
/// (§4.5).
pub enum PaymentOutcome {
    /// Nothing left to do; the payment is still waiting on other parts.
    Pending,
    /// Dispatch this `AddHtlc` into the named channel to retry the failed
    /// part on a different route.
    Retry(PartDispatch),
    /// The payment reached a terminal state; publish this event.
    Finished(DomainEvent),
}

/// Builds the BOLT-4 onion that would normally wrap the route to the
/// destination. Real Sphinx onion construction needs the full route (node
/// pubkeys, per-hop payloads) which this single-peer trampoline node never
/// computes (§1) — a zeroed packet stands in for it, the same way
/// `PeerOrchestrator::sign_commitment` stands in for real commitment
/// signing.
fn placeholder_onion() -> wire::bolt2::OnionPacket {
    wire::bolt2::OnionPacket {
        version: 0,
        public_key: dumb_pubkey!(),
        hop_data: [0u8; 1300],
        hmac: [0u8; 32],
    }
}

/// BOLT-4's `PERM` bit: set on a failure code whose cause won't go away on
/// retry (wrong payment details, unknown destination, policy violation) as
/// opposed to a transient one (temporary channel/node unavailability) worth
/// trying a different route for. Real failure-onion decryption needs the
/// shared secrets from route construction, which this node never builds
/// (§1); this instead reads the code straight off the still-encrypted
/// `reason` the channel reported, which is only a heuristic stand-in.
fn is_permanent_failure(reason: &[u8]) -> bool {
    const PERM: u16 = 0x4000;
    match reason.get(0..2) {
        Some(code) => u16::from_be_bytes([code[0], code[1]]) & PERM != 0,
        None => false,
    }
}

/// Drives every outgoing payment's parts: splitting a send across
/// channels, reacting to each part's `CmdResult`, retrying on a different
/// channel, and finalizing with a `PaymentSent`/`PaymentNotSent` event
/// (§4.5).
#[derive(Default)]
pub struct OutgoingPaymentHandler {
    payments: HashMap<Uuid, OutgoingLightningPayment>,
    part_payment: HashMap<Uuid, Uuid>,
    htlc_index: HashMap<(wire::ChannelId, u64), Uuid>,
    /// Retries attempted per *part*, not per payment (§4.5): each MPP part
    /// gets its own `MAX_PART_ATTEMPTS` budget, so one flaky part retrying
    /// doesn't exhaust the budget of its unrelated siblings.
    attempts: HashMap<Uuid, usize>,
    cltv_expiry: HashMap<Uuid, u32>,
}

impl OutgoingPaymentHandler {
    pub fn new() -> Self { Self::default() }

    pub fn get(&self, payment_id: Uuid) -> Option<&OutgoingLightningPayment> {
        self.payments.get(&payment_id)
    }

    /// Starts a new outgoing payment, splitting `recipient_amount` across
    /// `channels` largest-spendable-first (§4.5) up to `max_parts`. Returns
    /// the new payment's id and the `AddHtlc` commands the caller must
    /// dispatch; an empty dispatch list means no combination of channels
    /// could carry the amount and the payment was never created.
    #[allow(clippy::too_many_arguments)]
    pub fn send_payment(
        &mut self,
        payment_hash: [u8; 32],
        destination: secp256k1::PublicKey,
        recipient_amount: MilliSatoshi,
        details: OutgoingPaymentDetails,
        cltv_expiry: u32,
        channels: &[CandidateChannel],
        max_parts: usize,
        created_at: DateTime<Utc>,
    ) -> Option<(Uuid, Vec<PartDispatch>)> {
        let mut ranked: Vec<CandidateChannel> = channels.to_vec();
        ranked.sort_by(|a, b| b.spendable.cmp(&a.spendable));

        let mut remaining = recipient_amount;
        let mut picks: Vec<(wire::ChannelId, MilliSatoshi)> = vec![];
        for candidate in ranked {
            if remaining == MilliSatoshi::ZERO || picks.len() >= max_parts {
                break;
            }
            let take = remaining.min(candidate.spendable);
            if take == MilliSatoshi::ZERO {
                continue;
            }
            picks.push((candidate.channel_id, take));
            remaining = remaining - take;
        }
        if remaining != MilliSatoshi::ZERO {
            return None;
        }

        let mut payment =
            OutgoingLightningPayment::new(payment_hash, destination, recipient_amount, details, created_at);
        let payment_id = payment.payment_id;
        self.cltv_expiry.insert(payment_id, cltv_expiry);

        let mut dispatches = vec![];
        for (channel_id, amount) in picks {
            let part_id = Uuid::new_v4();
            self.attempts.insert(part_id, 0);
            payment.parts.push(OutgoingPart {
                part_id,
                channel_id,
                htlc_id: None,
                amount,
                fees: MilliSatoshi::ZERO,
                status: PartStatus::InFlight,
                created_at,
            });
            self.part_payment.insert(part_id, payment_id);
            dispatches.push(PartDispatch {
                channel_id,
                request: AddHtlcRequest {
                    amount_msat: amount.into_inner(),
                    payment_hash,
                    cltv_expiry,
                    onion_routing_packet: placeholder_onion(),
                    part_id,
                },
            });
        }

        self.payments.insert(payment_id, payment);
        Some((payment_id, dispatches))
    }

    /// Records the channel-assigned `htlc_id` for a part once the channel
    /// accepts it, so later `HtlcFulfilled`/`HtlcFailed` results (which only
    /// carry `htlc_id`) can be traced back to their part (§4.5).
    pub fn on_added(&mut self, channel_id: wire::ChannelId, part_id: Uuid, htlc_id: u64) {
        let Some(&payment_id) = self.part_payment.get(&part_id) else { return };
        let Some(payment) = self.payments.get_mut(&payment_id) else { return };
        if let Some(part) = payment.parts.iter_mut().find(|p| p.part_id == part_id) {
            part.htlc_id = Some(htlc_id);
            self.htlc_index.insert((channel_id, htlc_id), part_id);
        }
    }

    /// The channel itself rejected the part before it ever became an HTLC
    /// (insufficient local balance, policy violation, channel not `Normal`).
    /// Treated the same as a routing failure: retry on a different channel
    /// if one remains, otherwise fail the part.
    pub fn on_add_failed(
        &mut self,
        part_id: Uuid,
        remaining_channels: &[CandidateChannel],
    ) -> PaymentOutcome {
        self.fail_part_and_maybe_retry(part_id, remaining_channels)
    }

    /// The peer failed back a settled HTLC (§4.5). `reason` is the
    /// still-encrypted failure onion as reported by the channel.
    pub fn on_settled_fail(
        &mut self,
        channel_id: wire::ChannelId,
        htlc_id: u64,
        reason: &[u8],
        remaining_channels: &[CandidateChannel],
    ) -> PaymentOutcome {
        let Some(&part_id) = self.htlc_index.get(&(channel_id, htlc_id)) else { return PaymentOutcome::Pending };
        if is_permanent_failure(reason) {
            return self.fail_part_permanently(part_id, FinalFailure::RecipientRejected);
        }
        self.fail_part_and_maybe_retry(part_id, remaining_channels)
    }

    /// Marks a single part permanently failed without retrying it, but only
    /// finalizes the whole payment once every part has reached a terminal
    /// state (§4.5) — a recipient-rejected part must not cut short siblings
    /// still in flight on other channels.
    fn fail_part_permanently(&mut self, part_id: Uuid, failure: FinalFailure) -> PaymentOutcome {
        let Some(&payment_id) = self.part_payment.get(&part_id) else { return PaymentOutcome::Pending };
        let Some(payment) = self.payments.get_mut(&payment_id) else { return PaymentOutcome::Pending };
        let Some(part) = payment.parts.iter_mut().find(|p| p.part_id == part_id) else {
            return PaymentOutcome::Pending;
        };
        part.status = PartStatus::Failed;
        payment.recompute_status();
        if payment.status == PaymentStatus::Failed {
            self.finalize_failed(part_id, failure)
        } else {
            PaymentOutcome::Pending
        }
    }

    /// The peer fulfilled a settled HTLC with its preimage (§4.5).
    pub fn on_fulfilled(&mut self, channel_id: wire::ChannelId, htlc_id: u64) -> PaymentOutcome {
        let Some(&part_id) = self.htlc_index.get(&(channel_id, htlc_id)) else { return PaymentOutcome::Pending };
        let Some(&payment_id) = self.part_payment.get(&part_id) else { return PaymentOutcome::Pending };
        let Some(payment) = self.payments.get_mut(&payment_id) else { return PaymentOutcome::Pending };

        if let Some(part) = payment.parts.iter_mut().find(|p| p.part_id == part_id) {
            part.status = PartStatus::Succeeded;
        }
        payment.recompute_status();

        if payment.status == PaymentStatus::Succeeded {
            let finished = payment.clone();
            self.forget(payment_id);
            PaymentOutcome::Finished(DomainEvent::PaymentSent(finished))
        } else {
            PaymentOutcome::Pending
        }
    }

    fn fail_part_and_maybe_retry(
        &mut self,
        part_id: Uuid,
        remaining_channels: &[CandidateChannel],
    ) -> PaymentOutcome {
        let Some(&payment_id) = self.part_payment.get(&part_id) else { return PaymentOutcome::Pending };

        let attempts = self.attempts.entry(part_id).or_insert(0);
        *attempts += 1;
        let exhausted = *attempts >= MAX_PART_ATTEMPTS;

        let Some(payment) = self.payments.get_mut(&payment_id) else { return PaymentOutcome::Pending };
        let Some(part) = payment.parts.iter_mut().find(|p| p.part_id == part_id) else {
            return PaymentOutcome::Pending;
        };
        let amount = part.amount;
        let cltv_expiry = self.cltv_expiry.get(&payment_id).copied().unwrap_or(0);
        let payment_hash = payment.payment_hash;

        if !exhausted {
            if let Some(candidate) =
                remaining_channels.iter().find(|c| c.spendable >= amount)
            {
                let stale = (part.channel_id, part.htlc_id);
                part.channel_id = candidate.channel_id;
                part.htlc_id = None;
                if let (old_channel_id, Some(old_htlc_id)) = stale {
                    self.htlc_index.remove(&(old_channel_id, old_htlc_id));
                }
                return PaymentOutcome::Retry(PartDispatch {
                    channel_id: candidate.channel_id,
                    request: AddHtlcRequest {
                        amount_msat: amount.into_inner(),
                        payment_hash,
                        cltv_expiry,
                        onion_routing_packet: placeholder_onion(),
                        part_id,
                    },
                });
            }
        }

        part.status = PartStatus::Failed;
        payment.recompute_status();
        if payment.status == PaymentStatus::Failed {
            let failure =
                if exhausted { FinalFailure::NoRouteFound } else { FinalFailure::InsufficientBalance };
            self.finalize_failed(part_id, failure)
        } else {
            PaymentOutcome::Pending
        }
    }

    fn finalize_failed(&mut self, part_id: Uuid, failure: FinalFailure) -> PaymentOutcome {
        let Some(&payment_id) = self.part_payment.get(&part_id) else { return PaymentOutcome::Pending };
        let Some(payment) = self.payments.get_mut(&payment_id) else { return PaymentOutcome::Pending };
        payment.status = PaymentStatus::Failed;
        self.forget(payment_id);
        PaymentOutcome::Finished(DomainEvent::PaymentNotSent { payment_id, final_failure: failure })
    }

    fn forget(&mut self, payment_id: Uuid) {
        if let Some(payment) = self.payments.remove(&payment_id) {
            let part_ids: HashSet<Uuid> = payment.parts.iter().map(|p| p.part_id).collect();
            self.part_payment.retain(|id, _| !part_ids.contains(id));
            self.htlc_index.retain(|_, id| !part_ids.contains(id));
            self.attempts.retain(|id, _| !part_ids.contains(id));
        }
        self.cltv_expiry.remove(&payment_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::hashes::Hash;

    fn dumb_dest() -> secp256k1::PublicKey { dumb_pubkey!() }

    fn channel_id(vout: u32) -> wire::ChannelId {
        wire::ChannelId::with(bitcoin::OutPoint::new(bitcoin::Txid::all_zeros(), vout))
    }

    fn candidate(id: wire::ChannelId, spendable: u64) -> CandidateChannel {
        CandidateChannel { channel_id: id, spendable: MilliSatoshi::from(spendable) }
    }

    fn payment() -> OutgoingLightningPayment {
        OutgoingLightningPayment::new(
            [1u8; 32],
            dumb_dest(),
            MilliSatoshi::from(100_000u64),
            OutgoingPaymentDetails::Normal { invoice: "lnbc1...".into() },
            Utc::now(),
        )
    }

    fn part(amount: u64, fees: u64, status: PartStatus) -> OutgoingPart {
        OutgoingPart {
            part_id: Uuid::new_v4(),
            channel_id: wire::ChannelId::with(bitcoin::OutPoint::null()),
            htlc_id: Some(1),
            amount: MilliSatoshi::from(amount),
            fees: MilliSatoshi::from(fees),
            status,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn status_stays_pending_while_a_part_is_in_flight() {
        let mut p = payment();
        p.parts.push(part(100_000, 0, PartStatus::InFlight));
        p.recompute_status();
        assert_eq!(p.status, PaymentStatus::Pending);
    }

    #[test]
    fn status_fails_once_every_part_failed_and_amount_falls_short() {
        let mut p = payment();
        p.parts.push(part(100_000, 0, PartStatus::Failed));
        p.recompute_status();
        assert_eq!(p.status, PaymentStatus::Failed);
    }

    #[test]
    fn status_succeeds_once_settled_amount_meets_the_target() {
        let mut p = payment();
        p.parts.push(part(100_050, 0, PartStatus::Succeeded));
        p.recompute_status();
        assert_eq!(p.status, PaymentStatus::Succeeded);
        assert_eq!(p.total_fees(), MilliSatoshi::from(50u64));
    }

    // §8 scenario 4: normal payment, two parts, fee is what the parts
    // overshoot the recipient amount by.
    #[test]
    fn outgoing_normal_payment_fee_is_settled_total_minus_recipient_amount() {
        let mut p = OutgoingLightningPayment::new(
            [2u8; 32],
            dumb_dest(),
            MilliSatoshi::from(180_000u64),
            OutgoingPaymentDetails::Normal { invoice: "lnbc1...".into() },
            Utc::now(),
        );
        p.parts.push(part(115_000, 0, PartStatus::Succeeded));
        p.parts.push(part(75_000, 0, PartStatus::Succeeded));
        p.recompute_status();
        assert_eq!(p.status, PaymentStatus::Succeeded);
        assert_eq!(p.amount, MilliSatoshi::from(190_000u64));
        assert_eq!(p.total_fees(), MilliSatoshi::from(10_000u64));
    }

    // §8 scenario 5: swap-out adds its own on-chain mining fee on top of
    // whatever the settled HTLC overshoots the recipient amount by.
    #[test]
    fn swap_out_fee_includes_both_routing_overshoot_and_mining_fee() {
        let mut p = OutgoingLightningPayment::new(
            [3u8; 32],
            dumb_dest(),
            MilliSatoshi::from(150_000u64),
            OutgoingPaymentDetails::SwapOut {
                address: "bc1q...".into(),
                mining_fee: Satoshi::from(15u64),
            },
            Utc::now(),
        );
        p.parts.push(part(157_000, 0, PartStatus::Succeeded));
        p.recompute_status();
        assert_eq!(p.status, PaymentStatus::Succeeded);
        assert_eq!(p.amount, MilliSatoshi::from(157_000u64));
        assert_eq!(p.total_fees(), MilliSatoshi::from(22_000u64));
    }

    #[test]
    fn retry_budget_is_tracked_per_part_not_per_payment() {
        let chan_a = channel_id(0);
        let chan_b = channel_id(1);
        let chan_retry = channel_id(2);
        let mut handler = OutgoingPaymentHandler::new();
        let (_, dispatches) = handler
            .send_payment(
                [4u8; 32],
                dumb_dest(),
                MilliSatoshi::from(100_000u64),
                OutgoingPaymentDetails::Normal { invoice: "lnbc1...".into() },
                600_000,
                &[candidate(chan_a, 60_000), candidate(chan_b, 40_000)],
                2,
                Utc::now(),
            )
            .expect("two channels cover the amount");
        assert_eq!(dispatches.len(), 2);
        let part_a = dispatches[0].request.part_id;
        let part_b = dispatches[1].request.part_id;

        let retryable = [candidate(chan_retry, 100_000)];
        for _ in 0..MAX_PART_ATTEMPTS - 1 {
            assert!(matches!(handler.on_add_failed(part_a, &retryable), PaymentOutcome::Retry(_)));
        }
        // Part A's budget is now exhausted; its own retries stop, but its
        // sibling must still have its full, independent budget available.
        let outcome = handler.on_add_failed(part_a, &retryable);
        assert!(matches!(outcome, PaymentOutcome::Pending), "part B is still in flight");

        assert!(
            matches!(handler.on_add_failed(part_b, &retryable), PaymentOutcome::Retry(_)),
            "part B's retry budget must not have been exhausted by part A's failures"
        );
    }

    #[test]
    fn retrying_a_part_on_a_new_channel_drops_its_stale_htlc_index_entry() {
        let chan_a = channel_id(0);
        let chan_retry = channel_id(1);
        let mut handler = OutgoingPaymentHandler::new();
        let (_, dispatches) = handler
            .send_payment(
                [5u8; 32],
                dumb_dest(),
                MilliSatoshi::from(50_000u64),
                OutgoingPaymentDetails::Normal { invoice: "lnbc1...".into() },
                600_000,
                &[candidate(chan_a, 50_000)],
                1,
                Utc::now(),
            )
            .expect("single channel covers the amount");
        let part_id = dispatches[0].request.part_id;
        handler.on_added(chan_a, part_id, 7);
        assert!(matches!(
            handler.on_add_failed(part_id, &[candidate(chan_retry, 50_000)]),
            PaymentOutcome::Retry(_)
        ));
        // An unrelated later HTLC reusing id 7 on the old channel must not
        // resolve back to this already-moved-on part.
        assert!(matches!(handler.on_fulfilled(chan_a, 7), PaymentOutcome::Pending));
    }

    #[test]
    fn a_permanently_failed_part_does_not_cut_short_a_sibling_still_in_flight() {
        let chan_a = channel_id(0);
        let chan_b = channel_id(1);
        let mut handler = OutgoingPaymentHandler::new();
        let (_, dispatches) = handler
            .send_payment(
                [6u8; 32],
                dumb_dest(),
                MilliSatoshi::from(100_000u64),
                OutgoingPaymentDetails::Normal { invoice: "lnbc1...".into() },
                600_000,
                &[candidate(chan_a, 60_000), candidate(chan_b, 40_000)],
                2,
                Utc::now(),
            )
            .expect("two channels cover the amount");
        let part_a = dispatches[0].request.part_id;
        let part_b = dispatches[1].request.part_id;
        handler.on_added(chan_a, part_a, 1);
        handler.on_added(chan_b, part_b, 1);

        const PERM_INCORRECT_PAYMENT_DETAILS: [u8; 2] = [0x40, 0x13];
        let outcome = handler.on_settled_fail(chan_a, 1, &PERM_INCORRECT_PAYMENT_DETAILS, &[]);
        assert!(
            matches!(outcome, PaymentOutcome::Pending),
            "a permanently failed part must not finalize the payment while a sibling is in flight"
        );
        // Part B is still tracked (not silently dropped by an overeager forget()).
        assert!(handler.part_payment.contains_key(&part_b));
    }
}
