// Incoming payments (§4.4): invoice bookkeeping plus MPP part aggregation.
// A channel only ever sees one HTLC at a time; this module is what turns
// a handful of `UpdateAddHtlc`s arriving on different channels into a
// single `DomainEvent::PaymentReceived`.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::wallet::{MilliSatoshi, Satoshi};

/// A registered invoice, created locally or restored on startup (§4.4).
#[derive(Clone, Debug)]
pub struct IncomingPayment {
    pub payment_hash: [u8; 32],
    pub payment_preimage: [u8; 32],
    /// `None` for an amountless ("any amount") invoice.
    pub amount_msat: Option<u64>,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub expiry: std::time::Duration,
    pub received: Option<Received>,
}

impl IncomingPayment {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match chrono::Duration::from_std(self.expiry) {
            Ok(expiry) => now > self.created_at + expiry,
            Err(_) => false,
        }
    }

    pub fn is_settled(&self) -> bool { self.received.is_some() }

    /// Records newly-arrived parts against this invoice. Per §3, receiving
    /// more parts on an already-settled payment hash is additive: the new
    /// parts are appended to the existing set and `received_at` moves
    /// forward, rather than the record being replaced.
    pub fn receive_payment(&mut self, mut parts: Vec<ReceivedWith>, at: DateTime<Utc>) {
        match &mut self.received {
            Some(received) => {
                received.parts.append(&mut parts);
                received.received_at = at;
            }
            None => self.received = Some(Received { parts, received_at: at }),
        }
    }
}

/// How one part of a payment arrived (§4.3's swap-in, §4.4's MPP, and plain
/// channel HTLCs are all paths into the same invoice).
#[derive(Clone, Debug)]
pub enum ReceivedWith {
    /// A conventional HTLC landed on an already-open channel.
    LightningPayment { channel_id: wire::ChannelId, htlc_id: u64, amount: MilliSatoshi },
    /// The peer opened (or spliced into) a channel to deliver this payment,
    /// charging a fee for the on-chain cost of doing so (§4.3).
    NewChannel {
        channel_id: wire::ChannelId,
        amount: MilliSatoshi,
        service_fee: MilliSatoshi,
        funding_fee: Satoshi,
    },
    /// Delivered via a swap-in, with no channel open at all yet (§4.3).
    SwapIn { amount: Satoshi, service_fee: Satoshi },
}

impl ReceivedWith {
    pub fn amount(&self) -> MilliSatoshi {
        match self {
            ReceivedWith::LightningPayment { amount, .. } => *amount,
            ReceivedWith::NewChannel { amount, .. } => *amount,
            ReceivedWith::SwapIn { amount, .. } => MilliSatoshi::from(*amount),
        }
    }

    pub fn fees(&self) -> MilliSatoshi {
        match self {
            ReceivedWith::LightningPayment { .. } => MilliSatoshi::ZERO,
            ReceivedWith::NewChannel { service_fee, funding_fee, .. } => {
                *service_fee + MilliSatoshi::from(*funding_fee)
            }
            ReceivedWith::SwapIn { service_fee, .. } => MilliSatoshi::from(*service_fee),
        }
    }
}

/// The completed, settled view of an invoice once every part has arrived
/// (§4.4's MPP aggregation and §4.3's pay-to-open deliveries).
#[derive(Clone, Debug)]
pub struct Received {
    pub parts: Vec<ReceivedWith>,
    pub received_at: DateTime<Utc>,
}

impl Received {
    pub fn total_amount(&self) -> MilliSatoshi {
        self.parts.iter().fold(MilliSatoshi::ZERO, |acc, p| acc + p.amount())
    }

    pub fn total_fees(&self) -> MilliSatoshi {
        self.parts.iter().fold(MilliSatoshi::ZERO, |acc, p| acc + p.fees())
    }
}

/// Buffers MPP parts for invoices that have not yet reached their full
/// amount, keyed by payment hash (§4.4 "multi-part payments"). A part sits
/// here between `UpdateAddHtlc` arrival and the moment its sibling parts
/// complete the set; only then does `process()`'s `Sign`/`FulfillHtlc`
/// pair get issued across every channel holding a part.
#[derive(Default)]
pub struct MppAggregator {
    pending: HashMap<[u8; 32], Vec<ReceivedWith>>,
}

impl MppAggregator {
    pub fn new() -> Self { Self::default() }

    /// Records a newly-arrived part. Returns the full set once `target`
    /// (the invoice's requested amount) has been met or exceeded; the
    /// caller is then responsible for fulfilling every HTLC in the set.
    pub fn add_part(
        &mut self,
        payment_hash: [u8; 32],
        part: ReceivedWith,
        target: MilliSatoshi,
    ) -> Option<Vec<ReceivedWith>> {
        let parts = self.pending.entry(payment_hash).or_default();
        parts.push(part);
        let total = parts.iter().fold(MilliSatoshi::ZERO, |acc, p| acc + p.amount());
        if total >= target {
            self.pending.remove(&payment_hash)
        } else {
            None
        }
    }

    /// Abandons a partial set, e.g. after the MPP timeout elapses with the
    /// invoice still short: every buffered HTLC must then be failed back.
    pub fn abandon(&mut self, payment_hash: &[u8; 32]) -> Option<Vec<ReceivedWith>> {
        self.pending.remove(payment_hash)
    }

    pub fn amount_so_far(&self, payment_hash: &[u8; 32]) -> MilliSatoshi {
        self.pending
            .get(payment_hash)
            .map(|parts| parts.iter().fold(MilliSatoshi::ZERO, |acc, p| acc + p.amount()))
            .unwrap_or(MilliSatoshi::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chan() -> wire::ChannelId { wire::ChannelId::with(bitcoin::OutPoint::null()) }

    #[test]
    fn mpp_aggregator_waits_for_every_part_before_releasing() {
        let mut agg = MppAggregator::new();
        let hash = [7u8; 32];
        let target = MilliSatoshi::from(100_000u64);

        let first = ReceivedWith::LightningPayment {
            channel_id: chan(),
            htlc_id: 1,
            amount: MilliSatoshi::from(40_000u64),
        };
        assert!(agg.add_part(hash, first, target).is_none());
        assert_eq!(agg.amount_so_far(&hash), MilliSatoshi::from(40_000u64));

        let second = ReceivedWith::LightningPayment {
            channel_id: chan(),
            htlc_id: 2,
            amount: MilliSatoshi::from(60_000u64),
        };
        let complete = agg.add_part(hash, second, target).expect("set completes");
        assert_eq!(complete.len(), 2);
        assert_eq!(agg.amount_so_far(&hash), MilliSatoshi::ZERO);
    }

    #[test]
    fn abandoning_a_partial_set_returns_its_parts_for_failback() {
        let mut agg = MppAggregator::new();
        let hash = [9u8; 32];
        let part = ReceivedWith::LightningPayment {
            channel_id: chan(),
            htlc_id: 1,
            amount: MilliSatoshi::from(1_000u64),
        };
        assert!(agg.add_part(hash, part, MilliSatoshi::from(5_000u64)).is_none());
        let abandoned = agg.abandon(&hash).expect("part was pending");
        assert_eq!(abandoned.len(), 1);
        assert!(agg.abandon(&hash).is_none());
    }

    fn invoice(amount_msat: u64) -> IncomingPayment {
        IncomingPayment {
            payment_hash: [1u8; 32],
            payment_preimage: [2u8; 32],
            amount_msat: Some(amount_msat),
            description: "test".into(),
            created_at: Utc::now(),
            expiry: std::time::Duration::from_secs(3600),
            received: None,
        }
    }

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).expect("valid timestamp")
    }

    // §8 scenario 1: single HTLC receive.
    #[test]
    fn single_htlc_receive_has_no_fee() {
        let mut payment = invoice(150_000);
        payment.receive_payment(
            vec![ReceivedWith::LightningPayment { channel_id: chan(), htlc_id: 1, amount: MilliSatoshi::from(200_000u64) }],
            at(110),
        );
        let received = payment.received.as_ref().expect("settled");
        assert_eq!(received.total_amount(), MilliSatoshi::from(200_000u64));
        assert_eq!(received.total_fees(), MilliSatoshi::ZERO);
        assert_eq!(received.parts.len(), 1);
    }

    // §8 scenario 2: multi-part receive across two HTLC parts and a
    // new-channel part, in input order.
    #[test]
    fn multi_part_receive_sums_amount_and_fees_in_input_order() {
        let mut payment = invoice(199_000);
        payment.receive_payment(
            vec![
                ReceivedWith::LightningPayment { channel_id: chan(), htlc_id: 1, amount: MilliSatoshi::from(57_000u64) },
                ReceivedWith::LightningPayment { channel_id: chan(), htlc_id: 2, amount: MilliSatoshi::from(43_000u64) },
                ReceivedWith::NewChannel {
                    channel_id: chan(),
                    amount: MilliSatoshi::from(99_000u64),
                    service_fee: MilliSatoshi::from(1_000u64),
                    funding_fee: Satoshi::from(0u64),
                },
            ],
            at(120),
        );
        let received = payment.received.as_ref().expect("settled");
        assert_eq!(received.total_amount(), MilliSatoshi::from(199_000u64));
        assert_eq!(received.total_fees(), MilliSatoshi::from(1_000u64));
        assert_eq!(received.parts.len(), 3);
        assert!(matches!(received.parts[0], ReceivedWith::LightningPayment { amount, .. } if amount == MilliSatoshi::from(57_000u64)));
        assert!(matches!(received.parts[2], ReceivedWith::NewChannel { .. }));
    }

    // §8 scenario 3: additive receive, two calls on the same payment hash.
    #[test]
    fn additive_receive_appends_parts_and_advances_the_timestamp() {
        let mut payment = invoice(300_000);
        payment.receive_payment(
            vec![ReceivedWith::LightningPayment { channel_id: chan(), htlc_id: 1, amount: MilliSatoshi::from(200_000u64) }],
            at(110),
        );
        payment.receive_payment(
            vec![ReceivedWith::LightningPayment { channel_id: chan(), htlc_id: 2, amount: MilliSatoshi::from(100_000u64) }],
            at(150),
        );
        let received = payment.received.as_ref().expect("settled");
        assert_eq!(received.total_amount(), MilliSatoshi::from(300_000u64));
        assert_eq!(received.received_at, at(150));
        assert_eq!(received.parts.len(), 2);
    }
}
