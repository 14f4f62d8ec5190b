// In-flight HTLC bookkeeping (§3).

use crate::wallet::MilliSatoshi;

/// Which side added the HTLC.
#[derive(Clone, Copy, PartialEq, Eq, Debug, StrictEncode, StrictDecode)]
pub enum HtlcDirection {
    /// We added it; we hold the route onion and await fulfill/fail.
    Outgoing,
    /// The peer added it; we hold (or await) the preimage.
    Incoming,
}

/// Terminal resolution of an HTLC. At most one per HTLC — reaching a
/// terminal state is a one-way transition.
#[derive(Clone, Debug, StrictEncode, StrictDecode)]
pub enum HtlcOutcome {
    Fulfilled { preimage: [u8; 32] },
    Failed { reason: Vec<u8> },
    TimedOut,
}

/// A single HTLC tracked on a commitment.
#[derive(Clone, Debug, StrictEncode, StrictDecode)]
pub struct InFlightHtlc {
    pub htlc_id: u64,
    pub direction: HtlcDirection,
    pub amount: MilliSatoshi,
    pub payment_hash: [u8; 32],
    pub cltv_expiry: u32,
    pub outcome: Option<HtlcOutcome>,
}

impl InFlightHtlc {
    pub fn is_resolved(&self) -> bool {
        self.outcome.is_some()
    }

    /// §4.1: HTLC timeouts force-close once the tip reaches the expiry
    /// minus a safety margin, rather than waiting for the exact expiry
    /// block, to guarantee the claim transaction confirms in time.
    pub fn is_timed_out(&self, current_tip: u32, safety_delta: u32) -> bool {
        matches!(self.direction, HtlcDirection::Outgoing)
            && self.outcome.is_none()
            && current_tip + safety_delta >= self.cltv_expiry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn htlc(cltv: u32) -> InFlightHtlc {
        InFlightHtlc {
            htlc_id: 1,
            direction: HtlcDirection::Outgoing,
            amount: MilliSatoshi::from(1000u64),
            payment_hash: [0u8; 32],
            cltv_expiry: cltv,
            outcome: None,
        }
    }

    #[test]
    fn force_closes_once_tip_reaches_expiry_minus_safety_delta() {
        let h = htlc(700_000);
        assert!(!h.is_timed_out(699_000, 144));
        assert!(h.is_timed_out(699_856, 144));
    }

    #[test]
    fn resolved_htlcs_never_time_out() {
        let mut h = htlc(700_000);
        h.outcome = Some(HtlcOutcome::TimedOut);
        assert!(!h.is_timed_out(800_000, 144));
    }
}
