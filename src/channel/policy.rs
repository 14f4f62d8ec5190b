// Channel-policy validation (§4.1, §7): acceptance checks applied to a
// peer's funding proposal and to local HTLC additions. Kept in the
// ecosystem's `amplify_derive`-based error style rather than `thiserror`,
// since this is itself BOLT/channel policy, not ambient plumbing (§7).

use amplify::Wrapper;

use crate::channel::commitments::{ChannelParams, Commitment};
use crate::wallet::{MilliSatoshi, Satoshi};

/// Rejects a transition attempted from a state that does not support it.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum ChannelError {
    /// channel is in a state incompatible with the requested operation
    LifecycleMismatch,

    /// peer-proposed dust limit {0} sat is unreasonably high
    DustLimitTooHigh(u64),

    /// peer-proposed channel reserve {0} sat is below our dust limit
    ReserveBelowDustLimit(u64),

    /// proposed `to_self_delay` {0} exceeds our maximum tolerated delay
    ToSelfDelayTooLarge(u16),

    /// proposed `max_accepted_htlcs` {0} exceeds the protocol maximum of 483
    TooManyAcceptedHtlcs(u16),

    /// HTLC amount {0} msat is below the dust limit and would be trimmed
    HtlcBelowDustLimit(u64),

    /// adding this HTLC would exceed `max_htlc_value_in_flight`
    MaxInFlightExceeded,

    /// adding this HTLC would exceed `max_accepted_htlcs`
    TooManyInFlightHtlcs,

    /// adding this HTLC would violate the sender's channel reserve
    ReserveViolation,

    /// unknown HTLC id {0}
    UnknownHtlc(u64),

    /// HTLC {0} has already reached a terminal state
    HtlcAlreadyResolved(u64),

    /// peer signature failed to validate
    InvalidSignature,

    /// received a message not valid for the current phase of channel
    /// negotiation
    UnexpectedMessage,
}

/// BOLT-2's absolute ceiling on `max_accepted_htlcs` (483): the number of
/// HTLC outputs that still fit a standard commitment transaction.
pub const MAX_ACCEPTED_HTLCS_CEILING: u16 = 483;

/// Validates a peer's proposed channel parameters against our own policy,
/// independent of which message (`open_channel`/`open_channel2`/
/// `accept_channel`/`accept_channel2`) carried them.
pub fn validate_remote_params(
    our_dust_limit: Satoshi,
    their_dust_limit: Satoshi,
    their_reserve: Satoshi,
    their_to_self_delay: u16,
    their_max_accepted_htlcs: u16,
    max_to_self_delay: u16,
) -> Result<(), ChannelError> {
    if their_dust_limit > Satoshi::from(100_000u64) {
        return Err(ChannelError::DustLimitTooHigh(their_dust_limit.into_inner()));
    }
    if their_reserve < our_dust_limit {
        return Err(ChannelError::ReserveBelowDustLimit(their_reserve.into_inner()));
    }
    if their_to_self_delay > max_to_self_delay {
        return Err(ChannelError::ToSelfDelayTooLarge(their_to_self_delay));
    }
    if their_max_accepted_htlcs > MAX_ACCEPTED_HTLCS_CEILING {
        return Err(ChannelError::TooManyAcceptedHtlcs(their_max_accepted_htlcs));
    }
    Ok(())
}

/// Checks whether adding an HTLC of `amount` initiated by `adder` (`true` =
/// us) is admissible against the current commitment and channel parameters
/// (§4.1's reserve/dust/in-flight bookkeeping).
pub fn check_add_htlc(
    params: &ChannelParams,
    commitment: &Commitment,
    amount: MilliSatoshi,
    adder_is_local: bool,
) -> Result<(), ChannelError> {
    if amount < MilliSatoshi::from(params.dust_limit) {
        return Err(ChannelError::HtlcBelowDustLimit(amount.into_inner()));
    }

    let pending = commitment.pending_htlcs();
    let in_flight_count = pending.len() as u16;
    if in_flight_count >= params.max_accepted_htlcs {
        return Err(ChannelError::TooManyInFlightHtlcs);
    }

    let in_flight_total = pending.iter().fold(MilliSatoshi::ZERO, |acc, h| acc + h.amount);
    if in_flight_total + amount > params.max_htlc_value_in_flight {
        return Err(ChannelError::MaxInFlightExceeded);
    }

    let reserve = MilliSatoshi::from(params.reserve);
    if adder_is_local {
        if commitment.pending_local_balance() < amount + reserve {
            return Err(ChannelError::ReserveViolation);
        }
    } else if commitment.remote_balance < amount + reserve {
        return Err(ChannelError::ReserveViolation);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::commitments::tests_support::{dummy_commitment, dummy_params};

    #[test]
    fn rejects_htlc_below_dust_limit() {
        let params = dummy_params();
        let c = dummy_commitment(1_000_000, 900_000_000, 100_000_000);
        let err = check_add_htlc(&params, &c, MilliSatoshi::from(1u64), true).unwrap_err();
        assert!(matches!(err, ChannelError::HtlcBelowDustLimit(_)));
    }

    #[test]
    fn rejects_htlc_violating_local_reserve() {
        let params = dummy_params();
        let c = dummy_commitment(1_000_000, 900_000_000, 100_000_000);
        let err =
            check_add_htlc(&params, &c, MilliSatoshi::from(895_000_000u64), true).unwrap_err();
        assert!(matches!(err, ChannelError::ReserveViolation));
    }

    #[test]
    fn accepts_htlc_within_all_bounds() {
        let params = dummy_params();
        let c = dummy_commitment(1_000_000, 900_000_000, 100_000_000);
        assert!(check_add_htlc(&params, &c, MilliSatoshi::from(1_000_000u64), true).is_ok());
    }

    #[test]
    fn rejects_reserve_violation_from_a_buffered_but_unsigned_local_add() {
        let params = dummy_params();
        let mut c = dummy_commitment(1_000_000, 900_000_000, 100_000_000);
        c.proposed_local_changes.push(crate::channel::commitments::ProposedChange::Add(
            crate::channel::htlc::InFlightHtlc {
                htlc_id: 0,
                direction: crate::channel::htlc::HtlcDirection::Outgoing,
                amount: MilliSatoshi::from(895_000_000u64),
                payment_hash: [0u8; 32],
                cltv_expiry: 0,
                outcome: None,
            },
        ));
        // A second part issued before the first is signed must be checked
        // against the balance net of the first, not the stale committed one.
        let err = check_add_htlc(&params, &c, MilliSatoshi::from(10_000_000u64), true).unwrap_err();
        assert!(matches!(err, ChannelError::ReserveViolation));
    }

    #[test]
    fn counts_a_buffered_add_toward_the_in_flight_cap() {
        let mut params = dummy_params();
        params.max_accepted_htlcs = 1;
        let mut c = dummy_commitment(1_000_000, 900_000_000, 100_000_000);
        c.proposed_local_changes.push(crate::channel::commitments::ProposedChange::Add(
            crate::channel::htlc::InFlightHtlc {
                htlc_id: 0,
                direction: crate::channel::htlc::HtlcDirection::Outgoing,
                amount: MilliSatoshi::from(1_000_000u64),
                payment_hash: [0u8; 32],
                cltv_expiry: 0,
                outcome: None,
            },
        ));
        let err = check_add_htlc(&params, &c, MilliSatoshi::from(1_000_000u64), true).unwrap_err();
        assert!(matches!(err, ChannelError::TooManyInFlightHtlcs));
    }
}
