// BOLT-2 `channel_reestablish` handling (§4.1 "Reconnection"), including the
// mobile-specific data-loss-protection backup exchange (§2's "peer backup").

use wire::reestablish::ChannelReestablish;

use crate::channel::commitments::Commitments;

/// What a channel should do once both sides have exchanged
/// `channel_reestablish` (§4.1).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReestablishOutcome {
    /// Nothing missed; resume normal operation, retransmitting `in_sync`
    /// unsigned changes.
    InSync,
    /// The peer's `next_revocation_number` shows they never received our
    /// last `revoke_and_ack`; retransmit it.
    RetransmitRevocation,
    /// The peer's `next_commitment_number` shows they never received our
    /// last `commitment_signed`; retransmit it.
    RetransmitCommitment,
    /// The peer proved they hold a commitment state ahead of ours: this
    /// node's backup is stale (likely after an app reinstall). Recovery
    /// must go through [`crate::collaborators::KeyManager::open_backup`]
    /// rather than normal resync.
    WeAreBehind,
    /// We proved the peer's commitment state is stale. BOLT-2 says a
    /// well-behaved peer reacts by force-closing on their own; we simply
    /// wait.
    TheyAreBehind,
}

/// Builds the outgoing `channel_reestablish`, including our persisted
/// backup in `channel_data` (§2).
pub fn build_reestablish(commitments: &Commitments, our_backup: Option<Vec<u8>>) -> ChannelReestablish {
    let latest = commitments.latest();
    ChannelReestablish {
        channel_id: commitments.channel_id,
        next_commitment_number: latest.local_commitment_number + 1,
        next_revocation_number: latest.remote_commitment_number,
        your_last_per_commitment_secret: latest.remote_per_commitment_secret.unwrap_or([0u8; 32]),
        my_current_per_commitment_point: latest.remote_next_per_commitment_point,
        channel_data: our_backup,
        unknown_tlvs: Default::default(),
    }
}

/// Reconciles an incoming `channel_reestablish` against our own commitment
/// bookkeeping.
pub fn handle_reestablish(
    commitments: &Commitments,
    msg: &ChannelReestablish,
) -> ReestablishOutcome {
    let latest = commitments.latest();

    if msg.signals_data_loss(latest.remote_per_commitment_secret) {
        return ReestablishOutcome::WeAreBehind;
    }

    if msg.next_revocation_number < latest.local_commitment_number {
        return ReestablishOutcome::TheyAreBehind;
    }

    if msg.next_revocation_number < latest.local_commitment_number + 1
        && msg.next_commitment_number == latest.remote_commitment_number
    {
        return ReestablishOutcome::RetransmitRevocation;
    }

    if msg.next_commitment_number == latest.remote_commitment_number {
        return ReestablishOutcome::RetransmitCommitment;
    }

    ReestablishOutcome::InSync
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::commitments::tests_support::dummy_commitments;

    #[test]
    fn fresh_channel_reestablish_round_trips_to_in_sync() {
        let commitments = dummy_commitments();
        let msg = build_reestablish(&commitments, None);
        assert_eq!(handle_reestablish(&commitments, &msg), ReestablishOutcome::InSync);
    }

    #[test]
    fn stale_secret_from_peer_signals_we_are_behind() {
        let mut commitments = dummy_commitments();
        commitments.latest_mut().remote_per_commitment_secret = Some([1u8; 32]);
        let mut msg = build_reestablish(&commitments, None);
        msg.your_last_per_commitment_secret = [2u8; 32];
        assert_eq!(handle_reestablish(&commitments, &msg), ReestablishOutcome::WeAreBehind);
    }
}
