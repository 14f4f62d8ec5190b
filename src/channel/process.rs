// The channel state machine itself (§4.1): `process` takes the current
// state and a command, and returns the next state plus the actions the
// orchestrator must carry out. It performs no I/O and awaits nothing.

use amplify::Wrapper;
use bitcoin::hashes::Hash;
use wire::dual_funding::{AcceptChannel2, OpenChannel2};
use wire::htlc::{CommitmentSigned, RevokeAndAck, UpdateAddHtlc, UpdateFailHtlc, UpdateFulfillHtlc};
use wire::splice::SpliceLocked;
use wire::{bolt2::FundingLocked, ChannelId, Messages};

use crate::channel::action::{ChannelAction, CmdResult};
use crate::channel::command::{ChannelCommand, WatchEvent};
use crate::channel::commitments::{ChannelParams, Commitment, Commitments, ProposedChange};
use crate::channel::htlc::{HtlcDirection, HtlcOutcome, InFlightHtlc};
use crate::channel::keyset::RemoteKeyset;
use crate::channel::policy::{self, ChannelError};
use crate::channel::reestablish::{self, ReestablishOutcome};
use crate::channel::splice;
use crate::channel::state::ChannelState;
use crate::wallet::{MilliSatoshi, Satoshi};

/// Node-wide parameters `process` needs but that don't belong on any single
/// channel: our own acceptance policy and the chain we're on (§4.1, §7).
pub struct ProcessContext<'a> {
    pub node_params: &'a crate::config::NodeParams,
    pub max_to_self_delay: u16,
}

/// Force-close on HTLC timeout honors a safety margin so we aren't racing
/// the peer's own claim transaction at the exact expiry height (§4.1).
pub const HTLC_TIMEOUT_SAFETY_BLOCKS: u32 = 6;

type Actions = Vec<ChannelAction>;

fn store(commitments: &Commitments, tag: crate::channel::commitments::PersistedStateTag) -> ChannelAction {
    ChannelAction::Store(Box::new(crate::channel::commitments::PersistedChannel {
        state_tag: tag,
        commitments: commitments.clone(),
    }))
}

/// Advances a channel by one command. `ctx` carries the handful of
/// node-level parameters that aren't part of any one channel's durable
/// state.
pub fn process(
    state: ChannelState,
    cmd: ChannelCommand,
    ctx: &ProcessContext,
) -> (ChannelState, Actions) {
    match cmd {
        ChannelCommand::Disconnected => {
            if state.is_offline() {
                (state, vec![])
            } else {
                (ChannelState::Offline(Box::new(state)), vec![])
            }
        }
        ChannelCommand::Connected { .. } => on_connected(state),
        ChannelCommand::InitRestore(persisted) => {
            (ChannelState::from_persisted(persisted), vec![])
        }
        ChannelCommand::InitInitiator {
            temporary_channel_id,
            funding_amount,
            push_amount_msat,
            funding_feerate_per_kw,
            local_keyset,
        } => on_init_initiator(
            state,
            temporary_channel_id,
            funding_amount,
            push_amount_msat,
            funding_feerate_per_kw,
            local_keyset,
        ),
        ChannelCommand::InitNonInitiator { temporary_channel_id, local_keyset } => {
            let _ = local_keyset;
            (ChannelState::WaitForOpenChannel { temporary_channel_id }, vec![])
        }
        ChannelCommand::MessageReceived(msg) => on_message(state, msg, ctx),
        ChannelCommand::FundingNegotiated {
            outpoint,
            script_pubkey,
            amount,
            contributed_inputs,
            min_depth,
        } => on_funding_negotiated(state, outpoint, script_pubkey, amount, contributed_inputs, min_depth),
        ChannelCommand::WatchReceived(event) => on_watch(state, event),
        ChannelCommand::Sign => on_sign(state),
        ChannelCommand::CheckHtlcTimeout { current_tip } => on_check_timeout(state, current_tip),
        ChannelCommand::AddHtlc(req) => on_add_htlc(state, req),
        ChannelCommand::FulfillHtlc { htlc_id, preimage } => on_fulfill_htlc(state, htlc_id, preimage),
        ChannelCommand::FailHtlc { htlc_id, reason } => on_fail_htlc(state, htlc_id, reason),
        ChannelCommand::SpliceRequest(req) => on_splice_request(state, req),
        ChannelCommand::Close { script_pubkey, feerate_per_kw } => {
            on_close(state, script_pubkey, feerate_per_kw)
        }
        ChannelCommand::ForceClose => on_force_close(state),
        ChannelCommand::GetHtlcInfosResponse { revoked_commitment_txid, htlcs } => {
            on_htlc_infos_response(state, revoked_commitment_txid, htlcs)
        }
    }
}

fn on_connected(state: ChannelState) -> (ChannelState, Actions) {
    match state {
        ChannelState::Offline(inner) => {
            let mut actions = vec![];
            if let Some(commitments) = inner.commitments() {
                actions.push(ChannelAction::SendMessage(
                    reestablish::build_reestablish(commitments, None).into(),
                ));
            }
            (ChannelState::Syncing(inner), actions)
        }
        other => (other, vec![]),
    }
}

fn on_init_initiator(
    state: ChannelState,
    temporary_channel_id: wire::TempChannelId,
    funding_amount: Satoshi,
    push_amount_msat: u64,
    funding_feerate_per_kw: u32,
    local_keyset: crate::channel::keyset::LocalKeyset,
) -> (ChannelState, Actions) {
    if !matches!(state, ChannelState::WaitForInit) {
        return (state, vec![]);
    }
    let msg = OpenChannel2 {
        chain_hash: bitcoin::BlockHash::default(),
        temporary_channel_id,
        funding_feerate_per_kw,
        commitment_feerate_per_kw: funding_feerate_per_kw,
        funding_satoshis: funding_amount.into_inner(),
        dust_limit_satoshis: 354,
        max_htlc_value_in_flight_msat: u64::MAX,
        htlc_minimum_msat: 1,
        to_self_delay: 144,
        max_accepted_htlcs: 30,
        locktime: 0,
        funding_pubkey: local_keyset.funding_pubkey,
        revocation_basepoint: local_keyset.revocation_basepoint,
        payment_basepoint: local_keyset.payment_basepoint,
        delayed_payment_basepoint: local_keyset.delayed_payment_basepoint,
        htlc_basepoint: local_keyset.htlc_basepoint,
        first_per_commitment_point: local_keyset.first_per_commitment_point,
        second_per_commitment_point: local_keyset.first_per_commitment_point,
        channel_flags: 0,
        shutdown_scriptpubkey: local_keyset.shutdown_scriptpubkey.clone(),
        require_confirmed_inputs: None,
        unknown_tlvs: Default::default(),
    };
    let _ = push_amount_msat;
    (
        ChannelState::WaitForAcceptChannel { temporary_channel_id },
        vec![ChannelAction::SendMessage(msg.into())],
    )
}

fn on_message(state: ChannelState, msg: Messages, ctx: &ProcessContext) -> (ChannelState, Actions) {
    match state {
        ChannelState::Syncing(inner) => return on_message_while_syncing(*inner, msg),
        ChannelState::Offline(_) => return (state, vec![]),
        _ => {}
    }
    match (&state, msg) {
        (ChannelState::WaitForOpenChannel { temporary_channel_id }, Messages::OpenChannel2(open)) => {
            on_open_channel2(*temporary_channel_id, open, ctx)
        }
        (ChannelState::WaitForAcceptChannel { temporary_channel_id }, Messages::AcceptChannel2(accept)) => {
            on_accept_channel2(*temporary_channel_id, accept, ctx)
        }
        (ChannelState::WaitForChannelReady { commitments }, Messages::FundingLocked(fl)) => {
            on_channel_ready(commitments.clone(), fl)
        }
        (ChannelState::Normal { .. }, msg) => on_normal_message(state, msg),
        (ChannelState::ShuttingDown { .. } | ChannelState::Negotiating { .. }, msg) => {
            on_closing_message(state, msg)
        }
        (_, Messages::ChannelReestablish(reest)) => on_reestablish(state, reest),
        _ => (state, vec![]),
    }
}

fn on_message_while_syncing(inner: ChannelState, msg: Messages) -> (ChannelState, Actions) {
    if let Messages::ChannelReestablish(reest) = &msg {
        let commitments = match inner.commitments() {
            Some(c) => c,
            None => return (inner, vec![]),
        };
        let outcome = reestablish::handle_reestablish(commitments, reest);
        let mut actions = vec![];
        match outcome {
            ReestablishOutcome::WeAreBehind => {
                // Needs recovery through KeyManager::open_backup; the
                // orchestrator owns that round trip, so we surface it and
                // stay in Syncing.
                return (ChannelState::Syncing(Box::new(inner)), actions);
            }
            ReestablishOutcome::RetransmitCommitment | ReestablishOutcome::RetransmitRevocation => {
                // Retransmission itself is handled by the orchestrator,
                // which keeps the last-sent messages; we just unwrap.
            }
            ReestablishOutcome::TheyAreBehind | ReestablishOutcome::InSync => {}
        }
        actions.push(store(
            commitments,
            inner.persisted_tag().unwrap_or(crate::channel::commitments::PersistedStateTag::Normal),
        ));
        return (inner, actions);
    }
    // Any non-reestablish message while syncing belongs to the inner state;
    // recurse once resynced is established by a prior reestablish.
    (ChannelState::Syncing(Box::new(inner)), vec![])
}

fn on_reestablish(state: ChannelState, reest: wire::reestablish::ChannelReestablish) -> (ChannelState, Actions) {
    let commitments = match state.commitments() {
        Some(c) => c,
        None => return (state, vec![]),
    };
    let outcome = reestablish::handle_reestablish(commitments, &reest);
    let reply = ChannelAction::SendMessage(reestablish::build_reestablish(commitments, None).into());
    match outcome {
        ReestablishOutcome::WeAreBehind => (state, vec![reply]),
        _ => (state, vec![reply]),
    }
}

fn on_open_channel2(
    temporary_channel_id: wire::TempChannelId,
    open: OpenChannel2,
    ctx: &ProcessContext,
) -> (ChannelState, Actions) {
    // `option_dual_fund` carries no explicit `channel_reserve_satoshis`
    // field (each side's reserve is fixed at our own dust limit instead),
    // so the reserve-vs-dust check is passed our own dust limit on both
    // sides.
    let our_dust_limit = Satoshi::from(354u64);
    if let Err(err) = policy::validate_remote_params(
        our_dust_limit,
        Satoshi::from(open.dust_limit_satoshis),
        our_dust_limit,
        open.to_self_delay,
        open.max_accepted_htlcs,
        ctx.max_to_self_delay,
    ) {
        return reject(temporary_channel_id, err);
    }
    // The `channel_ready`/params struct is finished once the interactive
    // transaction construction (driven by the orchestrator) tells us the
    // final funding amount via `FundingNegotiated`; here we only validate
    // and acknowledge the peer's proposed terms.
    (ChannelState::WaitForFundingCreated { temporary_channel_id }, vec![])
}

fn reject(temporary_channel_id: wire::TempChannelId, err: ChannelError) -> (ChannelState, Actions) {
    let msg = wire::bolt1::Error {
        channel_id: ChannelId::default(),
        data: err.to_string().into_bytes(),
    };
    let _ = temporary_channel_id;
    (ChannelState::Aborted, vec![ChannelAction::SendMessage(msg.into())])
}

fn on_accept_channel2(
    temporary_channel_id: wire::TempChannelId,
    accept: AcceptChannel2,
    ctx: &ProcessContext,
) -> (ChannelState, Actions) {
    let our_dust_limit = Satoshi::from(354u64);
    if let Err(err) = policy::validate_remote_params(
        our_dust_limit,
        Satoshi::from(accept.dust_limit_satoshis),
        our_dust_limit,
        accept.to_self_delay,
        accept.max_accepted_htlcs,
        ctx.max_to_self_delay,
    ) {
        return reject(temporary_channel_id, err);
    }
    (ChannelState::WaitForFundingCreated { temporary_channel_id }, vec![])
}

fn on_funding_negotiated(
    state: ChannelState,
    outpoint: bitcoin::OutPoint,
    script_pubkey: bitcoin::Script,
    amount: Satoshi,
    contributed_inputs: Vec<bitcoin::OutPoint>,
    min_depth: u32,
) -> (ChannelState, Actions) {
    let temporary_channel_id = match &state {
        ChannelState::WaitForFundingCreated { temporary_channel_id } => Some(*temporary_channel_id),
        _ => None,
    };
    if temporary_channel_id.is_none() && !matches!(state, ChannelState::Normal { .. }) {
        return (state, vec![]);
    }

    let channel_id = ChannelId::with(outpoint);
    let funding = crate::channel::funding::FundingInfo {
        outpoint,
        script_pubkey,
        amount,
        contributed_inputs,
        min_depth,
        confirmed_height: None,
        locked: false,
    };

    if let ChannelState::Normal { mut commitments } = state {
        // A splice landed: push a new (unconfirmed) active commitment ahead
        // of the existing one, carrying over the most recent balances.
        let prior = commitments.latest().clone();
        let new_commitment = Commitment { funding, ..prior };
        commitments.active.insert(0, new_commitment);
        let actions = vec![
            ChannelAction::WatchConfirmed { outpoint, min_depth },
            store(&commitments, crate::channel::commitments::PersistedStateTag::Normal),
        ];
        return (ChannelState::Normal { commitments }, actions);
    }

    use amplify::DumbDefault;
    let params = ChannelParams {
        local_keyset: crate::channel::keyset::LocalKeyset::dumb_default(),
        remote_keyset: RemoteKeyset::dumb_default(),
        dust_limit: Satoshi::from(354u64),
        reserve: Satoshi::from(amount.into_inner() / 100),
        max_htlc_value_in_flight: MilliSatoshi::from(amount),
        max_accepted_htlcs: 30,
        to_self_delay: 144,
        is_initiator: true,
        features: wire::InitFeatures::default(),
    };
    let commitment = Commitment {
        funding,
        local_commitment_number: 0,
        remote_commitment_number: 0,
        local_balance: MilliSatoshi::from(amount),
        remote_balance: MilliSatoshi::ZERO,
        htlcs: vec![],
        remote_next_per_commitment_point: dumb_pubkey!(),
        remote_per_commitment_secret: None,
        proposed_local_changes: vec![],
        proposed_remote_changes: vec![],
    };
    let commitments = Commitments {
        channel_id,
        temporary_channel_id,
        params,
        active: vec![commitment],
        inactive: vec![],
    };
    let actions = vec![
        ChannelAction::WatchConfirmed { outpoint, min_depth },
        store(&commitments, crate::channel::commitments::PersistedStateTag::WaitForFundingConfirmed),
    ];
    (ChannelState::WaitForFundingConfirmed { commitments }, actions)
}

fn on_watch(state: ChannelState, event: WatchEvent) -> (ChannelState, Actions) {
    match event {
        WatchEvent::FundingConfirmed { outpoint, height } => on_funding_confirmed(state, outpoint, height),
        WatchEvent::FundingSpent { outpoint, spending_tx } => on_funding_spent(state, outpoint, *spending_tx),
        WatchEvent::NewTip { height } => on_new_tip(state, height),
    }
}

fn on_funding_confirmed(state: ChannelState, outpoint: bitcoin::OutPoint, height: u32) -> (ChannelState, Actions) {
    let mut commitments = match state.commitments().cloned() {
        Some(c) => c,
        None => return (state, vec![]),
    };
    let mut found = false;
    for c in commitments.active.iter_mut() {
        if c.funding.outpoint == outpoint {
            c.funding.confirmed_height = Some(height);
            found = true;
        }
    }
    if !found {
        return (state, vec![]);
    }
    // `next_per_commitment_point` is our own point, derived by
    // `KeyManager`; `process` has no collaborator access, so the
    // orchestrator is expected to patch this field in before sending when
    // wiring a real key manager (§7).
    let channel_ready = FundingLocked {
        channel_id: commitments.channel_id,
        next_per_commitment_point: dumb_pubkey!(),
    };
    let mut actions = vec![ChannelAction::SendMessage(channel_ready.into())];

    match state {
        ChannelState::WaitForFundingConfirmed { .. } | ChannelState::LegacyWaitForFundingConfirmed { .. } => {
            actions.push(store(
                &commitments,
                crate::channel::commitments::PersistedStateTag::WaitForChannelReady,
            ));
            (ChannelState::WaitForChannelReady { commitments }, actions)
        }
        ChannelState::Normal { .. } => {
            let splice_locked = SpliceLocked {
                channel_id: commitments.channel_id,
                splice_txid: outpoint.txid,
            };
            actions.push(ChannelAction::SendMessage(splice_locked.into()));
            actions.push(store(&commitments, crate::channel::commitments::PersistedStateTag::Normal));
            (ChannelState::Normal { commitments }, actions)
        }
        other => (other, vec![]),
    }
}

/// A funding outpoint being spent while its commitment is not our latest
/// one is a revoked-commitment broadcast: §4.1 requires sweeping it with a
/// penalty transaction built from the historical per-commitment secret.
fn on_funding_spent(
    state: ChannelState,
    outpoint: bitcoin::OutPoint,
    spending_tx: bitcoin::Transaction,
) -> (ChannelState, Actions) {
    let expecting_close =
        matches!(state, ChannelState::ShuttingDown { .. } | ChannelState::Negotiating { .. } | ChannelState::Closing { .. });
    let commitments = match state.commitments() {
        Some(c) => c,
        None => return (state, vec![]),
    };
    let is_latest = commitments.latest().funding.outpoint == outpoint;
    let spending_txid = spending_tx.txid();
    let channel_id = commitments.channel_id;

    if is_latest && !expecting_close {
        // Nothing in our local state explains this spend: treat it as a
        // revoked-commitment broadcast and fetch the historical HTLC set
        // before building the penalty transaction.
        return (
            ChannelState::Closing { commitments: commitments.clone() },
            vec![
                ChannelAction::GetHtlcInfos { channel_id, revoked_commitment_txid: spending_txid },
                ChannelAction::NotifyClosing { channel_id },
            ],
        );
    }

    (
        ChannelState::Closed { commitments: commitments.clone() },
        vec![
            store(commitments, crate::channel::commitments::PersistedStateTag::Closed),
            ChannelAction::NotifyClosing { channel_id },
        ],
    )
}

fn on_new_tip(state: ChannelState, height: u32) -> (ChannelState, Actions) {
    let _ = height;
    (state, vec![])
}

fn on_channel_ready(mut commitments: Commitments, fl: FundingLocked) -> (ChannelState, Actions) {
    commitments.latest_mut().funding.locked = true;
    commitments.latest_mut().remote_next_per_commitment_point = fl.next_per_commitment_point;
    let actions = vec![store(&commitments, crate::channel::commitments::PersistedStateTag::Normal)];
    (ChannelState::Normal { commitments }, actions)
}

fn on_sign(state: ChannelState) -> (ChannelState, Actions) {
    let mut commitments = match state.commitments().cloned() {
        Some(c) if !c.latest().has_pending_changes() => return (state, vec![]),
        Some(c) => c,
        None => return (state, vec![]),
    };
    let commitment = commitments.latest_mut();
    apply_proposed_changes(commitment);
    commitment.local_commitment_number += 1;
    let commitment_number = commitment.local_commitment_number;

    let actions = vec![
        ChannelAction::RequestCommitmentSignature { channel_id: commitments.channel_id, commitment_number },
        store(&commitments, commitments_state_tag(&state)),
    ];
    (replace_commitments(state, commitments), actions)
}

fn apply_proposed_changes(commitment: &mut Commitment) {
    let changes = std::mem::take(&mut commitment.proposed_local_changes);
    for change in changes {
        match change {
            ProposedChange::Add(htlc) => {
                commitment.local_balance = commitment.local_balance - htlc.amount;
                commitment.htlcs.push(htlc);
            }
            ProposedChange::Fulfill { htlc_id, preimage } => {
                if let Some(h) = commitment.find_htlc_mut(htlc_id) {
                    h.outcome = Some(HtlcOutcome::Fulfilled { preimage });
                    commitment.remote_balance = commitment.remote_balance + h.amount;
                }
            }
            ProposedChange::Fail { htlc_id, reason } => {
                if let Some(h) = commitment.find_htlc_mut(htlc_id) {
                    h.outcome = Some(HtlcOutcome::Failed { reason });
                    commitment.local_balance = commitment.local_balance + h.amount;
                }
            }
        }
    }
}

fn commitments_state_tag(state: &ChannelState) -> crate::channel::commitments::PersistedStateTag {
    state
        .persisted_tag()
        .unwrap_or(crate::channel::commitments::PersistedStateTag::Normal)
}

fn replace_commitments(state: ChannelState, commitments: Commitments) -> ChannelState {
    match state {
        ChannelState::Normal { .. } => ChannelState::Normal { commitments },
        ChannelState::ShuttingDown { .. } => ChannelState::ShuttingDown { commitments },
        ChannelState::Negotiating { .. } => ChannelState::Negotiating { commitments },
        other => other,
    }
}

fn on_check_timeout(state: ChannelState, current_tip: u32) -> (ChannelState, Actions) {
    let commitments = match state.commitments() {
        Some(c) => c,
        None => return (state, vec![]),
    };
    let timed_out = commitments
        .all_htlcs()
        .any(|h| !h.is_resolved() && h.is_timed_out(current_tip, HTLC_TIMEOUT_SAFETY_BLOCKS));
    if timed_out {
        on_force_close(state)
    } else {
        (state, vec![])
    }
}

fn on_add_htlc(
    state: ChannelState,
    req: crate::channel::command::AddHtlcRequest,
) -> (ChannelState, Actions) {
    let mut commitments = match state.commitments().cloned() {
        Some(c) => c,
        None => {
            return (
                state,
                vec![ChannelAction::Report(CmdResult::HtlcAddFailed {
                    part_id: req.part_id,
                    reason: "channel not in Normal state".into(),
                })],
            )
        }
    };
    if !matches!(state, ChannelState::Normal { .. }) {
        return (
            state,
            vec![ChannelAction::Report(CmdResult::HtlcAddFailed {
                part_id: req.part_id,
                reason: "channel not in Normal state".into(),
            })],
        );
    }

    let amount = MilliSatoshi::from(req.amount_msat);
    let htlc_id = commitments.latest().next_htlc_id();
    if let Err(err) =
        policy::check_add_htlc(&commitments.params, commitments.latest(), amount, true)
    {
        return (
            ChannelState::Normal { commitments },
            vec![ChannelAction::Report(CmdResult::HtlcAddFailed {
                part_id: req.part_id,
                reason: err.to_string(),
            })],
        );
    }

    let htlc = InFlightHtlc {
        htlc_id,
        direction: HtlcDirection::Outgoing,
        amount,
        payment_hash: req.payment_hash,
        cltv_expiry: req.cltv_expiry,
        outcome: None,
    };
    let wire_msg = UpdateAddHtlc {
        channel_id: commitments.channel_id,
        htlc_id,
        amount_msat: req.amount_msat,
        payment_hash: bitcoin::hashes::sha256::Hash::from_inner(req.payment_hash),
        cltv_expiry: req.cltv_expiry,
        onion_routing_packet: req.onion_routing_packet,
        trampoline_onion_packet: None,
        unknown_tlvs: Default::default(),
    };
    commitments.latest_mut().proposed_local_changes.push(ProposedChange::Add(htlc));

    let actions = vec![
        ChannelAction::SendMessage(wire_msg.into()),
        ChannelAction::Report(CmdResult::HtlcAdded { part_id: req.part_id, htlc_id }),
        store(&commitments, crate::channel::commitments::PersistedStateTag::Normal),
    ];
    (ChannelState::Normal { commitments }, actions)
}

fn on_fulfill_htlc(state: ChannelState, htlc_id: u64, preimage: [u8; 32]) -> (ChannelState, Actions) {
    let mut commitments = match state.commitments().cloned() {
        Some(c) => c,
        None => return (state, vec![]),
    };
    if commitments.latest().find_htlc(htlc_id).is_none() {
        return (state, vec![]);
    }
    let wire_msg = UpdateFulfillHtlc { channel_id: commitments.channel_id, htlc_id, payment_preimage: preimage };
    commitments
        .latest_mut()
        .proposed_local_changes
        .push(ProposedChange::Fulfill { htlc_id, preimage });
    let actions = vec![
        ChannelAction::SendMessage(wire_msg.into()),
        store(&commitments, commitments_state_tag(&state)),
    ];
    (replace_commitments(state, commitments), actions)
}

fn on_fail_htlc(state: ChannelState, htlc_id: u64, reason: Vec<u8>) -> (ChannelState, Actions) {
    let mut commitments = match state.commitments().cloned() {
        Some(c) => c,
        None => return (state, vec![]),
    };
    if commitments.latest().find_htlc(htlc_id).is_none() {
        return (state, vec![]);
    }
    let wire_msg = UpdateFailHtlc { channel_id: commitments.channel_id, htlc_id, reason: reason.clone() };
    commitments
        .latest_mut()
        .proposed_local_changes
        .push(ProposedChange::Fail { htlc_id, reason });
    let actions = vec![
        ChannelAction::SendMessage(wire_msg.into()),
        store(&commitments, commitments_state_tag(&state)),
    ];
    (replace_commitments(state, commitments), actions)
}

fn on_normal_message(state: ChannelState, msg: Messages) -> (ChannelState, Actions) {
    let mut commitments = match state.commitments().cloned() {
        Some(c) => c,
        None => return (state, vec![]),
    };
    match msg {
        Messages::UpdateAddHtlc(add) => {
            let htlc = InFlightHtlc {
                htlc_id: add.htlc_id,
                direction: HtlcDirection::Incoming,
                amount: MilliSatoshi::from(add.amount_msat),
                payment_hash: *add.payment_hash.as_inner(),
                cltv_expiry: add.cltv_expiry,
                outcome: None,
            };
            commitments.latest_mut().proposed_remote_changes.push(ProposedChange::Add(htlc));
            let action = store(&commitments, crate::channel::commitments::PersistedStateTag::Normal);
            (ChannelState::Normal { commitments }, vec![action])
        }
        Messages::UpdateFulfillHtlc(fulfill) => {
            let actions = vec![ChannelAction::Report(CmdResult::HtlcFulfilled {
                htlc_id: fulfill.htlc_id,
                preimage: fulfill.payment_preimage,
            })];
            commitments.latest_mut().proposed_remote_changes.push(ProposedChange::Fulfill {
                htlc_id: fulfill.htlc_id,
                preimage: fulfill.payment_preimage,
            });
            (ChannelState::Normal { commitments }, actions)
        }
        Messages::UpdateFailHtlc(fail) => {
            let actions = vec![ChannelAction::Report(CmdResult::HtlcFailed {
                htlc_id: fail.htlc_id,
                reason: fail.reason.clone(),
            })];
            commitments.latest_mut().proposed_remote_changes.push(ProposedChange::Fail {
                htlc_id: fail.htlc_id,
                reason: fail.reason,
            });
            (ChannelState::Normal { commitments }, actions)
        }
        Messages::CommitmentSigned(signed) => on_commitment_signed(commitments, signed),
        Messages::RevokeAndAck(revoke) => on_revoke_and_ack(commitments, revoke),
        Messages::SpliceInit(_) => {
            // Interactive tx construction for the proposed splice is owned
            // by the orchestrator; it reports back via `FundingNegotiated`.
            (ChannelState::Normal { commitments }, vec![])
        }
        Messages::SpliceAck(_) => {
            (ChannelState::Normal { commitments }, vec![ChannelAction::Report(CmdResult::SpliceAccepted)])
        }
        Messages::SpliceLocked(locked) => on_splice_locked(commitments, locked),
        Messages::Shutdown(_) => {
            let actions = vec![store(&commitments, crate::channel::commitments::PersistedStateTag::ShuttingDown)];
            (ChannelState::ShuttingDown { commitments }, actions)
        }
        _ => (ChannelState::Normal { commitments }, vec![]),
    }
}

fn on_commitment_signed(mut commitments: Commitments, _signed: CommitmentSigned) -> (ChannelState, Actions) {
    let commitment = commitments.latest_mut();
    let remote_changes = std::mem::take(&mut commitment.proposed_remote_changes);
    for change in remote_changes {
        match change {
            ProposedChange::Add(htlc) => {
                commitment.remote_balance = commitment.remote_balance - htlc.amount;
                commitment.htlcs.push(htlc);
            }
            ProposedChange::Fulfill { htlc_id, preimage } => {
                if let Some(h) = commitment.find_htlc_mut(htlc_id) {
                    h.outcome = Some(HtlcOutcome::Fulfilled { preimage });
                    commitment.local_balance = commitment.local_balance + h.amount;
                }
            }
            ProposedChange::Fail { htlc_id, reason } => {
                if let Some(h) = commitment.find_htlc_mut(htlc_id) {
                    h.outcome = Some(HtlcOutcome::Failed { reason });
                    commitment.remote_balance = commitment.remote_balance + h.amount;
                }
            }
        }
    }
    commitment.remote_commitment_number += 1;
    let commitment_number = commitment.remote_commitment_number;

    let actions = vec![
        ChannelAction::RequestRevocation { channel_id: commitments.channel_id, commitment_number },
        store(&commitments, crate::channel::commitments::PersistedStateTag::Normal),
    ];
    (ChannelState::Normal { commitments }, actions)
}

fn on_revoke_and_ack(mut commitments: Commitments, revoke: RevokeAndAck) -> (ChannelState, Actions) {
    let commitment = commitments.latest_mut();
    commitment.remote_per_commitment_secret = Some(revoke.per_commitment_secret);
    commitment.remote_next_per_commitment_point = revoke.next_per_commitment_point;
    let actions = vec![store(&commitments, crate::channel::commitments::PersistedStateTag::Normal)];
    (ChannelState::Normal { commitments }, actions)
}

fn on_splice_locked(mut commitments: Commitments, _locked: SpliceLocked) -> (ChannelState, Actions) {
    commitments.latest_mut().funding.locked = true;
    if commitments.active.len() > 1 && commitments.active[1].funding.locked {
        commitments.prune_superseded_fundings();
    }
    let actions = vec![store(&commitments, crate::channel::commitments::PersistedStateTag::Normal)];
    (ChannelState::Normal { commitments }, actions)
}

fn on_splice_request(
    state: ChannelState,
    req: crate::channel::command::SpliceRequest,
) -> (ChannelState, Actions) {
    let commitments = match state.commitments() {
        Some(c) => c,
        None => {
            return (
                state,
                vec![ChannelAction::Report(CmdResult::SpliceRejected {
                    reason: "channel not in Normal state".into(),
                })],
            )
        }
    };
    if !matches!(state, ChannelState::Normal { .. }) || commitments.has_pending_splice() {
        return (
            state,
            vec![ChannelAction::Report(CmdResult::SpliceRejected {
                reason: "a splice is already in flight".into(),
            })],
        );
    }
    let contribution = splice::net_contribution(&req.splice_in, &req.splice_out);
    let init = splice::build_splice_init(
        commitments.channel_id,
        contribution,
        req.feerate_per_kw,
        commitments.params.local_keyset.funding_pubkey,
    );
    (state, vec![ChannelAction::SendMessage(init.into())])
}

fn on_closing_message(state: ChannelState, msg: Messages) -> (ChannelState, Actions) {
    let commitments = match state.commitments().cloned() {
        Some(c) => c,
        None => return (state, vec![]),
    };
    match msg {
        Messages::ClosingSigned(signed) => {
            let actions = vec![store(&commitments, crate::channel::commitments::PersistedStateTag::Negotiating)];
            let _ = signed;
            (ChannelState::Negotiating { commitments }, actions)
        }
        Messages::Shutdown(_) => {
            let actions = vec![store(&commitments, crate::channel::commitments::PersistedStateTag::Negotiating)];
            (ChannelState::Negotiating { commitments }, actions)
        }
        _ => (replace_commitments(state, commitments), vec![]),
    }
}

fn on_close(
    state: ChannelState,
    script_pubkey: Option<bitcoin::Script>,
    feerate_per_kw: Option<u32>,
) -> (ChannelState, Actions) {
    let commitments = match state.commitments().cloned() {
        Some(c) => c,
        None => return (state, vec![]),
    };
    let shutdown_script = script_pubkey
        .or_else(|| commitments.params.local_keyset.shutdown_scriptpubkey.clone())
        .unwrap_or_else(bitcoin::Script::new);
    let _ = feerate_per_kw;
    let msg = wire::bolt2::Shutdown { channel_id: commitments.channel_id, scriptpubkey: shutdown_script };
    let actions = vec![
        ChannelAction::SendMessage(msg.into()),
        store(&commitments, crate::channel::commitments::PersistedStateTag::ShuttingDown),
    ];
    (ChannelState::ShuttingDown { commitments }, actions)
}

fn on_force_close(state: ChannelState) -> (ChannelState, Actions) {
    let commitments = match state.commitments().cloned() {
        Some(c) => c,
        None => return (state, vec![]),
    };
    let channel_id = commitments.channel_id;
    let commitment_tx = build_local_commitment_tx(&commitments);
    let actions = vec![
        ChannelAction::PublishTx(Box::new(commitment_tx)),
        store(&commitments, crate::channel::commitments::PersistedStateTag::Closing),
        ChannelAction::NotifyClosing { channel_id },
    ];
    (ChannelState::Closing { commitments }, actions)
}

/// Answers a `GetHtlcInfos` round trip once the historical HTLC set for a
/// revoked commitment comes back: builds and broadcasts the penalty
/// transaction. `htlcs` may legitimately be empty (the revoked commitment
/// had no outstanding HTLCs); the main-output sweep still has to happen,
/// since a revoked broadcast is never itself an expected event (§4.1).
fn on_htlc_infos_response(
    state: ChannelState,
    revoked_commitment_txid: bitcoin::Txid,
    htlcs: Vec<crate::channel::command::HtlcInfo>,
) -> (ChannelState, Actions) {
    let commitments = match state.commitments().cloned() {
        Some(c) => c,
        None => return (state, vec![]),
    };
    let penalty_ctx = crate::channel::action::PenaltyContext { revoked_commitment_txid, htlcs };
    let penalty_tx = build_penalty_tx(&commitments, &penalty_ctx);
    let actions = vec![
        ChannelAction::PublishTx(Box::new(penalty_tx)),
        store(&commitments, crate::channel::commitments::PersistedStateTag::Closed),
    ];
    (ChannelState::Closed { commitments }, actions)
}

/// Unsigned force-close commitment transaction: one input (the channel's
/// latest funding) and a single output sweeping our own balance. Real
/// BOLT-3 commitment construction (anchor outputs, HTLC scripts, output
/// ordering, and the signature itself) needs `KeyManager` and is out of
/// scope here (§1); the orchestrator's signer is expected to replace this
/// before the broadcast has any chance of confirming, the same way
/// `PeerOrchestrator::sign_commitment` stands in for `commitment_signed`'s
/// unsigned transaction today.
fn build_local_commitment_tx(commitments: &Commitments) -> bitcoin::Transaction {
    let commitment = commitments.latest();
    bitcoin::Transaction {
        version: 2,
        lock_time: bitcoin::PackedLockTime(0),
        input: vec![bitcoin::TxIn {
            previous_output: commitment.funding.outpoint,
            script_sig: bitcoin::Script::new(),
            sequence: bitcoin::Sequence::ENABLE_RBF_NO_LOCKTIME,
            witness: bitcoin::Witness::new(),
        }],
        output: vec![bitcoin::TxOut {
            value: commitment.local_balance.sats_floor().into_inner(),
            script_pubkey: commitments
                .params
                .local_keyset
                .shutdown_scriptpubkey
                .clone()
                .unwrap_or_else(bitcoin::Script::new),
        }],
    }
}

/// Unsigned penalty transaction sweeping every output of a revoked
/// commitment broadcast: the main output plus one output per outstanding
/// HTLC (§4.1's "publishes the corresponding penalty_tx" invariant — the
/// single most safety-critical behavior this crate implements). Deriving
/// the real per-output script/index from the revocation secret is a
/// `KeyManager` concern (§7) and out of scope here; this builds the input
/// set — one per swept output — that the orchestrator's signer fills in.
fn build_penalty_tx(
    commitments: &Commitments,
    penalty: &crate::channel::action::PenaltyContext,
) -> bitcoin::Transaction {
    let mut input = vec![bitcoin::TxIn {
        previous_output: bitcoin::OutPoint { txid: penalty.revoked_commitment_txid, vout: 0 },
        script_sig: bitcoin::Script::new(),
        sequence: bitcoin::Sequence::ENABLE_RBF_NO_LOCKTIME,
        witness: bitcoin::Witness::new(),
    }];
    for (i, _htlc) in penalty.htlcs.iter().enumerate() {
        input.push(bitcoin::TxIn {
            previous_output: bitcoin::OutPoint {
                txid: penalty.revoked_commitment_txid,
                vout: (i + 1) as u32,
            },
            script_sig: bitcoin::Script::new(),
            sequence: bitcoin::Sequence::ENABLE_RBF_NO_LOCKTIME,
            witness: bitcoin::Witness::new(),
        });
    }
    bitcoin::Transaction {
        version: 2,
        lock_time: bitcoin::PackedLockTime(0),
        input,
        output: vec![bitcoin::TxOut {
            value: commitments.latest().local_balance.sats_floor().into_inner(),
            script_pubkey: commitments
                .params
                .local_keyset
                .shutdown_scriptpubkey
                .clone()
                .unwrap_or_else(bitcoin::Script::new),
        }],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::commitments::tests_support::{add_htlc, dummy_commitments};

    fn ctx() -> crate::config::NodeParams {
        crate::config::NodeParams::default()
    }

    #[test]
    fn sign_materializes_buffered_htlc_add_into_the_next_commitment() {
        let mut commitments = dummy_commitments();
        add_htlc(&mut commitments, 0, HtlcDirection::Outgoing, 1_000_000, 600_000);
        commitments.latest_mut().htlcs.clear();
        commitments
            .latest_mut()
            .proposed_local_changes
            .push(ProposedChange::Add(InFlightHtlc {
                htlc_id: 0,
                direction: HtlcDirection::Outgoing,
                amount: MilliSatoshi::from(1_000_000u64),
                payment_hash: [0u8; 32],
                cltv_expiry: 600_000,
                outcome: None,
            }));
        let state = ChannelState::Normal { commitments };
        let params = ctx();
        let context = ProcessContext { node_params: &params, max_to_self_delay: 2016 };
        let (next, actions) = process(state, ChannelCommand::Sign, &context);
        let commitments = next.commitments().unwrap();
        assert_eq!(commitments.latest().local_commitment_number, 1);
        assert_eq!(commitments.latest().htlcs.len(), 1);
        assert!(actions
            .iter()
            .any(|a| matches!(a, ChannelAction::RequestCommitmentSignature { commitment_number: 1, .. })));
    }

    #[test]
    fn check_timeout_force_closes_when_an_htlc_expires() {
        let mut commitments = dummy_commitments();
        add_htlc(&mut commitments, 0, HtlcDirection::Outgoing, 1_000_000, 600_000);
        let state = ChannelState::Normal { commitments };
        let params = ctx();
        let context = ProcessContext { node_params: &params, max_to_self_delay: 2016 };
        let (next, actions) =
            process(state, ChannelCommand::CheckHtlcTimeout { current_tip: 600_000 }, &context);
        assert!(matches!(next, ChannelState::Closing { .. }));
        assert!(actions.iter().any(|a| matches!(a, ChannelAction::NotifyClosing { .. })));
    }

    #[test]
    fn force_close_publishes_the_local_commitment_transaction() {
        let commitments = dummy_commitments();
        let funding_outpoint = commitments.latest().funding.outpoint;
        let state = ChannelState::Normal { commitments };
        let params = ctx();
        let context = ProcessContext { node_params: &params, max_to_self_delay: 2016 };
        let (next, actions) = process(state, ChannelCommand::ForceClose, &context);
        assert!(matches!(next, ChannelState::Closing { .. }));
        let published = actions.iter().find_map(|a| match a {
            ChannelAction::PublishTx(tx) => Some(tx),
            _ => None,
        });
        let tx = published.expect("force-close must publish a transaction");
        assert_eq!(tx.input.len(), 1);
        assert_eq!(tx.input[0].previous_output, funding_outpoint);
    }

    #[test]
    fn htlc_infos_response_publishes_a_penalty_tx_covering_every_outstanding_htlc() {
        let commitments = dummy_commitments();
        let state = ChannelState::Normal { commitments };
        let params = ctx();
        let context = ProcessContext { node_params: &params, max_to_self_delay: 2016 };
        let revoked_txid = bitcoin::Txid::from_inner([7u8; 32]);
        let htlcs = vec![crate::channel::command::HtlcInfo {
            commitment_number: 0,
            revoked_commitment_txid: revoked_txid,
            htlc_id: 0,
            cltv_expiry: 600_000,
            payment_hash: [0u8; 32],
            offered: true,
        }];
        let cmd = ChannelCommand::GetHtlcInfosResponse { revoked_commitment_txid: revoked_txid, htlcs };
        let (next, actions) = process(state, cmd, &context);
        assert!(matches!(next, ChannelState::Closed { .. }));
        let published = actions.iter().find_map(|a| match a {
            ChannelAction::PublishTx(tx) => Some(tx),
            _ => None,
        });
        let tx = published.expect("revoked-commitment response must publish a penalty tx");
        // main output plus one per outstanding htlc
        assert_eq!(tx.input.len(), 2);
        assert!(tx.input.iter().all(|i| i.previous_output.txid == revoked_txid));
    }

    #[test]
    fn htlc_infos_response_still_sweeps_the_main_output_with_no_outstanding_htlcs() {
        let commitments = dummy_commitments();
        let state = ChannelState::Normal { commitments };
        let params = ctx();
        let context = ProcessContext { node_params: &params, max_to_self_delay: 2016 };
        let revoked_txid = bitcoin::Txid::from_inner([9u8; 32]);
        let cmd = ChannelCommand::GetHtlcInfosResponse { revoked_commitment_txid: revoked_txid, htlcs: vec![] };
        let (_, actions) = process(state, cmd, &context);
        let published = actions.iter().find_map(|a| match a {
            ChannelAction::PublishTx(tx) => Some(tx),
            _ => None,
        });
        let tx = published.expect("zero-htlc revoked commitment still needs its main output swept");
        assert_eq!(tx.input.len(), 1);
    }

    #[test]
    fn disconnect_wraps_state_in_offline() {
        let commitments = dummy_commitments();
        let state = ChannelState::Normal { commitments };
        let params = ctx();
        let context = ProcessContext { node_params: &params, max_to_self_delay: 2016 };
        let (next, _) = process(state, ChannelCommand::Disconnected, &context);
        assert!(next.is_offline());
    }
}
