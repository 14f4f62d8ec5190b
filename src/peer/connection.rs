// Interactive transaction construction (BOLT-2 `option_dual_fund`): the
// `tx_add_input`/`tx_add_output`/`tx_remove_input`/`tx_remove_output`/
// `tx_complete` round trip that builds a channel's funding transaction (or
// a splice's) jointly with the peer. `channel::process` never runs this
// loop itself (§4.1); it is owned here and handed to `process` as a single
// finished `ChannelCommand::FundingNegotiated` once both sides send
// `tx_complete`.

use bitcoin::{OutPoint, PackedLockTime, Script, Sequence, Transaction, TxIn, TxOut, Witness};

use wire::dual_funding::{TxAddInput, TxAddOutput, TxComplete, TxRemoveInput, TxRemoveOutput};
use wire::ChannelId;

use crate::wallet::{Satoshi, UnspentItem, WalletSnapshot};

#[derive(Clone, Debug, thiserror::Error)]
pub enum InteractiveTxError {
    #[error("serial id {0} parity does not match the sending side")]
    WrongParity(u64),
    #[error("unknown serial id {0} in tx_remove_{1}")]
    UnknownSerial(u64, &'static str),
    #[error("peer's parent transaction for outpoint {0} is missing from our wallet snapshot")]
    MissingParentTx(OutPoint),
    #[error("negotiation produced no inputs at all")]
    NoInputs,
}

#[derive(Clone, Debug)]
struct PendingInput {
    serial_id: u64,
    outpoint: OutPoint,
    sequence: u32,
}

#[derive(Clone, Debug)]
struct PendingOutput {
    serial_id: u64,
    sats: u64,
    script_pubkey: Script,
}

/// Jointly constructs one funding (or splice) transaction with a peer.
/// BOLT-2 assigns even serial ids to the funding initiator and odd ones to
/// the acceptor so both sides can add entries without colliding.
pub struct InteractiveTxBuilder {
    channel_id: ChannelId,
    initiator: bool,
    next_local_serial: u64,
    our_inputs: Vec<PendingInput>,
    our_outputs: Vec<PendingOutput>,
    their_inputs: Vec<PendingInput>,
    their_outputs: Vec<PendingOutput>,
    we_sent_complete: bool,
    they_sent_complete: bool,
}

impl InteractiveTxBuilder {
    pub fn new(channel_id: ChannelId, initiator: bool) -> Self {
        InteractiveTxBuilder {
            channel_id,
            initiator,
            next_local_serial: if initiator { 0 } else { 1 },
            our_inputs: Vec::new(),
            our_outputs: Vec::new(),
            their_inputs: Vec::new(),
            their_outputs: Vec::new(),
            we_sent_complete: false,
            they_sent_complete: false,
        }
    }

    fn take_serial(&mut self) -> u64 {
        let serial = self.next_local_serial;
        self.next_local_serial += 2;
        serial
    }

    /// Contributes one of our own wallet UTXOs as a funding input.
    /// `parent_tx` is the UTXO's containing transaction (BOLT-2 requires
    /// the full previous transaction so the peer can verify the input's
    /// amount without trusting us), taken from the wallet snapshot's
    /// `parent_txs` map.
    pub fn add_our_input(&mut self, utxo: &UnspentItem, parent_tx: &Transaction) -> TxAddInput {
        let serial_id = self.take_serial();
        self.our_inputs.push(PendingInput { serial_id, outpoint: utxo.outpoint(), sequence: 0xffff_fffd });
        TxAddInput {
            channel_id: self.channel_id,
            serial_id,
            prevtx: bitcoin::consensus::serialize(parent_tx),
            prevtx_out: utxo.output_index,
            sequence: 0xffff_fffd,
        }
    }

    /// Contributes one of our own outputs (the channel's funding output, or
    /// change).
    pub fn add_our_output(&mut self, sats: Satoshi, script_pubkey: Script) -> TxAddOutput {
        use amplify::Wrapper;
        let serial_id = self.take_serial();
        let sats = sats.into_inner();
        self.our_outputs.push(PendingOutput { serial_id, sats, script_pubkey: script_pubkey.clone() });
        TxAddOutput { channel_id: self.channel_id, serial_id, sats, scriptpubkey: script_pubkey }
    }

    fn peer_serial_is_valid(&self, serial_id: u64) -> bool {
        let expect_even = !self.initiator;
        (serial_id % 2 == 0) == expect_even
    }

    pub fn on_tx_add_input(&mut self, msg: &TxAddInput) -> Result<(), InteractiveTxError> {
        if !self.peer_serial_is_valid(msg.serial_id) {
            return Err(InteractiveTxError::WrongParity(msg.serial_id));
        }
        let prevtx: Transaction = bitcoin::consensus::deserialize(&msg.prevtx)
            .map_err(|_| InteractiveTxError::MissingParentTx(OutPoint::new(Default::default(), msg.prevtx_out)))?;
        let outpoint = OutPoint::new(prevtx.txid(), msg.prevtx_out);
        self.their_inputs.push(PendingInput { serial_id: msg.serial_id, outpoint, sequence: msg.sequence });
        self.they_sent_complete = false;
        Ok(())
    }

    pub fn on_tx_add_output(&mut self, msg: &TxAddOutput) -> Result<(), InteractiveTxError> {
        if !self.peer_serial_is_valid(msg.serial_id) {
            return Err(InteractiveTxError::WrongParity(msg.serial_id));
        }
        self.their_outputs.push(PendingOutput {
            serial_id: msg.serial_id,
            sats: msg.sats,
            script_pubkey: msg.scriptpubkey.clone(),
        });
        self.they_sent_complete = false;
        Ok(())
    }

    pub fn on_tx_remove_input(&mut self, msg: &TxRemoveInput) -> Result<(), InteractiveTxError> {
        let before = self.their_inputs.len();
        self.their_inputs.retain(|i| i.serial_id != msg.serial_id);
        if self.their_inputs.len() == before {
            return Err(InteractiveTxError::UnknownSerial(msg.serial_id, "input"));
        }
        self.they_sent_complete = false;
        Ok(())
    }

    pub fn on_tx_remove_output(&mut self, msg: &TxRemoveOutput) -> Result<(), InteractiveTxError> {
        let before = self.their_outputs.len();
        self.their_outputs.retain(|o| o.serial_id != msg.serial_id);
        if self.their_outputs.len() == before {
            return Err(InteractiveTxError::UnknownSerial(msg.serial_id, "output"));
        }
        self.they_sent_complete = false;
        Ok(())
    }

    pub fn on_tx_complete(&mut self) { self.they_sent_complete = true; }

    pub fn mark_our_complete(&mut self) -> TxComplete {
        self.we_sent_complete = true;
        TxComplete { channel_id: self.channel_id }
    }

    pub fn both_sides_done(&self) -> bool { self.we_sent_complete && self.they_sent_complete }

    /// Assembles the negotiated transaction once both sides sent
    /// `tx_complete` (§4.1). Inputs and outputs are ordered by ascending
    /// serial id per BOLT-2, independent of arrival order.
    pub fn finalize(&self, locktime: u32) -> Result<Transaction, InteractiveTxError> {
        let mut inputs: Vec<&PendingInput> = self.our_inputs.iter().chain(self.their_inputs.iter()).collect();
        inputs.sort_by_key(|i| i.serial_id);
        if inputs.is_empty() {
            return Err(InteractiveTxError::NoInputs);
        }
        let mut outputs: Vec<&PendingOutput> = self.our_outputs.iter().chain(self.their_outputs.iter()).collect();
        outputs.sort_by_key(|o| o.serial_id);

        Ok(Transaction {
            version: 2,
            lock_time: PackedLockTime(locktime),
            input: inputs
                .into_iter()
                .map(|i| TxIn {
                    previous_output: i.outpoint,
                    script_sig: Script::new(),
                    sequence: Sequence(i.sequence),
                    witness: Witness::new(),
                })
                .collect(),
            output: outputs
                .into_iter()
                .map(|o| TxOut { value: o.sats, script_pubkey: o.script_pubkey.clone() })
                .collect(),
        })
    }

    /// Every outpoint we ourselves contributed, for
    /// `ChannelCommand::FundingNegotiated`'s `contributed_inputs`.
    pub fn our_contributed_outpoints(&self) -> Vec<OutPoint> {
        self.our_inputs.iter().map(|i| i.outpoint).collect()
    }
}

/// Picks wallet UTXOs to cover `target` satoshis for a funding/splice
/// contribution, reusing the same largest-first rule as swap-in input
/// selection (§4.1/§4.3) since both are "cover this amount from the
/// wallet" problems.
pub fn select_funding_inputs(
    snapshot: &WalletSnapshot,
    target: Satoshi,
    current_height: u32,
) -> Option<(Vec<UnspentItem>, Satoshi)> {
    use amplify::Wrapper;
    let mut candidates: Vec<&UnspentItem> =
        snapshot.all_utxos().filter(|u| u.confirmations(current_height) > 0).collect();
    candidates.sort_by_key(|u| std::cmp::Reverse(u.amount));

    let mut total = 0u64;
    let mut selected = Vec::new();
    for utxo in candidates {
        if total >= target.into_inner() {
            break;
        }
        total += utxo.amount.into_inner();
        selected.push(utxo.clone());
    }
    if total >= target.into_inner() {
        Some((selected, Satoshi::from(total)))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chan() -> ChannelId { ChannelId::with(OutPoint::null()) }

    #[test]
    fn finalize_fails_with_no_inputs_at_all() {
        let builder = InteractiveTxBuilder::new(chan(), true);
        assert!(matches!(builder.finalize(0), Err(InteractiveTxError::NoInputs)));
    }

    #[test]
    fn initiator_and_acceptor_serials_never_collide() {
        let mut initiator = InteractiveTxBuilder::new(chan(), true);
        let mut acceptor = InteractiveTxBuilder::new(chan(), false);
        let a = initiator.take_serial();
        let b = acceptor.take_serial();
        assert_eq!(a % 2, 0);
        assert_eq!(b % 2, 1);
        assert_ne!(a, b);
    }

    #[test]
    fn rejects_a_peer_input_using_our_own_parity() {
        let mut acceptor = InteractiveTxBuilder::new(chan(), false);
        let bad = TxAddInput { channel_id: chan(), serial_id: 1, prevtx: vec![], prevtx_out: 0, sequence: 0 };
        assert!(matches!(acceptor.on_tx_add_input(&bad), Err(InteractiveTxError::WrongParity(1))));
    }
}
