// Onion messages (§4.6): store-and-forward envelopes carried over blinded
// paths, independent of any channel or payment. The postman only
// recognizes and dispatches payloads this node understands (Bolt-12
// invoice requests, trampoline control messages); anything else is
// forwarded on or dropped per the blinded hop's instructions, which is the
// `SphinxPeeler` collaborator's job, not this module's.

use std::collections::HashMap;

use thiserror::Error;
use tokio::sync::{oneshot, Mutex};
use wire::bolt2::OnionPacket;
use wire::onion_message::{BlindedHop, BlindedPath, OnionMessage};

#[derive(Clone, Debug, Error)]
pub enum PostmanError {
    #[error("no subscriber registered for onion message payload tag {0}")]
    NoSubscriber(u64),

    #[error("blinded path has no hops")]
    EmptyPath,
}

/// The result of peeling one layer off an onion message (§4.6): either this
/// node is the final recipient and gets `payload`, or the message must be
/// relayed on to `next_node` with a freshly-encrypted `next_packet`.
#[derive(Clone, Debug)]
pub enum PeeledOnionMessage {
    ForUs { payload: Vec<u8> },
    Forward { next_node: secp256k1::PublicKey, next_packet: OnionPacket },
}

/// Identifies what kind of payload an inbound onion message carried, so the
/// orchestrator can route it to the right handler (payment probe response,
/// trampoline liquidity ask, or an application-defined message) without the
/// postman itself needing to know about payments or swap-ins.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PayloadKind {
    Bolt12InvoiceRequest,
    Bolt12Invoice,
    TrampolineControl,
    Unknown,
}

pub fn classify_payload(payload: &[u8]) -> PayloadKind {
    match payload.first() {
        Some(0x01) => PayloadKind::Bolt12InvoiceRequest,
        Some(0x02) => PayloadKind::Bolt12Invoice,
        Some(0x03) => PayloadKind::TrampolineControl,
        _ => PayloadKind::Unknown,
    }
}

/// Builds an outbound onion message over a blinded path, delegating the
/// actual Sphinx construction to the [`crate::collaborators::SphinxPeeler`]
/// since this node never holds the long-term onion keys needed to encrypt
/// every hop itself (§1, §6).
pub fn send_via<P: crate::collaborators::SphinxPeeler + ?Sized>(
    peeler: &P,
    path: &BlindedPath,
    payload: &[u8],
) -> Result<OnionMessage, PostmanError> {
    if path.hops.is_empty() {
        return Err(PostmanError::EmptyPath);
    }
    Ok(peeler.build_onion_message(path, payload))
}

/// Peels one layer off a just-received `onion_message` (§4.6). `None` from
/// the peeler means the blinding point didn't authenticate (not addressed
/// to us, or corrupted) and the message is silently dropped per BOLT-7.
pub fn receive_via<P: crate::collaborators::SphinxPeeler + ?Sized>(
    peeler: &P,
    msg: &OnionMessage,
) -> Option<PeeledOnionMessage> {
    peeler.peel_onion_message(&msg.onion_routing_packet, msg.blinding_point)
}

/// BOLT-12 recommends padding a blinded route out to a minimum length even
/// when the real path is shorter, so an observer can't tell a one-hop
/// reply path from a longer one. Padding hops loop back through our own
/// node, which peels and immediately re-enters (§4.6's "self-padding").
pub const MIN_BLINDED_ROUTE_LENGTH: usize = 2;

pub fn pad_to_minimum_length(mut hops: Vec<BlindedHop>, our_node_id: secp256k1::PublicKey) -> Vec<BlindedHop> {
    while hops.len() < MIN_BLINDED_ROUTE_LENGTH {
        hops.push(BlindedHop { blinded_node_id: our_node_id, encrypted_data: Vec::new() });
    }
    hops
}

/// What became of one inbound onion message once fully peeled (possibly
/// through several self-padding hops).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PostmanAction {
    /// Delivered to a waiting subscriber.
    Delivered,
    /// Decrypted fine, but no subscription is waiting on this path id.
    Unsubscribed { path_id: [u8; 32] },
    /// Must be relayed on to another node.
    Relay { next_node: secp256k1::PublicKey, next_packet: OnionPacket },
    /// Didn't authenticate against our key at all.
    Dropped,
}

/// Matches inbound onion messages against pending `send`-and-await-reply
/// subscriptions (§4.6). The postman itself never inspects application
/// payloads beyond the leading 32-byte path id that addresses them to a
/// subscriber; everything after that is opaque to this module.
pub struct Postman {
    node_id: secp256k1::PublicKey,
    subscriptions: Mutex<HashMap<[u8; 32], oneshot::Sender<Vec<u8>>>>,
}

impl Postman {
    pub fn new(node_id: secp256k1::PublicKey) -> Self {
        Postman { node_id, subscriptions: Mutex::new(HashMap::new()) }
    }

    /// Registers interest in a reply addressed to `path_id`, returning the
    /// receiving half that resolves once [`Postman::handle_message`]
    /// delivers it.
    pub async fn subscribe(&self, path_id: [u8; 32]) -> oneshot::Receiver<Vec<u8>> {
        let (tx, rx) = oneshot::channel();
        self.subscriptions.lock().await.insert(path_id, tx);
        rx
    }

    pub async fn cancel(&self, path_id: &[u8; 32]) {
        self.subscriptions.lock().await.remove(path_id);
    }

    /// Peels `msg` until it resolves to something other than a hop
    /// addressed back to ourselves, per §4.6: "if the message is to be
    /// relayed back to ourselves (self-padding), re-enter peel".
    pub async fn handle_message<P: crate::collaborators::SphinxPeeler + ?Sized>(
        &self,
        peeler: &P,
        mut msg: OnionMessage,
    ) -> PostmanAction {
        loop {
            match receive_via(peeler, &msg) {
                None => return PostmanAction::Dropped,
                Some(PeeledOnionMessage::Forward { next_node, next_packet }) => {
                    if next_node == self.node_id {
                        msg = OnionMessage {
                            blinding_point: msg.blinding_point,
                            onion_routing_packet: next_packet,
                            unknown_tlvs: Default::default(),
                        };
                        continue;
                    }
                    return PostmanAction::Relay { next_node, next_packet };
                }
                Some(PeeledOnionMessage::ForUs { payload }) => {
                    if payload.len() < 32 {
                        return PostmanAction::Dropped;
                    }
                    let mut path_id = [0u8; 32];
                    path_id.copy_from_slice(&payload[..32]);
                    let body = payload[32..].to_vec();
                    let mut subs = self.subscriptions.lock().await;
                    return match subs.remove(&path_id) {
                        Some(tx) => {
                            let _ = tx.send(body);
                            PostmanAction::Delivered
                        }
                        None => PostmanAction::Unsubscribed { path_id },
                    };
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_known_payload_tags() {
        assert_eq!(classify_payload(&[0x01, 0xaa]), PayloadKind::Bolt12InvoiceRequest);
        assert_eq!(classify_payload(&[0x02]), PayloadKind::Bolt12Invoice);
        assert_eq!(classify_payload(&[0x03]), PayloadKind::TrampolineControl);
        assert_eq!(classify_payload(&[0xff]), PayloadKind::Unknown);
        assert_eq!(classify_payload(&[]), PayloadKind::Unknown);
    }

    struct NullPeeler;
    impl crate::collaborators::SphinxPeeler for NullPeeler {
        fn peel_onion_message(
            &self,
            _packet: &OnionPacket,
            _blinding_point: secp256k1::PublicKey,
        ) -> Option<PeeledOnionMessage> {
            None
        }

        fn build_onion_message(&self, _path: &BlindedPath, _payload: &[u8]) -> OnionMessage {
            OnionMessage {
                blinding_point: dumb_pubkey!(),
                onion_routing_packet: OnionPacket {
                    version: 0,
                    public_key: dumb_pubkey!(),
                    hop_data: [0u8; 1300],
                    hmac: [0u8; 32],
                },
                unknown_tlvs: Default::default(),
            }
        }
    }

    #[test]
    fn send_via_rejects_an_empty_blinded_path() {
        let path = BlindedPath { introduction_node: dumb_pubkey!(), blinding: dumb_pubkey!(), hops: vec![] };
        let err = send_via(&NullPeeler, &path, b"hello").unwrap_err();
        assert!(matches!(err, PostmanError::EmptyPath));
    }

    #[test]
    fn padding_tops_a_short_route_up_to_the_minimum_length() {
        let us = dumb_pubkey!();
        let hops = pad_to_minimum_length(vec![], us);
        assert_eq!(hops.len(), MIN_BLINDED_ROUTE_LENGTH);
        assert!(hops.iter().all(|h| h.blinded_node_id == us));
    }

    /// Delivers whatever is in the packet's `hop_data` verbatim, trimmed of
    /// its zero padding. Stands in for the real Sphinx peeling (external
    /// per §1): these tests only exercise subscription matching.
    struct EchoPeeler;
    impl crate::collaborators::SphinxPeeler for EchoPeeler {
        fn peel_onion_message(
            &self,
            packet: &OnionPacket,
            _blinding_point: secp256k1::PublicKey,
        ) -> Option<PeeledOnionMessage> {
            let end = packet.hop_data.iter().rposition(|&b| b != 0).map(|i| i + 1).unwrap_or(0);
            Some(PeeledOnionMessage::ForUs { payload: packet.hop_data[..end].to_vec() })
        }

        fn build_onion_message(&self, _path: &BlindedPath, payload: &[u8]) -> OnionMessage {
            let mut hop_data = [0u8; 1300];
            hop_data[..payload.len()].copy_from_slice(payload);
            OnionMessage {
                blinding_point: dumb_pubkey!(),
                onion_routing_packet: OnionPacket {
                    version: 0,
                    public_key: dumb_pubkey!(),
                    hop_data,
                    hmac: [0u8; 32],
                },
                unknown_tlvs: Default::default(),
            }
        }
    }

    fn envelope(path_id: [u8; 32], body: &[u8]) -> OnionMessage {
        let mut payload = path_id.to_vec();
        payload.extend_from_slice(body);
        EchoPeeler.build_onion_message(
            &BlindedPath { introduction_node: dumb_pubkey!(), blinding: dumb_pubkey!(), hops: vec![] },
            &payload,
        )
    }

    // §8 scenario 10: two postmans, a ping and its reply, both routed
    // purely through subscription matching on the path id.
    #[tokio::test]
    async fn onion_message_ping_and_reply_round_trip_via_subscriptions() {
        let node_a = dumb_pubkey!();
        let node_b = secp256k1::PublicKey::from_slice(&{
            let mut bytes = [0x02u8; 33];
            bytes[1] = 0x42;
            bytes
        })
        .expect("valid point");

        let postman_a = Postman::new(node_a);
        let postman_b = Postman::new(node_b);

        let ping_path_id = [1u8; 32];
        let pong_path_id = [2u8; 32];

        let pong_rx = postman_a.subscribe(pong_path_id).await;

        let ping = envelope(ping_path_id, b"ping");
        let action = postman_b.handle_message(&EchoPeeler, ping).await;
        assert_eq!(action, PostmanAction::Unsubscribed { path_id: ping_path_id });

        let pong = envelope(pong_path_id, b"pong");
        let action = postman_a.handle_message(&EchoPeeler, pong).await;
        assert_eq!(action, PostmanAction::Delivered);
        assert_eq!(pong_rx.await.expect("reply delivered"), b"pong".to_vec());
    }
}
