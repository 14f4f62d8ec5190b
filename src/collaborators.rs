// External collaborator interfaces (§1, §6).
//
// Everything in this module is a trait boundary only: the Bitcoin chain
// watcher, the key manager, the persistent payments database, the event
// sink, the Bolt-11 invoice encoder and the Sphinx onion-peeling engine are
// all external services per the non-goals in §1. This crate depends only on
// the operations it actually calls through these traits; it ships no
// default implementation beyond what unit tests need.

use async_trait::async_trait;
use bitcoin::{Transaction, Txid};

use crate::wallet::{Satoshi, WalletSnapshot};
use wire::ChannelId;

/// Fee targets the orchestrator refreshes on every reconnection (§4.2).
#[derive(Clone, Copy, Debug, Default)]
pub struct FeerateTargets {
    pub funding: u32,
    pub mutual_close: u32,
    pub claim_main: u32,
    pub fast: u32,
}

/// Chain-observation and broadcast interface. Reduced to the operations the
/// orchestrator and swap-in manager actually call; the real implementation
/// is an Electrum client.
#[async_trait]
pub trait ChainWatcher: Send + Sync {
    type Error: std::fmt::Display + Send + Sync + 'static;

    async fn current_tip(&self) -> Result<(u32, bitcoin::BlockHash), Self::Error>;

    async fn feerate_targets(&self) -> Result<FeerateTargets, Self::Error>;

    /// Feerate (sat/kw) to add to a package whose existing ancestors
    /// already pay `package_fee` on `package_weight`, such that the whole
    /// package reaches `target_feerate`.
    async fn cpfp_feerate(
        &self,
        package_weight: u64,
        package_fee: Satoshi,
        target_feerate: u32,
    ) -> Result<u32, Self::Error>;

    async fn publish(&self, tx: &Transaction) -> Result<Txid, Self::Error>;

    async fn wallet_snapshot(&self) -> Result<WalletSnapshot, Self::Error>;

    async fn watch_confirmed(&self, outpoint: bitcoin::OutPoint, min_depth: u32) -> Result<(), Self::Error>;

    async fn watch_spent(&self, outpoint: bitcoin::OutPoint) -> Result<(), Self::Error>;
}

/// Per-channel signing key derivation and signature production. The actual
/// secp256k1 signing and the node's static identity key live behind this
/// trait; this crate only calls through it.
#[async_trait]
pub trait KeyManager: Send + Sync {
    type Error: std::fmt::Display + Send + Sync + 'static;

    fn node_id(&self) -> secp256k1::PublicKey;

    async fn derive_channel_keyset(
        &self,
        channel_id: ChannelId,
    ) -> Result<crate::channel::LocalKeyset, Self::Error>;

    async fn sign_commitment(
        &self,
        channel_id: ChannelId,
        unsigned_tx: &Transaction,
    ) -> Result<secp256k1::ecdsa::Signature, Self::Error>;

    /// Encrypts the persisted channel backup included in `channel_reestablish`.
    async fn seal_backup(&self, plaintext: &[u8]) -> Result<Vec<u8>, Self::Error>;

    /// Decrypts a peer-supplied backup blob; `None` means it didn't
    /// authenticate (wrong key, or simply not ours).
    async fn open_backup(&self, ciphertext: &[u8]) -> Result<Option<Vec<u8>>, Self::Error>;
}

/// Persistent payments/channel-state store (§6's database contract).
#[async_trait]
pub trait PaymentsDb: Send + Sync {
    type Error: std::fmt::Display + Send + Sync + 'static;

    async fn add_incoming_payment(
        &self,
        payment: crate::payments::IncomingPayment,
    ) -> Result<(), Self::Error>;

    async fn get_incoming_payment(
        &self,
        payment_hash: [u8; 32],
    ) -> Result<Option<crate::payments::IncomingPayment>, Self::Error>;

    async fn receive_payment(
        &self,
        payment_hash: [u8; 32],
        parts: Vec<crate::payments::ReceivedWith>,
        received_at: chrono::DateTime<chrono::Utc>,
    ) -> Result<(), Self::Error>;

    async fn add_outgoing_payment(
        &self,
        payment: crate::payments::OutgoingLightningPayment,
    ) -> Result<(), Self::Error>;

    async fn add_outgoing_parts(
        &self,
        parent_id: uuid::Uuid,
        parts: Vec<crate::payments::OutgoingPart>,
    ) -> Result<(), Self::Error>;

    async fn complete_outgoing_part(
        &self,
        part_id: uuid::Uuid,
        status: crate::payments::PartStatus,
    ) -> Result<(), Self::Error>;

    async fn complete_outgoing_payment(
        &self,
        parent_id: uuid::Uuid,
        status: crate::payments::PaymentStatus,
    ) -> Result<(), Self::Error>;

    async fn get_outgoing_payment(
        &self,
        parent_id: uuid::Uuid,
    ) -> Result<Option<crate::payments::OutgoingLightningPayment>, Self::Error>;

    async fn get_outgoing_payment_by_part(
        &self,
        part_id: uuid::Uuid,
    ) -> Result<Option<crate::payments::OutgoingLightningPayment>, Self::Error>;

    async fn set_locked(&self, txid: Txid) -> Result<(), Self::Error>;

    async fn add_or_update_channel(
        &self,
        state: crate::channel::PersistedChannel,
    ) -> Result<(), Self::Error>;

    async fn remove_channel(&self, channel_id: ChannelId) -> Result<(), Self::Error>;

    async fn list_local_channels(
        &self,
    ) -> Result<Vec<crate::channel::PersistedChannel>, Self::Error>;

    /// Historical HTLC set for a revoked commitment, needed to build a
    /// penalty transaction that sweeps every HTLC output (§4.1).
    async fn get_htlc_infos(
        &self,
        channel_id: ChannelId,
        revoked_commitment_txid: Txid,
    ) -> Result<Vec<crate::channel::HtlcInfo>, Self::Error>;
}

/// Fan-out sink for [`crate::events::DomainEvent`]s, independent of the
/// in-process broadcast channel (e.g. a push-notification bridge).
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, event: crate::events::DomainEvent);
}

/// Bolt-11 invoice encode/decode, explicitly external per §1.
pub trait Bolt11Invoicer: Send + Sync {
    fn encode_invoice(&self, draft: crate::payments::InvoiceDraft) -> String;
    fn decode_invoice(&self, invoice: &str) -> Option<crate::payments::DecodedInvoice>;
}

/// Sphinx onion construction/peeling, explicitly external per §1.
pub trait SphinxPeeler: Send + Sync {
    fn peel_onion_message(
        &self,
        packet: &wire::bolt2::OnionPacket,
        blinding_point: secp256k1::PublicKey,
    ) -> Option<crate::postman::PeeledOnionMessage>;

    fn build_onion_message(
        &self,
        path: &wire::onion_message::BlindedPath,
        payload: &[u8],
    ) -> wire::onion_message::OnionMessage;
}
