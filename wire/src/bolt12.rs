// BOLT-12 offers: offer / invoice_request / invoice encoding.
//
// §1 treats Bolt 11/12 invoice encoding *internals* as an external
// non-goal, so this module does not attempt the full BOLT-12 TLV
// namespace (recurrence, blinded-path crypto, onion-message transport of
// the request/invoice). It implements the reduced-schema mechanics the
// round-trip properties actually exercise: Bech32-without-checksum framing
// for the `lno`/`lnr`/`lni` human-readable prefixes, a TLV-merkle-root
// commitment that gets Schnorr-signed, and compact blinded-path encoding
// with a one-byte direction flag for `short_channel_id`-dir introduction
// points. The merkle tree here is a plain sorted-pair binary tree rather
// than BOLT-12's nonce-per-leaf construction; see DESIGN.md for why that
// simplification is in scope.

use std::fmt;

use bitcoin::hashes::{sha256, Hash, HashEngine};
use bitcoin::BlockHash;
use secp256k1::{schnorr, KeyPair, Message, PublicKey, Secp256k1, SecretKey, XOnlyPublicKey};

use lightning_encoding::{BigSize, LightningDecode, LightningEncode};

use crate::tlv::Stream as TlvStream;

/// Kept in the ecosystem's `amplify_derive`-based error style rather than
/// `thiserror`, matching the rest of this crate's BOLT-level errors
/// (e.g. `features::Error`).
#[derive(Clone, PartialEq, Eq, Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum Bolt12Error {
    /// missing mandatory TLV field: {0}
    MissingField(&'static str),

    /// bech32-without-checksum decode error: {0}
    Bech32(String),

    /// invalid human-readable prefix: expected {expected}, got {actual}
    WrongHrp { expected: &'static str, actual: String },

    /// signature verification failed
    BadSignature,

    #[from]
    /// lightning encoding error: {0}
    Encoding(lightning_encoding::Error),
}

/// Tagged hash per BIP-340: `SHA256(SHA256(tag) || SHA256(tag) || msg)`.
fn tagged_hash(tag: &[u8], msg: &[u8]) -> [u8; 32] {
    let tag_hash = sha256::Hash::hash(tag);
    let mut engine = sha256::Hash::engine();
    engine.input(&tag_hash[..]);
    engine.input(&tag_hash[..]);
    engine.input(msg);
    sha256::Hash::from_engine(engine).into_inner()
}

fn leaf_hash(record: &[u8]) -> [u8; 32] {
    tagged_hash(b"LnLeaf", record)
}

fn combine(a: [u8; 32], b: [u8; 32]) -> [u8; 32] {
    let mut buf = [0u8; 64];
    if a <= b {
        buf[..32].copy_from_slice(&a);
        buf[32..].copy_from_slice(&b);
    } else {
        buf[..32].copy_from_slice(&b);
        buf[32..].copy_from_slice(&a);
    }
    tagged_hash(b"LnBranch", &buf)
}

/// Computes the merkle root over a TLV stream's records, each leaf being
/// the tagged hash of that record's `type || length || value` bytes.
pub fn merkle_root(tlvs: &TlvStream) -> Result<[u8; 32], Bolt12Error> {
    let mut leaves = Vec::new();
    for (ty, value) in tlvs.iter() {
        let mut record = Vec::new();
        BigSize::from(*ty).lightning_encode(&mut record)?;
        BigSize::from(value.len()).lightning_encode(&mut record)?;
        record.extend_from_slice(value);
        leaves.push(leaf_hash(&record));
    }
    if leaves.is_empty() {
        return Err(Bolt12Error::MissingField("(empty TLV stream)"));
    }
    let mut level = leaves;
    while level.len() > 1 {
        let mut next = Vec::with_capacity((level.len() + 1) / 2);
        for pair in level.chunks(2) {
            next.push(if pair.len() == 2 { combine(pair[0], pair[1]) } else { pair[0] });
        }
        level = next;
    }
    Ok(level[0])
}

fn signing_message(root: &[u8; 32]) -> Message {
    Message::from_slice(&tagged_hash(b"LnAll", root)).expect("32 bytes")
}

pub fn sign_merkle_root(root: &[u8; 32], secret_key: &SecretKey) -> schnorr::Signature {
    let secp = Secp256k1::signing_only();
    let keypair = KeyPair::from_secret_key(&secp, secret_key);
    secp.sign_schnorr_no_aux_rand(&signing_message(root), &keypair)
}

pub fn verify_merkle_root(
    root: &[u8; 32],
    sig: &schnorr::Signature,
    node_id: &XOnlyPublicKey,
) -> Result<(), Bolt12Error> {
    let secp = Secp256k1::verification_only();
    secp.verify_schnorr(sig, &signing_message(root), node_id).map_err(|_| Bolt12Error::BadSignature)
}

/// Bech32 charset, shared with the checksummed encoder in the `bech32`
/// crate; reimplemented here because BOLT-12 strings carry no checksum.
const CHARSET: &[u8; 32] = b"qpzry9x8gf2tvdw0s3jn54khce6mua7l";

fn u8_to_bits5(data: &[u8]) -> Vec<u8> {
    let mut acc: u32 = 0;
    let mut bits: u32 = 0;
    let mut out = Vec::with_capacity(data.len() * 8 / 5 + 1);
    for &byte in data {
        acc = (acc << 8) | byte as u32;
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            out.push(((acc >> bits) & 0x1f) as u8);
        }
    }
    if bits > 0 {
        out.push(((acc << (5 - bits)) & 0x1f) as u8);
    }
    out
}

fn bits5_to_u8(data: &[u8]) -> Result<Vec<u8>, Bolt12Error> {
    let mut acc: u32 = 0;
    let mut bits: u32 = 0;
    let mut out = Vec::with_capacity(data.len() * 5 / 8);
    for &d in data {
        acc = (acc << 5) | d as u32;
        bits += 5;
        if bits >= 8 {
            bits -= 8;
            out.push(((acc >> bits) & 0xff) as u8);
        }
    }
    // Remaining bits must be padding zeroes, per BIP-173 base32 packing.
    if bits >= 5 || (acc & ((1 << bits) - 1)) != 0 {
        return Err(Bolt12Error::Bech32("non-zero padding bits".into()));
    }
    Ok(out)
}

/// Encodes `data` as Bech32-without-checksum: `hrp` + `"1"` + charset
/// letters, no trailing checksum characters.
pub fn encode_bech32_nochecksum(hrp: &str, data: &[u8]) -> String {
    let mut out = String::with_capacity(hrp.len() + 1 + data.len() * 8 / 5 + 1);
    out.push_str(hrp);
    out.push('1');
    for group in u8_to_bits5(data) {
        out.push(CHARSET[group as usize] as char);
    }
    out
}

/// Decodes a Bech32-without-checksum string, returning `(hrp, payload)`.
pub fn decode_bech32_nochecksum(s: &str) -> Result<(String, Vec<u8>), Bolt12Error> {
    let pos = s.rfind('1').ok_or_else(|| Bolt12Error::Bech32("missing separator".into()))?;
    let hrp = s[..pos].to_string();
    let data_part = &s[pos + 1..];
    let mut groups = Vec::with_capacity(data_part.len());
    for c in data_part.chars() {
        let lower = c.to_ascii_lowercase();
        let idx = CHARSET
            .iter()
            .position(|&x| x as char == lower)
            .ok_or_else(|| Bolt12Error::Bech32(format!("invalid character '{c}'")))?;
        groups.push(idx as u8);
    }
    let payload = bits5_to_u8(&groups)?;
    Ok((hrp, payload))
}

/// Compact introduction-point encoding for a blinded path used in offers:
/// either a full node id, or a `short_channel_id` plus a one-byte
/// direction flag (0 = node 1 is the introduction point, 1 = node 2).
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum CompactIntroNode {
    NodeId(PublicKey),
    ShortChannelId { scid: u64, direction: bool },
}

impl CompactIntroNode {
    pub fn encode(&self) -> Vec<u8> {
        match self {
            CompactIntroNode::NodeId(pk) => {
                let mut out = vec![0x00];
                out.extend_from_slice(&pk.serialize());
                out
            }
            CompactIntroNode::ShortChannelId { scid, direction } => {
                let mut out = vec![0x01];
                out.extend_from_slice(&scid.to_be_bytes());
                out.push(if *direction { 1 } else { 0 });
                out
            }
        }
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, Bolt12Error> {
        match bytes.first() {
            Some(0x00) if bytes.len() == 34 => {
                let pk = PublicKey::from_slice(&bytes[1..34])
                    .map_err(|_| Bolt12Error::Bech32("bad node id".into()))?;
                Ok(CompactIntroNode::NodeId(pk))
            }
            Some(0x01) if bytes.len() == 10 => {
                let scid = u64::from_be_bytes(bytes[1..9].try_into().unwrap());
                let direction = bytes[9] != 0;
                Ok(CompactIntroNode::ShortChannelId { scid, direction })
            }
            _ => Err(Bolt12Error::Bech32("malformed compact introduction point".into())),
        }
    }
}

/// TLV type numbers used by the reduced schema this crate implements.
mod tlv_types {
    pub const CHAINS: u64 = 2;
    pub const METADATA: u64 = 4;
    pub const AMOUNT: u64 = 8;
    pub const DESCRIPTION: u64 = 10;
    pub const ISSUER: u64 = 20;
    pub const NODE_ID: u64 = 22;
    pub const PAYER_ID: u64 = 38;
    pub const PAYMENT_HASH: u64 = 168;
    pub const CREATED_AT: u64 = 164;
    pub const SIGNATURE: u64 = 240;
}

fn put_bytes(stream: &mut TlvStream, ty: u64, value: Vec<u8>) {
    stream.insert(ty, value);
}

fn require(stream: &TlvStream, ty: u64, name: &'static str) -> Result<Vec<u8>, Bolt12Error> {
    stream
        .iter()
        .find(|(t, _)| **t == ty)
        .map(|(_, v)| v.clone())
        .ok_or(Bolt12Error::MissingField(name))
}

/// An offer: what a merchant publishes out of band (QR code, link) so a
/// payer can derive an `invoice_request` from it.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Offer {
    pub chains: Vec<BlockHash>,
    pub amount_msat: Option<u64>,
    pub description: String,
    pub issuer: Option<String>,
    pub node_id: PublicKey,
    pub metadata: Vec<u8>,
}

impl Offer {
    fn to_tlv_stream(&self) -> TlvStream {
        let mut s = TlvStream::default();
        if !self.chains.is_empty() {
            let mut buf = Vec::new();
            for c in &self.chains {
                buf.extend_from_slice(&c[..]);
            }
            put_bytes(&mut s, tlv_types::CHAINS, buf);
        }
        if !self.metadata.is_empty() {
            put_bytes(&mut s, tlv_types::METADATA, self.metadata.clone());
        }
        if let Some(amt) = self.amount_msat {
            let mut buf = Vec::new();
            BigSize::from(amt).lightning_encode(&mut buf).expect("vec write");
            put_bytes(&mut s, tlv_types::AMOUNT, buf);
        }
        put_bytes(&mut s, tlv_types::DESCRIPTION, self.description.clone().into_bytes());
        if let Some(issuer) = &self.issuer {
            put_bytes(&mut s, tlv_types::ISSUER, issuer.clone().into_bytes());
        }
        put_bytes(&mut s, tlv_types::NODE_ID, self.node_id.serialize().to_vec());
        s
    }

    fn from_tlv_stream(s: &TlvStream) -> Result<Self, Bolt12Error> {
        let description = require(s, tlv_types::DESCRIPTION, "offer_description")?;
        let node_id_bytes = require(s, tlv_types::NODE_ID, "offer_node_id")?;
        let node_id = PublicKey::from_slice(&node_id_bytes)
            .map_err(|_| Bolt12Error::Bech32("bad offer_node_id".into()))?;
        let chains = s
            .iter()
            .find(|(t, _)| **t == tlv_types::CHAINS)
            .map(|(_, v)| {
                v.chunks_exact(32).map(|c| BlockHash::from_slice(c).expect("32 bytes")).collect()
            })
            .unwrap_or_default();
        let amount_msat = s
            .iter()
            .find(|(t, _)| **t == tlv_types::AMOUNT)
            .map(|(_, v)| BigSize::lightning_decode(&mut &v[..]).map(|b| b.value()))
            .transpose()?;
        let metadata =
            s.iter().find(|(t, _)| **t == tlv_types::METADATA).map(|(_, v)| v.clone()).unwrap_or_default();
        let issuer = s
            .iter()
            .find(|(t, _)| **t == tlv_types::ISSUER)
            .map(|(_, v)| String::from_utf8_lossy(v).into_owned());
        Ok(Offer {
            chains,
            amount_msat,
            description: String::from_utf8_lossy(&description).into_owned(),
            issuer,
            node_id,
            metadata,
        })
    }

    pub fn merkle_root(&self) -> Result<[u8; 32], Bolt12Error> {
        merkle_root(&self.to_tlv_stream())
    }

    pub fn encode(&self) -> String {
        let mut buf = Vec::new();
        self.to_tlv_stream().lightning_encode(&mut buf).expect("vec write");
        encode_bech32_nochecksum("lno", &buf)
    }

    pub fn decode(s: &str) -> Result<Self, Bolt12Error> {
        let (hrp, payload) = decode_bech32_nochecksum(s)?;
        if hrp != "lno" {
            return Err(Bolt12Error::WrongHrp { expected: "lno", actual: hrp });
        }
        let stream = TlvStream::lightning_decode(&mut &payload[..])?;
        Self::from_tlv_stream(&stream)
    }
}

/// A payer's signed request against an [`Offer`], sent back over an onion
/// message and answered with an [`Invoice`].
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct InvoiceRequest {
    pub offer_root: [u8; 32],
    pub metadata: Vec<u8>,
    pub amount_msat: Option<u64>,
    pub payer_id: PublicKey,
    pub signature: schnorr::Signature,
}

impl InvoiceRequest {
    fn to_tlv_stream_unsigned(
        offer_root: &[u8; 32],
        metadata: &[u8],
        amount_msat: Option<u64>,
        payer_id: &PublicKey,
    ) -> TlvStream {
        let mut s = TlvStream::default();
        put_bytes(&mut s, tlv_types::METADATA, offer_root.to_vec());
        if !metadata.is_empty() {
            put_bytes(&mut s, tlv_types::METADATA + 1, metadata.to_vec());
        }
        if let Some(amt) = amount_msat {
            let mut buf = Vec::new();
            BigSize::from(amt).lightning_encode(&mut buf).expect("vec write");
            put_bytes(&mut s, tlv_types::AMOUNT, buf);
        }
        put_bytes(&mut s, tlv_types::PAYER_ID, payer_id.serialize().to_vec());
        s
    }

    /// Builds and signs a request against `offer` using the payer's key.
    pub fn build(
        offer: &Offer,
        amount_msat: Option<u64>,
        payer_secret: &SecretKey,
    ) -> Result<Self, Bolt12Error> {
        let secp = Secp256k1::signing_only();
        let payer_id = PublicKey::from_secret_key(&secp, payer_secret);
        let offer_root = offer.merkle_root()?;
        let unsigned =
            Self::to_tlv_stream_unsigned(&offer_root, &offer.metadata, amount_msat, &payer_id);
        let root = merkle_root(&unsigned)?;
        let signature = sign_merkle_root(&root, payer_secret);
        Ok(InvoiceRequest { offer_root, metadata: offer.metadata.clone(), amount_msat, payer_id, signature })
    }

    pub fn verify(&self) -> Result<(), Bolt12Error> {
        let unsigned = Self::to_tlv_stream_unsigned(
            &self.offer_root,
            &self.metadata,
            self.amount_msat,
            &self.payer_id,
        );
        let root = merkle_root(&unsigned)?;
        let (xonly, _parity) = self.payer_id.x_only_public_key();
        verify_merkle_root(&root, &self.signature, &xonly)
    }

    fn to_tlv_stream(&self) -> TlvStream {
        let mut s = Self::to_tlv_stream_unsigned(
            &self.offer_root,
            &self.metadata,
            self.amount_msat,
            &self.payer_id,
        );
        put_bytes(&mut s, tlv_types::SIGNATURE, self.signature.serialize().to_vec());
        s
    }

    fn from_tlv_stream(s: &TlvStream) -> Result<Self, Bolt12Error> {
        let offer_root_bytes = require(s, tlv_types::METADATA, "invreq_metadata")?;
        let offer_root: [u8; 32] = offer_root_bytes
            .try_into()
            .map_err(|_| Bolt12Error::Bech32("bad offer root length".into()))?;
        let metadata = s
            .iter()
            .find(|(t, _)| **t == tlv_types::METADATA + 1)
            .map(|(_, v)| v.clone())
            .unwrap_or_default();
        let amount_msat = s
            .iter()
            .find(|(t, _)| **t == tlv_types::AMOUNT)
            .map(|(_, v)| BigSize::lightning_decode(&mut &v[..]).map(|b| b.value()))
            .transpose()?;
        let payer_id_bytes = require(s, tlv_types::PAYER_ID, "invreq_payer_id")?;
        let payer_id = PublicKey::from_slice(&payer_id_bytes)
            .map_err(|_| Bolt12Error::Bech32("bad payer id".into()))?;
        let sig_bytes = require(s, tlv_types::SIGNATURE, "signature")?;
        let signature = schnorr::Signature::from_slice(&sig_bytes)
            .map_err(|_| Bolt12Error::Bech32("bad signature".into()))?;
        Ok(InvoiceRequest { offer_root, metadata, amount_msat, payer_id, signature })
    }

    pub fn encode(&self) -> String {
        let mut buf = Vec::new();
        self.to_tlv_stream().lightning_encode(&mut buf).expect("vec write");
        encode_bech32_nochecksum("lnr", &buf)
    }

    pub fn decode(s: &str) -> Result<Self, Bolt12Error> {
        let (hrp, payload) = decode_bech32_nochecksum(s)?;
        if hrp != "lnr" {
            return Err(Bolt12Error::WrongHrp { expected: "lnr", actual: hrp });
        }
        let stream = TlvStream::lightning_decode(&mut &payload[..])?;
        Self::from_tlv_stream(&stream)
    }
}

/// The merchant's signed response, redeemable for the HTLC that settles
/// `payment_hash`.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Invoice {
    pub request_root: [u8; 32],
    pub payment_hash: sha256::Hash,
    pub amount_msat: u64,
    pub created_at: u64,
    pub node_id: PublicKey,
    pub signature: schnorr::Signature,
}

impl Invoice {
    fn to_tlv_stream_unsigned(
        request_root: &[u8; 32],
        payment_hash: &sha256::Hash,
        amount_msat: u64,
        created_at: u64,
        node_id: &PublicKey,
    ) -> TlvStream {
        let mut s = TlvStream::default();
        put_bytes(&mut s, tlv_types::METADATA, request_root.to_vec());
        put_bytes(&mut s, tlv_types::PAYMENT_HASH, payment_hash[..].to_vec());
        let mut buf = Vec::new();
        BigSize::from(amount_msat).lightning_encode(&mut buf).expect("vec write");
        put_bytes(&mut s, tlv_types::AMOUNT, buf);
        let mut buf = Vec::new();
        BigSize::from(created_at).lightning_encode(&mut buf).expect("vec write");
        put_bytes(&mut s, tlv_types::CREATED_AT, buf);
        put_bytes(&mut s, tlv_types::NODE_ID, node_id.serialize().to_vec());
        s
    }

    pub fn build(
        request: &InvoiceRequest,
        payment_hash: sha256::Hash,
        created_at: u64,
        node_secret: &SecretKey,
    ) -> Result<Self, Bolt12Error> {
        let secp = Secp256k1::signing_only();
        let node_id = PublicKey::from_secret_key(&secp, node_secret);
        let request_root = merkle_root(&request.to_tlv_stream())?;
        let amount_msat = request.amount_msat.ok_or(Bolt12Error::MissingField("invreq_amount"))?;
        let unsigned = Self::to_tlv_stream_unsigned(
            &request_root,
            &payment_hash,
            amount_msat,
            created_at,
            &node_id,
        );
        let root = merkle_root(&unsigned)?;
        let signature = sign_merkle_root(&root, node_secret);
        Ok(Invoice { request_root, payment_hash, amount_msat, created_at, node_id, signature })
    }

    pub fn verify(&self) -> Result<(), Bolt12Error> {
        let unsigned = Self::to_tlv_stream_unsigned(
            &self.request_root,
            &self.payment_hash,
            self.amount_msat,
            self.created_at,
            &self.node_id,
        );
        let root = merkle_root(&unsigned)?;
        let (xonly, _parity) = self.node_id.x_only_public_key();
        verify_merkle_root(&root, &self.signature, &xonly)
    }

    fn to_tlv_stream(&self) -> TlvStream {
        let mut s = Self::to_tlv_stream_unsigned(
            &self.request_root,
            &self.payment_hash,
            self.amount_msat,
            self.created_at,
            &self.node_id,
        );
        put_bytes(&mut s, tlv_types::SIGNATURE, self.signature.serialize().to_vec());
        s
    }

    fn from_tlv_stream(s: &TlvStream) -> Result<Self, Bolt12Error> {
        let request_root_bytes = require(s, tlv_types::METADATA, "invoice_request_metadata")?;
        let request_root: [u8; 32] = request_root_bytes
            .try_into()
            .map_err(|_| Bolt12Error::Bech32("bad request root length".into()))?;
        let payment_hash_bytes = require(s, tlv_types::PAYMENT_HASH, "invoice_payment_hash")?;
        let payment_hash = sha256::Hash::from_slice(&payment_hash_bytes)
            .map_err(|_| Bolt12Error::Bech32("bad payment hash".into()))?;
        let amount_bytes = require(s, tlv_types::AMOUNT, "invoice_amount")?;
        let amount_msat = BigSize::lightning_decode(&mut &amount_bytes[..])?.value();
        let created_at_bytes = require(s, tlv_types::CREATED_AT, "invoice_created_at")?;
        let created_at = BigSize::lightning_decode(&mut &created_at_bytes[..])?.value();
        let node_id_bytes = require(s, tlv_types::NODE_ID, "invoice_node_id")?;
        let node_id = PublicKey::from_slice(&node_id_bytes)
            .map_err(|_| Bolt12Error::Bech32("bad invoice node id".into()))?;
        let sig_bytes = require(s, tlv_types::SIGNATURE, "signature")?;
        let signature = schnorr::Signature::from_slice(&sig_bytes)
            .map_err(|_| Bolt12Error::Bech32("bad signature".into()))?;
        Ok(Invoice { request_root, payment_hash, amount_msat, created_at, node_id, signature })
    }

    pub fn encode(&self) -> String {
        let mut buf = Vec::new();
        self.to_tlv_stream().lightning_encode(&mut buf).expect("vec write");
        encode_bech32_nochecksum("lni", &buf)
    }

    pub fn decode(s: &str) -> Result<Self, Bolt12Error> {
        let (hrp, payload) = decode_bech32_nochecksum(s)?;
        if hrp != "lni" {
            return Err(Bolt12Error::WrongHrp { expected: "lni", actual: hrp });
        }
        let stream = TlvStream::lightning_decode(&mut &payload[..])?;
        Self::from_tlv_stream(&stream)
    }
}

impl fmt::Display for Offer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "offer({})", self.encode())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node_secret() -> SecretKey {
        SecretKey::from_slice(&[0x11; 32]).unwrap()
    }

    fn payer_secret() -> SecretKey {
        SecretKey::from_slice(&[0x22; 32]).unwrap()
    }

    fn sample_offer() -> Offer {
        let secp = Secp256k1::signing_only();
        Offer {
            chains: vec![],
            amount_msat: Some(150_000),
            description: "coffee".into(),
            issuer: Some("bakery".into()),
            node_id: PublicKey::from_secret_key(&secp, &node_secret()),
            metadata: vec![1, 2, 3, 4],
        }
    }

    #[test]
    fn offer_round_trips_through_bech32() {
        let offer = sample_offer();
        let encoded = offer.encode();
        assert!(encoded.starts_with("lno1"));
        let decoded = Offer::decode(&encoded).unwrap();
        assert_eq!(decoded, offer);
    }

    #[test]
    fn offer_missing_description_fails_decode() {
        let offer = sample_offer();
        let mut stream = offer.to_tlv_stream();
        // Reconstruct the stream without the mandatory description field.
        let mut rebuilt = TlvStream::default();
        for (ty, v) in stream.iter() {
            if *ty != tlv_types::DESCRIPTION {
                rebuilt.insert(*ty, v.clone());
            }
        }
        stream = rebuilt;
        let mut buf = Vec::new();
        stream.lightning_encode(&mut buf).unwrap();
        let encoded = encode_bech32_nochecksum("lno", &buf);
        assert!(Offer::decode(&encoded).is_err());
    }

    #[test]
    fn invoice_request_signature_verifies() {
        let offer = sample_offer();
        let request = InvoiceRequest::build(&offer, Some(150_000), &payer_secret()).unwrap();
        request.verify().expect("valid signature must verify");

        let encoded = request.encode();
        assert!(encoded.starts_with("lnr1"));
        let decoded = InvoiceRequest::decode(&encoded).unwrap();
        assert_eq!(decoded, request);
        decoded.verify().expect("decoded signature must still verify");
    }

    #[test]
    fn tampered_invoice_request_fails_verification() {
        let offer = sample_offer();
        let mut request = InvoiceRequest::build(&offer, Some(150_000), &payer_secret()).unwrap();
        request.amount_msat = Some(999_000);
        assert!(request.verify().is_err());
    }

    #[test]
    fn invoice_round_trips_and_verifies() {
        let offer = sample_offer();
        let request = InvoiceRequest::build(&offer, Some(150_000), &payer_secret()).unwrap();
        let payment_hash = sha256::Hash::hash(b"preimage");
        let invoice = Invoice::build(&request, payment_hash, 1_700_000_000, &node_secret()).unwrap();
        invoice.verify().expect("valid invoice signature must verify");

        let encoded = invoice.encode();
        assert!(encoded.starts_with("lni1"));
        let decoded = Invoice::decode(&encoded).unwrap();
        assert_eq!(decoded, invoice);
    }

    #[test]
    fn merkle_root_is_order_independent_and_tamper_sensitive() {
        let offer = sample_offer();
        let root_a = offer.merkle_root().unwrap();
        let root_b = offer.merkle_root().unwrap();
        assert_eq!(root_a, root_b);

        let mut tampered = offer.clone();
        tampered.description = "tea".into();
        assert_ne!(tampered.merkle_root().unwrap(), root_a);
    }

    #[test]
    fn bech32_nochecksum_round_trips_arbitrary_bytes() {
        let payload = vec![0u8, 1, 2, 250, 251, 255, 128, 64, 7];
        let encoded = encode_bech32_nochecksum("lno", &payload);
        let (hrp, decoded) = decode_bech32_nochecksum(&encoded).unwrap();
        assert_eq!(hrp, "lno");
        assert_eq!(decoded, payload);
    }

    #[test]
    fn compact_scid_intro_node_round_trips_with_direction_flag() {
        let node = CompactIntroNode::ShortChannelId { scid: 0x0102030405, direction: true };
        let encoded = node.encode();
        assert_eq!(encoded[0], 0x01);
        assert_eq!(*encoded.last().unwrap(), 1);
        let decoded = CompactIntroNode::decode(&encoded).unwrap();
        assert_eq!(decoded, node);
    }
}
