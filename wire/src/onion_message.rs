// BOLT-7/BOLT-12 `onion_message`: a store-and-forward envelope routed over
// blinded paths, independent of any channel or payment.

use secp256k1::PublicKey;

use crate::tlv::Stream as TlvStream;

/// A single layer of a blinded route (BOLT-4 route blinding, reused for
/// onion messages): the relay's encrypted instructions for where to forward
/// next.
#[derive(Clone, PartialEq, Eq, Debug)]
#[derive(LightningEncode, LightningDecode)]
#[cfg_attr(feature = "strict_encoding", derive(StrictEncode, StrictDecode))]
pub struct BlindedHop {
    pub blinded_node_id: PublicKey,
    pub encrypted_data: Vec<u8>,
}

/// A blinded path: an introduction point plus a chain of blinded hops,
/// hiding the identity of every hop except the first from anyone but the
/// path's constructor.
#[derive(Clone, PartialEq, Eq, Debug)]
#[derive(LightningEncode, LightningDecode)]
#[cfg_attr(feature = "strict_encoding", derive(StrictEncode, StrictDecode))]
pub struct BlindedPath {
    pub introduction_node: PublicKey,
    pub blinding: PublicKey,
    pub hops: Vec<BlindedHop>,
}

impl BlindedPath {
    pub fn hop_count(&self) -> usize {
        self.hops.len()
    }
}

#[derive(Clone, PartialEq, Eq, Debug, Display)]
#[derive(LightningEncode, LightningDecode)]
#[cfg_attr(feature = "strict_encoding", derive(StrictEncode, StrictDecode))]
#[lightning_encoding(use_tlv)]
#[display("onion_message({blinding_point}, ...)")]
pub struct OnionMessage {
    /// The current hop's per-hop blinding point, used to derive the shared
    /// secret that decrypts this hop's `encrypted_data` and peels the next
    /// onion layer.
    pub blinding_point: PublicKey,

    pub onion_routing_packet: crate::bolt2::OnionPacket,

    #[lightning_encoding(unknown_tlvs)]
    pub unknown_tlvs: TlvStream,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hop_count_matches_blinded_hops() {
        let path = BlindedPath {
            introduction_node: dumb_pubkey!(),
            blinding: dumb_pubkey!(),
            hops: vec![
                BlindedHop { blinded_node_id: dumb_pubkey!(), encrypted_data: vec![1] },
                BlindedHop { blinded_node_id: dumb_pubkey!(), encrypted_data: vec![2] },
            ],
        };
        assert_eq!(path.hop_count(), 2);
    }
}
