// Noise_XK_secp256k1_ChaChaPoly_SHA256 transport framing contract (BOLT-8).
//
// The handshake and cipher state machine are an external collaborator: this
// module only fixes the frame sizes and the trait boundary a transport
// implementation must satisfy to carry [`crate::Messages`] between peers.

use async_trait::async_trait;
use secp256k1::PublicKey;

/// Maximum plaintext Lightning message length (BOLT-8): the length prefix
/// is itself Noise-encrypted in a fixed-size 2-byte-plaintext frame, and the
/// wire body that follows is limited to this size.
pub const MAX_MESSAGE_LEN: usize = 65535;

/// Authentication tag length added by `ChaChaPoly` to each Noise frame.
pub const MAC_LEN: usize = 16;

/// A single Noise-encrypted frame on the wire: a 2-byte encrypted length
/// field (`MAC_LEN` bytes of tag appended) followed by the encrypted body
/// (again with its own trailing tag).
pub const LEN_FIELD_TOTAL_LEN: usize = 2 + MAC_LEN;

/// Completed handshake state: the static keys learned from the Noise_XK
/// handshake, handed to the transport so it can tag inbound frames with the
/// sender's identity.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct HandshakeOutcome {
    pub local_pubkey: PublicKey,
    pub remote_pubkey: PublicKey,
}

/// The minimal surface the peer orchestrator needs from a transport: encrypt
/// and frame a plaintext Lightning message for sending, and decrypt and
/// deframe a received one. A concrete implementation owns the Noise_XK
/// handshake and the rolling chaining keys; this crate only encodes and
/// decodes the messages carried once a session is established.
#[async_trait]
pub trait NoiseTransport: Send {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Encrypts and sends one already-serialized Lightning message.
    async fn send(&mut self, plaintext: &[u8]) -> Result<(), Self::Error>;

    /// Blocks until the next full message is received, decrypted and
    /// deframed.
    async fn recv(&mut self) -> Result<Vec<u8>, Self::Error>;

    fn handshake_outcome(&self) -> HandshakeOutcome;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_overhead_matches_bolt8() {
        assert_eq!(LEN_FIELD_TOTAL_LEN, 18);
    }
}
