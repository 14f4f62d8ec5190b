// Channel identity: stable final id, and the temporary id used before the
// funding outpoint is known. See BOLT-2.

use std::fmt::{self, Display, Formatter};

use amplify::{Slice32, Wrapper};
use bitcoin::hashes::Hash;
use bitcoin::OutPoint;

/// Final channel id: the funding outpoint's txid XOR'ed with its output
/// index, per the Lightning convention (BOLT-2).
#[derive(
    Wrapper, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Display, Default, From,
)]
#[derive(LightningEncode, LightningDecode)]
#[cfg_attr(feature = "strict_encoding", derive(StrictEncode, StrictDecode))]
#[display(LowerHex)]
#[wrapper(FromStr, LowerHex, UpperHex)]
pub struct ChannelId(Slice32);

impl ChannelId {
    /// Derives the final channel id from the funding outpoint, per BOLT-2:
    /// `txid XOR be16(vout)` applied to the last two bytes of the txid.
    pub fn with(funding_outpoint: OutPoint) -> Self {
        let mut slice = funding_outpoint.txid.into_inner();
        let vout = (funding_outpoint.vout as u16).to_be_bytes();
        slice[30] ^= vout[0];
        slice[31] ^= vout[1];
        ChannelId::from_inner(Slice32::from_inner(slice))
    }

    /// A channel id consisting of all zeros means "applicable to all opened
    /// channels" in messages like `error`.
    pub fn is_wildcard(&self) -> bool {
        self.to_inner().to_inner() == [0u8; 32]
    }
}

/// Temporary channel id: derived from a local nonce, used until the funding
/// contribution is agreed and the final [`ChannelId`] replaces it.
#[derive(
    Wrapper, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Display, From,
)]
#[derive(LightningEncode, LightningDecode)]
#[cfg_attr(feature = "strict_encoding", derive(StrictEncode, StrictDecode))]
#[display(LowerHex)]
#[wrapper(FromStr, LowerHex, UpperHex)]
pub struct TempChannelId(Slice32);

impl TempChannelId {
    pub fn random() -> Self {
        use amplify::RawArray;
        let mut bytes = [0u8; 32];
        rand_fill(&mut bytes);
        TempChannelId::from_inner(Slice32::from_raw_array(bytes))
    }
}

fn rand_fill(bytes: &mut [u8; 32]) {
    use rand::RngCore;
    rand::thread_rng().fill_bytes(bytes);
}

/// Both ids are honored for routing inbound messages until the temporary id
/// is replaced, atomically, by the final one.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum ActiveChannelId {
    Temporary(TempChannelId),
    Final(ChannelId),
    /// Final id is known, but the peer may still reference the channel by its
    /// now-retired temporary id.
    Both {
        temporary: TempChannelId,
        channel: ChannelId,
    },
}

impl Display for ActiveChannelId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ActiveChannelId::Temporary(id) => Display::fmt(id, f),
            ActiveChannelId::Final(id) => Display::fmt(id, f),
            ActiveChannelId::Both { channel, .. } => Display::fmt(channel, f),
        }
    }
}

impl ActiveChannelId {
    pub fn temporary(&self) -> Option<TempChannelId> {
        match self {
            ActiveChannelId::Temporary(id) => Some(*id),
            ActiveChannelId::Both { temporary, .. } => Some(*temporary),
            ActiveChannelId::Final(_) => None,
        }
    }

    pub fn channel_id(&self) -> Option<ChannelId> {
        match self {
            ActiveChannelId::Final(id) => Some(*id),
            ActiveChannelId::Both { channel, .. } => Some(*channel),
            ActiveChannelId::Temporary(_) => None,
        }
    }

    /// Atomically promotes a temporary id to the final one, keeping both
    /// honored for routing until the caller drops the temporary mapping.
    pub fn upgrade(&mut self, channel: ChannelId) {
        let temporary = self.temporary();
        *self = match temporary {
            Some(temporary) => ActiveChannelId::Both { temporary, channel },
            None => ActiveChannelId::Final(channel),
        };
    }

    pub fn is_final(&self) -> bool {
        matches!(self, ActiveChannelId::Final(_) | ActiveChannelId::Both { .. })
    }
}
