// The channel state tag (§3). Implemented as a flat sum type matched on
// directly by [`super::process::process`] rather than as dynamic dispatch
// over per-state objects (§9 "Dynamic dispatch over channel state").

use wire::{ActiveChannelId, ChannelId, TempChannelId};

use crate::channel::commitments::{Commitments, PersistedChannel, PersistedStateTag};

/// A channel's current state. Only variants from `WaitForFundingSigned`
/// onward carry a [`Commitments`] record (§3); everything before that is
/// negotiation-only and reconstructed fresh on every restart from the
/// temporary id and the in-flight `MessageReceived` stream, never persisted.
#[derive(Clone, Debug)]
pub enum ChannelState {
    WaitForInit,
    WaitForOpenChannel { temporary_channel_id: TempChannelId },
    WaitForAcceptChannel { temporary_channel_id: TempChannelId },
    WaitForFundingCreated { temporary_channel_id: TempChannelId },
    WaitForFundingSigned { commitments: Commitments },
    WaitForFundingConfirmed { commitments: Commitments },
    WaitForChannelReady { commitments: Commitments },
    Normal { commitments: Commitments },
    ShuttingDown { commitments: Commitments },
    Negotiating { commitments: Commitments },
    Closing { commitments: Commitments },
    Closed { commitments: Commitments },
    Aborted,
    /// A pre-dual-funding channel still waiting on its single-funder
    /// `funding_created`/`funding_signed` confirmation (migrated nodes only,
    /// §4.1).
    LegacyWaitForFundingConfirmed { commitments: Commitments },

    /// Wraps any state while the transport connection is down. Only
    /// `Connected`, `WatchReceived` and `CheckHtlcTimeout` are honored
    /// (§4.1); HTLC adds are rejected.
    Offline(Box<ChannelState>),
    /// Wraps any state between `Connected` and a completed
    /// `channel_reestablish` round trip.
    Syncing(Box<ChannelState>),
}

impl ChannelState {
    pub fn commitments(&self) -> Option<&Commitments> {
        use ChannelState::*;
        match self {
            WaitForFundingSigned { commitments }
            | WaitForFundingConfirmed { commitments }
            | WaitForChannelReady { commitments }
            | Normal { commitments }
            | ShuttingDown { commitments }
            | Negotiating { commitments }
            | Closing { commitments }
            | Closed { commitments }
            | LegacyWaitForFundingConfirmed { commitments } => Some(commitments),
            Offline(inner) | Syncing(inner) => inner.commitments(),
            WaitForInit
            | WaitForOpenChannel { .. }
            | WaitForAcceptChannel { .. }
            | WaitForFundingCreated { .. }
            | Aborted => None,
        }
    }

    pub fn commitments_mut(&mut self) -> Option<&mut Commitments> {
        use ChannelState::*;
        match self {
            WaitForFundingSigned { commitments }
            | WaitForFundingConfirmed { commitments }
            | WaitForChannelReady { commitments }
            | Normal { commitments }
            | ShuttingDown { commitments }
            | Negotiating { commitments }
            | Closing { commitments }
            | Closed { commitments }
            | LegacyWaitForFundingConfirmed { commitments } => Some(commitments),
            Offline(inner) | Syncing(inner) => inner.commitments_mut(),
            WaitForInit
            | WaitForOpenChannel { .. }
            | WaitForAcceptChannel { .. }
            | WaitForFundingCreated { .. }
            | Aborted => None,
        }
    }

    pub fn channel_id(&self) -> Option<ActiveChannelId> {
        use ChannelState::*;
        match self {
            WaitForOpenChannel { temporary_channel_id }
            | WaitForAcceptChannel { temporary_channel_id }
            | WaitForFundingCreated { temporary_channel_id } => {
                Some(ActiveChannelId::Temporary(*temporary_channel_id))
            }
            Offline(inner) | Syncing(inner) => inner.channel_id(),
            WaitForInit | Aborted => None,
            other => other.commitments().map(Commitments::active_channel_id),
        }
    }

    /// §3: the persistence boundary. States before `WaitForFundingSigned`
    /// hold no durable data.
    pub fn persisted_tag(&self) -> Option<PersistedStateTag> {
        use ChannelState::*;
        match self {
            WaitForFundingSigned { .. } => Some(PersistedStateTag::WaitForFundingSigned),
            WaitForFundingConfirmed { .. } => Some(PersistedStateTag::WaitForFundingConfirmed),
            WaitForChannelReady { .. } => Some(PersistedStateTag::WaitForChannelReady),
            Normal { .. } => Some(PersistedStateTag::Normal),
            ShuttingDown { .. } => Some(PersistedStateTag::ShuttingDown),
            Negotiating { .. } => Some(PersistedStateTag::Negotiating),
            Closing { .. } => Some(PersistedStateTag::Closing),
            Closed { .. } => Some(PersistedStateTag::Closed),
            LegacyWaitForFundingConfirmed { .. } => {
                Some(PersistedStateTag::LegacyWaitForFundingConfirmed)
            }
            Offline(inner) | Syncing(inner) => inner.persisted_tag(),
            WaitForInit
            | WaitForOpenChannel { .. }
            | WaitForAcceptChannel { .. }
            | WaitForFundingCreated { .. }
            | Aborted => None,
        }
    }

    pub fn to_persisted(&self) -> Option<PersistedChannel> {
        Some(PersistedChannel {
            state_tag: self.persisted_tag()?,
            commitments: self.commitments()?.clone(),
        })
    }

    pub fn from_persisted(persisted: PersistedChannel) -> ChannelState {
        let PersistedChannel { state_tag, commitments } = persisted;
        match state_tag {
            PersistedStateTag::WaitForFundingSigned => {
                ChannelState::WaitForFundingSigned { commitments }
            }
            PersistedStateTag::WaitForFundingConfirmed => {
                ChannelState::WaitForFundingConfirmed { commitments }
            }
            PersistedStateTag::WaitForChannelReady => {
                ChannelState::WaitForChannelReady { commitments }
            }
            PersistedStateTag::Normal => ChannelState::Normal { commitments },
            PersistedStateTag::ShuttingDown => ChannelState::ShuttingDown { commitments },
            PersistedStateTag::Negotiating => ChannelState::Negotiating { commitments },
            PersistedStateTag::Closing => ChannelState::Closing { commitments },
            PersistedStateTag::Closed => ChannelState::Closed { commitments },
            PersistedStateTag::LegacyWaitForFundingConfirmed => {
                ChannelState::LegacyWaitForFundingConfirmed { commitments }
            }
        }
    }

    pub fn is_offline(&self) -> bool {
        matches!(self, ChannelState::Offline(_))
    }

    pub fn is_normal(&self) -> bool {
        matches!(self, ChannelState::Normal { .. })
    }

    /// `true` for the window §4.4 calls "currently initializing": a funding
    /// exists but is not yet usable, and there is no `Normal` fallback.
    /// Recurses through `Offline`/`Syncing` — a mid-open channel that drops
    /// its connection is still mid-open, and §4.4's pay-to-open race guard
    /// must keep seeing it as such until it either reaches `Normal` or is
    /// abandoned.
    pub fn is_initializing(&self) -> bool {
        match self {
            ChannelState::WaitForFundingSigned { .. }
            | ChannelState::WaitForFundingConfirmed { .. }
            | ChannelState::WaitForChannelReady { .. }
            | ChannelState::LegacyWaitForFundingConfirmed { .. } => true,
            ChannelState::Offline(inner) | ChannelState::Syncing(inner) => inner.is_initializing(),
            _ => false,
        }
    }

    pub fn final_channel_id(&self) -> Option<ChannelId> {
        self.commitments().map(|c| c.channel_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn states_before_funding_signed_have_no_commitments() {
        let s = ChannelState::WaitForOpenChannel { temporary_channel_id: TempChannelId::random() };
        assert!(s.commitments().is_none());
        assert!(s.persisted_tag().is_none());
    }

    #[test]
    fn offline_wrapper_forwards_commitments_lookup() {
        let inner = ChannelState::Normal { commitments: crate::channel::commitments::tests_support::dummy_commitments() };
        let wrapped = ChannelState::Offline(Box::new(inner));
        assert!(wrapped.commitments().is_some());
        assert!(wrapped.is_offline());
    }
}
