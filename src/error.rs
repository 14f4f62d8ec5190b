// Ambient (non-BOLT-policy) error aggregation.
//
// BOLT/channel-policy violations keep the LNP/BP ecosystem's
// `amplify_derive`-based `Display`/`Error`/`From` style (see
// `channel::ChannelError`); this module aggregates everything *around* the
// channel state machine — storage, transport, swap-in, payments, postman —
// using `thiserror`, matching how the rest of this crate's ambient stack is
// built.

use thiserror::Error;

use crate::channel::ChannelError;
use crate::payments::PaymentError;
use crate::postman::PostmanError;
use crate::swapin::SwapInError;

/// Top-level error type returned by the peer orchestrator's public API.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("channel state transition rejected: {0}")]
    Channel(#[from] ChannelError),

    #[error(transparent)]
    SwapIn(#[from] SwapInError),

    #[error(transparent)]
    Payment(#[from] PaymentError),

    #[error(transparent)]
    Postman(#[from] PostmanError),

    #[error("storage collaborator failed: {0}")]
    Storage(String),

    #[error("transport collaborator failed: {0}")]
    Transport(String),

    #[error("chain watcher collaborator failed: {0}")]
    ChainWatcher(String),

    #[error("key manager collaborator failed: {0}")]
    KeyManager(String),

    #[error("no active connection to peer")]
    NotConnected,

    #[error("unknown channel id {0}")]
    UnknownChannel(wire::ChannelId),
}
