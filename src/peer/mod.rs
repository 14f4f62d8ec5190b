// The peer orchestrator (§4.2): the singleton that multiplexes a single
// authenticated transport connection over every channel with the trusted
// trampoline peer. Connection lifecycle and interactive-tx assembly are
// kept in separate modules so `orchestrator.rs` stays the command-dispatch
// surface only.

pub mod connection;
pub mod feerate;
pub mod orchestrator;

pub use connection::{select_funding_inputs, InteractiveTxBuilder, InteractiveTxError};
pub use feerate::{
    closing_feerate, feerate_per_kw_to_vbyte, feerate_vbyte_to_per_kw, force_close_feerate, funding_feerate,
    within_policy,
};
pub use orchestrator::{Collaborators, PeerOrchestrator};
