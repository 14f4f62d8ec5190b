// LNP/BP-derived mobile node: channel state machine, peer orchestrator and
// swap-in manager for a single-peer trampoline Lightning client.
// Written in 2019-2022 by
//     Dr. Maxim Orlovsky <orlovsky@pandoracore.com>
// Extended 2024 for mobile/trampoline operation.
//
// To the extent possible under law, the author(s) have dedicated all
// copyright and related and neighboring rights to this software to
// the public domain worldwide. This software is distributed without
// any warranty.
//
// You should have received a copy of the MIT License
// along with this software.
// If not, see <https://opensource.org/licenses/MIT>.

#![recursion_limit = "256"]
#![deny(non_upper_case_globals, non_camel_case_types, non_snake_case, unused_mut)]

#[macro_use]
extern crate amplify;
#[macro_use]
extern crate amplify_derive;
#[macro_use]
extern crate strict_encoding;

pub extern crate wire;

macro_rules! dumb_pubkey {
    () => {
        secp256k1::PublicKey::from_secret_key(secp256k1::SECP256K1, &secp256k1::ONE_KEY)
    };
}

pub mod channel;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod events;
pub mod payments;
pub mod peer;
pub mod postman;
pub mod swapin;
pub mod wallet;

pub use channel::{ChannelAction, ChannelCommand, ChannelState};
pub use config::{LiquidityPolicy, NodeParams, SwapInParams};
pub use error::NodeError;
pub use events::DomainEvent;
pub use peer::PeerOrchestrator;

/// Installs a `tracing` subscriber driven by `RUST_LOG`. Convenience only —
/// libraries should not normally initialize a global subscriber, so the
/// embedding binary is free to skip this and install its own.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("ln_mobile_core=info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
