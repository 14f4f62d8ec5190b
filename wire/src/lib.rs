// LNP/BP-derived mobile node: Lightning Network peer protocol (BOLT) wire
// messages, extended for dual-funding, splicing and a single trusted
// trampoline peer.
//
// Written in 2020-2022 by
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
extern crate lightning_encoding;
#[cfg(feature = "strict_encoding")]
#[macro_use]
extern crate strict_encoding;

#[cfg(test)]
macro_rules! dumb_pubkey {
    () => {
        secp256k1::PublicKey::from_secret_key(secp256k1::SECP256K1, &secp256k1::ONE_KEY)
    };
}

mod ids;
mod features;
pub mod tlv;
pub mod bolt1;
pub mod bolt2;
pub mod dual_funding;
pub mod splice;
pub mod htlc;
pub mod closing;
pub mod reestablish;
pub mod trampoline;
pub mod onion_message;
pub mod bolt12;
pub mod noise;
mod messages;

pub use ids::{ActiveChannelId, ChannelId, TempChannelId};
pub use features::{Feature, FeatureContext, InitFeatures, UnknownFeatureError};
pub use messages::Messages;

/// Default legacy Lightning port number.
pub const LNP2P_LEGACY_PORT: u16 = 9735;
