// Aggregates every message type this node's peer protocol can send or
// receive into a single value, tagged on the wire by its 2-byte BOLT-1
// message type.

use std::io;

use lightning_encoding::{self, LightningDecode, LightningEncode};

use crate::bolt1::{Error as ErrorMsg, Init, Ping, Pong, Warning};
use crate::bolt2::{
    AcceptChannel, ClosingSigned, FundingCreated, FundingLocked, FundingSigned, OpenChannel,
    Shutdown, UpdateFee,
};
use crate::closing::{ClosingComplete, ClosingSig};
use crate::dual_funding::{
    AcceptChannel2, OpenChannel2, TxAbort, TxAckRbf, TxAddInput, TxAddOutput, TxComplete,
    TxInitRbf, TxRemoveInput, TxRemoveOutput, TxSignatures,
};
use crate::htlc::{
    CommitmentSigned, RevokeAndAck, UpdateAddHtlc, UpdateFailHtlc, UpdateFailMalformedHtlc,
    UpdateFulfillHtlc,
};
use crate::onion_message::OnionMessage;
use crate::reestablish::ChannelReestablish;
use crate::splice::{SpliceAck, SpliceInit, SpliceLocked};
use crate::trampoline::{
    FcmToken, PayToOpenRequest, PayToOpenResponse, PhoenixAndroidLegacyInfo, PleaseOpenChannel,
    UnsetFcmToken,
};

macro_rules! messages {
    ($($(#[$meta:meta])* $ty:literal => $variant:ident($inner:ty)),+ $(,)?) => {
        #[derive(Clone, PartialEq, Debug, Display)]
        #[display(inner)]
        #[non_exhaustive]
        pub enum Messages {
            $($(#[$meta])* $variant($inner),)+
        }

        impl Messages {
            /// The 2-byte BOLT-1 message type tag this variant is sent under.
            pub fn type_id(&self) -> u16 {
                match self {
                    $(Messages::$variant(_) => $ty,)+
                }
            }
        }

        impl LightningEncode for Messages {
            fn lightning_encode<E: io::Write>(&self, mut e: E) -> Result<usize, lightning_encoding::Error> {
                let mut len = self.type_id().lightning_encode(&mut e)?;
                len += match self {
                    $(Messages::$variant(msg) => msg.lightning_encode(&mut e)?,)+
                };
                Ok(len)
            }
        }

        impl LightningDecode for Messages {
            fn lightning_decode<D: io::Read>(mut d: D) -> Result<Self, lightning_encoding::Error> {
                let type_id = u16::lightning_decode(&mut d)?;
                Ok(match type_id {
                    $($ty => Messages::$variant(<$inner>::lightning_decode(&mut d)?),)+
                    unknown => {
                        return Err(lightning_encoding::Error::DataIntegrityError(format!(
                            "unknown BOLT message type {}",
                            unknown
                        )))
                    }
                })
            }
        }

        $(
            impl From<$inner> for Messages {
                fn from(msg: $inner) -> Self {
                    Messages::$variant(msg)
                }
            }
        )+
    };
}

messages! {
    // Part I: generic messages outside of channel operations (BOLT-1).
    16 => Init(Init),
    17 => Error(ErrorMsg),
    1 => Warning(Warning),
    18 => Ping(Ping),
    19 => Pong(Pong),

    // Part II.1: legacy single-funder channel establishment/closing (BOLT-2).
    32 => OpenChannel(OpenChannel),
    33 => AcceptChannel(AcceptChannel),
    34 => FundingCreated(FundingCreated),
    35 => FundingSigned(FundingSigned),
    36 => FundingLocked(FundingLocked),
    38 => Shutdown(Shutdown),
    39 => ClosingSigned(ClosingSigned),

    // Part II.2: channel operations (BOLT-2).
    128 => UpdateAddHtlc(UpdateAddHtlc),
    130 => UpdateFulfillHtlc(UpdateFulfillHtlc),
    131 => UpdateFailHtlc(UpdateFailHtlc),
    135 => UpdateFailMalformedHtlc(UpdateFailMalformedHtlc),
    132 => CommitmentSigned(CommitmentSigned),
    133 => RevokeAndAck(RevokeAndAck),
    134 => UpdateFee(UpdateFee),
    136 => ChannelReestablish(ChannelReestablish),

    // Part II.3: RBF'd mutual close (option_simple_close).
    40 => ClosingComplete(ClosingComplete),
    41 => ClosingSig(ClosingSig),

    // Part II.4: dual-funding and interactive transaction construction.
    64 => OpenChannel2(OpenChannel2),
    65 => AcceptChannel2(AcceptChannel2),
    66 => TxAddInput(TxAddInput),
    67 => TxAddOutput(TxAddOutput),
    68 => TxRemoveInput(TxRemoveInput),
    69 => TxRemoveOutput(TxRemoveOutput),
    70 => TxComplete(TxComplete),
    71 => TxSignatures(TxSignatures),
    72 => TxInitRbf(TxInitRbf),
    73 => TxAckRbf(TxAckRbf),
    74 => TxAbort(TxAbort),

    // Part II.5: splicing.
    75 => SpliceInit(SpliceInit),
    76 => SpliceAck(SpliceAck),
    77 => SpliceLocked(SpliceLocked),

    // Part III: onion messages (BOLT-7/12).
    513 => OnionMessage(OnionMessage),

    // Part IV: single-trampoline-peer extensions, outside any BOLT number
    // range currently allocated by the base specifications.
    35023 => PleaseOpenChannel(PleaseOpenChannel),
    35025 => PayToOpenRequest(PayToOpenRequest),
    35027 => PayToOpenResponse(PayToOpenResponse),
    35029 => PhoenixAndroidLegacyInfo(PhoenixAndroidLegacyInfo),
    35031 => FcmToken(FcmToken),
    35033 => UnsetFcmToken(UnsetFcmToken),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_id_matches_bolt1_ping() {
        let msg = Messages::Ping(Ping { pong_size: 0, ignored: vec![] });
        assert_eq!(msg.type_id(), 18);
    }
}
