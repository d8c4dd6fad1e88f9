//! L2CAP: ACL fragmentation/recombination, dynamic channel registry, and
//! signaling command handling ([SPEC_FULL.md] C4-C7).

use thiserror::Error;

#[path = "channel.rs"]
mod channel;
#[path = "frame.rs"]
mod frame;
#[path = "signaling.rs"]
mod signaling;
#[path = "dynamic.rs"]
mod dynamic;
#[path = "link.rs"]
mod link;

pub use channel::{ChannelParameters, Cid, Mode, Psm};
pub use dynamic::MIN_MTU_BREDR;
pub use link::{LogicalLink, WeakChannel};
pub use signaling::RejectReason;

pub(crate) use channel::Channel;
pub(crate) use frame::{fragment, Recombiner};

/// L2CAP-layer result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// L2CAP-layer failures: signaling protocol violations and channel
/// negotiation outcomes that prevent a channel from opening (spec `# 4.3`,
/// `# 7`).
#[derive(Clone, Copy, Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A signaling request's RTX timer expired with no response.
    #[error("L2CAP signaling request timed out")]
    SignalingTimeout,

    /// A peer signaling command or response could not be parsed.
    #[error("malformed L2CAP signaling command")]
    Malformed,

    /// The peer refused the channel (`ConnectionResult` other than
    /// `Success`, or a source-cid collision).
    #[error("L2CAP channel refused by peer")]
    ChannelRefused,

    /// Configuration could not converge on a common channel mode (spec
    /// `# 4.3` step 7).
    #[error("L2CAP channel mode negotiation failed")]
    ModeMismatch,
}

impl Error {
    /// Classifies the error for the crate-wide [`crate::error::HostErrorKind`]
    /// it should surface as once it crosses into [`crate::error::Error`].
    #[must_use]
    pub fn kind(&self) -> crate::error::HostErrorKind {
        use crate::error::HostErrorKind as K;
        match self {
            Self::SignalingTimeout => K::TimedOut,
            Self::Malformed => K::PacketMalformed,
            Self::ChannelRefused | Self::ModeMismatch => K::Failed,
        }
    }
}
