//! Security Manager Protocol: LE pairing over the SMP fixed channel and
//! BR/EDR pairing over HCI Secure Simple Pairing events
//! ([SPEC_FULL.md] C10).

use thiserror::Error;

#[path = "pdu.rs"]
pub(crate) mod pdu;
#[path = "phase.rs"]
mod phase;
#[path = "le.rs"]
pub mod le;
#[path = "bredr.rs"]
pub mod bredr;

pub use pdu::{AuthReq, IoCapability, KeyDistribution, Reason};
pub use phase::{choose_method, BoxFuture, Phase, PairingDelegate, PairingMethod, SecurityLevel, PHASE_TIMEOUT};

/// SMP-layer result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// SMP-layer failures: internal protocol violations distinct from a peer-
/// sent `Pairing_Failed` ([SPEC_FULL.md] `# 2.4`).
#[derive(Clone, Copy, Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The peer sent `Pairing_Failed(reason)`, or this side generated one.
    #[error("pairing failed: {0:?}")]
    Failed(Reason),

    /// A phase's 30-second inactivity timer expired (spec `# 4.5`:
    /// "on expiry the link is disconnected").
    #[error("SMP phase timed out")]
    Timeout,

    /// A PDU was malformed or arrived in a phase that doesn't expect it.
    #[error("malformed or unexpected SMP PDU")]
    UnexpectedPdu,

    /// The DH public key the peer offered is not a valid curve point
    /// ([Vol 3] Part H, Section 2.3.5.6.1).
    #[error("peer public key is not on the curve")]
    InvalidPublicKey,
}

impl Error {
    /// Classifies the error for the crate-wide [`crate::error::HostErrorKind`]
    /// it should surface as once it crosses into [`crate::error::Error`].
    #[must_use]
    pub fn kind(&self) -> crate::error::HostErrorKind {
        use crate::error::HostErrorKind as K;
        match self {
            Self::Failed(_) | Self::InvalidPublicKey => K::Failed,
            Self::Timeout => K::TimedOut,
            Self::UnexpectedPdu => K::PacketMalformed,
        }
    }

    /// The wire reason code to report alongside [`Self::kind`], matching the
    /// `{kind, reason}` shape of [`crate::error::Error::Sm`].
    #[must_use]
    pub fn reason(&self) -> Reason {
        match self {
            Self::Failed(r) => *r,
            Self::Timeout => Reason::UnspecifiedReason,
            Self::UnexpectedPdu => Reason::InvalidParameters,
            Self::InvalidPublicKey => Reason::DhKeyCheckFailed,
        }
    }
}

impl From<Error> for crate::error::Error {
    fn from(e: Error) -> Self {
        Self::Sm { kind: e.kind(), reason: e.reason() }
    }
}
