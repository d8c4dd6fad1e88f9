//! Attribute Protocol bearer ([SPEC_FULL.md] C8).

use thiserror::Error;

#[path = "pdu.rs"]
pub(crate) mod pdu;
#[path = "bearer.rs"]
mod bearer;

pub use bearer::{Bearer, NotificationSink, ATT_TIMEOUT, DEFAULT_MTU};
pub use pdu::{Attribute, ErrorCode, GroupAttribute, HandleRange, HandleValue, InformationEntry, Opcode, PreparedWrite};

/// ATT-layer result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// ATT-layer failures ([Vol 3] Part F, Section 3.4.1).
#[derive(Clone, Copy, Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The peer returned an `ErrorResponse`.
    #[error("ATT error: {0:?}")]
    Protocol(ErrorCode),

    /// A response PDU was malformed or didn't match the expected opcode.
    #[error("malformed ATT PDU")]
    InvalidPdu,

    /// A request or indication exceeded [`ATT_TIMEOUT`].
    #[error("ATT request timed out")]
    Timeout,

    /// The bearer has permanently shut down after a prior timeout.
    #[error("ATT bearer is closed")]
    BearerClosed,
}

impl Error {
    /// Classifies the error for the crate-wide [`crate::error::HostErrorKind`]
    /// it should surface as once it crosses into [`crate::error::Error`].
    #[must_use]
    pub fn kind(&self) -> crate::error::HostErrorKind {
        use crate::error::HostErrorKind as K;
        match self {
            Self::Protocol(_) => K::Failed,
            Self::InvalidPdu => K::PacketMalformed,
            Self::Timeout => K::TimedOut,
            Self::BearerClosed => K::LinkDisconnected,
        }
    }
}
