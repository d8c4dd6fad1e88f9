//! Crate-wide error type ([SPEC_FULL.md] Section 7).
//!
//! Every layer (`hci`, `l2cap`, `att`, `sm`, `gap`) defines its own
//! `thiserror`-derived error enum for the failures specific to its wire
//! protocol, then converts into this crate's [`Error`] at the layer
//! boundary. [`Error`] keeps the host-level failure kind and, when a
//! protocol PDU is what surfaced the failure, the protocol-specific code
//! alongside it — matching the "visitor for tagged error" design note: the
//! two branches are kept statically distinct by the enum itself rather than
//! by a runtime visitor.

use std::fmt;

use crate::hci;

/// The result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Host-level failure kind, independent of which protocol (if any) reported
/// it.
#[derive(Clone, Copy, Eq, PartialEq, strum::Display)]
#[non_exhaustive]
pub enum HostErrorKind {
    Failed,
    TimedOut,
    InvalidParameters,
    Canceled,
    InProgress,
    NotSupported,
    NotFound,
    PeerNotFound,
    OutOfMemory,
    LinkDisconnected,
    PacketMalformed,
    NotReliable,
    NotReady,
}

/// A failure surfaced anywhere in the host stack.
///
/// `Host` carries no protocol detail. The other variants pair the host-level
/// interpretation with the specific protocol status/error/reason that
/// produced it, so callers that only care about the coarse-grained kind can
/// match on [`Self::kind`] while callers that need the wire detail can match
/// the concrete variant.
#[derive(Clone, Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("{0}")]
    Host(HostErrorKind),
    #[error("{0}")]
    Hci(#[from] hci::Error),
    #[error("ATT error: {code:?} ({kind})")]
    Att { kind: HostErrorKind, code: crate::att::ErrorCode },
    #[error("L2CAP signaling rejected: {reason:?} ({kind})")]
    L2cap { kind: HostErrorKind, reason: crate::l2cap::RejectReason },
    #[error("pairing failed: {reason:?} ({kind})")]
    Sm { kind: HostErrorKind, reason: crate::sm::Reason },
}

impl Error {
    /// Returns the host-level kind regardless of which variant this is.
    #[must_use]
    pub fn kind(&self) -> HostErrorKind {
        match self {
            Self::Host(k) => *k,
            Self::Hci(e) => e.kind(),
            Self::Att { kind: k, .. } | Self::L2cap { kind: k, .. } | Self::Sm { kind: k, .. } => *k,
        }
    }

    /// Shorthand for [`Error::Host`]`(`[`HostErrorKind::TimedOut`]`)`.
    #[must_use]
    pub const fn timed_out() -> Self {
        Self::Host(HostErrorKind::TimedOut)
    }

    /// Shorthand for [`Error::Host`]`(`[`HostErrorKind::Canceled`]`)`.
    #[must_use]
    pub const fn canceled() -> Self {
        Self::Host(HostErrorKind::Canceled)
    }
}

impl From<HostErrorKind> for Error {
    #[inline]
    fn from(k: HostErrorKind) -> Self {
        Self::Host(k)
    }
}

impl From<crate::l2cap::Error> for Error {
    /// `gap`'s dynamic channel-open calls are the only callers that surface
    /// an [`crate::l2cap::Error`] past the L2CAP layer; since that enum
    /// carries no peer-sent reject code of its own (unlike a `CommandReject`
    /// the peer actually sent), `reason` is filled with
    /// [`crate::l2cap::RejectReason::Other`].
    #[inline]
    fn from(e: crate::l2cap::Error) -> Self {
        Self::L2cap { kind: e.kind(), reason: crate::l2cap::RejectReason::Other }
    }
}

impl fmt::Debug for HostErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_is_consistent_across_variants() {
        let e: Error = hci::Error::CommandFailed {
            opcode: hci::Opcode::Reset,
            status: hci::Status::ConnectionTimeout,
        }
        .into();
        assert_eq!(e.kind(), HostErrorKind::Failed);
    }
}
