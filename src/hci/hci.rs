//! Host Controller Interface: transport, command/event channel, and ACL data
//! channel ([SPEC_FULL.md] C1-C3).
//!
//! Each protocol layer below `crate` owns its own [`Error`]/[`Result`] pair
//! for failures specific to that layer's wire format and state machine; the
//! crate-wide [`crate::error::Error`] only sees these at the point where a
//! layer hands control back up to its caller.

use thiserror::Error;

#[path = "consts.rs"]
mod consts;
#[path = "conn.rs"]
mod conn;
#[path = "cmd/cmd.rs"]
mod cmd;
#[path = "event/event.rs"]
mod event;
#[path = "acl.rs"]
mod acl;

pub use consts::{
    AdvAddrType, AdvChanMap, AdvDataOp, AdvFilterPolicy, AdvPhy, AdvProp, CoreVersion, EventCode, Opcode,
    Role, Status,
};
pub use consts::BufferSize;
pub(crate) use consts::{
    duration_1250us, duration_10ms, ticks_10ms, ticks_1250us, ticks_625us, EventFmt, CMD_BUF, EVT_HDR,
};

pub use conn::{AdvHandle, ConnHandle, LeConnectionComplete};

pub use cmd::{AdvEnableParams, AdvParams, EventMask, LeBufferSize, LeEventMask};

pub use event::{
    AuthenticationComplete, ConnectionComplete, ConnectionRequest, DisconnectionComplete,
    EncryptionChange, Event, EventGuard, EventReceiverTask, EventType, IoCapabilityRequest,
    IoCapabilityResponse, LinkKeyNotification, LinkKeyRequest, LinkType, NumberOfCompletedPackets,
    PinCodeRequest, ReadRemoteExtendedFeaturesComplete, ReadRemoteSupportedFeaturesComplete,
    ReadRemoteVersionInformationComplete, RemoteNameRequestComplete, SimplePairingComplete,
    SubeventCode, UserConfirmationRequest, UserPasskeyNotification, UserPasskeyRequest,
};
pub(crate) use event::{EventFilter, EventRouter, EventWaiterGuard};

pub(crate) use acl::{AclDataChannel, Priority};

pub use crate::host::{Host, Transfer, Transport, COMMAND_TIMEOUT};

/// HCI-layer result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// HCI-layer failures: malformed/unrecognized events, command protocol
/// violations, and the flow-control and timeout conditions described in
/// spec `# 4.1`.
#[derive(Clone, Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A host-level condition that doesn't originate from the HCI wire
    /// protocol itself (e.g. the transport was already closed).
    #[error(transparent)]
    Host(#[from] crate::error::HostErrorKind),

    /// An event's header or parameters could not be parsed.
    #[error("malformed HCI event: {0:?}")]
    InvalidEvent(Vec<u8>),

    /// An event code (or LE subevent code) the stack doesn't recognize.
    #[error("unknown HCI event (code=0x{code:02x}, subevent=0x{subevent:02x})")]
    UnknownEvent { code: u8, subevent: u8, params: Vec<u8> },

    /// [`EventGuard::ok`] was called on an event that isn't `CommandComplete`
    /// or `CommandStatus`.
    #[error("expected a CommandComplete/CommandStatus event, got {typ}")]
    NonCommandEvent { typ: EventType },

    /// The controller reported a non-success status for a command.
    #[error("command {opcode} failed: {status}")]
    CommandFailed { opcode: Opcode, status: Status },

    /// A new event waiter's filter is ambiguous with one already registered.
    #[error("event waiter conflicts with an existing registration")]
    FilterConflict,

    /// No command quota is currently available ([Vol 4] Part E, Section 4.4).
    #[error("no command quota available")]
    CommandQuotaExceeded,

    /// A command did not complete within [`COMMAND_TIMEOUT`].
    #[error("command timed out")]
    Timeout,

    /// The event waiter was dropped before a matching event arrived, e.g.
    /// because the controller link was lost.
    #[error("event waiter was dropped: {0}")]
    Lost(Status),
}

impl From<Status> for Error {
    #[inline]
    fn from(s: Status) -> Self {
        Self::Lost(s)
    }
}

impl Error {
    /// Classifies the error for the crate-wide [`crate::error::HostErrorKind`]
    /// it should surface as once it crosses into [`crate::error::Error`].
    #[must_use]
    pub fn kind(&self) -> crate::error::HostErrorKind {
        use crate::error::HostErrorKind as K;
        match self {
            Self::Host(k) => *k,
            Self::InvalidEvent(_) | Self::UnknownEvent { .. } => K::PacketMalformed,
            Self::NonCommandEvent { .. } | Self::CommandFailed { .. } => K::Failed,
            Self::FilterConflict | Self::CommandQuotaExceeded => K::InProgress,
            Self::Timeout => K::TimedOut,
            Self::Lost(_) => K::Canceled,
        }
    }
}
