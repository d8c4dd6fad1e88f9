//! Generic Attribute Profile: read-only schema/database model plus the
//! client-side service discovery and access procedures ([SPEC_FULL.md] C9,
//! [Vol 3] Part G).

use std::fmt::{Debug, Display, Formatter};
use std::num::NonZeroU16;

use bitflags::bitflags;
use thiserror::Error;

use crate::att::{ErrorCode, Opcode};
use crate::gap::Uuid16;

#[path = "schema.rs"]
pub mod schema;
#[path = "client.rs"]
mod client;

pub use client::{Characteristic, Client, ReadByTypeValue, RemoteService, WriteMode};
pub use schema::{CharInfo as _, Schema, SchemaEntry};

/// GATT-layer result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// GATT client-side failures ([SPEC_FULL.md] `# 7`).
#[derive(Clone, Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The underlying ATT request failed or the bearer is gone.
    #[error("ATT error: {0}")]
    Att(#[from] crate::att::Error),

    /// A discovery or read response violated a GATT invariant (handles not
    /// strictly increasing, value handle doesn't follow declaration, etc.).
    #[error("malformed GATT response")]
    InvalidResponse,

    /// A reliable write's echoed value didn't match what was sent.
    #[error("reliable write value mismatch")]
    NotReliable,

    /// The requested handle isn't present in the cached schema.
    #[error("unknown characteristic or descriptor handle")]
    NotFound,
}

impl Error {
    /// Classifies the error for the crate-wide [`crate::error::HostErrorKind`].
    #[must_use]
    pub fn kind(&self) -> crate::error::HostErrorKind {
        use crate::error::HostErrorKind as K;
        match self {
            Self::Att(e) => e.kind(),
            Self::InvalidResponse => K::PacketMalformed,
            Self::NotReliable => K::NotReliable,
            Self::NotFound => K::NotFound,
        }
    }
}

/// Attribute handle ([Vol 3] Part F, Section 3.2.2). Valid handles are in
/// `[1, 0xFFFF]`; `0` is reserved.
#[derive(Clone, Copy, Eq, Ord, PartialEq, PartialOrd, Hash)]
#[repr(transparent)]
pub struct Handle(NonZeroU16);

impl Handle {
    /// The smallest valid handle.
    pub const MIN: Self = Self(match NonZeroU16::new(1) {
        Some(v) => v,
        None => unreachable!(),
    });
    /// The largest valid handle.
    pub const MAX: Self = Self(match NonZeroU16::new(0xFFFF) {
        Some(v) => v,
        None => unreachable!(),
    });

    /// Creates a handle from a raw value, or [`None`] if it is `0`.
    #[inline]
    #[must_use]
    pub const fn new(v: u16) -> Option<Self> {
        match NonZeroU16::new(v) {
            Some(nz) => Some(Self(nz)),
            None => None,
        }
    }
}

impl Debug for Handle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#06X}", self.0.get())
    }
}

impl Display for Handle {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(self, f)
    }
}

impl From<Handle> for u16 {
    #[inline]
    fn from(h: Handle) -> Self {
        h.0.get()
    }
}

/// An inclusive `[start, end]` attribute handle range.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct HandleRange {
    start: Handle,
    end: Handle,
}

impl HandleRange {
    /// Creates a new handle range. `start` must be `<= end`.
    #[inline]
    #[must_use]
    pub const fn new(start: Handle, end: Handle) -> Self {
        Self { start, end }
    }

    /// The full valid handle space.
    #[inline]
    #[must_use]
    pub const fn all() -> Self {
        Self::new(Handle::MIN, Handle::MAX)
    }

    #[inline]
    #[must_use]
    pub const fn start(self) -> Handle {
        self.start
    }

    #[inline]
    #[must_use]
    pub const fn end(self) -> Handle {
        self.end
    }
}

/// A named attribute type UUID ([Vol 3] Part G, Appendix B), used as the
/// single source of truth for the raw values in [`Declaration`] and
/// [`Descriptor`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Type(Uuid16);

impl Type {
    pub const PRIMARY_SERVICE: Self = Self(Uuid16::sig(0x2800));
    pub const SECONDARY_SERVICE: Self = Self(Uuid16::sig(0x2801));
    pub const INCLUDE: Self = Self(Uuid16::sig(0x2802));
    pub const CHARACTERISTIC: Self = Self(Uuid16::sig(0x2803));
    pub const CHARACTERISTIC_EXTENDED_PROPERTIES: Self = Self(Uuid16::sig(0x2900));
    pub const CHARACTERISTIC_USER_DESCRIPTION: Self = Self(Uuid16::sig(0x2901));
    pub const CLIENT_CHARACTERISTIC_CONFIGURATION: Self = Self(Uuid16::sig(0x2902));
    pub const SERVER_CHARACTERISTIC_CONFIGURATION: Self = Self(Uuid16::sig(0x2903));
    pub const CHARACTERISTIC_PRESENTATION_FORMAT: Self = Self(Uuid16::sig(0x2904));
    pub const CHARACTERISTIC_AGGREGATE_FORMAT: Self = Self(Uuid16::sig(0x2905));

    /// Returns the raw 16-bit UUID value.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u16 {
        self.0.raw()
    }
}

/// GATT declaration attribute types ([Vol 3] Part G, Section 3.3-3.6).
#[derive(
    Clone, Copy, Debug, Eq, PartialEq, num_enum::IntoPrimitive, num_enum::TryFromPrimitive,
)]
#[repr(u16)]
pub enum Declaration {
    PrimaryService = Type::PRIMARY_SERVICE.raw(),
    SecondaryService = Type::SECONDARY_SERVICE.raw(),
    Include = Type::INCLUDE.raw(),
    Characteristic = Type::CHARACTERISTIC.raw(),
}

impl Declaration {
    /// Returns the `Uuid16` representation of the variant.
    #[inline]
    #[must_use]
    pub const fn uuid16(self) -> Uuid16 {
        Uuid16::sig(self as u16)
    }
}

/// Core GATT characteristic descriptor types ([Vol 3] Part G, Section 3.3.3).
#[derive(
    Clone, Copy, Debug, Eq, PartialEq, num_enum::IntoPrimitive, num_enum::TryFromPrimitive,
)]
#[repr(u16)]
pub enum Descriptor {
    CharacteristicExtendedProperties = Type::CHARACTERISTIC_EXTENDED_PROPERTIES.raw(),
    CharacteristicUserDescription = Type::CHARACTERISTIC_USER_DESCRIPTION.raw(),
    ClientCharacteristicConfiguration = Type::CLIENT_CHARACTERISTIC_CONFIGURATION.raw(),
    ServerCharacteristicConfiguration = Type::SERVER_CHARACTERISTIC_CONFIGURATION.raw(),
    CharacteristicPresentationFormat = Type::CHARACTERISTIC_PRESENTATION_FORMAT.raw(),
    CharacteristicAggregateFormat = Type::CHARACTERISTIC_AGGREGATE_FORMAT.raw(),
}

impl Descriptor {
    /// Returns the `Uuid16` representation of the variant.
    #[inline]
    #[must_use]
    pub const fn uuid16(self) -> Uuid16 {
        Uuid16::sig(self as u16)
    }
}

bitflags! {
    /// Characteristic properties bitmask ([Vol 3] Part G, Section 3.3.1.1).
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct Prop: u8 {
        const BROADCAST = 1 << 0;
        const READ = 1 << 1;
        const WRITE_CMD = 1 << 2;
        const WRITE = 1 << 3;
        const NOTIFY = 1 << 4;
        const INDICATE = 1 << 5;
        const SIGNED_WRITE_CMD = 1 << 6;
        const EXT_PROPS = 1 << 7;
    }
}

impl Prop {
    /// Equivalent to `from_bits_retain`, kept for call sites that already
    /// know the byte came from a properties octet on the wire.
    ///
    /// # Safety
    ///
    /// Every bit pattern is a valid [`Prop`]; this is safe in practice and
    /// only `unsafe` for API parity with callers written against older
    /// `bitflags` versions.
    #[inline]
    #[must_use]
    pub const unsafe fn from_bits_unchecked(bits: u8) -> Self {
        Self::from_bits_retain(bits)
    }
}

bitflags! {
    /// Characteristic extended properties bitmask ([Vol 3] Part G, Section 3.3.3.1).
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct ExtProp: u16 {
        const RELIABLE_WRITE = 1 << 0;
        const WRITABLE_AUX = 1 << 1;
    }
}

bitflags! {
    /// The direction of an attribute access, used in permission checks.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct Access: u8 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
    }
}

impl Access {
    /// Returns the read/write direction of this access (masking out any
    /// future flags that may be added alongside it).
    #[inline]
    #[must_use]
    pub const fn typ(self) -> Self {
        self
    }
}

/// Per-attribute read/write permissions ([Vol 3] Part F, Section 10.3.1).
/// Security requirements (encryption, authentication, authorization) are
/// enforced by the link/bearer layer before a request reaches the schema;
/// this only tracks whether the operation is permitted at all.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Perms {
    readable: bool,
    writable: bool,
}

impl Perms {
    /// No access permitted.
    #[inline]
    #[must_use]
    pub const fn none() -> Self {
        Self { readable: false, writable: false }
    }

    /// Read-only access.
    #[inline]
    #[must_use]
    pub const fn readable() -> Self {
        Self { readable: true, writable: false }
    }

    /// Read and write access.
    #[inline]
    #[must_use]
    pub const fn readable_writable() -> Self {
        Self { readable: true, writable: true }
    }

    /// Checks whether `ac` is permitted, returning the [`ErrorCode`] to
    /// report if not.
    pub fn test(&self, ac: Access) -> std::result::Result<(), ErrorCode> {
        if ac.contains(Access::READ) && !self.readable {
            return Err(ErrorCode::ReadNotPermitted);
        }
        if ac.contains(Access::WRITE) && !self.writable {
            return Err(ErrorCode::WriteNotPermitted);
        }
        Ok(())
    }
}

/// Result of an attribute operation that may need to be reported to the
/// peer as an ATT `ErrorResponse`.
pub type RspResult<T> = std::result::Result<T, RspError>;

/// An ATT-layer failure tied to the opcode and handle that caused it.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RspError {
    pub op: Opcode,
    pub handle: Handle,
    pub error: ErrorCode,
}

/// An in-flight ATT server request being checked against the schema.
#[derive(Clone, Copy, Debug)]
pub struct Request {
    pub op: Opcode,
    pub ac: Access,
}

trait OpcodeExt {
    fn err<T>(self, error: ErrorCode) -> RspResult<T>;
    fn hdl_err<T>(self, error: ErrorCode, handle: Handle) -> RspResult<T>;
}

impl OpcodeExt for Opcode {
    #[inline]
    fn err<T>(self, error: ErrorCode) -> RspResult<T> {
        Err(RspError { op: self, handle: Handle::MIN, error })
    }

    #[inline]
    fn hdl_err<T>(self, error: ErrorCode, handle: Handle) -> RspResult<T> {
        Err(RspError { op: self, handle, error })
    }
}

/// Marker for a primary/secondary service group in [`Schema`] iteration.
#[derive(Clone, Copy, Debug)]
pub struct ServiceDef;

/// Marker for a characteristic group in [`Schema`] iteration.
#[derive(Clone, Copy, Debug)]
pub struct CharacteristicDef;

/// Marker for a service include declaration.
#[derive(Clone, Copy, Debug)]
pub struct IncludeDef;

/// Marker for a characteristic descriptor.
#[derive(Clone, Copy, Debug)]
pub struct DescriptorDef;

impl CharacteristicDef {
    /// Returns whether `typ` ends the current characteristic's descriptor
    /// run (the next characteristic or service declaration).
    #[inline]
    #[must_use]
    fn is_next_group(typ: Option<Uuid16>) -> bool {
        matches!(
            typ,
            Some(t) if t == Declaration::PrimaryService.uuid16()
                || t == Declaration::SecondaryService.uuid16()
                || t == Declaration::Include.uuid16()
                || t == Declaration::Characteristic.uuid16()
        )
    }
}
