//! LE address and PHY power types shared by `hci`, `gap`, and `sm`
//! ([Vol 6] Part B, Section 1.3).

use std::fmt;

/// A 48-bit device address in controller wire order (little-endian), with no
/// type tag. Used for raw HCI parameters; [`Addr`] is the typed wrapper used
/// everywhere else.
#[derive(Clone, Copy, Default, Eq, PartialEq, Hash)]
#[repr(transparent)]
pub struct RawAddr(pub [u8; 6]);

impl fmt::Debug for RawAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{g:02X}:{e:02X}:{d:02X}:{c:02X}:{b:02X}:{a:02X}")
    }
}

impl fmt::Display for RawAddr {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Device address with its resolvability/type tag
/// ([Vol 6] Part B, Section 1.3).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[non_exhaustive]
pub enum Addr {
    Public(RawAddr),
    Random(RawAddr),
}

impl Addr {
    /// Creates an address for a peer, given the controller's peer-address-type
    /// octet and raw value (the pairing used by every HCI LE event carrying a
    /// peer address).
    #[must_use]
    pub fn peer(addr_type: u8, raw: RawAddr) -> Self {
        if addr_type & 1 == 0 {
            Self::Public(raw)
        } else {
            Self::Random(raw)
        }
    }

    /// Returns the raw 48-bit value, discarding the type tag.
    #[must_use]
    pub const fn raw(self) -> RawAddr {
        match self {
            Self::Public(r) | Self::Random(r) => r,
        }
    }

    /// Returns whether this is a resolvable private address (RPA): a random
    /// address whose top two bits are `01` ([Vol 6] Part B, Section 1.3.2.2).
    #[must_use]
    pub fn is_resolvable_private(self) -> bool {
        matches!(self, Self::Random(r) if r.0[5] & 0xC0 == 0x40)
    }
}

impl Default for Addr {
    #[inline]
    fn default() -> Self {
        Self::Public(RawAddr::default())
    }
}

/// Transmit power level in dBm, or the controller's "not available" sentinel
/// ([Vol 4] Part E, Section 7.8.53).
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct TxPower(Option<i8>);

impl TxPower {
    /// Controller sentinel for "host has no preference" / "not available".
    pub const NONE: i8 = 127;

    /// Creates a transmit power value.
    #[must_use]
    pub const fn new(dbm: i8) -> Self {
        Self(Some(dbm))
    }
}

impl From<TxPower> for i8 {
    #[inline]
    fn from(p: TxPower) -> Self {
        p.0.unwrap_or(TxPower::NONE)
    }
}

impl From<i8> for TxPower {
    #[inline]
    fn from(v: i8) -> Self {
        if v == Self::NONE { Self(None) } else { Self(Some(v)) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_address_type_bit_selects_random_vs_public() {
        let raw = RawAddr([1, 2, 3, 4, 5, 6]);
        assert_eq!(Addr::peer(0x00, raw), Addr::Public(raw));
        assert_eq!(Addr::peer(0x01, raw), Addr::Random(raw));
    }

    #[test]
    fn resolvable_private_address_top_bits() {
        let rpa = Addr::Random(RawAddr([0, 0, 0, 0, 0, 0x40]));
        assert!(rpa.is_resolvable_private());
        let static_addr = Addr::Random(RawAddr([0, 0, 0, 0, 0, 0xC0]));
        assert!(!static_addr.is_resolvable_private());
    }
}
