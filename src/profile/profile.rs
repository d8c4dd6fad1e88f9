//! Crate-root concerns shared across every layer: the crate-wide error type
//! and the identifiers/configuration a caller touches regardless of which
//! profile (SPP, A2DP, GATT-based) sits above the core ([SPEC_FULL.md]
//! `# 0` workspace shape, `# 6` Configuration surface).

#[path = "../error.rs"]
pub mod error;

pub use error::{Error, HostErrorKind, Result};

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Well-known PSMs for profiles built directly on L2CAP dynamic channels
/// (spec `# 6` PSM allocation). Kept here rather than in `l2cap` because
/// they name *profiles*, not protocol mechanics; `l2cap::Psm` carries the
/// raw allocation rules these constants plug into.
pub mod psm {
    pub use crate::l2cap::Psm;
}

/// Stable, process-local identifier for a [`crate::gap::Peer`] ([SPEC_FULL.md]
/// `Peer` data model: "stable 64-bit peer id"). Unlike a device address, a
/// `PeerId` never changes for the lifetime of the cache entry, including
/// across identity resolution merges (spec `# 4.7`: "the merged entry
/// retains the stable id of the older entry").
#[derive(Clone, Copy, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[repr(transparent)]
pub struct PeerId(u64);

impl PeerId {
    #[inline]
    #[must_use]
    pub(crate) const fn new(v: u64) -> Self {
        Self(v)
    }

    /// Returns the raw value, useful for persistence layers that key bond
    /// storage by peer id.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId({:#018x})", self.0)
    }
}

impl fmt::Display for PeerId {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Allocates process-unique [`PeerId`]s. A single instance lives in the
/// [`crate::gap::PeerCache`]; split out so tests can construct ids without a
/// whole cache.
#[derive(Debug, Default)]
pub(crate) struct PeerIdAllocator(AtomicU64);

impl PeerIdAllocator {
    pub(crate) fn next(&self) -> PeerId {
        // Start at 1 so `PeerId(0)` stays recognizable as "never assigned"
        // in tests and Debug output.
        PeerId::new(self.0.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

/// LE security mode, set once on the host and consulted by
/// [`crate::gap::le::ConnectionManager::open_l2cap_channel`]'s pairing gate
/// ([Vol 3] Part C, Section 10.2).
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum LeSecurityMode {
    /// Mode 1: pairing is negotiated per-service as channels request it.
    #[default]
    Mode1,
    /// LE Secure Connections Only: legacy pairing and any link below
    /// authenticated Secure Connections is refused outright.
    SecureConnectionsOnly,
}

/// Programmatic configuration surface (spec `# 6`: "the core exposes
/// programmatic setters ... No environment variables or on-disk format are
/// mandated"). Plain struct with setters, matching
/// [`crate::hci::AdvParams`]'s style rather than a builder or config-file
/// crate.
#[derive(Clone, Debug)]
pub struct HostConfig {
    bondable: bool,
    le_security_mode: LeSecurityMode,
    io_capability: crate::sm::IoCapability,
    local_name: String,
    device_class: u32,
    irk: Option<sapphire_crypto::Irk>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            bondable: true,
            le_security_mode: LeSecurityMode::default(),
            io_capability: crate::sm::IoCapability::NoInputNoOutput,
            local_name: String::new(),
            device_class: 0,
            irk: None,
        }
    }
}

impl HostConfig {
    /// Sets whether new pairings may be bonded (spec `# 4.5` Phase1: "whether
    /// bonding will occur (both must request)" — this is the local half of
    /// that negotiation).
    pub fn set_bondable(&mut self, bondable: bool) -> &mut Self {
        self.bondable = bondable;
        self
    }

    #[must_use]
    pub const fn bondable(&self) -> bool {
        self.bondable
    }

    pub fn set_le_security_mode(&mut self, mode: LeSecurityMode) -> &mut Self {
        self.le_security_mode = mode;
        self
    }

    #[must_use]
    pub const fn le_security_mode(&self) -> LeSecurityMode {
        self.le_security_mode
    }

    pub fn set_io_capability(&mut self, io_cap: crate::sm::IoCapability) -> &mut Self {
        self.io_capability = io_cap;
        self
    }

    #[must_use]
    pub const fn io_capability(&self) -> crate::sm::IoCapability {
        self.io_capability
    }

    pub fn set_local_name(&mut self, name: impl Into<String>) -> &mut Self {
        self.local_name = name.into();
        self
    }

    #[must_use]
    pub fn local_name(&self) -> &str {
        &self.local_name
    }

    pub fn set_device_class(&mut self, class: u32) -> &mut Self {
        self.device_class = class;
        self
    }

    pub fn set_irk(&mut self, irk: Option<sapphire_crypto::Irk>) -> &mut Self {
        self.irk = irk;
        self
    }

    #[must_use]
    pub const fn irk(&self) -> Option<&sapphire_crypto::Irk> {
        self.irk.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_id_allocator_never_reissues() {
        let a = PeerIdAllocator::default();
        let ids: Vec<_> = (0..4).map(|_| a.next()).collect();
        for w in ids.windows(2) {
            assert_ne!(w[0], w[1]);
        }
    }

    #[test]
    fn host_config_defaults_to_bondable_mode1() {
        let cfg = HostConfig::default();
        assert!(cfg.bondable());
        assert_eq!(cfg.le_security_mode(), LeSecurityMode::Mode1);
    }
}
