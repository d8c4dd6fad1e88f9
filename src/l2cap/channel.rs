//! Channel identifiers, fixed-channel allocation, and the per-channel SDU
//! pipe ([SPEC_FULL.md] `Channel` data model, `# 6` PSM allocation).

use std::collections::VecDeque;

/// 16-bit L2CAP channel id ([Vol 3] Part A, Section 2.1).
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[repr(transparent)]
pub struct Cid(pub(crate) u16);

impl Cid {
    /// Null channel id; never a valid source or destination.
    pub const NULL: Self = Self(0x0000);
    /// Classic (BR/EDR) signaling channel ([Vol 3] Part A, Section 2.1).
    pub const SIGNALING_BREDR: Self = Self(0x0001);
    /// Connectionless data channel; not used by this stack.
    pub const CONNECTIONLESS: Self = Self(0x0002);
    /// LE Attribute Protocol fixed channel.
    pub const ATT: Self = Self(0x0004);
    /// LE signaling channel.
    pub const SIGNALING_LE: Self = Self(0x0005);
    /// LE Security Manager Protocol fixed channel.
    pub const SMP_LE: Self = Self(0x0006);
    /// Start of the dynamic channel range, shared by BR/EDR (ACL-U) and LE
    /// (LE-U): `[0x0040, 0xFFFF)` (spec `# 3` `LogicalLink`).
    pub const DYNAMIC_MIN: u16 = 0x0040;
    /// Exclusive end of the dynamic channel range.
    pub const DYNAMIC_MAX: u16 = 0xFFFF;

    #[inline]
    #[must_use]
    pub(crate) const fn new(v: u16) -> Self {
        Self(v)
    }

    /// Returns whether this id lies in the dynamic channel range.
    #[inline]
    #[must_use]
    pub const fn is_dynamic(self) -> bool {
        self.0 >= Self::DYNAMIC_MIN && self.0 < Self::DYNAMIC_MAX
    }
}

impl From<Cid> for u16 {
    #[inline]
    fn from(c: Cid) -> Self {
        c.0
    }
}

impl From<u16> for Cid {
    #[inline]
    fn from(v: u16) -> Self {
        Self(v)
    }
}

/// Protocol/Service Multiplexer identifying the upper-layer protocol for a
/// dynamic channel ([Vol 3] Part A, Section 4.2; spec `# 6` PSM allocation).
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[repr(transparent)]
pub struct Psm(pub u16);

impl Psm {
    pub const SDP: Self = Self(0x0001);
    pub const RFCOMM: Self = Self(0x0003);
    pub const AVDTP: Self = Self(0x0019);

    /// Start of the dynamically-assigned PSM range.
    pub const DYNAMIC_MIN: u16 = 0x1001;

    /// Returns whether `self` is a well-formed PSM: odd lower byte, bit 0 of
    /// the upper byte clear ([Vol 3] Part A, Section 4.2).
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 & 0x0001 == 0x0001 && (self.0 >> 8) & 0x0001 == 0
    }

    /// Returns whether `self` is in the dynamically-assigned range.
    #[must_use]
    pub const fn is_dynamic(self) -> bool {
        self.0 >= Self::DYNAMIC_MIN
    }
}

/// L2CAP channel operating mode ([Vol 3] Part A, Section 5).
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Mode {
    #[default]
    Basic,
    EnhancedRetransmission,
}

/// Requested or negotiated per-channel parameters (spec `# 3` `Channel`,
/// `DynamicChannel`).
#[derive(Clone, Copy, Debug)]
pub struct ChannelParameters {
    pub mode: Mode,
    /// Requested/negotiated MTU for SDUs received by the local side.
    pub mtu: u16,
}

impl Default for ChannelParameters {
    fn default() -> Self {
        Self { mode: Mode::Basic, mtu: crate::l2cap::MIN_MTU_BREDR }
    }
}

/// A bidirectional SDU pipe, fixed or dynamic (spec `# 3` `Channel`).
///
/// Inbound SDUs delivered before an upper-layer owner has attached
/// ([`Self::attach`]) are queued and flushed in order on attach, per spec
/// `# 4.3` "Channel demux".
#[derive(Debug)]
pub struct Channel {
    pub(crate) local_cid: Cid,
    pub(crate) remote_cid: Option<Cid>,
    pub(crate) mode: Mode,
    pub(crate) tx_mtu: u16,
    pub(crate) rx_mtu: u16,
    pub(crate) fcs: bool,
    pending: VecDeque<Vec<u8>>,
    owner: Option<tokio::sync::mpsc::UnboundedSender<Vec<u8>>>,
    closed: bool,
}

impl Channel {
    pub(crate) fn new(local_cid: Cid, rx_mtu: u16) -> Self {
        Self {
            local_cid,
            remote_cid: None,
            mode: Mode::Basic,
            tx_mtu: crate::l2cap::MIN_MTU_BREDR,
            rx_mtu,
            fcs: false,
            pending: VecDeque::new(),
            owner: None,
            closed: false,
        }
    }

    /// Local channel id.
    #[must_use]
    pub const fn cid(&self) -> Cid {
        self.local_cid
    }

    /// Remote channel id, valid only once configuration has completed for
    /// dynamic channels.
    #[must_use]
    pub const fn remote_cid(&self) -> Option<Cid> {
        self.remote_cid
    }

    /// Attaches an upper-layer owner, flushing any SDUs queued before attach
    /// in arrival order.
    pub(crate) fn attach(&mut self) -> (tokio::sync::mpsc::UnboundedReceiver<Vec<u8>>, Vec<Vec<u8>>) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let queued = self.pending.drain(..).collect();
        self.owner = Some(tx);
        (rx, queued)
    }

    /// Delivers an inbound SDU, queuing it if no owner has attached yet.
    pub(crate) fn deliver(&mut self, sdu: Vec<u8>) {
        match &self.owner {
            Some(tx) if tx.send(sdu).is_ok() => {}
            Some(_) => {} // owner dropped; treat as closed, drop silently
            None => self.pending.push_back(sdu),
        }
    }

    /// Marks the channel closed, e.g. on link error (spec `# 4.3` error
    /// handling: "calls `OnClosed` on every channel").
    pub(crate) fn close(&mut self) {
        self.closed = true;
        self.owner = None;
    }

    #[must_use]
    pub(crate) const fn is_closed(&self) -> bool {
        self.closed
    }
}
