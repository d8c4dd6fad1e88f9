//! ACL fragmentation and recombination ([SPEC_FULL.md] C4).
//!
//! Outbound: an SDU longer than the controller's ACL data MTU is split into
//! a `FirstNonFlushable` fragment followed by `Continuing` fragments, all
//! tagged `PointToPoint`, emitted as one atomic group to
//! [`crate::hci::AclDataChannel`]. Inbound: fragments are buffered per
//! handle until the declared L2CAP length is satisfied, then one PDU is
//! emitted (spec `# 4.3`).

use std::collections::HashMap;

use smallvec::SmallVec;
use structbuf::Packer;
use tracing::warn;

use crate::hci::ConnHandle;

/// Packet Boundary flag ([Vol 4] Part E, Section 5.4.2).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
enum PbFlag {
    FirstNonFlushable = 0b00,
    Continuing = 0b01,
}

/// Broadcast flag; only `PointToPoint` is ever produced by the host.
const BC_POINT_TO_POINT: u8 = 0b00;

/// Splits one L2CAP SDU into ACL data fragments no larger than `acl_mtu`
/// octets of payload each, tagging the first `FirstNonFlushable` and the
/// rest `Continuing`. Returns the whole fragment list so the caller can hand
/// it to the ACL scheduler as one atomic submission (spec `# 4.2` "ACL PDUs
/// that form one L2CAP SDU fragment must be enqueued as one atomic group").
pub(crate) fn fragment(handle: ConnHandle, cid: u16, sdu: &[u8], acl_mtu: u16) -> SmallVec<[Vec<u8>; 4]> {
    let acl_mtu = usize::from(acl_mtu.max(1));
    let mut l2cap_frame = vec![0u8; 4];
    {
        let mut p = Packer::new(&mut l2cap_frame[..]);
        p.u16(u16::try_from(sdu.len()).unwrap_or(u16::MAX)).u16(cid);
    }
    l2cap_frame.extend_from_slice(sdu);

    let mut out = SmallVec::new();
    let mut pb = PbFlag::FirstNonFlushable;
    for chunk in l2cap_frame.chunks(acl_mtu) {
        let mut frag = vec![0u8; 4 + chunk.len()];
        let handle_and_flags = (u16::from(handle) & 0x0FFF) | (u16::from(pb as u8) << 12) | (u16::from(BC_POINT_TO_POINT) << 14);
        let mut p = Packer::new(&mut frag[..]);
        p.u16(handle_and_flags)
            .u16(u16::try_from(chunk.len()).unwrap_or(u16::MAX))
            .put(chunk);
        out.push(frag);
        pb = PbFlag::Continuing;
    }
    out
}

/// One handle's in-progress recombination buffer.
#[derive(Default)]
struct Partial {
    declared_len: Option<u16>,
    cid: u16,
    buf: Vec<u8>,
}

/// Reassembles ACL fragments keyed by connection handle back into complete
/// L2CAP PDUs (spec `# 4.3` "Recombiner").
#[derive(Default)]
pub(crate) struct Recombiner {
    partial: HashMap<ConnHandle, Partial>,
    errors: u64,
}

/// One fully reassembled inbound L2CAP PDU.
pub(crate) struct Pdu {
    pub cid: u16,
    pub payload: Vec<u8>,
}

impl Recombiner {
    /// Feeds one ACL data fragment for `handle`. Returns `Ok(Some(pdu))` once
    /// a complete PDU has been reassembled, `Ok(None)` if more fragments are
    /// needed, or `Err` if the fragment is malformed or violates the
    /// recombination protocol (length overflow, unexpected continuation);
    /// the offending buffer is discarded and an error counter incremented.
    pub(crate) fn feed(&mut self, handle: ConnHandle, acl: &[u8]) -> Result<Option<Pdu>, RecombineError> {
        if acl.len() < 4 {
            return Err(self.fail());
        }
        let handle_and_flags = u16::from_le_bytes([acl[0], acl[1]]);
        let bc = (handle_and_flags >> 14) & 0b11;
        if bc != u16::from(BC_POINT_TO_POINT) {
            // Broadcast ACL packets are dropped, not an error.
            return Ok(None);
        }
        let pb = (handle_and_flags >> 12) & 0b11;
        let len = usize::from(u16::from_le_bytes([acl[2], acl[3]]));
        let rest = &acl[4..];
        if rest.len() < len {
            return Err(self.fail());
        }
        let payload = &rest[..len];

        match pb {
            0b00 => {
                // FirstNonFlushable: starts a new PDU. A partial buffer still
                // outstanding for this handle is an unexpected-continuation
                // protocol violation and is discarded.
                if self.partial.remove(&handle).is_some() {
                    warn!(?handle, "discarded incomplete L2CAP recombination buffer");
                }
                if payload.len() < 4 {
                    return Err(self.fail());
                }
                let declared_len = u16::from_le_bytes([payload[0], payload[1]]);
                let cid = u16::from_le_bytes([payload[2], payload[3]]);
                let body = &payload[4..];
                let mut partial = Partial { declared_len: Some(declared_len), cid, buf: Vec::with_capacity(usize::from(declared_len)) };
                partial.buf.extend_from_slice(body);
                if partial.buf.len() > usize::from(declared_len) {
                    return Err(self.fail());
                }
                let done = partial.buf.len() == usize::from(declared_len);
                if done {
                    return Ok(Some(Pdu { cid: partial.cid, payload: partial.buf }));
                }
                self.partial.insert(handle, partial);
                Ok(None)
            }
            0b01 => {
                let Some(partial) = self.partial.get_mut(&handle) else {
                    // Continuation with no preceding first fragment.
                    return Err(self.fail());
                };
                let Some(declared_len) = partial.declared_len else {
                    return Err(self.fail());
                };
                partial.buf.extend_from_slice(payload);
                if partial.buf.len() > usize::from(declared_len) {
                    self.partial.remove(&handle);
                    return Err(self.fail());
                }
                if partial.buf.len() == usize::from(declared_len) {
                    let partial = self.partial.remove(&handle).expect("just matched");
                    return Ok(Some(Pdu { cid: partial.cid, payload: partial.buf }));
                }
                Ok(None)
            }
            _ => Err(self.fail()),
        }
    }

    fn fail(&mut self) -> RecombineError {
        self.errors += 1;
        RecombineError
    }

    #[must_use]
    pub(crate) const fn error_count(&self) -> u64 {
        self.errors
    }
}

/// A recombination protocol violation. Always fatal for the offending
/// handle's buffer; the caller decides whether the whole link is torn down
/// (spec `# 4.3`: "A recombination error ... increments a counter and the
/// offending buffer is discarded").
#[derive(Clone, Copy, Debug, thiserror::Error)]
#[error("L2CAP recombination error")]
pub(crate) struct RecombineError;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragment_splits_on_acl_mtu_and_concatenates_back() {
        let handle = ConnHandle::new(0x0001).unwrap();
        let sdu = vec![0xAB; 50];
        let frags = fragment(handle, 0x0040, &sdu, 20);
        assert!(frags.len() > 1);

        let mut rc = Recombiner::default();
        let mut got = None;
        for f in &frags {
            if let Some(pdu) = rc.feed(handle, f).unwrap() {
                got = Some(pdu);
            }
        }
        let pdu = got.expect("PDU reassembled");
        assert_eq!(pdu.cid, 0x0040);
        assert_eq!(pdu.payload, sdu);
    }

    #[test]
    fn unexpected_continuation_is_an_error() {
        let handle = ConnHandle::new(0x0001).unwrap();
        let mut rc = Recombiner::default();
        // A bare "Continuing" fragment with no prior first fragment.
        let mut frag = Vec::new();
        let handle_and_flags = u16::from(handle) | (1u16 << 12);
        Packer::new(&mut frag).u16(handle_and_flags).u16(2).put(&[1, 2][..]);
        assert!(rc.feed(handle, &frag).is_err());
        assert_eq!(rc.error_count(), 1);
    }

    #[test]
    fn broadcast_packets_are_dropped_silently() {
        let handle = ConnHandle::new(0x0001).unwrap();
        let mut rc = Recombiner::default();
        let mut frag = Vec::new();
        let handle_and_flags = u16::from(handle) | (0b10u16 << 14);
        Packer::new(&mut frag).u16(handle_and_flags).u16(0);
        assert!(rc.feed(handle, &frag).unwrap().is_none());
        assert_eq!(rc.error_count(), 0);
    }
}
