//! L2CAP signaling command framing, identifier allocation, and RTX timer
//! ([SPEC_FULL.md] C7).

use std::time::Duration;

use structbuf::{Packer, Unpacker};
use tracing::warn;

use crate::l2cap::{Cid, Psm};

/// Response Timeout eXpired: how long a sender waits for a signaling
/// response before failing the request (spec `# 4.3`, `# 5` Timeouts).
pub const RTX_TIMEOUT: Duration = Duration::from_secs(60);

/// Signaling command codes in scope for this stack ([Vol 3] Part A,
/// Section 4).
#[derive(Clone, Copy, Debug, Eq, PartialEq, num_enum::FromPrimitive, num_enum::IntoPrimitive)]
#[repr(u8)]
pub enum Code {
    CommandReject = 0x01,
    ConnectionRequest = 0x02,
    ConnectionResponse = 0x03,
    ConfigurationRequest = 0x04,
    ConfigurationResponse = 0x05,
    DisconnectionRequest = 0x06,
    DisconnectionResponse = 0x07,
    EchoRequest = 0x08,
    EchoResponse = 0x09,
    InformationRequest = 0x0A,
    InformationResponse = 0x0B,
    #[num_enum(default)]
    Unknown = 0x00,
}

/// `CommandReject` reason, also used as the crate-wide protocol error code
/// for L2CAP signaling failures (spec `# 7`).
#[derive(Clone, Copy, Debug, Eq, PartialEq, num_enum::FromPrimitive, num_enum::IntoPrimitive)]
#[non_exhaustive]
#[repr(u16)]
pub enum RejectReason {
    NotUnderstood = 0x0000,
    SignalingMtuExceeded = 0x0001,
    InvalidCid = 0x0002,
    #[num_enum(default)]
    Other = 0xFFFF,
}

/// Result of a configuration negotiation round ([Vol 3] Part A,
/// Section 4.5).
#[derive(Clone, Copy, Debug, Eq, PartialEq, num_enum::FromPrimitive, num_enum::IntoPrimitive)]
#[repr(u16)]
pub enum ConfigResult {
    Success = 0x0000,
    UnacceptableParameters = 0x0001,
    Rejected = 0x0002,
    UnknownOptions = 0x0003,
    Pending = 0x0004,
    #[num_enum(default)]
    Other = 0xFFFF,
}

/// Result of a connection request ([Vol 3] Part A, Section 4.2).
#[derive(Clone, Copy, Debug, Eq, PartialEq, num_enum::FromPrimitive, num_enum::IntoPrimitive)]
#[repr(u16)]
pub enum ConnectionResult {
    Success = 0x0000,
    Pending = 0x0001,
    PsmNotSupported = 0x0002,
    SecurityBlock = 0x0003,
    NoResources = 0x0004,
    SourceCidAlreadyAllocated = 0x0006,
    #[num_enum(default)]
    Other = 0xFFFF,
}

/// Configuration option ([Vol 3] Part A, Section 5).
#[derive(Clone, Copy, Debug)]
pub enum ConfigOption {
    Mtu(u16),
    /// Retransmission-and-Flow-Control option: `(mode, tx_window,
    /// max_transmit, retransmission_timeout_ms, monitor_timeout_ms, mps)`.
    Rfc { mode: RfcMode, tx_window: u8, max_transmit: u8, retransmission_timeout: u16, monitor_timeout: u16, mps: u16 },
    /// An option type this stack doesn't interpret; carried verbatim so it
    /// can be echoed back per the "unknown option" rule.
    Unknown(u8, Vec<u8>),
}

/// RFC option `mode` octet ([Vol 3] Part A, Section 5.4).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum RfcMode {
    Basic = 0x00,
    EnhancedRetransmission = 0x03,
}

impl ConfigOption {
    const TYPE_MTU: u8 = 0x01;
    const TYPE_RFC: u8 = 0x04;

    fn encode(&self, p: &mut Packer) {
        match self {
            Self::Mtu(mtu) => {
                p.u8(Self::TYPE_MTU).u8(2).u16(*mtu);
            }
            Self::Rfc { mode, tx_window, max_transmit, retransmission_timeout, monitor_timeout, mps } => {
                p.u8(Self::TYPE_RFC)
                    .u8(9)
                    .u8(*mode as u8)
                    .u8(*tx_window)
                    .u8(*max_transmit)
                    .u16(*retransmission_timeout)
                    .u16(*monitor_timeout)
                    .u16(*mps);
            }
            Self::Unknown(ty, data) => {
                p.u8(*ty).u8(u8::try_from(data.len()).unwrap_or(0)).put(&data[..]);
            }
        }
    }

    /// Returns the option type octet, used to echo back unknown options.
    #[must_use]
    pub fn option_type(&self) -> u8 {
        match self {
            Self::Mtu(_) => Self::TYPE_MTU,
            Self::Rfc { .. } => Self::TYPE_RFC,
            Self::Unknown(ty, _) => *ty,
        }
    }
}

/// Parses the option list trailing a Configuration Request/Response.
pub(crate) fn parse_options(mut u: Unpacker<'_>) -> Vec<ConfigOption> {
    let mut out = Vec::new();
    while u.len() >= 2 {
        let ty = u.u8();
        let len = usize::from(u.u8());
        if u.len() < len {
            break;
        }
        let body = &u.as_ref()[..len];
        let opt = match (ty & 0x7F, len) {
            (0x01, 2) => ConfigOption::Mtu(u16::from_le_bytes([body[0], body[1]])),
            (0x04, 9) => ConfigOption::Rfc {
                mode: if body[0] == RfcMode::EnhancedRetransmission as u8 {
                    RfcMode::EnhancedRetransmission
                } else {
                    RfcMode::Basic
                },
                tx_window: body[1],
                max_transmit: body[2],
                retransmission_timeout: u16::from_le_bytes([body[3], body[4]]),
                monitor_timeout: u16::from_le_bytes([body[5], body[6]]),
                mps: u16::from_le_bytes([body[7], body[8]]),
            },
            _ => ConfigOption::Unknown(ty, body.to_vec()),
        };
        out.push(opt);
        let _ = u.skip(len);
    }
    out
}

/// Encodes a complete signaling command (code + identifier + length +
/// payload) ([Vol 3] Part A, Section 4).
pub(crate) fn encode_command(code: Code, id: u8, payload: impl FnOnce(&mut Packer)) -> Vec<u8> {
    let mut body = Vec::new();
    {
        let mut scratch = [0u8; 256];
        let n = {
            let mut p = Packer::new(&mut scratch[..]);
            payload(&mut p);
            p.len()
        };
        body.extend_from_slice(&scratch[..n]);
    }
    let mut out = vec![0u8; 4 + body.len()];
    let mut p = Packer::new(&mut out[..]);
    p.u8(code.into()).u8(id).u16(u16::try_from(body.len()).unwrap_or(u16::MAX)).put(&body[..]);
    out
}

/// A decoded signaling command header plus its raw payload.
#[derive(Clone, Debug)]
pub(crate) struct Command {
    pub code: Code,
    pub id: u8,
    pub payload: Vec<u8>,
}

impl TryFrom<&[u8]> for Command {
    type Error = ();

    fn try_from(raw: &[u8]) -> Result<Self, Self::Error> {
        if raw.len() < 4 {
            return Err(());
        }
        let code = Code::from(raw[0]);
        let id = raw[1];
        let len = usize::from(u16::from_le_bytes([raw[2], raw[3]]));
        let rest = &raw[4..];
        if rest.len() < len {
            return Err(());
        }
        Ok(Self { code, id, payload: rest[..len].to_vec() })
    }
}

/// Allocates signaling command identifiers `1..=255`, wrapping and skipping
/// 0 (spec `# 4.3` "Signaling").
#[derive(Debug, Default)]
pub(crate) struct IdAllocator {
    next: u8,
}

impl IdAllocator {
    pub(crate) fn next(&mut self) -> u8 {
        if self.next == 0 {
            self.next = 1;
        }
        let id = self.next;
        self.next = self.next.wrapping_add(1);
        id
    }
}

/// `L2CAP_ConnectionRequest` payload ([Vol 3] Part A, Section 4.2).
#[derive(Clone, Copy, Debug)]
pub(crate) struct ConnectionRequest {
    pub psm: Psm,
    pub scid: Cid,
}

impl ConnectionRequest {
    pub(crate) fn decode(payload: &[u8]) -> Option<Self> {
        (payload.len() >= 4).then(|| Self {
            psm: Psm(u16::from_le_bytes([payload[0], payload[1]])),
            scid: Cid::new(u16::from_le_bytes([payload[2], payload[3]])),
        })
    }

    pub(crate) fn encode(self, id: u8) -> Vec<u8> {
        encode_command(Code::ConnectionRequest, id, |p| {
            p.u16(self.psm.0).u16(self.scid.into());
        })
    }
}

/// `L2CAP_ConnectionResponse` payload ([Vol 3] Part A, Section 4.3).
#[derive(Clone, Copy, Debug)]
pub(crate) struct ConnectionResponse {
    pub dcid: Cid,
    pub scid: Cid,
    pub result: ConnectionResult,
    pub status: u16,
}

impl ConnectionResponse {
    pub(crate) fn decode(payload: &[u8]) -> Option<Self> {
        (payload.len() >= 8).then(|| Self {
            dcid: Cid::new(u16::from_le_bytes([payload[0], payload[1]])),
            scid: Cid::new(u16::from_le_bytes([payload[2], payload[3]])),
            result: ConnectionResult::from(u16::from_le_bytes([payload[4], payload[5]])),
            status: u16::from_le_bytes([payload[6], payload[7]]),
        })
    }

    pub(crate) fn encode(self, id: u8) -> Vec<u8> {
        encode_command(Code::ConnectionResponse, id, |p| {
            p.u16(self.dcid.into()).u16(self.scid.into()).u16(self.result.into()).u16(self.status);
        })
    }
}

/// `L2CAP_ConfigurationRequest` payload ([Vol 3] Part A, Section 4.4).
#[derive(Clone, Debug)]
pub(crate) struct ConfigurationRequest {
    pub dcid: Cid,
    pub flags: u16,
    pub options: Vec<ConfigOption>,
}

impl ConfigurationRequest {
    pub(crate) fn decode(payload: &[u8]) -> Option<Self> {
        if payload.len() < 4 {
            return None;
        }
        let dcid = Cid::new(u16::from_le_bytes([payload[0], payload[1]]));
        let flags = u16::from_le_bytes([payload[2], payload[3]]);
        let options = parse_options(Unpacker::new(&payload[4..]));
        Some(Self { dcid, flags, options })
    }

    pub(crate) fn encode(&self, id: u8) -> Vec<u8> {
        encode_command(Code::ConfigurationRequest, id, |p| {
            p.u16(self.dcid.into()).u16(self.flags);
            for opt in &self.options {
                opt.encode(p);
            }
        })
    }
}

/// `L2CAP_ConfigurationResponse` payload ([Vol 3] Part A, Section 4.5).
#[derive(Clone, Debug)]
pub(crate) struct ConfigurationResponse {
    pub scid: Cid,
    pub flags: u16,
    pub result: ConfigResult,
    pub options: Vec<ConfigOption>,
}

impl ConfigurationResponse {
    pub(crate) fn decode(payload: &[u8]) -> Option<Self> {
        if payload.len() < 6 {
            return None;
        }
        let scid = Cid::new(u16::from_le_bytes([payload[0], payload[1]]));
        let flags = u16::from_le_bytes([payload[2], payload[3]]);
        let result = ConfigResult::from(u16::from_le_bytes([payload[4], payload[5]]));
        let options = parse_options(Unpacker::new(&payload[6..]));
        Some(Self { scid, flags, result, options })
    }

    pub(crate) fn encode(&self, id: u8) -> Vec<u8> {
        encode_command(Code::ConfigurationResponse, id, |p| {
            p.u16(self.scid.into()).u16(self.flags).u16(self.result.into());
            for opt in &self.options {
                opt.encode(p);
            }
        })
    }
}

/// `L2CAP_DisconnectionRequest`/`Response` payload (identical shape)
/// ([Vol 3] Part A, Section 4.6 and 4.7).
#[derive(Clone, Copy, Debug)]
pub(crate) struct DisconnectionParams {
    pub dcid: Cid,
    pub scid: Cid,
}

impl DisconnectionParams {
    pub(crate) fn decode(payload: &[u8]) -> Option<Self> {
        (payload.len() >= 4).then(|| Self {
            dcid: Cid::new(u16::from_le_bytes([payload[0], payload[1]])),
            scid: Cid::new(u16::from_le_bytes([payload[2], payload[3]])),
        })
    }

    pub(crate) fn encode(self, code: Code, id: u8) -> Vec<u8> {
        encode_command(code, id, |p| {
            p.u16(self.dcid.into()).u16(self.scid.into());
        })
    }
}

/// `L2CAP_CommandRejectResponse` payload ([Vol 3] Part A, Section 4.1).
pub(crate) fn command_reject(id: u8, reason: RejectReason) -> Vec<u8> {
    encode_command(Code::CommandReject, id, |p| {
        p.u16(reason.into());
    })
}

/// `InformationRequest` type: only `ExtendedFeatures` is used by this stack
/// ([Vol 3] Part A, Section 4.10).
pub(crate) const INFO_TYPE_EXTENDED_FEATURES: u16 = 0x0002;

pub(crate) fn information_request(id: u8, info_type: u16) -> Vec<u8> {
    encode_command(Code::InformationRequest, id, |p| {
        p.u16(info_type);
    })
}

/// Decoded `InformationResponse` for the `ExtendedFeatures` info type.
#[derive(Clone, Copy, Debug)]
pub(crate) struct ExtendedFeaturesResponse {
    pub features: u32,
}

impl ExtendedFeaturesResponse {
    pub(crate) fn decode(payload: &[u8]) -> Option<Self> {
        if payload.len() < 8 {
            return None;
        }
        let info_type = u16::from_le_bytes([payload[0], payload[1]]);
        let result = u16::from_le_bytes([payload[2], payload[3]]);
        if info_type != INFO_TYPE_EXTENDED_FEATURES || result != 0 {
            warn!(?info_type, ?result, "unexpected InformationResponse");
            return Some(Self { features: 0 });
        }
        Some(Self { features: u32::from_le_bytes([payload[4], payload[5], payload[6], payload[7]]) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_allocator_wraps_and_skips_zero() {
        let mut a = IdAllocator::default();
        assert_eq!(a.next(), 1);
        a.next = 255;
        assert_eq!(a.next(), 255);
        assert_eq!(a.next(), 1);
    }

    #[test]
    fn connection_request_round_trips() {
        let req = ConnectionRequest { psm: Psm(0x0001), scid: Cid::new(0x0040) };
        let cmd = Command::try_from(&req.encode(7)[..]).unwrap();
        assert_eq!(cmd.id, 7);
        let decoded = ConnectionRequest::decode(&cmd.payload).unwrap();
        assert_eq!(decoded.psm, req.psm);
        assert_eq!(decoded.scid, req.scid);
    }

    #[test]
    fn configuration_request_round_trips_with_mtu_option() {
        let req = ConfigurationRequest { dcid: Cid::new(0x60a3), flags: 0, options: vec![ConfigOption::Mtu(672)] };
        let cmd = Command::try_from(&req.encode(3)[..]).unwrap();
        let decoded = ConfigurationRequest::decode(&cmd.payload).unwrap();
        assert_eq!(decoded.dcid, req.dcid);
        assert!(matches!(decoded.options[0], ConfigOption::Mtu(672)));
    }
}
