//! ATT PDU opcodes and codecs ([Vol 3] Part F, Section 3).

use structbuf::{Packer, Unpacker};

/// ATT opcode octet: method (bits 0-5), command flag (bit 6), authenticated-
/// signed-write flag (bit 7).
#[derive(Clone, Copy, Debug, Eq, PartialEq, num_enum::FromPrimitive, num_enum::IntoPrimitive)]
#[repr(u8)]
pub enum Opcode {
    ErrorResponse = 0x01,
    ExchangeMtuRequest = 0x02,
    ExchangeMtuResponse = 0x03,
    FindInformationRequest = 0x04,
    FindInformationResponse = 0x05,
    FindByTypeValueRequest = 0x06,
    FindByTypeValueResponse = 0x07,
    ReadByTypeRequest = 0x08,
    ReadByTypeResponse = 0x09,
    ReadRequest = 0x0A,
    ReadResponse = 0x0B,
    ReadBlobRequest = 0x0C,
    ReadBlobResponse = 0x0D,
    ReadByGroupTypeRequest = 0x10,
    ReadByGroupTypeResponse = 0x11,
    WriteRequest = 0x12,
    WriteResponse = 0x13,
    WriteCommand = 0x52,
    PrepareWriteRequest = 0x16,
    PrepareWriteResponse = 0x17,
    ExecuteWriteRequest = 0x18,
    ExecuteWriteResponse = 0x19,
    HandleValueNotification = 0x1B,
    HandleValueIndication = 0x1D,
    HandleValueConfirmation = 0x1E,
    #[num_enum(default)]
    Unknown = 0x00,
}

impl Opcode {
    /// Returns whether the opcode is one this bearer expects an immediate
    /// response for, i.e. everything except commands and server-initiated
    /// notifications/confirmations.
    #[must_use]
    pub const fn is_request(self) -> bool {
        matches!(
            self,
            Self::ExchangeMtuRequest
                | Self::FindInformationRequest
                | Self::FindByTypeValueRequest
                | Self::ReadByTypeRequest
                | Self::ReadRequest
                | Self::ReadBlobRequest
                | Self::ReadByGroupTypeRequest
                | Self::WriteRequest
                | Self::PrepareWriteRequest
                | Self::ExecuteWriteRequest
        )
    }
}

/// ATT error code ([Vol 3] Part F, Section 3.4.1.1).
#[derive(Clone, Copy, Debug, Eq, PartialEq, num_enum::FromPrimitive, num_enum::IntoPrimitive)]
#[non_exhaustive]
#[repr(u8)]
pub enum ErrorCode {
    InvalidHandle = 0x01,
    ReadNotPermitted = 0x02,
    WriteNotPermitted = 0x03,
    InvalidPdu = 0x04,
    InsufficientAuthentication = 0x05,
    RequestNotSupported = 0x06,
    InvalidOffset = 0x07,
    InsufficientAuthorization = 0x08,
    PrepareQueueFull = 0x09,
    AttributeNotFound = 0x0A,
    AttributeNotLong = 0x0B,
    InsufficientEncryptionKeySize = 0x0C,
    InvalidAttributeValueLength = 0x0D,
    UnlikelyError = 0x0E,
    InsufficientEncryption = 0x0F,
    UnsupportedGroupType = 0x10,
    InsufficientResources = 0x11,
    #[num_enum(default)]
    Other = 0xFF,
}

/// `ErrorResponse` payload.
#[derive(Clone, Copy, Debug)]
pub struct ErrorResponse {
    pub opcode: Opcode,
    pub handle: u16,
    pub error: ErrorCode,
}

impl ErrorResponse {
    #[must_use]
    pub fn encode(self) -> Vec<u8> {
        let mut out = vec![0u8; 5];
        Packer::new(&mut out[..])
            .u8(Opcode::ErrorResponse.into())
            .u8(self.opcode.into())
            .u16(self.handle)
            .u8(self.error.into());
        out
    }

    #[must_use]
    pub fn decode(pdu: &[u8]) -> Option<Self> {
        (pdu.len() == 5 && pdu[0] == u8::from(Opcode::ErrorResponse)).then(|| Self {
            opcode: Opcode::from(pdu[1]),
            handle: u16::from_le_bytes([pdu[2], pdu[3]]),
            error: ErrorCode::from(pdu[4]),
        })
    }
}

/// One `(start, end)` handle range attribute group returned by
/// `ReadByGroupTypeResponse` or an attribute found by
/// `FindByTypeValueResponse`.
#[derive(Clone, Copy, Debug)]
pub struct HandleRange {
    pub start: u16,
    pub end: u16,
}

/// A decoded `ReadByGroupTypeResponse` entry: handle range plus the group's
/// declaration value (e.g. a service UUID).
#[derive(Clone, Debug)]
pub struct GroupAttribute {
    pub range: HandleRange,
    pub value: Vec<u8>,
}

/// A decoded `ReadByTypeResponse`/`FindInformationResponse` entry.
#[derive(Clone, Debug)]
pub struct Attribute {
    pub handle: u16,
    pub value: Vec<u8>,
}

pub fn encode_exchange_mtu_request(mtu: u16) -> Vec<u8> {
    let mut out = vec![0u8; 3];
    Packer::new(&mut out[..]).u8(Opcode::ExchangeMtuRequest.into()).u16(mtu);
    out
}

pub fn decode_exchange_mtu_response(pdu: &[u8]) -> Option<u16> {
    (pdu.len() == 3).then(|| u16::from_le_bytes([pdu[1], pdu[2]]))
}

pub fn encode_read_by_group_type_request(start: u16, end: u16, group_type: &[u8]) -> Vec<u8> {
    let mut out = vec![0u8; 5 + group_type.len()];
    Packer::new(&mut out[..]).u8(Opcode::ReadByGroupTypeRequest.into()).u16(start).u16(end).put(group_type);
    out
}

/// Decodes a `ReadByGroupTypeResponse`, whose attribute data length is fixed
/// across all entries in one PDU ([Vol 3] Part F, Section 3.4.4.2).
pub fn decode_read_by_group_type_response(pdu: &[u8]) -> Option<Vec<GroupAttribute>> {
    if pdu.len() < 2 {
        return None;
    }
    let entry_len = usize::from(pdu[1]);
    if entry_len < 4 {
        return None;
    }
    let mut u = Unpacker::new(&pdu[2..]);
    let mut out = Vec::new();
    while u.len() >= entry_len {
        let start = u.u16();
        let end = u.u16();
        let value = u.as_ref()[..entry_len - 4].to_vec();
        let _ = u.skip(entry_len - 4);
        out.push(GroupAttribute { range: HandleRange { start, end }, value });
    }
    Some(out)
}

pub fn encode_read_by_type_request(start: u16, end: u16, attr_type: &[u8]) -> Vec<u8> {
    let mut out = vec![0u8; 5 + attr_type.len()];
    Packer::new(&mut out[..]).u8(Opcode::ReadByTypeRequest.into()).u16(start).u16(end).put(attr_type);
    out
}

/// Decodes a `ReadByTypeResponse`. Per [Vol 3] Part G, Section 4.8.2 (spec
/// `# 4.4`: "handles in result are ... strictly increasing"), a handle that
/// doesn't increase over the previous entry in the same response is
/// malformed and fails the whole decode; range-membership against the
/// original request is the caller's responsibility since this layer doesn't
/// know the request bounds.
pub fn decode_read_by_type_response(pdu: &[u8]) -> Option<Vec<Attribute>> {
    if pdu.len() < 2 {
        return None;
    }
    let entry_len = usize::from(pdu[1]);
    if entry_len < 2 {
        return None;
    }
    let mut u = Unpacker::new(&pdu[2..]);
    let mut out: Vec<Attribute> = Vec::new();
    while u.len() >= entry_len {
        let handle = u.u16();
        if out.last().is_some_and(|prev| handle <= prev.handle) {
            return None;
        }
        let value = u.as_ref()[..entry_len - 2].to_vec();
        let _ = u.skip(entry_len - 2);
        out.push(Attribute { handle, value });
    }
    Some(out)
}

pub fn encode_find_information_request(start: u16, end: u16) -> Vec<u8> {
    let mut out = vec![0u8; 5];
    Packer::new(&mut out[..]).u8(Opcode::FindInformationRequest.into()).u16(start).u16(end);
    out
}

/// `FindInformationResponse` entry, 16- or 128-bit UUID per the format octet.
#[derive(Clone, Debug)]
pub struct InformationEntry {
    pub handle: u16,
    pub uuid: Vec<u8>,
}

pub fn decode_find_information_response(pdu: &[u8]) -> Option<Vec<InformationEntry>> {
    if pdu.len() < 2 {
        return None;
    }
    let uuid_len = match pdu[1] {
        0x01 => 2,
        0x02 => 16,
        _ => return None,
    };
    let mut u = Unpacker::new(&pdu[2..]);
    let mut out = Vec::new();
    while u.len() >= 2 + uuid_len {
        let handle = u.u16();
        let uuid = u.as_ref()[..uuid_len].to_vec();
        let _ = u.skip(uuid_len);
        out.push(InformationEntry { handle, uuid });
    }
    Some(out)
}

pub fn encode_read_request(handle: u16) -> Vec<u8> {
    let mut out = vec![0u8; 3];
    Packer::new(&mut out[..]).u8(Opcode::ReadRequest.into()).u16(handle);
    out
}

pub fn decode_read_response(pdu: &[u8]) -> Option<&[u8]> {
    (!pdu.is_empty()).then(|| &pdu[1..])
}

pub fn encode_read_blob_request(handle: u16, offset: u16) -> Vec<u8> {
    let mut out = vec![0u8; 5];
    Packer::new(&mut out[..]).u8(Opcode::ReadBlobRequest.into()).u16(handle).u16(offset);
    out
}

pub fn encode_write_request(handle: u16, value: &[u8], command: bool) -> Vec<u8> {
    let op = if command { Opcode::WriteCommand } else { Opcode::WriteRequest };
    let mut out = vec![0u8; 3 + value.len()];
    Packer::new(&mut out[..]).u8(op.into()).u16(handle).put(value);
    out
}

pub fn encode_prepare_write_request(handle: u16, offset: u16, value: &[u8]) -> Vec<u8> {
    let mut out = vec![0u8; 5 + value.len()];
    Packer::new(&mut out[..]).u8(Opcode::PrepareWriteRequest.into()).u16(handle).u16(offset).put(value);
    out
}

/// Decoded `PrepareWriteResponse`, echoed back so the caller can verify the
/// controller queued what it asked for before issuing `ExecuteWrite`.
#[derive(Clone, Debug)]
pub struct PreparedWrite {
    pub handle: u16,
    pub offset: u16,
    pub value: Vec<u8>,
}

pub fn decode_prepare_write_response(pdu: &[u8]) -> Option<PreparedWrite> {
    (pdu.len() >= 5).then(|| PreparedWrite {
        handle: u16::from_le_bytes([pdu[1], pdu[2]]),
        offset: u16::from_le_bytes([pdu[3], pdu[4]]),
        value: pdu[5..].to_vec(),
    })
}

pub fn encode_execute_write_request(execute: bool) -> Vec<u8> {
    let mut out = vec![0u8; 2];
    Packer::new(&mut out[..]).u8(Opcode::ExecuteWriteRequest.into()).u8(u8::from(execute));
    out
}

/// Decoded `HandleValueNotification`/`Indication`.
#[derive(Clone, Debug)]
pub struct HandleValue {
    pub handle: u16,
    pub value: Vec<u8>,
}

pub fn decode_handle_value(pdu: &[u8]) -> Option<HandleValue> {
    (pdu.len() >= 3).then(|| HandleValue { handle: u16::from_le_bytes([pdu[1], pdu[2]]), value: pdu[3..].to_vec() })
}

pub fn encode_handle_value_confirmation() -> Vec<u8> {
    vec![Opcode::HandleValueConfirmation.into()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_response_round_trips() {
        let resp = ErrorResponse { opcode: Opcode::ReadRequest, handle: 0x0012, error: ErrorCode::InvalidHandle };
        let encoded = resp.encode();
        let decoded = ErrorResponse::decode(&encoded).unwrap();
        assert_eq!(decoded.handle, 0x0012);
        assert_eq!(decoded.error, ErrorCode::InvalidHandle);
    }

    #[test]
    fn read_by_group_type_response_splits_fixed_width_entries() {
        let mut pdu = vec![0x11, 6];
        pdu.extend_from_slice(&1u16.to_le_bytes());
        pdu.extend_from_slice(&4u16.to_le_bytes());
        pdu.extend_from_slice(&0x1801u16.to_le_bytes());
        pdu.extend_from_slice(&5u16.to_le_bytes());
        pdu.extend_from_slice(&8u16.to_le_bytes());
        pdu.extend_from_slice(&0x1800u16.to_le_bytes());
        let groups = decode_read_by_group_type_response(&pdu).unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].range.start, 1);
        assert_eq!(groups[1].range.end, 8);
    }

    #[test]
    fn read_by_type_response_rejects_non_increasing_handles() {
        let mut pdu = vec![0x09, 4];
        pdu.extend_from_slice(&5u16.to_le_bytes());
        pdu.extend_from_slice(&0u16.to_le_bytes());
        pdu.extend_from_slice(&5u16.to_le_bytes()); // repeats the previous handle
        pdu.extend_from_slice(&0u16.to_le_bytes());
        assert!(decode_read_by_type_response(&pdu).is_none());
    }

    #[test]
    fn read_by_type_response_accepts_increasing_handles() {
        let mut pdu = vec![0x09, 4];
        pdu.extend_from_slice(&5u16.to_le_bytes());
        pdu.extend_from_slice(&0u16.to_le_bytes());
        pdu.extend_from_slice(&7u16.to_le_bytes());
        pdu.extend_from_slice(&0u16.to_le_bytes());
        let attrs = decode_read_by_type_response(&pdu).unwrap();
        assert_eq!(attrs.len(), 2);
    }
}
