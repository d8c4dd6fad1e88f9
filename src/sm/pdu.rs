//! SMP PDU framing ([Vol 3] Part H, Section 3). Every PDU on the SMP fixed
//! channel is a single L2CAP B-frame: one code octet followed directly by
//! the command's fixed-size payload — no signaling-style id/length header,
//! since the L2CAP frame itself already delimits the PDU.

use structbuf::Packer;

use crate::le::RawAddr;

/// SMP command codes ([Vol 3] Part H, Section 3.3).
#[derive(Clone, Copy, Debug, Eq, PartialEq, num_enum::FromPrimitive, num_enum::IntoPrimitive)]
#[repr(u8)]
pub enum Code {
    PairingRequest = 0x01,
    PairingResponse = 0x02,
    PairingConfirm = 0x03,
    PairingRandom = 0x04,
    PairingFailed = 0x05,
    EncryptionInformation = 0x06,
    MasterIdentification = 0x07,
    IdentityInformation = 0x08,
    IdentityAddressInformation = 0x09,
    SigningInformation = 0x0A,
    SecurityRequest = 0x0B,
    PairingPublicKey = 0x0C,
    PairingDhKeyCheck = 0x0D,
    PairingKeypressNotification = 0x0E,
    #[num_enum(default)]
    Unknown = 0x00,
}

/// `Pairing_Failed` reason code ([Vol 3] Part H, Section 3.5.5), also the
/// crate-wide protocol error code for SMP (spec `# 7`).
#[derive(Clone, Copy, Debug, Eq, PartialEq, num_enum::FromPrimitive, num_enum::IntoPrimitive)]
#[non_exhaustive]
#[repr(u8)]
pub enum Reason {
    PasskeyEntryFailed = 0x01,
    OobNotAvailable = 0x02,
    AuthenticationRequirements = 0x03,
    ConfirmValueFailed = 0x04,
    PairingNotSupported = 0x05,
    EncryptionKeySize = 0x06,
    CommandNotSupported = 0x07,
    UnspecifiedReason = 0x08,
    RepeatedAttempts = 0x09,
    InvalidParameters = 0x0A,
    DhKeyCheckFailed = 0x0B,
    NumericComparisonFailed = 0x0C,
    BrEdrPairingInProgress = 0x0D,
    CrossTransportKeyDerivationNotAllowed = 0x0E,
    #[num_enum(default)]
    Unknown = 0xFF,
}

/// IO capability octet carried in `Pairing_Request`/`Response`
/// ([Vol 3] Part H, Section 2.3.3, Table 2.7).
#[derive(Clone, Copy, Debug, Eq, PartialEq, num_enum::FromPrimitive, num_enum::IntoPrimitive)]
#[repr(u8)]
pub enum IoCapability {
    DisplayOnly = 0x00,
    DisplayYesNo = 0x01,
    KeyboardOnly = 0x02,
    NoInputNoOutput = 0x03,
    KeyboardDisplay = 0x04,
    #[num_enum(default)]
    Unknown = 0xFF,
}

bitflags::bitflags! {
    /// `AuthReq` bitfield ([Vol 3] Part H, Section 3.5.1, Table 3.3).
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct AuthReq: u8 {
        const BONDING        = 0b0000_0001;
        const MITM           = 0b0000_0100;
        const SC             = 0b0000_1000;
        const KEYPRESS       = 0b0001_0000;
        const CT2            = 0b0010_0000;
    }
}

bitflags::bitflags! {
    /// Key-distribution/generation bitfield ([Vol 3] Part H, Section 3.6.1,
    /// Table 3.9), used for both initiator and responder fields.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct KeyDistribution: u8 {
        const ENC_KEY  = 0b0000_0001;
        const ID_KEY   = 0b0000_0010;
        const SIGN_KEY = 0b0000_0100;
        const LINK_KEY = 0b0000_1000;
    }
}

/// `Keypress_Notification` type octet ([Vol 3] Part H, Section 3.5.8).
#[derive(Clone, Copy, Debug, Eq, PartialEq, num_enum::FromPrimitive, num_enum::IntoPrimitive)]
#[repr(u8)]
pub enum KeypressNotificationType {
    PasskeyEntryStarted = 0x00,
    PasskeyDigitEntered = 0x01,
    PasskeyDigitErased = 0x02,
    PasskeyCleared = 0x03,
    PasskeyEntryCompleted = 0x04,
    #[num_enum(default)]
    Unknown = 0xFF,
}

/// Encodes a complete SMP PDU: one code octet followed by `payload`.
fn encode_pdu(code: Code, payload: impl FnOnce(&mut Packer)) -> Vec<u8> {
    let mut scratch = [0u8; 128];
    let n = {
        let mut p = Packer::new(&mut scratch[..]);
        p.u8(code.into());
        payload(&mut p);
        p.len()
    };
    scratch[..n].to_vec()
}

/// A decoded SMP PDU header plus its raw payload (everything after the code
/// octet).
#[derive(Clone, Debug)]
pub(crate) struct RawPdu {
    pub code: Code,
    pub payload: Vec<u8>,
}

impl TryFrom<&[u8]> for RawPdu {
    type Error = ();

    fn try_from(raw: &[u8]) -> Result<Self, Self::Error> {
        let (&code, payload) = raw.split_first().ok_or(())?;
        Ok(Self { code: Code::from(code), payload: payload.to_vec() })
    }
}

/// `Pairing_Request`/`Pairing_Response` payload ([Vol 3] Part H,
/// Section 3.5.1).
#[derive(Clone, Copy, Debug)]
pub(crate) struct PairingFeatures {
    pub io_capability: IoCapability,
    pub oob_data_present: bool,
    pub auth_req: AuthReq,
    pub max_encryption_key_size: u8,
    pub initiator_key_distribution: KeyDistribution,
    pub responder_key_distribution: KeyDistribution,
}

impl PairingFeatures {
    pub(crate) fn decode(payload: &[u8]) -> Option<Self> {
        (payload.len() >= 6).then(|| Self {
            io_capability: IoCapability::from(payload[0]),
            oob_data_present: payload[1] != 0,
            auth_req: AuthReq::from_bits_truncate(payload[2]),
            max_encryption_key_size: payload[3],
            initiator_key_distribution: KeyDistribution::from_bits_truncate(payload[4]),
            responder_key_distribution: KeyDistribution::from_bits_truncate(payload[5]),
        })
    }

    pub(crate) fn encode(self, request: bool) -> Vec<u8> {
        let code = if request { Code::PairingRequest } else { Code::PairingResponse };
        encode_pdu(code, |p| {
            p.u8(self.io_capability.into())
                .u8(u8::from(self.oob_data_present))
                .u8(self.auth_req.bits())
                .u8(self.max_encryption_key_size)
                .u8(self.initiator_key_distribution.bits())
                .u8(self.responder_key_distribution.bits());
        })
    }
}

/// `Security_Request` payload ([Vol 3] Part H, Section 3.6.11).
pub(crate) fn encode_security_request(auth_req: AuthReq) -> Vec<u8> {
    encode_pdu(Code::SecurityRequest, |p| {
        p.u8(auth_req.bits());
    })
}

pub(crate) fn decode_security_request(payload: &[u8]) -> Option<AuthReq> {
    payload.first().map(|&b| AuthReq::from_bits_truncate(b))
}

/// `Pairing_Confirm` / `Pairing_Random` payload: a single 128-bit value.
pub(crate) fn encode_value16(code: Code, value: &[u8; 16]) -> Vec<u8> {
    encode_pdu(code, |p| {
        p.put(&value[..]);
    })
}

pub(crate) fn decode_value16(payload: &[u8]) -> Option<[u8; 16]> {
    payload.get(..16)?.try_into().ok()
}

/// `Pairing_Failed` payload ([Vol 3] Part H, Section 3.5.5).
pub(crate) fn encode_pairing_failed(reason: Reason) -> Vec<u8> {
    encode_pdu(Code::PairingFailed, |p| {
        p.u8(reason.into());
    })
}

pub(crate) fn decode_pairing_failed(payload: &[u8]) -> Option<Reason> {
    payload.first().copied().map(Reason::from)
}

/// `Pairing_Public_Key` payload ([Vol 3] Part H, Section 3.5.6): the wire
/// order is little-endian X followed by little-endian Y, each reversed from
/// the big-endian form `sapphire_crypto::PublicKey` stores.
pub(crate) fn encode_public_key(key: &sapphire_crypto::PublicKey) -> Vec<u8> {
    encode_pdu(Code::PairingPublicKey, |p| {
        let raw = key.as_raw();
        let mut x = raw[..32].to_vec();
        let mut y = raw[32..].to_vec();
        x.reverse();
        y.reverse();
        p.put(&x[..]).put(&y[..]);
    })
}

pub(crate) fn decode_public_key(payload: &[u8]) -> Option<sapphire_crypto::PublicKey> {
    if payload.len() < 64 {
        return None;
    }
    let mut raw = [0u8; 64];
    raw[..32].copy_from_slice(&payload[..32]);
    raw[32..].copy_from_slice(&payload[32..64]);
    raw[..32].reverse();
    raw[32..].reverse();
    Some(sapphire_crypto::PublicKey::from_raw(raw))
}

/// `Pairing_DHKey_Check` payload ([Vol 3] Part H, Section 3.5.7): a single
/// 128-bit check value.
pub(crate) fn encode_dhkey_check(value: &[u8; 16]) -> Vec<u8> {
    encode_value16(Code::PairingDhKeyCheck, value)
}

/// `Keypress_Notification` payload ([Vol 3] Part H, Section 3.5.8).
pub(crate) fn encode_keypress_notification(ty: KeypressNotificationType) -> Vec<u8> {
    encode_pdu(Code::PairingKeypressNotification, |p| {
        p.u8(ty.into());
    })
}

pub(crate) fn decode_keypress_notification(payload: &[u8]) -> Option<KeypressNotificationType> {
    payload.first().copied().map(KeypressNotificationType::from)
}

/// `Encryption_Information` payload ([Vol 3] Part H, Section 3.6.2): the LTK.
pub(crate) fn encode_encryption_information(ltk: &[u8; 16]) -> Vec<u8> {
    encode_value16(Code::EncryptionInformation, ltk)
}

pub(crate) fn decode_encryption_information(payload: &[u8]) -> Option<[u8; 16]> {
    decode_value16(payload)
}

/// `Master_Identification` payload ([Vol 3] Part H, Section 3.6.3): `EDIV`
/// and `Rand` that accompany the LTK.
#[derive(Clone, Copy, Debug)]
pub(crate) struct MasterIdentification {
    pub ediv: u16,
    pub rand: u64,
}

impl MasterIdentification {
    pub(crate) fn decode(payload: &[u8]) -> Option<Self> {
        (payload.len() >= 10).then(|| Self {
            ediv: u16::from_le_bytes([payload[0], payload[1]]),
            rand: u64::from_le_bytes(payload[2..10].try_into().expect("10 bytes")),
        })
    }

    pub(crate) fn encode(self) -> Vec<u8> {
        encode_pdu(Code::MasterIdentification, |p| {
            p.u16(self.ediv).u64(self.rand);
        })
    }
}

/// `Identity_Information` payload ([Vol 3] Part H, Section 3.6.4): the IRK.
pub(crate) fn encode_identity_information(irk: &[u8; 16]) -> Vec<u8> {
    encode_value16(Code::IdentityInformation, irk)
}

pub(crate) fn decode_identity_information(payload: &[u8]) -> Option<[u8; 16]> {
    decode_value16(payload)
}

/// `Identity_Address_Information` payload ([Vol 3] Part H, Section 3.6.5).
#[derive(Clone, Copy, Debug)]
pub(crate) struct IdentityAddressInformation {
    pub is_random: bool,
    pub addr: RawAddr,
}

impl IdentityAddressInformation {
    pub(crate) fn decode(payload: &[u8]) -> Option<Self> {
        if payload.len() < 7 {
            return None;
        }
        let mut addr_bytes = [0u8; 6];
        addr_bytes.copy_from_slice(&payload[1..7]);
        Some(Self { is_random: payload[0] != 0, addr: RawAddr(addr_bytes) })
    }

    pub(crate) fn encode(self) -> Vec<u8> {
        encode_pdu(Code::IdentityAddressInformation, |p| {
            p.u8(u8::from(self.is_random)).put(&self.addr.0[..]);
        })
    }
}

/// `Signing_Information` payload ([Vol 3] Part H, Section 3.6.6): the CSRK.
pub(crate) fn encode_signing_information(csrk: &[u8; 16]) -> Vec<u8> {
    encode_value16(Code::SigningInformation, csrk)
}

pub(crate) fn decode_signing_information(payload: &[u8]) -> Option<[u8; 16]> {
    decode_value16(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pairing_request_round_trips() {
        let req = PairingFeatures {
            io_capability: IoCapability::DisplayYesNo,
            oob_data_present: false,
            auth_req: AuthReq::BONDING | AuthReq::SC,
            max_encryption_key_size: 16,
            initiator_key_distribution: KeyDistribution::ENC_KEY | KeyDistribution::ID_KEY,
            responder_key_distribution: KeyDistribution::ENC_KEY,
        };
        let raw = req.encode(true);
        let pdu = RawPdu::try_from(&raw[..]).unwrap();
        assert_eq!(pdu.code, Code::PairingRequest);
        let decoded = PairingFeatures::decode(&pdu.payload).unwrap();
        assert_eq!(decoded.io_capability, req.io_capability);
        assert_eq!(decoded.auth_req, req.auth_req);
        assert_eq!(decoded.initiator_key_distribution, req.initiator_key_distribution);
    }

    #[test]
    fn pairing_failed_round_trips() {
        let raw = encode_pairing_failed(Reason::ConfirmValueFailed);
        let pdu = RawPdu::try_from(&raw[..]).unwrap();
        assert_eq!(pdu.code, Code::PairingFailed);
        assert_eq!(decode_pairing_failed(&pdu.payload), Some(Reason::ConfirmValueFailed));
    }

    #[test]
    fn public_key_round_trips() {
        let pair = sapphire_crypto::KeyPair::generate();
        let raw = encode_public_key(&pair.public());
        let pdu = RawPdu::try_from(&raw[..]).unwrap();
        let decoded = decode_public_key(&pdu.payload).unwrap();
        assert_eq!(decoded.as_raw(), pair.public().as_raw());
    }

    #[test]
    fn master_identification_round_trips() {
        let mi = MasterIdentification { ediv: 0x1234, rand: 0x1122_3344_5566_7788 };
        let raw = mi.encode();
        let pdu = RawPdu::try_from(&raw[..]).unwrap();
        let decoded = MasterIdentification::decode(&pdu.payload).unwrap();
        assert_eq!(decoded.ediv, mi.ediv);
        assert_eq!(decoded.rand, mi.rand);
    }
}
