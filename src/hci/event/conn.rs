use sapphire_const::CompanyId;

use crate::le::RawAddr;

use super::*;

/// BR/EDR link type carried by `HCI_Connection_Complete` and
/// `HCI_Connection_Request` ([Vol 4] Part E, Section 7.7.3 and 7.7.4).
#[derive(Clone, Copy, Debug, Eq, PartialEq, num_enum::FromPrimitive, strum::Display)]
#[repr(u8)]
pub enum LinkType {
    Sco = 0x00,
    Acl = 0x01,
    #[num_enum(default)]
    EscoUnknown = 0xFF,
}

fn read_u32(e: &mut Event) -> u32 {
    let b0 = u32::from(e.u8());
    let b1 = u32::from(e.u8());
    let b2 = u32::from(e.u8());
    let b3 = u32::from(e.u8());
    b0 | b1 << 8 | b2 << 16 | b3 << 24
}

fn read_u64(e: &mut Event) -> u64 {
    let mut v = 0_u64;
    for i in 0..4 {
        v |= u64::from(e.u16()) << (16 * i);
    }
    v
}

fn read_arr16(e: &mut Event) -> [u8; 16] {
    let mut buf = [0_u8; 16];
    for b in &mut buf {
        *b = e.u8();
    }
    buf
}

/// `HCI_Connection_Complete` event parameters ([Vol 4] Part E, Section 7.7.3).
#[derive(Clone, Copy, Debug)]
pub struct ConnectionComplete {
    pub status: Status,
    pub handle: ConnHandle,
    pub peer_addr: RawAddr,
    pub link_type: LinkType,
    pub encryption_enabled: bool,
}

impl From<&mut Event<'_>> for ConnectionComplete {
    fn from(e: &mut Event<'_>) -> Self {
        Self {
            status: e.status(),
            handle: e.conn_handle().unwrap_or_default(),
            peer_addr: e.addr(),
            link_type: LinkType::from(e.u8()),
            encryption_enabled: e.u8() != 0,
        }
    }
}

/// `HCI_Connection_Request` event parameters ([Vol 4] Part E, Section 7.7.4).
#[derive(Clone, Copy, Debug)]
pub struct ConnectionRequest {
    pub peer_addr: RawAddr,
    pub class_of_device: u32,
    pub link_type: LinkType,
}

impl From<&mut Event<'_>> for ConnectionRequest {
    fn from(e: &mut Event<'_>) -> Self {
        let peer_addr = e.addr();
        let b0 = u32::from(e.u8());
        let b1 = u32::from(e.u8());
        let b2 = u32::from(e.u8());
        Self {
            peer_addr,
            class_of_device: b0 | b1 << 8 | b2 << 16,
            link_type: LinkType::from(e.u8()),
        }
    }
}

/// `HCI_Remote_Name_Request_Complete` event parameters
/// ([Vol 4] Part E, Section 7.7.7).
#[derive(Clone, Debug)]
pub struct RemoteNameRequestComplete {
    pub status: Status,
    pub peer_addr: RawAddr,
    pub name: String,
}

impl From<&mut Event<'_>> for RemoteNameRequestComplete {
    fn from(e: &mut Event<'_>) -> Self {
        let status = e.status();
        let peer_addr = e.addr();
        let mut raw = [0_u8; 248];
        for b in &mut raw {
            *b = e.u8();
        }
        let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        let name = String::from_utf8_lossy(&raw[..end]).into_owned();
        Self { status, peer_addr, name }
    }
}

/// `HCI_Read_Remote_Supported_Features_Complete` event parameters
/// ([Vol 4] Part E, Section 7.7.11).
#[derive(Clone, Copy, Debug)]
pub struct ReadRemoteSupportedFeaturesComplete {
    pub status: Status,
    pub handle: ConnHandle,
    pub features: u64,
}

impl From<&mut Event<'_>> for ReadRemoteSupportedFeaturesComplete {
    fn from(e: &mut Event<'_>) -> Self {
        Self {
            status: e.status(),
            handle: e.conn_handle().unwrap_or_default(),
            features: read_u64(e),
        }
    }
}

/// `HCI_Read_Remote_Version_Information_Complete` event parameters
/// ([Vol 4] Part E, Section 7.7.12).
#[derive(Clone, Copy, Debug)]
pub struct ReadRemoteVersionInformationComplete {
    pub status: Status,
    pub handle: ConnHandle,
    pub version: CoreVersion,
    pub manufacturer: CompanyId,
    pub subversion: u16,
}

impl From<&mut Event<'_>> for ReadRemoteVersionInformationComplete {
    fn from(e: &mut Event<'_>) -> Self {
        let status = e.status();
        let handle = e.conn_handle().unwrap_or_default();
        let version = CoreVersion::from(e.u8());
        let manufacturer = CompanyId::from(e.u16());
        let subversion = e.u16();
        Self { status, handle, version, manufacturer, subversion }
    }
}

/// `HCI_Read_Remote_Extended_Features_Complete` event parameters
/// ([Vol 4] Part E, Section 7.7.34).
#[derive(Clone, Copy, Debug)]
pub struct ReadRemoteExtendedFeaturesComplete {
    pub status: Status,
    pub handle: ConnHandle,
    pub page: u8,
    pub max_page: u8,
    pub features: u64,
}

impl From<&mut Event<'_>> for ReadRemoteExtendedFeaturesComplete {
    fn from(e: &mut Event<'_>) -> Self {
        Self {
            status: e.status(),
            handle: e.conn_handle().unwrap_or_default(),
            page: e.u8(),
            max_page: e.u8(),
            features: read_u64(e),
        }
    }
}

/// `HCI_PIN_Code_Request` event parameters ([Vol 4] Part E, Section 7.7.22).
#[derive(Clone, Copy, Debug)]
pub struct PinCodeRequest {
    pub peer_addr: RawAddr,
}

impl From<&mut Event<'_>> for PinCodeRequest {
    fn from(e: &mut Event<'_>) -> Self {
        Self { peer_addr: e.addr() }
    }
}

/// `HCI_Link_Key_Request` event parameters ([Vol 4] Part E, Section 7.7.23).
#[derive(Clone, Copy, Debug)]
pub struct LinkKeyRequest {
    pub peer_addr: RawAddr,
}

impl From<&mut Event<'_>> for LinkKeyRequest {
    fn from(e: &mut Event<'_>) -> Self {
        Self { peer_addr: e.addr() }
    }
}

/// `HCI_Link_Key_Notification` event parameters
/// ([Vol 4] Part E, Section 7.7.24).
#[derive(Clone, Copy, Debug)]
pub struct LinkKeyNotification {
    pub peer_addr: RawAddr,
    pub link_key: [u8; 16],
    pub key_type: u8,
}

impl From<&mut Event<'_>> for LinkKeyNotification {
    fn from(e: &mut Event<'_>) -> Self {
        let peer_addr = e.addr();
        let link_key = read_arr16(e);
        let key_type = e.u8();
        Self { peer_addr, link_key, key_type }
    }
}

/// `HCI_IO_Capability_Request` event parameters
/// ([Vol 4] Part E, Section 7.7.40).
#[derive(Clone, Copy, Debug)]
pub struct IoCapabilityRequest {
    pub peer_addr: RawAddr,
}

impl From<&mut Event<'_>> for IoCapabilityRequest {
    fn from(e: &mut Event<'_>) -> Self {
        Self { peer_addr: e.addr() }
    }
}

/// `HCI_IO_Capability_Response` event parameters
/// ([Vol 4] Part E, Section 7.7.41).
#[derive(Clone, Copy, Debug)]
pub struct IoCapabilityResponse {
    pub peer_addr: RawAddr,
    pub io_cap: u8,
    pub oob_data_present: bool,
    pub auth_requirements: u8,
}

impl From<&mut Event<'_>> for IoCapabilityResponse {
    fn from(e: &mut Event<'_>) -> Self {
        let peer_addr = e.addr();
        let io_cap = e.u8();
        let oob_data_present = e.u8() != 0;
        let auth_requirements = e.u8();
        Self { peer_addr, io_cap, oob_data_present, auth_requirements }
    }
}

/// `HCI_User_Confirmation_Request` event parameters
/// ([Vol 4] Part E, Section 7.7.42).
#[derive(Clone, Copy, Debug)]
pub struct UserConfirmationRequest {
    pub peer_addr: RawAddr,
    pub numeric_value: u32,
}

impl From<&mut Event<'_>> for UserConfirmationRequest {
    fn from(e: &mut Event<'_>) -> Self {
        let peer_addr = e.addr();
        let numeric_value = read_u32(e);
        Self { peer_addr, numeric_value }
    }
}

/// `HCI_User_Passkey_Request` event parameters
/// ([Vol 4] Part E, Section 7.7.43).
#[derive(Clone, Copy, Debug)]
pub struct UserPasskeyRequest {
    pub peer_addr: RawAddr,
}

impl From<&mut Event<'_>> for UserPasskeyRequest {
    fn from(e: &mut Event<'_>) -> Self {
        Self { peer_addr: e.addr() }
    }
}

/// `HCI_User_Passkey_Notification` event parameters
/// ([Vol 4] Part E, Section 7.7.48).
#[derive(Clone, Copy, Debug)]
pub struct UserPasskeyNotification {
    pub peer_addr: RawAddr,
    pub passkey: u32,
}

impl From<&mut Event<'_>> for UserPasskeyNotification {
    fn from(e: &mut Event<'_>) -> Self {
        let peer_addr = e.addr();
        let passkey = read_u32(e);
        Self { peer_addr, passkey }
    }
}

/// `HCI_Simple_Pairing_Complete` event parameters
/// ([Vol 4] Part E, Section 7.7.45).
#[derive(Clone, Copy, Debug)]
pub struct SimplePairingComplete {
    pub status: Status,
    pub peer_addr: RawAddr,
}

impl From<&mut Event<'_>> for SimplePairingComplete {
    fn from(e: &mut Event<'_>) -> Self {
        Self { status: e.status(), peer_addr: e.addr() }
    }
}

/// `HCI_Authentication_Complete` event parameters
/// ([Vol 4] Part E, Section 7.7.6).
#[derive(Clone, Copy, Debug)]
pub struct AuthenticationComplete {
    pub status: Status,
    pub handle: ConnHandle,
}

impl From<&mut Event<'_>> for AuthenticationComplete {
    fn from(e: &mut Event<'_>) -> Self {
        Self { status: e.status(), handle: e.conn_handle().unwrap_or_default() }
    }
}

/// `HCI_Encryption_Change` event parameters (v1 and v2 share this shape; v2's
/// additional encryption-key-type octet is read separately by the security
/// manager when it needs it) ([Vol 4] Part E, Section 7.7.8).
#[derive(Clone, Copy, Debug)]
pub struct EncryptionChange {
    pub status: Status,
    pub handle: ConnHandle,
    pub enabled: bool,
}

impl From<&mut Event<'_>> for EncryptionChange {
    fn from(e: &mut Event<'_>) -> Self {
        Self {
            status: e.status(),
            handle: e.conn_handle().unwrap_or_default(),
            enabled: e.u8() != 0,
        }
    }
}
