//! Advertising/scan-response data parsing ([CSS] Part A, Section 1;
//! [SPEC_FULL.md] `# 2.6`: "the pure Bluetooth-domain parsing" supplemented
//! from `original_source/fidl/helpers.cc`'s AdvertisingData conversions,
//! with the FIDL encoding itself left out as out of scope).
//!
//! Each TLV (type-length-value) structure is one octet of length (counting
//! the type octet plus the value) followed by the type and value, repeated
//! until the buffer is exhausted ([CSS] Part A, Section 1).

use structbuf::Unpacker;

use super::consts::{AdvFlag, ResponseDataType};
use super::uuid::{Uuid, Uuid16};

/// Parsed view over one advertising or scan-response payload (spec `# 3`
/// `Peer`: "advertising data view"). Fields not present in the payload are
/// left at their defaults; a malformed TLV truncates parsing at that point
/// rather than failing the whole payload, since most of the CSS record
/// types are independently useful.
#[derive(Clone, Debug, Default)]
pub struct AdvertisingData {
    flags: AdvFlag,
    local_name: Option<String>,
    short_name: bool,
    tx_power: Option<i8>,
    appearance: Option<u16>,
    service_uuids: Vec<Uuid>,
    service_data: Vec<(Uuid16, Vec<u8>)>,
    manufacturer_data: Vec<(u16, Vec<u8>)>,
}

impl AdvertisingData {
    /// Parses `raw` into a typed view, per [CSS] Part A, Section 1's TLV
    /// framing. Unrecognized or malformed types are skipped.
    #[must_use]
    pub fn parse(raw: &[u8]) -> Self {
        let mut out = Self::default();
        let mut p = Unpacker::new(raw);
        while p.len() > 1 {
            let len = usize::from(p.u8());
            if len == 0 || len > p.len() {
                break;
            }
            let body = p.as_ref()[..len].to_vec();
            let _ = p.skip(len);
            let Ok(ty) = ResponseDataType::try_from(body[0]) else { continue };
            out.apply(ty, &body[1..]);
        }
        out
    }

    fn apply(&mut self, ty: ResponseDataType, value: &[u8]) {
        match ty {
            ResponseDataType::Flags => {
                if let [b, ..] = *value {
                    self.flags = AdvFlag::from_bits_truncate(b);
                }
            }
            ResponseDataType::ShortLocalName => {
                self.local_name = Some(String::from_utf8_lossy(value).into_owned());
                self.short_name = true;
            }
            ResponseDataType::CompleteLocalName => {
                self.local_name = Some(String::from_utf8_lossy(value).into_owned());
                self.short_name = false;
            }
            ResponseDataType::TxPower => {
                if let [b, ..] = *value {
                    self.tx_power = Some(b as i8);
                }
            }
            ResponseDataType::Appearance => {
                if let [lo, hi, ..] = *value {
                    self.appearance = Some(u16::from_le_bytes([lo, hi]));
                }
            }
            ResponseDataType::IncompleteServiceClass16 | ResponseDataType::CompleteServiceClass16 => {
                self.service_uuids.extend(value.chunks_exact(2).filter_map(|c| {
                    Uuid16::new(u16::from_le_bytes([c[0], c[1]])).map(Uuid16::as_uuid)
                }));
            }
            ResponseDataType::IncompleteServiceClass32 | ResponseDataType::CompleteServiceClass32 => {
                self.service_uuids.extend(
                    value.chunks_exact(4).filter_map(|c| Uuid::new(u32::from_le_bytes(c.try_into().ok()?).into())),
                );
            }
            ResponseDataType::IncompleteServiceClass128 | ResponseDataType::CompleteServiceClass128 => {
                self.service_uuids.extend(
                    value.chunks_exact(16).filter_map(|c| Uuid::new(u128::from_le_bytes(c.try_into().ok()?))),
                );
            }
            ResponseDataType::ServiceData16 => {
                if value.len() >= 2 {
                    let uuid = Uuid16::new(u16::from_le_bytes([value[0], value[1]]));
                    if let Some(uuid) = uuid {
                        self.service_data.push((uuid, value[2..].to_vec()));
                    }
                }
            }
            ResponseDataType::ManufacturerData => {
                if value.len() >= 2 {
                    let id = u16::from_le_bytes([value[0], value[1]]);
                    self.manufacturer_data.push((id, value[2..].to_vec()));
                }
            }
            _ => {}
        }
    }

    /// Discoverability/BR-EDR-support flags, or the all-zero default if the
    /// advertisement carried no `Flags` field.
    #[must_use]
    pub const fn flags(&self) -> AdvFlag {
        self.flags
    }

    /// The advertised local name, complete or shortened (spec `# 3` `Peer`:
    /// "optional name").
    #[must_use]
    pub fn local_name(&self) -> Option<&str> {
        self.local_name.as_deref()
    }

    /// Whether [`Self::local_name`] came from a `ShortLocalName` field
    /// rather than `CompleteLocalName`.
    #[must_use]
    pub const fn is_short_name(&self) -> bool {
        self.short_name
    }

    #[must_use]
    pub const fn tx_power(&self) -> Option<i8> {
        self.tx_power
    }

    #[must_use]
    pub const fn appearance(&self) -> Option<u16> {
        self.appearance
    }

    /// Service UUIDs advertised via any of the 16/32/128-bit service-class
    /// fields (spec `# 3` `Peer`: "discovered BR/EDR service UUIDs" — the LE
    /// advertised set plays the same discovery-hint role).
    #[must_use]
    pub fn service_uuids(&self) -> &[Uuid] {
        &self.service_uuids
    }

    #[must_use]
    pub fn service_data(&self) -> &[(Uuid16, Vec<u8>)] {
        &self.service_data
    }

    #[must_use]
    pub fn manufacturer_data(&self) -> &[(u16, Vec<u8>)] {
        &self.manufacturer_data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flags_and_complete_name() {
        // Flags(0x06), then CompleteLocalName("hi").
        let raw = [0x02, 0x01, 0x06, 0x03, 0x09, b'h', b'i'];
        let ad = AdvertisingData::parse(&raw);
        assert_eq!(ad.flags(), AdvFlag::LE_GENERAL | AdvFlag::NO_BREDR);
        assert_eq!(ad.local_name(), Some("hi"));
        assert!(!ad.is_short_name());
    }

    #[test]
    fn stops_at_truncated_length() {
        let raw = [0xFF, 0x01, 0x02];
        let ad = AdvertisingData::parse(&raw);
        assert!(ad.local_name().is_none());
    }

    #[test]
    fn parses_16_bit_service_uuid() {
        // CompleteServiceClass16(0x180F, Battery Service).
        let raw = [0x03, 0x03, 0x0F, 0x18];
        let ad = AdvertisingData::parse(&raw);
        assert_eq!(ad.service_uuids(), &[Uuid16::sig(0x180F).as_uuid()]);
    }
}
