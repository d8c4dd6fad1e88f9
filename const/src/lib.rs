//! Bluetooth SIG assigned numbers used across the Sapphire host stack
//! ([Assigned Numbers]).
//!
//! This crate holds the small set of constant tables that both the host
//! crate and any future peripheral/profile crate need, so that neither has
//! to depend on the other for a UUID or company id.

#![warn(missing_debug_implementations)]

/// 16-bit company identifiers assigned by the Bluetooth SIG
/// ([Assigned Numbers] Section 7).
#[derive(Clone, Copy, Debug, Eq, PartialEq, num_enum::FromPrimitive, num_enum::IntoPrimitive)]
#[non_exhaustive]
#[repr(u16)]
pub enum CompanyId {
    EricssonTechnologyLicensing = 0x0000,
    NokiaMobilePhones = 0x0001,
    Intel = 0x0002,
    IbmCorp = 0x0003,
    AppleInc = 0x004C,
    GoogleInc = 0x00E0,
    MicrosoftCorporation = 0x0006,
    #[num_enum(default)]
    Unknown = 0xFFFF,
}

/// Service class UUIDs used in the SDP/GAP class-of-device and service
/// discovery records ([Assigned Numbers] Section 3.3).
#[derive(Clone, Copy, Debug, Eq, PartialEq, num_enum::FromPrimitive, num_enum::IntoPrimitive)]
#[non_exhaustive]
#[repr(u16)]
pub enum ServiceClass {
    ServiceDiscoveryServer = 0x1000,
    BrowseGroupDescriptor = 0x1001,
    SerialPort = 0x1101,
    GenericAccess = 0x1800,
    GenericAttribute = 0x1801,
    ImmediateAlert = 0x1802,
    LinkLoss = 0x1803,
    BatteryService = 0x180F,
    HumanInterfaceDevice = 0x1812,
    #[num_enum(default)]
    Unknown = 0x0000,
}

/// GATT declaration and descriptor UUIDs that show up directly in ATT PDUs
/// ([Vol 3] Part G, Section 3.3 and 3.4).
#[derive(
    Clone, Copy, Debug, Eq, PartialEq, num_enum::FromPrimitive, num_enum::IntoPrimitive, strum::Display,
)]
#[non_exhaustive]
#[repr(u16)]
pub enum DeclarationType {
    PrimaryService = 0x2800,
    SecondaryService = 0x2801,
    Include = 0x2802,
    Characteristic = 0x2803,
    #[num_enum(default)]
    Unknown = 0x0000,
}

/// Well-known characteristic and configuration descriptor UUIDs referenced
/// by name in client code ([Assigned Numbers] Section 3.8).
#[derive(Clone, Copy, Debug, Eq, PartialEq, num_enum::FromPrimitive, num_enum::IntoPrimitive)]
#[non_exhaustive]
#[repr(u16)]
pub enum DescriptorType {
    CharacteristicExtendedProperties = 0x2900,
    CharacteristicUserDescription = 0x2901,
    ClientCharacteristicConfiguration = 0x2902,
    ServerCharacteristicConfiguration = 0x2903,
    CharacteristicPresentationFormat = 0x2904,
    CharacteristicAggregateFormat = 0x2905,
    #[num_enum(default)]
    Unknown = 0x0000,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn company_id_round_trips_known_value() {
        assert_eq!(CompanyId::from(0x004C), CompanyId::AppleInc);
        assert_eq!(u16::from(CompanyId::AppleInc), 0x004C);
    }

    #[test]
    fn unknown_company_id_falls_back_to_default() {
        assert_eq!(CompanyId::from(0xBEEF), CompanyId::Unknown);
    }
}
