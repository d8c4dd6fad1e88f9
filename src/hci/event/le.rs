use super::*;

/// HCI LE meta-event subevent codes ([Vol 4] Part E, Section 7.7.65).
#[derive(
    Clone, Copy, Debug, Eq, PartialEq, num_enum::TryFromPrimitive, strum::Display, strum::EnumIter,
)]
#[non_exhaustive]
#[repr(u8)]
pub enum SubeventCode {
    ConnectionComplete = 0x01,
    AdvertisingReport = 0x02,
    ConnectionUpdateComplete = 0x03,
    ReadRemoteFeaturesComplete = 0x04,
    LongTermKeyRequest = 0x05,
    RemoteConnectionParameterRequest = 0x06,
    DataLengthChange = 0x07,
    ReadLocalP256PublicKeyComplete = 0x08,
    GenerateDhKeyComplete = 0x09,
    EnhancedConnectionComplete = 0x0A,
    DirectedAdvertisingReport = 0x0B,
    PhyUpdateComplete = 0x0C,
    ExtendedAdvertisingReport = 0x0D,
    PeriodicAdvertisingSyncEstablished = 0x0E,
    PeriodicAdvertisingReport = 0x0F,
    PeriodicAdvertisingSyncLost = 0x10,
    ScanTimeout = 0x11,
    AdvertisingSetTerminated = 0x12,
    ScanRequestReceived = 0x13,
    ChannelSelectionAlgorithm = 0x14,
    ConnectionlessIqReport = 0x15,
    ConnectionIqReport = 0x16,
    CteRequestFailed = 0x17,
    PeriodicAdvertisingSyncTransferReceived = 0x18,
    CisEstablished = 0x19,
    CisRequest = 0x1A,
    CreateBigComplete = 0x1B,
    TerminateBigComplete = 0x1C,
    BigSyncEstablished = 0x1D,
    BigSyncLost = 0x1E,
    RequestPeerScaComplete = 0x1F,
    PathLossThreshold = 0x20,
    TransmitPowerReporting = 0x21,
    BigInfoAdvertisingReport = 0x22,
    SubrateChange = 0x23,
}

impl SubeventCode {
    /// Returns the bit position used for this subevent in `HCI_LE_Set_Event_Mask`
    /// ([Vol 4] Part E, Section 7.8.1), which numbers bits from 0 starting at
    /// `ConnectionComplete`.
    #[inline]
    #[must_use]
    pub(crate) const fn mask(self) -> u64 {
        1 << (self as u8 - 1)
    }

    /// Returns the format of the associated subevent parameters.
    #[allow(clippy::too_many_lines)]
    pub(super) const fn param_fmt(self) -> EventFmt {
        use SubeventCode::*;
        const OTHER: EventFmt = EventFmt::empty();
        const STATUS: EventFmt = EventFmt::STATUS;
        const CONN_HANDLE: EventFmt = EventFmt::CONN_HANDLE;
        const SYNC_HANDLE: EventFmt = EventFmt::SYNC_HANDLE;
        const ADV_HANDLE: EventFmt = EventFmt::ADV_HANDLE;
        const BIG_HANDLE: EventFmt = EventFmt::BIG_HANDLE;
        #[allow(clippy::match_same_arms)]
        match self {
            ConnectionComplete => STATUS.union(CONN_HANDLE),
            AdvertisingReport => OTHER,
            ConnectionUpdateComplete => STATUS.union(CONN_HANDLE),
            ReadRemoteFeaturesComplete => STATUS.union(CONN_HANDLE),
            LongTermKeyRequest => CONN_HANDLE,
            RemoteConnectionParameterRequest => CONN_HANDLE,
            DataLengthChange => CONN_HANDLE,
            ReadLocalP256PublicKeyComplete => STATUS,
            GenerateDhKeyComplete => STATUS,
            EnhancedConnectionComplete => STATUS.union(CONN_HANDLE),
            DirectedAdvertisingReport => OTHER,
            PhyUpdateComplete => STATUS.union(CONN_HANDLE),
            ExtendedAdvertisingReport => OTHER,
            PeriodicAdvertisingSyncEstablished => STATUS.union(SYNC_HANDLE),
            PeriodicAdvertisingReport => SYNC_HANDLE,
            PeriodicAdvertisingSyncLost => SYNC_HANDLE,
            ScanTimeout => OTHER,
            AdvertisingSetTerminated => STATUS.union(ADV_HANDLE),
            ScanRequestReceived => ADV_HANDLE,
            ChannelSelectionAlgorithm => CONN_HANDLE,
            ConnectionlessIqReport => SYNC_HANDLE,
            ConnectionIqReport => CONN_HANDLE,
            CteRequestFailed => STATUS.union(CONN_HANDLE),
            PeriodicAdvertisingSyncTransferReceived => STATUS.union(CONN_HANDLE),
            CisEstablished => STATUS.union(CONN_HANDLE),
            CisRequest => CONN_HANDLE,
            CreateBigComplete => STATUS.union(BIG_HANDLE),
            TerminateBigComplete => BIG_HANDLE,
            BigSyncEstablished => STATUS.union(BIG_HANDLE),
            BigSyncLost => BIG_HANDLE,
            RequestPeerScaComplete => STATUS.union(CONN_HANDLE),
            PathLossThreshold => CONN_HANDLE,
            TransmitPowerReporting => STATUS.union(CONN_HANDLE),
            BigInfoAdvertisingReport => SYNC_HANDLE,
            SubrateChange => STATUS.union(CONN_HANDLE),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_bit_matches_event_mask_table() {
        assert_eq!(SubeventCode::ConnectionComplete.mask(), 1 << 0);
        assert_eq!(SubeventCode::EnhancedConnectionComplete.mask(), 1 << 9);
    }
}
