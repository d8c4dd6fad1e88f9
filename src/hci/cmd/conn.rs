use std::time::Duration;

use sapphire_crypto::Ltk;

use crate::hci::*;
use crate::le::{Addr, RawAddr};

/// Link Control commands ([Vol 4] Part E, Section 7.1) and the BR/EDR subset
/// of Link Policy / Status Parameters commands used for connection setup,
/// authentication, and pairing.
impl<T: Transport> Host<T> {
    /// Terminates a connection (either BR/EDR or LE) with the given reason
    /// ([Vol 4] Part E, Section 7.1.6).
    pub async fn disconnect(&self, cn: ConnHandle, reason: Status) -> Result<()> {
        let r = self.exec_params(Opcode::Disconnect, |cmd| {
            cmd.u16(cn).u8(reason as u8);
        });
        r.await?.ok()?;
        Ok(())
    }

    /// Creates a BR/EDR connection to `peer_addr`. Completion is reported
    /// asynchronously via `HCI_Connection_Complete`
    /// ([Vol 4] Part E, Section 7.1.5).
    pub async fn create_connection(
        &self,
        peer_addr: RawAddr,
        pkt_type: u16,
        page_scan_repetition_mode: u8,
        clock_offset: u16,
        allow_role_switch: bool,
    ) -> Result<()> {
        let r = self.exec_params(Opcode::CreateConnection, |cmd| {
            cmd.put(peer_addr)
                .u16(pkt_type)
                .u8(page_scan_repetition_mode)
                .u8(0) // reserved
                .u16(clock_offset)
                .bool(allow_role_switch);
        });
        r.await?.ok()?;
        Ok(())
    }

    /// Cancels a pending [`Self::create_connection`]
    /// ([Vol 4] Part E, Section 7.1.7).
    pub async fn create_connection_cancel(&self, peer_addr: RawAddr) -> Result<()> {
        let r = self.exec_params(Opcode::CreateConnectionCancel, |cmd| {
            cmd.put(peer_addr);
        });
        r.await?.ok()?;
        Ok(())
    }

    /// Accepts an inbound connection request, taking on the Central role
    /// ([Vol 4] Part E, Section 7.1.8).
    pub async fn accept_connection_request(&self, peer_addr: RawAddr, role: Role) -> Result<()> {
        let r = self.exec_params(Opcode::AcceptConnectionRequest, |cmd| {
            cmd.put(peer_addr).u8(u8::from(role == Role::Peripheral));
        });
        r.await?.ok()?;
        Ok(())
    }

    /// Rejects an inbound connection request ([Vol 4] Part E, Section 7.1.9).
    pub async fn reject_connection_request(&self, peer_addr: RawAddr, reason: Status) -> Result<()> {
        let r = self.exec_params(Opcode::RejectConnectionRequest, |cmd| {
            cmd.put(peer_addr).u8(reason as u8);
        });
        r.await?.ok()?;
        Ok(())
    }

    /// Replies to `HCI_Link_Key_Request` with a stored link key, if one is
    /// available ([Vol 4] Part E, Section 7.1.10 and 7.1.11).
    pub async fn link_key_request_reply(&self, peer_addr: RawAddr, key: Option<&[u8; 16]>) -> Result<()> {
        let r = if let Some(key) = key {
            self.exec_params(Opcode::LinkKeyRequestReply, |cmd| {
                cmd.put(peer_addr).put(key.as_slice());
            })
        } else {
            self.exec_params(Opcode::LinkKeyRequestNegativeReply, |cmd| {
                cmd.put(peer_addr);
            })
        };
        r.await?.ok()?;
        Ok(())
    }

    /// Replies to `HCI_PIN_Code_Request` with a PIN, if one is available
    /// ([Vol 4] Part E, Section 7.1.12 and 7.1.13).
    pub async fn pin_code_request_reply(&self, peer_addr: RawAddr, pin: Option<&[u8]>) -> Result<()> {
        let r = if let Some(pin) = pin {
            self.exec_params(Opcode::PinCodeRequestReply, |cmd| {
                cmd.put(peer_addr)
                    .u8(u8::try_from(pin.len()).unwrap_or(16))
                    .put(pin);
                for _ in pin.len()..16 {
                    cmd.u8(0);
                }
            })
        } else {
            self.exec_params(Opcode::PinCodeRequestNegativeReply, |cmd| {
                cmd.put(peer_addr);
            })
        };
        r.await?.ok()?;
        Ok(())
    }

    /// Requests authentication of the given connection
    /// ([Vol 4] Part E, Section 7.1.15).
    pub async fn authentication_requested(&self, cn: ConnHandle) -> Result<()> {
        let r = self.exec_params(Opcode::AuthenticationRequested, |cmd| {
            cmd.u16(cn);
        });
        r.await?.ok()?;
        Ok(())
    }

    /// Enables or disables link-level encryption on an authenticated
    /// connection ([Vol 4] Part E, Section 7.1.16).
    pub async fn set_connection_encryption(&self, cn: ConnHandle, enable: bool) -> Result<()> {
        let r = self.exec_params(Opcode::SetConnectionEncryption, |cmd| {
            cmd.u16(cn).bool(enable);
        });
        r.await?.ok()?;
        Ok(())
    }

    /// Reads the peer's name over a transient connection
    /// ([Vol 4] Part E, Section 7.1.19).
    pub async fn remote_name_request(
        &self,
        peer_addr: RawAddr,
        page_scan_repetition_mode: u8,
        clock_offset: u16,
    ) -> Result<()> {
        let r = self.exec_params(Opcode::RemoteNameRequest, |cmd| {
            cmd.put(peer_addr)
                .u8(page_scan_repetition_mode)
                .u8(0) // reserved
                .u16(clock_offset);
        });
        r.await?.ok()?;
        Ok(())
    }

    /// Requests the peer's supported LMP features
    /// ([Vol 4] Part E, Section 7.1.21).
    pub async fn read_remote_supported_features(&self, cn: ConnHandle) -> Result<()> {
        let r = self.exec_params(Opcode::ReadRemoteSupportedFeatures, |cmd| {
            cmd.u16(cn);
        });
        r.await?.ok()?;
        Ok(())
    }

    /// Requests a page of the peer's supported LMP features
    /// ([Vol 4] Part E, Section 7.1.22).
    pub async fn read_remote_extended_features(&self, cn: ConnHandle, page: u8) -> Result<()> {
        let r = self.exec_params(Opcode::ReadRemoteExtendedFeatures, |cmd| {
            cmd.u16(cn).u8(page);
        });
        r.await?.ok()?;
        Ok(())
    }

    /// Requests the peer's LMP version ([Vol 4] Part E, Section 7.1.23).
    pub async fn read_remote_version_information(&self, cn: ConnHandle) -> Result<()> {
        let r = self.exec_params(Opcode::ReadRemoteVersionInformation, |cmd| {
            cmd.u16(cn);
        });
        r.await?.ok()?;
        Ok(())
    }

    /// Requests the peer's clock offset ([Vol 4] Part E, Section 7.1.24).
    pub async fn read_clock_offset(&self, cn: ConnHandle) -> Result<()> {
        let r = self.exec_params(Opcode::ReadClockOffset, |cmd| {
            cmd.u16(cn);
        });
        r.await?.ok()?;
        Ok(())
    }

    /// Returns the encryption key size (in octets) negotiated for a
    /// connection, so a caller can enforce a minimum
    /// ([Vol 4] Part E, Section 7.5.7).
    pub async fn read_encryption_key_size(&self, cn: ConnHandle) -> Result<u8> {
        let r = self.exec_params(Opcode::ReadEncryptionKeySize, |cmd| {
            cmd.u16(cn);
        });
        let mut e = r.await?.ok()?;
        assert_eq!(ConnHandle::new(e.u16()), Some(cn));
        Ok(e.u8())
    }

    /// Replies to `HCI_IO_Capability_Request` with this host's I/O
    /// capability ([Vol 4] Part E, Section 7.1.29).
    pub async fn io_capability_request_reply(
        &self,
        peer_addr: RawAddr,
        io_cap: u8,
        oob_data_present: bool,
        auth_requirements: u8,
    ) -> Result<()> {
        let r = self.exec_params(Opcode::IoCapabilityRequestReply, |cmd| {
            cmd.put(peer_addr)
                .u8(io_cap)
                .bool(oob_data_present)
                .u8(auth_requirements);
        });
        r.await?.ok()?;
        Ok(())
    }

    /// Rejects an `HCI_IO_Capability_Request`
    /// ([Vol 4] Part E, Section 7.1.35).
    pub async fn io_capability_request_negative_reply(
        &self,
        peer_addr: RawAddr,
        reason: Status,
    ) -> Result<()> {
        let r = self.exec_params(Opcode::IoCapabilityRequestNegativeReply, |cmd| {
            cmd.put(peer_addr).u8(reason as u8);
        });
        r.await?.ok()?;
        Ok(())
    }

    /// Confirms or rejects a numeric comparison value
    /// ([Vol 4] Part E, Section 7.1.30 and 7.1.31).
    pub async fn user_confirmation_request_reply(
        &self,
        peer_addr: RawAddr,
        accept: bool,
    ) -> Result<()> {
        let op = if accept {
            Opcode::UserConfirmationRequestReply
        } else {
            Opcode::UserConfirmationRequestNegativeReply
        };
        let r = self.exec_params(op, |cmd| {
            cmd.put(peer_addr);
        });
        r.await?.ok()?;
        Ok(())
    }

    /// Replies to `HCI_User_Passkey_Request` with an entered passkey, or
    /// rejects it ([Vol 4] Part E, Section 7.1.32 and 7.1.33).
    pub async fn user_passkey_request_reply(&self, peer_addr: RawAddr, passkey: Option<u32>) -> Result<()> {
        let r = if let Some(passkey) = passkey {
            self.exec_params(Opcode::UserPasskeyRequestReply, |cmd| {
                #[allow(clippy::cast_possible_truncation)]
                cmd.put(peer_addr)
                    .u16(passkey as u16)
                    .u16((passkey >> 16) as u16);
            })
        } else {
            self.exec_params(Opcode::UserPasskeyRequestNegativeReply, |cmd| {
                cmd.put(peer_addr);
            })
        };
        r.await?.ok()?;
        Ok(())
    }

    /// Creates an LE connection to `peer_addr`. Only one can be outstanding
    /// at a time; completion is reported asynchronously via
    /// `HCI_LE_Connection_Complete` or `HCI_LE_Enhanced_Connection_Complete`
    /// ([Vol 4] Part E, Section 7.8.12).
    #[allow(clippy::too_many_arguments)]
    pub async fn le_create_connection(
        &self,
        scan_interval: Duration,
        scan_window: Duration,
        use_filter_accept_list: bool,
        peer_addr: Addr,
        own_addr_type: u8,
        conn_interval: (Duration, Duration),
        peripheral_latency: u16,
        supervision_timeout: Duration,
    ) -> Result<()> {
        let r = self.exec_params(Opcode::LeCreateConnection, |cmd| {
            cmd.u16(ticks_625us(scan_interval).unwrap_or(0x0060))
                .u16(ticks_625us(scan_window).unwrap_or(0x0030))
                .bool(use_filter_accept_list)
                .u8(match peer_addr {
                    Addr::Public(_) => 0x00,
                    Addr::Random(_) => 0x01,
                })
                .put(peer_addr.raw())
                .u8(own_addr_type)
                .u16(ticks_1250us(conn_interval.0).unwrap_or(0))
                .u16(ticks_1250us(conn_interval.1).unwrap_or(0))
                .u16(peripheral_latency)
                .u16(ticks_10ms(supervision_timeout).unwrap_or(0))
                .u16(0) // min CE length
                .u16(0); // max CE length
        });
        r.await?.ok()?;
        Ok(())
    }

    /// Cancels a pending [`Self::le_create_connection`]
    /// ([Vol 4] Part E, Section 7.8.13).
    pub async fn le_create_connection_cancel(&self) -> Result<()> {
        self.exec(Opcode::LeCreateConnectionCancel).await?.ok()?;
        Ok(())
    }

    /// Starts (or restarts, for key refresh) link-layer encryption on an LE
    /// connection using a previously bonded key
    /// ([Vol 4] Part E, Section 7.8.24).
    pub async fn le_start_encryption(
        &self,
        cn: ConnHandle,
        rand: u64,
        ediv: u16,
        ltk: &Ltk,
    ) -> Result<()> {
        let r = self.exec_params(Opcode::LeStartEncryption, |cmd| {
            cmd.u16(cn).u64(rand).u16(ediv).put(ltk.as_bytes());
        });
        r.await?.ok()?;
        Ok(())
    }

    /// Requests the peer's supported LE features
    /// ([Vol 4] Part E, Section 7.8.21).
    pub async fn le_read_remote_features(&self, cn: ConnHandle) -> Result<()> {
        let r = self.exec_params(Opcode::LeReadRemoteFeatures, |cmd| {
            cmd.u16(cn);
        });
        r.await?.ok()?;
        Ok(())
    }

    /// Sets the ACL priority for a connection on controllers that support the
    /// vendor extension. This is an abstraction over a controller-specific
    /// encoding; callers that need the real OCF/subcommand layout for their
    /// hardware provide it through `vendor_params`.
    pub async fn set_acl_priority(&self, cn: ConnHandle, high: bool, vendor_params: &[u8]) -> Result<()> {
        let r = self.exec_params(Opcode::VendorSetAclPriority, |cmd| {
            cmd.u16(cn).bool(high).put(vendor_params);
        });
        r.await?.ok()?;
        Ok(())
    }
}
