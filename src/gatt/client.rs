//! GATT client: service, characteristic, and descriptor discovery, plus
//! attribute read/write procedures over an [`att::Bearer`] ([SPEC_FULL.md]
//! C9, [Vol 3] Part G, Section 4).

use tracing::{debug, instrument};

use crate::att::{self, Bearer};
use crate::gap::{Uuid, UuidVec};
use crate::host::Transport;

use super::{Declaration, Descriptor, Error, Handle, HandleRange, Prop, Result};

/// One discovered GATT characteristic ([Vol 3] Part G, Section 3.3).
#[derive(Clone, Debug)]
pub struct Characteristic {
    pub uuid: Uuid,
    pub handle: Handle,
    pub value_handle: Handle,
    pub properties: Prop,
    descriptors: Vec<(Uuid, Handle)>,
}

impl Characteristic {
    /// Returns the handle of descriptor `uuid`, if it was discovered.
    #[must_use]
    pub fn descriptor(&self, uuid: Uuid) -> Option<Handle> {
        self.descriptors.iter().find(|&&(u, _)| u == uuid).map(|&(_, h)| h)
    }
}

/// Write semantics for [`Client::write`] ([Vol 3] Part G, Section 4.9).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WriteMode {
    /// `WriteRequest`, waiting for the peer's `WriteResponse`.
    WithResponse,
    /// `WriteCommand`: fire-and-forget, no response expected.
    WithoutResponse,
    /// Queued `PrepareWriteRequest`/`ExecuteWriteRequest`, verifying the
    /// prepared echo matches before committing ([Vol 3] Part G, Section
    /// 4.9.5). Returns [`Error::NotReliable`] and cancels the queue if it
    /// doesn't.
    Reliable,
}

/// A discovered primary or secondary service and its characteristics
/// ([Vol 3] Part G, Section 4.4, 4.6).
#[derive(Clone, Debug)]
pub struct RemoteService {
    pub uuid: Uuid,
    pub handles: HandleRange,
    characteristics: Vec<Characteristic>,
}

impl RemoteService {
    /// Returns the characteristics discovered by
    /// [`Client::discover_characteristics`], empty until then.
    #[must_use]
    pub fn characteristics(&self) -> &[Characteristic] {
        &self.characteristics
    }

    /// Finds a discovered characteristic by UUID.
    #[must_use]
    pub fn characteristic(&self, uuid: Uuid) -> Option<&Characteristic> {
        self.characteristics.iter().find(|c| c.uuid == uuid)
    }
}

/// One handle/value pair from a `ReadByTypeRequest` bulk read
/// ([Vol 3] Part G, Section 4.8.2), e.g. reading every instance of a
/// vendor-specific characteristic across a service.
#[derive(Clone, Debug)]
pub struct ReadByTypeValue {
    pub handle: Handle,
    pub value: Vec<u8>,
}

/// GATT client bound to one peer's ATT bearer ([SPEC_FULL.md] C9).
///
/// Holds no schema cache of its own: callers drive discovery explicitly and
/// keep the returned [`RemoteService`]/[`Characteristic`] values for as long
/// as they're needed.
#[derive(Clone)]
pub struct Client<T: Transport> {
    bearer: Bearer<T>,
}

impl<T: Transport> Client<T> {
    /// Creates a client over an already-attached ATT bearer.
    #[must_use]
    pub fn new(bearer: Bearer<T>) -> Self {
        Self { bearer }
    }

    /// Negotiates the ATT_MTU ([Vol 3] Part F, Section 3.4.2).
    pub async fn exchange_mtu(&self, local_mtu: u16) -> Result<u16> {
        Ok(self.bearer.exchange_mtu(local_mtu).await?)
    }

    /// Discovers all primary services ([Vol 3] Part G, Section 4.4.1).
    #[instrument(skip(self))]
    pub async fn discover_services(&self) -> Result<Vec<RemoteService>> {
        let mut out = Vec::new();
        let mut start = Handle::MIN;
        loop {
            let group_type = UuidVec::new(Declaration::PrimaryService.uuid16().as_uuid());
            let pdu = att::pdu::encode_read_by_group_type_request(
                u16::from(start),
                u16::from(Handle::MAX),
                group_type.as_ref(),
            );
            let resp = match self.bearer.request(att::Opcode::ReadByGroupTypeRequest, pdu).await {
                Ok(r) => r,
                Err(att::Error::Protocol(att::ErrorCode::AttributeNotFound)) => break,
                Err(e) => return Err(e.into()),
            };
            let groups = att::pdu::decode_read_by_group_type_response(&resp).ok_or(Error::InvalidResponse)?;
            let Some(last) = groups.last() else { break };
            let next = last.range.end;
            for g in groups {
                let uuid = Uuid::try_from(&g.value[..]).map_err(|()| Error::InvalidResponse)?;
                let start = Handle::new(g.range.start).ok_or(Error::InvalidResponse)?;
                let end = Handle::new(g.range.end).ok_or(Error::InvalidResponse)?;
                out.push(RemoteService { uuid, handles: HandleRange::new(start, end), characteristics: Vec::new() });
            }
            if next == u16::from(Handle::MAX) {
                break;
            }
            start = Handle::new(next + 1).ok_or(Error::InvalidResponse)?;
        }
        debug!(count = out.len(), "discovered primary services");
        Ok(out)
    }

    /// Reads every attribute of type `typ` in `range`
    /// ([Vol 3] Part G, Section 4.8.2).
    ///
    /// Spec `# 4.4` enforces that result handles are within `range` and
    /// strictly increasing; the per-response ordering is checked by
    /// [`att::pdu::decode_read_by_type_response`], and range membership
    /// (plus monotonicity across response pages) is checked here, since only
    /// this layer knows the originally requested bounds.
    pub async fn read_by_type(&self, range: HandleRange, typ: Uuid) -> Result<Vec<ReadByTypeValue>> {
        let mut out = Vec::new();
        let mut start = range.start();
        let mut prev: Option<Handle> = None;
        loop {
            let wire_type = UuidVec::new(typ);
            let pdu = att::pdu::encode_read_by_type_request(u16::from(start), u16::from(range.end()), wire_type.as_ref());
            let resp = match self.bearer.request(att::Opcode::ReadByTypeRequest, pdu).await {
                Ok(r) => r,
                Err(att::Error::Protocol(att::ErrorCode::AttributeNotFound)) => break,
                Err(e) => return Err(e.into()),
            };
            let attrs = att::pdu::decode_read_by_type_response(&resp).ok_or(Error::InvalidResponse)?;
            let Some(last) = attrs.last() else { break };
            let next = last.handle;
            for a in attrs {
                let handle = Handle::new(a.handle).ok_or(Error::InvalidResponse)?;
                if handle < range.start() || handle > range.end() {
                    return Err(Error::InvalidResponse);
                }
                if prev.is_some_and(|p| handle <= p) {
                    return Err(Error::InvalidResponse);
                }
                prev = Some(handle);
                out.push(ReadByTypeValue { handle, value: a.value });
            }
            if next >= u16::from(range.end()) {
                break;
            }
            start = Handle::new(next + 1).ok_or(Error::InvalidResponse)?;
        }
        Ok(out)
    }

    /// Discovers `service`'s characteristics and their descriptors, filling
    /// in [`RemoteService::characteristics`] ([Vol 3] Part G, Section 4.6.1,
    /// 4.7.1).
    ///
    /// Spec `# 4.4` invariants enforced here: `value_handle ==
    /// declaration_handle + 1`, and characteristic declaration handles are
    /// strictly increasing; either violation fails discovery with
    /// [`Error::InvalidResponse`] (`PacketMalformed`).
    #[instrument(skip(self, service))]
    pub async fn discover_characteristics(&self, service: &mut RemoteService) -> Result<()> {
        let decls = self.read_by_type(service.handles, Declaration::Characteristic.uuid16().as_uuid()).await?;
        let mut chars = Vec::with_capacity(decls.len());
        let mut prev_decl: Option<Handle> = None;
        for (i, d) in decls.iter().enumerate() {
            if prev_decl.is_some_and(|p| d.handle <= p) {
                return Err(Error::InvalidResponse);
            }
            prev_decl = Some(d.handle);
            if d.value.len() < 3 {
                return Err(Error::InvalidResponse);
            }
            let properties = Prop::from_bits_truncate(d.value[0]);
            let value_handle = Handle::new(u16::from_le_bytes([d.value[1], d.value[2]])).ok_or(Error::InvalidResponse)?;
            if u16::from(value_handle) != u16::from(d.handle) + 1 {
                return Err(Error::InvalidResponse);
            }
            let uuid = Uuid::try_from(&d.value[3..]).map_err(|()| Error::InvalidResponse)?;
            let end = decls
                .get(i + 1)
                .map_or(service.handles.end(), |next| Handle::new(u16::from(next.handle).saturating_sub(1)).unwrap_or(service.handles.end()));
            let descriptors = if value_handle < end {
                let from = Handle::new(u16::from(value_handle) + 1).unwrap_or(end);
                self.discover_descriptors(HandleRange::new(from, end)).await?
            } else {
                Vec::new()
            };
            chars.push(Characteristic { uuid, handle: d.handle, value_handle, properties, descriptors });
        }
        service.characteristics = chars;
        Ok(())
    }

    /// Convenience wrapper discovering every service and, for each, its
    /// characteristics and descriptors.
    pub async fn discover_all(&self) -> Result<Vec<RemoteService>> {
        let mut services = self.discover_services().await?;
        for service in &mut services {
            self.discover_characteristics(service).await?;
        }
        Ok(services)
    }

    async fn discover_descriptors(&self, range: HandleRange) -> Result<Vec<(Uuid, Handle)>> {
        let pdu = att::pdu::encode_find_information_request(u16::from(range.start()), u16::from(range.end()));
        let resp = match self.bearer.request(att::Opcode::FindInformationRequest, pdu).await {
            Ok(r) => r,
            Err(att::Error::Protocol(att::ErrorCode::AttributeNotFound)) => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let entries = att::pdu::decode_find_information_response(&resp).ok_or(Error::InvalidResponse)?;
        entries
            .into_iter()
            .map(|e| {
                let uuid = Uuid::try_from(&e.uuid[..]).map_err(|()| Error::InvalidResponse)?;
                let handle = Handle::new(e.handle).ok_or(Error::InvalidResponse)?;
                Ok((uuid, handle))
            })
            .collect()
    }

    /// Reads a characteristic or descriptor value, issuing `ReadBlobRequest`
    /// follow-ups while the *previous chunk* filled the current ATT_MTU,
    /// accumulating into a buffer bounded by `max_bytes` ([Vol 3] Part G,
    /// Section 4.8.1, 4.8.3; spec `# 4.4`/`# 8` scenario 5).
    ///
    /// Termination tracks the length of the most recently received chunk,
    /// not the cumulative value length: a value spanning any number of
    /// `MTU-1`-sized chunks keeps going until a shorter blob arrives or
    /// `max_bytes` is reached.
    pub async fn read(&self, handle: Handle, max_bytes: usize) -> Result<Vec<u8>> {
        let pdu = att::pdu::encode_read_request(u16::from(handle));
        let resp = self.bearer.request(att::Opcode::ReadRequest, pdu).await?;
        let mut value = att::pdu::decode_read_response(&resp).ok_or(Error::InvalidResponse)?.to_vec();
        if value.len() > max_bytes {
            value.truncate(max_bytes);
            return Ok(value);
        }
        let mtu = usize::from(self.bearer.mtu());
        let mut last_chunk_len = value.len();
        while should_fetch_more_blob(last_chunk_len, value.len(), max_bytes, mtu) {
            let offset = u16::try_from(value.len()).unwrap_or(u16::MAX);
            let pdu = att::pdu::encode_read_blob_request(u16::from(handle), offset);
            let resp = match self.bearer.request(att::Opcode::ReadBlobRequest, pdu).await {
                Ok(r) => r,
                Err(att::Error::Protocol(att::ErrorCode::InvalidOffset)) => break,
                Err(e) => return Err(e.into()),
            };
            let Some(blob) = att::pdu::decode_read_response(&resp) else { break };
            last_chunk_len = blob.len();
            if blob.is_empty() {
                break;
            }
            let room = max_bytes - value.len();
            if blob.len() <= room {
                value.extend_from_slice(blob);
            } else {
                value.extend_from_slice(&blob[..room]);
                break;
            }
        }
        Ok(value)
    }

    /// Writes a characteristic or descriptor value under `mode`
    /// ([Vol 3] Part G, Section 4.9).
    pub async fn write(&self, handle: Handle, value: &[u8], mode: WriteMode) -> Result<()> {
        match mode {
            WriteMode::WithoutResponse => {
                self.bearer.command(att::pdu::encode_write_request(u16::from(handle), value, true));
                Ok(())
            }
            WriteMode::WithResponse => {
                let pdu = att::pdu::encode_write_request(u16::from(handle), value, false);
                self.bearer.request(att::Opcode::WriteRequest, pdu).await?;
                Ok(())
            }
            WriteMode::Reliable => self.write_reliable(handle, value).await,
        }
    }

    async fn write_reliable(&self, handle: Handle, value: &[u8]) -> Result<()> {
        let pdu = att::pdu::encode_prepare_write_request(u16::from(handle), 0, value);
        let resp = self.bearer.request(att::Opcode::PrepareWriteRequest, pdu).await?;
        let prepared = att::pdu::decode_prepare_write_response(&resp).ok_or(Error::InvalidResponse)?;
        if prepared.handle != u16::from(handle) || prepared.offset != 0 || prepared.value != value {
            let cancel = att::pdu::encode_execute_write_request(false);
            let _ = self.bearer.request(att::Opcode::ExecuteWriteRequest, cancel).await;
            return Err(Error::NotReliable);
        }
        let pdu = att::pdu::encode_execute_write_request(true);
        self.bearer.request(att::Opcode::ExecuteWriteRequest, pdu).await?;
        Ok(())
    }

    /// Writes the Client Characteristic Configuration descriptor to enable
    /// or disable notifications/indications ([Vol 3] Part G, Section
    /// 3.3.3.3).
    pub async fn set_notify(&self, ch: &Characteristic, notify: bool, indicate: bool) -> Result<()> {
        let cccd = ch
            .descriptor(Descriptor::ClientCharacteristicConfiguration.uuid16().as_uuid())
            .ok_or(Error::NotFound)?;
        let mut bits = 0u16;
        if notify {
            bits |= 0x0001;
        }
        if indicate {
            bits |= 0x0002;
        }
        self.write(cccd, &bits.to_le_bytes(), WriteMode::WithResponse).await
    }
}

/// Whether a `read()` long-read loop should issue another `ReadBlobRequest`:
/// the previous chunk exactly filled `MTU-1` bytes (so there may be more)
/// and the accumulated value hasn't yet hit the caller's `max_bytes` bound.
fn should_fetch_more_blob(last_chunk_len: usize, value_len: usize, max_bytes: usize, mtu: usize) -> bool {
    last_chunk_len + 1 == mtu && value_len < max_bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_read_continues_past_two_full_chunks() {
        // MTU=23: a value spanning 3 full MTU-1 chunks (44 bytes so far)
        // must keep going, not stop once the cumulative length no longer
        // matches MTU-1 (the bug this guards against).
        assert!(should_fetch_more_blob(22, 44, usize::MAX, 23));
    }

    #[test]
    fn long_read_stops_on_short_blob() {
        assert!(!should_fetch_more_blob(10, 32, usize::MAX, 23));
    }

    #[test]
    fn long_read_stops_at_caller_max_bytes() {
        assert!(!should_fetch_more_blob(22, 44, 44, 23));
    }

    #[test]
    fn characteristic_looks_up_descriptor_by_uuid() {
        let cccd = Descriptor::ClientCharacteristicConfiguration.uuid16().as_uuid();
        let ch = Characteristic {
            uuid: Declaration::Characteristic.uuid16().as_uuid(),
            handle: Handle::new(2).unwrap(),
            value_handle: Handle::new(3).unwrap(),
            properties: Prop::READ | Prop::NOTIFY,
            descriptors: vec![(cccd, Handle::new(4).unwrap())],
        };
        assert_eq!(ch.descriptor(cccd), Some(Handle::new(4).unwrap()));
        assert_eq!(ch.descriptor(Declaration::Include.uuid16().as_uuid()), None);
    }
}
