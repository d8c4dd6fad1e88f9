//! Fluent builder for assembling a [`Schema`]'s attribute database.
//!
//! Attributes are appended in ascending handle order exactly as a real
//! server-side database would be populated: a service declaration, followed
//! by its includes and characteristics, each characteristic followed by its
//! value attribute and descriptors. The builder does not validate this
//! ordering; it trusts the caller the way [`Schema`]'s lookups trust a
//! well-formed `attr` slice.

use crate::gap::{Uuid, Uuid16, UuidVec};
use crate::gatt::{Declaration, Descriptor, Handle, HandleRange, Perms, Prop};

use super::{Attr, Idx, Schema};

/// Builder returned by [`Schema::build`].
#[derive(Debug)]
pub struct Builder<T> {
    attr: Vec<Attr>,
    data: Vec<u8>,
    next: u16,
    _marker: std::marker::PhantomData<T>,
}

impl<T> Builder<T> {
    pub(super) fn new() -> Self {
        Self { attr: Vec::new(), data: Vec::new(), next: 1, _marker: std::marker::PhantomData }
    }

    fn alloc(&mut self) -> Handle {
        let hdl = Handle::new(self.next).expect("attribute handle space exhausted");
        self.next += 1;
        hdl
    }

    /// Appends `bytes` to the value buffer and returns its `(start, end)`
    /// offsets.
    fn push_value(&mut self, bytes: &[u8]) -> (Idx, Idx) {
        let start = Idx::try_from(self.data.len()).expect("schema data exceeds 64 KiB");
        self.data.extend_from_slice(bytes);
        let end = Idx::try_from(self.data.len()).expect("schema data exceeds 64 KiB");
        (start, end)
    }
}

impl Builder<Schema> {
    fn service(&mut self, uuid: Uuid, primary: bool) -> &mut Self {
        let hdl = self.alloc();
        let decl = if primary { Declaration::PrimaryService } else { Declaration::SecondaryService };
        let val = self.push_value(UuidVec::new(uuid).as_ref());
        self.attr.push(Attr { hdl, typ: Some(decl.uuid16()), val, perms: Perms::readable() });
        self
    }

    /// Appends a primary service declaration ([Vol 3] Part G, Section 3.1).
    pub fn primary_service(&mut self, uuid: impl Into<Uuid>) -> &mut Self {
        self.service(uuid.into(), true)
    }

    /// Appends a secondary service declaration ([Vol 3] Part G, Section 3.1).
    pub fn secondary_service(&mut self, uuid: impl Into<Uuid>) -> &mut Self {
        self.service(uuid.into(), false)
    }

    /// Appends an include declaration for a previously built service
    /// ([Vol 3] Part G, Section 3.2). The 16-bit service UUID is embedded in
    /// the declaration value only if `uuid` is an assigned 16-bit UUID, per
    /// the defined format.
    pub fn include(&mut self, service: HandleRange, uuid: Uuid) -> &mut Self {
        let hdl = self.alloc();
        let mut bytes = Vec::with_capacity(6);
        bytes.extend_from_slice(&u16::from(service.start()).to_le_bytes());
        bytes.extend_from_slice(&u16::from(service.end()).to_le_bytes());
        if let Some(v) = uuid.as_u16() {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        let val = self.push_value(&bytes);
        self.attr.push(Attr { hdl, typ: Some(Declaration::Include.uuid16()), val, perms: Perms::readable() });
        self
    }

    /// Appends a characteristic declaration and its value attribute
    /// ([Vol 3] Part G, Section 3.3), returning `(declaration, value)`
    /// handles. The value attribute stores no application data; the GATT
    /// server dispatches reads/writes of `value` to application logic keyed
    /// by its handle, not through the schema.
    pub fn characteristic(&mut self, uuid: impl Into<Uuid>, props: Prop, perms: Perms) -> (Handle, Handle) {
        let uuid = uuid.into();
        let decl_hdl = self.alloc();
        let value_hdl = self.alloc();
        let mut bytes = Vec::with_capacity(19);
        bytes.push(props.bits());
        bytes.extend_from_slice(&u16::from(value_hdl).to_le_bytes());
        bytes.extend_from_slice(UuidVec::new(uuid).as_ref());
        let decl_val = self.push_value(&bytes);
        self.attr.push(Attr {
            hdl: decl_hdl,
            typ: Some(Declaration::Characteristic.uuid16()),
            val: decl_val,
            perms: Perms::readable(),
        });

        // A 16-bit value type fits in `Attr::typ`; a custom 128-bit type is
        // stashed in the value buffer instead, where `Schema::typ` looks for
        // it when `typ` is `None`.
        let (typ, val) = match uuid.as_uuid16() {
            Some(u) => (Some(u), self.push_value(&[])),
            None => (None, self.push_value(&u128::from(uuid).to_le_bytes())),
        };
        self.attr.push(Attr { hdl: value_hdl, typ, val, perms });
        (decl_hdl, value_hdl)
    }

    /// Appends a characteristic descriptor ([Vol 3] Part G, Section 3.3.3)
    /// to the characteristic most recently started with
    /// [`Self::characteristic`], returning its handle. `value` is the
    /// descriptor's static default, e.g. `0u16.to_le_bytes()` for a freshly
    /// reset Client Characteristic Configuration.
    pub fn descriptor(&mut self, id: Descriptor, perms: Perms, value: &[u8]) -> Handle {
        let hdl = self.alloc();
        let val = self.push_value(value);
        self.attr.push(Attr { hdl, typ: Some(id.uuid16()), val, perms });
        hdl
    }

    /// Finalizes the database, computing its hash.
    #[must_use]
    pub fn build(self) -> Schema {
        let hash_input = database_hash_input(&self.attr, &self.data);
        let hash = u128::from_le_bytes(sapphire_crypto::database_hash(&hash_input));
        Schema { attr: self.attr.into_boxed_slice(), data: self.data.into_boxed_slice(), hash }
    }
}

/// Concatenates the handle, type, and (for most attributes) value of every
/// declaration and hashable descriptor, per the database hash definition
/// ([Vol 3] Part G, Section 7.3). The Client/Server Characteristic
/// Configuration descriptors contribute only their handle and type: their
/// value is per-bond connection state, not part of the database's identity.
fn database_hash_input(attr: &[Attr], data: &[u8]) -> Vec<u8> {
    let mut buf = Vec::new();
    for at in attr {
        let Some(typ) = at.typ else { continue };
        let hashable = typ == Declaration::PrimaryService.uuid16()
            || typ == Declaration::SecondaryService.uuid16()
            || typ == Declaration::Include.uuid16()
            || typ == Declaration::Characteristic.uuid16()
            || typ == Descriptor::CharacteristicExtendedProperties.uuid16()
            || typ == Descriptor::CharacteristicPresentationFormat.uuid16()
            || typ == Descriptor::CharacteristicAggregateFormat.uuid16()
            || typ == Descriptor::ClientCharacteristicConfiguration.uuid16()
            || typ == Descriptor::ServerCharacteristicConfiguration.uuid16();
        if !hashable {
            continue;
        }
        buf.extend_from_slice(&u16::from(at.hdl).to_le_bytes());
        buf.extend_from_slice(&u16::from(typ).to_le_bytes());
        let omit_value = typ == Descriptor::ClientCharacteristicConfiguration.uuid16()
            || typ == Descriptor::ServerCharacteristicConfiguration.uuid16();
        if !omit_value {
            let (start, end) = at.val;
            buf.extend_from_slice(&data[usize::from(start)..usize::from(end)]);
        }
    }
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gap::GattServiceId;

    #[test]
    fn characteristic_allocates_consecutive_handles() {
        let mut b = Schema::build();
        b.primary_service(GattServiceId::GenericAccess);
        let (decl, val) = b.characteristic(Uuid16::sig(0x2A00), Prop::READ, Perms::readable());
        assert_eq!(u16::from(val), u16::from(decl) + 1);
    }

    #[test]
    fn build_produces_nonzero_hash_for_nonempty_schema() {
        let mut b = Schema::build();
        b.primary_service(GattServiceId::GenericAccess);
        b.characteristic(Uuid16::sig(0x2A00), Prop::READ, Perms::readable());
        let schema = b.build();
        assert_ne!(schema.hash(), 0);
    }
}
