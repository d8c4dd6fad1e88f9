//! Peer identity, bonding data, and the process-wide peer cache
//! ([SPEC_FULL.md] C12, spec `# 3` `Peer`/`PeerCache`, `# 4.7`).

use std::collections::HashMap;

use sapphire_crypto::{Csrk, Irk, Ltk};
use tokio::sync::broadcast;
use tracing::debug;

use crate::error::HostErrorKind;
use crate::gap::adv::AdvertisingData;
use crate::le::{Addr, RawAddr};
use crate::sm::SecurityLevel;
use crate::{PeerId, PeerIdAllocator};

/// Address kind tag, widened from [`crate::le::Addr`] to cover the BR/EDR
/// and LE-anonymous cases spec `# 3` `Peer` enumerates ("BREDR-public,
/// LE-public, LE-random, LE-anonymous").
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum PeerAddress {
    BrEdr(RawAddr),
    LePublic(RawAddr),
    LeRandom(RawAddr),
    /// Anonymous LE advertisers carry no resolvable/identity address at all;
    /// kept distinct so a [`Peer`] created from one is never mistaken for a
    /// connectable identity.
    LeAnonymous,
}

impl PeerAddress {
    /// Converts an LE controller address into the corresponding peer
    /// address kind.
    #[must_use]
    pub const fn from_le(addr: Addr) -> Self {
        match addr {
            Addr::Public(r) => Self::LePublic(r),
            Addr::Random(r) => Self::LeRandom(r),
        }
    }

    /// Returns the raw 48-bit value, if this isn't the anonymous kind.
    #[must_use]
    pub const fn raw(self) -> Option<RawAddr> {
        match self {
            Self::BrEdr(r) | Self::LePublic(r) | Self::LeRandom(r) => Some(r),
            Self::LeAnonymous => None,
        }
    }

    #[must_use]
    pub const fn is_le(self) -> bool {
        matches!(self, Self::LePublic(_) | Self::LeRandom(_) | Self::LeAnonymous)
    }
}

/// Which transport(s) a peer has been observed on (spec `# 3` `Peer`:
/// "technology").
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Technology {
    #[default]
    Le,
    BrEdr,
    DualMode,
}

impl Technology {
    /// Widens to `DualMode` if the other transport is now also known, per
    /// spec `# 3` invariant: "a Peer with a BR/EDR bond has Classic or
    /// DualMode technology".
    fn add_bredr(self) -> Self {
        match self {
            Self::Le => Self::DualMode,
            t => t,
        }
    }

    fn add_le(self) -> Self {
        match self {
            Self::BrEdr => Self::DualMode,
            t => t,
        }
    }
}

/// Per-transport connection lifecycle (spec `# 3` `Peer`: "connection state
/// per transport").
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ConnectionState {
    #[default]
    NotConnected,
    Initializing,
    Connected,
}

/// LE bonded key material (spec `# 3` `Peer`: "optional LE pairing data").
#[derive(Clone, Debug)]
pub struct LeBondData {
    pub ltk: Option<Ltk>,
    pub irk: Option<Irk>,
    pub csrk: Option<Csrk>,
    pub identity_address: Option<Addr>,
    pub security_level: SecurityLevel,
}

/// BR/EDR link key and the Secure Simple Pairing key type that produced it
/// ([Vol 2] Part E, Section 7.1.16, `HCI_Link_Key_Notification`'s "Key
/// Type").
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BrEdrKeyType {
    Combination,
    LocalUnit,
    RemoteUnit,
    DebugCombination,
    UnauthenticatedP192,
    AuthenticatedP192,
    ChangedCombination,
    UnauthenticatedP256,
    AuthenticatedP256,
}

#[derive(Clone, Debug)]
pub struct BrEdrBondData {
    pub link_key: [u8; 16],
    pub key_type: BrEdrKeyType,
}

impl BrEdrBondData {
    /// Security properties implied by the key type ([Vol 3] Part C, Section
    /// 5.2.2.8).
    #[must_use]
    pub const fn security_level(&self) -> SecurityLevel {
        match self.key_type {
            Self::DEBUG => SecurityLevel::Encrypted,
            _ if self.is_authenticated() => SecurityLevel::Authenticated,
            _ => SecurityLevel::Encrypted,
        }
    }

    const DEBUG: BrEdrKeyType = BrEdrKeyType::DebugCombination;

    const fn is_authenticated(&self) -> bool {
        matches!(
            self.key_type,
            BrEdrKeyType::AuthenticatedP192 | BrEdrKeyType::AuthenticatedP256
        )
    }
}

/// One remote Bluetooth device (spec `# 3` `Peer`).
#[derive(Clone, Debug)]
pub struct Peer {
    id: PeerId,
    address: PeerAddress,
    name: Option<String>,
    technology: Technology,
    le_state: ConnectionState,
    bredr_state: ConnectionState,
    bonded: bool,
    le_bond: Option<LeBondData>,
    bredr_bond: Option<BrEdrBondData>,
    adv_data: Option<AdvertisingData>,
    rssi: Option<i8>,
    bredr_services: Vec<crate::gap::Uuid>,
    /// Whether this peer has ever advertised as connectable on the LE/BR-EDR
    /// transport (spec `# 3` invariant: "connectable in a transport iff it
    /// has ever advertised as connectable in that transport").
    le_connectable: bool,
    bredr_connectable: bool,
}

impl Peer {
    fn new(id: PeerId, address: PeerAddress, connectable: bool) -> Self {
        let technology = if address.is_le() { Technology::Le } else { Technology::BrEdr };
        Self {
            id,
            address,
            name: None,
            technology,
            le_state: ConnectionState::NotConnected,
            bredr_state: ConnectionState::NotConnected,
            bonded: false,
            le_bond: None,
            bredr_bond: None,
            adv_data: None,
            rssi: None,
            bredr_services: Vec::new(),
            le_connectable: address.is_le() && connectable,
            bredr_connectable: !address.is_le() && connectable,
        }
    }

    #[must_use]
    pub const fn id(&self) -> PeerId {
        self.id
    }

    #[must_use]
    pub const fn address(&self) -> PeerAddress {
        self.address
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    #[must_use]
    pub const fn technology(&self) -> Technology {
        self.technology
    }

    #[must_use]
    pub const fn le_state(&self) -> ConnectionState {
        self.le_state
    }

    #[must_use]
    pub const fn bredr_state(&self) -> ConnectionState {
        self.bredr_state
    }

    #[must_use]
    pub const fn bonded(&self) -> bool {
        self.bonded
    }

    #[must_use]
    pub const fn le_bond(&self) -> Option<&LeBondData> {
        self.le_bond.as_ref()
    }

    #[must_use]
    pub const fn bredr_bond(&self) -> Option<&BrEdrBondData> {
        self.bredr_bond.as_ref()
    }

    #[must_use]
    pub fn adv_data(&self) -> Option<&AdvertisingData> {
        self.adv_data.as_ref()
    }

    #[must_use]
    pub const fn rssi(&self) -> Option<i8> {
        self.rssi
    }

    #[must_use]
    pub const fn is_le_connectable(&self) -> bool {
        self.le_connectable
    }

    #[must_use]
    pub const fn is_bredr_connectable(&self) -> bool {
        self.bredr_connectable
    }
}

/// Event emitted on the cache's own dispatcher when a [`Peer`] changes
/// (spec `# 4.7`: "registered once, called on the cache's dispatcher").
#[derive(Clone, Debug)]
pub enum PeerCacheEvent {
    Updated(PeerId),
    Removed(PeerId),
    Bonded(PeerId),
}

/// Bond-restore payload for [`PeerCache::add_bonded_peer`] (spec `# 4.7`:
/// "Required fields: identifier, address, at least one of `le_bond` or
/// `bredr_bond`. Missing fields ⇒ reject").
#[derive(Clone, Debug)]
pub struct BondingData {
    pub identifier: PeerId,
    pub address: PeerAddress,
    pub name: Option<String>,
    pub le_bond: Option<LeBondData>,
    pub bredr_bond: Option<BrEdrBondData>,
}

#[derive(Debug, Default)]
struct Entry {
    peer: Peer,
}

/// Process-wide authoritative peer store (spec `# 3` `PeerCache`, `# 4.7`).
///
/// Matches the "message passing over locks" design principle (spec `# 9`)
/// loosely: mutation still happens behind a [`parking_lot`] lock rather than
/// a dedicated actor task, since the whole stack already runs on one
/// cooperative dispatcher per spec `# 5`, but every externally observable
/// change is also announced on [`Self::subscribe`]'s broadcast channel so
/// downstream components never poll.
#[derive(Debug)]
pub struct PeerCache {
    ids: PeerIdAllocator,
    by_id: crate::SyncMutex<HashMap<PeerId, Entry>>,
    by_address: crate::SyncMutex<HashMap<PeerAddress, PeerId>>,
    events: broadcast::Sender<PeerCacheEvent>,
}

impl Default for PeerCache {
    fn default() -> Self {
        let (events, _) = broadcast::channel(64);
        Self { ids: PeerIdAllocator::default(), by_id: crate::SyncMutex::new(HashMap::new()), by_address: crate::SyncMutex::new(HashMap::new()), events }
    }
}

impl PeerCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes to cache events. Lagged receivers silently skip ahead
    /// (the cache is a cache, not a durable event log); callers that need
    /// every event should keep up.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<PeerCacheEvent> {
        self.events.subscribe()
    }

    fn notify(&self, ev: PeerCacheEvent) {
        let _ = self.events.send(ev);
    }

    /// Looks up a peer by its stable id.
    #[must_use]
    pub fn peer(&self, id: PeerId) -> Option<Peer> {
        self.by_id.lock().get(&id).map(|e| e.peer.clone())
    }

    /// Looks up a peer by its current address.
    #[must_use]
    pub fn peer_by_address(&self, addr: PeerAddress) -> Option<Peer> {
        let id = *self.by_address.lock().get(&addr)?;
        self.peer(id)
    }

    /// Returns every peer currently in the cache.
    #[must_use]
    pub fn peers(&self) -> Vec<Peer> {
        self.by_id.lock().values().map(|e| e.peer.clone()).collect()
    }

    /// Finds or creates a [`Peer`] for `address` (spec `# 4.7`:
    /// "`NewPeer(address, connectable)` returns an existing peer if the
    /// address matches ... otherwise allocates").
    pub fn new_peer(&self, address: PeerAddress, connectable: bool) -> PeerId {
        if let Some(id) = self.by_address.lock().get(&address) {
            return *id;
        }
        let id = self.ids.next();
        let peer = Peer::new(id, address, connectable);
        self.by_id.lock().insert(id, Entry { peer });
        self.by_address.lock().insert(address, id);
        debug!(?id, ?address, "peer cache: new peer");
        self.notify(PeerCacheEvent::Updated(id));
        id
    }

    /// Merges `resolved` (an LE-public identity address) into the entry
    /// currently keyed by `rpa`, per spec `# 3` `Peer` lifecycle: "address
    /// may be upgraded from LE-random to LE-public on identity resolution,
    /// which merges entries" and `# 4.7`: "the merged entry retains the
    /// stable id of the older entry". If both addresses already name
    /// distinct peers, the newer (by insertion, i.e. the one keyed by
    /// `resolved` if present) is discarded in favor of the older `rpa`
    /// entry.
    pub fn resolve_identity(&self, rpa: PeerAddress, resolved: PeerAddress) -> Option<PeerId> {
        let rpa_id = *self.by_address.lock().get(&rpa)?;
        if let Some(&other_id) = self.by_address.lock().get(&resolved) {
            if other_id != rpa_id {
                self.by_id.lock().remove(&other_id);
            }
        }
        {
            let mut by_id = self.by_id.lock();
            let entry = by_id.get_mut(&rpa_id)?;
            entry.peer.address = resolved;
            entry.peer.technology = entry.peer.technology;
        }
        let mut by_address = self.by_address.lock();
        by_address.remove(&rpa);
        by_address.insert(resolved, rpa_id);
        drop(by_address);
        self.notify(PeerCacheEvent::Updated(rpa_id));
        Some(rpa_id)
    }

    /// Restores a peer from persisted bond data (spec `# 4.7`:
    /// "`AddBondedPeer(bondingData)`").
    ///
    /// # Errors
    ///
    /// Returns [`HostErrorKind::InvalidParameters`] if neither `le_bond` nor
    /// `bredr_bond` is present.
    pub fn add_bonded_peer(&self, data: BondingData) -> Result<PeerId, HostErrorKind> {
        if data.le_bond.is_none() && data.bredr_bond.is_none() {
            return Err(HostErrorKind::InvalidParameters);
        }
        let id = data.identifier;
        let mut peer = Peer::new(id, data.address, true);
        peer.name = data.name;
        peer.bonded = true;
        if let Some(le) = data.le_bond {
            peer.technology = peer.technology.add_le();
            peer.le_bond = Some(le);
        }
        if let Some(be) = data.bredr_bond {
            peer.technology = peer.technology.add_bredr();
            peer.bredr_bond = Some(be);
        }
        self.by_id.lock().insert(id, Entry { peer });
        self.by_address.lock().insert(data.address, id);
        self.notify(PeerCacheEvent::Bonded(id));
        Ok(id)
    }

    /// Associates a classic link key with a peer found by address (spec
    /// `# 4.7`: "`StoreBrEdrBond(address, LTK)`: ... fails (non-fatally) if
    /// the peer's security properties indicate `NoSecurity`").
    ///
    /// # Errors
    ///
    /// Returns [`HostErrorKind::PeerNotFound`] if no peer has `address`, or
    /// [`HostErrorKind::NotSupported`] if `key_type` carries no meaningful
    /// security (a bare `DebugCombination` key outside test provisioning
    /// would fall in this bucket, but this stack always stores debug keys
    /// since [`BrEdrKeyType::security_level`] treats them as `Encrypted`
    /// rather than `None` — see `DESIGN.md` on `kDebugCombination`).
    pub fn store_bredr_bond(&self, address: RawAddr, key: [u8; 16], key_type: BrEdrKeyType) -> Result<PeerId, HostErrorKind> {
        let addr = PeerAddress::BrEdr(address);
        let id = *self.by_address.lock().get(&addr).ok_or(HostErrorKind::PeerNotFound)?;
        let mut by_id = self.by_id.lock();
        let entry = by_id.get_mut(&id).ok_or(HostErrorKind::PeerNotFound)?;
        entry.peer.technology = entry.peer.technology.add_bredr();
        entry.peer.bonded = true;
        entry.peer.bredr_bond = Some(BrEdrBondData { link_key: key, key_type });
        drop(by_id);
        self.notify(PeerCacheEvent::Bonded(id));
        Ok(id)
    }

    /// Stores LE pairing keys produced by [`crate::sm::le::PairingManager`]
    /// against the peer at `address`, bonding it if `bond` is set (spec
    /// `# 4.5` Phase3: "Keys are stored in the peer cache as bond data").
    pub fn store_le_bond(&self, address: Addr, bond_data: LeBondData, bond: bool) -> PeerId {
        let id = self.new_peer(PeerAddress::from_le(address), true);
        let mut by_id = self.by_id.lock();
        if let Some(entry) = by_id.get_mut(&id) {
            entry.peer.technology = entry.peer.technology.add_le();
            entry.peer.le_bond = Some(bond_data);
            entry.peer.bonded |= bond;
        }
        drop(by_id);
        self.notify(if bond { PeerCacheEvent::Bonded(id) } else { PeerCacheEvent::Updated(id) });
        id
    }

    /// Updates a peer's per-transport connection state.
    pub fn set_connection_state(&self, id: PeerId, le: Option<ConnectionState>, bredr: Option<ConnectionState>) {
        let mut by_id = self.by_id.lock();
        if let Some(entry) = by_id.get_mut(&id) {
            if let Some(le) = le {
                entry.peer.le_state = le;
            }
            if let Some(bredr) = bredr {
                entry.peer.bredr_state = bredr;
            }
        } else {
            return;
        }
        drop(by_id);
        self.notify(PeerCacheEvent::Updated(id));
    }

    /// Merges freshly observed advertising data, name, and RSSI into a
    /// peer's discovery record, marking it connectable if the payload says
    /// so (spec `# 3` `Peer` invariant on connectability).
    pub fn update_observation(&self, id: PeerId, ad: AdvertisingData, rssi: Option<i8>, connectable: bool) {
        let mut by_id = self.by_id.lock();
        let Some(entry) = by_id.get_mut(&id) else { return };
        if let Some(name) = ad.local_name() {
            if entry.peer.name.is_none() || !ad.is_short_name() {
                entry.peer.name = Some(name.to_owned());
            }
        }
        entry.peer.rssi = rssi.or(entry.peer.rssi);
        if connectable {
            if entry.peer.address.is_le() {
                entry.peer.le_connectable = true;
            } else {
                entry.peer.bredr_connectable = true;
            }
        }
        entry.peer.adv_data = Some(ad);
        drop(by_id);
        self.notify(PeerCacheEvent::Updated(id));
    }

    /// Removes a peer, per spec `# 4.7`: "Peers flagged as 'removed while
    /// disconnected' allow the id to be freed; peers that disconnect while
    /// bonded remain." Returns `false` (and leaves the peer in place)
    /// without removing it if it's still connected or still bonded.
    pub fn remove_peer(&self, id: PeerId) -> bool {
        {
            let by_id = self.by_id.lock();
            let Some(entry) = by_id.get(&id) else { return true };
            let connected = entry.peer.le_state == ConnectionState::Connected
                || entry.peer.bredr_state == ConnectionState::Connected;
            if connected || entry.peer.bonded {
                return false;
            }
        }
        let addr = self.by_id.lock().remove(&id).map(|e| e.peer.address);
        if let Some(addr) = addr {
            self.by_address.lock().remove(&addr);
        }
        self.notify(PeerCacheEvent::Removed(id));
        true
    }
}

/// [`crate::sm::bredr::BondStore`] adapter so `sm::bredr` can look up and
/// store classic link keys without depending on `gap` directly.
impl crate::sm::bredr::BondStore for PeerCache {
    fn link_key(&self, peer: RawAddr) -> Option<[u8; 16]> {
        self.peer_by_address(PeerAddress::BrEdr(peer))?.bredr_bond.as_ref().map(|b| b.link_key)
    }

    fn store_link_key(&self, peer: RawAddr, key: [u8; 16], key_type: u8) {
        let kt = bredr_key_type_from_wire(key_type);
        let _ = self.store_bredr_bond(peer, key, kt);
    }
}

/// Maps `HCI_Link_Key_Notification`'s wire key-type octet ([Vol 4] Part E,
/// Section 7.7.24) to [`BrEdrKeyType`]. `ChangedCombination` (type 6) is
/// only valid for an already-bonded peer and is resolved to the prior
/// stored type by the caller before reaching this conversion in the general
/// case; here it degrades to `Combination` if no prior type is known.
fn bredr_key_type_from_wire(v: u8) -> BrEdrKeyType {
    match v {
        0 => BrEdrKeyType::Combination,
        1 => BrEdrKeyType::LocalUnit,
        2 => BrEdrKeyType::RemoteUnit,
        3 => BrEdrKeyType::DebugCombination,
        4 => BrEdrKeyType::UnauthenticatedP192,
        5 => BrEdrKeyType::AuthenticatedP192,
        6 => BrEdrKeyType::Combination, // ChangedCombination, see doc comment above
        7 => BrEdrKeyType::UnauthenticatedP256,
        8 => BrEdrKeyType::AuthenticatedP256,
        _ => BrEdrKeyType::Combination,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(n: u8) -> RawAddr {
        RawAddr([n, 0, 0, 0, 0, 0])
    }

    #[test]
    fn new_peer_is_idempotent_by_address() {
        let cache = PeerCache::new();
        let addr = PeerAddress::LePublic(raw(1));
        let a = cache.new_peer(addr, true);
        let b = cache.new_peer(addr, true);
        assert_eq!(a, b);
        assert_eq!(cache.peers().len(), 1);
    }

    #[test]
    fn resolve_identity_keeps_older_id() {
        let cache = PeerCache::new();
        let rpa = PeerAddress::LeRandom(raw(1));
        let identity = PeerAddress::LePublic(raw(2));
        let older = cache.new_peer(rpa, true);
        let merged = cache.resolve_identity(rpa, identity).unwrap();
        assert_eq!(merged, older);
        assert_eq!(cache.peer_by_address(identity).unwrap().id(), older);
        assert!(cache.peer_by_address(rpa).is_none());
    }

    #[test]
    fn add_bonded_peer_rejects_missing_bond_data() {
        let cache = PeerCache::new();
        let data = BondingData {
            identifier: PeerId::new(1),
            address: PeerAddress::LePublic(raw(3)),
            name: None,
            le_bond: None,
            bredr_bond: None,
        };
        assert!(cache.add_bonded_peer(data).is_err());
    }

    #[test]
    fn remove_peer_keeps_bonded_entries() {
        let cache = PeerCache::new();
        let id = cache.add_bonded_peer(BondingData {
            identifier: PeerId::new(7),
            address: PeerAddress::LePublic(raw(4)),
            name: None,
            le_bond: Some(LeBondData {
                ltk: None,
                irk: None,
                csrk: None,
                identity_address: None,
                security_level: SecurityLevel::Encrypted,
            }),
            bredr_bond: None,
        })
        .unwrap();
        assert!(!cache.remove_peer(id));
        assert!(cache.peer(id).is_some());
    }

    #[test]
    fn remove_peer_frees_unbonded_disconnected() {
        let cache = PeerCache::new();
        let id = cache.new_peer(PeerAddress::LePublic(raw(5)), true);
        assert!(cache.remove_peer(id));
        assert!(cache.peer(id).is_none());
    }
}
