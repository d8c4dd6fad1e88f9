//! Generic Access Profile: connection establishment, interrogation, and the
//! peer cache ([SPEC_FULL.md] C11/C12).
//!
//! [`Stack`] is the crate's one owner of the two singleton event
//! registrations — [`crate::hci::EventFilter::ChanManager`] and
//! [`crate::hci::EventFilter::SecDb`] — and of the background tasks that
//! follow from owning them: the shared ACL data channel's credit/lifecycle
//! bookkeeping, the LE and BR/EDR connection managers' event dispatch,
//! inbound ACL reassembly routing, and BR/EDR Secure Simple Pairing.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::warn;

use crate::hci::{AclDataChannel, ConnHandle, EventFilter, EventReceiverTask, Host};
use crate::host::Transport;
use crate::sm::PairingDelegate;
use crate::HostConfig;

#[path = "consts.rs"]
mod consts;
#[path = "uuid.rs"]
mod uuid;
#[path = "adv.rs"]
pub mod adv;
#[path = "peer.rs"]
mod peer;
#[path = "le.rs"]
pub mod le;
#[path = "bredr.rs"]
pub mod bredr;

pub use adv::AdvertisingData;
pub use consts::{AdvFlag, Appearance};
pub use peer::{
    BondingData, BrEdrBondData, BrEdrKeyType, ConnectionState, LeBondData, Peer, PeerAddress, PeerCache,
    PeerCacheEvent, Technology,
};
pub use uuid::{CharacteristicId, DescriptorId, GattServiceId, ServiceClassId, Uuid, Uuid16, UuidType, UuidVec};

/// Brings the host stack's GAP layer up: reads the controller's ACL buffer
/// descriptor, starts the event receiver, claims the `ChanManager`/`SecDb`
/// event singletons, and wires the LE/BR-EDR connection managers and BR/EDR
/// pairing manager to them.
///
/// # Errors
///
/// Returns an error if the initial `HCI_Read_Buffer_Size` fails or either
/// singleton event registration is already claimed (spec `# 4.1`: at most
/// one `ChanManager`/`SecDb` waiter may exist at a time).
pub async fn bring_up<T: Transport + 'static>(
    host: Host<T>,
    local_addr_delegate: Arc<dyn le::LocalAddressDelegate>,
    pairing_delegate: Arc<dyn PairingDelegate>,
    config: HostConfig,
) -> crate::error::Result<Arc<Stack<T>>> {
    let bs = host.read_buffer_size().await?;
    let acl = AclDataChannel::new(host.clone(), bs);
    let events = EventReceiverTask::new(host.clone());

    let chan_waiter = host.events.register(EventFilter::ChanManager)?;
    let secdb_waiter = host.events.register(EventFilter::SecDb)?;

    let peers = Arc::new(PeerCache::default());
    let le = Arc::new(le::ConnectionManager::new(host.clone(), Arc::clone(&acl), local_addr_delegate));
    let bredr = Arc::new(bredr::ConnectionManager::new(host.clone(), Arc::clone(&acl)));

    let config = Arc::new(RwLock::new(config));
    let ctx: Arc<dyn crate::sm::bredr::Context> = Arc::new(host.clone());
    let bonds: Arc<dyn crate::sm::bredr::BondStore> = Arc::clone(&peers) as Arc<dyn crate::sm::bredr::BondStore>;
    let bredr_pairing = Arc::new(crate::sm::bredr::PairingManager::new(ctx, pairing_delegate, bonds, Arc::clone(&config)));

    let stack = Arc::new(Stack {
        host: host.clone(),
        acl: Arc::clone(&acl),
        le: Arc::clone(&le),
        bredr: Arc::clone(&bredr),
        peers,
        config,
        bredr_pairing: Arc::clone(&bredr_pairing),
        _events: events,
    });

    tokio::spawn(dispatch_chan_events(Arc::clone(&acl), le, bredr, chan_waiter));
    tokio::spawn(run_acl_in(Arc::clone(&stack)));
    tokio::spawn(async move { bredr_pairing.run(secdb_waiter).await });

    Ok(stack)
}

/// Drains the `ChanManager` waiter for the lifetime of the host, fanning
/// each event to the ACL credit tracker and both connection managers. A
/// single dispatcher (rather than three independent waiters) is what lets
/// the singleton registration exist at all.
async fn dispatch_chan_events<T: Transport>(
    acl: Arc<AclDataChannel<T>>,
    le: Arc<le::ConnectionManager<T>>,
    bredr: Arc<bredr::ConnectionManager<T>>,
    waiter: crate::hci::EventWaiterGuard<T>,
) {
    loop {
        let evt = match waiter.next().await {
            Ok(evt) => evt,
            Err(e) => {
                tracing::debug!("ChanManager event waiter terminated: {e}");
                return;
            }
        };
        acl.on_event(&evt);
        le.on_event(&evt);
        bredr.on_event(&evt);
    }
}

/// Reads inbound ACL transfers and routes each reassembled fragment to the
/// [`crate::l2cap::LogicalLink`] for its connection handle, parsed from the
/// first two octets of the ACL header ([Vol 4] Part E, Section 5.4.2):
/// handle in the low 12 bits, flags in the high 4.
async fn run_acl_in<T: Transport>(stack: Arc<Stack<T>>) {
    loop {
        let mut xfer = stack.host.transport().acl_in();
        xfer.reset();
        let xfer = match xfer.submit() {
            Ok(fut) => fut.await,
            Err(e) => {
                warn!("failed to submit inbound ACL transfer: {e}");
                continue;
            }
        };
        match xfer.result() {
            Some(Ok(())) => stack.route_acl_in(xfer.as_ref()),
            Some(Err(e)) => warn!("inbound ACL transfer failed: {e}"),
            None => {}
        }
    }
}

/// Owns the shared ACL data channel, the LE/BR-EDR connection managers, the
/// peer cache, and BR/EDR pairing for one controller ([SPEC_FULL.md] C11).
pub struct Stack<T: Transport> {
    host: Host<T>,
    acl: Arc<AclDataChannel<T>>,
    pub le: Arc<le::ConnectionManager<T>>,
    pub bredr: Arc<bredr::ConnectionManager<T>>,
    pub peers: Arc<PeerCache>,
    pub config: Arc<RwLock<HostConfig>>,
    pub bredr_pairing: Arc<crate::sm::bredr::PairingManager>,
    _events: EventReceiverTask,
}

impl<T: Transport> Stack<T> {
    /// Looks up a reassembled ACL fragment's connection handle against
    /// whichever connection manager established it and feeds it to that
    /// link's demultiplexer.
    fn route_acl_in(&self, data: &[u8]) {
        if data.len() < 4 {
            return;
        }
        let raw = u16::from_le_bytes([data[0], data[1]]) & 0x0FFF;
        let Some(handle) = ConnHandle::new(raw) else { return };
        let link = self.le.link(handle).or_else(|| self.bredr.link(handle));
        if let Some(link) = link {
            link.on_acl_data(handle, data);
        }
    }
}
