//! BR/EDR connection establishment and interrogation ([SPEC_FULL.md]
//! `# 2.5`/`# 4.6`).
//!
//! The controller can only page (outbound) or be paged (inbound) one peer
//! at a time ([Vol 4] Part E, Section 7.1.5); [`ConnectionManager::connect`]
//! serializes outbound attempts on `connect_lock`. Inbound
//! `HCI_Connection_Request` events are accepted unconditionally, taking the
//! Central role, and handed off to a background task so they don't block
//! the shared event dispatch.
//!
//! A freshly connected link is not handed to callers until interrogation —
//! name, version, supported features, and (if advertised) extended feature
//! pages — completes; a link whose interrogation fails is disconnected
//! rather than left half-known.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{oneshot, Mutex as AsyncMutex};
use tracing::warn;

use crate::error::{Error, HostErrorKind, Result};
use crate::hci::{
    AclDataChannel, ConnHandle, ConnectionComplete, ConnectionRequest, DisconnectionComplete, EventCode, EventGuard,
    EventType, Host, LinkType, ReadRemoteExtendedFeaturesComplete, ReadRemoteSupportedFeaturesComplete,
    ReadRemoteVersionInformationComplete, RemoteNameRequestComplete, Role, Status,
};
use crate::host::Transport;
use crate::l2cap::LogicalLink;
use crate::le::RawAddr;

/// Bit 7 of LMP features page 0 signals that extended feature pages exist
/// ([Vol 2] Part C, Section 3.3).
const EXTENDED_FEATURES_BIT: u64 = 1 << 63;

/// Disconnection reasons this manager can originate, all of which map to
/// the same `HCI_Disconnect` wire reason: the peer only ever learns "link
/// terminated by local host", not which internal cause triggered it.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DisconnectReason {
    ApiRequest,
    InterrogationFailed,
    PairingFailed,
    AclLinkError,
}

impl DisconnectReason {
    const fn status(self) -> Status {
        Status::RemoteUserTerminatedConnection
    }
}

struct PendingConnect {
    peer: RawAddr,
    tx: oneshot::Sender<ConnectionComplete>,
}

#[derive(Default)]
struct Interrogation {
    peer: RawAddr,
    name: crate::SyncMutex<Option<oneshot::Sender<RemoteNameRequestComplete>>>,
    version: crate::SyncMutex<Option<oneshot::Sender<ReadRemoteVersionInformationComplete>>>,
    features: crate::SyncMutex<Option<oneshot::Sender<ReadRemoteSupportedFeaturesComplete>>>,
    ext_features: crate::SyncMutex<Option<oneshot::Sender<ReadRemoteExtendedFeaturesComplete>>>,
}

/// BR/EDR connection establishment, inbound-request acceptance, and
/// interrogation ([SPEC_FULL.md] C11).
pub struct ConnectionManager<T: Transport> {
    host: Host<T>,
    acl: Arc<AclDataChannel<T>>,
    connect_lock: AsyncMutex<()>,
    pending: crate::SyncMutex<Option<PendingConnect>>,
    inbound: crate::SyncMutex<HashMap<RawAddr, oneshot::Sender<ConnectionComplete>>>,
    interrogations: crate::SyncMutex<HashMap<ConnHandle, Arc<Interrogation>>>,
    /// Handles whose interrogation has completed; [`Self::is_ready`] gates
    /// dynamic channel opening on membership here (spec `# 4.6`:
    /// "channel-open gating until interrogation completes").
    ready: crate::SyncMutex<std::collections::HashSet<ConnHandle>>,
    links: crate::SyncMutex<HashMap<ConnHandle, LogicalLink<T>>>,
}

impl<T: Transport> ConnectionManager<T> {
    #[must_use]
    pub fn new(host: Host<T>, acl: Arc<AclDataChannel<T>>) -> Self {
        Self {
            host,
            acl,
            connect_lock: AsyncMutex::new(()),
            pending: crate::SyncMutex::new(None),
            inbound: crate::SyncMutex::new(HashMap::new()),
            interrogations: crate::SyncMutex::new(HashMap::new()),
            ready: crate::SyncMutex::new(std::collections::HashSet::new()),
            links: crate::SyncMutex::new(HashMap::new()),
        }
    }

    /// Whether `handle`'s interrogation has completed and dynamic channels
    /// may be opened on it.
    #[must_use]
    pub fn is_ready(&self, handle: ConnHandle) -> bool {
        self.ready.lock().contains(&handle)
    }

    /// Returns a connected, interrogated link, if `handle` is still up.
    #[must_use]
    pub fn link(&self, handle: ConnHandle) -> Option<LogicalLink<T>> {
        self.links.lock().get(&handle).cloned()
    }

    /// Pages `peer_addr`, waits for `HCI_Connection_Complete`, and runs
    /// interrogation before returning the link.
    ///
    /// # Errors
    ///
    /// Returns an error if the page fails, or if interrogation fails (in
    /// which case the link is disconnected before this returns).
    pub async fn connect(self: &Arc<Self>, peer_addr: RawAddr, params: ConnectParams) -> Result<LogicalLink<T>> {
        let _serial = self.connect_lock.lock().await;
        let (tx, rx) = oneshot::channel();
        *self.pending.lock() = Some(PendingConnect { peer: peer_addr, tx });

        let page = self
            .host
            .create_connection(
                peer_addr,
                params.pkt_type,
                params.page_scan_repetition_mode,
                params.clock_offset,
                params.allow_role_switch,
            )
            .await;
        if let Err(e) = page {
            *self.pending.lock() = None;
            return Err(e.into());
        }

        let complete = rx.await.map_err(|_| Error::Host(HostErrorKind::Failed))?;
        if !complete.status.is_ok() {
            return Err(Error::Host(HostErrorKind::Failed));
        }
        self.interrogate(complete.handle, complete.peer_addr).await?;
        let link = LogicalLink::new(complete.handle, Arc::clone(&self.acl), false);
        self.links.lock().insert(complete.handle, link.clone());
        Ok(link)
    }

    /// Terminates `handle`, recording `reason` only in logs — the peer sees
    /// the same `RemoteUserTerminatedConnection` status regardless of cause.
    pub async fn disconnect(&self, handle: ConnHandle, reason: DisconnectReason) -> Result<()> {
        warn!(?handle, ?reason, "disconnecting BR/EDR link");
        self.host.disconnect(handle, reason.status()).await?;
        self.ready.lock().remove(&handle);
        Ok(())
    }

    /// Feeds one connection/interrogation event in from the shared
    /// `ChanManager` dispatch.
    pub(crate) fn on_event(self: &Arc<Self>, guard: &EventGuard<T>) {
        match guard.typ() {
            EventType::Hci(EventCode::ConnectionComplete) => self.on_connection_complete(guard),
            EventType::Hci(EventCode::ConnectionRequest) => {
                let req = ConnectionRequest::from(&mut guard.get());
                let this = Arc::clone(self);
                tokio::spawn(async move { this.accept_inbound(req).await });
            }
            EventType::Hci(EventCode::RemoteNameRequestComplete) => {
                let e = RemoteNameRequestComplete::from(&mut guard.get());
                let tx = self
                    .interrogations
                    .lock()
                    .values()
                    .find(|i| i.peer == e.peer_addr)
                    .and_then(|i| i.name.lock().take());
                if let Some(tx) = tx {
                    let _ = tx.send(e);
                }
            }
            EventType::Hci(EventCode::ReadRemoteVersionInformationComplete) => {
                let e = ReadRemoteVersionInformationComplete::from(&mut guard.get());
                if let Some(tx) = self.interrogations.lock().get(&e.handle).and_then(|i| i.version.lock().take()) {
                    let _ = tx.send(e);
                }
            }
            EventType::Hci(EventCode::ReadRemoteSupportedFeaturesComplete) => {
                let e = ReadRemoteSupportedFeaturesComplete::from(&mut guard.get());
                if let Some(tx) = self.interrogations.lock().get(&e.handle).and_then(|i| i.features.lock().take()) {
                    let _ = tx.send(e);
                }
            }
            EventType::Hci(EventCode::ReadRemoteExtendedFeaturesComplete) => {
                let e = ReadRemoteExtendedFeaturesComplete::from(&mut guard.get());
                if let Some(tx) = self.interrogations.lock().get(&e.handle).and_then(|i| i.ext_features.lock().take()) {
                    let _ = tx.send(e);
                }
            }
            EventType::Hci(EventCode::DisconnectionComplete) => {
                let handle = DisconnectionComplete::from(&mut guard.get()).handle;
                self.ready.lock().remove(&handle);
                self.interrogations.lock().remove(&handle);
                self.links.lock().remove(&handle);
            }
            _ => {}
        }
    }

    fn on_connection_complete(&self, guard: &EventGuard<T>) {
        let e = ConnectionComplete::from(&mut guard.get());
        let outbound = {
            let mut pending = self.pending.lock();
            match pending.as_ref() {
                Some(p) if p.peer == e.peer_addr => pending.take(),
                _ => None,
            }
        };
        if let Some(p) = outbound {
            let _ = p.tx.send(e);
            return;
        }
        if let Some(tx) = self.inbound.lock().remove(&e.peer_addr) {
            let _ = tx.send(e);
        }
    }

    async fn accept_inbound(self: Arc<Self>, req: ConnectionRequest) {
        if req.link_type != LinkType::Acl {
            let _ = self.host.reject_connection_request(req.peer_addr, Status::UnsupportedFeatureOrParameterValue).await;
            return;
        }
        let (tx, rx) = oneshot::channel();
        self.inbound.lock().insert(req.peer_addr, tx);
        if let Err(e) = self.host.accept_connection_request(req.peer_addr, Role::Central).await {
            warn!(?e, peer = ?req.peer_addr, "failed to accept inbound BR/EDR connection request");
            self.inbound.lock().remove(&req.peer_addr);
            return;
        }
        let Ok(complete) = rx.await else { return };
        if !complete.status.is_ok() {
            return;
        }
        if self.interrogate(complete.handle, complete.peer_addr).await.is_err() {
            let _ = self.disconnect(complete.handle, DisconnectReason::InterrogationFailed).await;
            return;
        }
        let link = LogicalLink::new(complete.handle, Arc::clone(&self.acl), false);
        self.links.lock().insert(complete.handle, link);
    }

    async fn interrogate(&self, handle: ConnHandle, peer: RawAddr) -> Result<()> {
        let interrogation = Arc::new(Interrogation { peer, ..Interrogation::default() });
        self.interrogations.lock().insert(handle, Arc::clone(&interrogation));
        let result = self.run_interrogation(handle, peer, &interrogation).await;
        self.interrogations.lock().remove(&handle);
        match result {
            Ok(()) => {
                self.ready.lock().insert(handle);
                Ok(())
            }
            Err(e) => {
                warn!(?handle, %e, "BR/EDR interrogation failed");
                let _ = self.disconnect(handle, DisconnectReason::InterrogationFailed).await;
                Err(e)
            }
        }
    }

    async fn run_interrogation(&self, handle: ConnHandle, peer: RawAddr, interrogation: &Interrogation) -> Result<()> {
        let (name_tx, name_rx) = oneshot::channel();
        *interrogation.name.lock() = Some(name_tx);
        self.host.remote_name_request(peer, 0, 0).await?;
        let _name = name_rx.await.map_err(|_| Error::Host(HostErrorKind::Failed))?;

        let (ver_tx, ver_rx) = oneshot::channel();
        *interrogation.version.lock() = Some(ver_tx);
        self.host.read_remote_version_information(handle).await?;
        let _version = ver_rx.await.map_err(|_| Error::Host(HostErrorKind::Failed))?;

        let (feat_tx, feat_rx) = oneshot::channel();
        *interrogation.features.lock() = Some(feat_tx);
        self.host.read_remote_supported_features(handle).await?;
        let features = feat_rx.await.map_err(|_| Error::Host(HostErrorKind::Failed))?;

        if features.features & EXTENDED_FEATURES_BIT != 0 {
            let mut page = 1_u8;
            loop {
                let (ext_tx, ext_rx) = oneshot::channel();
                *interrogation.ext_features.lock() = Some(ext_tx);
                self.host.read_remote_extended_features(handle, page).await?;
                let ext = ext_rx.await.map_err(|_| Error::Host(HostErrorKind::Failed))?;
                if page >= ext.max_page {
                    break;
                }
                page += 1;
            }
        }
        Ok(())
    }
}

/// `HCI_Create_Connection` parameters (spec `# 4.6`).
#[derive(Clone, Copy, Debug)]
pub struct ConnectParams {
    pub pkt_type: u16,
    pub page_scan_repetition_mode: u8,
    pub clock_offset: u16,
    pub allow_role_switch: bool,
}

impl Default for ConnectParams {
    fn default() -> Self {
        Self {
            // DM1/DH1/DM3/DH3/DM5/DH5, no SCO ([Vol 4] Part E, Section 7.1.5).
            pkt_type: 0xCC18,
            page_scan_repetition_mode: 0x01,
            clock_offset: 0x0000,
            allow_role_switch: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disconnect_reasons_map_to_remote_user_terminated() {
        for r in [
            DisconnectReason::ApiRequest,
            DisconnectReason::InterrogationFailed,
            DisconnectReason::PairingFailed,
            DisconnectReason::AclLinkError,
        ] {
            assert_eq!(r.status(), Status::RemoteUserTerminatedConnection);
        }
    }

    #[test]
    fn connect_params_defaults_allow_role_switch() {
        assert!(ConnectParams::default().allow_role_switch);
    }
}
