//! LE connection establishment ([SPEC_FULL.md] `# 2.5`/`# 4.6`).
//!
//! Only one `HCI_LE_Create_Connection` may be outstanding at a time ([Vol 4]
//! Part E, Section 7.8.12); [`ConnectionManager::connect`] serializes on
//! `connect_lock` rather than queuing, so a second caller simply waits for
//! the first attempt (success, failure, or cancellation) to finish before
//! its own command is sent.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, Mutex as AsyncMutex};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{Error, HostErrorKind, Result};
use crate::hci::{
    AclDataChannel, ConnHandle, DisconnectionComplete, EventCode, EventGuard, EventType, Host, LeConnectionComplete,
    Role, Status, SubeventCode,
};
use crate::host::Transport;
use crate::l2cap::{ChannelParameters, LogicalLink, Psm, WeakChannel};
use crate::le::Addr;
use crate::sm::{le::PairingManager, SecurityLevel};
use crate::HostConfig;

use super::{LeBondData, PeerAddress, PeerCache};

/// [Vol 4] Part E, Section 7.8.12's "await either `LEConnectionComplete` or
/// a 10-second timeout" (spec `# 4.6`).
const CREATE_CONNECTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Stands in for the platform-specific policy that resolves which local
/// address type ([Vol 4] Part E, Section 7.8.12's `Own_Address_Type`) to use
/// for the next connection attempt, e.g. consulting a resolving-list /
/// address-rotation scheme this stack doesn't own (spec `# 4.6`: "resolve
/// the local address type via the `LocalAddressDelegate`"). Mirrors
/// [`crate::sm::PairingDelegate`]'s role as a declared-but-external
/// collaborator.
pub trait LocalAddressDelegate: Send + Sync + 'static {
    /// Resolves the `Own_Address_Type` octet for the next
    /// `HCI_LE_Create_Connection`.
    fn own_address_type(&self) -> crate::sm::BoxFuture<'_, u8>;
}

/// An always-public-address delegate, useful for hosts with no privacy
/// policy of their own.
#[derive(Clone, Copy, Debug, Default)]
pub struct PublicAddressDelegate;

impl LocalAddressDelegate for PublicAddressDelegate {
    fn own_address_type(&self) -> crate::sm::BoxFuture<'_, u8> {
        Box::pin(async { 0x00 })
    }
}

struct PendingConnect {
    tx: oneshot::Sender<LeConnectionComplete>,
}

/// LE connection establishment, cancellation, and pairing-gated dynamic
/// channel opening ([SPEC_FULL.md] C11).
pub struct ConnectionManager<T: Transport> {
    host: Host<T>,
    acl: Arc<AclDataChannel<T>>,
    delegate: Arc<dyn LocalAddressDelegate>,
    connect_lock: AsyncMutex<()>,
    /// Set for the lifetime of one [`Self::connect`] call (spec `# 4.6`:
    /// "During initiation, random-address changes are disallowed").
    initiating: AtomicBool,
    pending: crate::SyncMutex<Option<PendingConnect>>,
    links: crate::SyncMutex<HashMap<ConnHandle, LogicalLink<T>>>,
}

impl<T: Transport> ConnectionManager<T> {
    #[must_use]
    pub fn new(host: Host<T>, acl: Arc<AclDataChannel<T>>, delegate: Arc<dyn LocalAddressDelegate>) -> Self {
        Self {
            host,
            acl,
            delegate,
            connect_lock: AsyncMutex::new(()),
            initiating: AtomicBool::new(false),
            pending: crate::SyncMutex::new(None),
            links: crate::SyncMutex::new(HashMap::new()),
        }
    }

    /// Returns a connected link previously handed back by [`Self::connect`],
    /// if it's still up.
    #[must_use]
    pub fn link(&self, handle: ConnHandle) -> Option<LogicalLink<T>> {
        self.links.lock().get(&handle).cloned()
    }

    /// Whether a connection is currently being initiated (spec `# 4.6`'s
    /// random-address lockout window).
    #[must_use]
    pub fn is_initiating(&self) -> bool {
        self.initiating.load(Ordering::Acquire)
    }

    /// Initiates an LE connection to `peer`, honoring `cancel` both before
    /// and after `HCI_LE_Create_Connection` is sent (spec `# 4.6`: "during
    /// this window a Cancel must be honored without sending any controller
    /// command").
    ///
    /// # Errors
    ///
    /// Returns [`HostErrorKind::Canceled`] if `cancel` fired, or
    /// [`HostErrorKind::TimedOut`] if no completion arrived within
    /// [`CREATE_CONNECTION_TIMEOUT`].
    pub async fn connect(&self, peer: Addr, params: &ConnectParams, cancel: &CancellationToken) -> Result<LogicalLink<T>> {
        let _serial = self.connect_lock.lock().await;
        self.initiating.store(true, Ordering::Release);
        let result = self.connect_inner(peer, params, cancel).await;
        self.initiating.store(false, Ordering::Release);
        *self.pending.lock() = None;
        result
    }

    async fn connect_inner(&self, peer: Addr, params: &ConnectParams, cancel: &CancellationToken) -> Result<LogicalLink<T>> {
        let own_addr_type = tokio::select! {
            t = self.delegate.own_address_type() => t,
            () = cancel.cancelled() => return Err(Error::canceled()),
        };

        let (tx, mut rx) = oneshot::channel();
        *self.pending.lock() = Some(PendingConnect { tx });

        self.host
            .le_create_connection(
                params.scan_interval,
                params.scan_window,
                params.use_filter_accept_list,
                peer,
                own_addr_type,
                params.conn_interval,
                params.peripheral_latency,
                params.supervision_timeout,
            )
            .await?;

        let complete = tokio::select! {
            r = &mut rx => r.map_err(|_| Error::Host(HostErrorKind::Failed))?,
            () = tokio::time::sleep(CREATE_CONNECTION_TIMEOUT) => {
                debug!(?peer, "LE create connection timed out, canceling");
                let _ = self.host.le_create_connection_cancel().await;
                return match rx.await {
                    Ok(c) if c.status == Status::UnknownConnectionIdentifier => Err(Error::timed_out()),
                    Ok(c) if c.status.is_ok() => self.finish(c),
                    Ok(_) => Err(Error::Host(HostErrorKind::Failed)),
                    Err(_) => Err(Error::timed_out()),
                };
            }
            () = cancel.cancelled() => {
                debug!(?peer, "LE create connection canceled, canceling with controller");
                let _ = self.host.le_create_connection_cancel().await;
                return match rx.await {
                    Ok(c) if c.status == Status::UnknownConnectionIdentifier => Err(Error::canceled()),
                    Ok(c) if c.status.is_ok() => self.finish(c),
                    Ok(_) => Err(Error::Host(HostErrorKind::Failed)),
                    Err(_) => Err(Error::canceled()),
                };
            }
        };
        self.finish(complete)
    }

    fn finish(&self, complete: LeConnectionComplete) -> Result<LogicalLink<T>> {
        if !complete.status.is_ok() {
            return Err(Error::Host(HostErrorKind::Failed));
        }
        let link = LogicalLink::new(complete.handle, Arc::clone(&self.acl), true);
        self.links.lock().insert(complete.handle, link.clone());
        Ok(link)
    }

    /// Feeds one `HCI_LE_Connection_Complete`/`HCI_LE_Enhanced_Connection_Complete`
    /// event in from the shared `ChanManager` dispatch. Events reporting a
    /// `Peripheral` role are unsolicited inbound connections (this stack's
    /// advertising manager's concern, not a connection this manager
    /// initiated) and are ignored here.
    pub(crate) fn on_event(&self, guard: &EventGuard<T>) {
        if guard.typ() == EventType::Hci(EventCode::DisconnectionComplete) {
            let handle = DisconnectionComplete::from(&mut guard.get()).handle;
            self.links.lock().remove(&handle);
            return;
        }
        if !matches!(guard.typ(), EventType::Le(SubeventCode::ConnectionComplete | SubeventCode::EnhancedConnectionComplete)) {
            return;
        }
        let complete = LeConnectionComplete::from(&mut guard.get());
        if complete.role == Role::Peripheral {
            return;
        }
        if let Some(pending) = self.pending.lock().take() {
            let _ = pending.tx.send(complete);
        }
    }

    /// Opens a dynamic L2CAP channel on `link`, first raising the link to
    /// `required` security if the cached peer isn't there yet (spec `# 4.6`:
    /// "pairing-gated `OpenL2capChannel`").
    ///
    /// # Errors
    ///
    /// Propagates pairing failures and [`crate::l2cap::Error`] (signaling
    /// timeout, mode mismatch, peer refusal).
    #[allow(clippy::too_many_arguments)]
    pub async fn open_l2cap_channel(
        &self,
        link: &LogicalLink<T>,
        peer_addr: Addr,
        required: SecurityLevel,
        psm: Psm,
        params: ChannelParameters,
        pairing: &PairingManager<T>,
        peers: &PeerCache,
        config: &HostConfig,
    ) -> Result<WeakChannel<T>> {
        let current = peers
            .peer_by_address(PeerAddress::from_le(peer_addr))
            .and_then(|p| p.le_bond().map(|b| b.security_level))
            .unwrap_or_default();
        if current < required {
            let mitm_required = required >= SecurityLevel::Authenticated;
            let sc_supported = required == SecurityLevel::AuthenticatedSecureConnections;
            let keys = pairing.pair_as_initiator(config, mitm_required, sc_supported).await?;
            peers.store_le_bond(
                peer_addr,
                LeBondData {
                    ltk: keys.ltk,
                    irk: keys.irk,
                    csrk: keys.csrk,
                    identity_address: keys.identity_addr,
                    security_level: keys.security_level,
                },
                config.bondable(),
            );
        }
        Ok(link.open_outbound(psm, params).await?)
    }
}

/// `HCI_LE_Create_Connection` scan/connection parameters (spec `# 4.6`).
/// Defaults match commonly used "fast connect" values.
#[derive(Clone, Copy, Debug)]
pub struct ConnectParams {
    pub scan_interval: Duration,
    pub scan_window: Duration,
    pub use_filter_accept_list: bool,
    pub conn_interval: (Duration, Duration),
    pub peripheral_latency: u16,
    pub supervision_timeout: Duration,
}

impl Default for ConnectParams {
    fn default() -> Self {
        Self {
            scan_interval: Duration::from_millis(60),
            scan_window: Duration::from_millis(30),
            use_filter_accept_list: false,
            conn_interval: (Duration::from_millis(30), Duration::from_millis(50)),
            peripheral_latency: 0,
            supervision_timeout: Duration::from_secs(10),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_params_defaults_are_sane() {
        let p = ConnectParams::default();
        assert!(p.scan_window <= p.scan_interval);
        assert!(p.conn_interval.0 <= p.conn_interval.1);
    }
}
