//! BR/EDR pairing driven by Secure Simple Pairing HCI events
//! ([Vol 3] Part C, Section 5; [SPEC_FULL.md] `# 2.4`/`# 4.5`).
//!
//! There is no SMP fixed channel on BR/EDR: the controller runs the pairing
//! protocol itself and only surfaces the user-facing decision points
//! (`IoCapabilityRequest`, `UserConfirmationRequest`, ...) as HCI events.
//! [`Context`] stands in for the slice of `Host<T>` operations a pairing
//! attempt needs, playing the role the original `PairingChannel`
//! collaborator played for every phase type there — a trait object rather
//! than threading `T: Transport` through [`PairingManager`], since one
//! manager handles every peer the host is simultaneously pairing with.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex as SyncMutex, RwLock};
use tracing::{debug, trace, warn};

use crate::hci::{
    AuthenticationComplete, ConnHandle, EncryptionChange, EventCode, EventFilter, EventGuard, EventWaiterGuard,
    Host, IoCapabilityRequest, IoCapabilityResponse, LinkKeyNotification, LinkKeyRequest, PinCodeRequest,
    SimplePairingComplete, Status, Transport, UserConfirmationRequest, UserPasskeyNotification, UserPasskeyRequest,
};
use crate::le::RawAddr;
use crate::sm::phase::{choose_method, BoxFuture, FailureGuard, PairingDelegate, PairingMethod};
use crate::sm::pdu::{AuthReq, IoCapability};
use crate::sm::Result;
use crate::HostConfig;

/// Minimum accepted encryption key size in octets ([SPEC_FULL.md] `# 2.4`:
/// "policy minimum of 7 octets").
const MIN_ENCRYPTION_KEY_SIZE: u8 = 7;

/// Bonded link-key storage, implemented by [`crate::gap::PeerCache`]. Kept as
/// a trait so `sm::bredr` doesn't depend on `gap` directly.
pub trait BondStore: Send + Sync + 'static {
    fn link_key(&self, peer: RawAddr) -> Option<[u8; 16]>;
    fn store_link_key(&self, peer: RawAddr, key: [u8; 16], key_type: u8);
}

/// The slice of `Host<T>` operations BR/EDR pairing needs, boxed so
/// [`PairingManager`] doesn't carry a `T: Transport` parameter.
pub trait Context: Send + Sync + 'static {
    fn io_capability_request_reply<'a>(
        &'a self,
        peer: RawAddr,
        io_cap: u8,
        oob_data_present: bool,
        auth_requirements: u8,
    ) -> BoxFuture<'a, Result<()>>;
    fn io_capability_request_negative_reply<'a>(&'a self, peer: RawAddr, reason: Status) -> BoxFuture<'a, Result<()>>;
    fn user_confirmation_request_reply<'a>(&'a self, peer: RawAddr, accept: bool) -> BoxFuture<'a, Result<()>>;
    fn user_passkey_request_reply<'a>(&'a self, peer: RawAddr, passkey: Option<u32>) -> BoxFuture<'a, Result<()>>;
    fn link_key_request_reply<'a>(&'a self, peer: RawAddr, key: Option<&'a [u8; 16]>) -> BoxFuture<'a, Result<()>>;
    fn pin_code_request_reply<'a>(&'a self, peer: RawAddr, pin: Option<&'a [u8]>) -> BoxFuture<'a, Result<()>>;
    fn read_encryption_key_size<'a>(&'a self, cn: ConnHandle) -> BoxFuture<'a, Result<u8>>;
    fn disconnect<'a>(&'a self, cn: ConnHandle, reason: Status) -> BoxFuture<'a, Result<()>>;
}

impl<T: Transport> Context for Host<T> {
    fn io_capability_request_reply<'a>(
        &'a self,
        peer: RawAddr,
        io_cap: u8,
        oob_data_present: bool,
        auth_requirements: u8,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            Host::io_capability_request_reply(self, peer, io_cap, oob_data_present, auth_requirements).await?;
            Ok(())
        })
    }

    fn io_capability_request_negative_reply<'a>(&'a self, peer: RawAddr, reason: Status) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            Host::io_capability_request_negative_reply(self, peer, reason).await?;
            Ok(())
        })
    }

    fn user_confirmation_request_reply<'a>(&'a self, peer: RawAddr, accept: bool) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            Host::user_confirmation_request_reply(self, peer, accept).await?;
            Ok(())
        })
    }

    fn user_passkey_request_reply<'a>(&'a self, peer: RawAddr, passkey: Option<u32>) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            Host::user_passkey_request_reply(self, peer, passkey).await?;
            Ok(())
        })
    }

    fn link_key_request_reply<'a>(&'a self, peer: RawAddr, key: Option<&'a [u8; 16]>) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            Host::link_key_request_reply(self, peer, key).await?;
            Ok(())
        })
    }

    fn pin_code_request_reply<'a>(&'a self, peer: RawAddr, pin: Option<&'a [u8]>) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            Host::pin_code_request_reply(self, peer, pin).await?;
            Ok(())
        })
    }

    fn read_encryption_key_size<'a>(&'a self, cn: ConnHandle) -> BoxFuture<'a, Result<u8>> {
        Box::pin(async move { Ok(Host::read_encryption_key_size(self, cn).await?) })
    }

    fn disconnect<'a>(&'a self, cn: ConnHandle, reason: Status) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            Host::disconnect(self, cn, reason).await?;
            Ok(())
        })
    }
}

/// Per-peer pairing bookkeeping: the io capability the peer reported (needed
/// to pick `confirm_just_works` vs `confirm_numeric` the same way
/// [`choose_method`] picks the SMP pairing method), and the failure guard so
/// a late event after `SimplePairingComplete` can't double-report failure.
#[derive(Default)]
struct Attempt {
    peer_io_cap: SyncMutex<Option<IoCapability>>,
    guard: FailureGuard,
}

/// Drives Secure Simple Pairing for every BR/EDR peer concurrently
/// ([SPEC_FULL.md] `# 2.4`).
pub struct PairingManager {
    ctx: Arc<dyn Context>,
    delegate: Arc<dyn PairingDelegate>,
    bonds: Arc<dyn BondStore>,
    config: Arc<RwLock<HostConfig>>,
    attempts: SyncMutex<HashMap<RawAddr, Arc<Attempt>>>,
}

impl PairingManager {
    #[must_use]
    pub fn new(ctx: Arc<dyn Context>, delegate: Arc<dyn PairingDelegate>, bonds: Arc<dyn BondStore>, config: Arc<RwLock<HostConfig>>) -> Self {
        Self { ctx, delegate, bonds, config, attempts: SyncMutex::new(HashMap::new()) }
    }

    fn attempt(&self, peer: RawAddr) -> Arc<Attempt> {
        Arc::clone(self.attempts.lock().entry(peer).or_insert_with(|| Arc::new(Attempt::default())))
    }

    fn forget(&self, peer: RawAddr) {
        self.attempts.lock().remove(&peer);
    }

    /// Registers for every Secure Simple Pairing / encryption event and
    /// dispatches them until `waiter` is dropped or the controller is lost,
    /// matching [`crate::hci::EventReceiverTask`]'s run-to-cancellation
    /// shape. Callers keep the returned task alive for the lifetime of the
    /// host.
    pub async fn run<T: Transport>(self: &Arc<Self>, waiter: EventWaiterGuard<T>) {
        loop {
            let evt = match waiter.next().await {
                Ok(evt) => evt,
                Err(e) => {
                    debug!("BR/EDR pairing event waiter terminated: {e}");
                    return;
                }
            };
            self.handle(&evt).await;
        }
    }

    async fn handle<T: Transport>(self: &Arc<Self>, evt: &EventGuard<T>) {
        match evt.typ() {
            crate::hci::EventType::Hci(EventCode::IoCapabilityRequest) => {
                let e = IoCapabilityRequest::from(&mut evt.get());
                self.on_io_capability_request(e).await;
            }
            crate::hci::EventType::Hci(EventCode::IoCapabilityResponse) => {
                let e = IoCapabilityResponse::from(&mut evt.get());
                self.attempt(e.peer_addr).peer_io_cap.lock().replace(IoCapability::from(e.io_cap));
            }
            crate::hci::EventType::Hci(EventCode::UserConfirmationRequest) => {
                let e = UserConfirmationRequest::from(&mut evt.get());
                self.on_user_confirmation_request(e).await;
            }
            crate::hci::EventType::Hci(EventCode::UserPasskeyRequest) => {
                let e = UserPasskeyRequest::from(&mut evt.get());
                self.on_user_passkey_request(e).await;
            }
            crate::hci::EventType::Hci(EventCode::UserPasskeyNotification) => {
                let e = UserPasskeyNotification::from(&mut evt.get());
                self.delegate.display_passkey(e.passkey).await;
            }
            crate::hci::EventType::Hci(EventCode::PinCodeRequest) => {
                let e = PinCodeRequest::from(&mut evt.get());
                // Legacy (pre-2.1) pairing has no passkey/numeric delegate
                // surface; reject rather than invent a PIN.
                if let Err(e) = self.ctx.pin_code_request_reply(e.peer_addr, None).await {
                    warn!("pin_code_request_reply failed: {e}");
                }
            }
            crate::hci::EventType::Hci(EventCode::LinkKeyRequest) => {
                let e = LinkKeyRequest::from(&mut evt.get());
                let key = self.bonds.link_key(e.peer_addr);
                if let Err(err) = self.ctx.link_key_request_reply(e.peer_addr, key.as_ref()).await {
                    warn!("link_key_request_reply failed: {err}");
                }
            }
            crate::hci::EventType::Hci(EventCode::LinkKeyNotification) => {
                let e = LinkKeyNotification::from(&mut evt.get());
                self.bonds.store_link_key(e.peer_addr, e.link_key, e.key_type);
            }
            crate::hci::EventType::Hci(EventCode::SimplePairingComplete) => {
                let e = SimplePairingComplete::from(&mut evt.get());
                if !e.status.is_ok() && self.attempt(e.peer_addr).guard.trigger() {
                    warn!(peer = ?e.peer_addr, status = ?e.status, "simple pairing failed");
                }
                self.forget(e.peer_addr);
            }
            crate::hci::EventType::Hci(EventCode::AuthenticationComplete) => {
                let e = AuthenticationComplete::from(&mut evt.get());
                trace!(?e, "authentication complete");
            }
            crate::hci::EventType::Hci(EventCode::EncryptionChangeV1 | EventCode::EncryptionChangeV2) => {
                let e = EncryptionChange::from(&mut evt.get());
                self.on_encryption_change(e).await;
            }
            _ => {}
        }
    }

    async fn on_io_capability_request(&self, e: IoCapabilityRequest) {
        let cfg = self.config.read();
        let io_cap = cfg.io_capability();
        let bondable = cfg.bondable();
        drop(cfg);
        let mut auth_req = AuthReq::MITM;
        if bondable {
            auth_req |= AuthReq::BONDING;
        }
        if let Err(err) = self.ctx.io_capability_request_reply(e.peer_addr, io_cap as u8, false, auth_req.bits()).await {
            warn!("io_capability_request_reply failed: {err}");
        }
    }

    async fn on_user_confirmation_request(&self, e: UserConfirmationRequest) {
        let local_io = self.config.read().io_capability();
        let peer_io = self.attempt(e.peer_addr).peer_io_cap.lock().unwrap_or(IoCapability::NoInputNoOutput);
        let method = choose_method(local_io, peer_io, false, true, true);
        let accept = match method {
            PairingMethod::NumericComparison => self.delegate.confirm_numeric(e.numeric_value).await,
            _ => self.delegate.confirm_just_works().await,
        };
        if let Err(err) = self.ctx.user_confirmation_request_reply(e.peer_addr, accept).await {
            warn!("user_confirmation_request_reply failed: {err}");
        }
    }

    async fn on_user_passkey_request(&self, e: UserPasskeyRequest) {
        let passkey = self.delegate.request_passkey().await;
        if let Err(err) = self.ctx.user_passkey_request_reply(e.peer_addr, passkey).await {
            warn!("user_passkey_request_reply failed: {err}");
        }
    }

    async fn on_encryption_change(&self, e: EncryptionChange) {
        if !e.status.is_ok() || !e.enabled {
            return;
        }
        let size = match self.ctx.read_encryption_key_size(e.handle).await {
            Ok(size) => size,
            Err(err) => {
                warn!(handle = ?e.handle, "read_encryption_key_size failed: {err}, disconnecting");
                let _ = self.ctx.disconnect(e.handle, Status::AuthenticationFailure).await;
                return;
            }
        };
        if size < MIN_ENCRYPTION_KEY_SIZE {
            warn!(handle = ?e.handle, size, min = MIN_ENCRYPTION_KEY_SIZE, "encryption key too short, disconnecting");
            let _ = self.ctx.disconnect(e.handle, Status::AuthenticationFailure).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct NoopContext;

    impl Context for NoopContext {
        fn io_capability_request_reply<'a>(&'a self, _: RawAddr, _: u8, _: bool, _: u8) -> BoxFuture<'a, Result<()>> {
            Box::pin(async { Ok(()) })
        }
        fn io_capability_request_negative_reply<'a>(&'a self, _: RawAddr, _: Status) -> BoxFuture<'a, Result<()>> {
            Box::pin(async { Ok(()) })
        }
        fn user_confirmation_request_reply<'a>(&'a self, _: RawAddr, _: bool) -> BoxFuture<'a, Result<()>> {
            Box::pin(async { Ok(()) })
        }
        fn user_passkey_request_reply<'a>(&'a self, _: RawAddr, _: Option<u32>) -> BoxFuture<'a, Result<()>> {
            Box::pin(async { Ok(()) })
        }
        fn link_key_request_reply<'a>(&'a self, _: RawAddr, _: Option<&'a [u8; 16]>) -> BoxFuture<'a, Result<()>> {
            Box::pin(async { Ok(()) })
        }
        fn pin_code_request_reply<'a>(&'a self, _: RawAddr, _: Option<&'a [u8]>) -> BoxFuture<'a, Result<()>> {
            Box::pin(async { Ok(()) })
        }
        fn read_encryption_key_size<'a>(&'a self, _: ConnHandle) -> BoxFuture<'a, Result<u8>> {
            Box::pin(async { Ok(16) })
        }
        fn disconnect<'a>(&'a self, _: ConnHandle, _: Status) -> BoxFuture<'a, Result<()>> {
            Box::pin(async { Ok(()) })
        }
    }

    struct AlwaysAccept;

    impl PairingDelegate for AlwaysAccept {
        fn display_passkey(&self, _: u32) -> BoxFuture<'_, ()> {
            Box::pin(async {})
        }
        fn request_passkey(&self) -> BoxFuture<'_, Option<u32>> {
            Box::pin(async { Some(0) })
        }
        fn confirm_numeric(&self, _: u32) -> BoxFuture<'_, bool> {
            Box::pin(async { true })
        }
        fn confirm_just_works(&self) -> BoxFuture<'_, bool> {
            Box::pin(async { true })
        }
    }

    struct MemBonds(SyncMutex<HashMap<RawAddr, [u8; 16]>>);

    impl BondStore for MemBonds {
        fn link_key(&self, peer: RawAddr) -> Option<[u8; 16]> {
            self.0.lock().get(&peer).copied()
        }
        fn store_link_key(&self, peer: RawAddr, key: [u8; 16], _key_type: u8) {
            self.0.lock().insert(peer, key);
        }
    }

    fn manager() -> PairingManager {
        PairingManager::new(
            Arc::new(NoopContext),
            Arc::new(AlwaysAccept),
            Arc::new(MemBonds(SyncMutex::new(HashMap::new()))),
            Arc::new(RwLock::new(HostConfig::default())),
        )
    }

    #[tokio::test]
    async fn encryption_change_below_minimum_disconnects() {
        struct ShortKeyContext(AtomicBool);
        impl Context for ShortKeyContext {
            fn io_capability_request_reply<'a>(&'a self, _: RawAddr, _: u8, _: bool, _: u8) -> BoxFuture<'a, Result<()>> {
                Box::pin(async { Ok(()) })
            }
            fn io_capability_request_negative_reply<'a>(&'a self, _: RawAddr, _: Status) -> BoxFuture<'a, Result<()>> {
                Box::pin(async { Ok(()) })
            }
            fn user_confirmation_request_reply<'a>(&'a self, _: RawAddr, _: bool) -> BoxFuture<'a, Result<()>> {
                Box::pin(async { Ok(()) })
            }
            fn user_passkey_request_reply<'a>(&'a self, _: RawAddr, _: Option<u32>) -> BoxFuture<'a, Result<()>> {
                Box::pin(async { Ok(()) })
            }
            fn link_key_request_reply<'a>(&'a self, _: RawAddr, _: Option<&'a [u8; 16]>) -> BoxFuture<'a, Result<()>> {
                Box::pin(async { Ok(()) })
            }
            fn pin_code_request_reply<'a>(&'a self, _: RawAddr, _: Option<&'a [u8]>) -> BoxFuture<'a, Result<()>> {
                Box::pin(async { Ok(()) })
            }
            fn read_encryption_key_size<'a>(&'a self, _: ConnHandle) -> BoxFuture<'a, Result<u8>> {
                Box::pin(async { Ok(4) })
            }
            fn disconnect<'a>(&'a self, _: ConnHandle, reason: Status) -> BoxFuture<'a, Result<()>> {
                assert_eq!(reason, Status::AuthenticationFailure);
                self.0.store(true, Ordering::SeqCst);
                Box::pin(async { Ok(()) })
            }
        }

        let ctx = Arc::new(ShortKeyContext(AtomicBool::new(false)));
        let mgr = PairingManager::new(
            ctx.clone(),
            Arc::new(AlwaysAccept),
            Arc::new(MemBonds(SyncMutex::new(HashMap::new()))),
            Arc::new(RwLock::new(HostConfig::default())),
        );
        let handle = ConnHandle::new(1).unwrap();
        mgr.on_encryption_change(EncryptionChange { status: Status::Success, handle, enabled: true }).await;
        assert!(ctx.0.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn user_confirmation_request_reply_accepts_just_works() {
        let mgr = manager();
        mgr.on_user_confirmation_request(UserConfirmationRequest { peer_addr: RawAddr([1; 6]), numeric_value: 0 }).await;
        // NoopContext always returns Ok; reaching here without panicking
        // confirms the just-works path ran to completion.
    }
}
