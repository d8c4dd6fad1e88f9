//! L2CAP logical link: channel demultiplexer, signaling engine, and dynamic
//! channel orchestration for one ACL connection ([SPEC_FULL.md] C5-C7).
//!
//! Per Design Notes `# 9`, the link owns an arena of channels indexed by
//! [`Cid`] rather than a reference-counted link/channel/bearer graph;
//! [`WeakChannel`] is a `(link, cid)` pair that no-ops on use after the
//! channel (or link) is gone, mechanically ruling out use-after-free without
//! runtime ref-counting.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use slab::Slab;
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

use crate::hci::{AclDataChannel, ConnHandle, Priority};
use crate::host::Transport;
use crate::l2cap::channel::{Channel, ChannelParameters, Cid, Mode};
use crate::l2cap::dynamic::{self, DynamicChannel, ModeOutcome, Registry, State};
use crate::l2cap::frame::{self, Recombiner};
use crate::l2cap::signaling::{
    self, Code, Command, ConfigOption, ConfigResult, ConnectionRequest, ConnectionResponse, ConnectionResult,
    ConfigurationRequest, ConfigurationResponse, DisconnectionParams, ExtendedFeaturesResponse, IdAllocator, RfcMode,
    RTX_TIMEOUT,
};
use crate::l2cap::{Error, Psm, Result};

/// A weak, cid-scoped handle to a channel on a link. Every use is a lookup
/// through the link's arena; a link or channel that has gone away simply
/// fails the lookup instead of dangling.
#[derive(Clone, Debug)]
pub struct WeakChannel<T: Transport> {
    link: Weak<Inner<T>>,
    cid: Cid,
}

impl<T: Transport> WeakChannel<T> {
    /// Returns the channel's local CID.
    #[must_use]
    pub const fn cid(&self) -> Cid {
        self.cid
    }

    /// Attaches an upper-layer owner, returning a receiver for inbound SDUs
    /// plus any already queued before attach, or `None` if the link or
    /// channel is gone.
    pub fn attach(&self) -> Option<(tokio::sync::mpsc::UnboundedReceiver<Vec<u8>>, Vec<Vec<u8>>)> {
        let link = self.link.upgrade()?;
        let key = *link.index.lock().get(&self.cid)?;
        Some(link.arena.lock()[key].attach())
    }

    /// Sends an SDU on the channel, a no-op if the link or channel is gone.
    pub fn send(&self, sdu: &[u8]) {
        if let Some(link) = self.link.upgrade() {
            link.send(self.cid, sdu);
        }
    }

    /// Closes the channel, a no-op if already gone.
    pub async fn close(&self) {
        if let Some(link) = self.link.upgrade() {
            link.close_channel(self.cid).await;
        }
    }
}

struct PendingSignal {
    tx: oneshot::Sender<Command>,
}

struct Inner<T: Transport> {
    handle: ConnHandle,
    acl: Arc<AclDataChannel<T>>,
    acl_mtu: u16,
    signaling_cid: Cid,
    arena: Mutex<Slab<Channel>>,
    index: Mutex<HashMap<Cid, usize>>,
    dynamic: Mutex<Registry>,
    ids: Mutex<IdAllocator>,
    pending: Mutex<HashMap<u8, PendingSignal>>,
    recombiner: Mutex<Recombiner>,
    /// Peer's `InformationResponse(ExtendedFeatures)`, fetched once per link
    /// and memoized (spec `# 4.3` step 4).
    extended_features: Mutex<Option<u32>>,
    closed: std::sync::atomic::AtomicBool,
}

/// The L2CAP demultiplexer for one ACL connection ([SPEC_FULL.md] C5).
pub struct LogicalLink<T: Transport> {
    inner: Arc<Inner<T>>,
}

impl<T: Transport> Clone for LogicalLink<T> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<T: Transport> LogicalLink<T> {
    /// Creates a link over an already-registered ACL connection. `is_le`
    /// picks the LE vs classic fixed signaling cid and fixed channel set.
    #[must_use]
    pub fn new(handle: ConnHandle, acl: Arc<AclDataChannel<T>>, is_le: bool) -> Self {
        let signaling_cid = if is_le { Cid::SIGNALING_LE } else { Cid::SIGNALING_BREDR };
        let acl_mtu = acl.mtu();
        let mut arena = Slab::new();
        let mut index = HashMap::new();
        for cid in fixed_channel_ids(is_le) {
            let key = arena.insert(Channel::new(cid, acl_mtu));
            index.insert(cid, key);
        }
        let inner = Arc::new(Inner {
            handle,
            acl,
            acl_mtu,
            signaling_cid,
            arena: Mutex::new(arena),
            index: Mutex::new(index),
            dynamic: Mutex::new(Registry::default()),
            ids: Mutex::new(IdAllocator::default()),
            pending: Mutex::new(HashMap::new()),
            recombiner: Mutex::new(Recombiner::default()),
            extended_features: Mutex::new(None),
            closed: std::sync::atomic::AtomicBool::new(false),
        });
        inner.acl.register(handle);
        Self { inner }
    }

    /// Attaches an upper-layer owner to a fixed channel (ATT, SMP, or
    /// signaling), returning a receiver for inbound SDUs plus any already
    /// queued before attach, in arrival order.
    pub fn attach_fixed(&self, cid: Cid) -> Option<(tokio::sync::mpsc::UnboundedReceiver<Vec<u8>>, Vec<Vec<u8>>)> {
        let key = *self.inner.index.lock().get(&cid)?;
        Some(self.inner.arena.lock()[key].attach())
    }

    /// Returns a [`WeakChannel`] handle for `cid`.
    #[must_use]
    pub fn weak(&self, cid: Cid) -> WeakChannel<T> {
        WeakChannel { link: Arc::downgrade(&self.inner), cid }
    }

    /// Feeds one inbound ACL fragment, reassembling and demultiplexing
    /// completed PDUs to their channel (spec `# 4.3` "Channel demux").
    pub fn on_acl_data(&self, handle: ConnHandle, data: &[u8]) {
        if handle != self.inner.handle {
            return;
        }
        let pdu = {
            let mut rc = self.inner.recombiner.lock();
            match rc.feed(handle, data) {
                Ok(Some(pdu)) => pdu,
                Ok(None) => return,
                Err(e) => {
                    warn!(?handle, "{e}; recombination buffer discarded");
                    return;
                }
            }
        };
        self.dispatch(Cid::new(pdu.cid), pdu.payload);
    }

    fn dispatch(&self, cid: Cid, payload: Vec<u8>) {
        if cid == self.inner.signaling_cid {
            self.on_signaling(payload);
            return;
        }
        let key = *self.inner.index.lock().get(&cid).unwrap_or(&usize::MAX);
        let mut arena = self.inner.arena.lock();
        match arena.get_mut(key) {
            Some(ch) => ch.deliver(payload),
            None => warn!(?cid, "dropped PDU for unknown channel"),
        }
    }

    /// Sends an SDU on `cid`, fragmenting per the negotiated/default MTU.
    fn send(&self, cid: Cid, sdu: &[u8]) {
        if self.inner.closed.load(std::sync::atomic::Ordering::Acquire) {
            return;
        }
        let frags = frame::fragment(self.inner.handle, cid.into(), sdu, self.inner.acl_mtu);
        self.inner.acl.queue(self.inner.handle, Priority::Low, frags);
    }

    fn send_signaling(&self, payload: Vec<u8>) {
        if self.inner.closed.load(std::sync::atomic::Ordering::Acquire) {
            return;
        }
        let frags = frame::fragment(self.inner.handle, self.inner.signaling_cid.into(), &payload, self.inner.acl_mtu);
        self.inner.acl.queue(self.inner.handle, Priority::High, frags);
    }

    /// Registers a oneshot waiter for signaling identifier `id`, sends
    /// `payload`, and waits up to [`RTX_TIMEOUT`] for the matching response
    /// (spec `# 4.3`, "A request has a 60-second RTX timer").
    async fn send_and_await(&self, id: u8, payload: Vec<u8>) -> Result<Command> {
        let (tx, rx) = oneshot::channel();
        self.inner.pending.lock().insert(id, PendingSignal { tx });
        self.send_signaling(payload);
        self.await_response(id, rx).await
    }

    /// Re-registers a waiter for `id` without sending anything, for the
    /// extended-RTX "Pending" follow-up response ([Vol 3] Part A, Section
    /// 4.3: a second response may arrive later under the same identifier).
    async fn await_again(&self, id: u8) -> Result<Command> {
        let (tx, rx) = oneshot::channel();
        self.inner.pending.lock().insert(id, PendingSignal { tx });
        self.await_response(id, rx).await
    }

    async fn await_response(&self, id: u8, rx: oneshot::Receiver<Command>) -> Result<Command> {
        match tokio::time::timeout(RTX_TIMEOUT, rx).await {
            Ok(Ok(cmd)) => Ok(cmd),
            _ => {
                self.inner.pending.lock().remove(&id);
                Err(Error::SignalingTimeout)
            }
        }
    }

    /// Allocates a fresh identifier, encodes `make(id)`, sends it, and waits
    /// for the correlated response.
    async fn signal_request(&self, make: impl FnOnce(u8) -> Vec<u8>) -> Result<Command> {
        let id = self.inner.ids.lock().next();
        self.send_and_await(id, make(id)).await
    }

    fn on_signaling(&self, payload: Vec<u8>) {
        let Ok(cmd) = Command::try_from(&payload[..]) else {
            warn!("malformed L2CAP signaling command");
            return;
        };
        // Response codes settle a pending request; everything else is a new
        // inbound command this link must answer.
        if matches!(
            cmd.code,
            Code::ConnectionResponse
                | Code::ConfigurationResponse
                | Code::DisconnectionResponse
                | Code::InformationResponse
                | Code::EchoResponse
                | Code::CommandReject
        ) {
            if let Some(pending) = self.inner.pending.lock().remove(&cmd.id) {
                let _ = pending.tx.send(cmd);
            }
            return;
        }
        match cmd.code {
            Code::ConnectionRequest => self.handle_connection_request(cmd),
            Code::ConfigurationRequest => self.handle_configuration_request(cmd),
            Code::DisconnectionRequest => self.handle_disconnection_request(cmd),
            Code::EchoRequest => self.send_signaling(signaling::encode_command(Code::EchoResponse, cmd.id, |_| {})),
            _ => {
                warn!(code = ?cmd.code, "unknown L2CAP signaling command");
                self.send_signaling(signaling::command_reject(cmd.id, signaling::RejectReason::NotUnderstood));
            }
        }
    }

    fn handle_connection_request(&self, cmd: Command) {
        let Some(req) = ConnectionRequest::decode(&cmd.payload) else { return };
        let mut reg = self.inner.dynamic.lock();
        let result = match reg.accept_inbound(req.psm, req.scid, dynamic::MIN_MTU_BREDR) {
            Some(local_cid) => {
                drop(reg);
                let key = self.insert_channel(local_cid);
                self.inner.arena.lock()[key].remote_cid = Some(req.scid);
                ConnectionResponse { dcid: local_cid, scid: req.scid, result: ConnectionResult::Success, status: 0 }
            }
            None => ConnectionResponse {
                dcid: Cid::NULL,
                scid: req.scid,
                result: ConnectionResult::NoResources,
                status: 0,
            },
        };
        self.send_signaling(result.encode(cmd.id));
    }

    fn insert_channel(&self, cid: Cid) -> usize {
        let key = self.inner.arena.lock().insert(Channel::new(cid, self.inner.acl_mtu));
        self.inner.index.lock().insert(cid, key);
        key
    }

    fn handle_configuration_request(&self, cmd: Command) {
        let Some(req) = ConfigurationRequest::decode(&cmd.payload) else { return };
        let mut options_out = Vec::new();
        let mut result = ConfigResult::Success;
        for opt in &req.options {
            match opt {
                ConfigOption::Mtu(mtu) => {
                    let (clamped, r) = dynamic::clamp_mtu(*mtu);
                    if matches!(r, ConfigResult::UnacceptableParameters) {
                        result = r;
                    }
                    options_out.push(ConfigOption::Mtu(clamped));
                }
                ConfigOption::Rfc { mode: RfcMode::EnhancedRetransmission, .. } => {
                    // ERTM negotiation is not carried to completion by this
                    // stack; counter with Basic, same as the outbound path
                    // in `negotiate_outbound`.
                    result = ConfigResult::UnacceptableParameters;
                    options_out.push(ConfigOption::Rfc {
                        mode: RfcMode::Basic,
                        tx_window: 0,
                        max_transmit: 0,
                        retransmission_timeout: 0,
                        monitor_timeout: 0,
                        mps: 0,
                    });
                }
                ConfigOption::Rfc { .. } => {}
                ConfigOption::Unknown(ty, _) => {
                    result = ConfigResult::UnknownOptions;
                    options_out.push(ConfigOption::Unknown(*ty, Vec::new()));
                }
            }
        }
        if let Some(ch) = self.inner.dynamic.lock().get_mut(req.dcid) {
            ch.in_config_done = matches!(result, ConfigResult::Success);
            if ch.in_config_done && ch.out_config_done {
                ch.state = State::Open;
                debug!(cid = ?req.dcid, "dynamic channel open");
            } else if matches!(ch.state, State::WaitConfig) {
                ch.state = State::WaitConfigReqRsp;
            }
        }
        let resp = ConfigurationResponse { scid: req.dcid, flags: 0, result, options: options_out };
        self.send_signaling(resp.encode(cmd.id));
    }

    fn handle_disconnection_request(&self, cmd: Command) {
        let Some(params) = DisconnectionParams::decode(&cmd.payload) else { return };
        // `params.dcid` is our local cid, addressed by the peer.
        let mut reg = self.inner.dynamic.lock();
        if let Some(ch) = reg.get_mut(params.dcid) {
            ch.remote_initiated_close = true;
        }
        reg.confirm_free(params.dcid);
        drop(reg);
        self.remove_channel(params.dcid);
        self.inner.acl.drop_queued(|h| h == self.inner.handle);
        // The response echoes the request's cids unchanged ([Vol 3] Part A,
        // Section 4.7).
        self.send_signaling(params.encode(Code::DisconnectionResponse, cmd.id));
    }

    fn remove_channel(&self, cid: Cid) {
        if let Some(key) = self.inner.index.lock().remove(&cid) {
            let mut arena = self.inner.arena.lock();
            if arena.contains(key) {
                arena.remove(key);
            }
        }
    }

    /// Fetches the peer's extended features once per link and memoizes the
    /// result (spec `# 4.3` step 4).
    async fn extended_features(&self) -> u32 {
        if let Some(f) = *self.inner.extended_features.lock() {
            return f;
        }
        let features = match self
            .signal_request(|id| signaling::information_request(id, signaling::INFO_TYPE_EXTENDED_FEATURES))
            .await
        {
            Ok(cmd) => ExtendedFeaturesResponse::decode(&cmd.payload).map_or(0, |r| r.features),
            Err(_) => 0,
        };
        *self.inner.extended_features.lock() = Some(features);
        features
    }

    /// Opens an outbound dynamic channel, driving the DCR state machine in
    /// spec `# 4.3` to completion (or failure).
    pub async fn open_outbound(&self, psm: Psm, params: ChannelParameters) -> Result<WeakChannel<T>> {
        let local_cid = {
            let mut reg = self.inner.dynamic.lock();
            reg.open_outbound(psm, params.mode, params.mtu)
        };
        self.insert_channel(local_cid);

        let id = self.inner.ids.lock().next();
        let req = ConnectionRequest { psm, scid: local_cid };
        let mut cmd = match self.send_and_await(id, req.encode(id)).await {
            Ok(cmd) => cmd,
            Err(e) => {
                self.teardown_failed_open(local_cid);
                return Err(e);
            }
        };
        let mut resp = match ConnectionResponse::decode(&cmd.payload) {
            Some(r) => r,
            None => {
                self.teardown_failed_open(local_cid);
                return Err(Error::Malformed);
            }
        };
        // A `Pending` result means the controller needs more time; the
        // eventual real response arrives later under the same identifier.
        while resp.result == ConnectionResult::Pending {
            if let Some(ch) = self.inner.dynamic.lock().get_mut(local_cid) {
                ch.state = State::WaitConnRspPending;
            }
            cmd = match self.await_again(id).await {
                Ok(cmd) => cmd,
                Err(e) => {
                    self.teardown_failed_open(local_cid);
                    return Err(e);
                }
            };
            resp = match ConnectionResponse::decode(&cmd.payload) {
                Some(r) => r,
                None => {
                    self.teardown_failed_open(local_cid);
                    return Err(Error::Malformed);
                }
            };
        }
        if resp.result != ConnectionResult::Success || !self.inner.dynamic.lock().bind_remote_cid(local_cid, resp.dcid)
        {
            self.teardown_failed_open(local_cid);
            return Err(Error::ChannelRefused);
        }
        let key = *self.inner.index.lock().get(&local_cid).expect("just inserted");
        self.inner.arena.lock()[key].remote_cid = Some(resp.dcid);

        let _features = self.extended_features().await;
        self.negotiate_outbound(local_cid, params).await
    }

    async fn negotiate_outbound(&self, local_cid: Cid, mut params: ChannelParameters) -> Result<WeakChannel<T>> {
        loop {
            let mut options = vec![ConfigOption::Mtu(params.mtu)];
            if params.mode == Mode::EnhancedRetransmission {
                options.push(ConfigOption::Rfc {
                    mode: RfcMode::EnhancedRetransmission,
                    tx_window: 63,
                    max_transmit: 3,
                    retransmission_timeout: 2000,
                    monitor_timeout: 12000,
                    mps: params.mtu,
                });
            }
            let remote_cid = self.inner.dynamic.lock().get(local_cid).and_then(|c| c.remote_cid);
            let Some(remote_cid) = remote_cid else {
                self.teardown_failed_open(local_cid);
                return Err(Error::ChannelRefused);
            };
            let req = ConfigurationRequest { dcid: remote_cid, flags: 0, options };
            let cmd = match self.signal_request(|id| req.encode(id)).await {
                Ok(c) => c,
                Err(e) => {
                    self.teardown_failed_open(local_cid);
                    return Err(e);
                }
            };
            let Some(resp) = ConfigurationResponse::decode(&cmd.payload) else {
                self.teardown_failed_open(local_cid);
                return Err(Error::Malformed);
            };
            match resp.result {
                ConfigResult::Success | ConfigResult::Pending => {
                    if let Some(ch) = self.inner.dynamic.lock().get_mut(local_cid) {
                        ch.out_config_done = true;
                        if ch.in_config_done {
                            ch.state = State::Open;
                        }
                    }
                    return self.finish_open_if_ready(local_cid).await;
                }
                ConfigResult::UnacceptableParameters | ConfigResult::UnknownOptions => {
                    let peer_counter = resp.options.iter().find_map(|o| match o {
                        ConfigOption::Rfc { mode, .. } => Some(*mode),
                        _ => None,
                    });
                    let outcome = self
                        .inner
                        .dynamic
                        .lock()
                        .get_mut(local_cid)
                        .map_or(ModeOutcome::Disconnect, |ch| ch.on_config_rejected(peer_counter));
                    match outcome {
                        ModeOutcome::RenegotiateBasic => {
                            params.mode = Mode::Basic;
                        }
                        ModeOutcome::Continue => {}
                        ModeOutcome::Disconnect => {
                            self.teardown_failed_open(local_cid);
                            return Err(Error::ModeMismatch);
                        }
                    }
                }
                ConfigResult::Rejected | ConfigResult::Other => {
                    self.teardown_failed_open(local_cid);
                    return Err(Error::ChannelRefused);
                }
            }
        }
    }

    async fn finish_open_if_ready(&self, local_cid: Cid) -> Result<WeakChannel<T>> {
        // Configuration is bidirectional; the inbound half may complete via
        // `handle_configuration_request` either before or after this call
        // returns. Poll briefly for the "both directions done" condition
        // spec `# 4.3` step 6 requires before declaring the channel Open.
        for _ in 0..50 {
            if self.inner.dynamic.lock().get(local_cid).is_some_and(DynamicChannel::is_open) {
                return Ok(self.weak(local_cid));
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        Err(Error::SignalingTimeout)
    }

    fn teardown_failed_open(&self, local_cid: Cid) {
        self.inner.dynamic.lock().confirm_free(local_cid);
        self.remove_channel(local_cid);
    }

    /// Closes a dynamic channel, idempotent per spec `# 8`.
    pub async fn close_channel(&self, cid: Cid) {
        let remote_cid = self.inner.dynamic.lock().get(cid).and_then(|c| c.remote_cid);
        let Some(remote_cid) = remote_cid else { return };
        self.inner.dynamic.lock().begin_close(cid);
        let params = DisconnectionParams { dcid: remote_cid, scid: cid };
        let id = self.inner.ids.lock().next();
        let _ = self.send_and_await(id, params.encode(Code::DisconnectionRequest, id)).await;
        self.inner.dynamic.lock().confirm_free(cid);
        self.remove_channel(cid);
        self.inner.acl.drop_queued(|h| h == self.inner.handle);
    }

    /// Tears down the whole link on a fatal error: closes every channel and
    /// stops accepting further operations (spec `# 4.3` error handling).
    pub fn on_link_error(&self) {
        self.inner.closed.store(true, std::sync::atomic::Ordering::Release);
        let mut arena = self.inner.arena.lock();
        for (_, ch) in arena.iter_mut() {
            ch.close();
        }
        self.inner.acl.unregister(self.inner.handle);
        trace!(handle = ?self.inner.handle, "logical link closed after fatal error");
    }
}

fn fixed_channel_ids(is_le: bool) -> Vec<Cid> {
    if is_le {
        vec![Cid::SIGNALING_LE, Cid::ATT, Cid::SMP_LE]
    } else {
        vec![Cid::SIGNALING_BREDR]
    }
}
