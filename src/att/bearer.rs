//! ATT Bearer: one-transaction-lock request/response pump over the ATT fixed
//! channel ([SPEC_FULL.md] C8).
//!
//! Only one ATT request may be outstanding at a time per bearer ([Vol 3]
//! Part F, Section 3.3); a second concurrent caller simply waits for the
//! transaction lock. Indications are serialized separately: the peer may not
//! send another indication until this side's confirmation, so sends hold a
//! second lock around the notification callback. A request or indication
//! that exceeds [`ATT_TIMEOUT`] is treated as unrecoverable ([Vol 3] Part F,
//! Section 3.3.3): the bearer shuts down permanently and the link is torn
//! down with it.

use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tracing::{debug, trace, warn};

use crate::att::pdu::{self, ErrorResponse, Opcode};
use crate::att::{Error, Result};
use crate::host::Transport;
use crate::l2cap::{Cid, LogicalLink, WeakChannel};

/// Per-request/indication timeout ([SPEC_FULL.md] `# 5` Timeouts).
pub const ATT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default ATT_MTU before `ExchangeMtuRequest`/`Response` negotiates a larger
/// one ([Vol 3] Part F, Section 3.2.8).
pub const DEFAULT_MTU: u16 = 23;

/// A handler for server-initiated notifications/indications delivered on
/// this bearer.
pub trait NotificationSink: Send + Sync + 'static {
    /// Called for `HandleValueNotification`; no confirmation is sent.
    fn on_notification(&self, handle: u16, value: &[u8]);

    /// Called for `HandleValueIndication`. The bearer sends the
    /// confirmation automatically once this returns.
    fn on_indication(&self, handle: u16, value: &[u8]);
}

struct Inner<T: Transport> {
    channel: WeakChannel<T>,
    rx: AsyncMutex<mpsc::UnboundedReceiver<Vec<u8>>>,
    /// Held across a full request/response exchange.
    txn_lock: AsyncMutex<()>,
    mtu: AtomicU16,
    closed: AtomicBool,
    sink: std::sync::OnceLock<Arc<dyn NotificationSink>>,
}

/// The ATT transport-layer bearer for one logical link's ATT fixed channel.
pub struct Bearer<T: Transport> {
    inner: Arc<Inner<T>>,
}

impl<T: Transport> Clone for Bearer<T> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<T: Transport> Bearer<T> {
    /// Attaches a bearer to `link`'s ATT fixed channel.
    #[must_use]
    pub fn new(link: &LogicalLink<T>) -> Option<Self> {
        let (rx, queued) = link.attach_fixed(Cid::ATT)?;
        let this = Self {
            inner: Arc::new(Inner {
                channel: link.weak(Cid::ATT),
                rx: AsyncMutex::new(rx),
                txn_lock: AsyncMutex::new(()),
                mtu: AtomicU16::new(DEFAULT_MTU),
                closed: AtomicBool::new(false),
                sink: std::sync::OnceLock::new(),
            }),
        };
        for pdu in queued {
            this.handle_unsolicited(&pdu);
        }
        Some(this)
    }

    /// Registers the handler for server-initiated notifications/indications.
    /// Idempotent; a second call is ignored (mirrors `OnceLock`'s semantics).
    pub fn set_notification_sink(&self, sink: Arc<dyn NotificationSink>) {
        let _ = self.inner.sink.set(sink);
    }

    /// The currently negotiated ATT_MTU.
    #[must_use]
    pub fn mtu(&self) -> u16 {
        self.inner.mtu.load(Ordering::Acquire)
    }

    fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    fn shut_down(&self) {
        if !self.inner.closed.swap(true, Ordering::AcqRel) {
            warn!("ATT bearer shutting down after timeout or fatal error");
        }
    }

    /// Negotiates the ATT_MTU ([Vol 3] Part F, Section 3.4.2), clamping to
    /// the larger of what each side offered.
    pub async fn exchange_mtu(&self, local_mtu: u16) -> Result<u16> {
        let pdu = pdu::encode_exchange_mtu_request(local_mtu);
        let resp = self.request(Opcode::ExchangeMtuRequest, pdu).await?;
        let peer_mtu = pdu::decode_exchange_mtu_response(&resp).ok_or(Error::InvalidPdu)?;
        let agreed = local_mtu.min(peer_mtu).max(DEFAULT_MTU);
        self.inner.mtu.store(agreed, Ordering::Release);
        debug!(agreed, "ATT_MTU negotiated");
        Ok(agreed)
    }

    /// Sends a request PDU and waits for the matching response, holding the
    /// one-transaction lock for the whole exchange.
    pub async fn request(&self, opcode: Opcode, pdu: Vec<u8>) -> Result<Vec<u8>> {
        if self.is_closed() {
            return Err(Error::BearerClosed);
        }
        let _txn = self.inner.txn_lock.lock().await;
        self.inner.channel.send(&pdu);
        let resp = {
            let mut rx = self.inner.rx.lock().await;
            tokio::time::timeout(ATT_TIMEOUT, async {
                loop {
                    let Some(raw) = rx.recv().await else { return None };
                    if let Some(v) = self.dispatch_during_request(opcode, raw) {
                        return Some(v);
                    }
                }
            })
            .await
        };
        match resp {
            Ok(Some(v)) => v,
            Ok(None) => {
                self.shut_down();
                Err(Error::BearerClosed)
            }
            Err(_) => {
                self.shut_down();
                Err(Error::Timeout)
            }
        }
    }

    /// Routes one PDU received while a request is outstanding: the matching
    /// response/error settles the request, notifications/indications are
    /// still dispatched inline (the server may interleave them).
    fn dispatch_during_request(&self, expected: Opcode, raw: Vec<u8>) -> Option<Result<Vec<u8>>> {
        let Some(&opcode_byte) = raw.first() else { return None };
        let opcode = Opcode::from(opcode_byte);
        if opcode == Opcode::ErrorResponse {
            return Some(ErrorResponse::decode(&raw).map_or(Err(Error::InvalidPdu), |e| Err(Error::Protocol(e.error))));
        }
        if opcode as u8 == expected as u8 + 1 {
            return Some(Ok(raw));
        }
        self.handle_unsolicited(&raw);
        None
    }

    /// Sends an ATT command (no response expected, e.g. `WriteCommand`).
    pub fn command(&self, pdu: Vec<u8>) {
        if !self.is_closed() {
            self.inner.channel.send(&pdu);
        }
    }

    /// Processes a PDU that arrives outside a pending request: notifications,
    /// indications (replying with the confirmation), and unexpected server
    /// responses (logged and dropped).
    fn handle_unsolicited(&self, raw: &[u8]) {
        let Some(&opcode_byte) = raw.first() else { return };
        match Opcode::from(opcode_byte) {
            Opcode::HandleValueNotification => {
                if let Some(hv) = pdu::decode_handle_value(raw) {
                    if let Some(sink) = self.inner.sink.get() {
                        sink.on_notification(hv.handle, &hv.value);
                    }
                }
            }
            Opcode::HandleValueIndication => {
                if let Some(hv) = pdu::decode_handle_value(raw) {
                    // Spec `# 4.4`: the confirmation "must be emitted by the
                    // bearer itself before dispatching to the handler", so
                    // the peer is unblocked to send its next indication even
                    // if the sink is slow (or panics).
                    self.inner.channel.send(&pdu::encode_handle_value_confirmation());
                    if let Some(sink) = self.inner.sink.get() {
                        sink.on_indication(hv.handle, &hv.value);
                    }
                }
            }
            other => trace!(?other, "dropped unsolicited ATT PDU"),
        }
    }
}
