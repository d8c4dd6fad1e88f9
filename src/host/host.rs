//! Controller transport interface and the HCI command channel
//! ([SPEC_FULL.md] C1, C2).
//!
//! `Transport`/`Transfer` are the declared interface to the out-of-scope
//! controller driver (spec `# 1`): a packet-oriented, not byte-oriented,
//! collaborator. [`Host`] is the owner of the one command/event channel to
//! the controller and implements command serialization, quota-based flow
//! control, and the 12-second per-command timeout from spec `# 4.1`.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Duration;

use structbuf::Packer;
use tracing::{error, warn};

use crate::error::HostErrorKind;
use crate::hci::{Error, EventCode, EventFilter, EventGuard, EventRouter, EventWaiterGuard, Opcode, Result, CMD_BUF};

/// Per-command timeout ([SPEC_FULL.md] `# 5` Timeouts): 12 seconds.
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(12);

/// A packet-oriented transport to the controller: one logical stream per
/// packet type, each exposing buffers ([`Transfer`]) that the host fills (for
/// outbound command/ACL/SCO packets) or reads (for inbound event/ACL/SCO
/// packets).
pub trait Transport: Clone + Send + Sync + 'static {
    /// One in-flight transfer buffer.
    type Transfer: Transfer;

    /// Returns a new command transfer buffer.
    fn command(&self) -> Self::Transfer;
    /// Returns a new event transfer buffer.
    fn event(&self) -> Self::Transfer;
    /// Returns a new outbound ACL transfer buffer.
    fn acl_out(&self) -> Self::Transfer;
    /// Returns a new inbound ACL transfer buffer.
    fn acl_in(&self) -> Self::Transfer;
}

/// One command/event/ACL buffer exchanged with the controller.
///
/// The intended lifecycle, matching [`crate::hci::EventReceiver::next`]'s
/// usage: `reset()` the buffer, call `submit()` to hand it to the driver,
/// `.await` the returned future to get it back once the driver has
/// completed the transfer, then check `result()` before reading the
/// contents via `AsRef<[u8]>`.
pub trait Transfer: AsRef<[u8]> + AsMut<[u8]> + Send + 'static {
    /// Resets the buffer to be reused for another transfer.
    fn reset(&mut self);

    /// Submits the transfer to the controller, returning a future that
    /// resolves to `self` once the transfer completes (successfully or not).
    ///
    /// # Errors
    ///
    /// Returns an error immediately if the transfer could not be submitted
    /// (e.g. the transport is already closed).
    fn submit(self) -> Result<impl Future<Output = Self> + Send>;

    /// Returns the result of the most recently completed transfer, or
    /// `None` if the transfer hasn't completed yet.
    fn result(&self) -> Option<Result<()>>;
}

/// A command awaiting completion ([SPEC_FULL.md] `PendingCommand`).
struct PendingCommand {
    opcode: Opcode,
    txn: u64,
}

/// Serializes HCI commands, matches completions, and enforces the
/// per-command timeout ([SPEC_FULL.md] C2).
pub(crate) struct CommandChannel<T: Transport> {
    transport: T,
    events: Arc<EventRouter<T>>,
    /// Guards command submission order; only one task may be building and
    /// sending a command transfer at a time, which combined with the
    /// controller's quota gives the "1 outstanding by default" behavior.
    send_lock: tokio::sync::Mutex<VecDeque<PendingCommand>>,
    next_txn: AtomicU16,
    closed: AtomicBool,
}

impl<T: Transport> CommandChannel<T> {
    fn new(transport: T, events: Arc<EventRouter<T>>) -> Self {
        Self {
            transport,
            events,
            send_lock: tokio::sync::Mutex::new(VecDeque::new()),
            next_txn: AtomicU16::new(1),
            closed: AtomicBool::new(false),
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Executes `opcode` with parameters written by `params`, waiting up to
    /// [`COMMAND_TIMEOUT`] for the matching `CommandComplete`/`CommandStatus`
    /// event.
    async fn exec(&self, opcode: Opcode, params: impl FnOnce(&mut Packer)) -> Result<EventGuard<T>> {
        if self.is_closed() {
            return Err(HostErrorKind::LinkDisconnected.into());
        }
        let txn = u64::from(self.next_txn.fetch_add(1, Ordering::Relaxed));
        let _serial = self.send_lock.lock().await;
        self.events.wait_for_quota().await;
        let waiter = self.events.register(EventFilter::Command(opcode))?;

        let mut xfer = self.transport.command();
        xfer.reset();
        {
            // Command header is opcode (2 octets) + parameter length (1
            // octet); the parameter length is only known once `params` has
            // run, so it is built in a scratch buffer and prefixed.
            let mut payload = [0u8; CMD_BUF - 3];
            let n = {
                let mut p = Packer::new(&mut payload[..]);
                params(&mut p);
                p.len()
            };
            let len = u8::try_from(n).map_err(|_| Error::Host(HostErrorKind::InvalidParameters))?;
            let mut hdr = Packer::new(xfer.as_mut());
            hdr.u16(opcode).u8(len).put(&payload[..n]);
        }
        let xfer = xfer.submit()?.await;
        xfer.result().ok_or(Error::Host(HostErrorKind::Failed))??;

        match tokio::time::timeout(COMMAND_TIMEOUT, waiter.next()).await {
            Ok(r) => r,
            Err(_) => {
                warn!(?opcode, txn, "HCI command timed out");
                self.on_timeout();
                Err(Error::Timeout)
            }
        }
    }

    /// Fails every pending command and permanently disables the channel, per
    /// spec `# 4.1`: "No further commands are processed."
    fn on_timeout(&self) {
        self.closed.store(true, Ordering::Release);
        error!("HCI command channel closed after timeout; no further commands will be sent");
    }
}

/// Owner of the one command/event channel to a Bluetooth controller
/// ([SPEC_FULL.md] C1).
///
/// Cheaply `Clone`: internally reference-counted, so the background event
/// receiver task and every upper-layer component can hold their own handle.
pub struct Host<T: Transport> {
    transport: T,
    cmd: Arc<CommandChannel<T>>,
    pub(crate) events: Arc<EventRouter<T>>,
}

impl<T: Transport> Clone for Host<T> {
    fn clone(&self) -> Self {
        Self { transport: self.transport.clone(), cmd: Arc::clone(&self.cmd), events: Arc::clone(&self.events) }
    }
}

impl<T: Transport> std::fmt::Debug for Host<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Host").field("closed", &self.cmd.is_closed()).finish_non_exhaustive()
    }
}

impl<T: Transport> Host<T> {
    /// Creates a new host over `transport`.
    #[must_use]
    pub fn new(transport: T) -> Self {
        let events = Arc::new(EventRouter::default());
        let cmd = Arc::new(CommandChannel::new(transport.clone(), Arc::clone(&events)));
        Self { transport, cmd, events }
    }

    /// Receives the next HCI event. Used by [`crate::hci::EventReceiverTask`]
    /// to drive the background receive loop.
    pub async fn event(&self) -> Result<EventGuard<T>> {
        self.events.recv_event(&self.transport).await
    }

    /// Executes `opcode` with no command parameters.
    pub(crate) async fn exec(&self, opcode: Opcode) -> Result<EventGuard<T>> {
        self.cmd.exec(opcode, |_| {}).await
    }

    /// Executes `opcode`, writing command parameters with `params`.
    pub(crate) async fn exec_params(
        &self,
        opcode: Opcode,
        params: impl FnOnce(&mut Packer),
    ) -> Result<EventGuard<T>> {
        self.cmd.exec(opcode, params).await
    }

    /// Subscribes to an unsolicited event code (spec `# 4.1` async/unsolicited
    /// events). The returned guard yields matching events until dropped.
    pub fn subscribe(&self, code: EventCode) -> Result<EventWaiterGuard<T>> {
        self.events.register(EventFilter::Subscriber(code))
    }

    /// Returns whether the command channel has permanently shut down after a
    /// command timeout or transport failure.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.cmd.is_closed()
    }

    /// Returns the underlying transport. Used by [`crate::hci::acl`] to open
    /// ACL data transfers alongside the command/event channel.
    pub(crate) fn transport(&self) -> &T {
        &self.transport
    }
}
