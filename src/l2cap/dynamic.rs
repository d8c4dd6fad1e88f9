//! Dynamic channel registry: per-link state machine for opening and closing
//! BR/EDR dynamic L2CAP channels ([SPEC_FULL.md] C6, spec `# 4.3`).
//!
//! States: `Closed -> WaitConnRsp -> {WaitConfig | WaitConnRspPending} ->
//! WaitConfigReqRsp <-> Open -> WaitDisconnect -> Closed`. A local cid, once
//! allocated, is not returned to the allocator until the corresponding
//! `DisconnectionResponse` has been observed (the cid-reuse invariant in
//! spec `# 8`), tracked here as `pending_free`.

use std::collections::{BTreeSet, HashMap};

use tracing::{debug, warn};

use crate::l2cap::channel::{Cid, Mode};
use crate::l2cap::signaling::{ConfigResult, ConnectionResult, RfcMode};
use crate::l2cap::Psm;

/// Per-side state machine for one dynamic channel (spec `# 3`
/// `DynamicChannel`).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum State {
    Closed,
    WaitConnRsp,
    /// `ConnectionResponse(Pending)` was received; the extended deadline is
    /// tracked by the caller's RTX timer restart, not state here.
    WaitConnRspPending,
    WaitConfig,
    WaitConfigReqRsp,
    Open,
    WaitDisconnect,
}

/// One dynamic channel's bookkeeping, independent of the `Channel` SDU pipe
/// it owns once open.
#[derive(Debug)]
pub(crate) struct DynamicChannel {
    pub psm: Psm,
    pub local_cid: Cid,
    pub remote_cid: Option<Cid>,
    pub state: State,
    pub requested_mode: Mode,
    pub negotiated_mode: Mode,
    pub mtu: u16,
    /// Outbound configuration accepted by the peer.
    pub out_config_done: bool,
    /// Our acceptance of the peer's inbound configuration sent.
    pub in_config_done: bool,
    /// Set once the peer has sent a `DisconnectionRequest`; distinguishes
    /// remote- from local-initiated close for the link's "channel closed"
    /// observer (spec `# 4.3` closing sequence).
    pub remote_initiated_close: bool,
}

impl DynamicChannel {
    fn new(psm: Psm, local_cid: Cid, requested_mode: Mode, mtu: u16) -> Self {
        Self {
            psm,
            local_cid,
            remote_cid: None,
            state: State::Closed,
            requested_mode,
            negotiated_mode: Mode::Basic,
            mtu,
            out_config_done: false,
            in_config_done: false,
            remote_initiated_close: false,
        }
    }

    pub(crate) const fn is_open(&self) -> bool {
        matches!(self.state, State::Open)
    }

    /// Applies the mode-negotiation rule from spec `# 4.3` step 7: if we
    /// proposed ERTM and the peer's rejection counter-proposes Basic,
    /// renegotiate to Basic. If we proposed Basic (or nothing) and the
    /// peer's rejection counter-proposes anything other than Basic, the two
    /// sides want inconsistent modes and the channel must disconnect.
    pub(crate) fn on_config_rejected(&mut self, peer_counter: Option<RfcMode>) -> ModeOutcome {
        let proposed = if self.requested_mode == Mode::EnhancedRetransmission { Some(RfcMode::EnhancedRetransmission) } else { None };
        match (proposed, peer_counter) {
            (Some(RfcMode::EnhancedRetransmission), Some(RfcMode::Basic)) => {
                self.requested_mode = Mode::Basic;
                ModeOutcome::RenegotiateBasic
            }
            (_, Some(m)) if m != RfcMode::Basic => ModeOutcome::Disconnect,
            _ => ModeOutcome::Continue,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum ModeOutcome {
    Continue,
    RenegotiateBasic,
    Disconnect,
}

/// Minimum acceptable MTU for a classic ACL channel ([Vol 3] Part A,
/// Section 5.1; spec `# 4.3` MTU policy).
pub const MIN_MTU_BREDR: u16 = 48;

/// Owns every [`DynamicChannel`] on one logical link, allocating/freeing
/// local cids with the reuse-after-`DisconnectionResponse` invariant.
#[derive(Debug, Default)]
pub(crate) struct Registry {
    channels: HashMap<Cid, DynamicChannel>,
    next_cid: u16,
    /// Cids that have been closed locally but not yet returned to the
    /// allocator because the peer's `DisconnectionResponse` hasn't arrived.
    pending_free: BTreeSet<Cid>,
    /// Remote cids already in use by a live channel, to catch the
    /// source-cid-already-allocated failure path (spec `# 4.3` step 3).
    remote_cids_in_use: BTreeSet<Cid>,
}

impl Registry {
    /// Allocates a new local cid in the dynamic range and opens its
    /// `DynamicChannel` record in `WaitConnRsp`.
    pub(crate) fn open_outbound(&mut self, psm: Psm, requested_mode: Mode, mtu: u16) -> Cid {
        let cid = self.alloc_cid();
        let mut ch = DynamicChannel::new(psm, cid, requested_mode, mtu);
        ch.state = State::WaitConnRsp;
        self.channels.insert(cid, ch);
        cid
    }

    fn alloc_cid(&mut self) -> Cid {
        loop {
            if self.next_cid == 0 {
                self.next_cid = Cid::DYNAMIC_MIN;
            }
            let candidate = Cid::new(self.next_cid);
            self.next_cid = if self.next_cid + 1 >= Cid::DYNAMIC_MAX { Cid::DYNAMIC_MIN } else { self.next_cid + 1 };
            if !self.channels.contains_key(&candidate) && !self.pending_free.contains(&candidate) {
                return candidate;
            }
        }
    }

    pub(crate) fn get(&self, cid: Cid) -> Option<&DynamicChannel> {
        self.channels.get(&cid)
    }

    pub(crate) fn get_mut(&mut self, cid: Cid) -> Option<&mut DynamicChannel> {
        self.channels.get_mut(&cid)
    }

    pub(crate) fn find_by_remote(&self, remote_cid: Cid) -> Option<Cid> {
        self.channels.iter().find(|(_, c)| c.remote_cid == Some(remote_cid)).map(|(&cid, _)| cid)
    }

    /// Records that `remote_cid` now belongs to `local_cid` as the peer's
    /// `ConnectionResponse(Success)`; fails the channel if `remote_cid` is
    /// already in use by another live channel on this link.
    pub(crate) fn bind_remote_cid(&mut self, local_cid: Cid, remote_cid: Cid) -> bool {
        if self.remote_cids_in_use.contains(&remote_cid) {
            warn!(?remote_cid, "source cid already allocated by another channel");
            return false;
        }
        self.remote_cids_in_use.insert(remote_cid);
        if let Some(ch) = self.channels.get_mut(&local_cid) {
            ch.remote_cid = Some(remote_cid);
        }
        true
    }

    /// Marks a channel closed locally; the cid is not returned to the
    /// allocator until [`Self::confirm_free`] is called once the peer's
    /// `DisconnectionResponse` (or request, if remote-initiated) is
    /// observed.
    pub(crate) fn begin_close(&mut self, cid: Cid) {
        if let Some(ch) = self.channels.get_mut(&cid) {
            ch.state = State::WaitDisconnect;
        }
        self.pending_free.insert(cid);
    }

    /// Finalizes removal of `cid` after the disconnection handshake
    /// completes, returning it to the allocator.
    pub(crate) fn confirm_free(&mut self, cid: Cid) {
        if let Some(ch) = self.channels.remove(&cid) {
            if let Some(rcid) = ch.remote_cid {
                self.remote_cids_in_use.remove(&rcid);
            }
        }
        self.pending_free.remove(&cid);
        debug!(?cid, "dynamic channel cid freed");
    }

    pub(crate) fn accept_inbound(&mut self, psm: Psm, remote_cid: Cid, mtu: u16) -> Option<Cid> {
        if self.remote_cids_in_use.contains(&remote_cid) {
            return None;
        }
        let local_cid = self.alloc_cid();
        let mut ch = DynamicChannel::new(psm, local_cid, Mode::Basic, mtu);
        ch.remote_cid = Some(remote_cid);
        ch.state = State::WaitConfig;
        self.remote_cids_in_use.insert(remote_cid);
        self.channels.insert(local_cid, ch);
        Some(local_cid)
    }
}

/// Response to an inbound `ConfigurationRequest` carrying an MTU below the
/// classic minimum: rejected with a counter-proposal equal to the minimum
/// (spec `# 4.3` MTU policy).
#[must_use]
pub(crate) fn clamp_mtu(requested: u16) -> (u16, ConfigResult) {
    if requested < MIN_MTU_BREDR {
        (MIN_MTU_BREDR, ConfigResult::UnacceptableParameters)
    } else {
        (requested, ConfigResult::Success)
    }
}

/// Maps an outbound `ConnectionResponse` result to the next DCR state.
#[must_use]
pub(crate) fn state_after_connection_response(result: ConnectionResult) -> Option<State> {
    match result {
        ConnectionResult::Success => Some(State::WaitConfig),
        ConnectionResult::Pending => Some(State::WaitConnRspPending),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cid_not_reused_until_disconnection_response() {
        let mut reg = Registry::default();
        let cid = reg.open_outbound(Psm(0x0001), Mode::Basic, 672);
        reg.bind_remote_cid(cid, Cid::new(0x60a3));
        reg.begin_close(cid);
        // cid must not be handed out again before confirm_free.
        for _ in 0..4096 {
            let other = reg.alloc_cid();
            assert_ne!(other, cid);
            reg.channels.insert(other, DynamicChannel::new(Psm(0x0001), other, Mode::Basic, 672));
        }
        reg.confirm_free(cid);
    }

    #[test]
    fn remote_cid_collision_is_rejected() {
        let mut reg = Registry::default();
        let a = reg.open_outbound(Psm(0x0001), Mode::Basic, 672);
        assert!(reg.bind_remote_cid(a, Cid::new(0x60a3)));
        let b = reg.open_outbound(Psm(0x0001), Mode::Basic, 672);
        assert!(!reg.bind_remote_cid(b, Cid::new(0x60a3)));
    }

    #[test]
    fn mtu_below_minimum_is_clamped() {
        let (mtu, result) = clamp_mtu(10);
        assert_eq!(mtu, MIN_MTU_BREDR);
        assert_eq!(result, ConfigResult::UnacceptableParameters);
    }

    #[test]
    fn basic_proposal_rejected_with_non_basic_counter_disconnects() {
        let mut ch = DynamicChannel::new(Psm(0x0001), Cid::new(0x0040), Mode::Basic, 672);
        let outcome = ch.on_config_rejected(Some(RfcMode::EnhancedRetransmission));
        assert_eq!(outcome, ModeOutcome::Disconnect);
    }

    #[test]
    fn ertm_proposal_rejected_with_basic_counter_renegotiates() {
        let mut ch = DynamicChannel::new(Psm(0x0001), Cid::new(0x0040), Mode::EnhancedRetransmission, 672);
        let outcome = ch.on_config_rejected(Some(RfcMode::Basic));
        assert_eq!(outcome, ModeOutcome::RenegotiateBasic);
        assert_eq!(ch.requested_mode, Mode::Basic);
    }
}
