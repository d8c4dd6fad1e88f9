//! Phase skeleton shared by LE ([`crate::sm::le`]) and BR/EDR
//! ([`crate::sm::bredr`]) pairing ([SPEC_FULL.md] `# 2.4`, spec `# 4.5`):
//! `Idle → Phase1 → {Phase2Legacy | Phase2SecureConnections} → Phase3`, a
//! 30-second no-activity timer per phase, and an idempotent failure guard so
//! `OnFailure` notifies its listener exactly once per pairing attempt.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::sm::IoCapability;

/// Boxed future returned by [`PairingDelegate`]'s methods. Written out by
/// hand rather than pulled in from a macro: the trait is stored behind
/// `Arc<dyn PairingDelegate>` in both [`crate::sm::le::PairingManager`] and
/// [`crate::sm::bredr::Context`]'s implementors, and a trait with `async fn`
/// methods cannot be turned into a trait object on its own.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Per-phase inactivity timeout (spec `# 5` Timeouts: "SMP per-phase: 30 s").
pub const PHASE_TIMEOUT: Duration = Duration::from_secs(30);

/// Where a pairing attempt currently stands (spec `# 3` `PairingState`:
/// "current phase").
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Phase {
    /// No pairing in progress.
    Idle,
    /// Feature exchange: IO capability, OOB flag, `AuthReq`, key size, key
    /// distribution.
    Phase1,
    /// Legacy confirm/random exchange and STK derivation.
    Phase2Legacy,
    /// Secure Connections public key exchange, DH key, and confirm/DHKey
    /// check.
    Phase2SecureConnections,
    /// Key distribution over the negotiated key-distribution bitfields.
    Phase3,
}

/// The pairing method chosen from the IO-capability matrix
/// ([Vol 3] Part H, Section 2.3.5.1, Table 2.8).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PairingMethod {
    JustWorks,
    PasskeyEntry,
    NumericComparison,
    OutOfBand,
}

/// Security level achieved by a completed pairing (spec `# 4.5`: "Security
/// level after pairing = max level achievable given method and key size").
#[derive(Clone, Copy, Debug, Default, Eq, Ord, PartialEq, PartialOrd)]
pub enum SecurityLevel {
    /// No pairing has occurred; the link, if any, is unencrypted.
    #[default]
    None,
    /// Link encrypted with an unauthenticated key (`JustWorks`, or OOB/SC
    /// without MITM protection).
    Encrypted,
    /// Link encrypted with a key authenticated against MITM
    /// (`PasskeyEntry`/`NumericComparison`/OOB with the MITM flag set).
    Authenticated,
    /// Authenticated and derived via LE Secure Connections (the strongest
    /// level this stack produces).
    AuthenticatedSecureConnections,
}

/// Chooses the pairing method from each side's IO capability, OOB presence,
/// and whether both sides set the MITM bit ([Vol 3] Part H, Section 2.3.5.1,
/// Table 2.8). `sc` indicates both sides advertised Secure Connections
/// support, which only changes whether `NumericComparison` is available in
/// place of legacy `JustWorks`/`PasskeyEntry` confirm values — the matrix
/// itself is the same.
#[must_use]
pub fn choose_method(initiator: IoCapability, responder: IoCapability, oob: bool, mitm_required: bool, sc: bool) -> PairingMethod {
    if oob {
        return PairingMethod::OutOfBand;
    }
    if !mitm_required {
        return PairingMethod::JustWorks;
    }
    use IoCapability::{DisplayOnly, DisplayYesNo, KeyboardDisplay, KeyboardOnly, NoInputNoOutput, Unknown};
    match (initiator, responder) {
        (NoInputNoOutput | Unknown, _) | (_, NoInputNoOutput | Unknown) => PairingMethod::JustWorks,
        (DisplayYesNo, DisplayYesNo) if sc => PairingMethod::NumericComparison,
        (DisplayOnly | DisplayYesNo, DisplayOnly) | (DisplayOnly, DisplayYesNo) => PairingMethod::JustWorks,
        (KeyboardOnly, KeyboardOnly) => PairingMethod::PasskeyEntry,
        (KeyboardOnly, DisplayOnly | DisplayYesNo)
        | (DisplayOnly | DisplayYesNo, KeyboardOnly)
        | (KeyboardDisplay, KeyboardOnly)
        | (KeyboardOnly, KeyboardDisplay) => PairingMethod::PasskeyEntry,
        (KeyboardDisplay, DisplayOnly) | (DisplayOnly, KeyboardDisplay) => PairingMethod::JustWorks,
        (KeyboardDisplay, DisplayYesNo) | (DisplayYesNo, KeyboardDisplay) if sc => PairingMethod::NumericComparison,
        (KeyboardDisplay, DisplayYesNo) | (DisplayYesNo, KeyboardDisplay) => PairingMethod::PasskeyEntry,
        (KeyboardDisplay, KeyboardDisplay) if sc => PairingMethod::NumericComparison,
        (KeyboardDisplay, KeyboardDisplay) => PairingMethod::PasskeyEntry,
    }
}

/// Collaborator a pairing phase asks to display or collect passkeys/
/// comparisons. Declared interface only — the actual prompt surface (CLI,
/// GUI dialog) lives outside this crate, mirroring how
/// [`crate::gap::le::LocalAddressDelegate`] stands in for platform address
/// resolution.
pub trait PairingDelegate: Send + Sync + 'static {
    /// Displays a 6-digit passkey the peer's user must enter
    /// (`PasskeyEntry`, this side is the display).
    fn display_passkey(&self, passkey: u32) -> BoxFuture<'_, ()>;

    /// Requests a 6-digit passkey from the local user (`PasskeyEntry`, this
    /// side has the keyboard).
    fn request_passkey(&self) -> BoxFuture<'_, Option<u32>>;

    /// Asks the local user to confirm that `value` matches what the peer
    /// displays (`NumericComparison`).
    fn confirm_numeric(&self, value: u32) -> BoxFuture<'_, bool>;

    /// Asks the local user to accept or reject pairing with no numeric
    /// exchange (`JustWorks`).
    fn confirm_just_works(&self) -> BoxFuture<'_, bool>;
}

/// Guards against calling `OnFailure` more than once per pairing attempt
/// (spec `# 4.5`: "`OnFailure` is idempotent-guarded").
#[derive(Debug, Default)]
pub(crate) struct FailureGuard(AtomicBool);

impl FailureGuard {
    /// Marks the machine as failed, returning `true` the first time this is
    /// called and `false` on every subsequent call.
    pub(crate) fn trigger(&self) -> bool {
        !self.0.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn is_failed(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Resettable per-phase inactivity timer built from a
/// [`CancellationToken`]: any PDU/event that advances the phase calls
/// [`Self::reset`], and [`Self::wait`] races the remaining deadline against
/// cancellation.
#[derive(Debug)]
pub(crate) struct PhaseTimer {
    token: CancellationToken,
}

impl Default for PhaseTimer {
    fn default() -> Self {
        Self { token: CancellationToken::new() }
    }
}

impl PhaseTimer {
    /// Cancels the current deadline and starts a fresh one.
    pub(crate) fn reset(&mut self) {
        self.token.cancel();
        self.token = CancellationToken::new();
    }

    /// Resolves when either `PHASE_TIMEOUT` elapses or the phase advances
    /// (via [`Self::reset`] racing it out), returning `true` on timeout.
    pub(crate) async fn wait_expired(&self) -> bool {
        let token = self.token.clone();
        tokio::select! {
            () = tokio::time::sleep(PHASE_TIMEOUT) => !token.is_cancelled(),
            () = token.cancelled() => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn just_works_when_neither_side_needs_mitm() {
        let m = choose_method(IoCapability::NoInputNoOutput, IoCapability::DisplayYesNo, false, false, false);
        assert_eq!(m, PairingMethod::JustWorks);
    }

    #[test]
    fn numeric_comparison_when_both_displays_and_sc() {
        let m = choose_method(IoCapability::DisplayYesNo, IoCapability::DisplayYesNo, false, true, true);
        assert_eq!(m, PairingMethod::NumericComparison);
    }

    #[test]
    fn passkey_entry_when_both_keyboards() {
        let m = choose_method(IoCapability::KeyboardOnly, IoCapability::KeyboardOnly, false, true, false);
        assert_eq!(m, PairingMethod::PasskeyEntry);
    }

    #[test]
    fn no_input_no_output_always_just_works() {
        let m = choose_method(IoCapability::NoInputNoOutput, IoCapability::KeyboardOnly, false, true, false);
        assert_eq!(m, PairingMethod::JustWorks);
    }

    #[test]
    fn failure_guard_fires_once() {
        let g = FailureGuard::default();
        assert!(g.trigger());
        assert!(!g.trigger());
        assert!(g.is_failed());
    }
}
