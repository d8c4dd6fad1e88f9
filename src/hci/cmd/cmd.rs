//! HCI command parameter builders, grouped by the OGF they belong to
//! ([Vol 4] Part E, Section 7).

#[path = "conn.rs"]
mod conn;
#[path = "hci_control.rs"]
mod hci_control;
#[path = "le.rs"]
mod le;

pub use hci_control::EventMask;
pub use le::{AdvEnableParams, AdvParams, LeBufferSize, LeEventMask};
