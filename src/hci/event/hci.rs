use smallvec::SmallVec;

use super::*;

/// `HCI_Disconnection_Complete` event parameters
/// ([Vol 4] Part E, Section 7.7.5).
#[derive(Clone, Copy, Debug)]
pub struct DisconnectionComplete {
    pub status: Status,
    pub handle: ConnHandle,
    pub reason: Status,
}

impl From<&mut Event<'_>> for DisconnectionComplete {
    fn from(e: &mut Event<'_>) -> Self {
        Self {
            status: e.status(),
            handle: e.conn_handle().unwrap_or_default(),
            reason: Status::from(e.u8()),
        }
    }
}

/// `HCI_Number_Of_Completed_Packets` event parameters
/// ([Vol 4] Part E, Section 7.7.19).
#[derive(Clone, Debug)]
#[repr(transparent)]
pub struct NumberOfCompletedPackets(SmallVec<[(ConnHandle, u16); 4]>);

impl From<&mut Event<'_>> for NumberOfCompletedPackets {
    fn from(e: &mut Event<'_>) -> Self {
        let n = usize::from(e.u8());
        let mut v = SmallVec::with_capacity(n);
        for _ in 0..n {
            let handle = e.u16();
            let completed = e.u16();
            if let Some(cn) = ConnHandle::new(handle) {
                v.push((cn, completed));
            }
        }
        Self(v)
    }
}

impl AsRef<[(ConnHandle, u16)]> for NumberOfCompletedPackets {
    #[inline]
    fn as_ref(&self) -> &[(ConnHandle, u16)] {
        self.0.as_ref()
    }
}
