//! Small internal utilities shared across modules.

use std::ops::{Deref, DerefMut};

/// A [`parking_lot::Mutex`] paired with a [`tokio::sync::Notify`], giving
/// synchronous code a condition variable it can wait on asynchronously.
/// Used for the handful of places — the HCI [`EventRouter`](crate::hci::EventRouter)
/// waiter queue, the L2CAP signaling RTX bookkeeping — where state is
/// mutated from a synchronous context but another task needs to block until
/// it changes.
#[derive(Debug)]
pub(crate) struct Condvar<T> {
    state: parking_lot::Mutex<T>,
    notify: tokio::sync::Notify,
}

impl<T: Default> Default for Condvar<T> {
    #[inline]
    fn default() -> Self {
        Self {
            state: parking_lot::Mutex::default(),
            notify: tokio::sync::Notify::new(),
        }
    }
}

impl<T> Condvar<T> {
    /// Locks the inner state.
    #[inline]
    pub fn lock(&self) -> CondvarGuard<'_, T> {
        CondvarGuard {
            cv: self,
            guard: Some(self.state.lock()),
        }
    }
}

/// Guard returned by [`Condvar::lock`]. Derefs to the protected state and
/// additionally provides [`Self::notify_all`] and [`Self::notified`].
#[derive(Debug)]
pub(crate) struct CondvarGuard<'a, T> {
    cv: &'a Condvar<T>,
    guard: Option<parking_lot::MutexGuard<'a, T>>,
}

impl<T> Deref for CondvarGuard<'_, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        self.guard.as_deref().expect("guard held")
    }
}

impl<T> DerefMut for CondvarGuard<'_, T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        self.guard.as_deref_mut().expect("guard held")
    }
}

impl<T> CondvarGuard<'_, T> {
    /// Wakes every task currently blocked in [`Self::notified`], including
    /// ones that registered before this call but haven't polled yet.
    #[inline]
    pub fn notify_all(&self) {
        self.cv.notify.notify_waiters();
    }

    /// Releases the lock and waits for the next [`Self::notify_all`] call,
    /// then reacquires the lock. The `Notified` future is created before the
    /// lock is released, so a `notify_all` racing with this call is never
    /// missed.
    pub async fn notified(&mut self) {
        let notified = self.cv.notify.notified();
        drop(self.guard.take());
        notified.await;
        self.guard = Some(self.cv.state.lock());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn notify_all_wakes_waiter_registered_first() {
        let cv: Arc<Condvar<u32>> = Arc::new(Condvar::default());
        let waiter = {
            let cv = Arc::clone(&cv);
            tokio::spawn(async move {
                let mut g = cv.lock();
                g.notified().await;
                *g
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        {
            let mut g = cv.lock();
            *g = 7;
            g.notify_all();
        }
        assert_eq!(waiter.await.unwrap(), 7);
    }
}
