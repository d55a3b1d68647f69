//! Manual-reset wait object used for change notification.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

/// A manual-reset event: once signaled it stays signaled until [`reset`].
///
/// Backends signal it from whatever thread performs the mutation. Pollers
/// use [`is_signaled`]; async callers that want to block until a change
/// await [`wait`].
///
/// [`reset`]: WaitEvent::reset
/// [`is_signaled`]: WaitEvent::is_signaled
/// [`wait`]: WaitEvent::wait
#[derive(Debug, Default)]
pub struct WaitEvent {
    signaled: AtomicBool,
    notify: Notify,
}

impl WaitEvent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signal(&self) {
        self.signaled.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub fn reset(&self) {
        self.signaled.store(false, Ordering::Release);
    }

    /// Zero-timeout poll.
    pub fn is_signaled(&self) -> bool {
        self.signaled.load(Ordering::Acquire)
    }

    /// Resolves once the event is signaled. Does not reset it.
    pub async fn wait(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before checking the flag so a concurrent `signal`
            // cannot slip between the check and the await.
            notified.as_mut().enable();
            if self.is_signaled() {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{sync::Arc, time::Duration};

    #[test]
    fn stays_signaled_until_reset() {
        let event = WaitEvent::new();
        assert!(!event.is_signaled());
        event.signal();
        assert!(event.is_signaled());
        assert!(event.is_signaled());
        event.reset();
        assert!(!event.is_signaled());
    }

    #[tokio::test]
    async fn wait_returns_immediately_when_signaled() {
        let event = WaitEvent::new();
        event.signal();
        tokio::time::timeout(Duration::from_secs(1), event.wait())
            .await
            .expect("wait should not block on a signaled event");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn wait_wakes_on_signal_from_other_thread() {
        let event = Arc::new(WaitEvent::new());
        let signaler = event.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            signaler.signal();
        });
        tokio::time::timeout(Duration::from_secs(5), event.wait())
            .await
            .expect("signal should wake the waiter");
        assert!(event.is_signaled());
    }
}
