// ABOUTME: Process restart request raised when the agent changed the assistant's own code.
// ABOUTME: The entry point waits on it, lets every gate drain, then exits for the supervisor.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Clone, Default)]
pub struct RestartSignal {
    requested: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl RestartSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        if !self.requested.swap(true, Ordering::SeqCst) {
            tracing::info!("Restart requested");
        }
        self.notify.notify_waiters();
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Resolve once a restart has been requested
    pub async fn requested(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_requested() {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn waiter_wakes_on_request() {
        let signal = RestartSignal::new();
        let waiter = {
            let signal = signal.clone();
            tokio::spawn(async move { signal.requested().await })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        signal.request();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(signal.is_requested());
    }

    #[tokio::test]
    async fn request_before_wait_resolves_immediately() {
        let signal = RestartSignal::new();
        signal.request();
        tokio::time::timeout(Duration::from_millis(100), signal.requested())
            .await
            .unwrap();
    }
}
