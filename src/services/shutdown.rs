//! Cooperative shutdown signal shared by the daemons.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::info;

/// Process-wide shutdown flag the daemon loops wait on.
///
/// Every per-tick sleep is a bounded wait on this signal, so shutdown is
/// at most one event-loop hop away. In-flight ticks complete before the
/// loop exits.
#[derive(Clone)]
pub struct ShutdownSignal {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
        }
    }

    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Wait for the signal or the timeout, whichever comes first.
    /// Returns true if shutdown was triggered.
    pub async fn wait_timeout(&self, timeout: Duration) -> bool {
        if self.is_set() {
            return true;
        }
        let notified = self.notify.notified();
        tokio::pin!(notified);
        tokio::select! {
            () = &mut notified => true,
            () = tokio::time::sleep(timeout) => self.is_set(),
        }
    }

    /// Install SIGINT/SIGTERM handlers that trigger this signal.
    ///
    /// Must be called before starting any long-running task so signals
    /// arriving during startup are not lost.
    pub fn install_handlers(&self) -> std::io::Result<()> {
        use tokio::signal::unix::{signal, SignalKind};

        for kind in [SignalKind::interrupt(), SignalKind::terminate()] {
            let mut stream = signal(kind)?;
            let this = self.clone();
            tokio::spawn(async move {
                if stream.recv().await.is_some() {
                    info!("received shutdown signal");
                    this.trigger();
                }
            });
        }
        Ok(())
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn wait_times_out_without_trigger() {
        let signal = ShutdownSignal::new();
        let triggered = signal.wait_timeout(Duration::from_millis(10)).await;
        assert!(!triggered);
        assert!(!signal.is_set());
    }

    #[tokio::test]
    async fn trigger_wakes_waiters_immediately() {
        let signal = ShutdownSignal::new();
        let waiter = signal.clone();
        let handle = tokio::spawn(async move { waiter.wait_timeout(Duration::from_secs(30)).await });

        tokio::time::sleep(Duration::from_millis(5)).await;
        signal.trigger();

        let triggered = handle.await.unwrap();
        assert!(triggered);
        assert!(signal.is_set());
    }

    #[tokio::test]
    async fn wait_after_trigger_returns_immediately() {
        let signal = ShutdownSignal::new();
        signal.trigger();
        assert!(signal.wait_timeout(Duration::from_secs(30)).await);
    }
}
