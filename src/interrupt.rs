//! Ctrl-C delivery to long-running work.
//!
//! One listener per process owns the signal. Downloads and batch delays
//! wait on an [`Interrupt`]; a Ctrl-C with nobody waiting (e.g. at a menu
//! prompt) ends the process like the default handler would.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;
use tracing::{info, warn};

/// Exit status of a process ended by SIGINT.
const INTERRUPTED_EXIT_CODE: i32 = 130;

#[derive(Debug, Default)]
struct Inner {
    notify: Notify,
    waiters: AtomicUsize,
}

/// Cloneable interrupt handle; clones share state. A default handle only
/// fires through [`Interrupt::trigger`].
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    inner: Arc<Inner>,
}

struct WaitGuard<'a>(&'a Inner);

impl<'a> WaitGuard<'a> {
    fn new(inner: &'a Inner) -> Self {
        inner.waiters.fetch_add(1, Ordering::SeqCst);
        Self(inner)
    }
}

impl Drop for WaitGuard<'_> {
    fn drop(&mut self) {
        self.0.waiters.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Interrupt {
    /// Handle wired to the process Ctrl-C. Must be called inside the tokio
    /// runtime.
    pub fn ctrl_c() -> Self {
        let interrupt = Self::default();
        let listener = interrupt.clone();
        tokio::spawn(async move {
            loop {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!("Ctrl-C handler unavailable: {}", e);
                    return;
                }
                if !listener.trigger() {
                    println!("\n👋 Interrupted");
                    info!("Interrupted outside of a download, exiting");
                    std::process::exit(INTERRUPTED_EXIT_CODE);
                }
            }
        });
        interrupt
    }

    /// Resolves on the next trigger.
    pub async fn wait(&self) {
        let notified = self.inner.notify.notified();
        let _guard = WaitGuard::new(&self.inner);
        notified.await;
    }

    pub fn is_awaited(&self) -> bool {
        self.inner.waiters.load(Ordering::SeqCst) > 0
    }

    /// Wake every current waiter. Returns `false`, and wakes nothing, when
    /// no one is waiting.
    pub fn trigger(&self) -> bool {
        if !self.is_awaited() {
            return false;
        }
        self.inner.notify.notify_waiters();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn trigger_without_waiters_reports_false() {
        let interrupt = Interrupt::default();
        assert!(!interrupt.is_awaited());
        assert!(!interrupt.trigger());
    }

    #[tokio::test(start_paused = true)]
    async fn trigger_wakes_waiters() {
        let interrupt = Interrupt::default();
        let stopper = interrupt.clone();

        let stop = async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            assert!(stopper.trigger());
        };
        tokio::join!(interrupt.wait(), stop);

        assert!(!interrupt.is_awaited());
    }

    #[tokio::test(start_paused = true)]
    async fn missed_trigger_does_not_fire_later() {
        let interrupt = Interrupt::default();
        assert!(!interrupt.trigger());

        let fired = tokio::select! {
            _ = interrupt.wait() => true,
            _ = tokio::time::sleep(Duration::from_secs(5)) => false,
        };
        assert!(!fired);
    }
}
