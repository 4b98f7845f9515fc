use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::signal::ctrl_c;
use tokio::sync::Notify;
use tracing::{error, warn};

/// Two-stage Ctrl-C handling: the first press lets the current account finish,
/// the second aborts immediately.
#[derive(Clone)]
pub struct ShutdownManager {
    requested: Arc<AtomicBool>,
    forced: Arc<AtomicBool>,
    force_notify: Arc<Notify>,
}

impl ShutdownManager {
    pub fn new() -> Self {
        Self {
            requested: Arc::new(AtomicBool::new(false)),
            forced: Arc::new(AtomicBool::new(false)),
            force_notify: Arc::new(Notify::new()),
        }
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    pub fn is_forced(&self) -> bool {
        self.forced.load(Ordering::SeqCst)
    }

    /// Resolves once a forced shutdown happened, including one that already did.
    pub async fn wait_for_force(&self) {
        let notified = self.force_notify.notified();
        if self.is_forced() {
            return;
        }
        notified.await;
    }

    pub fn request(&self) {
        if !self.requested.swap(true, Ordering::SeqCst) {
            warn!("Stopping after the current account (press Ctrl-C again to abort)");
        }
    }

    pub fn force(&self) {
        self.requested.store(true, Ordering::SeqCst);
        if !self.forced.swap(true, Ordering::SeqCst) {
            error!("Aborting immediately");
            self.force_notify.notify_waiters();
        }
    }

    async fn listen(&self) -> std::io::Result<()> {
        ctrl_c().await?;
        self.request();
        ctrl_c().await?;
        self.force();
        Ok(())
    }
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}

pub fn setup_shutdown_handler() -> ShutdownManager {
    let shutdown_manager = ShutdownManager::new();

    let listener = shutdown_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = listener.listen().await {
            warn!("Error setting up signal handler: {}", e);
        }
    });

    shutdown_manager
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn force_implies_request() {
        let manager = ShutdownManager::new();
        assert!(!manager.is_requested());

        manager.request();
        assert!(manager.is_requested());
        assert!(!manager.is_forced());

        manager.force();
        assert!(manager.is_forced());
    }

    #[tokio::test]
    async fn waiting_after_force_returns_at_once() {
        let manager = ShutdownManager::new();
        manager.force();
        tokio::time::timeout(Duration::from_secs(1), manager.wait_for_force())
            .await
            .unwrap();
    }
}
