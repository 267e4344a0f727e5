//! Idle-Connection Reaper
//!
//! A background task that wakes on a fixed interval and walks the
//! connection registry, requesting close on anything idle past the timeout
//! or already marked closing. Connections that keep talking are never
//! touched; the 5-minute default matches the protocol's inactivity
//! contract.

use crate::connection::registry::ConnectionRegistry;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

/// Configuration for the reaper.
#[derive(Debug, Clone)]
pub struct ReaperConfig {
    /// Pause between sweeps (default: 10 s).
    pub sweep_interval: Duration,
    /// Connections idle longer than this are released (default: 300 s).
    pub idle_timeout: Duration,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(300),
        }
    }
}

/// Handle to the running reaper. Dropping it stops the task.
#[derive(Debug)]
pub struct Reaper {
    shutdown_tx: watch::Sender<bool>,
}

impl Reaper {
    /// Starts the reaper over `registry`.
    pub fn start(registry: Arc<ConnectionRegistry>, config: ReaperConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tokio::spawn(reaper_loop(registry, config, shutdown_rx));

        info!("Connection reaper started");
        Self { shutdown_tx }
    }

    /// Stops the reaper. Called automatically on drop.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

impl Drop for Reaper {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn reaper_loop(
    registry: Arc<ConnectionRegistry>,
    config: ReaperConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(config.sweep_interval) => {}
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    debug!("Reaper received shutdown signal");
                    return;
                }
            }
        }

        let closed = registry.sweep(config.idle_timeout);
        if closed > 0 {
            debug!(
                closed,
                remaining = registry.len(),
                "Reaper sweep released connections"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    fn addr() -> SocketAddr {
        "127.0.0.1:9".parse().unwrap()
    }

    fn fast_config() -> ReaperConfig {
        ReaperConfig {
            sweep_interval: Duration::from_millis(10),
            idle_timeout: Duration::from_millis(50),
        }
    }

    #[tokio::test]
    async fn test_reaper_releases_idle_connection() {
        let registry = Arc::new(ConnectionRegistry::new());
        let entry = registry.register(addr()).unwrap();
        entry.backdate(Duration::from_secs(1));

        let _reaper = Reaper::start(Arc::clone(&registry), fast_config());

        tokio::time::timeout(Duration::from_secs(1), entry.closed())
            .await
            .expect("idle connection was not reaped");
        assert!(entry.is_closing());
    }

    #[tokio::test]
    async fn test_reaper_spares_active_connection() {
        let registry = Arc::new(ConnectionRegistry::new());
        let entry = registry.register(addr()).unwrap();

        let _reaper = Reaper::start(Arc::clone(&registry), fast_config());

        // Keep touching for longer than several sweep intervals.
        for _ in 0..10 {
            entry.touch();
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!entry.is_closing());
    }

    #[tokio::test]
    async fn test_reaper_stops_on_drop() {
        let registry = Arc::new(ConnectionRegistry::new());

        {
            let _reaper = Reaper::start(Arc::clone(&registry), fast_config());
            tokio::time::sleep(Duration::from_millis(30)).await;
        }

        // Reaper is gone; a stale entry stays untouched.
        let entry = registry.register(addr()).unwrap();
        entry.backdate(Duration::from_secs(1));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!entry.is_closing());
    }
}
