//! Connectivity observation for the sync engine.

use log::debug;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Reactive online/offline signal consumed by the sync engine.
pub trait ConnectivityProbe: Send + Sync {
    fn is_online(&self) -> bool;
}

/// Watch-channel backed connectivity state. The agent flips it from a
/// periodic reachability probe; subscribers see online/offline transitions.
pub struct ConnectivityMonitor {
    tx: watch::Sender<bool>,
}

impl ConnectivityMonitor {
    pub fn new(initially_online: bool) -> Self {
        let (tx, _) = watch::channel(initially_online);
        Self { tx }
    }

    pub fn set_online(&self, online: bool) {
        // send_if_modified keeps subscribers from waking on no-op updates.
        let changed = self.tx.send_if_modified(|state| {
            if *state == online {
                false
            } else {
                *state = online;
                true
            }
        });
        if changed {
            debug!("connectivity changed: online={online}");
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl ConnectivityProbe for ConnectivityMonitor {
    fn is_online(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Periodically probe the API origin and keep the monitor current.
pub fn spawn_reachability_probe(
    monitor: Arc<ConnectivityMonitor>,
    base_url: String,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let client = match reqwest::Client::builder().timeout(Duration::from_secs(5)).build() {
            Ok(client) => client,
            Err(err) => {
                log::warn!("reachability probe disabled: {err}");
                return;
            }
        };
        loop {
            let online = client.head(&base_url).send().await.is_ok();
            monitor.set_online(online);
            tokio::time::sleep(interval).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_only_wake_on_transitions() {
        let monitor = ConnectivityMonitor::new(false);
        let mut rx = monitor.subscribe();

        monitor.set_online(false);
        assert!(!rx.has_changed().expect("channel open"), "no-op update suppressed");

        monitor.set_online(true);
        assert!(rx.has_changed().expect("channel open"));
        assert!(*rx.borrow_and_update());
        assert!(monitor.is_online());
    }
}
