//! Tracking of the proxies an agent is connected through
//!
//! When proxy peering is not enabled the connected proxies are an empty list.

use async_trait::async_trait;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, trace};
use tunnelmesh_signal::SignalSource;

/// Signals when the set of proxies an agent is connected to changes.
///
/// The set is kept exactly as reported (order included) and replaced
/// wholesale on every accepted update. Changes that land before the signal
/// is drained are compacted into a single pending signal.
#[derive(Debug)]
pub struct ConnectedProxies {
    ids: RwLock<Vec<String>>,
    change_tx: mpsc::Sender<()>,
    change_rx: ChangeReceiver,
}

impl ConnectedProxies {
    pub fn new() -> Self {
        let (change_tx, change_rx) = mpsc::channel(1);

        Self {
            ids: RwLock::new(Vec::new()),
            change_tx,
            change_rx: ChangeReceiver {
                rx: Arc::new(Mutex::new(change_rx)),
            },
        }
    }

    /// Get the list of proxies the agent is connected to
    pub fn proxy_ids(&self) -> Vec<String> {
        // Writers only ever swap in a complete set, so a poisoned lock still
        // guards a consistent value.
        self.ids
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Get the receiver that is signalled when the connected proxies change
    ///
    /// After a signal, read [`ConnectedProxies::proxy_ids`]; the set may
    /// already be newer than the update that raised the signal.
    pub fn wait_for_change(&self) -> ChangeReceiver {
        self.change_rx.clone()
    }

    /// Replace the connected proxy ids, signalling a change if they differ
    pub fn update_proxy_ids(&self, ids: Vec<String>) {
        let mut current = self.ids.write().unwrap_or_else(PoisonError::into_inner);

        if *current == ids {
            return;
        }

        debug!(
            proxy_count = ids.len(),
            previous_count = current.len(),
            "Connected proxies changed"
        );

        *current = ids;

        // Multiple changes are compacted into a single signal if one is
        // already pending.
        if self.change_tx.try_send(()).is_err() {
            trace!("Proxy change signal already pending");
        }
    }
}

impl Default for ConnectedProxies {
    fn default() -> Self {
        Self::new()
    }
}

/// Receive side of the [`ConnectedProxies`] change signal
///
/// Clones share the same single-slot signal, so each pending signal is
/// taken by exactly one of them.
#[derive(Debug, Clone)]
pub struct ChangeReceiver {
    rx: Arc<Mutex<mpsc::Receiver<()>>>,
}

impl ChangeReceiver {
    /// Wait until the connected proxies change.
    ///
    /// Returns `None` once the [`ConnectedProxies`] has been dropped.
    pub async fn changed(&self) -> Option<()> {
        self.rx.lock().await.recv().await
    }

    /// Take a pending change signal without waiting
    pub fn try_changed(&self) -> bool {
        match self.rx.try_lock() {
            Ok(mut rx) => rx.try_recv().is_ok(),
            // Another clone is waiting and will take the signal
            Err(_) => false,
        }
    }
}

#[async_trait]
impl SignalSource for ChangeReceiver {
    async fn recv(&mut self) -> Option<()> {
        self.changed().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_agent_proxy_updates() {
        let proxies = ConnectedProxies::new();
        let changes = proxies.wait_for_change();

        let expected = ids(&["test"]);
        proxies.update_proxy_ids(expected.clone());

        assert!(changes.try_changed(), "Expected a change signal");
        assert_eq!(proxies.proxy_ids(), expected);

        proxies.update_proxy_ids(ids(&["test", "test2"]));
        proxies.update_proxy_ids(expected.clone());

        assert!(changes.try_changed(), "Expected a change signal");
        assert_eq!(proxies.proxy_ids(), expected);

        assert!(!changes.try_changed(), "Expected no further change signal");
    }

    #[test]
    fn test_starts_empty_without_signal() {
        let proxies = ConnectedProxies::default();

        assert!(proxies.proxy_ids().is_empty());
        assert!(!proxies.wait_for_change().try_changed());
    }

    #[test]
    fn test_identical_update_does_not_signal() {
        let proxies = ConnectedProxies::new();
        let changes = proxies.wait_for_change();

        proxies.update_proxy_ids(ids(&["a"]));
        assert!(changes.try_changed());

        proxies.update_proxy_ids(ids(&["a"]));
        assert!(!changes.try_changed());
    }

    #[test]
    fn test_update_keeps_order_and_duplicates() {
        let proxies = ConnectedProxies::new();
        let changes = proxies.wait_for_change();

        proxies.update_proxy_ids(ids(&["b", "a", "b"]));
        assert!(changes.try_changed());
        assert_eq!(proxies.proxy_ids(), ids(&["b", "a", "b"]));

        // Same members in another order is a change
        proxies.update_proxy_ids(ids(&["a", "b", "b"]));
        assert!(changes.try_changed());
        assert_eq!(proxies.proxy_ids(), ids(&["a", "b", "b"]));
    }

    #[test]
    fn test_empty_set_transitions() {
        let proxies = ConnectedProxies::new();
        let changes = proxies.wait_for_change();

        // Empty to empty is not a change
        proxies.update_proxy_ids(Vec::new());
        assert!(!changes.try_changed());

        proxies.update_proxy_ids(ids(&["a", "b"]));
        assert!(changes.try_changed());

        proxies.update_proxy_ids(Vec::new());
        assert!(changes.try_changed());
        assert!(proxies.proxy_ids().is_empty());
    }

    #[test]
    fn test_snapshot_is_independent() {
        let proxies = ConnectedProxies::new();
        proxies.update_proxy_ids(ids(&["a"]));

        let snapshot = proxies.proxy_ids();
        proxies.update_proxy_ids(ids(&["b", "c"]));

        assert_eq!(snapshot, ids(&["a"]));
        assert_eq!(proxies.proxy_ids(), ids(&["b", "c"]));
    }

    #[test]
    fn test_cloned_receivers_share_one_signal() {
        let proxies = ConnectedProxies::new();
        let first = proxies.wait_for_change();
        let second = first.clone();

        proxies.update_proxy_ids(ids(&["a"]));

        let taken = [first.try_changed(), second.try_changed()];
        assert_eq!(taken.iter().filter(|t| **t).count(), 1);
    }

    #[tokio::test]
    async fn test_changed_wakes_waiting_task() {
        let proxies = Arc::new(ConnectedProxies::new());
        let changes = proxies.wait_for_change();

        let waiter = tokio::spawn(async move { changes.changed().await });

        tokio::task::yield_now().await;
        proxies.update_proxy_ids(ids(&["proxy-1"]));

        let result = tokio::time::timeout(Duration::from_secs(1), waiter).await;
        assert!(matches!(result, Ok(Ok(Some(())))));
    }

    #[tokio::test]
    async fn test_changed_returns_none_after_tracker_dropped() {
        let proxies = ConnectedProxies::new();
        let mut changes = proxies.wait_for_change();

        drop(proxies);

        assert_eq!(SignalSource::recv(&mut changes).await, None);
    }
}
