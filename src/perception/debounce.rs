//! Coalesces bursts of "screen changed" notifications into settled captures.
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::perception::snapshotter::ScreenSnapshotter;
use crate::perception::types::ScreenState;

const SIGNAL_CAPACITY: usize = 64;

/// Platform-side sender of UI change signals. Cheap to clone.
#[derive(Clone)]
pub struct ScreenChangeNotifier {
    tx: mpsc::Sender<()>,
}

impl ScreenChangeNotifier {
    /// Never blocks; a full channel already guarantees a pending capture.
    pub fn notify(&self) {
        if let Err(mpsc::error::TrySendError::Closed(_)) = self.tx.try_send(()) {
            tracing::trace!("screen change dropped, debouncer stopped");
        }
    }
}

/// Read side of the most recent settled snapshot.
#[derive(Clone)]
pub struct SnapshotCache {
    rx: watch::Receiver<Option<Arc<ScreenState>>>,
}

impl SnapshotCache {
    pub fn latest(&self) -> Option<Arc<ScreenState>> {
        self.rx.borrow().clone()
    }

    /// Waits until a snapshot newer than the last one seen is published.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }

    /// A cache that is never filled, for sessions without a change feed.
    pub fn empty() -> Self {
        let (tx, rx) = watch::channel(None);
        drop(tx);
        Self { rx }
    }
}

/// Spawns the debounce task.
///
/// Trailing-edge: every signal restarts the window, and the capture runs once
/// the window elapses with no further signal, so the settled state is the one
/// recorded. A burst that never goes quiet is captured anyway once `max_settle`
/// has passed since its first signal. Failed captures leave the previous
/// snapshot in place.
pub fn spawn_debouncer(
    snapshotter: ScreenSnapshotter,
    window: Duration,
    max_settle: Duration,
) -> (ScreenChangeNotifier, SnapshotCache, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<()>(SIGNAL_CAPACITY);
    let (cache_tx, cache_rx) = watch::channel::<Option<Arc<ScreenState>>>(None);
    let max_settle = max_settle.max(window);

    let handle = tokio::spawn(async move {
        while rx.recv().await.is_some() {
            let deadline = Instant::now() + max_settle;
            let mut coalesced = 1usize;
            loop {
                let now = Instant::now();
                if now >= deadline {
                    tracing::debug!(coalesced, "screen still changing, capturing at settle deadline");
                    break;
                }
                let wait = window.min(deadline - now);
                match tokio::time::timeout(wait, rx.recv()).await {
                    Ok(Some(())) => coalesced += 1,
                    Ok(None) => return,
                    Err(_) => break,
                }
            }

            match snapshotter.capture().await {
                Ok(state) => {
                    tracing::debug!(
                        coalesced,
                        elements = state.len(),
                        app = %state.app_identifier(),
                        "settled snapshot published"
                    );
                    if cache_tx.send(Some(Arc::new(state))).is_err() {
                        return;
                    }
                }
                Err(e) => {
                    tracing::debug!(error = %e, coalesced, "settled capture failed, keeping previous snapshot");
                }
            }
        }
        tracing::debug!("screen change feed closed, debouncer exiting");
    });

    (
        ScreenChangeNotifier { tx },
        SnapshotCache { rx: cache_rx },
        handle,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SnapshotConfig;
    use crate::testing::{FakeNode, FakePlatform};

    const WINDOW: Duration = Duration::from_millis(300);
    const MAX_SETTLE: Duration = Duration::from_millis(2_000);

    fn platform() -> Arc<FakePlatform> {
        Arc::new(FakePlatform::new(
            "com.example.mail",
            FakeNode::new("android.widget.FrameLayout")
                .bounds(0, 0, 1080, 2400)
                .child(FakeNode::button("Compose").bounds(800, 2000, 1000, 2200)),
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn burst_yields_single_capture_of_settled_state() {
        let platform = platform();
        let snapshotter = ScreenSnapshotter::new(platform.clone(), SnapshotConfig::default());
        let (notifier, mut cache, _task) = spawn_debouncer(snapshotter, WINDOW, MAX_SETTLE);

        assert!(cache.latest().is_none());
        for _ in 0..5 {
            notifier.notify();
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert!(cache.latest().is_none(), "must not capture mid-burst");

        assert!(cache.changed().await);
        let snap = cache.latest().unwrap();
        assert_eq!(snap.app_identifier(), "com.example.mail");
        assert_eq!(snap.visible_labels(5), vec!["Compose"]);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_capture_keeps_previous_snapshot() {
        let platform = platform();
        let snapshotter = ScreenSnapshotter::new(platform.clone(), SnapshotConfig::default());
        let (notifier, mut cache, _task) = spawn_debouncer(snapshotter, WINDOW, MAX_SETTLE);

        notifier.notify();
        assert!(cache.changed().await);
        let first = cache.latest().unwrap();

        platform.set_window_available(false);
        notifier.notify();
        tokio::time::sleep(Duration::from_millis(1_000)).await;

        let still = cache.latest().unwrap();
        assert!(Arc::ptr_eq(&first, &still));
    }

    #[tokio::test(start_paused = true)]
    async fn continuous_changes_still_publish_at_deadline() {
        let platform = platform();
        let snapshotter = ScreenSnapshotter::new(platform.clone(), SnapshotConfig::default());
        let (notifier, cache, _task) = spawn_debouncer(snapshotter, WINDOW, MAX_SETTLE);

        // A spinner: never quiet for a full window.
        for _ in 0..15 {
            notifier.notify();
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert!(cache.latest().is_none(), "deadline not reached yet");

        for _ in 0..35 {
            notifier.notify();
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        let snap = cache.latest().expect("snapshot published despite ongoing changes");
        assert_eq!(snap.app_identifier(), "com.example.mail");
    }

    #[tokio::test]
    async fn empty_cache_has_nothing() {
        assert!(SnapshotCache::empty().latest().is_none());
    }
}
