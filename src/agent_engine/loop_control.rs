// Per-turn cancellation shared between the caller and the session worker.
use std::sync::Arc;

use tokio::sync::watch;

#[derive(Clone)]
pub struct TurnControl {
    tx: Arc<watch::Sender<bool>>,
}

impl TurnControl {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Idempotent. Inference is abandoned immediately; an executor run stops
    /// at the next action boundary.
    pub fn cancel(&self) {
        if !self.tx.send_replace(true) {
            tracing::info!("turn cancellation requested");
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once `cancel` has been called.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|c| *c).await;
    }
}

impl Default for TurnControl {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn cancel_wakes_waiters() {
        let control = TurnControl::new();
        let waiter = {
            let control = control.clone();
            tokio::spawn(async move { control.cancelled().await })
        };
        tokio::task::yield_now().await;
        assert!(!control.is_cancelled());

        control.cancel();
        control.cancel();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter woke")
            .unwrap();
        assert!(control.is_cancelled());
    }

    #[tokio::test]
    async fn already_cancelled_resolves_immediately() {
        let control = TurnControl::new();
        control.cancel();
        control.cancelled().await;
    }
}
