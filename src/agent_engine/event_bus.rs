use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{broadcast, watch};

use crate::agent_engine::state::{AgentStatus, ExecutionResult, PlanSource, TurnOutcome};

const EVENT_CAPACITY: usize = 64;

/// Progress notifications for observers of a session.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TurnEvent {
    TurnStarted {
        turn_id: u64,
        message: String,
    },
    PlanReady {
        turn_id: u64,
        actions: usize,
        source: PlanSource,
    },
    ActionFinished {
        turn_id: u64,
        step: usize,
        result: ExecutionResult,
    },
    TurnFinished {
        turn_id: u64,
        outcome: TurnOutcome,
        response: String,
    },
}

/// Observable session status plus a broadcast of turn events.
///
/// Status is a `watch` so late subscribers always see the current value;
/// events are lossy for receivers that fall behind.
#[derive(Clone)]
pub struct EventBus {
    status_tx: Arc<watch::Sender<AgentStatus>>,
    events_tx: broadcast::Sender<TurnEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (status_tx, _) = watch::channel(AgentStatus::Idle);
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            status_tx: Arc::new(status_tx),
            events_tx,
        }
    }

    pub fn set_status(&self, status: AgentStatus) {
        let previous = self.status_tx.send_replace(status);
        if previous != status {
            tracing::debug!(from = ?previous, to = ?status, "agent status changed");
        }
    }

    pub fn subscribe_status(&self) -> watch::Receiver<AgentStatus> {
        self.status_tx.subscribe()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TurnEvent> {
        self.events_tx.subscribe()
    }

    /// Having no subscribers is fine.
    pub fn emit(&self, event: TurnEvent) {
        let _ = self.events_tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn status_and_events_reach_subscribers() {
        let bus = EventBus::new();
        let mut status = bus.subscribe_status();
        let mut events = bus.subscribe();
        assert_eq!(*status.borrow(), AgentStatus::Idle);

        bus.set_status(AgentStatus::Thinking);
        status.changed().await.unwrap();
        assert_eq!(*status.borrow_and_update(), AgentStatus::Thinking);

        bus.emit(TurnEvent::TurnStarted {
            turn_id: 7,
            message: "hi".into(),
        });
        match events.recv().await.unwrap() {
            TurnEvent::TurnStarted { turn_id, .. } => assert_eq!(turn_id, 7),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn events_serialize_with_tag() {
        let json = serde_json::to_value(TurnEvent::TurnFinished {
            turn_id: 1,
            outcome: TurnOutcome::Offline,
            response: "offline".into(),
        })
        .unwrap();
        assert_eq!(json["event"], "turn_finished");
        assert_eq!(json["outcome"], "offline");
    }
}
