use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::agent_engine::event_bus::{EventBus, TurnEvent};
use crate::agent_engine::history::ConversationHistory;
use crate::agent_engine::loop_control::TurnControl;
use crate::agent_engine::state::{
    ActionPlan, ActionStatus, AgentStatus, PlanExecutionReport, PlanStatus, TurnOutcome,
};
use crate::config::{AppConfig, SessionConfig};
use crate::errors::{ErrorKind, TapClawError, TapClawResult};
use crate::executor::apps::AppTable;
use crate::executor::dispatcher::ActionExecutor;
use crate::executor::platform::DevicePlatform;
use crate::llm::provider::InferenceProvider;
use crate::llm::types::{InferenceRequest, Role};
use crate::memory::{MemoryEntry, MemoryStore, DEFAULT_IMPORTANCE};
use crate::perception::debounce::{spawn_debouncer, ScreenChangeNotifier, SnapshotCache};
use crate::perception::snapshotter::ScreenSnapshotter;
use crate::perception::types::ScreenState;
use crate::planning::parser::ActionPlanParser;

pub const OFFLINE_MESSAGE: &str =
    "I can't reach the assistant service right now. Please check your connection and try again.";
pub const SERVICE_UNAVAILABLE_MESSAGE: &str = "I've lost access to your device controls. \
Please re-enable the TapClaw accessibility permission in Settings, then try again.";
pub const CANCELLED_MESSAGE: &str = "Okay, I stopped.";
const DONE_MESSAGE: &str = "Done.";

/// Everything the caller learns about one turn.
#[derive(Debug, Clone, Serialize)]
pub struct TurnResult {
    pub turn_id: u64,
    /// User-facing text, including a summary of any failed steps.
    pub response: String,
    pub is_complete: bool,
    /// Memory items the model asked to keep, already handed to the store.
    pub memory_writes: Vec<MemoryEntry>,
    /// Absent when nothing was executed.
    pub report: Option<PlanExecutionReport>,
    pub outcome: TurnOutcome,
}

enum InferenceOutcome {
    Reply(String),
    Failed(TapClawError),
    Cancelled,
}

/// Runs one user turn end to end: context, inference, parse, execute.
///
/// Owns the conversation, the most recent settled snapshot and the status
/// stream. Turns take `&mut self`, so a coordinator can never run two at
/// once; `SessionHandle` queues turns in front of it.
pub struct SessionCoordinator {
    inference: Arc<dyn InferenceProvider>,
    memory: Arc<dyn MemoryStore>,
    parser: ActionPlanParser,
    executor: ActionExecutor,
    snapshots: SnapshotCache,
    screen_feed: Option<JoinHandle<()>>,
    history: ConversationHistory,
    bus: EventBus,
    config: SessionConfig,
    next_turn: u64,
}

impl SessionCoordinator {
    pub fn new(
        platform: Arc<dyn DevicePlatform>,
        inference: Arc<dyn InferenceProvider>,
        memory: Arc<dyn MemoryStore>,
        config: &AppConfig,
    ) -> Self {
        let snapshotter = ScreenSnapshotter::new(platform, config.snapshot.clone());
        let executor = ActionExecutor::new(
            snapshotter,
            AppTable::with_overrides(&config.apps),
            config.executor.clone(),
        );
        let history = if config.session.persist_history {
            ConversationHistory::persistent()
        } else {
            ConversationHistory::in_memory()
        };
        tracing::info!(
            session = %history.session_id(),
            provider = %inference.name(),
            "session created"
        );

        Self {
            inference,
            memory,
            parser: ActionPlanParser::new(&config.heuristics),
            executor,
            snapshots: SnapshotCache::empty(),
            screen_feed: None,
            history,
            bus: EventBus::new(),
            config: config.session.clone(),
            next_turn: 0,
        }
    }

    /// Starts the debounce task and returns the sender the platform should
    /// signal on every UI change. Settled snapshots feed the next turn.
    pub fn attach_screen_feed(&mut self) -> ScreenChangeNotifier {
        let window = Duration::from_millis(self.config.debounce_ms);
        let max_settle = Duration::from_millis(self.config.debounce_max_ms);
        let (notifier, cache, handle) =
            spawn_debouncer(self.executor.snapshotter().clone(), window, max_settle);
        if let Some(previous) = self.screen_feed.replace(handle) {
            previous.abort();
        }
        self.snapshots = cache;
        notifier
    }

    pub fn executor(&self) -> &ActionExecutor {
        &self.executor
    }

    pub fn executor_mut(&mut self) -> &mut ActionExecutor {
        &mut self.executor
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    pub fn status(&self) -> watch::Receiver<AgentStatus> {
        self.bus.subscribe_status()
    }

    pub fn events(&self) -> broadcast::Receiver<TurnEvent> {
        self.bus.subscribe()
    }

    pub async fn submit_turn(&mut self, message: &str) -> TurnResult {
        self.run_turn(message, &TurnControl::new()).await
    }

    pub async fn run_turn(&mut self, message: &str, control: &TurnControl) -> TurnResult {
        let turn_id = self.next_turn;
        self.next_turn += 1;
        tracing::info!(turn_id, message = %message, "turn started");
        self.bus.emit(TurnEvent::TurnStarted {
            turn_id,
            message: message.to_string(),
        });

        if control.is_cancelled() {
            return self.finish(turn_id, message, TurnOutcome::Cancelled, CANCELLED_MESSAGE.into(), None, Vec::new(), false);
        }

        self.bus.set_status(AgentStatus::Thinking);
        let screen = self.current_screen().await;
        let request = InferenceRequest {
            user_message: message.to_string(),
            screen_state: screen.clone(),
            conversation_history: self.history.trailing(self.config.history_turns),
            memory: self.relevant_memories(message).await,
        };

        let raw = match self.infer(&request, control).await {
            InferenceOutcome::Reply(raw) => raw,
            InferenceOutcome::Cancelled => {
                tracing::info!(turn_id, "turn cancelled during inference");
                return self.finish(turn_id, message, TurnOutcome::Cancelled, CANCELLED_MESSAGE.into(), None, Vec::new(), false);
            }
            InferenceOutcome::Failed(e) => {
                tracing::warn!(turn_id, error = %e, "inference unavailable, replying offline");
                return self.finish(turn_id, message, TurnOutcome::Offline, OFFLINE_MESSAGE.into(), None, Vec::new(), false);
            }
        };

        if control.is_cancelled() {
            return self.finish(turn_id, message, TurnOutcome::Cancelled, CANCELLED_MESSAGE.into(), None, Vec::new(), false);
        }

        let plan = self.parser.parse_with_screen(&raw, screen.as_deref());
        tracing::info!(
            turn_id,
            actions = plan.actions().len(),
            source = ?plan.source(),
            complete = plan.is_complete(),
            reasoning = %plan.reasoning(),
            "plan ready"
        );
        self.bus.emit(TurnEvent::PlanReady {
            turn_id,
            actions: plan.actions().len(),
            source: plan.source(),
        });

        self.bus.set_status(AgentStatus::Acting);
        let bus = self.bus.clone();
        let report = self
            .executor
            .execute_with(&plan, control, &mut |step, result| {
                bus.emit(TurnEvent::ActionFinished {
                    turn_id,
                    step,
                    result: result.clone(),
                })
            })
            .await;

        let memory_writes = self.persist_memories(&plan).await;

        let (outcome, response) = if report.permission_revoked() {
            (TurnOutcome::ServiceUnavailable, SERVICE_UNAVAILABLE_MESSAGE.to_string())
        } else if report.status == PlanStatus::Aborted {
            (TurnOutcome::Cancelled, CANCELLED_MESSAGE.to_string())
        } else {
            (TurnOutcome::Completed, compose_response(&plan, &report))
        };
        // An interrupted run never finishes the task, whatever the model claimed.
        let is_complete =
            outcome == TurnOutcome::Completed && (plan.is_complete() || report.task_completed());
        self.finish(turn_id, message, outcome, response, Some(report), memory_writes, is_complete)
    }

    async fn infer(&self, request: &InferenceRequest, control: &TurnControl) -> InferenceOutcome {
        let secs = self.config.inference_timeout_secs;
        let call = tokio::time::timeout(Duration::from_secs(secs), self.inference.infer(request));
        tokio::select! {
            biased;
            _ = control.cancelled() => InferenceOutcome::Cancelled,
            result = call => match result {
                Ok(Ok(raw)) => InferenceOutcome::Reply(raw),
                Ok(Err(e)) => InferenceOutcome::Failed(e),
                Err(_) => InferenceOutcome::Failed(TapClawError::InferenceTimeout(secs)),
            },
        }
    }

    /// Latest settled snapshot, else a fresh capture. No screen is not fatal.
    async fn current_screen(&self) -> Option<Arc<ScreenState>> {
        if let Some(state) = self.snapshots.latest() {
            return Some(state);
        }
        match self.executor.snapshotter().capture().await {
            Ok(state) => Some(Arc::new(state)),
            Err(e) => {
                tracing::debug!(error = %e, "no screen state for this turn");
                None
            }
        }
    }

    /// Top-K by relevance to the message, else general context memories.
    async fn relevant_memories(&self, query: &str) -> Vec<MemoryEntry> {
        let limit = self.config.memory_limit;
        if limit == 0 {
            return Vec::new();
        }
        match self.memory.recall(query).await {
            Ok(records) if !records.is_empty() => {
                return records.iter().take(limit).map(|r| r.entry()).collect();
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "memory recall failed"),
        }
        match self.memory.get_context_memories(limit).await {
            Ok(records) => records.iter().map(|r| r.entry()).collect(),
            Err(e) => {
                tracing::warn!(error = %e, "context memories unavailable");
                Vec::new()
            }
        }
    }

    async fn persist_memories(&self, plan: &ActionPlan) -> Vec<MemoryEntry> {
        let mut written = Vec::new();
        for entry in plan.memory() {
            match self
                .memory
                .remember(&entry.key, &entry.value, &entry.category, DEFAULT_IMPORTANCE)
                .await
            {
                Ok(()) => written.push(entry.clone()),
                Err(e) => tracing::warn!(key = %entry.key, error = %e, "memory write failed"),
            }
        }
        written
    }

    /// Cancelled turns leave no trace in the history, user message included.
    fn finish(
        &mut self,
        turn_id: u64,
        message: &str,
        outcome: TurnOutcome,
        response: String,
        report: Option<PlanExecutionReport>,
        memory_writes: Vec<MemoryEntry>,
        is_complete: bool,
    ) -> TurnResult {
        if outcome != TurnOutcome::Cancelled {
            self.history.push(Role::User, message);
            self.history.push(Role::Assistant, response.clone());
        }
        let status = if outcome == TurnOutcome::ServiceUnavailable {
            AgentStatus::Unavailable
        } else {
            AgentStatus::Idle
        };
        self.bus.set_status(status);
        tracing::info!(turn_id, ?outcome, is_complete, "turn finished");
        self.bus.emit(TurnEvent::TurnFinished {
            turn_id,
            outcome,
            response: response.clone(),
        });
        TurnResult {
            turn_id,
            response,
            is_complete,
            memory_writes,
            report,
            outcome,
        }
    }
}

impl Drop for SessionCoordinator {
    fn drop(&mut self) {
        if let Some(feed) = self.screen_feed.take() {
            feed.abort();
        }
    }
}

/// Model text (or the terminal action's message) plus a summary of failed steps.
fn compose_response(plan: &ActionPlan, report: &PlanExecutionReport) -> String {
    let base = plan
        .response()
        .map(str::to_string)
        .or_else(|| {
            report
                .terminal
                .as_ref()
                .and_then(|a| a.terminal_message())
                .filter(|m| !m.trim().is_empty())
                .map(str::to_string)
        })
        .unwrap_or_default();

    let failures: Vec<_> = report.failures().collect();
    if failures.is_empty() {
        return if base.is_empty() { DONE_MESSAGE.to_string() } else { base };
    }

    let attempted = report
        .results
        .iter()
        .filter(|r| r.status != ActionStatus::Skipped)
        .count();
    let details: Vec<String> = failures
        .iter()
        .map(|r| match (r.error_kind, r.detail.as_deref()) {
            (Some(ErrorKind::UnknownApp), Some(d)) => format!("{} ({d}; I don't know that app)", r.action),
            (_, Some(d)) => format!("{} ({d})", r.action),
            (_, None) => r.action.clone(),
        })
        .collect();
    let summary = format!(
        "{} of {} steps could not be completed: {}.",
        failures.len(),
        attempted,
        details.join("; ")
    );
    if base.is_empty() {
        summary
    } else {
        format!("{base} {summary}")
    }
}

struct TurnRequest {
    message: String,
    control: TurnControl,
    reply: oneshot::Sender<TurnResult>,
}

/// A queued or running turn.
pub struct TurnTicket {
    control: TurnControl,
    reply: oneshot::Receiver<TurnResult>,
}

impl TurnTicket {
    /// Before inference returns, nothing is executed; once actions run, the
    /// current one finishes and the rest are skipped.
    pub fn cancel(&self) {
        self.control.cancel();
    }

    pub fn control(&self) -> &TurnControl {
        &self.control
    }

    pub async fn outcome(self) -> TapClawResult<TurnResult> {
        self.reply.await.map_err(|_| TapClawError::SessionClosed)
    }
}

/// Cloneable front door to a coordinator running on its own task.
///
/// Messages are queued and processed strictly one at a time.
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<TurnRequest>,
    bus: EventBus,
}

impl SessionHandle {
    pub fn spawn(coordinator: SessionCoordinator) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<TurnRequest>(coordinator.config.queue_capacity.max(1));
        let bus = coordinator.bus.clone();

        let worker = tokio::spawn(async move {
            let mut coordinator = coordinator;
            while let Some(request) = rx.recv().await {
                let result = coordinator.run_turn(&request.message, &request.control).await;
                if request.reply.send(result).is_err() {
                    tracing::debug!("turn result dropped, caller went away");
                }
            }
            tracing::info!(session = %coordinator.history.session_id(), "session worker exited");
        });

        (Self { tx, bus }, worker)
    }

    /// Queues a turn. Waits only if the queue is full.
    pub async fn submit(&self, message: impl Into<String>) -> TapClawResult<TurnTicket> {
        let control = TurnControl::new();
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(TurnRequest {
                message: message.into(),
                control: control.clone(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| TapClawError::SessionClosed)?;
        Ok(TurnTicket {
            control,
            reply: reply_rx,
        })
    }

    pub async fn submit_turn(&self, message: impl Into<String>) -> TapClawResult<TurnResult> {
        self.submit(message).await?.outcome().await
    }

    pub fn status(&self) -> watch::Receiver<AgentStatus> {
        self.bus.subscribe_status()
    }

    pub fn events(&self) -> broadcast::Receiver<TurnEvent> {
        self.bus.subscribe()
    }
}
