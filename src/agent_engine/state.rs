use serde::{Deserialize, Serialize};

use crate::errors::ErrorKind;
use crate::executor::platform::ScrollDirection;
use crate::memory::MemoryEntry;
use crate::perception::resolver::{Capability, TargetDescriptor};
use crate::perception::types::Point;

/// Hard ceiling for a single Wait, whatever the model asks for.
pub const MAX_WAIT_MS: u64 = 10_000;
pub const DEFAULT_WAIT_MS: u64 = 1_000;

/// Observable lifecycle of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Idle,
    Thinking,
    Acting,
    /// Automation permission lost; the user must re-grant it.
    Unavailable,
}

/// How a turn ended, as seen by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnOutcome {
    /// The plan ran (possibly with failed steps).
    Completed,
    /// Inference failed or timed out; nothing was executed.
    Offline,
    /// Cancelled before or during the turn.
    Cancelled,
    /// The automation permission was lost mid-plan.
    ServiceUnavailable,
}

/// One primitive device action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AIAction {
    Click {
        target: String,
        index: Option<usize>,
        point: Option<Point>,
    },
    Type {
        target: String,
        text: String,
        clear_first: bool,
        index: Option<usize>,
        point: Option<Point>,
    },
    Scroll {
        direction: ScrollDirection,
        target: Option<String>,
    },
    Back,
    Home,
    OpenApp {
        app_name: String,
    },
    Wait {
        milliseconds: u64,
    },
    Respond {
        message: String,
    },
    Clarify {
        question: String,
    },
    Complete {
        summary: String,
    },
}

impl AIAction {
    pub fn click(target: impl Into<String>) -> Self {
        AIAction::Click {
            target: target.into(),
            index: None,
            point: None,
        }
    }

    pub fn type_text(target: impl Into<String>, text: impl Into<String>) -> Self {
        AIAction::Type {
            target: target.into(),
            text: text.into(),
            clear_first: true,
            index: None,
            point: None,
        }
    }

    pub fn respond(message: impl Into<String>) -> Self {
        AIAction::Respond {
            message: message.into(),
        }
    }

    /// Wait clamped to `MAX_WAIT_MS`.
    pub fn wait(milliseconds: u64) -> Self {
        AIAction::Wait {
            milliseconds: milliseconds.min(MAX_WAIT_MS),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AIAction::Click { .. } => "click",
            AIAction::Type { .. } => "type",
            AIAction::Scroll { .. } => "scroll",
            AIAction::Back => "back",
            AIAction::Home => "home",
            AIAction::OpenApp { .. } => "open_app",
            AIAction::Wait { .. } => "wait",
            AIAction::Respond { .. } => "respond",
            AIAction::Clarify { .. } => "clarify",
            AIAction::Complete { .. } => "complete",
        }
    }

    /// Respond, Clarify and Complete end the plan.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AIAction::Respond { .. } | AIAction::Clarify { .. } | AIAction::Complete { .. }
        )
    }

    /// Actions that touch the UI and need a settle delay afterwards.
    pub fn touches_ui(&self) -> bool {
        matches!(
            self,
            AIAction::Click { .. } | AIAction::Type { .. } | AIAction::Scroll { .. }
        )
    }

    /// The element this action must resolve before running, if any.
    pub fn target_descriptor(&self) -> Option<TargetDescriptor> {
        match self {
            AIAction::Click { target, index, point } => Some(TargetDescriptor {
                label: target.clone(),
                index: *index,
                point: *point,
                capability: Capability::Clickable,
            }),
            AIAction::Type {
                target, index, point, ..
            } => Some(TargetDescriptor {
                label: target.clone(),
                index: *index,
                point: *point,
                capability: Capability::Editable,
            }),
            AIAction::Scroll {
                target: Some(target),
                ..
            } => Some(TargetDescriptor::label(target.clone(), Capability::Scrollable)),
            _ => None,
        }
    }

    /// Checks the per-variant field constraints.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            AIAction::Click { target, index, point } => {
                if target.trim().is_empty() && index.is_none() && point.is_none() {
                    return Err("click needs a target, an index or coordinates".into());
                }
            }
            AIAction::Type {
                target,
                text,
                clear_first,
                index,
                point,
            } => {
                if target.trim().is_empty() && index.is_none() && point.is_none() {
                    return Err("type needs a target, an index or coordinates".into());
                }
                if text.is_empty() && !clear_first {
                    return Err("type with empty text must clear the field".into());
                }
            }
            AIAction::OpenApp { app_name } if app_name.trim().is_empty() => {
                return Err("open_app needs an app name".into());
            }
            AIAction::Wait { milliseconds } if *milliseconds > MAX_WAIT_MS => {
                return Err(format!("wait exceeds {MAX_WAIT_MS}ms"));
            }
            _ => {}
        }
        Ok(())
    }

    /// Text shown to the user when this is the terminal action.
    pub fn terminal_message(&self) -> Option<&str> {
        match self {
            AIAction::Respond { message } => Some(message),
            AIAction::Clarify { question } => Some(question),
            AIAction::Complete { summary } => Some(summary),
            _ => None,
        }
    }
}

/// Where a plan came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanSource {
    Structured,
    /// The response was not structured; a heuristic synthesized the plan.
    Heuristic,
}

/// A vetted, ordered sequence of actions for one model turn.
///
/// Never empty-and-incomplete: construction turns that case into a single
/// Respond. Re-planning produces a new plan; there are no mutators.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionPlan {
    reasoning: String,
    actions: Vec<AIAction>,
    is_complete: bool,
    response: Option<String>,
    memory: Vec<MemoryEntry>,
    source: PlanSource,
}

impl ActionPlan {
    pub fn new(reasoning: impl Into<String>, actions: Vec<AIAction>, is_complete: bool) -> Self {
        let mut actions = actions;
        if actions.is_empty() && !is_complete {
            actions.push(AIAction::respond(String::new()));
        }
        Self {
            reasoning: reasoning.into(),
            actions,
            is_complete,
            response: None,
            memory: Vec::new(),
            source: PlanSource::Structured,
        }
    }

    pub fn with_response(mut self, response: Option<String>) -> Self {
        self.response = response.filter(|r| !r.trim().is_empty());
        self
    }

    pub fn with_memory(mut self, memory: Vec<MemoryEntry>) -> Self {
        self.memory = memory;
        self
    }

    pub fn with_source(mut self, source: PlanSource) -> Self {
        self.source = source;
        self
    }

    pub fn reasoning(&self) -> &str {
        &self.reasoning
    }

    pub fn actions(&self) -> &[AIAction] {
        &self.actions
    }

    /// The model's own completion flag. A Complete action in the list only
    /// counts once it has actually run, see `PlanExecutionReport::task_completed`.
    pub fn is_complete(&self) -> bool {
        self.is_complete
    }

    /// The model's user-facing `response` text, if it gave one.
    pub fn response(&self) -> Option<&str> {
        self.response.as_deref()
    }

    pub fn memory(&self) -> &[MemoryEntry] {
        &self.memory
    }

    pub fn source(&self) -> PlanSource {
        self.source
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Succeeded,
    Failed,
    Skipped,
}

/// Outcome of one action, aligned 1:1 with the plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub action: String,
    pub status: ActionStatus,
    pub error_kind: Option<ErrorKind>,
    pub detail: Option<String>,
    /// Safe to treat as a no-op continuation (Wait, terminal actions).
    pub noop_continuation: bool,
}

impl ExecutionResult {
    pub fn succeeded(action: &AIAction) -> Self {
        Self {
            action: action.name().to_string(),
            status: ActionStatus::Succeeded,
            error_kind: None,
            detail: None,
            noop_continuation: matches!(action, AIAction::Wait { .. }) || action.is_terminal(),
        }
    }

    pub fn failed(action: &AIAction, kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            action: action.name().to_string(),
            status: ActionStatus::Failed,
            error_kind: Some(kind),
            detail: Some(detail.into()),
            noop_continuation: false,
        }
    }

    pub fn skipped(action: &AIAction, kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            action: action.name().to_string(),
            status: ActionStatus::Skipped,
            error_kind: Some(kind),
            detail: Some(detail.into()),
            noop_continuation: false,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == ActionStatus::Succeeded
    }

    pub fn is_failure(&self) -> bool {
        self.status == ActionStatus::Failed
    }
}

/// Plan-level execution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Pending,
    Running,
    Succeeded,
    PartiallyFailed,
    Aborted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanExecutionReport {
    pub results: Vec<ExecutionResult>,
    pub status: PlanStatus,
    /// Every attempted action succeeded and the run was not aborted.
    pub completed_fully: bool,
    /// The terminal action that ended the run, if one was reached.
    pub terminal: Option<AIAction>,
}

impl PlanExecutionReport {
    pub fn failures(&self) -> impl Iterator<Item = &ExecutionResult> {
        self.results.iter().filter(|r| r.is_failure())
    }

    /// True when a Complete action was executed.
    pub fn task_completed(&self) -> bool {
        matches!(self.terminal, Some(AIAction::Complete { .. }))
    }

    pub fn permission_revoked(&self) -> bool {
        self.results
            .iter()
            .any(|r| r.is_failure() && r.error_kind == Some(ErrorKind::PermissionRevoked))
    }
}
