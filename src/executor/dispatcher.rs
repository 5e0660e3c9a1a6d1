use std::time::Duration;

use crate::agent_engine::loop_control::TurnControl;
use crate::agent_engine::state::{AIAction, ActionPlan, ExecutionResult, PlanExecutionReport, PlanStatus};
use crate::config::ExecutorConfig;
use crate::errors::{ErrorKind, TapClawError, TapClawResult};
use crate::executor::apps::AppTable;
use crate::executor::coordinator::{swipe_vector, tap_point};
use crate::executor::platform::{DevicePlatform, PlatformError, PlatformResult, ScrollDirection};
use crate::perception::resolver::{ElementResolver, TargetDescriptor};
use crate::perception::snapshotter::ScreenSnapshotter;
use crate::perception::types::{NodeHandle, Point, Rect};

/// Executes one `ActionPlan` against the live device, strictly in order.
///
/// Per-action failures are recorded in the report and never returned as
/// errors. Only a revoked automation permission (or cancellation) aborts the
/// remaining actions.
pub struct ActionExecutor {
    snapshotter: ScreenSnapshotter,
    resolver: ElementResolver,
    apps: AppTable,
    config: ExecutorConfig,
}

impl ActionExecutor {
    pub fn new(snapshotter: ScreenSnapshotter, apps: AppTable, config: ExecutorConfig) -> Self {
        Self {
            snapshotter,
            resolver: ElementResolver::new(),
            apps,
            config,
        }
    }

    pub fn apps(&self) -> &AppTable {
        &self.apps
    }

    pub fn apps_mut(&mut self) -> &mut AppTable {
        &mut self.apps
    }

    pub fn snapshotter(&self) -> &ScreenSnapshotter {
        &self.snapshotter
    }

    pub async fn execute(&self, plan: &ActionPlan) -> PlanExecutionReport {
        self.execute_with(plan, &TurnControl::new(), &mut |_, _| {}).await
    }

    /// Like `execute`, honouring `control` at action boundaries and reporting
    /// each result to `on_result` as soon as it is known.
    pub async fn execute_with(
        &self,
        plan: &ActionPlan,
        control: &TurnControl,
        on_result: &mut (dyn FnMut(usize, &ExecutionResult) + Send),
    ) -> PlanExecutionReport {
        let actions = plan.actions();
        tracing::debug!(actions = actions.len(), "plan Pending → Running");

        let mut results = Vec::with_capacity(actions.len());
        let mut terminal: Option<AIAction> = None;
        let mut abort: Option<(ErrorKind, &'static str)> = None;

        for (i, action) in actions.iter().enumerate() {
            let result = if let Some((kind, why)) = abort {
                ExecutionResult::skipped(action, kind, why)
            } else if terminal.is_some() {
                ExecutionResult::skipped(action, ErrorKind::Skipped, "plan already ended")
            } else if control.is_cancelled() {
                tracing::info!(step = i, "turn cancelled, stopping at action boundary");
                abort = Some((ErrorKind::Cancelled, "turn cancelled"));
                ExecutionResult::skipped(action, ErrorKind::Cancelled, "turn cancelled")
            } else {
                let outcome = self.run_action(action).await;
                if action.touches_ui() && i + 1 < actions.len() && self.config.settle_delay_ms > 0 {
                    tokio::time::sleep(Duration::from_millis(self.config.settle_delay_ms)).await;
                }
                match outcome {
                    Ok(detail) => {
                        tracing::info!(step = i, action = action.name(), detail = %detail, "action succeeded");
                        if action.is_terminal() {
                            terminal = Some(action.clone());
                        }
                        ExecutionResult::succeeded(action).with_detail(detail)
                    }
                    Err(e) if e.kind() == ErrorKind::PermissionRevoked => {
                        tracing::error!(step = i, action = action.name(), error = %e, "automation permission lost, aborting plan");
                        abort = Some((ErrorKind::PermissionRevoked, "automation permission revoked"));
                        ExecutionResult::failed(action, ErrorKind::PermissionRevoked, e.to_string())
                    }
                    Err(e) => {
                        tracing::warn!(step = i, action = action.name(), error = %e, "action failed, continuing");
                        ExecutionResult::failed(action, e.kind(), e.to_string())
                    }
                }
            };
            on_result(i, &result);
            results.push(result);
        }

        let status = if abort.is_some() {
            PlanStatus::Aborted
        } else if results.iter().any(|r| r.is_failure()) {
            PlanStatus::PartiallyFailed
        } else {
            PlanStatus::Succeeded
        };
        tracing::info!(
            ?status,
            actions = results.len(),
            failed = results.iter().filter(|r| r.is_failure()).count(),
            "plan Running → {:?}",
            status
        );

        PlanExecutionReport {
            results,
            status,
            completed_fully: status == PlanStatus::Succeeded,
            terminal,
        }
    }

    fn platform(&self) -> &dyn DevicePlatform {
        self.snapshotter.platform().as_ref()
    }

    async fn run_action(&self, action: &AIAction) -> TapClawResult<String> {
        match action {
            AIAction::Click { .. } | AIAction::Type { .. } | AIAction::Scroll { target: Some(_), .. } => {
                match action.target_descriptor() {
                    Some(target) => self.run_targeted(action, &target).await,
                    None => Err(TapClawError::ActionUnreachable("action has no target".into())),
                }
            }
            AIAction::Scroll { direction, target: None } => self.scroll_screen(*direction).await,
            AIAction::Back => {
                self.platform().back().await?;
                Ok("navigated back".into())
            }
            AIAction::Home => {
                self.platform().home().await?;
                Ok("navigated home".into())
            }
            AIAction::OpenApp { app_name } => {
                let identifier = self
                    .apps
                    .lookup(app_name)
                    .ok_or_else(|| TapClawError::UnknownApp(app_name.clone()))?;
                self.platform().launch_app(identifier).await?;
                Ok(format!("launched {identifier}"))
            }
            AIAction::Wait { milliseconds } => {
                let ms = (*milliseconds).min(self.config.max_wait_ms);
                if ms < *milliseconds {
                    tracing::debug!(requested = milliseconds, clamped = ms, "wait clamped");
                }
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Ok(format!("waited {ms}ms"))
            }
            AIAction::Respond { .. } | AIAction::Clarify { .. } | AIAction::Complete { .. } => {
                Ok(action.terminal_message().unwrap_or_default().to_string())
            }
        }
    }

    /// Fresh capture, resolve, node-native attempt, then gesture fallback.
    async fn run_targeted(&self, action: &AIAction, target: &TargetDescriptor) -> TapClawResult<String> {
        let state = self.snapshotter.capture().await?;
        let resolved = self
            .resolver
            .resolve(&state, target)
            .map(|r| (r.element.handle, r.element.bounds, r.tier));
        let name = describe_target(target);

        if let Some((handle, _, tier)) = resolved {
            match self.native(action, handle).await {
                Ok(()) => return Ok(format!("{} '{name}' ({tier:?} match)", action.name())),
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(e) => {
                    tracing::debug!(target = %name, error = %e, "native interaction rejected, trying gesture");
                }
            }
        } else if state.truncated() {
            tracing::debug!(target = %name, "target not found in truncated snapshot");
        }

        let bounds = resolved.map(|(_, bounds, _)| bounds);
        match self.gesture(action, bounds, target.point).await {
            Some(Ok(detail)) => Ok(detail),
            Some(Err(e)) if e.is_fatal() => Err(e.into()),
            Some(Err(e)) => Err(TapClawError::ActionUnreachable(format!(
                "'{name}': native and gesture interaction both failed ({e})"
            ))),
            None if resolved.is_some() => Err(TapClawError::ActionUnreachable(format!(
                "'{name}' rejected the interaction and has no usable bounds"
            ))),
            None => Err(TapClawError::ActionUnreachable(format!("'{name}' not found on screen"))),
        }
    }

    async fn native(&self, action: &AIAction, node: NodeHandle) -> PlatformResult<()> {
        let platform = self.platform();
        match action {
            AIAction::Click { .. } => platform.click_node(node).await,
            AIAction::Type { text, clear_first, .. } => platform.set_node_text(node, text, *clear_first).await,
            AIAction::Scroll { direction, .. } => platform.scroll_node(node, *direction).await,
            _ => Err(PlatformError::Rejected(format!("{} has no node interaction", action.name()))),
        }
    }

    /// Coordinate interaction from the element's bounds, else the explicit
    /// hint. `None` when there is nothing to aim at.
    async fn gesture(
        &self,
        action: &AIAction,
        bounds: Option<Rect>,
        hint: Option<Point>,
    ) -> Option<PlatformResult<String>> {
        let platform = self.platform();
        match action {
            AIAction::Click { .. } => {
                let at = bounds.and_then(|b| tap_point(&b)).or(hint)?;
                Some(platform.tap(at).await.map(|()| format!("tapped ({}, {})", at.x, at.y)))
            }
            AIAction::Type { text, clear_first, .. } => {
                let at = bounds.and_then(|b| tap_point(&b)).or(hint)?;
                let typed = async {
                    platform.tap(at).await?;
                    platform.type_focused(text, *clear_first).await?;
                    Ok::<_, PlatformError>(format!("typed after tapping ({}, {})", at.x, at.y))
                };
                Some(typed.await)
            }
            AIAction::Scroll { direction, .. } => {
                let (from, to) = bounds.and_then(|b| swipe_vector(&b, *direction))?;
                Some(
                    platform
                        .swipe(from, to, self.swipe_duration())
                        .await
                        .map(|()| format!("swiped {}", direction.as_str())),
                )
            }
            _ => None,
        }
    }

    /// Untargeted scroll: a swipe across the window root.
    async fn scroll_screen(&self, direction: ScrollDirection) -> TapClawResult<String> {
        let state = self.snapshotter.capture().await?;
        let (from, to) = state
            .root()
            .and_then(|root| swipe_vector(&root.bounds, direction))
            .ok_or_else(|| TapClawError::ActionUnreachable("window has no visible area to scroll".into()))?;
        self.platform()
            .swipe(from, to, self.swipe_duration())
            .await?;
        Ok(format!("swiped {}", direction.as_str()))
    }

    fn swipe_duration(&self) -> Duration {
        Duration::from_millis(self.config.swipe_duration_ms)
    }
}

fn describe_target(target: &TargetDescriptor) -> String {
    match (target.label.trim(), target.index) {
        ("", Some(n)) => format!("#{n}"),
        ("", None) => "<unnamed>".to_string(),
        (label, _) => label.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::agent_engine::state::ActionStatus;
    use crate::config::SnapshotConfig;
    use crate::testing::{Call, FakeNode, FakePlatform};

    fn settings_screen() -> FakeNode {
        FakeNode::new("android.widget.FrameLayout")
            .bounds(0, 0, 1080, 2400)
            .child(
                FakeNode::new("androidx.recyclerview.widget.RecyclerView")
                    .bounds(0, 200, 1080, 2200)
                    .label("Settings list")
                    .scrollable()
                    .child(FakeNode::button("Wi-Fi").bounds(0, 200, 1080, 400))
                    .child(FakeNode::button("Bluetooth").bounds(0, 400, 1080, 600))
                    .child(FakeNode::edit("Name field").bounds(0, 600, 1080, 800)),
            )
    }

    fn setup() -> (Arc<FakePlatform>, ActionExecutor) {
        let platform = Arc::new(FakePlatform::new("com.android.settings", settings_screen()));
        let snapshotter = ScreenSnapshotter::new(platform.clone(), SnapshotConfig::default());
        let executor = ActionExecutor::new(snapshotter, AppTable::builtin(), ExecutorConfig::default());
        (platform, executor)
    }

    fn plan(actions: Vec<AIAction>) -> ActionPlan {
        ActionPlan::new("test", actions, false)
    }

    fn statuses(report: &PlanExecutionReport) -> Vec<ActionStatus> {
        report.results.iter().map(|r| r.status).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_first_step_does_not_stop_the_form() {
        let (platform, executor) = setup();
        let plan = plan(vec![
            AIAction::click("Next"),
            AIAction::type_text("Name field", "Alice"),
            AIAction::Complete { summary: "filled form".into() },
        ]);

        let report = executor.execute(&plan).await;

        assert_eq!(
            statuses(&report),
            vec![ActionStatus::Failed, ActionStatus::Succeeded, ActionStatus::Succeeded]
        );
        assert_eq!(report.results[0].error_kind, Some(ErrorKind::ActionUnreachable));
        assert_eq!(report.status, PlanStatus::PartiallyFailed);
        assert!(!report.completed_fully);
        assert!(report.task_completed());
        assert_eq!(
            platform.calls(),
            vec![Call::SetText {
                node: "Name field".into(),
                text: "Alice".into(),
                clear_first: true,
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn each_targeted_action_sees_the_current_screen() {
        let first_page = FakeNode::new("android.widget.FrameLayout")
            .bounds(0, 0, 1080, 2400)
            .child(FakeNode::button("Next").bounds(700, 2100, 1000, 2300));
        let second_page = FakeNode::new("android.widget.FrameLayout")
            .bounds(0, 0, 1080, 2400)
            .child(FakeNode::button("Confirm").bounds(700, 2100, 1000, 2300));
        let platform = Arc::new(FakePlatform::new("com.example.signup", first_page));
        platform.queue_screen("com.example.signup", second_page);
        let snapshotter = ScreenSnapshotter::new(platform.clone(), SnapshotConfig::default());
        let executor = ActionExecutor::new(snapshotter, AppTable::builtin(), ExecutorConfig::default());

        let report = executor
            .execute(&plan(vec![AIAction::click("Next"), AIAction::click("Confirm")]))
            .await;

        assert_eq!(statuses(&report), vec![ActionStatus::Succeeded, ActionStatus::Succeeded]);
        assert_eq!(report.status, PlanStatus::Succeeded);
        assert_eq!(
            platform.calls(),
            vec![Call::ClickNode("Next".into()), Call::ClickNode("Confirm".into())]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn wait_is_clamped_to_configured_maximum() {
        let (_platform, executor) = setup();
        let plan = plan(vec![AIAction::Wait { milliseconds: 50_000 }]);

        let start = tokio::time::Instant::now();
        let report = executor.execute(&plan).await;
        let elapsed = start.elapsed();

        assert!(elapsed >= Duration::from_millis(10_000));
        assert!(elapsed < Duration::from_millis(10_500));
        assert_eq!(report.results[0].detail.as_deref(), Some("waited 10000ms"));
        assert!(report.results[0].noop_continuation);
        assert!(report.completed_fully);
    }

    #[tokio::test(start_paused = true)]
    async fn nothing_runs_after_a_terminal_action() {
        let (platform, executor) = setup();
        let plan = plan(vec![
            AIAction::Clarify { question: "Which network?".into() },
            AIAction::click("Wi-Fi"),
            AIAction::Back,
        ]);

        let report = executor.execute(&plan).await;

        assert_eq!(
            statuses(&report),
            vec![ActionStatus::Succeeded, ActionStatus::Skipped, ActionStatus::Skipped]
        );
        assert!(platform.calls().is_empty());
        assert_eq!(report.status, PlanStatus::Succeeded);
        assert!(report.completed_fully);
        assert!(matches!(report.terminal, Some(AIAction::Clarify { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn failures_are_recorded_and_execution_continues() {
        let (platform, executor) = setup();
        let plan = plan(vec![
            AIAction::OpenApp { app_name: "teleporter".into() },
            AIAction::Back,
            AIAction::OpenApp { app_name: "Camera".into() },
        ]);

        let report = executor.execute(&plan).await;

        assert_eq!(
            statuses(&report),
            vec![ActionStatus::Failed, ActionStatus::Succeeded, ActionStatus::Succeeded]
        );
        assert_eq!(report.results[0].error_kind, Some(ErrorKind::UnknownApp));
        assert_eq!(report.status, PlanStatus::PartiallyFailed);
        assert_eq!(
            platform.calls(),
            vec![Call::Back, Call::Launch("com.android.camera2".into())]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_native_click_falls_back_to_tap() {
        let (platform, executor) = setup();
        platform.reject_node("Wi-Fi");

        let report = executor.execute(&plan(vec![AIAction::click("wi-fi")])).await;

        assert!(report.completed_fully);
        assert_eq!(platform.calls(), vec![Call::Tap(Point::new(540, 300))]);
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_native_type_taps_then_types() {
        let (platform, executor) = setup();
        platform.reject_all_native();

        let report = executor.execute(&plan(vec![AIAction::type_text("Name", "Bob")])).await;

        assert!(report.completed_fully);
        assert_eq!(
            platform.calls(),
            vec![Call::Tap(Point::new(540, 700)), Call::TypeFocused("Bob".into())]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn coordinate_hint_used_when_target_missing() {
        let (platform, executor) = setup();
        let click = AIAction::Click {
            target: "Ghost".into(),
            index: None,
            point: Some(Point::new(12, 34)),
        };

        let report = executor.execute(&plan(vec![click])).await;

        assert!(report.completed_fully);
        assert_eq!(platform.calls(), vec![Call::Tap(Point::new(12, 34))]);
    }

    #[tokio::test(start_paused = true)]
    async fn both_strategies_failing_is_unreachable() {
        let (platform, executor) = setup();
        platform.reject_all_native();
        platform.reject_gestures();

        let report = executor.execute(&plan(vec![AIAction::click("Bluetooth")])).await;

        assert_eq!(report.results[0].error_kind, Some(ErrorKind::ActionUnreachable));
        assert_eq!(report.status, PlanStatus::PartiallyFailed);
    }

    #[tokio::test(start_paused = true)]
    async fn scrolls_native_then_whole_screen() {
        let (platform, executor) = setup();
        let plan = plan(vec![
            AIAction::Scroll {
                direction: ScrollDirection::Down,
                target: Some("settings list".into()),
            },
            AIAction::Scroll {
                direction: ScrollDirection::Up,
                target: None,
            },
        ]);

        let report = executor.execute(&plan).await;

        assert!(report.completed_fully, "{report:?}");
        assert_eq!(
            platform.calls(),
            vec![
                Call::ScrollNode {
                    node: "Settings list".into(),
                    direction: ScrollDirection::Down,
                },
                Call::Swipe {
                    from: Point::new(540, 480),
                    to: Point::new(540, 1920),
                },
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn revoked_permission_aborts_the_rest() {
        let (platform, executor) = setup();
        platform.revoke_permission_after(1);
        let plan = plan(vec![AIAction::Back, AIAction::click("Wi-Fi"), AIAction::Home]);

        let report = executor.execute(&plan).await;

        assert_eq!(
            statuses(&report),
            vec![ActionStatus::Succeeded, ActionStatus::Failed, ActionStatus::Skipped]
        );
        assert_eq!(report.results[2].error_kind, Some(ErrorKind::PermissionRevoked));
        assert_eq!(report.status, PlanStatus::Aborted);
        assert!(report.permission_revoked());
        assert_eq!(platform.calls(), vec![Call::Back]);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_is_honoured_between_actions() {
        let (platform, executor) = setup();
        let control = TurnControl::new();
        let plan = plan(vec![AIAction::Back, AIAction::Home, AIAction::Back]);

        let canceller = control.clone();
        let mut seen = Vec::new();
        let report = executor
            .execute_with(&plan, &control, &mut |i, r| {
                seen.push(r.status);
                if i == 0 {
                    canceller.cancel();
                }
            })
            .await;

        assert_eq!(
            statuses(&report),
            vec![ActionStatus::Succeeded, ActionStatus::Skipped, ActionStatus::Skipped]
        );
        assert_eq!(seen, statuses(&report));
        assert_eq!(report.results[1].error_kind, Some(ErrorKind::Cancelled));
        assert_eq!(report.status, PlanStatus::Aborted);
        assert_eq!(platform.calls(), vec![Call::Back]);
    }
}
