pub mod agent_engine;
pub mod config;
pub mod errors;
pub mod executor;
pub mod llm;
pub mod memory;
pub mod perception;
pub mod planning;

#[cfg(test)]
mod testing;

pub use agent_engine::engine::{SessionCoordinator, SessionHandle, TurnResult, TurnTicket};
pub use agent_engine::state::{AIAction, ActionPlan, AgentStatus, PlanExecutionReport, TurnOutcome};
pub use errors::{ErrorKind, TapClawError, TapClawResult};
pub use executor::{ActionExecutor, DevicePlatform};
pub use perception::{ElementResolver, ScreenSnapshotter, ScreenState};
pub use planning::ActionPlanParser;

/// Installs the global `tracing` subscriber. Filter comes from `RUST_LOG`,
/// default `info`. Safe to call more than once.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init();
}
