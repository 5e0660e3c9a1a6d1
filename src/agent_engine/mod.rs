pub mod engine;
pub mod event_bus;
pub mod history;
pub mod loop_control;
pub mod state;

pub use engine::{SessionCoordinator, SessionHandle, TurnResult, TurnTicket};
pub use event_bus::{EventBus, TurnEvent};
pub use loop_control::TurnControl;
