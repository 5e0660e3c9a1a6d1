pub mod heuristic;
pub mod parser;

pub use heuristic::{HeuristicResponder, Intent, IntentRule};
pub use parser::ActionPlanParser;
