pub mod apps;
pub mod coordinator;
pub mod dispatcher;
pub mod platform;

pub use apps::AppTable;
pub use dispatcher::ActionExecutor;
pub use platform::{DevicePlatform, NodeInfo, PlatformError, PlatformResult, ScrollDirection, WindowInfo};
