pub mod debounce;
pub mod resolver;
pub mod serialize;
pub mod snapshotter;
pub mod types;

pub use debounce::{spawn_debouncer, ScreenChangeNotifier, SnapshotCache};
pub use resolver::{Capability, ElementResolver, MatchTier, Resolution, TargetDescriptor};
pub use snapshotter::ScreenSnapshotter;
pub use types::{ElementIdx, NodeHandle, Point, Rect, ScreenElement, ScreenState};
