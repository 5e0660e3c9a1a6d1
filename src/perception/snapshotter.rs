use std::sync::Arc;

use crate::config::SnapshotConfig;
use crate::errors::{TapClawError, TapClawResult};
use crate::executor::platform::{DevicePlatform, PlatformError};
use crate::perception::types::{ElementIdx, NodeHandle, ScreenElement, ScreenState};

/// Walks the focused window's UI tree into an immutable `ScreenState`.
///
/// Read-only and uncached: every call performs a fresh walk. Callers own any
/// caching or debouncing.
#[derive(Clone)]
pub struct ScreenSnapshotter {
    platform: Arc<dyn DevicePlatform>,
    config: SnapshotConfig,
}

impl ScreenSnapshotter {
    pub fn new(platform: Arc<dyn DevicePlatform>, config: SnapshotConfig) -> Self {
        Self { platform, config }
    }

    pub fn platform(&self) -> &Arc<dyn DevicePlatform> {
        &self.platform
    }

    /// Depth-first walk bounded by `max_depth` and `max_elements`.
    ///
    /// Nodes the platform cannot describe are skipped along with their
    /// subtree. Anything cut by a bound sets `truncated` on the snapshot.
    pub async fn capture(&self) -> TapClawResult<ScreenState> {
        let window = self.platform.foreground_window().await?;

        let mut elements: Vec<ScreenElement> = Vec::new();
        let mut truncated = false;
        let mut stack: Vec<(NodeHandle, usize, Option<ElementIdx>)> = vec![(window.root, 0, None)];

        while let Some((handle, depth, parent)) = stack.pop() {
            if elements.len() >= self.config.max_elements {
                truncated = true;
                break;
            }
            if depth > self.config.max_depth {
                truncated = true;
                continue;
            }

            let info = match self.platform.describe_node(handle).await {
                Ok(info) => info,
                Err(e @ PlatformError::PermissionRevoked(_)) => return Err(e.into()),
                Err(PlatformError::NoActiveWindow) => return Err(TapClawError::NoActiveWindow),
                Err(e) => {
                    tracing::debug!(node = handle.0, error = %e, "node inaccessible, skipping subtree");
                    continue;
                }
            };

            let idx = elements.len();
            if let Some(p) = parent {
                elements[p].children.push(idx);
            }
            for child in info.children.iter().rev() {
                stack.push((*child, depth + 1, Some(idx)));
            }
            elements.push(ScreenElement {
                handle,
                id: info.id,
                text: info.text,
                accessible_label: info.accessible_label,
                kind: info.kind,
                bounds: info.bounds,
                clickable: info.clickable,
                editable: info.editable,
                scrollable: info.scrollable,
                depth,
                parent,
                children: Vec::new(),
            });
        }

        if elements.is_empty() {
            return Err(TapClawError::NoActiveWindow);
        }

        tracing::debug!(
            app = %window.app_identifier,
            count = elements.len(),
            truncated,
            "screen captured"
        );

        Ok(ScreenState::new(
            window.app_identifier,
            window.screen_identifier,
            elements,
            truncated,
        ))
    }
}
