//! Platform automation primitives consumed by the engine.
//!
//! Implementations wrap the host's accessibility and input APIs (an Android
//! accessibility service, Windows UIA, AT-SPI, ...). The engine only talks to
//! the device through this trait, so every component can be driven by a
//! scripted platform in tests.
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::perception::types::{NodeHandle, Point, Rect};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlatformError {
    /// The platform refused the interaction (node gone, action unsupported, ...).
    #[error("rejected: {0}")]
    Rejected(String),

    #[error("no active window")]
    NoActiveWindow,

    /// Automation permission was withdrawn; nothing further can run.
    #[error("permission revoked: {0}")]
    PermissionRevoked(String),

    #[error("{0}")]
    Failed(String),
}

impl PlatformError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, PlatformError::PermissionRevoked(_))
    }
}

pub type PlatformResult<T> = Result<T, PlatformError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollDirection {
    Up,
    Down,
    Left,
    Right,
}

impl ScrollDirection {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "up" => Some(Self::Up),
            "down" => Some(Self::Down),
            "left" => Some(Self::Left),
            "right" => Some(Self::Right),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
            Self::Left => "left",
            Self::Right => "right",
        }
    }
}

/// The currently focused window.
#[derive(Debug, Clone)]
pub struct WindowInfo {
    pub app_identifier: String,
    pub screen_identifier: Option<String>,
    pub root: NodeHandle,
}

/// Properties of one live UI node, with handles to its children in order.
#[derive(Debug, Clone, Default)]
pub struct NodeInfo {
    pub id: Option<String>,
    pub text: Option<String>,
    pub accessible_label: Option<String>,
    pub kind: String,
    pub bounds: Rect,
    pub clickable: bool,
    pub editable: bool,
    pub scrollable: bool,
    pub children: Vec<NodeHandle>,
}

#[async_trait]
pub trait DevicePlatform: Send + Sync {
    /// Fails with `NoActiveWindow` when no foreground window is accessible.
    async fn foreground_window(&self) -> PlatformResult<WindowInfo>;

    async fn describe_node(&self, node: NodeHandle) -> PlatformResult<NodeInfo>;

    // ── Node-native interaction ─────────────────────────────────────────────
    async fn click_node(&self, node: NodeHandle) -> PlatformResult<()>;

    async fn set_node_text(&self, node: NodeHandle, text: &str, clear_first: bool)
        -> PlatformResult<()>;

    async fn scroll_node(&self, node: NodeHandle, direction: ScrollDirection)
        -> PlatformResult<()>;

    // ── Coordinate gestures ─────────────────────────────────────────────────
    async fn tap(&self, at: Point) -> PlatformResult<()>;

    async fn swipe(&self, from: Point, to: Point, duration: Duration) -> PlatformResult<()>;

    /// Types into whatever currently holds input focus.
    async fn type_focused(&self, text: &str, clear_first: bool) -> PlatformResult<()>;

    // ── Navigation ──────────────────────────────────────────────────────────
    async fn back(&self) -> PlatformResult<()>;

    async fn home(&self) -> PlatformResult<()>;

    async fn launch_app(&self, identifier: &str) -> PlatformResult<()>;
}
