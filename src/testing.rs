//! Scripted device platform and inference doubles for unit tests.
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::errors::{TapClawError, TapClawResult};
use crate::executor::platform::{
    DevicePlatform, NodeInfo, PlatformError, PlatformResult, ScrollDirection, WindowInfo,
};
use crate::llm::provider::InferenceProvider;
use crate::llm::types::InferenceRequest;
use crate::perception::types::{NodeHandle, Point, Rect};

#[derive(Debug, Clone, Default)]
pub struct FakeNode {
    info: NodeInfo,
    children: Vec<FakeNode>,
}

impl FakeNode {
    pub fn new(kind: &str) -> Self {
        Self {
            info: NodeInfo {
                kind: kind.to_string(),
                ..NodeInfo::default()
            },
            children: Vec::new(),
        }
    }

    pub fn button(text: &str) -> Self {
        Self::new("android.widget.Button").text(text).clickable()
    }

    pub fn edit(label: &str) -> Self {
        Self::new("android.widget.EditText").label(label).editable()
    }

    pub fn text(mut self, text: &str) -> Self {
        self.info.text = Some(text.to_string());
        self
    }

    pub fn label(mut self, label: &str) -> Self {
        self.info.accessible_label = Some(label.to_string());
        self
    }

    pub fn bounds(mut self, left: i32, top: i32, right: i32, bottom: i32) -> Self {
        self.info.bounds = Rect::new(left, top, right, bottom);
        self
    }

    pub fn clickable(mut self) -> Self {
        self.info.clickable = true;
        self
    }

    pub fn editable(mut self) -> Self {
        self.info.editable = true;
        self
    }

    pub fn scrollable(mut self) -> Self {
        self.info.scrollable = true;
        self
    }

    pub fn child(mut self, child: FakeNode) -> Self {
        self.children.push(child);
        self
    }
}

/// Every primitive the fake platform accepted, in call order.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    ClickNode(String),
    SetText { node: String, text: String, clear_first: bool },
    ScrollNode { node: String, direction: ScrollDirection },
    Tap(Point),
    Swipe { from: Point, to: Point },
    TypeFocused(String),
    Back,
    Home,
    Launch(String),
}

struct Screen {
    app: String,
    root: NodeHandle,
    nodes: HashMap<NodeHandle, NodeInfo>,
}

struct Inner {
    screen: Screen,
    queued: VecDeque<(String, FakeNode)>,
    next_handle: u64,
    window_available: bool,
    reject_all_native: bool,
    rejected_nodes: HashSet<String>,
    reject_gestures: bool,
    revoke_after: Option<usize>,
    calls: Vec<Call>,
}

impl Inner {
    fn install(&mut self, app: &str, tree: FakeNode) {
        let mut nodes = HashMap::new();
        let root = flatten(tree, &mut self.next_handle, &mut nodes);
        self.screen = Screen {
            app: app.to_string(),
            root,
            nodes,
        };
    }

    fn label_of(&self, node: NodeHandle) -> PlatformResult<String> {
        let info = self
            .screen
            .nodes
            .get(&node)
            .ok_or_else(|| PlatformError::Rejected(format!("stale node {}", node.0)))?;
        Ok(info
            .text
            .clone()
            .or_else(|| info.accessible_label.clone())
            .unwrap_or_else(|| info.kind.clone()))
    }

    fn check_native(&self, node: NodeHandle) -> PlatformResult<String> {
        let label = self.label_of(node)?;
        if self.reject_all_native || self.rejected_nodes.contains(&label) {
            return Err(PlatformError::Rejected(format!("'{label}' does not support the action")));
        }
        Ok(label)
    }

    fn accept(&mut self, call: Call) -> PlatformResult<()> {
        if let Some(remaining) = self.revoke_after.as_mut() {
            if *remaining == 0 {
                return Err(PlatformError::PermissionRevoked("accessibility service disabled".into()));
            }
            *remaining -= 1;
        }
        self.calls.push(call);
        if let Some((app, tree)) = self.queued.pop_front() {
            self.install(&app, tree);
        }
        Ok(())
    }
}

fn flatten(node: FakeNode, next: &mut u64, out: &mut HashMap<NodeHandle, NodeInfo>) -> NodeHandle {
    let handle = NodeHandle(*next);
    *next += 1;
    let mut info = node.info;
    info.children = node
        .children
        .into_iter()
        .map(|c| flatten(c, next, out))
        .collect();
    out.insert(handle, info);
    handle
}

pub struct FakePlatform {
    inner: Mutex<Inner>,
}

impl FakePlatform {
    pub fn new(app: &str, tree: FakeNode) -> Self {
        let mut inner = Inner {
            screen: Screen {
                app: String::new(),
                root: NodeHandle(0),
                nodes: HashMap::new(),
            },
            queued: VecDeque::new(),
            next_handle: 1,
            window_available: true,
            reject_all_native: false,
            rejected_nodes: HashSet::new(),
            reject_gestures: false,
            revoke_after: None,
            calls: Vec::new(),
        };
        inner.install(app, tree);
        Self {
            inner: Mutex::new(inner),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap()
    }

    pub fn set_window_available(&self, available: bool) {
        self.lock().window_available = available;
    }

    pub fn reject_all_native(&self) {
        self.lock().reject_all_native = true;
    }

    pub fn reject_node(&self, label: &str) {
        self.lock().rejected_nodes.insert(label.to_string());
    }

    pub fn reject_gestures(&self) {
        self.lock().reject_gestures = true;
    }

    /// Accepts `n` more actions, then reports the permission as revoked.
    pub fn revoke_permission_after(&self, n: usize) {
        self.lock().revoke_after = Some(n);
    }

    /// Screen shown after the next accepted action.
    pub fn queue_screen(&self, app: &str, tree: FakeNode) {
        self.lock().queued.push_back((app.to_string(), tree));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }
}

#[async_trait]
impl DevicePlatform for FakePlatform {
    async fn foreground_window(&self) -> PlatformResult<WindowInfo> {
        let inner = self.lock();
        if let Some(0) = inner.revoke_after {
            return Err(PlatformError::PermissionRevoked("accessibility service disabled".into()));
        }
        if !inner.window_available {
            return Err(PlatformError::NoActiveWindow);
        }
        Ok(WindowInfo {
            app_identifier: inner.screen.app.clone(),
            screen_identifier: None,
            root: inner.screen.root,
        })
    }

    async fn describe_node(&self, node: NodeHandle) -> PlatformResult<NodeInfo> {
        self.lock()
            .screen
            .nodes
            .get(&node)
            .cloned()
            .ok_or_else(|| PlatformError::Failed(format!("unknown node {}", node.0)))
    }

    async fn click_node(&self, node: NodeHandle) -> PlatformResult<()> {
        let mut inner = self.lock();
        let label = inner.check_native(node)?;
        inner.accept(Call::ClickNode(label))
    }

    async fn set_node_text(&self, node: NodeHandle, text: &str, clear_first: bool) -> PlatformResult<()> {
        let mut inner = self.lock();
        let label = inner.check_native(node)?;
        inner.accept(Call::SetText {
            node: label,
            text: text.to_string(),
            clear_first,
        })
    }

    async fn scroll_node(&self, node: NodeHandle, direction: ScrollDirection) -> PlatformResult<()> {
        let mut inner = self.lock();
        let label = inner.check_native(node)?;
        inner.accept(Call::ScrollNode { node: label, direction })
    }

    async fn tap(&self, at: Point) -> PlatformResult<()> {
        let mut inner = self.lock();
        if inner.reject_gestures {
            return Err(PlatformError::Rejected("gesture dispatch failed".into()));
        }
        inner.accept(Call::Tap(at))
    }

    async fn swipe(&self, from: Point, to: Point, _duration: Duration) -> PlatformResult<()> {
        let mut inner = self.lock();
        if inner.reject_gestures {
            return Err(PlatformError::Rejected("gesture dispatch failed".into()));
        }
        inner.accept(Call::Swipe { from, to })
    }

    async fn type_focused(&self, text: &str, _clear_first: bool) -> PlatformResult<()> {
        self.lock().accept(Call::TypeFocused(text.to_string()))
    }

    async fn back(&self) -> PlatformResult<()> {
        self.lock().accept(Call::Back)
    }

    async fn home(&self) -> PlatformResult<()> {
        self.lock().accept(Call::Home)
    }

    async fn launch_app(&self, identifier: &str) -> PlatformResult<()> {
        self.lock().accept(Call::Launch(identifier.to_string()))
    }
}

/// Inference double replaying canned responses in order.
pub struct ScriptedInference {
    replies: Mutex<VecDeque<TapClawResult<String>>>,
    delay: Duration,
    pub requests: Mutex<Vec<InferenceRequest>>,
}

impl ScriptedInference {
    pub fn new(replies: Vec<TapClawResult<String>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            delay: Duration::ZERO,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl InferenceProvider for ScriptedInference {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn infer(&self, request: &InferenceRequest) -> TapClawResult<String> {
        self.requests.lock().unwrap().push(request.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(TapClawError::InferenceUnavailable("no scripted reply".into())))
    }
}
