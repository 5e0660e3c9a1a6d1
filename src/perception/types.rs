use serde::{Deserialize, Serialize};

/// Opaque reference to a live platform UI node, valid for the capture that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Rectangle in screen coordinates (physical pixels, right/bottom exclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self { left, top, right, bottom }
    }

    pub fn width(&self) -> i32 {
        (self.right - self.left).max(0)
    }

    pub fn height(&self) -> i32 {
        (self.bottom - self.top).max(0)
    }

    /// Visible area; degenerate rectangles have zero area.
    pub fn area(&self) -> i64 {
        self.width() as i64 * self.height() as i64
    }

    pub fn is_empty(&self) -> bool {
        self.area() == 0
    }

    pub fn center(&self) -> Point {
        Point {
            x: self.left + self.width() / 2,
            y: self.top + self.height() / 2,
        }
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.left && p.x < self.right && p.y >= self.top && p.y < self.bottom
    }
}

/// Index of an element inside its `ScreenState` arena.
pub type ElementIdx = usize;

/// One UI node of a captured screen.
#[derive(Debug, Clone, Serialize)]
pub struct ScreenElement {
    #[serde(skip)]
    pub handle: NodeHandle,
    pub id: Option<String>,
    pub text: Option<String>,
    pub accessible_label: Option<String>,
    /// Semantic class name, e.g. `android.widget.Button`.
    pub kind: String,
    pub bounds: Rect,
    pub clickable: bool,
    pub editable: bool,
    pub scrollable: bool,
    pub depth: usize,
    #[serde(skip)]
    pub parent: Option<ElementIdx>,
    #[serde(skip)]
    pub children: Vec<ElementIdx>,
}

impl ScreenElement {
    /// Text if present, otherwise the accessible label.
    pub fn display_label(&self) -> Option<&str> {
        self.text
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .or_else(|| self.accessible_label.as_deref().filter(|l| !l.trim().is_empty()))
    }

    pub fn short_kind(&self) -> &str {
        self.kind.rsplit('.').next().unwrap_or(&self.kind)
    }
}

/// Immutable snapshot of the foreground UI at one instant.
///
/// Elements are stored in depth-first pre-order, so arena order is also
/// document order. Index 0 is the window root when the snapshot is non-empty.
#[derive(Debug, Clone, Serialize)]
pub struct ScreenState {
    app_identifier: String,
    screen_identifier: Option<String>,
    #[serde(skip)]
    captured_at: std::time::Instant,
    captured_wall: chrono::DateTime<chrono::Utc>,
    truncated: bool,
    elements: Vec<ScreenElement>,
}

impl ScreenState {
    pub fn new(
        app_identifier: impl Into<String>,
        screen_identifier: Option<String>,
        elements: Vec<ScreenElement>,
        truncated: bool,
    ) -> Self {
        Self {
            app_identifier: app_identifier.into(),
            screen_identifier,
            captured_at: std::time::Instant::now(),
            captured_wall: chrono::Utc::now(),
            truncated,
            elements,
        }
    }

    pub fn app_identifier(&self) -> &str {
        &self.app_identifier
    }

    pub fn screen_identifier(&self) -> Option<&str> {
        self.screen_identifier.as_deref()
    }

    pub fn captured_at(&self) -> std::time::Instant {
        self.captured_at
    }

    pub fn captured_wall(&self) -> chrono::DateTime<chrono::Utc> {
        self.captured_wall
    }

    /// True when the depth or element bound cut the walk short.
    pub fn truncated(&self) -> bool {
        self.truncated
    }

    pub fn elements(&self) -> &[ScreenElement] {
        &self.elements
    }

    pub fn get(&self, idx: ElementIdx) -> Option<&ScreenElement> {
        self.elements.get(idx)
    }

    pub fn root(&self) -> Option<&ScreenElement> {
        self.elements.first()
    }

    pub fn children(&self, idx: ElementIdx) -> impl Iterator<Item = &ScreenElement> {
        self.elements
            .get(idx)
            .into_iter()
            .flat_map(|e| e.children.iter())
            .filter_map(|&c| self.elements.get(c))
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Non-empty labels in document order, deduplicated, at most `limit`.
    pub fn visible_labels(&self, limit: usize) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for label in self.elements.iter().filter_map(|e| e.display_label()) {
            if out.len() >= limit {
                break;
            }
            if !out.contains(&label) {
                out.push(label);
            }
        }
        out
    }
}
