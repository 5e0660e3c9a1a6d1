use crate::perception::types::{ElementIdx, ScreenState};

/// Renders a snapshot as compact XML-like text for the model.
///
/// Only elements carrying a label or a capability are emitted, but nesting of
/// the emitted ones is kept.
///
/// ```text
/// <screen app="com.android.settings" truncated="false">
///   <Button text="Wi-Fi" bounds="0,0,1080,200" click />
/// </screen>
/// ```
pub fn render_screen(state: &ScreenState) -> String {
    let mut out = format!(
        "<screen app=\"{}\"{} truncated=\"{}\">\n",
        escape(state.app_identifier()),
        state
            .screen_identifier()
            .map(|s| format!(" screen=\"{}\"", escape(s)))
            .unwrap_or_default(),
        state.truncated()
    );
    if !state.is_empty() {
        render_node(state, 0, 1, &mut out);
    }
    out.push_str("</screen>\n");
    out
}

fn render_node(state: &ScreenState, idx: ElementIdx, indent: usize, out: &mut String) {
    let Some(el) = state.get(idx) else { return };

    let interesting = el.display_label().is_some() || el.clickable || el.editable || el.scrollable;
    let child_indent = if interesting { indent + 1 } else { indent };

    if interesting {
        let pad = "  ".repeat(indent);
        let mut line = format!("{pad}<{}", el.short_kind());
        if let Some(text) = el.text.as_deref().filter(|t| !t.is_empty()) {
            line.push_str(&format!(" text=\"{}\"", escape(text)));
        }
        if let Some(label) = el.accessible_label.as_deref().filter(|l| !l.is_empty()) {
            line.push_str(&format!(" label=\"{}\"", escape(label)));
        }
        let b = el.bounds;
        line.push_str(&format!(" bounds=\"{},{},{},{}\"", b.left, b.top, b.right, b.bottom));
        if el.clickable {
            line.push_str(" click");
        }
        if el.editable {
            line.push_str(" edit");
        }
        if el.scrollable {
            line.push_str(" scroll");
        }
        out.push_str(&line);
        out.push_str(" />\n");
    }

    for &child in &el.children {
        render_node(state, child, child_indent, out);
    }
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SnapshotConfig;
    use crate::perception::snapshotter::ScreenSnapshotter;
    use crate::testing::{FakeNode, FakePlatform};
    use std::sync::Arc;

    #[tokio::test]
    async fn renders_labelled_and_capable_elements() {
        let platform = Arc::new(FakePlatform::new(
            "com.android.settings",
            FakeNode::new("android.widget.FrameLayout")
                .bounds(0, 0, 1080, 2400)
                .child(FakeNode::button("Wi-Fi & \"more\"").bounds(0, 0, 1080, 200))
                .child(FakeNode::edit("Search").bounds(0, 200, 1080, 300)),
        ));
        let state = ScreenSnapshotter::new(platform, SnapshotConfig::default())
            .capture()
            .await
            .unwrap();

        let text = render_screen(&state);
        assert!(text.starts_with("<screen app=\"com.android.settings\" truncated=\"false\">"));
        assert!(text.contains("<Button text=\"Wi-Fi &amp; &quot;more&quot;\" bounds=\"0,0,1080,200\" click />"));
        assert!(text.contains("<EditText label=\"Search\" bounds=\"0,200,1080,300\" edit />"));
        assert!(!text.contains("FrameLayout"));
    }
}
