use serde_json::{Map, Value};

use crate::agent_engine::state::{AIAction, ActionPlan, PlanSource, DEFAULT_WAIT_MS};
use crate::config::HeuristicsConfig;
use crate::executor::platform::ScrollDirection;
use crate::memory::MemoryEntry;
use crate::perception::types::{Point, ScreenState};
use crate::planning::heuristic::HeuristicResponder;

const DEFAULT_MEMORY_CATEGORY: &str = "general";

/// Turns raw model output into a usable `ActionPlan`. Never fails.
pub struct ActionPlanParser {
    heuristic: HeuristicResponder,
}

impl ActionPlanParser {
    pub fn new(config: &HeuristicsConfig) -> Self {
        Self {
            heuristic: HeuristicResponder::new(config),
        }
    }

    pub fn with_heuristic(heuristic: HeuristicResponder) -> Self {
        Self { heuristic }
    }

    pub fn parse(&self, raw: &str) -> ActionPlan {
        self.parse_with_screen(raw, None)
    }

    /// Like `parse`; the snapshot lets the heuristic answer screen questions.
    pub fn parse_with_screen(&self, raw: &str, screen: Option<&ScreenState>) -> ActionPlan {
        match extract_json_object(raw) {
            Some(obj) => self.from_structured(&obj),
            None => {
                tracing::warn!(
                    kind = "plan_parse_fallback",
                    len = raw.len(),
                    "model response is not structured, using heuristic responder"
                );
                self.heuristic.respond(raw, screen)
            }
        }
    }

    fn from_structured(&self, obj: &Map<String, Value>) -> ActionPlan {
        let thought = get_str(obj, &["thought", "reasoning"]).unwrap_or_default();
        let response = get_str(obj, &["response", "message"]);
        let complete = get_bool(obj, &["complete", "isComplete", "is_complete", "done"]).unwrap_or(false);

        let mut actions = Vec::new();
        if let Some(entries) = obj.get("actions").and_then(Value::as_array) {
            for (i, entry) in entries.iter().enumerate() {
                match map_action(entry) {
                    Ok(action) => actions.push(action),
                    Err(reason) => {
                        tracing::warn!(index = i, reason = %reason, entry = %entry, "dropping action entry");
                    }
                }
            }
        }

        let memory: Vec<MemoryEntry> = obj
            .get("memory")
            .and_then(Value::as_array)
            .map(|entries| entries.iter().filter_map(map_memory).collect())
            .unwrap_or_default();

        if actions.is_empty() && !complete {
            let message = response
                .clone()
                .unwrap_or_else(|| self.heuristic.fallback_message().to_string());
            actions.push(AIAction::respond(message));
        }

        tracing::debug!(
            actions = actions.len(),
            memory = memory.len(),
            complete,
            "structured plan parsed"
        );

        ActionPlan::new(thought, actions, complete)
            .with_response(response)
            .with_memory(memory)
            .with_source(PlanSource::Structured)
    }
}

/// Finds the first balanced `{...}` span that parses as a JSON object.
///
/// One pass with a stack of open braces; string literals are tracked inside
/// braces so quoted braces do not count. Each closed span is parsed at most
/// once: when its outermost brace closes, or at the end of input when an
/// unmatched `{` kept it from closing. Earlier starts win.
fn extract_json_object(text: &str) -> Option<Map<String, Value>> {
    let mut open: Vec<usize> = Vec::new();
    let mut closed: Vec<(usize, usize)> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (i, b) in text.bytes().enumerate() {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' if !open.is_empty() => in_string = true,
            b'{' => open.push(i),
            b'}' => {
                if let Some(start) = open.pop() {
                    closed.push((start, i + 1));
                    if open.is_empty() {
                        if let Some(map) = first_object(text, &mut closed) {
                            return Some(map);
                        }
                    }
                }
            }
            _ => {}
        }
    }
    first_object(text, &mut closed)
}

fn first_object(text: &str, spans: &mut Vec<(usize, usize)>) -> Option<Map<String, Value>> {
    spans.sort_unstable_by_key(|&(start, _)| start);
    let found = spans.iter().find_map(|&(start, end)| {
        match serde_json::from_str::<Value>(&text[start..end]) {
            Ok(Value::Object(map)) => Some(map),
            _ => None,
        }
    });
    spans.clear();
    found
}

fn map_action(entry: &Value) -> Result<AIAction, String> {
    let obj = entry.as_object().ok_or("entry is not an object")?;
    let kind = get_str(obj, &["type", "action"])
        .ok_or("missing 'type'")?
        .trim()
        .to_lowercase()
        .replace(['-', ' '], "_");

    let action = match kind.as_str() {
        "click" | "tap" | "press" => AIAction::Click {
            target: get_str(obj, &["target", "text", "label", "element"]).unwrap_or_default(),
            index: get_usize(obj, &["index"]),
            point: get_point(obj),
        },
        "type" | "input" | "type_text" | "enter_text" | "set_text" => AIAction::Type {
            target: get_str(obj, &["target", "field", "label", "element"]).unwrap_or_default(),
            text: get_str(obj, &["text", "value", "content"]).ok_or("type without 'text'")?,
            clear_first: get_bool(obj, &["clearFirst", "clear_first", "clear"]).unwrap_or(true),
            index: get_usize(obj, &["index"]),
            point: get_point(obj),
        },
        "scroll" | "swipe" => {
            let raw = get_str(obj, &["direction"]).ok_or("scroll without 'direction'")?;
            AIAction::Scroll {
                direction: ScrollDirection::parse(&raw).ok_or_else(|| format!("bad direction '{raw}'"))?,
                target: get_str(obj, &["target", "element"]).filter(|t| !t.trim().is_empty()),
            }
        }
        "back" | "go_back" => AIAction::Back,
        "home" | "go_home" => AIAction::Home,
        "open_app" | "openapp" | "open" | "launch" | "launch_app" => AIAction::OpenApp {
            app_name: get_str(obj, &["appName", "app_name", "app", "name", "target"])
                .ok_or("open_app without 'appName'")?,
        },
        "wait" | "sleep" | "pause" => {
            let ms = get_f64(obj, &["milliseconds", "ms", "duration_ms", "duration"])
                .map(|v| v.max(0.0) as u64)
                .unwrap_or(DEFAULT_WAIT_MS);
            AIAction::wait(ms)
        }
        "respond" | "reply" | "say" | "message" => AIAction::Respond {
            message: get_str(obj, &["message", "text", "response"]).ok_or("respond without 'message'")?,
        },
        "clarify" | "ask" => AIAction::Clarify {
            question: get_str(obj, &["question", "message", "text"]).ok_or("clarify without 'question'")?,
        },
        "complete" | "finish" | "finish_task" | "done" => AIAction::Complete {
            summary: get_str(obj, &["summary", "message", "text"]).unwrap_or_default(),
        },
        other => return Err(format!("unrecognized action type '{other}'")),
    };

    action.validate()?;
    Ok(action)
}

fn map_memory(entry: &Value) -> Option<MemoryEntry> {
    let obj = entry.as_object()?;
    let key = get_str(obj, &["key"]).filter(|k| !k.trim().is_empty())?;
    let value = get_str(obj, &["value"])?;
    let category = get_str(obj, &["category"])
        .filter(|c| !c.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_MEMORY_CATEGORY.to_string());
    Some(MemoryEntry { key, value, category })
}

fn get_str(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| obj.get(*k).and_then(Value::as_str))
        .map(str::to_string)
}

fn get_f64(obj: &Map<String, Value>, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|k| match obj.get(*k)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

fn get_usize(obj: &Map<String, Value>, keys: &[&str]) -> Option<usize> {
    get_f64(obj, keys).filter(|v| *v >= 0.0).map(|v| v as usize)
}

fn get_bool(obj: &Map<String, Value>, keys: &[&str]) -> Option<bool> {
    keys.iter().find_map(|k| match obj.get(*k)? {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" => Some(true),
            "false" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    })
}

fn get_point(obj: &Map<String, Value>) -> Option<Point> {
    let x = get_f64(obj, &["x"])?;
    let y = get_f64(obj, &["y"])?;
    Some(Point::new(x.round() as i32, y.round() as i32))
}
