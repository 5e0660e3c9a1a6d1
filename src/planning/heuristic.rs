//! Rule-based responder for model output that is not structured.
//!
//! The rule set is policy, not contract: callers can replace it entirely with
//! [`HeuristicResponder::with_rules`].
use regex::Regex;

use crate::agent_engine::state::{AIAction, ActionPlan, PlanSource};
use crate::config::HeuristicsConfig;
use crate::executor::platform::ScrollDirection;
use crate::perception::types::ScreenState;

const SCREEN_LABEL_LIMIT: usize = 12;

const APP_STOP_WORDS: &[&str] = &[
    "app", "application", "for", "and", "then", "now", "please", "so", "to", "on", "with", "from",
];
const TAP_STOP_WORDS: &[&str] = &["button", "and", "then", "to", "for", "please", "now", "so"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    DescribeScreen,
    GoBack,
    GoHome,
    OpenApp,
    Scroll,
    Tap,
}

/// One intent pattern. The optional `arg` capture group feeds the action.
#[derive(Debug, Clone)]
pub struct IntentRule {
    pub name: String,
    pub pattern: Regex,
    pub intent: Intent,
}

impl IntentRule {
    pub fn new(name: &str, pattern: &str, intent: Intent) -> Option<Self> {
        match Regex::new(pattern) {
            Ok(pattern) => Some(Self {
                name: name.to_string(),
                pattern,
                intent,
            }),
            Err(e) => {
                tracing::warn!(rule = name, error = %e, "invalid heuristic pattern, rule disabled");
                None
            }
        }
    }
}

pub struct HeuristicResponder {
    rules: Vec<IntentRule>,
    fallback_message: String,
}

impl HeuristicResponder {
    pub fn new(config: &HeuristicsConfig) -> Self {
        Self::with_rules(
            Self::default_rules(&config.extra_open_verbs),
            config.fallback_message.clone(),
        )
    }

    pub fn with_rules(rules: Vec<IntentRule>, fallback_message: String) -> Self {
        Self {
            rules,
            fallback_message,
        }
    }

    pub fn fallback_message(&self) -> &str {
        &self.fallback_message
    }

    pub fn default_rules(extra_open_verbs: &[String]) -> Vec<IntentRule> {
        let mut open_verbs = String::from("open|opening|launch|launching");
        for verb in extra_open_verbs.iter().map(|v| v.trim()).filter(|v| !v.is_empty()) {
            open_verbs.push('|');
            open_verbs.push_str(&regex::escape(verb));
        }
        let open_pattern = format!(
            r"(?i)\b(?:{open_verbs})(?:\s+up)?\s+(?:the\s+)?(?P<arg>[\p{{L}}\p{{N}}][\p{{L}}\p{{N}}'&.-]*(?:[ \t]+[\p{{L}}\p{{N}}][\p{{L}}\p{{N}}'&.-]*){{0,3}})"
        );

        [
            IntentRule::new(
                "describe_screen",
                r"(?i)\bwhat(?:'s|’s|\s+is)\s+(?:on\s+)?(?:my|the|this)\s+screen\b|\bdescribe\s+(?:my|the|this)\s+screen\b|\bwhat\s+do\s+you\s+see\b",
                Intent::DescribeScreen,
            ),
            IntentRule::new(
                "go_back",
                r"(?i)\b(?:go(?:ing)?|navigat(?:e|ing))\s+back\b|\bpress(?:ing)?\s+(?:the\s+)?back\b",
                Intent::GoBack,
            ),
            IntentRule::new(
                "go_home",
                r"(?i)\b(?:go(?:ing)?|return(?:ing)?|navigat(?:e|ing))\s+(?:to\s+)?(?:the\s+)?home(?:\s*screen)?\b",
                Intent::GoHome,
            ),
            IntentRule::new("open_app", &open_pattern, Intent::OpenApp),
            IntentRule::new(
                "scroll",
                r"(?i)\b(?:scroll|scrolling|swipe|swiping)\s+(?P<arg>up|down|left|right)\b",
                Intent::Scroll,
            ),
            IntentRule::new(
                "tap",
                r#"(?i)\b(?:tap|tapping|click|clicking|press|pressing|select|selecting)\s+(?:on\s+)?(?:the\s+)?["'“‘]?(?P<arg>[^"'”’\n.,!?]+)"#,
                Intent::Tap,
            ),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    /// Synthesizes a single-action plan from free text.
    pub fn respond(&self, raw: &str, screen: Option<&ScreenState>) -> ActionPlan {
        let text = raw.trim();

        for rule in &self.rules {
            let Some(caps) = rule.pattern.captures(text) else {
                continue;
            };
            let arg = caps.name("arg").map(|m| m.as_str()).unwrap_or_default();
            let Some(action) = self.action_for(rule.intent, arg, screen) else {
                continue;
            };
            tracing::info!(rule = %rule.name, action = action.name(), "heuristic intent matched");
            let response = match &action {
                AIAction::Respond { message } => message.clone(),
                _ => text.to_string(),
            };
            return ActionPlan::new(format!("heuristic: {}", rule.name), vec![action], false)
                .with_response(Some(response))
                .with_source(PlanSource::Heuristic);
        }

        let action = if text.ends_with('?') {
            AIAction::Clarify {
                question: text.to_string(),
            }
        } else if !text.is_empty() && !text.contains('{') {
            AIAction::respond(text)
        } else {
            AIAction::respond(self.fallback_message.clone())
        };
        let response = action.terminal_message().map(str::to_string);
        ActionPlan::new("heuristic: no intent matched", vec![action], false)
            .with_response(response)
            .with_source(PlanSource::Heuristic)
    }

    fn action_for(&self, intent: Intent, arg: &str, screen: Option<&ScreenState>) -> Option<AIAction> {
        match intent {
            Intent::DescribeScreen => Some(AIAction::respond(describe_screen(screen))),
            Intent::GoBack => Some(AIAction::Back),
            Intent::GoHome => Some(AIAction::Home),
            Intent::OpenApp => {
                let app_name = cut_at_stop_words(arg, APP_STOP_WORDS)?;
                Some(AIAction::OpenApp { app_name })
            }
            Intent::Scroll => Some(AIAction::Scroll {
                direction: ScrollDirection::parse(arg)?,
                target: None,
            }),
            Intent::Tap => {
                let target = cut_at_stop_words(arg, TAP_STOP_WORDS)?;
                Some(AIAction::click(target))
            }
        }
    }
}

/// Keeps the words before the first stop word, minus surrounding punctuation.
fn cut_at_stop_words(arg: &str, stop_words: &[&str]) -> Option<String> {
    let kept: Vec<&str> = arg
        .split_whitespace()
        .take_while(|w| !stop_words.contains(&w.to_lowercase().as_str()))
        .collect();
    let joined = kept.join(" ");
    let trimmed = joined.trim_matches(|c: char| c.is_ascii_punctuation() && c != '&');
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn describe_screen(screen: Option<&ScreenState>) -> String {
    match screen {
        Some(state) => {
            let labels = state.visible_labels(SCREEN_LABEL_LIMIT);
            if labels.is_empty() {
                format!("You're in {}, but I can't make out any labelled items.", state.app_identifier())
            } else {
                format!("You're in {}. I can see: {}.", state.app_identifier(), labels.join(", "))
            }
        }
        None => "I can't read the screen right now.".to_string(),
    }
}
