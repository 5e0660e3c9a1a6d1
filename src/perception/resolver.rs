use serde::{Deserialize, Serialize};

use crate::perception::types::{ElementIdx, Point, ScreenElement, ScreenState};

/// Interaction the calling action needs from its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Clickable,
    Editable,
    Scrollable,
}

impl Capability {
    pub fn satisfied_by(&self, element: &ScreenElement) -> bool {
        match self {
            Capability::Clickable => element.clickable,
            Capability::Editable => element.editable,
            Capability::Scrollable => element.scrollable,
        }
    }
}

/// How an action names the element it wants to affect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetDescriptor {
    pub label: String,
    pub index: Option<usize>,
    /// Coordinate hint, only ever used by the executor's gesture fallback.
    pub point: Option<Point>,
    pub capability: Capability,
}

impl TargetDescriptor {
    pub fn label(label: impl Into<String>, capability: Capability) -> Self {
        Self {
            label: label.into(),
            index: None,
            point: None,
            capability,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchTier {
    ExactText,
    ExactLabel,
    Substring,
    Index,
}

#[derive(Debug, Clone, Copy)]
pub struct Resolution<'a> {
    pub index: ElementIdx,
    pub element: &'a ScreenElement,
    pub tier: MatchTier,
}

/// Finds the element a target descriptor refers to.
///
/// Tiers are tried in order and the first tier with any match wins. Within a
/// tier the larger visible area wins, then document order. Pure function of
/// its inputs, so repeated calls on the same snapshot agree.
#[derive(Debug, Clone, Copy, Default)]
pub struct ElementResolver;

impl ElementResolver {
    pub fn new() -> Self {
        Self
    }

    pub fn resolve<'a>(&self, state: &'a ScreenState, target: &TargetDescriptor) -> Option<Resolution<'a>> {
        let needle = normalize(&target.label);

        if !needle.is_empty() {
            for tier in [MatchTier::ExactText, MatchTier::ExactLabel, MatchTier::Substring] {
                if let Some((index, element)) = largest(state, |e| tier_matches(tier, e, &needle)) {
                    tracing::debug!(target = %target.label, ?tier, index, "target resolved");
                    return Some(Resolution { index, element, tier });
                }
            }
        }

        if let Some(n) = target.index {
            let found = state
                .elements()
                .iter()
                .enumerate()
                .filter(|(_, e)| target.capability.satisfied_by(e))
                .nth(n);
            if let Some((index, element)) = found {
                tracing::debug!(target = %target.label, n, index, "target resolved by index");
                return Some(Resolution {
                    index,
                    element,
                    tier: MatchTier::Index,
                });
            }
        }

        tracing::debug!(target = %target.label, index = ?target.index, "target not found");
        None
    }
}

fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}

fn tier_matches(tier: MatchTier, e: &ScreenElement, needle: &str) -> bool {
    match tier {
        MatchTier::ExactText => field_eq(e.text.as_deref(), needle),
        MatchTier::ExactLabel => field_eq(e.accessible_label.as_deref(), needle),
        MatchTier::Substring => {
            field_contains(e.text.as_deref(), needle)
                || field_contains(e.accessible_label.as_deref(), needle)
        }
        MatchTier::Index => false,
    }
}

fn field_eq(value: Option<&str>, needle: &str) -> bool {
    value.map(|v| normalize(v) == needle).unwrap_or(false)
}

fn field_contains(value: Option<&str>, needle: &str) -> bool {
    value.map(|v| normalize(v).contains(needle)).unwrap_or(false)
}

/// Largest-area match, earliest in document order on ties.
fn largest<F>(state: &ScreenState, pred: F) -> Option<(ElementIdx, &ScreenElement)>
where
    F: Fn(&ScreenElement) -> bool,
{
    let mut best: Option<(ElementIdx, &ScreenElement)> = None;
    for (idx, element) in state.elements().iter().enumerate() {
        if !pred(element) {
            continue;
        }
        match best {
            Some((_, b)) if b.bounds.area() >= element.bounds.area() => {}
            _ => best = Some((idx, element)),
        }
    }
    best
}
