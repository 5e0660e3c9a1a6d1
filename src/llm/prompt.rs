use crate::llm::types::{ChatMessage, InferenceRequest, Role};
use crate::perception::serialize::render_screen;

pub const SYSTEM_PROMPT: &str = "\
You are TapClaw, an assistant that operates apps on the user's device.

You receive the user's request, the current screen as a list of UI elements,
recent conversation and things you remembered about the user.

Reply with ONE JSON object and nothing else:
{
  \"thought\": \"short reasoning\",
  \"response\": \"what to tell the user\",
  \"actions\": [
    {\"type\": \"click\", \"target\": \"visible text or label\", \"index\": null},
    {\"type\": \"type\", \"target\": \"field label\", \"text\": \"...\", \"clearFirst\": true},
    {\"type\": \"scroll\", \"direction\": \"up|down|left|right\", \"target\": null},
    {\"type\": \"back\"},
    {\"type\": \"home\"},
    {\"type\": \"open_app\", \"appName\": \"settings\"},
    {\"type\": \"wait\", \"milliseconds\": 1000}
  ],
  \"memory\": [{\"key\": \"...\", \"value\": \"...\", \"category\": \"...\"}],
  \"complete\": false
}

Rules:
- Use the exact text or label of an element from the screen as the target.
- \"index\" is only for elements without text: the 0-based position among
  elements that support the action (click, edit or scroll), in screen order.
- Only include actions you are confident about; the screen is re-read between steps.
- Set \"complete\" to true once the user's task is finished.
- If you need more information from the user, ask in \"response\" with no actions.
- Respond in the same language as the user.";

/// Builds the chat transcript for an OpenAI-compatible endpoint.
pub fn build_messages(request: &InferenceRequest) -> Vec<ChatMessage> {
    let mut messages = vec![ChatMessage::new(Role::System, SYSTEM_PROMPT)];

    if !request.memory.is_empty() {
        let mut block = String::from("Things you remember about the user:\n");
        for m in &request.memory {
            block.push_str(&format!("- [{}] {}: {}\n", m.category, m.key, m.value));
        }
        messages.push(ChatMessage::new(Role::System, block));
    }

    for turn in &request.conversation_history {
        messages.push(ChatMessage::new(turn.role, turn.content.clone()));
    }

    let screen = match &request.screen_state {
        Some(state) => render_screen(state),
        None => "<screen unavailable />\n".to_string(),
    };
    messages.push(ChatMessage::new(
        Role::User,
        format!("Current screen:\n{screen}\nRequest: {}", request.user_message),
    ));
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::ConversationTurn;
    use crate::memory::MemoryEntry;

    #[test]
    fn transcript_order() {
        let request = InferenceRequest {
            user_message: "turn on wifi".into(),
            screen_state: None,
            conversation_history: vec![
                ConversationTurn { role: Role::User, content: "hi".into() },
                ConversationTurn { role: Role::Assistant, content: "hello".into() },
            ],
            memory: vec![MemoryEntry {
                key: "name".into(),
                value: "Alice".into(),
                category: "profile".into(),
            }],
        };

        let msgs = build_messages(&request);
        let roles: Vec<_> = msgs.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["system", "system", "user", "assistant", "user"]);
        assert!(msgs[1].content.contains("[profile] name: Alice"));
        assert!(msgs[4].content.contains("<screen unavailable />"));
        assert!(msgs[4].content.ends_with("Request: turn on wifi"));
    }
}
