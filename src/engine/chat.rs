// Zenith Agent Engine — Chat messages
// UI-facing conversation model: ordered text / tool-invocation parts with a
// legacy `content` field kept in sync as the concatenation of text parts.

use crate::engine::prompts::WELCOME_MESSAGE;
use crate::engine::state::RunState;
use crate::engine::types::Role;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ── Tool invocations ───────────────────────────────────────────────────

/// Paired record of a tool call and its eventual result. Created without a
/// `result` when the model requests the call; the SAME record (matched by
/// `tool_call_id`) is later completed in place. The ID must stay stable
/// across the pair even when the provider didn't supply one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInvocation {
    #[serde(rename = "toolCallId")]
    pub tool_call_id: String,
    #[serde(rename = "toolName")]
    pub tool_name: String,
    pub args: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum MessagePart {
    Text { text: String },
    ToolInvocation {
        #[serde(rename = "toolInvocation")]
        tool_invocation: ToolInvocation,
    },
}

// ── Messages ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: Role,
    /// Concatenation of all text parts, kept in sync incrementally.
    pub content: String,
    /// Ordered parts in stream-emission order; a tool call always starts a
    /// new part boundary.
    pub parts: Vec<MessagePart>,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        let text = text.into();
        ChatMessage {
            id: new_message_id(),
            role,
            content: text.clone(),
            parts: vec![MessagePart::Text { text }],
            timestamp: Utc::now(),
        }
    }

    /// Empty assistant placeholder created when a turn starts; filled in
    /// incrementally as stream events arrive.
    pub fn placeholder(role: Role) -> Self {
        ChatMessage {
            id: new_message_id(),
            role,
            content: String::new(),
            parts: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    /// Append a streamed text delta: extends the trailing text part, or
    /// opens a new one when the last part is a tool invocation. Keeps
    /// `content` in sync.
    pub fn push_text_delta(&mut self, delta: &str) {
        self.content.push_str(delta);
        match self.parts.last_mut() {
            Some(MessagePart::Text { text }) => text.push_str(delta),
            _ => self.parts.push(MessagePart::Text {
                text: delta.to_string(),
            }),
        }
    }

    /// Open a new tool-invocation part (pending — no result yet).
    pub fn push_tool_invocation(&mut self, invocation: ToolInvocation) {
        self.parts.push(MessagePart::ToolInvocation {
            tool_invocation: invocation,
        });
    }

    /// Attach a result to the invocation matching `tool_call_id`, in place.
    /// Returns false when no pending invocation carries that ID.
    pub fn attach_tool_result(&mut self, tool_call_id: &str, result: Value) -> bool {
        for part in self.parts.iter_mut().rev() {
            if let MessagePart::ToolInvocation { tool_invocation } = part {
                if tool_invocation.tool_call_id == tool_call_id {
                    tool_invocation.result = Some(result);
                    return true;
                }
            }
        }
        false
    }

    /// The text-part concatenation; equals `content` by invariant.
    pub fn concatenated_text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                MessagePart::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn tool_invocations(&self) -> impl Iterator<Item = &ToolInvocation> {
        self.parts.iter().filter_map(|p| match p {
            MessagePart::ToolInvocation { tool_invocation } => Some(tool_invocation),
            _ => None,
        })
    }
}

fn new_message_id() -> String {
    format!("msg_{}", uuid::Uuid::new_v4())
}

// ── Sessions ───────────────────────────────────────────────────────────

/// One conversation: ordered messages plus the loop's run state. At most
/// one turn is active per session.
#[derive(Debug)]
pub struct ChatSession {
    pub id: String,
    pub messages: Vec<ChatMessage>,
    state: RunState,
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatSession {
    pub fn new() -> Self {
        ChatSession {
            id: format!("session_{}", uuid::Uuid::new_v4()),
            messages: vec![ChatMessage::new(Role::Assistant, WELCOME_MESSAGE)],
            state: RunState::Idle,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn set_state(&mut self, state: RunState) {
        self.state = state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deltas_coalesce_into_one_text_part() {
        let mut msg = ChatMessage::placeholder(Role::Assistant);
        msg.push_text_delta("Hello");
        msg.push_text_delta(", world");
        assert_eq!(msg.parts.len(), 1);
        assert_eq!(msg.content, "Hello, world");
        assert_eq!(msg.concatenated_text(), msg.content);
    }

    #[test]
    fn tool_call_starts_a_new_part_boundary() {
        let mut msg = ChatMessage::placeholder(Role::Assistant);
        msg.push_text_delta("Let me check the files.");
        msg.push_tool_invocation(ToolInvocation {
            tool_call_id: "call_1".into(),
            tool_name: "read_files".into(),
            args: json!({}),
            result: None,
        });
        msg.push_text_delta("Done");
        msg.push_text_delta("!");
        assert_eq!(msg.parts.len(), 3);
        assert_eq!(msg.content, "Let me check the files.Done!");
        assert_eq!(msg.concatenated_text(), msg.content);
        assert!(matches!(msg.parts[1], MessagePart::ToolInvocation { .. }));
        assert!(matches!(&msg.parts[2], MessagePart::Text { text } if text == "Done!"));
    }

    #[test]
    fn results_attach_by_id_in_any_order() {
        let mut msg = ChatMessage::placeholder(Role::Assistant);
        for id in ["call_a", "call_b", "call_c"] {
            msg.push_tool_invocation(ToolInvocation {
                tool_call_id: id.into(),
                tool_name: "patch_file".into(),
                args: json!({"target": "css"}),
                result: None,
            });
        }
        // results land out of order relative to the calls
        assert!(msg.attach_tool_result("call_c", json!({"status": "success", "n": 3})));
        assert!(msg.attach_tool_result("call_a", json!({"status": "success", "n": 1})));
        assert!(msg.attach_tool_result("call_b", json!({"status": "error", "n": 2})));
        assert!(!msg.attach_tool_result("call_unknown", json!({})));

        let by_id: Vec<(&str, i64)> = msg
            .tool_invocations()
            .map(|ti| {
                (
                    ti.tool_call_id.as_str(),
                    ti.result.as_ref().unwrap()["n"].as_i64().unwrap(),
                )
            })
            .collect();
        assert_eq!(by_id, vec![("call_a", 1), ("call_b", 2), ("call_c", 3)]);
    }

    #[test]
    fn parts_serialize_with_the_original_wire_names() {
        let mut msg = ChatMessage::placeholder(Role::Assistant);
        msg.push_text_delta("hi");
        msg.push_tool_invocation(ToolInvocation {
            tool_call_id: "call_1".into(),
            tool_name: "update_file".into(),
            args: json!({"target": "html"}),
            result: None,
        });
        let v = serde_json::to_value(&msg.parts).unwrap();
        assert_eq!(v[0]["type"], "text");
        assert_eq!(v[1]["type"], "tool-invocation");
        assert_eq!(v[1]["toolInvocation"]["toolCallId"], "call_1");
        assert_eq!(v[1]["toolInvocation"]["toolName"], "update_file");
    }

    #[test]
    fn session_opens_with_welcome_and_idle_state() {
        let session = ChatSession::new();
        assert_eq!(session.messages.len(), 1);
        assert_eq!(session.messages[0].role, Role::Assistant);
        assert_eq!(session.state(), RunState::Idle);
    }
}
