//! The conversation transcript — an ordered list of opaque JSON records.
//!
//! Records are kept exactly as loaded so a load/save cycle reproduces the
//! file. Only [`Transcript::to_chat_messages`] looks inside them, and it
//! skips anything it does not recognise.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::llm::ChatMessage;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Transcript {
    messages: Vec<Value>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_messages(messages: Vec<Value>) -> Self {
        Self { messages }
    }

    pub fn messages(&self) -> &[Value] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Append a plain `{"role", "type": "message", "content"}` record.
    pub fn push_message(&mut self, role: &str, content: &str) {
        self.messages.push(json!({
            "role": role,
            "type": "message",
            "content": content,
        }));
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Drop the last user message and everything after it.
    /// Returns how many records were removed.
    pub fn undo(&mut self) -> usize {
        let last_user = self
            .messages
            .iter()
            .rposition(|m| role_of(m) == Some("user"));
        match last_user {
            Some(idx) => {
                let removed = self.messages.len() - idx;
                self.messages.truncate(idx);
                removed
            }
            None => 0,
        }
    }

    /// Convert records into provider chat messages.
    ///
    /// - `type: "message"` (or no type) with role `user`/`assistant`/`system`
    ///   passes through.
    /// - `type: "code"` becomes an assistant message holding a fenced block.
    /// - `role: "computer"` output becomes a user message prefixed
    ///   `Code output:`.
    /// - anything else is skipped.
    pub fn to_chat_messages(&self) -> Vec<ChatMessage> {
        self.messages.iter().filter_map(convert_record).collect()
    }
}

fn role_of(record: &Value) -> Option<&str> {
    record.get("role").and_then(Value::as_str)
}

fn content_text(record: &Map<String, Value>) -> Option<String> {
    match record.get("content")? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn convert_record(record: &Value) -> Option<ChatMessage> {
    let obj = record.as_object()?;
    let role = obj.get("role").and_then(Value::as_str)?;
    let kind = obj.get("type").and_then(Value::as_str).unwrap_or("message");
    let content = content_text(obj)?;

    match (role, kind) {
        ("computer", _) => Some(ChatMessage::new("user", format!("Code output:\n{content}"))),
        (_, "code") => {
            let lang = obj.get("format").and_then(Value::as_str).unwrap_or_default();
            Some(ChatMessage::new("assistant", format!("```{lang}\n{content}\n```")))
        }
        ("user" | "assistant" | "system", "message") => Some(ChatMessage::new(role, content)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_message_shape() {
        let mut t = Transcript::new();
        t.push_message("user", "привет");
        assert_eq!(
            t.messages()[0],
            json!({"role": "user", "type": "message", "content": "привет"})
        );
    }

    #[test]
    fn undo_removes_last_exchange() {
        let mut t = Transcript::new();
        t.push_message("user", "a");
        t.push_message("assistant", "b");
        t.push_message("user", "c");
        t.push_message("assistant", "d");

        assert_eq!(t.undo(), 2);
        assert_eq!(t.len(), 2);
        assert_eq!(t.undo(), 2);
        assert!(t.is_empty());
        assert_eq!(t.undo(), 0);
    }

    #[test]
    fn converts_known_record_types() {
        let t = Transcript::from_messages(vec![
            json!({"role": "user", "type": "message", "content": "list files"}),
            json!({"role": "assistant", "type": "code", "format": "shell", "content": "ls"}),
            json!({"role": "computer", "type": "console", "format": "output", "content": "a.txt"}),
            json!({"role": "assistant", "content": "done"}),
        ]);

        let msgs = t.to_chat_messages();
        assert_eq!(msgs.len(), 4);
        assert_eq!(msgs[0], ChatMessage::new("user", "list files"));
        assert_eq!(msgs[1], ChatMessage::new("assistant", "```shell\nls\n```"));
        assert_eq!(msgs[2], ChatMessage::new("user", "Code output:\na.txt"));
        assert_eq!(msgs[3], ChatMessage::new("assistant", "done"));
    }

    #[test]
    fn skips_unknown_and_malformed_records() {
        let t = Transcript::from_messages(vec![
            json!("just a string"),
            json!({"content": "no role"}),
            json!({"role": "user", "type": "image", "content": "base64..."}),
            json!({"role": "tool", "type": "message", "content": "x"}),
            json!({"role": "user", "type": "message", "content": null}),
        ]);
        assert!(t.to_chat_messages().is_empty());
    }

    #[test]
    fn non_string_content_is_sent_as_json() {
        let t = Transcript::from_messages(vec![json!({"role": "user", "content": {"k": 1}})]);
        assert_eq!(t.to_chat_messages()[0].content, r#"{"k":1}"#);
    }

    #[test]
    fn serializes_as_plain_array() {
        let mut t = Transcript::new();
        t.push_message("user", "x");
        let v = serde_json::to_value(&t).unwrap();
        assert!(v.is_array());
    }
}
