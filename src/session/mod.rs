use crate::table::Table;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod identity;
pub mod state;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    User,
    Assistant,
    /// Any other sender the server reports, e.g. an image classifier.
    Other(String),
}

impl Role {
    pub fn as_str(&self) -> &str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Other(name) => name,
        }
    }
}

impl From<String> for Role {
    fn from(value: String) -> Self {
        match value.as_str() {
            "user" => Self::User,
            "assistant" => Self::Assistant,
            _ => Self::Other(value),
        }
    }
}

impl From<Role> for String {
    fn from(value: Role) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub prediction_label: String,
    pub accuracy: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub message_id: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<Table>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(default, with = "timestamp", skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<Prediction>,
}

impl Message {
    /// Local copy of a user message shown until the server answers.
    pub fn provisional(outgoing: &OutgoingMessage) -> Self {
        let content = (!outgoing.content.is_empty()).then(|| outgoing.content.clone());
        Self {
            message_id: uuid::Uuid::new_v4().to_string(),
            role: Role::User,
            content,
            file: outgoing.file.clone(),
            file_path: None,
            timestamp: Some(Utc::now()),
            results: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatSession {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dts: Option<i64>,
}

impl ChatSession {
    pub fn file_paths(&self) -> impl Iterator<Item = &str> {
        self.messages
            .iter()
            .filter_map(|message| message.file_path.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChatSummary {
    pub chat_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub dts: Option<i64>,
}

impl ChatSummary {
    pub fn label(&self) -> &str {
        if self.title.trim().is_empty() {
            &self.chat_id
        } else {
            &self.title
        }
    }
}

/// Request body for creating or continuing a chat.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OutgoingMessage {
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<Table>,
}

impl OutgoingMessage {
    pub fn compose(text: &str, table: Option<Table>) -> Self {
        Self {
            content: text.trim().to_string(),
            file: table.filter(|table| !table.is_empty()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.content.trim().is_empty() && self.file.as_ref().is_none_or(Table::is_empty)
    }
}

mod timestamp {
    use chrono::{DateTime, TimeZone, Utc};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Seconds(i64),
        Fractional(f64),
    }

    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        value.as_ref().map(|ts| ts.to_rfc3339()).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let raw = Option::<Raw>::deserialize(deserializer)?;
        Ok(raw.and_then(|raw| match raw {
            Raw::Text(text) => DateTime::parse_from_rfc3339(&text)
                .map(|ts| ts.with_timezone(&Utc))
                .ok(),
            Raw::Seconds(secs) => Utc.timestamp_opt(secs, 0).single(),
            Raw::Fractional(secs) => DateTime::from_timestamp_millis((secs * 1000.0) as i64),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::{ChatSession, ChatSummary, Message, OutgoingMessage, Role};
    use crate::table::Table;
    use serde_json::json;

    #[test]
    fn role_keeps_unknown_senders() {
        let message: Message = serde_json::from_value(json!({
            "message_id": "m1",
            "role": "cnn",
            "results": {"prediction_label": "anemia", "accuracy": 91.5}
        }))
        .expect("message should parse");

        assert_eq!(message.role, Role::Other("cnn".to_string()));
        assert_eq!(message.role.as_str(), "cnn");
        assert_eq!(
            message.results.map(|r| r.prediction_label).as_deref(),
            Some("anemia")
        );
    }

    #[test]
    fn chat_session_parses_server_payload() {
        let chat: ChatSession = serde_json::from_value(json!({
            "chat_id": "abc123",
            "title": "Ferritin",
            "dts": 1734000000,
            "messages": [
                {"message_id": "1", "role": "user", "content": "What does high ferritin mean?",
                 "file_path": "files/abc123/1.csv"},
                {"message_id": "2", "role": "assistant", "content": "It can indicate...",
                 "timestamp": "2024-12-12T10:00:00Z"},
                {"message_id": "3", "role": "assistant", "timestamp": 1734000000}
            ]
        }))
        .expect("chat should parse");

        assert_eq!(chat.chat_id.as_deref(), Some("abc123"));
        assert_eq!(chat.messages.len(), 3);
        assert!(chat.messages[1].timestamp.is_some());
        assert!(chat.messages[2].timestamp.is_some());
        assert_eq!(chat.file_paths().collect::<Vec<_>>(), ["files/abc123/1.csv"]);
    }

    #[test]
    fn summary_ignores_message_bodies() {
        let summary: ChatSummary = serde_json::from_value(json!({
            "chat_id": "abc123",
            "title": "",
            "messages": [{"role": "user"}]
        }))
        .expect("summary should parse");

        assert_eq!(summary.label(), "abc123");
    }

    #[test]
    fn outgoing_message_emptiness() {
        assert!(OutgoingMessage::compose("   ", None).is_empty());
        assert!(OutgoingMessage::compose("", Some(Table::default())).is_empty());

        let table = Table {
            columns: vec!["Ferritin".to_string()],
            rows: vec![vec!["250".to_string()]],
        };
        assert!(!OutgoingMessage::compose("", Some(table)).is_empty());
        assert!(!OutgoingMessage::compose("hi", None).is_empty());
    }

    #[test]
    fn outgoing_message_omits_missing_file() {
        let body = serde_json::to_value(OutgoingMessage::compose(" hello ", None))
            .expect("body should serialize");
        assert_eq!(body, json!({"content": "hello"}));
    }

    #[test]
    fn provisional_message_is_a_fresh_user_message() {
        let outgoing = OutgoingMessage::compose("hello", None);
        let first = Message::provisional(&outgoing);
        let second = Message::provisional(&outgoing);

        assert_eq!(first.role, Role::User);
        assert_eq!(first.content.as_deref(), Some("hello"));
        assert_ne!(first.message_id, second.message_id);
    }
}
