use crate::session::{ChatSession, ChatSummary, Message, OutgoingMessage, Role};
use crate::table::Table;
use crate::transport::{ChatApi, TransportError};
use async_trait::async_trait;
use std::sync::Mutex;

/// In-memory `ChatApi` that records every call.
#[derive(Default)]
pub struct FakeApi {
    calls: Mutex<Vec<String>>,
    fail: bool,
}

impl FakeApi {
    pub fn failing() -> Self {
        Self {
            calls: Mutex::default(),
            fail: true,
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }

    fn record(&self, call: String) -> Result<(), TransportError> {
        self.calls.lock().expect("calls lock").push(call);
        if self.fail {
            return Err(TransportError::Status {
                status: 500,
                body: "boom".to_string(),
            });
        }
        Ok(())
    }
}

pub fn server_chat(chat_id: &str, title: &str, user_text: &str) -> ChatSession {
    ChatSession {
        chat_id: Some(chat_id.to_string()),
        title: title.to_string(),
        messages: vec![
            Message {
                message_id: "server-1".to_string(),
                role: Role::User,
                content: Some(user_text.to_string()),
                file: None,
                file_path: None,
                timestamp: None,
                results: None,
            },
            Message {
                message_id: "server-2".to_string(),
                role: Role::Assistant,
                content: Some("Here is what that means.".to_string()),
                file: None,
                file_path: None,
                timestamp: None,
                results: None,
            },
        ],
        dts: Some(1),
    }
}

#[async_trait]
impl ChatApi for FakeApi {
    async fn list_chats(
        &self,
        model: &str,
        limit: usize,
    ) -> Result<Vec<ChatSummary>, TransportError> {
        self.record(format!("list {model} {limit}"))?;
        Ok(vec![ChatSummary {
            chat_id: "abc123".to_string(),
            title: "Ferritin".to_string(),
            dts: Some(1),
        }])
    }

    async fn get_chat(&self, model: &str, chat_id: &str) -> Result<ChatSession, TransportError> {
        self.record(format!("get {model} {chat_id}"))?;
        Ok(server_chat(chat_id, "Loaded", "earlier question"))
    }

    async fn start_chat(
        &self,
        model: &str,
        message: &OutgoingMessage,
    ) -> Result<ChatSession, TransportError> {
        self.record(format!("start {model} {}", message.content))?;
        Ok(server_chat("abc123", "Ferritin", &message.content))
    }

    async fn continue_chat(
        &self,
        model: &str,
        chat_id: &str,
        message: &OutgoingMessage,
    ) -> Result<ChatSession, TransportError> {
        self.record(format!("continue {model} {chat_id} {}", message.content))?;
        Ok(server_chat(chat_id, "Ferritin", &message.content))
    }

    async fn get_chat_file(&self, model: &str, file_path: &str) -> Result<Table, TransportError> {
        self.record(format!("file {model} {file_path}"))?;
        Ok(Table {
            columns: vec!["Ferritin".to_string()],
            rows: vec![vec!["250".to_string()]],
        })
    }
}
