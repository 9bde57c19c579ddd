use crate::session::{ChatSession, ChatSummary, OutgoingMessage};
use crate::table::Table;
use async_trait::async_trait;
use thiserror::Error;

pub mod dispatch;
#[cfg(test)]
pub mod fake;
pub mod http;

pub use dispatch::{Command, Dispatcher};
pub use http::HttpChatApi;

pub const SESSION_HEADER: &str = "X-Session-ID";

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(#[source] reqwest::Error),
    #[error("request timed out")]
    Timeout,
    #[error("server responded with {status}: {body}")]
    Status { status: u16, body: String },
    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("invalid request url: {0}")]
    InvalidUrl(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Offline,
    Timeout,
    Server,
    Protocol,
}

impl TransportError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Network(_) => ErrorKind::Offline,
            Self::Timeout => ErrorKind::Timeout,
            Self::Status { .. } => ErrorKind::Server,
            Self::Decode(_) | Self::Malformed(_) | Self::InvalidUrl(_) => ErrorKind::Protocol,
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Network(err)
        }
    }
}

/// Remote chat API, one call per operation and no retries.
#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn list_chats(&self, model: &str, limit: usize)
        -> Result<Vec<ChatSummary>, TransportError>;

    async fn get_chat(&self, model: &str, chat_id: &str) -> Result<ChatSession, TransportError>;

    async fn start_chat(
        &self,
        model: &str,
        message: &OutgoingMessage,
    ) -> Result<ChatSession, TransportError>;

    async fn continue_chat(
        &self,
        model: &str,
        chat_id: &str,
        message: &OutgoingMessage,
    ) -> Result<ChatSession, TransportError>;

    async fn get_chat_file(&self, model: &str, file_path: &str) -> Result<Table, TransportError>;
}
