use crate::session::{ChatSession, ChatSummary, OutgoingMessage};
use crate::table::Table;
use crate::transport::{ChatApi, TransportError, SESSION_HEADER};
use async_trait::async_trait;
use reqwest::{header, Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;
use url::Url;

/// `ChatApi` over HTTP. Paths are `{base}/{model}/...`.
#[derive(Debug, Clone)]
pub struct HttpChatApi {
    client: Client,
    base_url: Url,
    session_id: Option<String>,
}

impl HttpChatApi {
    pub fn new(
        base_url: &str,
        session_id: Option<String>,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let base_url =
            Url::parse(base_url).map_err(|err| TransportError::InvalidUrl(err.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(TransportError::InvalidUrl(base_url.to_string()));
        }

        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url,
            session_id,
        })
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    fn endpoint<I>(&self, segments: I) -> Result<Url, TransportError>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| TransportError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        tracing::debug!(%method, %url, "chat api request");
        let builder = self.client.request(method, url);
        match &self.session_id {
            Some(session_id) => builder.header(SESSION_HEADER, session_id),
            None => builder,
        }
    }

    async fn execute(&self, builder: RequestBuilder) -> Result<Response, TransportError> {
        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), "chat api returned an error status");
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn fetch_json<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
    ) -> Result<T, TransportError> {
        let text = self.execute(builder).await?.text().await?;
        tracing::trace!("response: {text}");
        serde_json::from_str(&text).map_err(Into::into)
    }
}

fn require_chat_id(chat: ChatSession) -> Result<ChatSession, TransportError> {
    match chat.chat_id.as_deref() {
        Some(id) if !id.is_empty() => Ok(chat),
        _ => Err(TransportError::Malformed(
            "chat response is missing chat_id".to_string(),
        )),
    }
}

#[async_trait]
impl ChatApi for HttpChatApi {
    async fn list_chats(
        &self,
        model: &str,
        limit: usize,
    ) -> Result<Vec<ChatSummary>, TransportError> {
        let mut url = self.endpoint([model, "chats"])?;
        url.query_pairs_mut().append_pair("limit", &limit.to_string());
        self.fetch_json(self.request(Method::GET, url)).await
    }

    async fn get_chat(&self, model: &str, chat_id: &str) -> Result<ChatSession, TransportError> {
        let url = self.endpoint([model, "chats", chat_id])?;
        self.fetch_json(self.request(Method::GET, url)).await
    }

    async fn start_chat(
        &self,
        model: &str,
        message: &OutgoingMessage,
    ) -> Result<ChatSession, TransportError> {
        let url = self.endpoint([model, "chats"])?;
        let chat = self
            .fetch_json(self.request(Method::POST, url).json(message))
            .await?;
        require_chat_id(chat)
    }

    async fn continue_chat(
        &self,
        model: &str,
        chat_id: &str,
        message: &OutgoingMessage,
    ) -> Result<ChatSession, TransportError> {
        let url = self.endpoint([model, "chats", chat_id])?;
        self.fetch_json(self.request(Method::POST, url).json(message))
            .await
    }

    async fn get_chat_file(&self, model: &str, file_path: &str) -> Result<Table, TransportError> {
        let segments = std::iter::once(model)
            .chain(file_path.split('/').filter(|segment| !segment.is_empty()));
        let url = self.endpoint(segments)?;
        let response = self.execute(self.request(Method::GET, url)).await?;

        let is_json = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.contains("json"));
        let bytes = response.bytes().await?;

        if is_json {
            Ok(serde_json::from_slice(&bytes)?)
        } else {
            Table::from_csv(&bytes).map_err(|err| TransportError::Malformed(err.to_string()))
        }
    }
}
