use thiserror::Error;
use url::Url;

pub const DEFAULT_MODEL: &str = "llm-rag";
const LINK_PREFIX: &str = "bloodwise://chat";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouteError {
    #[error("not a bloodwise chat link: {0}")]
    Scheme(String),
    #[error("invalid link: {0}")]
    Parse(String),
}

/// Resumable location of the chat view: the model and, once created, the
/// chat id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub model: String,
    pub chat_id: Option<String>,
}

impl Default for Route {
    fn default() -> Self {
        Self::new(DEFAULT_MODEL, None)
    }
}

impl Route {
    pub fn new(model: impl Into<String>, chat_id: Option<String>) -> Self {
        let model = model.into();
        let model = if model.trim().is_empty() {
            DEFAULT_MODEL.to_string()
        } else {
            model
        };
        Self {
            model,
            chat_id: chat_id.filter(|id| !id.trim().is_empty()),
        }
    }

    pub fn parse(link: &str) -> Result<Self, RouteError> {
        let url = Url::parse(link.trim()).map_err(|err| RouteError::Parse(err.to_string()))?;
        if url.scheme() != "bloodwise" || url.host_str() != Some("chat") {
            return Err(RouteError::Scheme(link.to_string()));
        }

        let mut model = None;
        let mut chat_id = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "model" => model = Some(value.into_owned()),
                "id" => chat_id = Some(value.into_owned()),
                _ => {}
            }
        }

        Ok(Self::new(model.unwrap_or_default(), chat_id))
    }

    pub fn to_link(&self) -> String {
        let mut link = format!("{LINK_PREFIX}?");
        let mut query = url::form_urlencoded::Serializer::new(String::new());
        query.append_pair("model", &self.model);
        if let Some(chat_id) = &self.chat_id {
            query.append_pair("id", chat_id);
        }
        link.push_str(&query.finish());
        link
    }
}

#[cfg(test)]
mod tests {
    use super::{Route, RouteError, DEFAULT_MODEL};

    #[test]
    fn link_round_trips_model_and_chat() {
        let route = Route::new("llm-rag", Some("abc 123".to_string()));
        let link = route.to_link();

        assert_eq!(link, "bloodwise://chat?model=llm-rag&id=abc+123");
        assert_eq!(Route::parse(&link), Ok(route));
    }

    #[test]
    fn missing_model_falls_back_to_default() {
        let route = Route::parse("bloodwise://chat?id=xyz").expect("link should parse");
        assert_eq!(route.model, DEFAULT_MODEL);
        assert_eq!(route.chat_id.as_deref(), Some("xyz"));
    }

    #[test]
    fn new_chat_link_has_no_id() {
        let route = Route::new("llm-cnn", None);
        assert_eq!(route.to_link(), "bloodwise://chat?model=llm-cnn");
        assert_eq!(Route::parse(&route.to_link()).expect("parse").chat_id, None);
    }

    #[test]
    fn foreign_links_are_rejected() {
        assert!(matches!(
            Route::parse("https://example.com/chat?model=x"),
            Err(RouteError::Scheme(_))
        ));
        assert!(matches!(Route::parse("not a link"), Err(RouteError::Parse(_))));
    }
}
