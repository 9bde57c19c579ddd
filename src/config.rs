use crate::nav::{Route, RouteError, DEFAULT_MODEL};
use crate::protocol::ContinueFailurePolicy;
use clap::Parser;
use std::time::Duration;

/// Desktop client for the Bloodwise chat service.
#[derive(Debug, Clone, Parser)]
#[command(name = "bloodwise", version, about)]
pub struct Config {
    /// Base URL of the chat service.
    #[arg(long, env = "BLOODWISE_API_URL", default_value = "http://localhost:9000")]
    pub base_url: String,

    /// Model namespace to open.
    #[arg(long, env = "BLOODWISE_MODEL", default_value = DEFAULT_MODEL)]
    pub model: String,

    /// Models offered by the model selector.
    #[arg(
        long,
        env = "BLOODWISE_MODELS",
        value_delimiter = ',',
        default_value = DEFAULT_MODEL
    )]
    pub models: Vec<String>,

    /// Chat to resume on startup.
    #[arg(long)]
    pub chat_id: Option<String>,

    /// Resumable `bloodwise://chat?...` link; takes precedence over
    /// `--model` and `--chat-id`.
    #[arg(long)]
    pub link: Option<String>,

    #[arg(long, default_value_t = 20)]
    pub history_limit: usize,

    /// Per-request timeout.
    #[arg(long, default_value_t = 120)]
    pub timeout_secs: u64,

    /// Client session identifier sent as `X-Session-ID`. A persisted one is
    /// used when omitted.
    #[arg(long, env = "BLOODWISE_SESSION_ID")]
    pub session_id: Option<String>,

    /// On a failed send to an existing chat, clear the transcript instead of
    /// restoring the last confirmed one.
    #[arg(long)]
    pub discard_on_failure: bool,
}

impl Config {
    pub fn route(&self) -> Result<Route, RouteError> {
        match &self.link {
            Some(link) => Route::parse(link),
            None => Ok(Route::new(self.model.clone(), self.chat_id.clone())),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    pub fn policy(&self) -> ContinueFailurePolicy {
        if self.discard_on_failure {
            ContinueFailurePolicy::Discard
        } else {
            ContinueFailurePolicy::Restore
        }
    }

    /// Selector entries: configured models plus the active one, deduplicated
    /// and in configured order.
    pub fn model_choices(&self, active: &str) -> Vec<String> {
        let mut choices: Vec<String> = Vec::new();
        for model in self.models.iter().map(|model| model.trim()) {
            if !model.is_empty() && !choices.iter().any(|known| known == model) {
                choices.push(model.to_string());
            }
        }
        if !choices.iter().any(|known| known == active) {
            choices.push(active.to_string());
        }
        choices
    }
}

#[cfg(test)]
mod tests {
    use super::Config;
    use crate::protocol::ContinueFailurePolicy;
    use clap::Parser;
    use std::time::Duration;

    #[test]
    fn defaults_open_a_new_llm_rag_chat() {
        let config = Config::try_parse_from(["bloodwise"]).expect("defaults should parse");
        let route = config.route().expect("route");

        assert_eq!(route.model, "llm-rag");
        assert_eq!(route.chat_id, None);
        assert_eq!(config.history_limit, 20);
        assert_eq!(config.timeout(), Duration::from_secs(120));
        assert_eq!(config.policy(), ContinueFailurePolicy::Restore);
    }

    #[test]
    fn link_overrides_model_and_chat_id() {
        let config = Config::try_parse_from([
            "bloodwise",
            "--model",
            "llm-cnn",
            "--chat-id",
            "ignored",
            "--link",
            "bloodwise://chat?model=llm-rag&id=abc123",
        ])
        .expect("args should parse");
        let route = config.route().expect("route");

        assert_eq!(route.model, "llm-rag");
        assert_eq!(route.chat_id.as_deref(), Some("abc123"));
    }

    #[test]
    fn model_list_is_split_and_deduplicated() {
        let config = Config::try_parse_from([
            "bloodwise",
            "--models",
            "llm-rag, llm-cnn,llm-rag",
            "--discard-on-failure",
        ])
        .expect("args should parse");

        assert_eq!(config.model_choices("llm-rag"), ["llm-rag", "llm-cnn"]);
        assert_eq!(
            config.model_choices("custom"),
            ["llm-rag", "llm-cnn", "custom"]
        );
        assert_eq!(config.policy(), ContinueFailurePolicy::Discard);
    }

    #[test]
    fn bad_link_is_reported() {
        let config = Config::try_parse_from(["bloodwise", "--link", "https://example.com"])
            .expect("args should parse");
        assert!(config.route().is_err());
    }
}
