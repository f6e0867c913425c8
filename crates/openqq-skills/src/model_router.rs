//! Model Router: sends a prompt to an OpenAI-compatible chat-completions endpoint (live) or
//! answers deterministically offline (mock), and reports any failure as a degraded completion.

use openqq_core::{Completion, CoreConfig, LlmModeSetting, TextGenerator};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const SKILL_NAME: &str = "ModelRouter";
const ENV_API_KEY: &str = "OPENAI_API_KEY";

/// Mode for LLM invocation: mock (returns simulated generation) or live (calls the external API).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LlmMode {
    Mock,
    #[default]
    Live,
}

impl From<LlmModeSetting> for LlmMode {
    fn from(setting: LlmModeSetting) -> Self {
        match setting {
            LlmModeSetting::Live => LlmMode::Live,
            LlmModeSetting::Mock => LlmMode::Mock,
        }
    }
}

/// Failures of a single live completion call.
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("{0} is not set")]
    MissingApiKey(String),
    #[error("{0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected response format: {0}")]
    BadResponse(String),
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Routes a prompt to a mock LLM or a live OpenAI-compatible API.
///
/// The API key is read from the environment on every live call, so the process can start
/// without one; the first fallback then degrades instead of failing start-up.
pub struct ModelRouter {
    mode: LlmMode,
    base_url: String,
    model: String,
    api_key_env: String,
    client: reqwest::Client,
}

impl ModelRouter {
    /// Live router against `base_url` (e.g. `https://api.openai.com`) using `model`.
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            mode: LlmMode::Live,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key_env: ENV_API_KEY.to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn from_config(config: &CoreConfig) -> Self {
        Self::new(&config.llm_api_url, &config.llm_model).with_mode(config.llm_mode.into())
    }

    pub fn with_mode(mut self, mode: LlmMode) -> Self {
        self.mode = mode;
        self
    }

    /// Reads the API key from `name` instead of `OPENAI_API_KEY`.
    pub fn with_api_key_env(mut self, name: impl Into<String>) -> Self {
        self.api_key_env = name.into();
        self
    }

    pub fn mode(&self) -> LlmMode {
        self.mode
    }

    /// Mock LLM: returns a deterministic "generated" response based on the prompt.
    fn mock_generate(&self, prompt: &str) -> String {
        let preview: String = prompt.chars().take(80).collect();
        let ellipsis = if prompt.chars().count() > 80 { "…" } else { "" };
        format!(
            "[Generated – Mock LLM] No knowledge base entry matched \"{}{}\". Set llm_mode = \"live\" and OPENAI_API_KEY to query {}.",
            preview, ellipsis, self.model
        )
    }

    async fn live_generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let key = std::env::var(&self.api_key_env)
            .ok()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| GenerationError::MissingApiKey(self.api_key_env.clone()))?;

        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = ChatRequest {
            model: &self.model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response: ChatResponse = self
            .client
            .post(&url)
            .bearer_auth(key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let first = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| GenerationError::BadResponse("empty choices array".into()))?;
        first
            .message
            .content
            .ok_or_else(|| GenerationError::BadResponse("first choice has no content".into()))
    }
}

#[async_trait::async_trait]
impl TextGenerator for ModelRouter {
    fn name(&self) -> &str {
        SKILL_NAME
    }

    async fn complete(&self, prompt: &str) -> Completion {
        match self.mode {
            LlmMode::Mock => Completion::Text(self.mock_generate(prompt)),
            LlmMode::Live => match self.live_generate(prompt).await {
                Ok(text) => {
                    tracing::info!(
                        target: "openqq::llm",
                        model = %self.model,
                        chars = text.len(),
                        "completion received"
                    );
                    Completion::Text(text)
                }
                Err(e) => {
                    tracing::warn!(
                        target: "openqq::llm",
                        model = %self.model,
                        error = %e,
                        "completion failed"
                    );
                    Completion::Degraded {
                        reason: e.to_string(),
                    }
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};

    async fn spawn_stub(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    async fn echo_completion(
        headers: HeaderMap,
        Json(body): Json<serde_json::Value>,
    ) -> Result<Json<serde_json::Value>, StatusCode> {
        if headers.get("authorization").and_then(|v| v.to_str().ok()) != Some("Bearer test-key") {
            return Err(StatusCode::UNAUTHORIZED);
        }
        let prompt = body["messages"][0]["content"].as_str().unwrap_or_default();
        Ok(Json(serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": format!("{} -> 42", prompt) } }]
        })))
    }

    #[tokio::test]
    async fn live_mode_returns_first_choice() {
        std::env::set_var("OPENQQ_TEST_KEY_LIVE_OK", "test-key");
        let url = spawn_stub(Router::new().route("/v1/chat/completions", post(echo_completion))).await;
        let router = ModelRouter::new(url, "gpt-3.5-turbo").with_api_key_env("OPENQQ_TEST_KEY_LIVE_OK");
        assert_eq!(
            router.complete("quantum gravity").await,
            Completion::Text("quantum gravity -> 42".into())
        );
    }

    #[tokio::test]
    async fn auth_failure_degrades_with_detail() {
        std::env::set_var("OPENQQ_TEST_KEY_WRONG", "wrong-key");
        let url = spawn_stub(Router::new().route("/v1/chat/completions", post(echo_completion))).await;
        let router = ModelRouter::new(url, "gpt-3.5-turbo").with_api_key_env("OPENQQ_TEST_KEY_WRONG");
        match router.complete("hi").await {
            Completion::Degraded { reason } => assert!(reason.contains("401"), "{}", reason),
            other => panic!("expected degraded, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn missing_key_degrades_without_network() {
        let router = ModelRouter::new("http://127.0.0.1:9", "gpt-3.5-turbo")
            .with_api_key_env("OPENQQ_TEST_KEY_NEVER_SET");
        assert_eq!(
            router.complete("hi").await,
            Completion::Degraded {
                reason: "OPENQQ_TEST_KEY_NEVER_SET is not set".into()
            }
        );
    }

    #[tokio::test]
    async fn unreachable_service_degrades() {
        std::env::set_var("OPENQQ_TEST_KEY_UNREACHABLE", "test-key");
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let router = ModelRouter::new(format!("http://{}", addr), "gpt-3.5-turbo")
            .with_api_key_env("OPENQQ_TEST_KEY_UNREACHABLE");
        assert!(matches!(
            router.complete("hi").await,
            Completion::Degraded { .. }
        ));
    }

    #[tokio::test]
    async fn empty_choices_is_bad_response() {
        std::env::set_var("OPENQQ_TEST_KEY_EMPTY", "test-key");
        let app = Router::new().route(
            "/v1/chat/completions",
            post(|| async { Json(serde_json::json!({ "choices": [] })) }),
        );
        let url = spawn_stub(app).await;
        let router = ModelRouter::new(url, "m").with_api_key_env("OPENQQ_TEST_KEY_EMPTY");
        assert_eq!(
            router.complete("hi").await,
            Completion::Degraded {
                reason: "unexpected response format: empty choices array".into()
            }
        );
    }

    #[tokio::test]
    async fn null_content_is_reported_separately() {
        std::env::set_var("OPENQQ_TEST_KEY_NULL_CONTENT", "test-key");
        let app = Router::new().route(
            "/v1/chat/completions",
            post(|| async {
                Json(serde_json::json!({
                    "choices": [{ "message": { "role": "assistant", "content": null } }]
                }))
            }),
        );
        let url = spawn_stub(app).await;
        let router = ModelRouter::new(url, "m").with_api_key_env("OPENQQ_TEST_KEY_NULL_CONTENT");
        assert_eq!(
            router.complete("hi").await,
            Completion::Degraded {
                reason: "unexpected response format: first choice has no content".into()
            }
        );
    }

    #[tokio::test]
    async fn mock_mode_is_deterministic_and_offline() {
        let router = ModelRouter::new("http://127.0.0.1:9", "gpt-3.5-turbo").with_mode(LlmMode::Mock);
        let a = router.complete("quantum gravity").await;
        let b = router.complete("quantum gravity").await;
        assert_eq!(a, b);
        match a {
            Completion::Text(t) => assert!(t.contains("quantum gravity")),
            other => panic!("expected text, got {:?}", other),
        }
    }

    #[test]
    fn from_config_follows_mode_setting() {
        let config = CoreConfig {
            llm_mode: LlmModeSetting::Mock,
            llm_api_url: "https://api.example.com/".into(),
            ..CoreConfig::default()
        };
        let router = ModelRouter::from_config(&config);
        assert_eq!(router.mode(), LlmMode::Mock);
        assert_eq!(router.base_url, "https://api.example.com");
    }
}
