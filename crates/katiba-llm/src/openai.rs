//! OpenAI-compatible chat-completions client.
//!
//! Any server exposing `POST {base_url}/chat/completions` with the OpenAI
//! request and response shapes works: OpenAI itself, Azure-style proxies,
//! local runtimes.

use crate::generator::Generator;
use katiba_core::config::{LlmConfig, OPENAI_BASE_URL};
use katiba_core::error::{KatibaError, Result, is_timeout};
use katiba_core::prompt::{LlmResponse, Prompt};
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::{Duration, Instant};
use tracing::{debug, instrument};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Request body for a single-turn chat completion.
#[must_use]
pub fn format_completions_request(model: &str, prompt: &str) -> Value {
    json!({
        "model": model,
        "messages": [{"role": "user", "content": prompt}],
    })
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Deserialize)]
struct Message {
    content: Option<String>,
}

/// Chat-completions client with bearer auth and a per-request deadline.
#[derive(Debug)]
pub struct OpenAiCompatibleLlm {
    agent: ureq::Agent,
    model_name: String,
    api_key: String,
    base_url: String,
    timeout: Duration,
}

impl OpenAiCompatibleLlm {
    #[must_use]
    pub fn new(model_name: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self::with_base_url(model_name, api_key, OPENAI_BASE_URL)
    }

    #[must_use]
    pub fn with_base_url(
        model_name: impl Into<String>,
        api_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            agent: build_agent(DEFAULT_TIMEOUT),
            model_name: model_name.into(),
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.agent = build_agent(timeout);
        self.timeout = timeout;
        self
    }

    /// Build a client from `[llm]` settings.
    ///
    /// # Errors
    ///
    /// Returns [`KatibaError::Generation`] when the model name or API key is
    /// missing.
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let model_name = config
            .model_name
            .as_deref()
            .filter(|m| !m.is_empty())
            .ok_or_else(|| {
                KatibaError::Generation("no model configured; set LLM_MODEL_NAME".into())
            })?;
        let api_key = config
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                KatibaError::Generation("no API key configured; set LLM_API_KEY".into())
            })?;
        Ok(Self::with_base_url(model_name, api_key, config.base_url.as_str())
            .timeout(config.timeout()))
    }

    #[must_use]
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn timeout_error(&self) -> KatibaError {
        KatibaError::Timeout {
            operation: "chat completion",
            waited: self.timeout,
        }
    }

    fn map_error(&self, err: ureq::Error) -> KatibaError {
        if is_timeout(&err) {
            return self.timeout_error();
        }
        match err {
            ureq::Error::Status(code, response) => {
                let body = response.into_string().unwrap_or_default();
                KatibaError::Generation(format!(
                    "{} returned HTTP {code}: {}",
                    self.endpoint(),
                    body.trim()
                ))
            }
            ureq::Error::Transport(transport) => KatibaError::Generation(format!(
                "request to {} failed: {transport}",
                self.endpoint()
            )),
        }
    }
}

impl Generator for OpenAiCompatibleLlm {
    #[instrument(skip_all, fields(model = %self.model_name))]
    fn generate(&self, prompt: &Prompt) -> Result<LlmResponse> {
        let started = Instant::now();
        let body = format_completions_request(&self.model_name, &prompt.to_string());

        let response = self
            .agent
            .post(&self.endpoint())
            .set("Authorization", &format!("Bearer {}", self.api_key))
            .set("Content-Type", "application/json")
            .send_json(body)
            .map_err(|err| self.map_error(err))?;

        let parsed: CompletionResponse = response.into_json().map_err(|err| {
            if is_timeout(&err) {
                self.timeout_error()
            } else {
                KatibaError::Generation(format!("malformed completion response: {err}"))
            }
        })?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| KatibaError::Generation("completion response had no content".into()))?;

        debug!(
            elapsed_ms = started.elapsed().as_millis(),
            chars = text.len(),
            "completion received"
        );
        Ok(LlmResponse::new(text))
    }
}

fn build_agent(timeout: Duration) -> ureq::Agent {
    ureq::AgentBuilder::new().timeout(timeout).build()
}
