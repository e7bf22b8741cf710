//! Remote embeddings through an OpenAI-compatible `/embeddings` endpoint.

use super::embed::Embedder;
use katiba_core::error::{KatibaError, Result, is_timeout};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Settings for [`ApiEmbedder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiEmbedderConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub dimension: usize,
    pub timeout: Duration,
}

/// Embeds text by POSTing `{model, input}` to `{base_url}/embeddings`.
///
/// Models that accept a requested output width (OpenAI's
/// `text-embedding-3-*`) are also sent `dimensions`, so their vectors match
/// the configured dimension instead of the model's native width.
#[derive(Debug)]
pub struct ApiEmbedder {
    agent: ureq::Agent,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    model_id: String,
    dimension: usize,
    timeout: Duration,
}

#[derive(Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

/// Whether `model` can shorten its embeddings to a requested width.
#[must_use]
pub fn accepts_dimensions(model: &str) -> bool {
    model.starts_with("text-embedding-3")
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

impl ApiEmbedder {
    #[must_use]
    pub fn new(config: ApiEmbedderConfig) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(config.timeout).build();
        Self {
            agent,
            endpoint: format!("{}/embeddings", config.base_url.trim_end_matches('/')),
            api_key: config.api_key,
            model_id: format!("api:{}", config.model),
            model: config.model,
            dimension: config.dimension,
            timeout: config.timeout,
        }
    }

    fn map_error(&self, err: ureq::Error) -> KatibaError {
        if is_timeout(&err) {
            return KatibaError::Timeout {
                operation: "embedding request",
                waited: self.timeout,
            };
        }
        match err {
            ureq::Error::Status(code, response) => {
                let body = response.into_string().unwrap_or_default();
                KatibaError::EmbeddingModel(format!(
                    "{} returned HTTP {code}: {}",
                    self.endpoint,
                    body.trim()
                ))
            }
            ureq::Error::Transport(transport) => KatibaError::EmbeddingModel(format!(
                "request to {} failed: {transport}",
                self.endpoint
            )),
        }
    }
}

impl Embedder for ApiEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut request = self
            .agent
            .post(&self.endpoint)
            .set("Content-Type", "application/json");
        if let Some(key) = &self.api_key {
            request = request.set("Authorization", &format!("Bearer {key}"));
        }

        debug!(endpoint = %self.endpoint, inputs = texts.len(), "requesting embeddings");
        let response = request
            .send_json(EmbeddingsRequest {
                model: &self.model,
                input: texts,
                dimensions: accepts_dimensions(&self.model).then_some(self.dimension),
            })
            .map_err(|err| self.map_error(err))?;

        let mut parsed: EmbeddingsResponse = response.into_json().map_err(|err| {
            if is_timeout(&err) {
                KatibaError::Timeout {
                    operation: "embedding request",
                    waited: self.timeout,
                }
            } else {
                KatibaError::EmbeddingModel(format!("malformed embeddings response: {err}"))
            }
        })?;

        if parsed.data.len() != texts.len() {
            return Err(KatibaError::EmbeddingModel(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                parsed.data.len()
            )));
        }
        parsed.data.sort_by_key(|datum| datum.index);

        Ok(parsed.data.into_iter().map(|datum| datum.embedding).collect())
    }
}
