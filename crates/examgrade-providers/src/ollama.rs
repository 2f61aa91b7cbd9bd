//! Ollama (local model) client.

use async_trait::async_trait;
use futures::future;
use futures::stream::{StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::instrument;

use examgrade_core::error::{GradeError, ModelConfigError};
use examgrade_core::model::ModelSpec;
use examgrade_core::think::filter_think_tags;
use examgrade_core::traits::{ResponseGenerator, ResponseStream};

use crate::error::{transport_error, ProviderError};
use crate::stream::body_lines;

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";
pub const DEFAULT_TIMEOUT_SECS: u64 = 300; // Local models are slower

/// Client for one model served by a local Ollama instance.
pub struct OllamaClient {
    spec: ModelSpec,
    base_url: String,
    timeout_secs: u64,
    client: reqwest::Client,
    validated: OnceCell<()>,
}

impl OllamaClient {
    pub fn new(spec: ModelSpec, base_url: &str, timeout_secs: u64) -> Self {
        let base = if base_url.is_empty() {
            DEFAULT_BASE_URL
        } else {
            base_url
        };

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .expect("failed to build HTTP client");

        Self {
            spec,
            base_url: base.trim_end_matches('/').to_string(),
            timeout_secs,
            client,
            validated: OnceCell::new(),
        }
    }

    fn check(&self) -> Result<(), ModelConfigError> {
        let mut problems = Vec::new();
        if self.spec.description.trim().is_empty() {
            problems.push("Model name (description) is required".to_string());
        }
        if !crate::client::is_valid_url(&self.base_url) {
            problems.push(format!("Ollama URL is not valid: {}", self.base_url));
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ModelConfigError { problems })
        }
    }

    fn unreachable(&self) -> ProviderError {
        ProviderError::NetworkError(format!(
            "Ollama not reachable at {}. Is it running? Start with: ollama serve",
            self.base_url
        ))
    }

    /// Start a streamed chat and return the raw content chunks.
    #[instrument(skip(self, prompt), fields(model = %self.spec.description))]
    async fn stream_chat(
        &self,
        prompt: &str,
    ) -> Result<futures::stream::BoxStream<'static, Result<String, ProviderError>>, ProviderError>
    {
        let body = OllamaRequest {
            model: &self.spec.description,
            messages: vec![OllamaMessage {
                role: "user",
                content: prompt,
            }],
            stream: true,
        };

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    self.unreachable()
                } else {
                    transport_error(e, self.timeout_secs)
                }
            })?;

        let status = response.status().as_u16();
        if status == 404 {
            return Err(ProviderError::ModelNotFound(format!(
                "Model '{}' not found locally. Pull it with: ollama pull {}",
                self.spec.description, self.spec.description
            )));
        }
        if status >= 400 {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::ApiError {
                status,
                message: body,
            });
        }

        Ok(body_lines(response, self.timeout_secs)
            .try_filter_map(|line| future::ready(chunk_content(&line)))
            .boxed())
    }

    /// Names of the models pulled into this Ollama instance.
    pub async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await
            .map_err(|_| self.unreachable())?;

        let tags: OllamaTagsResponse =
            response.json().await.map_err(|e| ProviderError::ApiError {
                status: 0,
                message: format!("failed to parse tags response: {e}"),
            })?;

        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    messages: Vec<OllamaMessage<'a>>,
    stream: bool,
}

#[derive(Serialize)]
struct OllamaMessage<'a> {
    role: &'a str,
    content: &'a str,
}

/// One line of a streamed `/api/chat` response.
#[derive(Deserialize)]
struct OllamaChunk {
    #[serde(default)]
    message: Option<OllamaChunkMessage>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct OllamaChunkMessage {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct OllamaTagsResponse {
    models: Vec<OllamaModelEntry>,
}

#[derive(Deserialize)]
struct OllamaModelEntry {
    name: String,
}

/// Content carried by one NDJSON line, if any.
fn chunk_content(line: &str) -> Result<Option<String>, ProviderError> {
    if line.trim().is_empty() {
        return Ok(None);
    }
    let chunk: OllamaChunk = serde_json::from_str(line)
        .map_err(|e| ProviderError::MalformedStream(format!("{e}: {line}")))?;
    if let Some(error) = chunk.error {
        return Err(ProviderError::ApiError {
            status: 200,
            message: error,
        });
    }
    Ok(chunk
        .message
        .map(|m| m.content)
        .filter(|content| !content.is_empty()))
}

#[async_trait]
impl ResponseGenerator for OllamaClient {
    fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    async fn validate(&self) -> Result<(), ModelConfigError> {
        self.validated
            .get_or_try_init(|| async { self.check() })
            .await
            .map(|_| ())
    }

    async fn generate_response(&self, prompt: &str) -> Result<ResponseStream, GradeError> {
        self.validate().await?;
        let raw = self.stream_chat(prompt).await?;
        Ok(filter_think_tags(raw.map_err(GradeError::from).boxed()))
    }
}
