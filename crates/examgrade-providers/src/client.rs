//! Per-model client selection.

use async_trait::async_trait;

use examgrade_core::error::{GradeError, ModelConfigError};
use examgrade_core::model::ModelSpec;
use examgrade_core::traits::{ResponseGenerator, ResponseStream};

use crate::config::GraderConfig;
use crate::ollama::OllamaClient;
use crate::openai::OpenAiClient;

/// A model client, chosen once per [`ModelSpec`].
pub enum ModelClient {
    /// Served by the local Ollama instance.
    Local(OllamaClient),
    /// Served by an OpenAI-compatible API.
    External(OpenAiClient),
}

impl ModelClient {
    /// Pick the backend for `spec`.
    ///
    /// External specs, and half-configured ones, go to the OpenAI-compatible
    /// client; the latter fail its validation naming the missing half. Stores
    /// refuse half-configured specs, so those never reach a run.
    pub fn from_spec(spec: ModelSpec, config: &GraderConfig) -> Self {
        if spec.is_external() || spec.is_half_configured() {
            ModelClient::External(OpenAiClient::new(spec, config.request_timeout_secs))
        } else {
            ModelClient::Local(OllamaClient::new(
                spec,
                &config.ollama_url,
                config.request_timeout_secs,
            ))
        }
    }

    pub fn is_external(&self) -> bool {
        matches!(self, ModelClient::External(_))
    }

    fn inner(&self) -> &dyn ResponseGenerator {
        match self {
            ModelClient::Local(client) => client,
            ModelClient::External(client) => client,
        }
    }
}

#[async_trait]
impl ResponseGenerator for ModelClient {
    fn spec(&self) -> &ModelSpec {
        self.inner().spec()
    }

    async fn validate(&self) -> Result<(), ModelConfigError> {
        self.inner().validate().await
    }

    async fn generate_response(&self, prompt: &str) -> Result<ResponseStream, GradeError> {
        self.inner().generate_response(prompt).await
    }
}

/// Basic URL syntax check: absolute http(s) URL with a host.
pub(crate) fn is_valid_url(raw: &str) -> bool {
    match url::Url::parse(raw) {
        Ok(url) => matches!(url.scheme(), "http" | "https") && url.host().is_some(),
        Err(_) => false,
    }
}
