//! OpenAI-compatible API client for external models.

use async_trait::async_trait;
use futures::future;
use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::instrument;

use examgrade_core::error::{GradeError, ModelConfigError};
use examgrade_core::model::ModelSpec;
use examgrade_core::think::filter_think_tags;
use examgrade_core::traits::{ResponseGenerator, ResponseStream};

use crate::error::{transport_error, ProviderError};
use crate::stream::body_lines;

/// Client for one model behind an OpenAI-compatible API.
///
/// Note: the API key lives in `spec`, whose Debug impl masks it.
pub struct OpenAiClient {
    spec: ModelSpec,
    timeout_secs: u64,
    client: reqwest::Client,
    validated: OnceCell<()>,
}

impl OpenAiClient {
    pub fn new(spec: ModelSpec, timeout_secs: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .expect("failed to build HTTP client");

        Self {
            spec,
            timeout_secs,
            client,
            validated: OnceCell::new(),
        }
    }

    fn base_url(&self) -> &str {
        self.spec
            .api_url
            .as_deref()
            .unwrap_or_default()
            .trim_end_matches('/')
    }

    fn api_key(&self) -> &str {
        self.spec.api_key.as_deref().unwrap_or_default()
    }

    /// Field checks, then the connectivity probe once those pass.
    async fn check(&self) -> Result<(), ModelConfigError> {
        let mut problems = Vec::new();

        if self.spec.description.trim().is_empty() {
            problems.push("Model name (description) is required".to_string());
        }
        match self.spec.api_url.as_deref().map(str::trim) {
            None | Some("") => problems.push("API URL is required for external models".to_string()),
            Some(url) if !crate::client::is_valid_url(url) => {
                problems.push("API URL is not valid".to_string())
            }
            Some(_) => {}
        }
        if self.api_key().trim().is_empty() {
            problems.push("API key is required for external models".to_string());
        }

        if problems.is_empty() {
            if let Err(problem) = self.probe().await {
                problems.push(problem);
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            tracing::warn!(model = %self.spec.description, "model validation failed");
            Err(ModelConfigError { problems })
        }
    }

    /// List the API's models to check connectivity, the key, and the model name.
    #[instrument(skip(self), fields(model = %self.spec.description))]
    async fn probe(&self) -> Result<(), String> {
        let response = self
            .client
            .get(format!("{}/models", self.base_url()))
            .bearer_auth(self.api_key())
            .send()
            .await
            .map_err(|e| {
                tracing::debug!("probe failed: {e}");
                format!("Failed to connect to the API at {}", self.base_url())
            })?;

        let status = response.status().as_u16();
        match status {
            401 | 403 => return Err("Invalid or unauthorized API key".to_string()),
            404 => return Err(self.not_found()),
            s if s >= 400 => {
                let body = response.text().await.unwrap_or_default();
                return Err(format!(
                    "Error trying to validate model: HTTP {status}: {body}"
                ));
            }
            _ => {}
        }

        match response.json::<ModelList>().await {
            Ok(list) if !list.data.is_empty() => {
                if list.data.iter().any(|m| m.id == self.spec.description) {
                    Ok(())
                } else {
                    Err(self.not_found())
                }
            }
            Ok(_) => Ok(()),
            Err(e) => {
                tracing::debug!("unrecognised model listing, skipping name check: {e}");
                Ok(())
            }
        }
    }

    fn not_found(&self) -> String {
        format!("Model '{}' not found on the API", self.spec.description)
    }

    /// Start a streamed chat completion and return the raw content deltas.
    #[instrument(skip(self, prompt), fields(model = %self.spec.description))]
    async fn stream_chat(
        &self,
        prompt: &str,
    ) -> Result<BoxStream<'static, Result<String, ProviderError>>, ProviderError> {
        let body = ChatRequest {
            model: &self.spec.description,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            stream: true,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url()))
            .bearer_auth(self.api_key())
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(e, self.timeout_secs))?;

        let status = response.status().as_u16();
        if status == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(5)
                * 1000;
            return Err(ProviderError::RateLimited {
                retry_after_ms: retry_after,
            });
        }
        if status == 401 || status == 403 {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::AuthenticationFailed(body));
        }
        if status == 404 {
            return Err(ProviderError::ModelNotFound(self.spec.description.clone()));
        }
        if status >= 400 {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::ApiError {
                status,
                message: body,
            });
        }

        Ok(body_lines(response, self.timeout_secs)
            .map(|line| line.and_then(|line| parse_sse_line(&line)))
            .try_take_while(|event| future::ready(Ok(!matches!(event, SseLine::Done))))
            .try_filter_map(|event| {
                future::ready(Ok(match event {
                    SseLine::Content(text) => Some(text),
                    SseLine::Skip | SseLine::Done => None,
                }))
            })
            .boxed())
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Deserialize)]
struct ModelEntry {
    id: String,
}

#[derive(Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Option<ChunkDelta>,
}

#[derive(Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, PartialEq)]
enum SseLine {
    Content(String),
    Skip,
    Done,
}

/// Classify one line of a chat completion event stream.
fn parse_sse_line(line: &str) -> Result<SseLine, ProviderError> {
    let Some(data) = line.strip_prefix("data:") else {
        // Blank separators, comments, and `event:` fields.
        return Ok(SseLine::Skip);
    };
    let data = data.trim();
    if data == "[DONE]" {
        return Ok(SseLine::Done);
    }

    let chunk: ChatChunk = serde_json::from_str(data)
        .map_err(|e| ProviderError::MalformedStream(format!("{e}: {data}")))?;
    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta)
        .and_then(|d| d.content)
        .filter(|content| !content.is_empty())
        .map_or(SseLine::Skip, SseLine::Content))
}

#[async_trait]
impl ResponseGenerator for OpenAiClient {
    fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    async fn validate(&self) -> Result<(), ModelConfigError> {
        self.validated
            .get_or_try_init(|| self.check())
            .await
            .map(|_| ())
    }

    async fn generate_response(&self, prompt: &str) -> Result<ResponseStream, GradeError> {
        self.validate().await?;
        let raw = self.stream_chat(prompt).await?;
        Ok(filter_think_tags(raw.map_err(GradeError::from).boxed()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn spec(server: &MockServer, model: &str) -> ModelSpec {
        ModelSpec::external(model, format!("{}/v1", server.uri()), "test-key", "ana")
    }

    fn sse(chunks: &[&str]) -> String {
        let mut body = String::new();
        for chunk in chunks {
            body.push_str("data: ");
            body.push_str(
                &serde_json::json!({
                    "id": "chatcmpl-1",
                    "object": "chat.completion.chunk",
                    "choices": [{"index": 0, "delta": {"content": chunk}}]
                })
                .to_string(),
            );
            body.push_str("\n\n");
        }
        body.push_str("data: [DONE]\n\n");
        body
    }

    async fn mount_models(server: &MockServer, ids: &[&str]) {
        let data: Vec<_> = ids
            .iter()
            .map(|id| serde_json::json!({"id": id, "object": "model"}))
            .collect();
        Mock::given(method("GET"))
            .and(path("/v1/models"))
            .and(header("Authorization", "Bearer test-key"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"object": "list", "data": data})),
            )
            .mount(server)
            .await;
    }

    async fn collect(client: &OpenAiClient, prompt: &str) -> Result<Vec<String>, GradeError> {
        client.generate_response(prompt).await?.try_collect().await
    }

    #[tokio::test]
    async fn streamed_answer() {
        let server = MockServer::start().await;
        mount_models(&server, &["gpt-4.1-mini", "gpt-4.1"]).await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("Authorization", "Bearer test-key"))
            .and(body_partial_json(serde_json::json!({
                "model": "gpt-4.1-mini",
                "stream": true,
                "messages": [{"role": "user", "content": "Capital of France?"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_string(sse(&["a", "\n", "because"])))
            .mount(&server)
            .await;

        let client = OpenAiClient::new(spec(&server, "gpt-4.1-mini"), 30);
        let lines = collect(&client, "Capital of France?").await.unwrap();
        assert_eq!(lines, vec!["a", "because"]);
    }

    #[tokio::test]
    async fn probe_runs_once_per_client() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/models"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": []})),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_string(sse(&["b"])))
            .expect(3)
            .mount(&server)
            .await;

        let client = OpenAiClient::new(spec(&server, "local-llm"), 30);
        for _ in 0..3 {
            assert_eq!(collect(&client, "q").await.unwrap(), vec!["b"]);
        }
    }

    #[tokio::test]
    async fn unauthorized_key() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/models"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string(sse(&["a"])))
            .expect(0)
            .mount(&server)
            .await;

        let client = OpenAiClient::new(spec(&server, "gpt-4.1"), 30);
        let err = client.validate().await.unwrap_err();
        assert_eq!(err.to_string(), "Model error: Invalid or unauthorized API key");
        assert!(matches!(
            collect(&client, "q").await,
            Err(GradeError::ModelConfig(_))
        ));
    }

    #[tokio::test]
    async fn model_missing_from_listing() {
        let server = MockServer::start().await;
        mount_models(&server, &["gpt-4.1"]).await;

        let client = OpenAiClient::new(spec(&server, "gpt-5-imaginary"), 30);
        let err = client.validate().await.unwrap_err();
        assert_eq!(
            err.problems,
            vec!["Model 'gpt-5-imaginary' not found on the API"]
        );
    }

    #[tokio::test]
    async fn connection_failure() {
        let client = OpenAiClient::new(
            ModelSpec::external("gpt-4.1", "http://127.0.0.1:9/v1", "key", "ana"),
            5,
        );
        let err = client.validate().await.unwrap_err();
        assert_eq!(
            err.problems,
            vec!["Failed to connect to the API at http://127.0.0.1:9/v1"]
        );
    }

    #[tokio::test]
    async fn field_problems_are_all_reported() {
        let client = OpenAiClient::new(ModelSpec::external("", "not a url", "", "ana"), 5);

        let err = client.validate().await.unwrap_err();
        assert_eq!(
            err.problems,
            vec![
                "Model name (description) is required",
                "API URL is not valid",
                "API key is required for external models",
            ]
        );
        assert_eq!(err.to_string().lines().count(), 3);
    }

    #[tokio::test]
    async fn server_error_during_generation() {
        let server = MockServer::start().await;
        mount_models(&server, &["gpt-4.1"]).await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("internal error"))
            .mount(&server)
            .await;

        let client = OpenAiClient::new(spec(&server, "gpt-4.1"), 30);
        let err = collect(&client, "q").await.unwrap_err();
        assert!(matches!(err, GradeError::ModelCall(_)));
        assert!(err.to_string().contains("500"));
    }

    #[test]
    fn sse_line_classification() {
        assert_eq!(parse_sse_line("").unwrap(), SseLine::Skip);
        assert_eq!(parse_sse_line(": keep-alive").unwrap(), SseLine::Skip);
        assert_eq!(parse_sse_line("data: [DONE]").unwrap(), SseLine::Done);
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[{"delta":{"content":"a"}}]}"#).unwrap(),
            SseLine::Content("a".into())
        );
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#).unwrap(),
            SseLine::Skip
        );
        assert!(parse_sse_line("data: {oops").is_err());
    }
}
