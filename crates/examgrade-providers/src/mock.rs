//! Mock model client for testing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use futures::stream::{self, StreamExt};

use examgrade_core::error::{GradeError, ModelConfigError};
use examgrade_core::model::ModelSpec;
use examgrade_core::think::filter_think_tags;
use examgrade_core::traits::{ResponseGenerator, ResponseStream};

/// A mock model for exercising the engine without a real backend.
///
/// Returns configurable responses based on prompt content matching. Each
/// response is streamed word by word through the same think-tag filter the
/// real clients use.
pub struct MockModel {
    spec: ModelSpec,
    /// Map of prompt substring → raw response.
    responses: HashMap<String, String>,
    /// Default response if no prompt matches.
    default_response: String,
    /// Number of calls made.
    call_count: AtomicU32,
    /// Last prompt received.
    last_prompt: Mutex<Option<String>>,
    /// Validation failure to report, if any.
    config_error: Option<ModelConfigError>,
}

impl MockModel {
    /// Create a new mock with the given prompt→response mappings.
    pub fn new(responses: HashMap<String, String>) -> Self {
        Self {
            spec: ModelSpec::local("mock-model"),
            responses,
            default_response: "a".to_string(),
            call_count: AtomicU32::new(0),
            last_prompt: Mutex::new(None),
            config_error: None,
        }
    }

    /// Create a mock that always returns the same response.
    pub fn with_fixed_response(response: &str) -> Self {
        Self {
            default_response: response.to_string(),
            ..Self::new(HashMap::new())
        }
    }

    /// Report a different model spec, e.g. one already stored.
    pub fn with_spec(mut self, spec: ModelSpec) -> Self {
        self.spec = spec;
        self
    }

    /// Fail validation with `problem`.
    pub fn with_config_error(mut self, problem: &str) -> Self {
        self.config_error = Some(ModelConfigError::new(problem));
        self
    }

    /// Get the number of calls made to this mock.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }

    /// Get the last prompt sent to this mock.
    pub fn last_prompt(&self) -> Option<String> {
        self.last_prompt
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Split a response into word-sized chunks, the way backends stream tokens.
fn chunked(text: &str) -> Vec<String> {
    text.split_inclusive(char::is_whitespace)
        .map(str::to_string)
        .collect()
}

#[async_trait]
impl ResponseGenerator for MockModel {
    fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    async fn validate(&self) -> Result<(), ModelConfigError> {
        match &self.config_error {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    async fn generate_response(&self, prompt: &str) -> Result<ResponseStream, GradeError> {
        self.validate().await?;
        self.call_count.fetch_add(1, Ordering::Relaxed);
        *self
            .last_prompt
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(prompt.to_string());

        // Find a matching response based on prompt content
        let content = self
            .responses
            .iter()
            .find(|(key, _)| prompt.contains(key.as_str()))
            .map(|(_, v)| v.clone())
            .unwrap_or_else(|| self.default_response.clone());

        let chunks = chunked(&content).into_iter().map(Ok);
        Ok(filter_think_tags(stream::iter(chunks).boxed()))
    }
}
