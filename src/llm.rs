use async_trait::async_trait;
use futures::FutureExt;
use reqwest::Client;
use std::panic::AssertUnwindSafe;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// One model's answer to a fan-out. When `is_error` is set, `text` describes
/// what went wrong instead of carrying model output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelOutcome {
    pub model_id: String,
    pub text: String,
    pub is_error: bool,
}

impl ModelOutcome {
    pub fn success(model_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            text: text.into(),
            is_error: false,
        }
    }

    pub fn failure(model_id: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self {
            model_id: model_id.into(),
            text: format!("Error: {}", reason),
            is_error: true,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum InvokeError {
    #[error("model call timed out after {0:?}")]
    Timeout(Duration),

    #[error("request to inference backend failed: {0}")]
    Http(String),

    #[error("inference backend returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("invalid response format from LLM: {0}")]
    MalformedResponse(String),

    #[error("backend panicked")]
    Panicked,
}

impl From<reqwest::Error> for InvokeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            InvokeError::MalformedResponse(err.to_string())
        } else {
            InvokeError::Http(err.to_string())
        }
    }
}

/// A chat-completion backend that answers one prompt with one text.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    async fn complete(&self, model_id: &str, prompt: &str) -> Result<String, InvokeError>;
}

#[derive(Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
}

/// OpenAI-compatible chat completions, as served by OpenRouter.
pub struct OpenRouterBackend {
    client: Client,
    base_url: String,
    api_key: String,
    site_url: Option<String>,
    site_name: Option<String>,
}

impl OpenRouterBackend {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            site_url: None,
            site_name: None,
        }
    }

    /// Attribution headers OpenRouter shows on its dashboards.
    pub fn with_site(mut self, site_url: Option<String>, site_name: Option<String>) -> Self {
        self.site_url = site_url;
        self.site_name = site_name;
        self
    }
}

#[async_trait]
impl ModelBackend for OpenRouterBackend {
    async fn complete(&self, model_id: &str, prompt: &str) -> Result<String, InvokeError> {
        let body = ChatRequest {
            model: model_id.into(),
            messages: vec![Message {
                role: "user".into(),
                content: prompt.into(),
            }],
        };

        let mut request = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body);

        // Add optional headers if provided
        if let Some(url) = &self.site_url {
            request = request.header("HTTP-Referer", url);
        }

        if let Some(name) = &self.site_name {
            request = request.header("X-Title", name);
        }

        let res = request.send().await?;
        let status = res.status();
        let text = res.text().await?;

        let json: serde_json::Value = serde_json::from_str(&text)
            .map_err(|e| {
                if status.is_success() {
                    InvokeError::MalformedResponse(e.to_string())
                } else {
                    InvokeError::Status {
                        status: status.as_u16(),
                        message: text.trim().to_string(),
                    }
                }
            })?;

        if !status.is_success() {
            let message = json["error"]["message"]
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| json.to_string());
            return Err(InvokeError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let reply = json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| InvokeError::MalformedResponse("missing choices[0].message.content".to_string()))?
            .trim()
            .to_string();

        Ok(reply)
    }
}

/// Calls a backend and turns every failure into an error outcome.
#[derive(Clone)]
pub struct ModelInvoker {
    backend: Arc<dyn ModelBackend>,
    timeout: Option<Duration>,
}

impl ModelInvoker {
    pub fn new(backend: Arc<dyn ModelBackend>, timeout: Option<Duration>) -> Self {
        Self { backend, timeout }
    }

    pub async fn invoke(&self, model_id: &str, prompt: &str) -> ModelOutcome {
        // A panicking backend is just another failed call.
        let call = AssertUnwindSafe(self.backend.complete(model_id, prompt)).catch_unwind();
        let result = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(caught) => caught,
                Err(_) => Ok(Err(InvokeError::Timeout(limit))),
            },
            None => call.await,
        };
        let result = result.unwrap_or_else(|_| Err(InvokeError::Panicked));

        match result {
            Ok(text) => {
                debug!(model = model_id, chars = text.len(), "model call succeeded");
                ModelOutcome::success(model_id, text)
            }
            Err(err) => {
                warn!(model = model_id, error = %err, "model call failed");
                ModelOutcome::failure(model_id, err)
            }
        }
    }
}
