pub mod ollama;

use async_trait::async_trait;
use futures::Stream;
use serde::Serialize;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use self::ollama::OllamaClient;

/// Failures talking to the inference server.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InferenceError {
    /// The server could not be reached or the connection timed out.
    #[error("Ollama server unavailable: {0}")]
    Unavailable(String),
    #[error("{0}")]
    Other(String),
}

impl InferenceError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, InferenceError::Unavailable(_))
    }
}

impl From<reqwest::Error> for InferenceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            InferenceError::Unavailable(err.to_string())
        } else {
            InferenceError::Other(err.to_string())
        }
    }
}

pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, InferenceError>> + Send>>;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChatRequest {
    pub model: String,
    pub prompt: String,
    pub temperature: f32,
}

#[async_trait]
pub trait InferenceClient: Send + Sync {
    /// Installed model identifiers, in the order the server reports them.
    async fn list_models(&self) -> Result<Vec<String>, InferenceError>;

    /// Opens a streaming chat completion. The stream yields text fragments in
    /// arrival order and ends when generation completes.
    async fn chat_stream(&self, request: ChatRequest) -> Result<FragmentStream, InferenceError>;
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub connect_timeout: Duration,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

pub fn new_client(config: &LlmConfig) -> Result<Arc<dyn InferenceClient>, InferenceError> {
    let client = OllamaClient::from_config(config)?;
    Ok(Arc::new(client))
}
