use async_trait::async_trait;
use futures::StreamExt;
use log::{ debug, warn };
use reqwest::Client as HttpClient;
use serde::{ Deserialize, Serialize };
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use super::{ ChatRequest, FragmentStream, InferenceClient, InferenceError, LlmConfig };

#[derive(Debug, Clone)]
pub struct OllamaClient {
    http: HttpClient,
    base_url: String,
}

#[derive(Serialize)]
struct ChatBody {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    options: ChatOptions,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct ChatOptions {
    temperature: f32,
}

#[derive(Deserialize, Debug)]
struct ChatChunk {
    #[serde(default)]
    message: Option<ChunkMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ChunkMessage {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct TagsResponse {
    models: Vec<TagModel>,
}

#[derive(Deserialize)]
struct TagModel {
    name: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

impl OllamaClient {
    pub fn new(base_url: &str, config: &LlmConfig) -> Result<Self, InferenceError> {
        let http = HttpClient::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| InferenceError::Other(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, InferenceError> {
        Self::new(&config.base_url, config)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn error_from_status(response: reqwest::Response) -> InferenceError {
        let status = response.status();
        match response.text().await {
            Ok(body) =>
                match serde_json::from_str::<ErrorBody>(&body) {
                    Ok(parsed) => InferenceError::Other(parsed.error),
                    Err(_) => InferenceError::Other(format!("HTTP error: {}", status)),
                }
            Err(e) => e.into(),
        }
    }
}

#[async_trait]
impl InferenceClient for OllamaClient {
    async fn list_models(&self) -> Result<Vec<String>, InferenceError> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self.http.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(Self::error_from_status(response).await);
        }

        let tags = response.json::<TagsResponse>().await?;
        Ok(
            tags.models
                .into_iter()
                .map(|model| model.name)
                .collect()
        )
    }

    async fn chat_stream(&self, request: ChatRequest) -> Result<FragmentStream, InferenceError> {
        let url = format!("{}/api/chat", self.base_url);
        let body = ChatBody {
            model: request.model,
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: request.prompt,
            }],
            stream: true,
            options: ChatOptions {
                temperature: request.temperature,
            },
        };

        let response = self.http.post(&url).json(&body).send().await?;
        if !response.status().is_success() {
            return Err(Self::error_from_status(response).await);
        }

        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(async move {
            let mut bytes = response.bytes_stream();
            let mut lines = LineBuffer::default();

            while let Some(chunk_result) = bytes.next().await {
                match chunk_result {
                    Ok(buf) => {
                        for line in lines.push(&buf) {
                            if let Some(chunk) = decode_line(&line) {
                                if !forward_chunk(chunk, &tx).await {
                                    return;
                                }
                            }
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Err(e.into())).await;
                        return;
                    }
                }
            }

            if let Some(line) = lines.finish() {
                if let Some(chunk) = decode_line(&line) {
                    forward_chunk(chunk, &tx).await;
                }
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}

fn decode_line(line: &str) -> Option<ChatChunk> {
    match serde_json::from_str::<ChatChunk>(line) {
        Ok(chunk) => Some(chunk),
        Err(e) => {
            warn!("JSON parse error: {} for line: {}", e, line);
            None
        }
    }
}

/// Sends the chunk's fragment downstream. Returns false once nothing more should be read.
async fn forward_chunk(
    chunk: ChatChunk,
    tx: &mpsc::Sender<Result<String, InferenceError>>
) -> bool {
    if let Some(error) = chunk.error {
        let _ = tx.send(Err(InferenceError::Other(error))).await;
        return false;
    }

    if let Some(message) = chunk.message {
        if !message.content.is_empty() && tx.send(Ok(message.content)).await.is_err() {
            debug!("Fragment receiver dropped, stopping chat stream");
            return false;
        }
    }

    !chunk.done
}

/// Splits a byte stream into newline-terminated lines. Network chunks do not
/// respect line (or UTF-8) boundaries, so bytes are held until a newline shows up.
#[derive(Debug, Default)]
pub(crate) struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub(crate) fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&raw[..raw.len() - 1]).trim().to_string();
            if !text.is_empty() {
                lines.push(text);
            }
        }
        lines
    }

    pub(crate) fn finish(&mut self) -> Option<String> {
        let raw = std::mem::take(&mut self.pending);
        let text = String::from_utf8_lossy(&raw).trim().to_string();
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }
}
