use crate::history::format_prompt;
use crate::llm::{ ChatRequest, InferenceClient, InferenceError };
use crate::models::chat::{ GenerationRequest, Transcript, Turn };

use futures::{ Stream, StreamExt };
use log::{ debug, error, info, warn };
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

pub const MODELS_UNAVAILABLE: &str = "Ollama server not available";
pub const MODELS_ERROR: &str = "Error fetching models";

pub const SERVER_UNAVAILABLE_REPLY: &str =
    "Unable to connect to Ollama server. Please ensure it's running and try again.";
pub const TIMEOUT_REPLY: &str =
    "Connection to Ollama server timed out. Please check your connection and try again.";

pub type SnapshotStream = Pin<Box<dyn Stream<Item = Transcript> + Send>>;

/// Renders a model listing for the model picker. Errors collapse into a single
/// placeholder entry so the picker is never empty.
pub fn model_choices(result: &Result<Vec<String>, InferenceError>) -> Vec<String> {
    match result {
        Ok(models) => models.clone(),
        Err(InferenceError::Unavailable(_)) => vec![MODELS_UNAVAILABLE.to_string()],
        Err(InferenceError::Other(_)) => vec![MODELS_ERROR.to_string()],
    }
}

/// True for model ids that cannot be sent to the server: the placeholder
/// entries of [`model_choices`] and the empty string.
pub fn is_placeholder_model(model: &str) -> bool {
    model.trim().is_empty() || model == MODELS_UNAVAILABLE || model == MODELS_ERROR
}

/// Text shown in place of the assistant reply when a generation fails.
pub fn failure_reply(err: &InferenceError) -> String {
    match err {
        InferenceError::Unavailable(_) => TIMEOUT_REPLY.to_string(),
        InferenceError::Other(detail) => format!("An error occurred: {}", detail),
    }
}

#[derive(Clone)]
pub struct ChatAgent {
    client: Arc<dyn InferenceClient>,
}

impl ChatAgent {
    pub fn new(client: Arc<dyn InferenceClient>) -> Self {
        Self { client }
    }

    pub async fn list_models(&self) -> Result<Vec<String>, InferenceError> {
        let result = self.client.list_models().await;
        match &result {
            Ok(models) => info!("Found {} installed models", models.len()),
            Err(InferenceError::Unavailable(detail)) => {
                warn!("Unable to connect to Ollama server. Please ensure it's running. ({})", detail)
            }
            Err(InferenceError::Other(detail)) => {
                error!("An error occurred while fetching models: {}", detail)
            }
        }
        result
    }

    pub async fn available_models(&self) -> Vec<String> {
        model_choices(&self.list_models().await)
    }

    /// Streams transcript snapshots for one user message.
    ///
    /// Each snapshot is a complete copy of the conversation with the newest
    /// turn holding the reply received so far. A failure ends the stream with
    /// one snapshot whose newest reply is the error text. Dropping the stream
    /// stops the generation.
    pub fn generate(&self, request: GenerationRequest) -> SnapshotStream {
        let (tx, rx) = mpsc::channel(32);
        let client = Arc::clone(&self.client);

        tokio::spawn(async move {
            drive_generation(client, request, tx).await;
        });

        Box::pin(ReceiverStream::new(rx))
    }
}

async fn drive_generation(
    client: Arc<dyn InferenceClient>,
    request: GenerationRequest,
    tx: mpsc::Sender<Transcript>
) {
    let GenerationRequest { message, mut transcript, system_prompt, temperature, model } = request;

    if is_placeholder_model(&model) {
        warn!("Rejecting chat request for unusable model '{}'", model);
        transcript.push(Turn::new(message, SERVER_UNAVAILABLE_REPLY));
        let _ = tx.send(transcript).await;
        return;
    }

    let prompt = format_prompt(&system_prompt, &transcript, &message);
    transcript.push(Turn::new(message, String::new()));

    debug!("Sending {} byte prompt to model {} (temperature {})", prompt.len(), model, temperature);
    let chat_request = ChatRequest { model, prompt, temperature };

    let mut fragments = match client.chat_stream(chat_request).await {
        Ok(stream) => stream,
        Err(e) => {
            fail(transcript, &e, &tx).await;
            return;
        }
    };

    let mut response = String::new();
    while let Some(item) = fragments.next().await {
        match item {
            Ok(fragment) => {
                response.push_str(&fragment);
                transcript.set_last_reply(response.as_str());
                if tx.send(transcript.clone()).await.is_err() {
                    debug!("Snapshot receiver dropped, abandoning generation");
                    return;
                }
            }
            Err(e) => {
                fail(transcript, &e, &tx).await;
                return;
            }
        }
    }

    debug!("Generation finished with {} characters", response.chars().count());
}

async fn fail(mut transcript: Transcript, err: &InferenceError, tx: &mpsc::Sender<Transcript>) {
    if err.is_unavailable() {
        warn!("Chat request failed, Ollama unreachable: {}", err);
    } else {
        error!("Chat request failed: {}", err);
    }
    transcript.set_last_reply(failure_reply(err));
    let _ = tx.send(transcript).await;
}
