use log::debug;
use uuid::Uuid;

use crate::models::chat::{ GenerationRequest, Transcript, Turn };

/// Flattens the system prompt, prior turns and the new message into the single
/// prompt string sent to the model.
pub fn format_prompt(system_prompt: &str, transcript: &Transcript, message: &str) -> String {
    let mut prompt = format!("{}\n\n", system_prompt);
    for turn in transcript {
        prompt.push_str(&format!("Human: {}\nAssistant: {}\n", turn.user, turn.assistant));
    }
    prompt.push_str(&format!("Human: {}\nAssistant:", message));
    prompt
}

/// Conversation state for one connected chat page.
#[derive(Debug, Clone)]
pub struct ChatSession {
    id: String,
    transcript: Transcript,
}

impl ChatSession {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            transcript: Transcript::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Builds a generation request over a copy of the current transcript. The
    /// session itself is untouched until [`ChatSession::adopt`] is called.
    pub fn request(
        &self,
        message: &str,
        system_prompt: &str,
        temperature: f32,
        model: &str
    ) -> GenerationRequest {
        GenerationRequest::new(message, self.transcript.clone(), system_prompt, temperature, model)
    }

    /// Takes the final snapshot of a generation as the new transcript.
    pub fn adopt(&mut self, transcript: Transcript) {
        debug!("Session {} now holds {} turns", self.id, transcript.len());
        self.transcript = transcript;
    }

    /// Used when a generation produced no snapshot at all, so the user's
    /// message is still recorded.
    pub fn adopt_empty_reply(&mut self, message: &str) {
        self.transcript.push(Turn::new(message, ""));
    }

    pub fn clear(&mut self) {
        self.transcript.clear();
    }
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new()
    }
}
