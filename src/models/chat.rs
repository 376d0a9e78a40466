use serde::{ Deserialize, Serialize };

/// One exchange in the conversation. Serialized as a `[user, assistant]` pair,
/// the shape the chat page renders.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(String, String)", into = "(String, String)")]
pub struct Turn {
    pub user: String,
    pub assistant: String,
}

impl Turn {
    pub fn new(user: impl Into<String>, assistant: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            assistant: assistant.into(),
        }
    }
}

impl From<(String, String)> for Turn {
    fn from((user, assistant): (String, String)) -> Self {
        Self { user, assistant }
    }
}

impl From<Turn> for (String, String) {
    fn from(turn: Turn) -> Self {
        (turn.user, turn.assistant)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn last_reply(&self) -> Option<&str> {
        self.turns.last().map(|turn| turn.assistant.as_str())
    }

    /// Overwrites the assistant side of the newest turn. No-op on an empty transcript.
    pub fn set_last_reply(&mut self, reply: impl Into<String>) {
        if let Some(turn) = self.turns.last_mut() {
            turn.assistant = reply.into();
        }
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }
}

impl From<Vec<Turn>> for Transcript {
    fn from(turns: Vec<Turn>) -> Self {
        Self { turns }
    }
}

impl<'a> IntoIterator for &'a Transcript {
    type Item = &'a Turn;
    type IntoIter = std::slice::Iter<'a, Turn>;

    fn into_iter(self) -> Self::IntoIter {
        self.turns.iter()
    }
}

pub const MIN_TEMPERATURE: f32 = 0.1;
pub const MAX_TEMPERATURE: f32 = 2.0;

/// Everything one generation needs. Built fresh for each user message.
#[derive(Clone, Debug, PartialEq)]
pub struct GenerationRequest {
    pub message: String,
    pub transcript: Transcript,
    pub system_prompt: String,
    pub temperature: f32,
    pub model: String,
}

impl GenerationRequest {
    pub fn new(
        message: impl Into<String>,
        transcript: Transcript,
        system_prompt: impl Into<String>,
        temperature: f32,
        model: impl Into<String>
    ) -> Self {
        Self {
            message: message.into(),
            transcript,
            system_prompt: system_prompt.into(),
            temperature: clamp_temperature(temperature),
            model: model.into(),
        }
    }
}

pub fn clamp_temperature(temperature: f32) -> f32 {
    if temperature.is_nan() {
        return MIN_TEMPERATURE;
    }
    temperature.clamp(MIN_TEMPERATURE, MAX_TEMPERATURE)
}
