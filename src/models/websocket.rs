use serde::{ Serialize, Deserialize };

use super::chat::Transcript;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "chat")] Chat {
        message: String,
        #[serde(default)]
        system_prompt: Option<String>,
        #[serde(default)]
        temperature: Option<f32>,
        model: String,
    },
    #[serde(rename = "clear")]
    Clear,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "processing")]
    Processing,
    #[serde(rename = "snapshot")] Snapshot {
        transcript: Transcript,
    },
    #[serde(rename = "done")] Done {
        transcript: Transcript,
        timestamp: i64,
    },
    #[serde(rename = "cleared")] Cleared {
        transcript: Transcript,
    },
    #[serde(rename = "error")] Error {
        message: String,
    },
}
