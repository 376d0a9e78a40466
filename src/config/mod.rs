use serde::Serialize;
use std::net::SocketAddr;
use std::time::Duration;

use crate::cli::Args;
use crate::llm::LlmConfig;
use crate::models::chat::{ clamp_temperature, MAX_TEMPERATURE, MIN_TEMPERATURE };

/// Values the chat page starts from. Served as JSON so the page needs no
/// templating.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UiConfig {
    pub title: String,
    pub system_prompt: String,
    pub temperature: f32,
    pub min_temperature: f32,
    pub max_temperature: f32,
    pub ws_port: u16,
    pub ws_secure: bool,
}

impl UiConfig {
    pub fn from_args(args: &Args) -> Result<Self, String> {
        let ws_addr: SocketAddr = args.ws_addr
            .parse()
            .map_err(|e| format!("Invalid WS_ADDR '{}': {}", args.ws_addr, e))?;

        Ok(Self {
            title: args.page_title.clone(),
            system_prompt: args.default_system_prompt.clone(),
            temperature: clamp_temperature(args.default_temperature),
            min_temperature: MIN_TEMPERATURE,
            max_temperature: MAX_TEMPERATURE,
            ws_port: ws_addr.port(),
            ws_secure: args.tls_paths().is_some(),
        })
    }
}

pub fn llm_config(args: &Args) -> LlmConfig {
    LlmConfig {
        base_url: args.ollama_host.clone(),
        connect_timeout: Duration::from_secs(args.ollama_connect_timeout_secs),
    }
}
