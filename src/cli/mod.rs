use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    // --- Ollama Args ---
    /// Base URL of the Ollama server (e.g., http://localhost:11434)
    #[arg(long, env = "OLLAMA_HOST", default_value = "http://localhost:11434")]
    pub ollama_host: String,

    /// Seconds to wait for a TCP connection to the Ollama server before giving up.
    #[arg(long, env = "OLLAMA_CONNECT_TIMEOUT_SECS", default_value = "5")]
    pub ollama_connect_timeout_secs: u64,

    // --- Chat Defaults ---
    /// System prompt pre-filled in the chat page.
    #[arg(
        long,
        env = "DEFAULT_SYSTEM_PROMPT",
        default_value = "You are a helpful AI assistant. Respond concisely and accurately."
    )]
    pub default_system_prompt: String,

    /// Temperature pre-selected in the chat page (0.1 to 2.0).
    #[arg(long, env = "DEFAULT_TEMPERATURE", default_value = "0.7")]
    pub default_temperature: f32,

    /// Title shown at the top of the chat page.
    #[arg(
        long,
        env = "PAGE_TITLE",
        default_value = "Ollama-powered Chat Interface with Model Selection"
    )]
    pub page_title: String,

    // --- Server Args ---
    /// Host address and port for the HTTP server (chat page and JSON API).
    #[arg(long, env = "HTTP_ADDR", default_value = "127.0.0.1:7860")]
    pub http_addr: String,

    /// Host address and port for the WebSocket server that streams responses.
    #[arg(long, env = "WS_ADDR", default_value = "127.0.0.1:7861")]
    pub ws_addr: String,

    /// Optional API Key required for clients to connect to the WebSocket server. If set, clients must provide this key.
    #[arg(long, env = "SERVER_API_KEY")]
    pub server_api_key: Option<String>,

    /// Optional path to the TLS certificate file (PEM format). Requires --tls-key-path.
    #[arg(long, env = "TLS_CERT_PATH")]
    pub tls_cert_path: Option<String>,

    /// Optional path to the TLS private key file (PEM format). Requires --tls-cert-path.
    #[arg(long, env = "TLS_KEY_PATH")]
    pub tls_key_path: Option<String>,

    #[arg(long, env = "ENABLE_TLS", default_value = "false")]
    pub enable_tls: bool,
}

impl Args {
    /// TLS is only used when enabled and both PEM paths are present.
    pub fn tls_paths(&self) -> Option<(&str, &str)> {
        if !self.enable_tls {
            return None;
        }
        match (&self.tls_cert_path, &self.tls_key_path) {
            (Some(cert), Some(key)) => Some((cert.as_str(), key.as_str())),
            _ => None,
        }
    }
}
