pub mod agent;
pub mod cli;
pub mod config;
pub mod history;
pub mod llm;
pub mod models;
pub mod server;

use agent::ChatAgent;
use cli::Args;
use config::UiConfig;
use log::info;
use server::Server;
use server::api::ModelsResponse;
use std::error::Error;
use std::sync::Arc;

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("--- Core Configuration ---");
    info!("Ollama Host: {}", args.ollama_host);
    info!("Ollama Connect Timeout: {}s", args.ollama_connect_timeout_secs);
    info!("HTTP Address: {}", args.http_addr);
    info!("WebSocket Address: {}", args.ws_addr);
    info!("Default Temperature: {}", args.default_temperature);
    info!("TLS Enabled: {}", args.enable_tls);
    info!("-------------------------");

    let ui = UiConfig::from_args(&args)?;
    let client = llm::new_client(&config::llm_config(&args))?;
    let agent = Arc::new(ChatAgent::new(client));

    let listing = agent.list_models().await;
    let models = ModelsResponse::from_listing(&listing);
    info!("Model choices: {:?}", models.models);

    let server = Server::new(args, agent, models, ui);
    server.run().await?;

    Ok(())
}
