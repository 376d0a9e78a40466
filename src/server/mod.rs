pub mod api;
pub mod tls;
pub mod websocket;

use crate::agent::ChatAgent;
use crate::cli::Args;
use crate::config::UiConfig;
use self::api::{ ApiState, ModelsResponse };
use self::websocket::WsContext;

use log::{ error, info, warn };
use std::error::Error;
use std::sync::Arc;
use tokio_rustls::TlsAcceptor;

pub struct Server {
    args: Args,
    agent: Arc<ChatAgent>,
    models: Arc<ModelsResponse>,
    ui: Arc<UiConfig>,
    api_key: Option<String>,
}

impl Server {
    pub fn new(args: Args, agent: Arc<ChatAgent>, models: ModelsResponse, ui: UiConfig) -> Self {
        let api_key = args.server_api_key.clone().filter(|k| !k.trim().is_empty());

        if api_key.is_some() {
            info!("Server configured with API Key authentication.");
        } else {
            warn!("Server configured WITHOUT API Key authentication. Connections are open.");
        }

        Self {
            args,
            agent,
            models: Arc::new(models),
            ui: Arc::new(ui),
            api_key,
        }
    }

    pub async fn run(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        if self.args.enable_tls && self.args.tls_paths().is_none() {
            error!("--enable-tls requires both --tls-cert-path and --tls-key-path.");
            return Err("TLS enabled without cert/key".into());
        }

        self.start_http_server().await?;
        self.start_ws_server().await
    }

    async fn start_http_server(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        let state = ApiState {
            models: self.models.clone(),
            ui: self.ui.clone(),
        };
        api::start_http_server(&self.args.http_addr, state, self.args.tls_paths()).await
    }

    async fn start_ws_server(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        let tls = match self.args.tls_paths() {
            Some((cert_path, key_path)) => {
                info!(
                    "TLS enabled. Loading certificate from '{}' and key from '{}'",
                    cert_path,
                    key_path
                );
                Some(TlsAcceptor::from(tls::load_tls_config(cert_path, key_path)?))
            }
            None => {
                info!("TLS not enabled. Running plain WebSocket (WS) server.");
                None
            }
        };

        let context = WsContext {
            agent: self.agent.clone(),
            ui: self.ui.clone(),
            api_key: self.api_key.clone(),
            tls,
        };
        websocket::start_ws_server(&self.args.ws_addr, context).await
    }
}
