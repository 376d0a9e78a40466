use crate::agent::model_choices;
use crate::config::UiConfig;
use crate::llm::InferenceError;
use crate::server::tls::install_crypto_provider;

use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;
use axum::{ routing::get, Json, Router, extract::State, response::Html };
use serde::{ Deserialize, Serialize };
use tower_http::cors::{ Any, CorsLayer };
use log::{ info, error };

const INDEX_HTML: &str = include_str!("../../static/index.html");

/// Model picker contents, resolved once at start-up.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ModelsResponse {
    pub models: Vec<String>,
    pub selected: Option<String>,
    pub available: bool,
}

impl ModelsResponse {
    pub fn from_listing(listing: &Result<Vec<String>, InferenceError>) -> Self {
        let models = model_choices(listing);
        Self {
            selected: models.first().cloned(),
            available: listing.is_ok(),
            models,
        }
    }
}

#[derive(Clone)]
pub struct ApiState {
    pub models: Arc<ModelsResponse>,
    pub ui: Arc<UiConfig>,
}

pub fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/", get(index_handler))
        .route("/api/models", get(models_handler))
        .route("/api/config", get(config_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .with_state(state)
}

pub async fn start_http_server(
    addr: &str,
    state: ApiState,
    tls_paths: Option<(&str, &str)>
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let addr = addr.parse::<SocketAddr>()?;
    let app = router(state);

    if let Some((cert_path, key_path)) = tls_paths {
        install_crypto_provider();
        let tls_config = axum_server::tls_rustls::RustlsConfig::from_pem_file(
            cert_path,
            key_path
        ).await?;

        tokio::spawn(async move {
            let result = axum_server::bind_rustls(addr, tls_config)
                .serve(app.into_make_service())
                .await;

            if let Err(e) = result {
                error!("HTTPS server error: {}", e);
            }
        });

        info!("Chat page available at https://{}", addr);
    } else {
        let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e|
            format!("Failed to bind HTTP server to {}: {}. Try a different port.", addr, e)
        )?;

        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app.into_make_service()).await {
                error!("HTTP server error: {}", e);
            }
        });

        info!("Chat page available at http://{}", addr);
    }

    Ok(())
}

async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn models_handler(State(state): State<ApiState>) -> Json<ModelsResponse> {
    Json((*state.models).clone())
}

async fn config_handler(State(state): State<ApiState>) -> Json<UiConfig> {
    Json((*state.ui).clone())
}

async fn health_handler() -> &'static str {
    "ok"
}
