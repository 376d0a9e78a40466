#![allow(dead_code)]

use axum::{
    body::Body,
    extract::State,
    http::StatusCode,
    response::{ IntoResponse, Response },
    routing::{ get, post },
    Json,
    Router,
};
use serde_json::{ json, Value };
use std::sync::{ Arc, Mutex };
use tokio::net::TcpListener;

/// What the fake server answers on `/api/chat`.
#[derive(Clone)]
pub enum ChatReply {
    /// NDJSON body streamed as these pieces; a piece may end mid-line.
    Chunks(Vec<String>),
    Status(StatusCode, Value),
}

#[derive(Clone)]
pub struct FakeOllama {
    pub models: Result<Vec<&'static str>, (StatusCode, Value)>,
    pub chat: ChatReply,
    pub seen: Arc<Mutex<Vec<Value>>>,
}

impl FakeOllama {
    pub fn new(models: Vec<&'static str>, chunks: Vec<String>) -> Self {
        Self {
            models: Ok(models),
            chat: ChatReply::Chunks(chunks),
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn seen(&self) -> Vec<Value> {
        self.seen.lock().unwrap().clone()
    }

    /// Serves the fake on an ephemeral port and returns its base URL.
    pub async fn spawn(self) -> String {
        let app = Router::new()
            .route("/api/tags", get(tags))
            .route("/api/chat", post(chat))
            .with_state(self);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }
}

async fn tags(State(fake): State<FakeOllama>) -> Response {
    match fake.models {
        Ok(models) => {
            let models: Vec<Value> = models
                .into_iter()
                .map(|name| json!({ "name": name, "model": name, "size": 1 }))
                .collect();
            Json(json!({ "models": models })).into_response()
        }
        Err((status, body)) => (status, Json(body)).into_response(),
    }
}

async fn chat(State(fake): State<FakeOllama>, Json(body): Json<Value>) -> Response {
    fake.seen.lock().unwrap().push(body);
    match fake.chat {
        ChatReply::Chunks(chunks) => {
            let stream = futures::stream::iter(
                chunks.into_iter().map(Ok::<_, std::io::Error>)
            );
            Response::builder()
                .header("content-type", "application/x-ndjson")
                .body(Body::from_stream(stream))
                .unwrap()
        }
        ChatReply::Status(status, body) => (status, Json(body)).into_response(),
    }
}

/// Base URL of a port nothing listens on.
pub async fn unreachable_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

pub fn content_line(content: &str) -> String {
    format!(
        "{}\n",
        json!({ "model": "llama3", "message": { "role": "assistant", "content": content }, "done": false })
    )
}

pub const DONE_LINE: &str =
    "{\"model\":\"llama3\",\"message\":{\"role\":\"assistant\",\"content\":\"\"},\"done\":true}\n";
