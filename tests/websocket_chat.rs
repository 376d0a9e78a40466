mod common;

use common::{ content_line, FakeOllama, DONE_LINE };
use futures::{ SinkExt, StreamExt };
use ollama_chat::agent::{ ChatAgent, MODELS_UNAVAILABLE, SERVER_UNAVAILABLE_REPLY };
use ollama_chat::config::UiConfig;
use ollama_chat::llm::ollama::OllamaClient;
use ollama_chat::llm::LlmConfig;
use ollama_chat::models::chat::{ Transcript, Turn };
use ollama_chat::models::websocket::{ ClientMessage, ServerMessage };
use ollama_chat::server::websocket::{ serve, WsContext };
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{ TcpListener, TcpStream };
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{ connect_async, MaybeTlsStream, WebSocketStream };

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn spawn_chat_server(ollama_url: &str, api_key: Option<&str>) -> String {
    let config = LlmConfig {
        base_url: ollama_url.to_string(),
        connect_timeout: Duration::from_secs(2),
    };
    let agent = ChatAgent::new(Arc::new(OllamaClient::from_config(&config).unwrap()));
    let context = WsContext {
        agent: Arc::new(agent),
        ui: Arc::new(UiConfig {
            title: "test".to_string(),
            system_prompt: "Default prompt".to_string(),
            temperature: 0.7,
            min_temperature: 0.1,
            max_temperature: 2.0,
            ws_port: 0,
            ws_secure: false,
        }),
        api_key: api_key.map(str::to_string),
        tls: None,
    };

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = serve(listener, context).await;
    });
    format!("ws://{}/", addr)
}

async fn send(client: &mut Client, msg: &ClientMessage) {
    let json = serde_json::to_string(msg).unwrap();
    client.send(Message::Text(json)).await.unwrap();
}

async fn recv(client: &mut Client) -> ServerMessage {
    loop {
        let msg = tokio::time
            ::timeout(Duration::from_secs(5), client.next()).await
            .expect("timed out waiting for server")
            .expect("connection closed")
            .unwrap();
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

/// Reads until `done`, returning the streamed snapshots and the final transcript.
async fn recv_generation(client: &mut Client) -> (Vec<Transcript>, Transcript) {
    assert_eq!(recv(client).await, ServerMessage::Processing);
    let mut snapshots = Vec::new();
    loop {
        match recv(client).await {
            ServerMessage::Snapshot { transcript } => snapshots.push(transcript),
            ServerMessage::Done { transcript, .. } => {
                return (snapshots, transcript);
            }
            other => panic!("unexpected message {:?}", other),
        }
    }
}

fn chat(message: &str, model: &str) -> ClientMessage {
    ClientMessage::Chat {
        message: message.to_string(),
        system_prompt: Some("S".to_string()),
        temperature: Some(0.3),
        model: model.to_string(),
    }
}

#[tokio::test]
async fn streams_snapshots_and_keeps_history_between_messages() {
    let fake = FakeOllama::new(
        vec!["llama3"],
        vec![content_line("Hi"), content_line(" there"), DONE_LINE.to_string()]
    );
    let ollama_url = fake.clone().spawn().await;
    let url = spawn_chat_server(&ollama_url, None).await;
    let (mut client, _) = connect_async(url.as_str()).await.unwrap();

    send(&mut client, &chat("hello", "llama3")).await;
    let (snapshots, done) = recv_generation(&mut client).await;
    let replies: Vec<&str> = snapshots
        .iter()
        .map(|t| t.last_reply().unwrap())
        .collect();
    assert_eq!(replies, vec!["Hi", "Hi there"]);
    assert_eq!(done, Transcript::from(vec![Turn::new("hello", "Hi there")]));

    send(&mut client, &chat("again", "llama3")).await;
    let (_, done) = recv_generation(&mut client).await;
    assert_eq!(done.len(), 2);

    let seen = fake.seen();
    assert_eq!(seen.len(), 2);
    assert_eq!(
        seen[1]["messages"][0]["content"],
        "S\n\nHuman: hello\nAssistant: Hi there\nHuman: again\nAssistant:"
    );
    assert_eq!(seen[1]["options"]["temperature"], 0.3);
}

#[tokio::test]
async fn clear_resets_history() {
    let fake = FakeOllama::new(vec!["llama3"], vec![content_line("ok"), DONE_LINE.to_string()]);
    let ollama_url = fake.clone().spawn().await;
    let url = spawn_chat_server(&ollama_url, None).await;
    let (mut client, _) = connect_async(url.as_str()).await.unwrap();

    send(&mut client, &chat("one", "llama3")).await;
    recv_generation(&mut client).await;

    send(&mut client, &ClientMessage::Clear).await;
    assert_eq!(recv(&mut client).await, ServerMessage::Cleared { transcript: Transcript::new() });

    send(&mut client, &chat("two", "llama3")).await;
    let (_, done) = recv_generation(&mut client).await;
    assert_eq!(done, Transcript::from(vec![Turn::new("two", "ok")]));
    assert_eq!(fake.seen()[1]["messages"][0]["content"], "S\n\nHuman: two\nAssistant:");
}

#[tokio::test]
async fn placeholder_model_is_answered_without_calling_ollama() {
    let fake = FakeOllama::new(vec![], vec![content_line("never")]);
    let ollama_url = fake.clone().spawn().await;
    let url = spawn_chat_server(&ollama_url, None).await;
    let (mut client, _) = connect_async(url.as_str()).await.unwrap();

    send(&mut client, &chat("hello", MODELS_UNAVAILABLE)).await;
    let (snapshots, done) = recv_generation(&mut client).await;

    assert_eq!(snapshots.len(), 1);
    assert_eq!(done.last(), Some(&Turn::new("hello", SERVER_UNAVAILABLE_REPLY)));
    assert!(fake.seen().is_empty());
}

#[tokio::test]
async fn malformed_message_gets_error_reply() {
    let ollama_url = FakeOllama::new(vec![], vec![]).spawn().await;
    let url = spawn_chat_server(&ollama_url, None).await;
    let (mut client, _) = connect_async(url.as_str()).await.unwrap();

    client.send(Message::Text("{\"type\":\"dance\"}".to_string())).await.unwrap();
    match recv(&mut client).await {
        ServerMessage::Error { message } => assert!(message.starts_with("Failed to parse message")),
        other => panic!("unexpected message {:?}", other),
    }
}

#[tokio::test]
async fn api_key_is_enforced_at_handshake() {
    let ollama_url = FakeOllama::new(vec![], vec![]).spawn().await;
    let url = spawn_chat_server(&ollama_url, Some("letmein")).await;

    assert!(connect_async(url.as_str()).await.is_err());
    assert!(connect_async(format!("{}?api_key=wrong", url)).await.is_err());
    assert!(connect_async(format!("{}?api_key=letmein", url)).await.is_ok());
}
