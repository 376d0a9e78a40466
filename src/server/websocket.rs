use crate::agent::ChatAgent;
use crate::config::UiConfig;
use crate::history::ChatSession;
use crate::models::websocket::{ ClientMessage, ServerMessage };

use std::collections::HashMap;
use std::error::Error;
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::io::{ AsyncRead, AsyncWrite };

use tokio_tungstenite::{ accept_hdr_async, WebSocketStream };
use tokio_tungstenite::tungstenite::handshake::server::{ ErrorResponse, Request, Response };
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_rustls::TlsAcceptor;

use lazy_static::lazy_static;
use governor::{ RateLimiter, Quota, state::{ InMemoryState, NotKeyed }, clock::DefaultClock };

use chrono::Utc;
use futures::{ Sink, SinkExt, StreamExt };
use log::{ debug, info, warn, error };
use url::form_urlencoded;

const MAX_MESSAGE_SIZE: usize = 1 * 1024 * 1024;

lazy_static! {
    static ref CONNECTION_LIMITER: RateLimiter<NotKeyed, InMemoryState, DefaultClock> =
        RateLimiter::direct(Quota::per_second(NonZeroU32::new(10).unwrap()));
}

/// Shared by every connection.
#[derive(Clone)]
pub struct WsContext {
    pub agent: Arc<ChatAgent>,
    pub ui: Arc<UiConfig>,
    pub api_key: Option<String>,
    pub tls: Option<TlsAcceptor>,
}

pub async fn start_ws_server(
    addr: &str,
    context: WsContext
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let listener = TcpListener::bind(addr).await.map_err(|e|
        format!("Failed to bind WebSocket server to {}: {}", addr, e)
    )?;

    let protocol = if context.tls.is_some() { "wss" } else { "ws" };
    info!("{} server listening on: {}", protocol.to_uppercase(), addr);

    serve(listener, context).await
}

pub async fn serve(
    listener: TcpListener,
    context: WsContext
) -> Result<(), Box<dyn Error + Send + Sync>> {
    loop {
        let (stream, peer) = listener.accept().await?;

        if CONNECTION_LIMITER.check().is_err() {
            warn!("Global connection rate limit exceeded for {}. Dropping connection.", peer);
            continue;
        }

        info!("Incoming connection from: {}", peer);
        let context = context.clone();

        tokio::spawn(async move {
            let process_result = if let Some(acceptor) = context.tls.clone() {
                match acceptor.accept(stream).await {
                    Ok(tls_stream) => {
                        info!("TLS handshake successful for {}", peer);
                        process_connection(peer, tls_stream, context).await
                    }
                    Err(e) => {
                        error!("TLS handshake error for {}: {}", peer, e);
                        Err(Box::new(e) as Box<dyn Error + Send + Sync>)
                    }
                }
            } else {
                process_connection(peer, stream, context).await
            };

            if let Err(e) = process_result {
                error!("Failed to process connection for {}: {}", peer, e);
            }
        });
    }
}

/// Key supplied by the client, from the `X-API-Key` header or the `api_key` query parameter.
fn provided_api_key(req: &Request) -> Option<String> {
    if let Some(key) = req.headers().get("X-API-Key").and_then(|v| v.to_str().ok()) {
        return Some(key.to_owned());
    }

    let query = req.uri().query().unwrap_or("");
    let params: HashMap<String, String> = form_urlencoded
        ::parse(query.as_bytes())
        .into_owned()
        .collect();
    params.get("api_key").cloned()
}

fn unauthorized() -> ErrorResponse {
    let mut resp = ErrorResponse::new(Some("Unauthorized".into()));
    *resp.status_mut() = StatusCode::UNAUTHORIZED;
    resp
}

async fn process_connection<S>(
    peer: SocketAddr,
    stream: S,
    context: WsContext
) -> Result<(), Box<dyn Error + Send + Sync>>
    where S: AsyncRead + AsyncWrite + Unpin + Send + 'static
{
    let required_api_key = context.api_key.clone();
    let auth_callback = |req: &Request, response: Response| -> Result<Response, ErrorResponse> {
        match &required_api_key {
            Some(required) => {
                if provided_api_key(req).as_deref() != Some(required.as_str()) {
                    warn!("{}: bad or missing API key", peer);
                    return Err(unauthorized());
                }
                debug!("{} authenticated", peer);
            }
            None => debug!("{} no API key required", peer),
        }
        Ok(response)
    };

    match accept_hdr_async(stream, auth_callback).await {
        Ok(ws) => {
            handle_connection(peer, ws, context).await;
            Ok(())
        }
        Err(e) => {
            error!("Handshake failed for {}: {}", peer, e);
            Err(Box::new(e) as _)
        }
    }
}

async fn send_message<T>(tx: &mut T, msg: &ServerMessage) -> Result<(), WsError>
    where T: Sink<Message, Error = WsError> + Unpin
{
    match serde_json::to_string(msg) {
        Ok(json) => tx.send(Message::Text(json)).await,
        Err(e) => {
            error!("Failed to serialize server message: {}", e);
            Ok(())
        }
    }
}

pub async fn handle_connection<S>(peer: SocketAddr, websocket: WebSocketStream<S>, context: WsContext)
    where S: AsyncRead + AsyncWrite + Unpin
{
    let (mut tx, mut rx) = websocket.split();
    let mut session = ChatSession::new();
    info!("Assigned chat session {} to {}", session.id(), peer);

    while let Some(msg) = rx.next().await {
        let message = match msg {
            Ok(message) => message,
            Err(e) => {
                match e {
                    WsError::ConnectionClosed | WsError::Protocol(_) | WsError::Utf8 => {
                        info!("WebSocket connection closed or protocol error for {}: {}", peer, e);
                    }
                    WsError::Io(ref io_err) if
                        io_err.kind() == std::io::ErrorKind::ConnectionReset
                    => {
                        info!("WebSocket connection reset by peer {}", peer);
                    }
                    _ => {
                        error!("Error receiving message from {}: {}", peer, e);
                    }
                }
                break;
            }
        };

        if message.len() > MAX_MESSAGE_SIZE {
            warn!(
                "Message from {} exceeds size limit ({} > {})",
                peer,
                message.len(),
                MAX_MESSAGE_SIZE
            );
            let error_msg = ServerMessage::Error {
                message: "Message too large".to_string(),
            };
            if send_message(&mut tx, &error_msg).await.is_err() {
                error!("Failed to send size limit error to {}", peer);
            }
            break;
        }

        match message {
            Message::Text(text) => {
                let outcome = match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(ClientMessage::Chat { message, system_prompt, temperature, model }) => {
                        let system_prompt = system_prompt.unwrap_or_else(||
                            context.ui.system_prompt.clone()
                        );
                        let temperature = temperature.unwrap_or(context.ui.temperature);
                        run_chat(
                            &mut tx,
                            &mut session,
                            &context.agent,
                            &message,
                            &system_prompt,
                            temperature,
                            &model
                        ).await
                    }
                    Ok(ClientMessage::Clear) => {
                        session.clear();
                        info!("Session {} cleared", session.id());
                        send_message(&mut tx, &ServerMessage::Cleared {
                            transcript: session.transcript().clone(),
                        }).await
                    }
                    Err(e) => {
                        warn!("Failed to parse message from {}: {}", peer, e);
                        send_message(&mut tx, &ServerMessage::Error {
                            message: format!("Failed to parse message: {}", e),
                        }).await
                    }
                };

                if let Err(e) = outcome {
                    error!("Error sending to {}: {}", peer, e);
                    break;
                }
            }
            Message::Close(_) => {
                info!("Received close frame from {}", peer);
                break;
            }
            Message::Ping(ping_data) => {
                if tx.send(Message::Pong(ping_data)).await.is_err() {
                    error!("Failed to send pong to {}", peer);
                    break;
                }
            }
            Message::Binary(_) => {
                warn!("Ignoring binary message from {}", peer);
            }
            Message::Pong(_) | Message::Frame(_) => {}
        }
    }
    info!("WebSocket connection closed for {} (session {})", peer, session.id());
}

/// Relays one generation to the client, then stores its final transcript in the session.
async fn run_chat<T>(
    tx: &mut T,
    session: &mut ChatSession,
    agent: &ChatAgent,
    message: &str,
    system_prompt: &str,
    temperature: f32,
    model: &str
) -> Result<(), WsError>
    where T: Sink<Message, Error = WsError> + Unpin
{
    send_message(tx, &ServerMessage::Processing).await?;

    let request = session.request(message, system_prompt, temperature, model);
    let mut snapshots = agent.generate(request);
    let mut last = None;

    while let Some(transcript) = snapshots.next().await {
        send_message(tx, &ServerMessage::Snapshot {
            transcript: transcript.clone(),
        }).await?;
        last = Some(transcript);
    }

    match last {
        Some(transcript) => session.adopt(transcript),
        None => session.adopt_empty_reply(message),
    }

    send_message(tx, &ServerMessage::Done {
        transcript: session.transcript().clone(),
        timestamp: Utc::now().timestamp(),
    }).await
}
