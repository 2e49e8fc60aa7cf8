use crate::conversation::{ ConversationController, QUICK_SUGGESTIONS };
use crate::conversation::selection::{ FOCUS_ANIMATION, POPUP_DELAY };
use crate::models::websocket::{ ClientMessage, ServerMessage };

use std::error::Error;
use std::net::SocketAddr;
use std::num::NonZeroU32;

use tokio::net::TcpListener;
use tokio::io::{ AsyncRead, AsyncWrite };

use tokio_tungstenite::{ accept_async, WebSocketStream };
use tokio_tungstenite::tungstenite::protocol::Message;

use governor::{ RateLimiter, Quota, state::{ InMemoryState, NotKeyed }, clock::DefaultClock };

use futures::stream::SplitSink;
use futures::{ SinkExt, StreamExt };
use log::{ info, warn, error };

const MAX_MESSAGE_SIZE: usize = 1 * 1024 * 1024;

type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

pub async fn start_ws_server(
    addr: &str,
    controller: ConversationController,
    connection_rate: u32
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let listener = TcpListener::bind(addr).await?;
    info!("WS server listening on: {}", addr);

    let rate = NonZeroU32::new(connection_rate).unwrap_or(NonZeroU32::MIN);
    let limiter: Limiter = RateLimiter::direct(Quota::per_second(rate));

    loop {
        let (stream, peer) = listener.accept().await?;

        if limiter.check().is_err() {
            warn!("Connection rate limit exceeded for {}. Dropping connection.", peer);
            continue;
        }

        info!("Incoming connection from: {}", peer);
        let controller = controller.clone();
        tokio::spawn(async move {
            match accept_async(stream).await {
                Ok(websocket) => handle_connection(peer, websocket, controller).await,
                Err(e) => error!("WebSocket handshake error for {}: {}", peer, e),
            }
        });
    }
}

async fn send_frame<S>(
    tx: &mut SplitSink<WebSocketStream<S>, Message>,
    frame: &ServerMessage
) -> Result<(), Box<dyn Error + Send + Sync>>
    where S: AsyncRead + AsyncWrite + Unpin
{
    let json = serde_json::to_string(frame)?;
    tx.send(Message::Text(json)).await?;
    Ok(())
}

async fn dispatch(
    controller: &ConversationController,
    message: ClientMessage
) -> Option<ServerMessage> {
    match message {
        ClientMessage::Submit { question } => {
            if let Err(e) = controller.submit(&question).await {
                return Some(ServerMessage::Error { message: e.to_string() });
            }
        }
        ClientMessage::SelectMessage { id } => controller.select_message(id).await,
        ClientMessage::SelectPlace { ordinal } => controller.select_place(ordinal).await,
        ClientMessage::DeselectPlace => controller.deselect_place().await,
        ClientMessage::Clear => controller.clear_conversation().await,
    }
    None
}

/// Serves one observer: pushes every view-model change and forwards the
/// client's intents to the shared controller.
pub async fn handle_connection<S>(
    peer: SocketAddr,
    websocket: WebSocketStream<S>,
    controller: ConversationController
)
    where S: AsyncRead + AsyncWrite + Unpin
{
    let (mut tx, mut rx) = websocket.split();
    let mut updates = controller.subscribe();

    let hello = ServerMessage::Hello {
        session_id: controller.session_id().to_string(),
        suggestions: QUICK_SUGGESTIONS.iter()
            .map(|s| s.to_string())
            .collect(),
        focus_animation_ms: FOCUS_ANIMATION.as_millis() as u64,
        popup_delay_ms: POPUP_DELAY.as_millis() as u64,
    };
    let initial = ServerMessage::State(updates.borrow_and_update().clone());
    for frame in [hello, initial] {
        if let Err(e) = send_frame(&mut tx, &frame).await {
            error!("Failed to greet {}: {}", peer, e);
            return;
        }
    }

    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = ServerMessage::State(updates.borrow_and_update().clone());
                if let Err(e) = send_frame(&mut tx, &snapshot).await {
                    error!("Error sending state to {}: {}", peer, e);
                    break;
                }
            }
            msg = rx.next() => {
                let message = match msg {
                    Some(Ok(message)) => message,
                    Some(Err(e)) => {
                        info!("WebSocket connection closed or errored for {}: {}", peer, e);
                        break;
                    }
                    None => break,
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
                    let _ = send_frame(&mut tx, &error_msg).await;
                    break;
                }

                match message {
                    Message::Text(text) => {
                        let reply = match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(client_msg) => dispatch(&controller, client_msg).await,
                            Err(e) => {
                                warn!("Failed to parse message from {}: {}", peer, e);
                                Some(ServerMessage::Error {
                                    message: format!("Failed to parse message: {}", e),
                                })
                            }
                        };
                        if let Some(reply) = reply {
                            if let Err(e) = send_frame(&mut tx, &reply).await {
                                error!("Error sending reply to {}: {}", peer, e);
                                break;
                            }
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
                    Message::Pong(_) => {}
                    Message::Binary(_) => {
                        warn!("Ignoring binary message from {}", peer);
                    }
                    Message::Frame(_) => {}
                }
            }
        }
    }
    info!("WebSocket connection closed for {}", peer);
}
