//! WebSocket transport
//!
//! One task per socket. The task authenticates the handshake, registers
//! with the hub, then multiplexes its outbound queue with inbound frames
//! until either side closes.

use crate::chat::events::{ClientEvent, ServerEvent};
use crate::chat::hub::ChatHub;
use crate::chat::registry::{ConnectionHandle, Outbound};
use crate::core::auth::middleware::bearer_token;
use crate::core::config::AppState;
use crate::core::error::StoreError;
use crate::core::models::UserId;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::HeaderMap,
    response::Response,
};
use futures::stream::SplitStream;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{debug, error, info, warn};

#[derive(Debug, Deserialize)]
pub struct SocketQuery {
    token: Option<String>,
}

/// GET /ws
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<SocketQuery>,
    headers: HeaderMap,
) -> Response {
    let token = query
        .token
        .or_else(|| bearer_token(&headers).ok().map(str::to_string));
    ws.on_upgrade(move |socket| handle_socket(socket, state, token))
}

async fn handle_socket(socket: WebSocket, state: AppState, token: Option<String>) {
    let (mut sink, mut stream) = socket.split();

    let user_id = match authenticate(&state, token, &mut stream).await {
        Ok(user_id) => user_id,
        Err(reason) => {
            warn!("[Socket] Handshake rejected: {}", reason);
            let frame = ServerEvent::error(reason).to_frame();
            let _ = sink.send(Message::Text(frame.into())).await;
            let _ = sink.send(Message::Close(None)).await;
            return;
        }
    };

    let hub = state.hub.clone();
    let (handle, mut rx) = hub.connect(user_id);
    info!(
        "[Socket] User {} connected as {:?}",
        user_id,
        handle.id()
    );

    loop {
        tokio::select! {
            outbound = rx.recv() => match outbound {
                Some(Outbound::Event(event)) => {
                    if sink.send(Message::Text(event.to_frame().into())).await.is_err() {
                        debug!("[Socket] Write failed for user {}", user_id);
                        break;
                    }
                }
                Some(Outbound::Close) | None => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            },
            inbound = stream.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    handle_frame(&hub, &handle, text.as_str()).await;
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    debug!("[Socket] Read error for user {}: {}", user_id, e);
                    break;
                }
            },
        }
    }

    hub.disconnect(&handle);
    let connected_for = chrono::Utc::now() - handle.created_at();
    info!(
        "[Socket] User {} disconnected ({:?}) after {}s",
        user_id,
        handle.id(),
        connected_for.num_seconds()
    );
}

/// Resolve the socket's user from a query/header token, or from an `auth`
/// event sent as the first frame within the handshake timeout.
async fn authenticate(
    state: &AppState,
    token: Option<String>,
    stream: &mut SplitStream<WebSocket>,
) -> Result<UserId, &'static str> {
    let token = match token {
        Some(token) => token,
        None => match tokio::time::timeout(
            state.config.handshake_timeout,
            first_auth_frame(stream),
        )
        .await
        {
            Ok(Some(token)) => token,
            Ok(None) => return Err("expected auth event"),
            Err(_) => return Err("handshake timed out"),
        },
    };

    state.auth.validate_session(&token).await.map_err(|e| match e {
        StoreError::Unavailable(e) => {
            error!("[Socket] Session lookup failed: {}", e);
            "try again later"
        }
        _ => "invalid session",
    })
}

async fn first_auth_frame(stream: &mut SplitStream<WebSocket>) -> Option<String> {
    while let Some(Ok(message)) = stream.next().await {
        match message {
            Message::Text(text) => {
                return match ClientEvent::parse(text.as_str()) {
                    Ok(ClientEvent::Handshake { token }) => Some(token),
                    _ => None,
                };
            }
            Message::Close(_) => return None,
            _ => continue,
        }
    }
    None
}

/// Handle one inbound frame from an authenticated connection. Failures are
/// answered on the connection's own queue so they stay ordered with
/// everything else it receives.
pub(crate) async fn handle_frame(hub: &ChatHub, connection: &ConnectionHandle, frame: &str) {
    let sender = connection.user_id();
    let event = match ClientEvent::parse(frame) {
        Ok(event) => event,
        Err(e) => {
            debug!("[Socket] Bad frame from user {}: {}", sender, e);
            connection.send(ServerEvent::error("unrecognized event"));
            return;
        }
    };

    match event {
        ClientEvent::Handshake { .. } => {
            connection.send(ServerEvent::error("already authenticated"));
        }
        ClientEvent::Send { to, message } => match hub.send(sender, to, message).await {
            Ok(outcome) => debug!("[Socket] {} -> {}: {:?}", sender, to, outcome),
            Err(StoreError::Unavailable(e)) => {
                error!("[Socket] Could not store message {} -> {}: {}", sender, to, e);
                connection.send(ServerEvent::error("message not sent, try again"));
            }
            Err(e) => {
                connection.send(ServerEvent::error(e.to_string()));
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::directory::sqlite::tests::seeded_pool;
    use crate::chat::directory::{Directory, SqliteDirectoryStore};
    use crate::chat::registry::ConnectionRegistry;
    use std::sync::Arc;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn drain(rx: &mut UnboundedReceiver<Outbound>) -> Vec<ServerEvent> {
        std::iter::from_fn(|| rx.try_recv().ok())
            .filter_map(|out| match out {
                Outbound::Event(event) => Some(event),
                Outbound::Close => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_frames_route_through_hub() {
        let (_dir, pool) = seeded_pool(&[7, 9]).await;
        let registry = Arc::new(ConnectionRegistry::new());
        let directory = Arc::new(Directory::new(
            Arc::new(SqliteDirectoryStore::new(pool)),
            registry.clone(),
        ));
        let hub = ChatHub::new(registry, directory, 20);

        let (seven, mut rx7) = hub.connect(UserId(7));
        let (_nine, mut rx9) = hub.connect(UserId(9));
        drain(&mut rx7);
        drain(&mut rx9);

        handle_frame(&hub, &seven, r#"{"event":"chat:send","data":{"to":9,"message":"hi"}}"#).await;
        assert!(drain(&mut rx7).is_empty());
        assert!(matches!(
            drain(&mut rx9).as_slice(),
            [ServerEvent::MessageReceived { from: UserId(7), message, .. }] if message == "hi"
        ));

        handle_frame(&hub, &seven, "not json").await;
        handle_frame(&hub, &seven, r#"{"event":"auth","data":{"token":"x"}}"#).await;
        handle_frame(
            &hub,
            &seven,
            r#"{"event":"chat:send","data":{"to":9,"message":"this body is far too long"}}"#,
        )
        .await;
        let errors = drain(&mut rx7);
        assert_eq!(errors.len(), 3);
        assert!(errors
            .iter()
            .all(|event| matches!(event, ServerEvent::Error { .. })));
        assert!(drain(&mut rx9).is_empty());
    }
}
