//! Real-time channel: the client opens a WebSocket, sends an `auth`
//! message carrying the bearer token, and then issues `subscribe`
//! messages naming a room; server-pushed events arrive tagged with the
//! room they belong to.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use gitaudit_core::Role;
use gitaudit_eventbus::BusMessage;
use serde::{Deserialize, Serialize};

use crate::state::AppState;

pub async fn upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle(socket, state))
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ClientMessage {
    Auth { token: String },
    Subscribe { room: String },
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ServerMessage<'a> {
    Authenticated,
    Error { message: String },
    Event { room: &'a str, kind: String, payload: serde_json::Value },
    Dropped { room: &'a str, count: u64 },
}

async fn handle(mut socket: WebSocket, state: AppState) {
    let role = match authenticate(&mut socket, &state).await {
        Some(role) => role,
        None => return,
    };

    let mut subscriptions = Vec::new();
    loop {
        tokio::select! {
            incoming = socket.recv() => {
                let Some(Ok(Message::Text(text))) = incoming else { break };
                match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(ClientMessage::Subscribe { room }) => match state.events.subscribe(&room, role) {
                        Ok(subscription) => subscriptions.push(subscription),
                        Err(error) => {
                            let _ = send(&mut socket, &ServerMessage::Error { message: error.message }).await;
                        }
                    },
                    Ok(ClientMessage::Auth { .. }) => {}
                    Err(error) => {
                        let _ = send(&mut socket, &ServerMessage::Error { message: error.to_string() }).await;
                    }
                }
            }
            Some(message) = next_subscription_message(&subscriptions), if !subscriptions.is_empty() => {
                let (room, bus_message) = message;
                let outgoing = match bus_message {
                    BusMessage::Event(event) => {
                        ServerMessage::Event { room: &room, kind: event.kind, payload: event.payload }
                    }
                    BusMessage::Dropped(count) => ServerMessage::Dropped { room: &room, count },
                };
                if send(&mut socket, &outgoing).await.is_err() {
                    break;
                }
            }
        }
    }

    for subscription in &subscriptions {
        state.events.unsubscribe(subscription);
    }
}

async fn authenticate(socket: &mut WebSocket, state: &AppState) -> Option<Role> {
    let Some(Ok(Message::Text(text))) = socket.recv().await else { return None };
    let Ok(ClientMessage::Auth { token }) = serde_json::from_str::<ClientMessage>(&text) else {
        let _ = send(socket, &ServerMessage::Error { message: "expected an auth message first".to_string() }).await;
        return None;
    };

    let session = match state.auth.validate_session(&token).await {
        Ok(Some(session)) => session,
        _ => {
            let _ = send(socket, &ServerMessage::Error { message: "invalid session".to_string() }).await;
            return None;
        }
    };
    let user = match state.store.get_user(session.user_id).await {
        Ok(Some(user)) => user,
        _ => {
            let _ = send(socket, &ServerMessage::Error { message: "invalid session".to_string() }).await;
            return None;
        }
    };
    let Ok(role) = user.role.parse::<Role>() else {
        let _ = send(socket, &ServerMessage::Error { message: "invalid session".to_string() }).await;
        return None;
    };

    send(socket, &ServerMessage::Authenticated).await.ok()?;
    Some(role)
}

async fn next_subscription_message(
    subscriptions: &[gitaudit_eventbus::Subscription],
) -> Option<(String, BusMessage)> {
    if subscriptions.is_empty() {
        return None;
    }
    let futures = subscriptions.iter().map(|s| Box::pin(async move { (s.room().to_string(), s.recv().await) }));
    let (room, message) = futures::future::select_all(futures).await.0;
    message.map(|m| (room, m))
}

async fn send(socket: &mut WebSocket, message: &ServerMessage<'_>) -> Result<(), axum::Error> {
    let text = serde_json::to_string(message).unwrap_or_else(|_| "{}".to_string());
    socket.send(Message::Text(text)).await
}
