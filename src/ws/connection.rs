//! Read/write loop of one live-feed connection.

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast;

use super::messages::{WsCommand, WsMessage, WsMessageType};
use super::subscription::TopicFilter;
use crate::domain::{EngineEvent, EventTopic};

/// Answers subscribe/unsubscribe commands and forwards engine events the
/// client subscribed to until either side closes.
pub async fn run_connection(
    socket: WebSocket,
    mut event_rx: broadcast::Receiver<EngineEvent>,
    connection_id: uuid::Uuid,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut filter = TopicFilter::new();
    tracing::debug!(%connection_id, "ws connection opened");

    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let response = handle_text_message(&text, &mut filter);
                        if let Some(resp_json) = response
                            && ws_tx.send(Message::text(resp_json)).await.is_err() {
                                break;
                            }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    _ => {}
                }
            }
            event = event_rx.recv() => {
                match event {
                    Ok(engine_event) => {
                        if let Some(json) = render_event(&engine_event, &filter)
                            && ws_tx.send(Message::text(json)).await.is_err() {
                                break;
                            }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(%connection_id, lagged = n, "ws client lagged behind event bus");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    tracing::debug!(%connection_id, "ws connection closed");
}

/// Serializes an event if the connection subscribed to its topic.
fn render_event(event: &EngineEvent, filter: &TopicFilter) -> Option<String> {
    if !filter.matches(event.topic()) {
        return None;
    }
    let msg = WsMessage::new(
        uuid::Uuid::new_v4().to_string(),
        WsMessageType::Event,
        serde_json::to_value(event).ok()?,
    );
    serde_json::to_string(&msg).ok()
}

/// Splits `["swaps", "*"]` into known topics and the wildcard flag.
fn parse_topics(names: &[String]) -> Result<(Vec<EventTopic>, bool), String> {
    let mut topics = Vec::new();
    let mut wildcard = false;
    for name in names {
        if name == "*" {
            wildcard = true;
        } else {
            topics.push(EventTopic::parse(name).ok_or_else(|| format!("unknown topic: {name}"))?);
        }
    }
    Ok((topics, wildcard))
}

/// Handles a text message from the client, returning an optional JSON response.
fn handle_text_message(text: &str, filter: &mut TopicFilter) -> Option<String> {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(text) else {
        return serde_json::to_string(&WsMessage::error(String::new(), 400, "malformed JSON")).ok();
    };

    let id = value
        .get("id")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    // Commands arrive bare or wrapped in the message envelope.
    let body = value.get("payload").cloned().unwrap_or(value);
    let Ok(command) = serde_json::from_value::<WsCommand>(body) else {
        return serde_json::to_string(&WsMessage::error(id, 404, "unknown command")).ok();
    };

    let response = match command {
        WsCommand::Subscribe { topics } => match parse_topics(&topics) {
            Ok((parsed, wildcard)) => {
                filter.subscribe(&parsed, wildcard);
                subscription_state(id, filter)
            }
            Err(message) => WsMessage::error(id, 400, &message),
        },
        WsCommand::Unsubscribe { topics } => match parse_topics(&topics) {
            Ok((parsed, wildcard)) => {
                filter.unsubscribe(&parsed, wildcard);
                subscription_state(id, filter)
            }
            Err(message) => WsMessage::error(id, 400, &message),
        },
    };
    serde_json::to_string(&response).ok()
}

/// Response to a command: the topics the connection now receives.
fn subscription_state(id: String, filter: &TopicFilter) -> WsMessage {
    WsMessage::new(
        id,
        WsMessageType::Response,
        serde_json::json!({
            "topics": filter.topics(),
            "wildcard": filter.is_all(),
        }),
    )
}
