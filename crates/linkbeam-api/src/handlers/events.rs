//! /events: the WebSocket event channel.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::{SinkExt, StreamExt};

use linkbeam_services::{ClientMessage, EventFeed};

use super::ApiState;

pub async fn handle_events(ws: WebSocketUpgrade, State(state): State<ApiState>) -> Response {
    ws.on_upgrade(move |socket| client_session(socket, state))
}

/// Pump one client's feed until either side goes away.
async fn client_session(socket: WebSocket, state: ApiState) {
    let mut feed = EventFeed::attach(&state.device.device_id, &state.presence, &state.transfers);
    let (mut sink, mut stream) = socket.split();
    tracing::debug!("event client attached");

    loop {
        tokio::select! {
            event = feed.next() => {
                let Some(event) = event else { break };
                let text = match serde_json::to_string(&event) {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to encode event");
                        continue;
                    }
                };
                if sink.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => match ClientMessage::parse(text.as_str()) {
                    Some(ClientMessage::RequestDevices) => feed.request_devices(),
                    None => tracing::debug!(text = %text.as_str(), "ignoring unknown client message"),
                },
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    tracing::debug!("event client detached");
}
