//! WebSocket transport for hub events.

use axum::{
    Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
    routing::get,
};
use futures::{SinkExt, StreamExt};
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::api::AppState;

pub fn events_router() -> Router<AppState> {
    Router::new().route("/", get(upgrade))
}

async fn upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| observe(socket, state))
}

/// Forwards every hub envelope to the socket until either side goes away.
/// Client messages are read only to notice the close.
async fn observe(socket: WebSocket, state: AppState) {
    let (id, rx) = state.hub.subscribe();
    log::info!("Events: observer {} connected", id);

    let (mut sender, mut receiver) = socket.split();
    let mut events = UnboundedReceiverStream::new(rx);

    loop {
        tokio::select! {
            event = events.next() => {
                let Some(event) = event else { break };
                if let Err(e) = sender.send(Message::Text(event.to_string().into())).await {
                    log::debug!("Events: send to {} failed: {}", id, e);
                    break;
                }
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        log::debug!("Events: receive from {} failed: {}", id, e);
                        break;
                    }
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    state.hub.unregister(id);
    log::info!("Events: observer {} disconnected", id);
}
