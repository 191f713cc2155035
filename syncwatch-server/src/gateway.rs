use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
    routing::get,
};
use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use syncwatch_collab::{Command, ConnectionHandle};

use crate::{
    auth::Identity,
    context::ServerContext,
    protocol::{ClientMessage, ServerMessage},
    Router,
};

/// Frames are small JSON documents, nothing close to the default limit is needed
const MAX_FRAME_SIZE: usize = 64 * 1024;

#[utoipa::path(
    get,
    path = "/v1/gateway",
    tag = "gateway",
    params(
        ("user" = Option<String>, Query, description = "Principal id, when the header can't be set")
    ),
    responses(
        (status = 101, description = "Switching to the JSON gateway protocol")
    )
)]
async fn gateway(
    State(context): State<ServerContext>,
    Identity(identity): Identity,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.max_message_size(MAX_FRAME_SIZE)
        .on_upgrade(move |socket| handle_socket(socket, context, identity))
}

async fn handle_socket(socket: WebSocket, context: ServerContext, identity: Option<String>) {
    let mut connection = context.coordinator.connect(identity.as_deref());
    let connection_id = connection.id();

    let Some(mut outbox) = connection.take_outbox() else {
        warn!("Connection {} has no outbox", connection_id);
        return;
    };

    let (mut sink, mut stream) = socket.split();

    // Drains the outbox into the socket. Ends when the connection is dropped.
    let writer = tokio::spawn(async move {
        while let Some(message) = outbox.recv().await {
            let payload = match serde_json::to_string(&ServerMessage::from(message)) {
                Ok(payload) => payload,
                Err(e) => {
                    warn!("Could not serialize message for {}: {}", connection_id, e);
                    continue;
                }
            };

            if let Err(e) = sink.send(Message::Text(payload)).await {
                debug!("Failed to write to connection {}: {}", connection_id, e);
                break;
            }
        }

        let _ = sink.close().await;
    });

    info!("Gateway connection {} established", connection_id);

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => handle_frame(&connection, &text),
            Ok(Message::Binary(bytes)) => match std::str::from_utf8(&bytes) {
                Ok(text) => handle_frame(&connection, text),
                Err(_) => connection.reject("Binary frames must contain UTF-8 JSON"),
            },
            Ok(Message::Close(_)) => break,
            // Pings are answered by axum
            Ok(_) => {}
            Err(e) => {
                debug!("Connection {} errored: {}", connection_id, e);
                break;
            }
        }
    }

    drop(connection);
    let _ = writer.await;

    info!("Gateway connection {} closed", connection_id);
}

fn handle_frame(connection: &ConnectionHandle, text: &str) {
    let command = ClientMessage::parse(text).and_then(Command::try_from);

    match command {
        Ok(command) => connection.handle(command),
        Err(reason) => connection.reject(reason),
    }
}

pub fn router() -> Router {
    Router::new().route("/gateway", get(gateway))
}
