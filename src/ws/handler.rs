//! WebSocket upgrade handler

use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::ws::codec::encode_server;
use crate::ws::connection::{ConnectionHandler, Flow};
use crate::ws::protocol::ServerMsg;

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (conn, outbound_rx) =
        match ConnectionHandler::connect(&state.registry, &state.config.connection) {
            Ok(pair) => pair,
            Err(e) => {
                error!(error = %e, "Could not place WebSocket player");
                return;
            }
        };

    info!(
        player_id = %conn.player_id(),
        session_id = %conn.session_id(),
        "New WebSocket connection"
    );

    let (ws_sink, ws_stream) = socket.split();
    run_connection(
        conn,
        ws_sink,
        ws_stream,
        outbound_rx,
        state.config.connection.write_timeout,
    )
    .await;
}

/// Run the connection with read/write split
async fn run_connection(
    mut conn: ConnectionHandler,
    ws_sink: SplitSink<WebSocket, Message>,
    mut ws_stream: SplitStream<WebSocket>,
    outbound_rx: mpsc::Receiver<ServerMsg>,
    write_timeout: Duration,
) {
    let player_id = conn.player_id();

    // Writer task: session -> WebSocket
    let mut writer = tokio::spawn(write_loop(player_id, ws_sink, outbound_rx, write_timeout));

    // Reader loop: WebSocket -> session
    loop {
        let frame = tokio::select! {
            frame = ws_stream.next() => frame,
            _ = &mut writer => {
                debug!(player_id = %player_id, "Writer finished");
                break;
            }
        };

        match frame {
            Some(Ok(Message::Text(text))) => {
                if conn.on_bytes(text.as_bytes()) == Flow::Close {
                    break;
                }
            }
            Some(Ok(Message::Binary(_))) => {
                warn!(player_id = %player_id, "Received binary message, ignoring");
            }
            Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {}
            Some(Ok(Message::Close(_))) | None => {
                info!(player_id = %player_id, "Client closed connection");
                break;
            }
            Some(Err(e)) => {
                warn!(player_id = %player_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    conn.close();
    writer.abort();
}

async fn write_loop(
    player_id: Uuid,
    mut ws_sink: SplitSink<WebSocket, Message>,
    mut outbound_rx: mpsc::Receiver<ServerMsg>,
    write_timeout: Duration,
) {
    while let Some(msg) = outbound_rx.recv().await {
        let json = match encode_server(&msg) {
            Ok(json) => json,
            Err(e) => {
                error!(player_id = %player_id, error = %e, "Failed to encode message");
                continue;
            }
        };

        match tokio::time::timeout(write_timeout, ws_sink.send(Message::Text(json))).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                debug!(player_id = %player_id, error = %e, "WebSocket send failed");
                return;
            }
            Err(_) => {
                warn!(player_id = %player_id, "WebSocket write timed out");
                return;
            }
        }
    }

    // Session is done with us
    let _ = ws_sink.close().await;
}
