//! Raw TCP transport
//!
//! Carries the same JSON objects as the WebSocket endpoint, written back to
//! back with no framing.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::ConnectionSettings;
use crate::matchmaking::GameRegistry;
use crate::ws::codec::encode_server;
use crate::ws::connection::{ConnectionHandler, Flow};
use crate::ws::protocol::ServerMsg;

const READ_BUFFER: usize = 1024;

/// Accept raw TCP players until the listener fails
pub async fn serve(
    listener: TcpListener,
    registry: GameRegistry,
    settings: ConnectionSettings,
) -> std::io::Result<()> {
    loop {
        let (stream, peer) = listener.accept().await?;
        let registry = registry.clone();
        let settings = settings.clone();
        tokio::spawn(async move {
            handle_stream(stream, peer, registry, settings).await;
        });
    }
}

async fn handle_stream(
    stream: TcpStream,
    peer: SocketAddr,
    registry: GameRegistry,
    settings: ConnectionSettings,
) {
    if let Err(e) = stream.set_nodelay(true) {
        debug!(%peer, error = %e, "Could not set TCP_NODELAY");
    }

    let (conn, outbound_rx) = match ConnectionHandler::connect(&registry, &settings) {
        Ok(pair) => pair,
        Err(e) => {
            error!(%peer, error = %e, "Could not place TCP player");
            return;
        }
    };

    info!(
        %peer,
        player_id = %conn.player_id(),
        session_id = %conn.session_id(),
        "New TCP connection"
    );

    let (reader, writer) = stream.into_split();
    let writer = tokio::spawn(write_loop(
        conn.player_id(),
        writer,
        outbound_rx,
        settings.write_timeout,
    ));
    read_loop(conn, reader, writer).await;
}

async fn read_loop(
    mut conn: ConnectionHandler,
    mut reader: OwnedReadHalf,
    mut writer: tokio::task::JoinHandle<()>,
) {
    let player_id = conn.player_id();
    let mut buf = [0u8; READ_BUFFER];

    loop {
        let read = tokio::select! {
            read = reader.read(&mut buf) => read,
            _ = &mut writer => {
                debug!(player_id = %player_id, "Writer finished");
                break;
            }
        };

        match read {
            Ok(0) => {
                info!(player_id = %player_id, "Client closed connection");
                break;
            }
            Ok(n) => {
                if conn.on_bytes(&buf[..n]) == Flow::Close {
                    break;
                }
            }
            Err(e) => {
                warn!(player_id = %player_id, error = %e, "TCP read error");
                break;
            }
        }
    }

    conn.close();
    writer.abort();
}

async fn write_loop(
    player_id: Uuid,
    mut writer: OwnedWriteHalf,
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

        match tokio::time::timeout(write_timeout, writer.write_all(json.as_bytes())).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                debug!(player_id = %player_id, error = %e, "TCP send failed");
                return;
            }
            Err(_) => {
                warn!(player_id = %player_id, "TCP write timed out");
                return;
            }
        }
    }

    let _ = writer.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GameSettings;
    use crate::ws::codec::ObjectSplitter;

    async fn read_objects(stream: &mut TcpStream, splitter: &mut ObjectSplitter) -> Vec<ServerMsg> {
        let mut buf = [0u8; READ_BUFFER];
        let n = tokio::time::timeout(Duration::from_secs(2), stream.read(&mut buf))
            .await
            .unwrap()
            .unwrap();
        splitter
            .push(&buf[..n])
            .into_iter()
            .map(|o| serde_json::from_str(&o.unwrap()).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_two_tcp_players_start_a_game() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let registry = GameRegistry::new(GameSettings {
            tick_period: Duration::from_millis(20),
            ..GameSettings::default()
        });
        tokio::spawn(serve(listener, registry, ConnectionSettings::default()));

        let mut a = TcpStream::connect(addr).await.unwrap();
        let mut splitter = ObjectSplitter::new();
        let first = read_objects(&mut a, &mut splitter).await;
        assert!(matches!(first[0], ServerMsg::Init { .. }));

        let mut b = TcpStream::connect(addr).await.unwrap();
        b.write_all(br#"{"type":"turn","direction":"SOUTH"}"#).await.unwrap();

        let mut seen = first;
        while !seen.iter().any(|m| matches!(m, ServerMsg::Start { .. })) {
            seen.extend(read_objects(&mut a, &mut splitter).await);
        }
        let players = seen
            .iter()
            .find_map(|m| match m {
                ServerMsg::Start { players, .. } => Some(players.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(players.len(), 2);

        drop(b);
        let mut game_over = false;
        loop {
            let batch = read_objects(&mut a, &mut splitter).await;
            if batch.iter().any(|m| m.is_game_over()) {
                game_over = true;
                break;
            }
            if batch.is_empty() && splitter.pending() == 0 {
                break;
            }
        }
        assert!(game_over, "peer sees GAME_OVER before EOF");
    }
}
