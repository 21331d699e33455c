//! Transport-independent half of a player connection
//!
//! Both the WebSocket and raw TCP transports feed received bytes into a
//! `ConnectionHandler` and drain its outbound queue in a writer task.

use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::ConnectionSettings;
use crate::game::intent::SubmitError;
use crate::game::SessionHandle;
use crate::matchmaking::{GameRegistry, RegistryError};
use crate::util::rate_limit::PlayerRateLimiter;

use super::codec::{decode_client, ObjectSplitter};
use super::protocol::{ClientMsg, ServerMsg};

/// Whether the receive loop should keep reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Close,
}

pub struct ConnectionHandler {
    player_id: Uuid,
    session: SessionHandle,
    registry: GameRegistry,
    splitter: ObjectSplitter,
    rate_limiter: PlayerRateLimiter,
    protocol_errors: u32,
    max_protocol_errors: u32,
}

impl ConnectionHandler {
    /// Register a new player and seat it in a session.
    /// The receiver carries everything the session sends this player.
    pub fn connect(
        registry: &GameRegistry,
        settings: &ConnectionSettings,
    ) -> Result<(Self, mpsc::Receiver<ServerMsg>), RegistryError> {
        let player_id = Uuid::new_v4();
        let (outbound, outbound_rx) = mpsc::channel(settings.outbound_buffer);
        let session = registry.assign(player_id, outbound)?;

        let handler = Self {
            player_id,
            session,
            registry: registry.clone(),
            splitter: ObjectSplitter::new(),
            rate_limiter: PlayerRateLimiter::new(),
            protocol_errors: 0,
            max_protocol_errors: settings.max_protocol_errors,
        };
        Ok((handler, outbound_rx))
    }

    pub fn player_id(&self) -> Uuid {
        self.player_id
    }

    pub fn session_id(&self) -> Uuid {
        self.session.id
    }

    /// Process one transport read
    pub fn on_bytes(&mut self, bytes: &[u8]) -> Flow {
        for object in self.splitter.push(bytes) {
            let msg = match object.and_then(|text| decode_client(&text)) {
                Ok(msg) => msg,
                Err(e) => {
                    self.protocol_errors += 1;
                    warn!(
                        player_id = %self.player_id,
                        error = %e,
                        consecutive = self.protocol_errors,
                        "Discarding bad client message"
                    );
                    if self.protocol_errors > self.max_protocol_errors {
                        warn!(player_id = %self.player_id, "Too many protocol errors, closing");
                        return Flow::Close;
                    }
                    continue;
                }
            };
            self.protocol_errors = 0;

            if self.dispatch(msg) == Flow::Close {
                return Flow::Close;
            }
        }
        Flow::Continue
    }

    fn dispatch(&mut self, msg: ClientMsg) -> Flow {
        match msg {
            ClientMsg::Turn { direction } => {
                if !self.rate_limiter.check_turn() {
                    warn!(player_id = %self.player_id, "Rate limited turn message");
                    return Flow::Continue;
                }
                match self.session.submit_turn(self.player_id, direction) {
                    Ok(()) => Flow::Continue,
                    Err(SubmitError::QueueFull) => {
                        warn!(player_id = %self.player_id, "Intent queue full, dropping turn");
                        Flow::Continue
                    }
                    Err(SubmitError::SessionEnded) => {
                        debug!(player_id = %self.player_id, "Session gone");
                        Flow::Close
                    }
                }
            }
        }
    }

    /// Tell the session this player is gone. Terminal.
    pub fn close(self) {
        self.session.disconnect(self.player_id);
        self.registry.release(self.player_id);
        info!(
            player_id = %self.player_id,
            session_id = %self.session.id,
            "Connection closed"
        );
    }
}
