//! Session registry - pairs players into sessions

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::GameSettings;
use crate::game::{GameSession, Outbound, SessionHandle};

/// Attempts to place a player before giving up
const ASSIGN_ATTEMPTS: usize = 3;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RegistryError {
    #[error("session is full")]
    SessionFull,

    #[error("session is no longer waiting for players")]
    NotWaiting,

    #[error("session has ended")]
    SessionEnded,

    #[error("no session could take the player")]
    Unavailable,
}

struct RegistryInner {
    settings: GameSettings,
    /// Live sessions in creation order
    sessions: Mutex<Vec<SessionHandle>>,
    /// player -> session
    players: DashMap<Uuid, Uuid>,
}

/// Registry of live sessions
#[derive(Clone)]
pub struct GameRegistry {
    inner: Arc<RegistryInner>,
}

impl GameRegistry {
    pub fn new(settings: GameSettings) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                settings,
                sessions: Mutex::new(Vec::new()),
                players: DashMap::new(),
            }),
        }
    }

    /// First waiting session with a free seat, or a freshly spawned one
    pub fn find_or_create_session(&self) -> SessionHandle {
        let mut sessions = self.inner.sessions.lock();
        self.find_or_create_locked(&mut sessions)
    }

    fn find_or_create_locked(&self, sessions: &mut Vec<SessionHandle>) -> SessionHandle {
        if let Some(session) = sessions.iter().find(|s| s.has_capacity()) {
            return session.clone();
        }

        let session_id = Uuid::new_v4();
        let seed = rand::random::<u64>();
        let (session, handle) = GameSession::new(session_id, seed, self.inner.settings.clone());
        sessions.push(handle.clone());

        info!(session_id = %session_id, seed, "Created new session");

        let registry = self.clone();
        tokio::spawn(async move {
            session.run().await;
            registry.remove_session(session_id);
        });

        handle
    }

    /// Seat a player in `session`; the session replies with `init` and
    /// starts once full. Returns the join index.
    pub fn join(
        &self,
        session: &SessionHandle,
        player_id: Uuid,
        outbound: Outbound,
    ) -> Result<usize, RegistryError> {
        let index = session.reserve_seat()?;
        session.join(player_id, outbound)?;
        self.inner.players.insert(player_id, session.id);

        info!(
            session_id = %session.id,
            player_id = %player_id,
            join_index = index,
            "Player assigned to session"
        );
        Ok(index)
    }

    /// Find or create a session and join it in one step
    pub fn assign(&self, player_id: Uuid, outbound: Outbound) -> Result<SessionHandle, RegistryError> {
        let mut sessions = self.inner.sessions.lock();

        for attempt in 1..=ASSIGN_ATTEMPTS {
            let session = self.find_or_create_locked(&mut sessions);
            match self.join(&session, player_id, outbound.clone()) {
                Ok(_) => return Ok(session),
                Err(e) => {
                    debug!(session_id = %session.id, attempt, error = %e, "Session unavailable, retrying");
                    if e == RegistryError::SessionEnded {
                        sessions.retain(|s| s.id != session.id);
                    }
                }
            }
        }

        warn!(player_id = %player_id, "Could not place player");
        Err(RegistryError::Unavailable)
    }

    /// Forget a player once its connection is gone
    pub fn release(&self, player_id: Uuid) {
        self.inner.players.remove(&player_id);
    }

    fn remove_session(&self, session_id: Uuid) {
        self.inner.sessions.lock().retain(|s| s.id != session_id);
        self.inner.players.retain(|_, s| *s != session_id);
        info!(session_id = %session_id, "Session removed");
    }

    pub fn active_sessions(&self) -> usize {
        self.inner.sessions.lock().len()
    }

    pub fn active_players(&self) -> usize {
        self.inner.players.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::SessionStatus;
    use crate::ws::protocol::ServerMsg;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    fn registry() -> GameRegistry {
        GameRegistry::new(GameSettings {
            tick_period: Duration::from_millis(20),
            ..GameSettings::default()
        })
    }

    #[tokio::test]
    async fn test_pairs_players_then_opens_new_session() {
        let registry = registry();
        let (tx, _rx1) = mpsc::channel(64);
        let first = registry.assign(Uuid::new_v4(), tx).unwrap();
        let (tx, _rx2) = mpsc::channel(64);
        let second = registry.assign(Uuid::new_v4(), tx).unwrap();
        assert_eq!(first.id, second.id);

        let (tx, _rx3) = mpsc::channel(64);
        let third = registry.assign(Uuid::new_v4(), tx).unwrap();
        assert_ne!(third.id, first.id);
        assert_eq!(registry.active_sessions(), 2);
        assert_eq!(registry.active_players(), 3);
    }

    #[tokio::test]
    async fn test_join_rejects_full_session() {
        let registry = registry();
        let session = registry.find_or_create_session();
        for _ in 0..2 {
            let (tx, _rx) = mpsc::channel(64);
            registry.join(&session, Uuid::new_v4(), tx).unwrap();
        }
        let (tx, _rx) = mpsc::channel(64);
        assert_eq!(
            registry.join(&session, Uuid::new_v4(), tx),
            Err(RegistryError::SessionFull)
        );
    }

    #[tokio::test]
    async fn test_join_sends_init() {
        let registry = registry();
        let player_id = Uuid::new_v4();
        let (tx, mut rx) = mpsc::channel(64);
        let session = registry.assign(player_id, tx).unwrap();

        let msg = timeout(Duration::from_secs(2), rx.recv()).await.unwrap();
        assert_eq!(msg, Some(ServerMsg::Init { id: player_id }));
        assert_eq!(session.status(), SessionStatus::Waiting);
        assert_eq!(registry.active_players(), 1);
    }

    #[tokio::test]
    async fn test_join_after_lone_player_left_opens_fresh_session() {
        let registry = registry();
        let a = Uuid::new_v4();
        let (tx, _rx_a) = mpsc::channel(64);
        let first = registry.assign(a, tx).unwrap();
        // Worker has not run yet: its queue holds the join and the disconnect
        first.disconnect(a);

        let b = Uuid::new_v4();
        let (tx, mut rx_b) = mpsc::channel(64);
        let second = registry.assign(b, tx).unwrap();
        assert_ne!(second.id, first.id);

        let msg = timeout(Duration::from_secs(2), rx_b.recv()).await.unwrap();
        assert_eq!(msg, Some(ServerMsg::Init { id: b }));
        assert_eq!(second.status(), SessionStatus::Waiting);
    }

    #[tokio::test]
    async fn test_ended_session_is_removed() {
        let registry = registry();
        let player_id = Uuid::new_v4();
        let (tx, mut rx) = mpsc::channel(64);
        let session = registry.assign(player_id, tx).unwrap();

        session.disconnect(player_id);
        // Outbound closes once the worker is done
        timeout(Duration::from_secs(2), async { while rx.recv().await.is_some() {} })
            .await
            .unwrap();
        timeout(Duration::from_secs(2), async {
            while registry.active_sessions() > 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(registry.active_players(), 0);

        let (tx, _rx) = mpsc::channel(64);
        let next = registry.assign(Uuid::new_v4(), tx).unwrap();
        assert_ne!(next.id, session.id);
    }
}
