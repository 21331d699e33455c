//! Snapshot building and fan-out to session participants

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::warn;
use uuid::Uuid;

use crate::ws::protocol::{ServerMsg, SnakeSnapshot};

use super::state::GameState;

/// Outbound queue of one connection, drained by its transport writer
pub type Outbound = mpsc::Sender<ServerMsg>;

/// Build the `state` message for the current game state
pub fn build_state(state: &GameState) -> ServerMsg {
    let snakes = state
        .snakes()
        .iter()
        .map(|snake| SnakeSnapshot {
            id: snake.owner(),
            blocks: snake.segments().map(|s| s.at).collect(),
            direction: snake.heading(),
            score: snake.score(),
        })
        .collect();

    ServerMsg::State {
        snakes,
        fruit: state.fruit(),
        state: state.status,
    }
}

#[derive(Debug)]
struct Participant {
    player_id: Uuid,
    outbound: Outbound,
}

/// Sends messages to every connection of a session.
///
/// Sends never wait. A connection whose queue is full is stalled, one whose
/// queue is closed is gone; both are reported back as failed.
#[derive(Debug, Default)]
pub struct StateBroadcaster {
    participants: Vec<Participant>,
}

impl StateBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, player_id: Uuid, outbound: Outbound) {
        self.participants.push(Participant {
            player_id,
            outbound,
        });
    }

    /// Stop sending to a player; true if it was present
    pub fn remove(&mut self, player_id: Uuid) -> bool {
        let before = self.participants.len();
        self.participants.retain(|p| p.player_id != player_id);
        self.participants.len() != before
    }

    /// Send to one player. False on failure.
    pub fn send_to(&self, player_id: Uuid, msg: ServerMsg) -> bool {
        match self.participants.iter().find(|p| p.player_id == player_id) {
            Some(p) => Self::deliver(p, msg),
            None => false,
        }
    }

    /// Send to everyone, attempting each even after a failure.
    /// Returns the players that could not be reached.
    pub fn broadcast(&self, msg: &ServerMsg) -> Vec<Uuid> {
        self.participants
            .iter()
            .filter(|p| !Self::deliver(p, msg.clone()))
            .map(|p| p.player_id)
            .collect()
    }

    /// Drop every outbound handle so the writers drain and close
    pub fn close(&mut self) {
        self.participants.clear();
    }

    fn deliver(p: &Participant, msg: ServerMsg) -> bool {
        match p.outbound.try_send(msg) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(player_id = %p.player_id, "Outbound queue full, treating client as stalled");
                false
            }
            Err(TrySendError::Closed(_)) => {
                warn!(player_id = %p.player_id, "Outbound queue closed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::grid::{Bounds, Coordinate, Direction};
    use crate::game::snake::{Segment, Snake};
    use crate::game::state::SessionStatus;

    #[test]
    fn test_state_lists_segments_head_first() {
        let id = Uuid::new_v4();
        let mut state = GameState::new(Uuid::new_v4(), Bounds::new(10, 10), 2, 3);
        state.add_snake(Snake::from_segments(
            id,
            [
                Segment { at: Coordinate::new(2, 1), heading: Direction::South },
                Segment { at: Coordinate::new(2, 0), heading: Direction::East },
            ],
        ));
        state.set_fruit(Some(Coordinate::new(7, 7)));

        match build_state(&state) {
            ServerMsg::State { snakes, fruit, state } => {
                assert_eq!(state, SessionStatus::Waiting);
                assert_eq!(fruit, Some(Coordinate::new(7, 7)));
                assert_eq!(snakes.len(), 1);
                assert_eq!(snakes[0].id, id);
                assert_eq!(snakes[0].blocks, vec![Coordinate::new(2, 1), Coordinate::new(2, 0)]);
                assert_eq!(snakes[0].direction, Direction::South);
                assert_eq!(snakes[0].score, 0);
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn test_state_carries_score_per_snake() {
        let eater = Uuid::new_v4();
        let idle = Uuid::new_v4();
        let mut state = GameState::new(Uuid::new_v4(), Bounds::new(10, 10), 2, 3);
        state.add_player(eater).unwrap();
        state.add_player(idle).unwrap();
        state.status = SessionStatus::InProgress;
        state.set_fruit(Some(Coordinate::new(1, 0)));
        state.step().unwrap();

        match build_state(&state) {
            ServerMsg::State { snakes, .. } => {
                let scores: Vec<(Uuid, u32)> = snakes.iter().map(|s| (s.id, s.score)).collect();
                assert_eq!(scores, vec![(eater, 1), (idle, 0)]);
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn test_broadcast_reaches_healthy_peers_despite_failures() {
        let mut broadcaster = StateBroadcaster::new();
        let (gone_tx, gone_rx) = mpsc::channel(4);
        let (stalled_tx, _stalled_rx) = mpsc::channel(1);
        let (ok_tx, mut ok_rx) = mpsc::channel(4);
        let gone = Uuid::new_v4();
        let stalled = Uuid::new_v4();
        let healthy = Uuid::new_v4();
        drop(gone_rx);
        stalled_tx.try_send(ServerMsg::Move).unwrap();

        broadcaster.add(gone, gone_tx);
        broadcaster.add(stalled, stalled_tx);
        broadcaster.add(healthy, ok_tx);

        let failed = broadcaster.broadcast(&ServerMsg::Move);
        assert_eq!(failed, vec![gone, stalled]);
        assert_eq!(ok_rx.try_recv().unwrap(), ServerMsg::Move);
    }

    #[test]
    fn test_close_ends_receivers() {
        let mut broadcaster = StateBroadcaster::new();
        let (tx, mut rx) = mpsc::channel(4);
        let id = Uuid::new_v4();
        broadcaster.add(id, tx);
        assert!(broadcaster.send_to(id, ServerMsg::Init { id }));
        broadcaster.close();

        assert_eq!(rx.try_recv().unwrap(), ServerMsg::Init { id });
        assert!(matches!(
            rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
        assert!(!broadcaster.send_to(id, ServerMsg::Move));
    }
}
