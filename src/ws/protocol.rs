//! Wire protocol message definitions
//! JSON objects tagged by `type`, shared by the WebSocket and raw TCP transports

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::game::grid::{Coordinate, Direction};
use crate::game::state::SessionStatus;

/// Messages sent from client to server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Change heading of the sender's snake
    Turn { direction: Direction },
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Join acknowledgment carrying the assigned player id
    Init { id: Uuid },

    /// Session is full and the clock is about to start
    Start {
        /// Participants in join order
        players: Vec<Uuid>,
        /// Board size in pixels
        board_size: Size,
        /// Block size in pixels
        block_size: Size,
    },

    /// Relay of an accepted turn
    Turn { id: Uuid, direction: Direction },

    /// Authoritative snapshot
    State {
        snakes: Vec<SnakeSnapshot>,
        fruit: Option<Coordinate>,
        state: SessionStatus,
    },

    /// Tick heartbeat
    Move,
}

/// Width/height pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Size {
    pub w: u32,
    pub h: u32,
}

/// One snake in a state snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnakeSnapshot {
    pub id: Uuid,
    /// Head first
    pub blocks: Vec<Coordinate>,
    /// Head heading
    pub direction: Direction,
    /// Fruit eaten so far
    pub score: u32,
}

impl ServerMsg {
    pub fn is_game_over(&self) -> bool {
        matches!(
            self,
            ServerMsg::State {
                state: SessionStatus::GameOver,
                ..
            }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_turn_from_client() {
        let msg: ClientMsg =
            serde_json::from_str(r#"{"type":"turn","direction":"NORTH"}"#).unwrap();
        assert_eq!(
            msg,
            ClientMsg::Turn {
                direction: Direction::North
            }
        );
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        assert!(serde_json::from_str::<ClientMsg>(r#"{"type":"start"}"#).is_err());
        assert!(serde_json::from_str::<ClientMsg>(r#"{"type":"turn","direction":"UP"}"#).is_err());
    }

    #[test]
    fn test_state_shape() {
        let id = Uuid::nil();
        let msg = ServerMsg::State {
            snakes: vec![SnakeSnapshot {
                id,
                blocks: vec![Coordinate::new(2, 0), Coordinate::new(1, 0)],
                direction: Direction::East,
                score: 3,
            }],
            fruit: Some(Coordinate::new(5, 6)),
            state: SessionStatus::InProgress,
        };
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({
                "type": "state",
                "snakes": [{
                    "id": id.to_string(),
                    "blocks": [{"x": 2, "y": 0}, {"x": 1, "y": 0}],
                    "direction": "EAST",
                    "score": 3
                }],
                "fruit": {"x": 5, "y": 6},
                "state": "IN_PROGRESS"
            })
        );
    }

    #[test]
    fn test_start_and_move_shape() {
        let id = Uuid::nil();
        let start = ServerMsg::Start {
            players: vec![id],
            board_size: Size { w: 400, h: 400 },
            block_size: Size { w: 10, h: 10 },
        };
        assert_eq!(
            serde_json::to_value(&start).unwrap(),
            json!({
                "type": "start",
                "players": [id.to_string()],
                "board_size": {"w": 400, "h": 400},
                "block_size": {"w": 10, "h": 10}
            })
        );
        assert_eq!(serde_json::to_value(&ServerMsg::Move).unwrap(), json!({"type": "move"}));
    }
}
