//! Authoritative per-session game state

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::GameError;
use super::fruit::FruitSpawner;
use super::grid::{Bounds, Coordinate, Direction};
use super::snake::Snake;

/// Session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    /// Waiting for players
    Waiting,
    /// Clock running
    InProgress,
    /// Terminal
    GameOver,
}

impl SessionStatus {
    pub fn as_u8(self) -> u8 {
        match self {
            SessionStatus::Waiting => 0,
            SessionStatus::InProgress => 1,
            SessionStatus::GameOver => 2,
        }
    }

    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => SessionStatus::Waiting,
            1 => SessionStatus::InProgress,
            _ => SessionStatus::GameOver,
        }
    }
}

/// Spawn cell for the player with the given join index
pub fn spawn_point(join_index: usize) -> Coordinate {
    Coordinate::new(0, 2 * join_index as i32)
}

/// Result of one simulation step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Every snake moved; lists the players that ate this tick
    Advanced { fed: Vec<Uuid> },
    /// At least one candidate head was invalid; nothing moved
    Collision { players: Vec<Uuid> },
}

/// Game state (owned by the session task)
#[derive(Debug)]
pub struct GameState {
    pub id: Uuid,
    pub bounds: Bounds,
    pub status: SessionStatus,
    pub tick: u64,
    max_players: usize,
    /// Join order
    snakes: Vec<Snake>,
    fruit: Option<Coordinate>,
    spawner: FruitSpawner,
}

impl GameState {
    pub fn new(id: Uuid, bounds: Bounds, max_players: usize, seed: u64) -> Self {
        Self {
            id,
            bounds,
            status: SessionStatus::Waiting,
            tick: 0,
            max_players,
            snakes: Vec::with_capacity(max_players),
            fruit: None,
            spawner: FruitSpawner::new(seed),
        }
    }

    pub fn player_count(&self) -> usize {
        self.snakes.len()
    }

    pub fn is_full(&self) -> bool {
        self.snakes.len() >= self.max_players
    }

    pub fn player_ids(&self) -> Vec<Uuid> {
        self.snakes.iter().map(|s| s.owner()).collect()
    }

    pub fn snakes(&self) -> &[Snake] {
        &self.snakes
    }

    pub fn snake(&self, player_id: Uuid) -> Option<&Snake> {
        self.snakes.iter().find(|s| s.owner() == player_id)
    }

    pub fn fruit(&self) -> Option<Coordinate> {
        self.fruit
    }

    /// Add a player at its join-order spawn cell
    pub fn add_player(&mut self, player_id: Uuid) -> Result<Coordinate, GameError> {
        if self.status != SessionStatus::Waiting || self.is_full() {
            return Err(GameError::SessionClosed);
        }
        let at = spawn_point(self.snakes.len());
        self.add_snake(Snake::new(player_id, at, Direction::East));
        Ok(at)
    }

    pub(crate) fn add_snake(&mut self, snake: Snake) {
        self.snakes.push(snake);
    }

    /// Enter InProgress and place the first fruit
    pub fn start(&mut self) -> Result<(), GameError> {
        self.status = SessionStatus::InProgress;
        self.respawn_fruit()
    }

    pub fn end(&mut self) {
        self.status = SessionStatus::GameOver;
    }

    pub fn is_over(&self) -> bool {
        self.status == SessionStatus::GameOver
    }

    /// Any segment of any snake on `c`
    pub fn occupied(&self, c: Coordinate) -> bool {
        self.snakes.iter().any(|s| s.occupies(c))
    }

    /// Can `mover`'s head enter `c` this tick, judged on tick-start positions.
    /// The mover's own tail cell counts as free when the tail is leaving it.
    pub fn is_valid(&self, c: Coordinate, mover: Uuid) -> bool {
        if !self.bounds.contains(c) {
            return false;
        }
        self.snakes.iter().all(|snake| {
            if !snake.occupies(c) {
                return true;
            }
            snake.owner() == mover && snake.vacating_tail() == Some(c)
        })
    }

    /// Record a turn for a player's snake
    pub fn apply_turn(&mut self, player_id: Uuid, direction: Direction) -> bool {
        self.snakes
            .iter_mut()
            .find(|s| s.owner() == player_id)
            .map(|s| s.turn(direction))
            .unwrap_or(false)
    }

    /// Advance every snake by one cell.
    ///
    /// All candidate heads are checked before any snake moves. On any invalid
    /// candidate the state goes GameOver and nothing is committed.
    pub fn step(&mut self) -> Result<TickOutcome, GameError> {
        self.tick += 1;

        let candidates: Vec<(Uuid, Coordinate)> = self
            .snakes
            .iter()
            .map(|s| (s.owner(), s.next_head()))
            .collect();

        let crashed: Vec<Uuid> = candidates
            .iter()
            .filter(|(id, c)| {
                let head_on = candidates.iter().any(|(other, oc)| other != id && oc == c);
                head_on || !self.is_valid(*c, *id)
            })
            .map(|(id, _)| *id)
            .collect();

        if !crashed.is_empty() {
            self.end();
            return Ok(TickOutcome::Collision { players: crashed });
        }

        for snake in &mut self.snakes {
            snake.advance();
        }

        let mut fed = Vec::new();
        if let Some(fruit) = self.fruit {
            for snake in &mut self.snakes {
                if snake.head().at == fruit {
                    snake.grow();
                    fed.push(snake.owner());
                }
            }
        }
        if !fed.is_empty() {
            if let Err(e) = self.respawn_fruit() {
                self.end();
                return Err(e);
            }
        }

        Ok(TickOutcome::Advanced { fed })
    }

    fn respawn_fruit(&mut self) -> Result<(), GameError> {
        let snakes = &self.snakes;
        let fruit = self
            .spawner
            .spawn(self.bounds, |c| snakes.iter().any(|s| s.occupies(c)))?;
        self.fruit = Some(fruit);
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn set_fruit(&mut self, fruit: Option<Coordinate>) {
        self.fruit = fruit;
    }
}
