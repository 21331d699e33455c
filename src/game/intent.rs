//! Turn intents from connections to the session task
//!
//! Connections never touch game state. They post intents here and the
//! session drains the queue at the start of every tick.

use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::util::time::unix_millis;

use super::grid::Direction;

/// Intents buffered per session before new ones are dropped
pub const INTENT_BUFFER: usize = 64;

/// A player asking for a new heading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnIntent {
    pub player_id: Uuid,
    pub direction: Direction,
    pub received_at: u64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubmitError {
    #[error("intent queue is full")]
    QueueFull,

    #[error("session has ended")]
    SessionEnded,
}

/// Producer side, one clone per connection
#[derive(Clone, Debug)]
pub struct IntentSender {
    tx: mpsc::Sender<TurnIntent>,
}

impl IntentSender {
    /// Never waits: a full queue drops the intent
    pub fn submit(&self, player_id: Uuid, direction: Direction) -> Result<(), SubmitError> {
        let intent = TurnIntent {
            player_id,
            direction,
            received_at: unix_millis(),
        };
        self.tx.try_send(intent).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SubmitError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => SubmitError::SessionEnded,
        })
    }
}

/// Consumer side, owned by the session task
#[derive(Debug)]
pub struct TurnIntentQueue {
    rx: mpsc::Receiver<TurnIntent>,
}

impl TurnIntentQueue {
    pub fn new(capacity: usize) -> (IntentSender, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (IntentSender { tx }, Self { rx })
    }

    /// Everything posted so far, oldest first
    pub fn drain(&mut self) -> Vec<TurnIntent> {
        let mut intents = Vec::new();
        while let Ok(intent) = self.rx.try_recv() {
            intents.push(intent);
        }
        intents
    }
}
