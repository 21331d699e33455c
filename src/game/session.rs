//! Session worker and its authoritative tick loop
//!
//! One task per session owns the `GameState`. Connections talk to it through
//! a `SessionHandle`: joins and disconnects over an unbounded control channel,
//! turns over the bounded intent queue.

use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::GameSettings;
use crate::matchmaking::RegistryError;
use crate::util::time::unix_millis;
use crate::ws::protocol::{ServerMsg, Size};

use super::grid::Direction;
use super::intent::{IntentSender, SubmitError, TurnIntentQueue, INTENT_BUFFER};
use super::snapshot::{build_state, Outbound, StateBroadcaster};
use super::state::{GameState, SessionStatus, TickOutcome};

/// Requests from connections to the session worker
#[derive(Debug)]
pub enum SessionCommand {
    Join { player_id: Uuid, outbound: Outbound },
    Disconnect { player_id: Uuid },
}

/// Counters readable without going through the worker
#[derive(Debug)]
struct SessionShared {
    status: AtomicU8,
    seats: AtomicUsize,
    max_players: usize,
    /// A participant has left; the worker has not caught up yet
    closing: AtomicBool,
}

impl SessionShared {
    fn status(&self) -> SessionStatus {
        SessionStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    fn set_status(&self, status: SessionStatus) {
        self.status.store(status.as_u8(), Ordering::Release);
    }
}

/// Handle to a running session
#[derive(Clone, Debug)]
pub struct SessionHandle {
    pub id: Uuid,
    control_tx: mpsc::UnboundedSender<SessionCommand>,
    intents: IntentSender,
    shared: Arc<SessionShared>,
}

impl SessionHandle {
    pub fn status(&self) -> SessionStatus {
        self.shared.status()
    }

    pub fn seats_taken(&self) -> usize {
        self.shared.seats.load(Ordering::Acquire)
    }

    fn is_open(&self) -> bool {
        self.status() == SessionStatus::Waiting && !self.shared.closing.load(Ordering::Acquire)
    }

    pub fn has_capacity(&self) -> bool {
        self.is_open() && self.seats_taken() < self.shared.max_players
    }

    /// Claim the next join index
    pub(crate) fn reserve_seat(&self) -> Result<usize, RegistryError> {
        if !self.is_open() {
            return Err(RegistryError::NotWaiting);
        }
        let max = self.shared.max_players;
        self.shared
            .seats
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < max).then_some(n + 1))
            .map_err(|_| RegistryError::SessionFull)
    }

    /// Hand a player over to the worker, which replies with `init`
    pub(crate) fn join(&self, player_id: Uuid, outbound: Outbound) -> Result<(), RegistryError> {
        self.control_tx
            .send(SessionCommand::Join {
                player_id,
                outbound,
            })
            .map_err(|_| RegistryError::SessionEnded)
    }

    pub fn submit_turn(&self, player_id: Uuid, direction: Direction) -> Result<(), SubmitError> {
        self.intents.submit(player_id, direction)
    }

    /// Only participants disconnect, and any participant leaving ends the
    /// session, so the seats close right away.
    pub fn disconnect(&self, player_id: Uuid) {
        self.shared.closing.store(true, Ordering::Release);
        // Worker already gone means the session is over anyway
        let _ = self.control_tx.send(SessionCommand::Disconnect { player_id });
    }
}

/// Idle until the session fills, Running while ticking, Stopped at game over
enum Clock {
    Idle,
    Running(Interval),
    Stopped,
}

async fn next_tick(clock: &mut Clock) {
    match clock {
        Clock::Running(interval) => {
            interval.tick().await;
        }
        _ => std::future::pending().await,
    }
}

/// The authoritative game session
pub struct GameSession {
    state: GameState,
    settings: GameSettings,
    control_rx: mpsc::UnboundedReceiver<SessionCommand>,
    intents: TurnIntentQueue,
    broadcaster: StateBroadcaster,
    shared: Arc<SessionShared>,
    clock: Clock,
}

impl GameSession {
    pub fn new(id: Uuid, seed: u64, settings: GameSettings) -> (Self, SessionHandle) {
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (intent_tx, intents) = TurnIntentQueue::new(INTENT_BUFFER);
        let shared = Arc::new(SessionShared {
            status: AtomicU8::new(SessionStatus::Waiting.as_u8()),
            seats: AtomicUsize::new(0),
            max_players: settings.max_players,
            closing: AtomicBool::new(false),
        });

        let handle = SessionHandle {
            id,
            control_tx,
            intents: intent_tx,
            shared: shared.clone(),
        };

        let session = Self {
            state: GameState::new(id, settings.bounds, settings.max_players, seed),
            settings,
            control_rx,
            intents,
            broadcaster: StateBroadcaster::new(),
            shared,
            clock: Clock::Idle,
        };

        (session, handle)
    }

    /// Serve commands and ticks until the game is over
    pub async fn run(mut self) {
        info!(session_id = %self.state.id, "Session waiting for players");

        loop {
            tokio::select! {
                biased;

                cmd = self.control_rx.recv() => match cmd {
                    Some(SessionCommand::Join { player_id, outbound }) => {
                        self.handle_join(player_id, outbound);
                    }
                    Some(SessionCommand::Disconnect { player_id }) => {
                        self.handle_disconnect(player_id);
                    }
                    None => self.end_session("all handles dropped"),
                },
                _ = next_tick(&mut self.clock) => self.run_tick(),
            }

            if matches!(self.clock, Clock::Stopped) {
                break;
            }
        }

        // Joins queued behind the game over still get an init and the final state
        let final_state = build_state(&self.state);
        while let Ok(cmd) = self.control_rx.try_recv() {
            if let SessionCommand::Join { player_id, outbound } = cmd {
                let _ = outbound.try_send(ServerMsg::Init { id: player_id });
                let _ = outbound.try_send(final_state.clone());
                info!(session_id = %self.state.id, player_id = %player_id, "Late join turned away");
            }
        }

        info!(
            session_id = %self.state.id,
            ticks = self.state.tick,
            "Session finished"
        );
    }

    fn handle_join(&mut self, player_id: Uuid, outbound: Outbound) {
        let spawn = match self.state.add_player(player_id) {
            Ok(at) => at,
            Err(e) => {
                warn!(session_id = %self.state.id, player_id = %player_id, error = %e, "Join refused");
                return;
            }
        };
        self.broadcaster.add(player_id, outbound);

        info!(
            session_id = %self.state.id,
            player_id = %player_id,
            x = spawn.x,
            y = spawn.y,
            player_count = self.state.player_count(),
            "Player joined session"
        );

        if !self
            .broadcaster
            .send_to(player_id, ServerMsg::Init { id: player_id })
        {
            self.end_session("init undeliverable");
            return;
        }

        if self.state.is_full() {
            self.start();
        }
    }

    fn handle_disconnect(&mut self, player_id: Uuid) {
        if !self.broadcaster.remove(player_id) {
            debug!(session_id = %self.state.id, player_id = %player_id, "Disconnect from non-participant");
            return;
        }
        info!(session_id = %self.state.id, player_id = %player_id, "Player disconnected");
        self.end_session("player disconnected");
    }

    fn start(&mut self) {
        if let Err(e) = self.state.start() {
            error!(session_id = %self.state.id, error = %e, "Could not place first fruit");
            self.end_session("board saturated");
            return;
        }
        self.shared.set_status(SessionStatus::InProgress);

        let block = self.settings.block_size;
        let bounds = self.state.bounds;
        let start = ServerMsg::Start {
            players: self.state.player_ids(),
            board_size: Size {
                w: (bounds.width as u32).saturating_mul(block),
                h: (bounds.height as u32).saturating_mul(block),
            },
            block_size: Size { w: block, h: block },
        };
        if !self.broadcaster.broadcast(&start).is_empty()
            || !self.broadcaster.broadcast(&build_state(&self.state)).is_empty()
        {
            self.end_session("start undeliverable");
            return;
        }

        let period = self.settings.tick_period;
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.clock = Clock::Running(interval);

        info!(
            session_id = %self.state.id,
            tick_ms = period.as_millis() as u64,
            "Session full, clock started"
        );
    }

    fn run_tick(&mut self) {
        for intent in self.intents.drain() {
            if !self.state.apply_turn(intent.player_id, intent.direction) {
                continue;
            }
            debug!(
                session_id = %self.state.id,
                player_id = %intent.player_id,
                direction = ?intent.direction,
                latency_ms = unix_millis().saturating_sub(intent.received_at),
                "Turn accepted"
            );
            let relay = ServerMsg::Turn {
                id: intent.player_id,
                direction: intent.direction,
            };
            if !self.broadcaster.broadcast(&relay).is_empty() {
                self.end_session("send failure");
                return;
            }
        }

        match self.state.step() {
            Ok(TickOutcome::Advanced { fed }) => {
                for player_id in fed {
                    debug!(session_id = %self.state.id, player_id = %player_id, "Fruit eaten");
                }
            }
            Ok(TickOutcome::Collision { players }) => {
                info!(
                    session_id = %self.state.id,
                    tick = self.state.tick,
                    players = ?players,
                    "Invalid move"
                );
                self.end_session("invalid move");
                return;
            }
            Err(e) => {
                error!(session_id = %self.state.id, error = %e, "Fruit respawn failed");
                self.end_session("board saturated");
                return;
            }
        }

        let mut failed = self.broadcaster.broadcast(&build_state(&self.state));
        if failed.is_empty() && self.settings.tick_heartbeat {
            failed = self.broadcaster.broadcast(&ServerMsg::Move);
        }
        if !failed.is_empty() {
            warn!(session_id = %self.state.id, players = ?failed, "Broadcast failed");
            self.end_session("send failure");
        }
    }

    /// Go to GameOver, send the final state to whoever is still reachable and
    /// release every outbound queue. Later calls do nothing.
    fn end_session(&mut self, reason: &'static str) {
        if matches!(self.clock, Clock::Stopped) {
            return;
        }
        self.clock = Clock::Stopped;
        // Later joins fail at the registry and go elsewhere
        self.control_rx.close();
        self.state.end();
        self.shared.set_status(SessionStatus::GameOver);

        let _ = self.broadcaster.broadcast(&build_state(&self.state));
        self.broadcaster.close();

        info!(
            session_id = %self.state.id,
            tick = self.state.tick,
            reason,
            "Game over"
        );
    }
}
