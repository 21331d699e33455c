//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::game::grid::Bounds;

/// Players per session
pub const MAX_PLAYERS: usize = 2;

/// Largest board edge in blocks
pub const MAX_BOARD_BLOCKS: i32 = 1000;

/// Largest block edge in pixels
pub const MAX_BLOCK_SIZE: u32 = 1000;

/// Settings every session is created with
#[derive(Clone, Debug)]
pub struct GameSettings {
    /// Grid size in blocks
    pub bounds: Bounds,
    /// Block edge in pixels, reported to clients for rendering
    pub block_size: u32,
    pub tick_period: Duration,
    pub max_players: usize,
    /// Send a `move` heartbeat after each state broadcast
    pub tick_heartbeat: bool,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            bounds: Bounds::new(40, 40),
            block_size: 10,
            tick_period: Duration::from_millis(200),
            max_players: MAX_PLAYERS,
            tick_heartbeat: false,
        }
    }
}

/// Per-connection limits
#[derive(Clone, Debug)]
pub struct ConnectionSettings {
    /// Transport write timeout; a slower write counts as a disconnect
    pub write_timeout: Duration,
    /// Outbound messages queued per connection before it counts as stalled
    pub outbound_buffer: usize,
    /// Consecutive unparseable messages tolerated before closing
    pub max_protocol_errors: u32,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            write_timeout: Duration::from_millis(1000),
            outbound_buffer: 32,
            max_protocol_errors: 8,
        }
    }
}

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// HTTP / WebSocket binding address
    pub server_addr: SocketAddr,
    /// Optional raw TCP binding address
    pub tcp_addr: Option<SocketAddr>,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    pub game: GameSettings,
    pub connection: ConnectionSettings,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // PORT wins over SERVER_ADDR for hosted deployments
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8765".to_string())
        };

        let tcp_addr = match env::var("TCP_ADDR") {
            Ok(addr) => Some(addr.parse().map_err(|_| ConfigError::InvalidAddress)?),
            Err(_) => None,
        };

        let defaults = GameSettings::default();
        let width: i32 = parse_var("BOARD_WIDTH", defaults.bounds.width)?;
        let height: i32 = parse_var("BOARD_HEIGHT", defaults.bounds.height)?;
        let block_size: u32 = parse_var("BLOCK_SIZE", defaults.block_size)?;
        validate_board(width, height, block_size)?;

        let tick_ms: u64 = parse_var("TICK_MS", defaults.tick_period.as_millis() as u64)?;
        if tick_ms == 0 {
            return Err(ConfigError::Invalid("TICK_MS"));
        }

        let conn_defaults = ConnectionSettings::default();
        let write_timeout_ms: u64 = parse_var(
            "WRITE_TIMEOUT_MS",
            conn_defaults.write_timeout.as_millis() as u64,
        )?;
        let outbound_buffer: usize = parse_var("OUTBOUND_BUFFER", conn_defaults.outbound_buffer)?;
        if outbound_buffer == 0 {
            return Err(ConfigError::Invalid("OUTBOUND_BUFFER"));
        }

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,
            tcp_addr,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            game: GameSettings {
                bounds: Bounds::new(width, height),
                block_size,
                tick_period: Duration::from_millis(tick_ms),
                max_players: MAX_PLAYERS,
                tick_heartbeat: parse_var("TICK_HEARTBEAT", defaults.tick_heartbeat)?,
            },
            connection: ConnectionSettings {
                write_timeout: Duration::from_millis(write_timeout_ms),
                outbound_buffer,
                max_protocol_errors: parse_var(
                    "MAX_PROTOCOL_ERRORS",
                    conn_defaults.max_protocol_errors,
                )?,
            },
        })
    }
}

/// Board must fit every spawn row and its pixel size must fit a `u32`
fn validate_board(width: i32, height: i32, block_size: u32) -> Result<(), ConfigError> {
    // Spawn rows are 0, 2, ... so the board needs room for every player
    if !(2..=MAX_BOARD_BLOCKS).contains(&width) {
        return Err(ConfigError::Invalid("BOARD_WIDTH"));
    }
    if !(2 * MAX_PLAYERS as i32 - 1..=MAX_BOARD_BLOCKS).contains(&height) {
        return Err(ConfigError::Invalid("BOARD_HEIGHT"));
    }
    if !(1..=MAX_BLOCK_SIZE).contains(&block_size) {
        return Err(ConfigError::Invalid("BLOCK_SIZE"));
    }
    Ok(())
}

fn parse_var<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(name)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}
