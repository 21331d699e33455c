//! Game simulation modules

pub mod error;
pub mod fruit;
pub mod grid;
pub mod intent;
pub mod session;
pub mod snake;
pub mod snapshot;
pub mod state;

pub use session::{GameSession, SessionHandle};
pub use snapshot::Outbound;
