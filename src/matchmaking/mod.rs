//! Matchmaking - assigning players to sessions

pub mod registry;

pub use registry::{GameRegistry, RegistryError};
