//! Lobby: player directory, room directory and session routing

pub mod directory;
pub mod service;

pub use directory::{LobbyDirectory, LobbyError};
pub use service::{LobbyService, LobbyStats};
