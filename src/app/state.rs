//! Application state shared across routes

use std::sync::Arc;

use crate::config::Config;
use crate::game::RoomRegistry;
use crate::lobby::LobbyService;
use crate::ws::ChannelManager;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub lobby: Arc<LobbyService>,
    pub room_registry: Arc<RoomRegistry>,
    pub channels: Arc<ChannelManager>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);

        // Broadcast groups and per-session queues
        let channels = Arc::new(ChannelManager::new());

        // Initialize room registry
        let room_registry = Arc::new(RoomRegistry::new());

        // Lobby owns room lifecycle and routes session commands
        let lobby = Arc::new(LobbyService::new(
            room_registry.clone(),
            channels.clone(),
            config.room_settings(),
        ));

        Self {
            config,
            lobby,
            room_registry,
            channels,
        }
    }
}
