//! Player directory and room id allocation

use std::collections::{BTreeSet, HashSet};

use crate::ws::protocol::RoomId;

/// Longest accepted player name, in bytes
pub const MAX_NAME_LEN: usize = 32;

/// Lobby errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LobbyError {
    #[error("player name must not be empty")]
    EmptyName,

    #[error("player name is longer than {MAX_NAME_LEN} bytes")]
    NameTooLong,

    #[error("player name {0:?} is already taken")]
    DuplicateName(String),

    #[error("room {0} does not exist")]
    UnknownRoom(RoomId),
}

/// Who is connected, who is browsing the lobby, and the next room id
#[derive(Debug, Default)]
pub struct LobbyDirectory {
    players: HashSet<String>,
    in_lobby: BTreeSet<String>,
    next_room_id: RoomId,
}

impl LobbyDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a player name for a new connection; returns the name as stored
    pub fn register(&mut self, name: &str) -> Result<String, LobbyError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(LobbyError::EmptyName);
        }
        if name.len() > MAX_NAME_LEN {
            return Err(LobbyError::NameTooLong);
        }
        if !self.players.insert(name.to_string()) {
            return Err(LobbyError::DuplicateName(name.to_string()));
        }
        Ok(name.to_string())
    }

    /// Release a name and drop it from the lobby
    pub fn unregister(&mut self, name: &str) {
        self.players.remove(name);
        self.in_lobby.remove(name);
    }

    /// Mark a player as browsing the lobby. Returns false if already there.
    pub fn enter(&mut self, name: &str) -> bool {
        self.players.contains(name) && self.in_lobby.insert(name.to_string())
    }

    pub fn leave(&mut self, name: &str) -> bool {
        self.in_lobby.remove(name)
    }

    pub fn is_in_lobby(&self, name: &str) -> bool {
        self.in_lobby.contains(name)
    }

    /// Names currently in the lobby, sorted
    pub fn lobby_players(&self) -> Vec<String> {
        self.in_lobby.iter().cloned().collect()
    }

    pub fn lobby_size(&self) -> usize {
        self.in_lobby.len()
    }

    pub fn players_online(&self) -> usize {
        self.players.len()
    }

    /// Next room id; ids start at 0 and are never reused
    pub fn allocate_room_id(&mut self) -> RoomId {
        let id = self.next_room_id;
        self.next_room_id += 1;
        id
    }
}
