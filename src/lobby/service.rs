//! Lobby service - sessions, room lifecycle and command routing

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::game::room::deliver;
use crate::game::{GameRoom, RoomCommand, RoomRegistry, RoomSettings, RoomState, SeatRefusal};
use crate::util::time::room_seed;
use crate::ws::channel::{room_channel_name, ChannelManager, SessionId, SessionSender, LOBBY_CHANNEL};
use crate::ws::protocol::{ClientMsg, LobbySnapshot, RoomId, ServerMsg};

use super::directory::{LobbyDirectory, LobbyError};

/// Lobby counters for the health endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LobbyStats {
    pub players_online: usize,
    pub lobby_size: usize,
    pub active_rooms: usize,
}

/// Lobby service
pub struct LobbyService {
    directory: Mutex<LobbyDirectory>,
    rooms: Arc<RoomRegistry>,
    channels: Arc<ChannelManager>,
    settings: RoomSettings,
    /// Session -> player name
    sessions: DashMap<SessionId, String>,
    /// Session -> room the player is seated in
    player_rooms: Arc<DashMap<SessionId, RoomId>>,
}

impl LobbyService {
    pub fn new(rooms: Arc<RoomRegistry>, channels: Arc<ChannelManager>, settings: RoomSettings) -> Self {
        Self {
            directory: Mutex::new(LobbyDirectory::new()),
            rooms,
            channels,
            settings,
            sessions: DashMap::new(),
            player_rooms: Arc::new(DashMap::new()),
        }
    }

    pub fn channels(&self) -> &Arc<ChannelManager> {
        &self.channels
    }

    pub fn rooms(&self) -> &Arc<RoomRegistry> {
        &self.rooms
    }

    /// Register a new connection under `name`
    pub fn connect(&self, name: &str, tx: SessionSender) -> Result<(SessionId, String), LobbyError> {
        let name = self.directory.lock().register(name)?;
        let session = Uuid::new_v4();
        self.channels.register_session(session, tx);
        self.sessions.insert(session, name.clone());
        info!(session_id = %session, name = %name, "Player connected");
        Ok((session, name))
    }

    /// Tear down everything a connection owned
    pub async fn disconnect(&self, session: SessionId) {
        self.abandon(session).await;

        let Some((_, name)) = self.sessions.remove(&session) else {
            return;
        };
        self.directory.lock().unregister(&name);
        self.channels.unregister_session(&session);
        self.channels.broadcast(
            LOBBY_CHANNEL,
            ServerMsg::UserLeft { name: name.clone() }.encode(),
            None,
        );
        info!(session_id = %session, name = %name, "Player disconnected");
    }

    pub fn name_of(&self, session: &SessionId) -> Option<String> {
        self.sessions.get(session).map(|n| n.value().clone())
    }

    /// Room the player is seated in
    pub fn room_of(&self, session: &SessionId) -> Option<RoomId> {
        self.player_rooms.get(session).map(|r| *r)
    }

    /// Route one decoded client message
    pub async fn handle(&self, session: SessionId, msg: ClientMsg) {
        match msg {
            ClientMsg::Chat { text } => self.chat(session, text).await,
            ClientMsg::CreateRoom { max_players } => {
                self.create_room(session, max_players).await;
            }
            ClientMsg::RoomJoined { room_id } => {
                if self.room_of(&session) == Some(room_id) {
                    self.send_to_room(session, RoomCommand::EnterGroup { session })
                        .await;
                } else {
                    debug!(session_id = %session, room_id, "Room ack for a room the player is not in");
                }
            }
            ClientMsg::JoinRoom { room_id } => self.join_room(session, room_id).await,
            ClientMsg::Abandon => self.abandon(session).await,
            ClientMsg::RequestLobbyData => self.enter_lobby(session).await,
            ClientMsg::GameStart => {
                self.send_to_room(session, RoomCommand::Start { session })
                    .await
            }
            ClientMsg::Move { action, expected } => {
                self.send_to_room(
                    session,
                    RoomCommand::Move {
                        session,
                        action,
                        expected,
                    },
                )
                .await
            }
            ClientMsg::Ping => trace!(session_id = %session, "Ping"),
        }
    }

    async fn send_to_room(&self, session: SessionId, command: RoomCommand) {
        let Some(room_id) = self.room_of(&session) else {
            trace!(session_id = %session, "Room command without a room ignored");
            return;
        };
        let Some(handle) = self.rooms.get(&room_id) else {
            return;
        };
        if !handle.send(command).await {
            debug!(session_id = %session, room_id, "Room already closed");
        }
    }

    /// Enter the lobby: announce the player once and send them a snapshot
    pub async fn enter_lobby(&self, session: SessionId) {
        if self.room_of(&session).is_some() {
            self.abandon(session).await;
        }
        let Some(name) = self.name_of(&session) else {
            return;
        };

        let entered = self.directory.lock().enter(&name);
        self.channels.join(LOBBY_CHANNEL, session);
        if entered {
            self.channels.broadcast(
                LOBBY_CHANNEL,
                ServerMsg::UserJoined { name }.encode(),
                None,
            );
        }
        self.channels
            .send_to(&session, ServerMsg::LobbyData(self.snapshot()).encode());
    }

    fn leave_lobby(&self, session: &SessionId, name: &str) {
        self.directory.lock().leave(name);
        self.channels.leave(LOBBY_CHANNEL, session);
    }

    /// Players in the lobby and every open room
    pub fn snapshot(&self) -> LobbySnapshot {
        LobbySnapshot {
            players: self.directory.lock().lobby_players(),
            rooms: self.rooms.infos(),
        }
    }

    pub fn stats(&self) -> LobbyStats {
        let directory = self.directory.lock();
        LobbyStats {
            players_online: directory.players_online(),
            lobby_size: directory.lobby_size(),
            active_rooms: self.rooms.active_rooms(),
        }
    }

    async fn chat(&self, session: SessionId, text: String) {
        if self.room_of(&session).is_some() {
            self.send_to_room(session, RoomCommand::Chat { session, text })
                .await;
            return;
        }
        let Some(name) = self.name_of(&session) else {
            return;
        };
        self.channels.broadcast(
            LOBBY_CHANNEL,
            ServerMsg::Chat {
                text: format!("{name}: {text}"),
            }
            .encode(),
            None,
        );
    }

    /// Create a room with the requester in the owner seat
    pub async fn create_room(&self, session: SessionId, max_players: i32) -> Option<RoomId> {
        if self.room_of(&session).is_some() {
            self.abandon(session).await;
        }
        let name = self.name_of(&session)?;

        let room_id = self.directory.lock().allocate_room_id();
        let (state, events) = RoomState::open(
            room_id,
            max_players,
            room_seed(),
            self.settings.blocked_fix_threshold,
            session,
            name.clone(),
        );
        let (room, handle) = GameRoom::new(state, self.settings, self.channels.clone());
        self.rooms.insert(handle);
        self.player_rooms.insert(session, room_id);

        deliver(&self.channels, room_id, events);
        self.leave_lobby(&session, &name);

        info!(room_id, session_id = %session, name = %name, "Created new room");

        let rooms = self.rooms.clone();
        let channels = self.channels.clone();
        let player_rooms = self.player_rooms.clone();
        tokio::spawn(async move {
            room.run().await;

            // Cleanup after the last player left
            drop_room(&rooms, &channels, &player_rooms, room_id);
        });

        Some(room_id)
    }

    /// Seat the requester in an existing room
    pub async fn join_room(&self, session: SessionId, room_id: RoomId) {
        match self.room_of(&session) {
            Some(current) if current == room_id => return,
            Some(_) => self.abandon(session).await,
            None => {}
        }
        let Some(name) = self.name_of(&session) else {
            return;
        };

        let refused = ServerMsg::RoomFull { room_id }.encode();
        let Some(handle) = self.rooms.get(&room_id) else {
            debug!(session_id = %session, error = %LobbyError::UnknownRoom(room_id), "Join refused");
            self.channels.send_to(&session, refused);
            return;
        };

        let (reply, answer) = oneshot::channel();
        let queued = handle
            .send(RoomCommand::Join {
                session,
                name: name.clone(),
                reply,
            })
            .await;

        match answer.await {
            Ok(Ok(())) => {
                self.player_rooms.insert(session, room_id);
                self.leave_lobby(&session, &name);
                info!(room_id, session_id = %session, name = %name, "Player joined room");
            }
            // the room answered ROOM_FULL itself
            Ok(Err(SeatRefusal::Full | SeatRefusal::Started)) => {}
            Ok(Err(SeatRefusal::AlreadySeated)) => {
                self.player_rooms.insert(session, room_id);
            }
            Err(_) => {
                debug!(room_id, queued, "Room closed before answering a join");
                self.channels.send_to(&session, refused);
            }
        }
    }

    /// Leave the current room, if any
    pub async fn abandon(&self, session: SessionId) {
        let Some((_, room_id)) = self.player_rooms.remove(&session) else {
            return;
        };
        if let Some(handle) = self.rooms.get(&room_id) {
            if !handle.send(RoomCommand::Leave { session }).await {
                debug!(room_id, session_id = %session, "Room already closed");
            }
        }
    }
}

/// Remove a finished room and tell the lobby
fn drop_room(
    rooms: &RoomRegistry,
    channels: &ChannelManager,
    player_rooms: &DashMap<SessionId, RoomId>,
    room_id: RoomId,
) {
    if rooms.remove(&room_id).is_none() {
        warn!(room_id, "Dropped room was not registered");
    }
    player_rooms.retain(|_, id| *id != room_id);
    channels.remove_channel(&room_channel_name(room_id));
    channels.broadcast(
        LOBBY_CHANNEL,
        ServerMsg::RoomDropped { room_id }.encode(),
        None,
    );
    info!(room_id, "Room removed from registry");
}
