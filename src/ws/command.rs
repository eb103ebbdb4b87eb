//! Command table shared by every message on the wire
//!
//! The numeric ids are part of the protocol and are pinned explicitly.
//! New commands are appended; existing ids never change.

use std::fmt;

use super::protocol::ProtocolError;

/// Numeric command tag written as the first `i32` of every message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Command {
    /// Chat line, "name: text"
    Chat = 0,
    /// A player entered the lobby
    UserJoined = 1,
    /// A player left the lobby
    UserLeft = 2,
    /// Lobby snapshot: players and rooms
    LobbyData = 3,
    /// Request to create a room
    CreateRoom = 4,
    /// A room was created
    RoomCreated = 5,
    /// A player joined a room (also the client's "I am in the room" ack)
    RoomJoined = 6,
    /// Join refused, the room is full or already playing
    RoomFull = 7,
    /// A player left a room
    RoomLeft = 8,
    /// A room was removed (no players left)
    RoomDropped = 9,
    /// Leave the current room
    Abandon = 10,
    /// Enter the lobby and ask for a snapshot
    RequestLobbyData = 11,
    /// Request to join a room
    JoinRoom = 12,
    /// Match start (request from the owner, announcement to the room)
    GameStart = 13,
    /// Match over
    GameOver = 14,
    MoveLeft = 15,
    MoveRight = 16,
    MoveDown = 17,
    MoveAllWayDown = 18,
    Rotate = 19,
    /// A figure was fixed and its owner received a new one
    NewFigure = 20,
    /// The receiver is now the room owner and may start the match
    GameOwner = 21,
    /// Keepalive
    Ping = 22,
    /// Lobby notice that a room's match started and it is closed to joins
    GameStarted = 23,
}

impl Command {
    pub const ALL: [Command; 24] = [
        Command::Chat,
        Command::UserJoined,
        Command::UserLeft,
        Command::LobbyData,
        Command::CreateRoom,
        Command::RoomCreated,
        Command::RoomJoined,
        Command::RoomFull,
        Command::RoomLeft,
        Command::RoomDropped,
        Command::Abandon,
        Command::RequestLobbyData,
        Command::JoinRoom,
        Command::GameStart,
        Command::GameOver,
        Command::MoveLeft,
        Command::MoveRight,
        Command::MoveDown,
        Command::MoveAllWayDown,
        Command::Rotate,
        Command::NewFigure,
        Command::GameOwner,
        Command::Ping,
        Command::GameStarted,
    ];

    /// Wire value of this command
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Look up a command by wire value
    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.iter().copied().find(|cmd| cmd.code() == code)
    }
}

impl TryFrom<i32> for Command {
    type Error = ProtocolError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        Self::from_code(code).ok_or(ProtocolError::UnknownCommand(code))
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Command::Chat => "CHAT",
            Command::UserJoined => "USER_JOINED",
            Command::UserLeft => "USER_LEFT",
            Command::LobbyData => "LOBBY_DATA",
            Command::CreateRoom => "CREATE_ROOM",
            Command::RoomCreated => "ROOM_CREATED",
            Command::RoomJoined => "ROOM_JOINED",
            Command::RoomFull => "ROOM_FULL",
            Command::RoomLeft => "ROOM_LEFT",
            Command::RoomDropped => "ROOM_DROPPED",
            Command::Abandon => "ABANDON",
            Command::RequestLobbyData => "REQUEST_LOBBY_DATA",
            Command::JoinRoom => "JOIN_ROOM",
            Command::GameStart => "GAME_START",
            Command::GameOver => "GAME_OVER",
            Command::MoveLeft => "MOVE_LEFT",
            Command::MoveRight => "MOVE_RIGHT",
            Command::MoveDown => "MOVE_DOWN",
            Command::MoveAllWayDown => "MOVE_ALL_WAY_DOWN",
            Command::Rotate => "ROTATE",
            Command::NewFigure => "NEW_FIGURE",
            Command::GameOwner => "GAME_OWNER",
            Command::Ping => "PING",
            Command::GameStarted => "GAME_STARTED",
        };
        f.write_str(name)
    }
}
