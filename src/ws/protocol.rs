//! Binary wire protocol
//!
//! Every message is big-endian and starts with the command id as an `i32`
//! (see [`Command`]). Fixed payloads follow directly; names and chat lines
//! that end a message are raw UTF-8 without a length prefix. Collections
//! (player lists, figure lists, the lobby snapshot) use a versioned layout:
//! one version byte, then `u32` counts and `u32`-length-prefixed strings.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::Serialize;

use super::command::Command;

/// Room identifier, an `i64` on the wire
pub type RoomId = i64;

/// Size of an encoded figure: kind, x, y, rotation, color
pub const FIGURE_WIRE_LEN: usize = 20;

/// Version byte written at the start of every structured blob
pub const BLOB_VERSION: u8 = 1;

const COMMAND_LEN: usize = 4;

/// Wire view of a figure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct FigureInfo {
    /// Figure kind, 1..=7 (0 when the player had no figure)
    pub kind: i32,
    pub x: i32,
    pub y: i32,
    pub rotation: i32,
    /// ARGB color, 0xAARRGGBB
    pub color: u32,
}

impl FigureInfo {
    /// Placeholder sent when a departing player had no live figure
    pub const NONE: FigureInfo = FigureInfo {
        kind: 0,
        x: 0,
        y: 0,
        rotation: 0,
        color: 0,
    };

    fn write(&self, buf: &mut BytesMut) {
        buf.put_i32(self.kind);
        buf.put_i32(self.x);
        buf.put_i32(self.y);
        buf.put_i32(self.rotation);
        buf.put_u32(self.color);
    }

    fn read(buf: &mut &[u8], command: Command) -> Result<Self, ProtocolError> {
        need(buf, FIGURE_WIRE_LEN, command)?;
        Ok(Self {
            kind: buf.get_i32(),
            x: buf.get_i32(),
            y: buf.get_i32(),
            rotation: buf.get_i32(),
            color: buf.get_u32(),
        })
    }
}

/// Public view of a seated player
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlayerInfo {
    pub name: String,
    pub color: u32,
}

/// Directory entry for one room
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoomInfo {
    pub id: RoomId,
    pub max_players: i32,
    pub started: bool,
    pub players: Vec<PlayerInfo>,
}

/// Everything a client needs to draw the lobby
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct LobbySnapshot {
    pub players: Vec<String>,
    pub rooms: Vec<RoomInfo>,
}

/// Figure input requested by a player
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveAction {
    Left,
    Right,
    Down,
    AllWayDown,
    Rotate,
}

impl MoveAction {
    pub fn command(self) -> Command {
        match self {
            MoveAction::Left => Command::MoveLeft,
            MoveAction::Right => Command::MoveRight,
            MoveAction::Down => Command::MoveDown,
            MoveAction::AllWayDown => Command::MoveAllWayDown,
            MoveAction::Rotate => Command::Rotate,
        }
    }

    fn from_command(command: Command) -> Option<Self> {
        match command {
            Command::MoveLeft => Some(MoveAction::Left),
            Command::MoveRight => Some(MoveAction::Right),
            Command::MoveDown => Some(MoveAction::Down),
            Command::MoveAllWayDown => Some(MoveAction::AllWayDown),
            Command::Rotate => Some(MoveAction::Rotate),
            _ => None,
        }
    }
}

/// Which group a server message arrived through.
///
/// `ROOM_JOINED` carries a name when broadcast to a group and a roster
/// when sent straight to the joining player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Via {
    Group,
    Direct,
}

/// Messages sent from client to server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMsg {
    Chat { text: String },
    CreateRoom { max_players: i32 },
    /// The client finished switching to the room screen
    RoomJoined { room_id: RoomId },
    JoinRoom { room_id: RoomId },
    Abandon,
    RequestLobbyData,
    GameStart,
    /// Figure input. `expected` is the figure the client believes it is
    /// moving; inputs naming a figure that is no longer current are dropped.
    Move {
        action: MoveAction,
        expected: Option<FigureInfo>,
    },
    Ping,
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMsg {
    Chat { text: String },
    UserJoined { name: String },
    UserLeft { name: String },
    LobbyData(LobbySnapshot),
    RoomCreated {
        room_id: RoomId,
        max_players: i32,
        color: u32,
        name: String,
    },
    /// Broadcast to the lobby and room groups
    RoomJoined {
        room_id: RoomId,
        color: u32,
        name: String,
    },
    /// Sent to the joining player only
    RoomRoster {
        room_id: RoomId,
        color: u32,
        players: Vec<PlayerInfo>,
    },
    RoomFull { room_id: RoomId },
    RoomLeft {
        player: PlayerInfo,
        figure: FigureInfo,
    },
    RoomDropped { room_id: RoomId },
    GameStart {
        board_width: i32,
        figures: Vec<FigureInfo>,
    },
    GameStarted { room_id: RoomId },
    GameOver,
    MoveLeft(FigureInfo),
    MoveRight(FigureInfo),
    MoveDown(FigureInfo),
    Rotate(FigureInfo),
    MoveAllWayDown {
        before: FigureInfo,
        after: FigureInfo,
    },
    NewFigure {
        fixed: FigureInfo,
        spawned: FigureInfo,
    },
    GameOwner,
    Ping,
}

/// Protocol decode failures. Any of these means the peer is out of sync.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("message too short for a command id ({0} bytes)")]
    MissingCommand(usize),

    #[error("unknown command id {0}")]
    UnknownCommand(i32),

    #[error("{0} is not accepted in this direction")]
    UnexpectedCommand(Command),

    #[error("{command}: truncated payload, needed {needed} bytes but {remaining} left")]
    Truncated {
        command: Command,
        needed: usize,
        remaining: usize,
    },

    #[error("{command}: {extra} unexpected trailing bytes")]
    TrailingBytes { command: Command, extra: usize },

    #[error("{command}: unsupported blob version {version}")]
    UnsupportedVersion { command: Command, version: u8 },

    #[error("{0}: text is not valid UTF-8")]
    InvalidUtf8(Command),

    #[error("{command}: invalid length {length}")]
    InvalidLength { command: Command, length: i64 },

    #[error("message of {size} bytes exceeds the {limit} byte limit")]
    TooLarge { size: usize, limit: usize },
}

// ============================================================================
// Client messages
// ============================================================================

impl ClientMsg {
    pub fn command(&self) -> Command {
        match self {
            ClientMsg::Chat { .. } => Command::Chat,
            ClientMsg::CreateRoom { .. } => Command::CreateRoom,
            ClientMsg::RoomJoined { .. } => Command::RoomJoined,
            ClientMsg::JoinRoom { .. } => Command::JoinRoom,
            ClientMsg::Abandon => Command::Abandon,
            ClientMsg::RequestLobbyData => Command::RequestLobbyData,
            ClientMsg::GameStart => Command::GameStart,
            ClientMsg::Move { action, .. } => action.command(),
            ClientMsg::Ping => Command::Ping,
        }
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(COMMAND_LEN + 2 * FIGURE_WIRE_LEN);
        buf.put_i32(self.command().code());
        match self {
            ClientMsg::Chat { text } => buf.put_slice(text.as_bytes()),
            ClientMsg::CreateRoom { max_players } => buf.put_i32(*max_players),
            ClientMsg::RoomJoined { room_id } | ClientMsg::JoinRoom { room_id } => {
                buf.put_i64(*room_id)
            }
            ClientMsg::Move { expected, .. } => {
                if let Some(figure) = expected {
                    figure.write(&mut buf);
                }
            }
            ClientMsg::Abandon
            | ClientMsg::RequestLobbyData
            | ClientMsg::GameStart
            | ClientMsg::Ping => {}
        }
        buf.freeze()
    }

    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        let (command, mut buf) = split_command(data)?;

        let msg = match command {
            Command::Chat => ClientMsg::Chat {
                text: rest_utf8(&mut buf, command)?,
            },
            Command::CreateRoom => {
                need(&buf, 4, command)?;
                ClientMsg::CreateRoom {
                    max_players: buf.get_i32(),
                }
            }
            Command::RoomJoined => {
                need(&buf, 8, command)?;
                ClientMsg::RoomJoined {
                    room_id: buf.get_i64(),
                }
            }
            Command::JoinRoom => {
                need(&buf, 8, command)?;
                ClientMsg::JoinRoom {
                    room_id: buf.get_i64(),
                }
            }
            Command::Abandon => ClientMsg::Abandon,
            Command::RequestLobbyData => ClientMsg::RequestLobbyData,
            Command::GameStart => ClientMsg::GameStart,
            Command::Ping => ClientMsg::Ping,
            Command::MoveLeft
            | Command::MoveRight
            | Command::MoveDown
            | Command::MoveAllWayDown
            | Command::Rotate => {
                let expected = if buf.is_empty() {
                    None
                } else {
                    Some(FigureInfo::read(&mut buf, command)?)
                };
                let action =
                    MoveAction::from_command(command).ok_or(ProtocolError::UnexpectedCommand(command))?;
                ClientMsg::Move { action, expected }
            }
            other => return Err(ProtocolError::UnexpectedCommand(other)),
        };

        finish(&buf, command)?;
        Ok(msg)
    }
}

// ============================================================================
// Server messages
// ============================================================================

impl ServerMsg {
    pub fn command(&self) -> Command {
        match self {
            ServerMsg::Chat { .. } => Command::Chat,
            ServerMsg::UserJoined { .. } => Command::UserJoined,
            ServerMsg::UserLeft { .. } => Command::UserLeft,
            ServerMsg::LobbyData(_) => Command::LobbyData,
            ServerMsg::RoomCreated { .. } => Command::RoomCreated,
            ServerMsg::RoomJoined { .. } | ServerMsg::RoomRoster { .. } => Command::RoomJoined,
            ServerMsg::RoomFull { .. } => Command::RoomFull,
            ServerMsg::RoomLeft { .. } => Command::RoomLeft,
            ServerMsg::RoomDropped { .. } => Command::RoomDropped,
            ServerMsg::GameStart { .. } => Command::GameStart,
            ServerMsg::GameStarted { .. } => Command::GameStarted,
            ServerMsg::GameOver => Command::GameOver,
            ServerMsg::MoveLeft(_) => Command::MoveLeft,
            ServerMsg::MoveRight(_) => Command::MoveRight,
            ServerMsg::MoveDown(_) => Command::MoveDown,
            ServerMsg::Rotate(_) => Command::Rotate,
            ServerMsg::MoveAllWayDown { .. } => Command::MoveAllWayDown,
            ServerMsg::NewFigure { .. } => Command::NewFigure,
            ServerMsg::GameOwner => Command::GameOwner,
            ServerMsg::Ping => Command::Ping,
        }
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(64);
        buf.put_i32(self.command().code());

        match self {
            ServerMsg::Chat { text } => buf.put_slice(text.as_bytes()),
            ServerMsg::UserJoined { name } | ServerMsg::UserLeft { name } => {
                buf.put_slice(name.as_bytes())
            }
            ServerMsg::LobbyData(snapshot) => write_lobby(&mut buf, snapshot),
            ServerMsg::RoomCreated {
                room_id,
                max_players,
                color,
                name,
            } => {
                buf.put_i64(*room_id);
                buf.put_i32(*max_players);
                buf.put_u32(*color);
                buf.put_slice(name.as_bytes());
            }
            ServerMsg::RoomJoined {
                room_id,
                color,
                name,
            } => {
                buf.put_i64(*room_id);
                buf.put_u32(*color);
                buf.put_slice(name.as_bytes());
            }
            ServerMsg::RoomRoster {
                room_id,
                color,
                players,
            } => {
                buf.put_i64(*room_id);
                buf.put_u32(*color);
                buf.put_u8(BLOB_VERSION);
                write_players(&mut buf, players);
            }
            ServerMsg::RoomFull { room_id }
            | ServerMsg::RoomDropped { room_id }
            | ServerMsg::GameStarted { room_id } => buf.put_i64(*room_id),
            ServerMsg::RoomLeft { player, figure } => {
                let mut blob = BytesMut::new();
                blob.put_u8(BLOB_VERSION);
                write_player(&mut blob, player);
                buf.put_i32(blob.len() as i32);
                buf.put_slice(&blob);
                figure.write(&mut buf);
            }
            ServerMsg::GameStart {
                board_width,
                figures,
            } => {
                buf.put_i32(*board_width);
                buf.put_u8(BLOB_VERSION);
                buf.put_u32(figures.len() as u32);
                for figure in figures {
                    figure.write(&mut buf);
                }
            }
            ServerMsg::MoveLeft(figure)
            | ServerMsg::MoveRight(figure)
            | ServerMsg::MoveDown(figure)
            | ServerMsg::Rotate(figure) => figure.write(&mut buf),
            ServerMsg::MoveAllWayDown { before, after } => {
                before.write(&mut buf);
                after.write(&mut buf);
            }
            ServerMsg::NewFigure { fixed, spawned } => {
                fixed.write(&mut buf);
                spawned.write(&mut buf);
            }
            ServerMsg::GameOver | ServerMsg::GameOwner | ServerMsg::Ping => {}
        }

        buf.freeze()
    }

    pub fn decode(data: &[u8], via: Via) -> Result<Self, ProtocolError> {
        let (command, mut buf) = split_command(data)?;

        let msg = match command {
            Command::Chat => ServerMsg::Chat {
                text: rest_utf8(&mut buf, command)?,
            },
            Command::UserJoined => ServerMsg::UserJoined {
                name: rest_utf8(&mut buf, command)?,
            },
            Command::UserLeft => ServerMsg::UserLeft {
                name: rest_utf8(&mut buf, command)?,
            },
            Command::LobbyData => ServerMsg::LobbyData(read_lobby(&mut buf, command)?),
            Command::RoomCreated => {
                need(&buf, 16, command)?;
                let room_id = buf.get_i64();
                let max_players = buf.get_i32();
                let color = buf.get_u32();
                ServerMsg::RoomCreated {
                    room_id,
                    max_players,
                    color,
                    name: rest_utf8(&mut buf, command)?,
                }
            }
            Command::RoomJoined => {
                need(&buf, 12, command)?;
                let room_id = buf.get_i64();
                let color = buf.get_u32();
                match via {
                    Via::Group => ServerMsg::RoomJoined {
                        room_id,
                        color,
                        name: rest_utf8(&mut buf, command)?,
                    },
                    Via::Direct => {
                        read_version(&mut buf, command)?;
                        ServerMsg::RoomRoster {
                            room_id,
                            color,
                            players: read_players(&mut buf, command)?,
                        }
                    }
                }
            }
            Command::RoomFull => {
                need(&buf, 8, command)?;
                ServerMsg::RoomFull {
                    room_id: buf.get_i64(),
                }
            }
            Command::RoomDropped => {
                need(&buf, 8, command)?;
                ServerMsg::RoomDropped {
                    room_id: buf.get_i64(),
                }
            }
            Command::GameStarted => {
                need(&buf, 8, command)?;
                ServerMsg::GameStarted {
                    room_id: buf.get_i64(),
                }
            }
            Command::RoomLeft => {
                need(&buf, 4, command)?;
                let length = buf.get_i32();
                if length < 0 {
                    return Err(ProtocolError::InvalidLength {
                        command,
                        length: length as i64,
                    });
                }
                let length = length as usize;
                need(&buf, length, command)?;
                let mut blob = &buf[..length];
                buf.advance(length);
                read_version(&mut blob, command)?;
                let player = read_player(&mut blob, command)?;
                finish(&blob, command)?;
                ServerMsg::RoomLeft {
                    player,
                    figure: FigureInfo::read(&mut buf, command)?,
                }
            }
            Command::GameStart => {
                need(&buf, 4, command)?;
                let board_width = buf.get_i32();
                read_version(&mut buf, command)?;
                let count = read_count(&mut buf, FIGURE_WIRE_LEN, command)?;
                let mut figures = Vec::with_capacity(count);
                for _ in 0..count {
                    figures.push(FigureInfo::read(&mut buf, command)?);
                }
                ServerMsg::GameStart {
                    board_width,
                    figures,
                }
            }
            Command::GameOver => ServerMsg::GameOver,
            Command::GameOwner => ServerMsg::GameOwner,
            Command::Ping => ServerMsg::Ping,
            Command::MoveLeft => ServerMsg::MoveLeft(FigureInfo::read(&mut buf, command)?),
            Command::MoveRight => ServerMsg::MoveRight(FigureInfo::read(&mut buf, command)?),
            Command::MoveDown => ServerMsg::MoveDown(FigureInfo::read(&mut buf, command)?),
            Command::Rotate => ServerMsg::Rotate(FigureInfo::read(&mut buf, command)?),
            Command::MoveAllWayDown => ServerMsg::MoveAllWayDown {
                before: FigureInfo::read(&mut buf, command)?,
                after: FigureInfo::read(&mut buf, command)?,
            },
            Command::NewFigure => ServerMsg::NewFigure {
                fixed: FigureInfo::read(&mut buf, command)?,
                spawned: FigureInfo::read(&mut buf, command)?,
            },
            other => return Err(ProtocolError::UnexpectedCommand(other)),
        };

        finish(&buf, command)?;
        Ok(msg)
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Read the leading command id and return the remaining payload
pub fn split_command(data: &[u8]) -> Result<(Command, &[u8]), ProtocolError> {
    if data.len() < COMMAND_LEN {
        return Err(ProtocolError::MissingCommand(data.len()));
    }
    let mut buf = data;
    let command = Command::try_from(buf.get_i32())?;
    Ok((command, buf))
}

fn need(buf: &[u8], needed: usize, command: Command) -> Result<(), ProtocolError> {
    if buf.remaining() < needed {
        return Err(ProtocolError::Truncated {
            command,
            needed,
            remaining: buf.remaining(),
        });
    }
    Ok(())
}

fn finish(buf: &[u8], command: Command) -> Result<(), ProtocolError> {
    if buf.has_remaining() {
        return Err(ProtocolError::TrailingBytes {
            command,
            extra: buf.remaining(),
        });
    }
    Ok(())
}

fn rest_utf8(buf: &mut &[u8], command: Command) -> Result<String, ProtocolError> {
    let text = std::str::from_utf8(buf)
        .map_err(|_| ProtocolError::InvalidUtf8(command))?
        .to_owned();
    buf.advance(buf.remaining());
    Ok(text)
}

fn read_version(buf: &mut &[u8], command: Command) -> Result<(), ProtocolError> {
    need(buf, 1, command)?;
    let version = buf.get_u8();
    if version != BLOB_VERSION {
        return Err(ProtocolError::UnsupportedVersion { command, version });
    }
    Ok(())
}

/// Read a `u32` element count, rejecting counts the payload cannot hold
fn read_count(buf: &mut &[u8], min_item_len: usize, command: Command) -> Result<usize, ProtocolError> {
    need(buf, 4, command)?;
    let count = buf.get_u32() as usize;
    let needed = count.saturating_mul(min_item_len);
    if needed > buf.remaining() {
        return Err(ProtocolError::Truncated {
            command,
            needed,
            remaining: buf.remaining(),
        });
    }
    Ok(count)
}

fn put_str(buf: &mut BytesMut, value: &str) {
    buf.put_u32(value.len() as u32);
    buf.put_slice(value.as_bytes());
}

fn read_str(buf: &mut &[u8], command: Command) -> Result<String, ProtocolError> {
    need(buf, 4, command)?;
    let len = buf.get_u32() as usize;
    need(buf, len, command)?;
    let text = std::str::from_utf8(&buf[..len])
        .map_err(|_| ProtocolError::InvalidUtf8(command))?
        .to_owned();
    buf.advance(len);
    Ok(text)
}

fn write_player(buf: &mut BytesMut, player: &PlayerInfo) {
    put_str(buf, &player.name);
    buf.put_u32(player.color);
}

fn read_player(buf: &mut &[u8], command: Command) -> Result<PlayerInfo, ProtocolError> {
    let name = read_str(buf, command)?;
    need(buf, 4, command)?;
    Ok(PlayerInfo {
        name,
        color: buf.get_u32(),
    })
}

fn write_players(buf: &mut BytesMut, players: &[PlayerInfo]) {
    buf.put_u32(players.len() as u32);
    for player in players {
        write_player(buf, player);
    }
}

fn read_players(buf: &mut &[u8], command: Command) -> Result<Vec<PlayerInfo>, ProtocolError> {
    // name length prefix + color
    let count = read_count(buf, 8, command)?;
    let mut players = Vec::with_capacity(count);
    for _ in 0..count {
        players.push(read_player(buf, command)?);
    }
    Ok(players)
}

fn write_lobby(buf: &mut BytesMut, snapshot: &LobbySnapshot) {
    buf.put_u8(BLOB_VERSION);
    buf.put_u32(snapshot.players.len() as u32);
    for name in &snapshot.players {
        put_str(buf, name);
    }
    buf.put_u32(snapshot.rooms.len() as u32);
    for room in &snapshot.rooms {
        buf.put_i64(room.id);
        buf.put_i32(room.max_players);
        buf.put_u8(room.started as u8);
        write_players(buf, &room.players);
    }
}

fn read_lobby(buf: &mut &[u8], command: Command) -> Result<LobbySnapshot, ProtocolError> {
    read_version(buf, command)?;

    let count = read_count(buf, 4, command)?;
    let mut players = Vec::with_capacity(count);
    for _ in 0..count {
        players.push(read_str(buf, command)?);
    }

    // id + max players + started flag + player count
    let count = read_count(buf, 17, command)?;
    let mut rooms = Vec::with_capacity(count);
    for _ in 0..count {
        need(buf, 13, command)?;
        let id = buf.get_i64();
        let max_players = buf.get_i32();
        let started = buf.get_u8() != 0;
        rooms.push(RoomInfo {
            id,
            max_players,
            started,
            players: read_players(buf, command)?,
        });
    }

    Ok(LobbySnapshot { players, rooms })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_figure() -> FigureInfo {
        FigureInfo {
            kind: 2,
            x: 5,
            y: -1,
            rotation: 1,
            color: 0xFFFF_0000,
        }
    }

    #[test]
    fn move_message_layout_is_byte_exact() {
        let bytes = ServerMsg::MoveLeft(sample_figure()).encode();
        assert_eq!(
            bytes.as_ref(),
            &[
                0, 0, 0, 15, // MOVE_LEFT
                0, 0, 0, 2, // kind
                0, 0, 0, 5, // x
                0xFF, 0xFF, 0xFF, 0xFF, // y = -1
                0, 0, 0, 1, // rotation
                0xFF, 0xFF, 0, 0, // color
            ]
        );
    }

    #[test]
    fn room_created_ends_with_raw_name() {
        let bytes = ServerMsg::RoomCreated {
            room_id: 7,
            max_players: 3,
            color: 0xFF00_FF00,
            name: "ana".into(),
        }
        .encode();

        assert_eq!(bytes.len(), 4 + 8 + 4 + 4 + 3);
        assert_eq!(&bytes[..4], &[0, 0, 0, 5]);
        assert_eq!(&bytes[4..12], &7i64.to_be_bytes());
        assert_eq!(&bytes[12..16], &3i32.to_be_bytes());
        assert_eq!(&bytes[20..], b"ana");
    }

    #[test]
    fn room_left_prefixes_player_blob_length() {
        let msg = ServerMsg::RoomLeft {
            player: PlayerInfo {
                name: "bo".into(),
                color: 0xFF00_00FF,
            },
            figure: sample_figure(),
        };
        let bytes = msg.encode();

        // version + name length + name + color
        let blob_len = 1 + 4 + 2 + 4;
        assert_eq!(&bytes[4..8], &(blob_len as i32).to_be_bytes());
        assert_eq!(bytes[8], BLOB_VERSION);
        assert_eq!(bytes.len(), 8 + blob_len + FIGURE_WIRE_LEN);
        assert_eq!(ServerMsg::decode(&bytes, Via::Group), Ok(msg));
    }

    #[test]
    fn room_joined_shape_depends_on_delivery() {
        let roster = ServerMsg::RoomRoster {
            room_id: 1,
            color: 0xFFFF_FFFF,
            players: vec![
                PlayerInfo {
                    name: "ana".into(),
                    color: 0xFFFF_0000,
                },
                PlayerInfo {
                    name: "bo".into(),
                    color: 0xFFFF_FFFF,
                },
            ],
        };
        let bytes = roster.encode();
        assert_eq!(ServerMsg::decode(&bytes, Via::Direct), Ok(roster));

        let joined = ServerMsg::RoomJoined {
            room_id: 1,
            color: 0xFFFF_FFFF,
            name: "bo".into(),
        };
        let bytes = joined.encode();
        assert_eq!(bytes.len(), 4 + 8 + 4 + 2);
        assert_eq!(ServerMsg::decode(&bytes, Via::Group), Ok(joined));
    }

    #[test]
    fn game_start_carries_width_and_figures() {
        let msg = ServerMsg::GameStart {
            board_width: 12,
            figures: vec![sample_figure(), FigureInfo { x: 7, ..sample_figure() }],
        };
        let bytes = msg.encode();
        assert_eq!(&bytes[4..8], &12i32.to_be_bytes());
        assert_eq!(bytes.len(), 8 + 1 + 4 + 2 * FIGURE_WIRE_LEN);
        assert_eq!(ServerMsg::decode(&bytes, Via::Group), Ok(msg));
    }

    #[test]
    fn lobby_snapshot_decodes() {
        let snapshot = LobbySnapshot {
            players: vec!["ana".into(), "cy".into()],
            rooms: vec![RoomInfo {
                id: 3,
                max_players: 4,
                started: true,
                players: vec![PlayerInfo {
                    name: "bo".into(),
                    color: 0xFFA2_00FF,
                }],
            }],
        };
        let bytes = ServerMsg::LobbyData(snapshot.clone()).encode();
        assert_eq!(
            ServerMsg::decode(&bytes, Via::Direct),
            Ok(ServerMsg::LobbyData(snapshot))
        );
    }

    #[test]
    fn client_moves_accept_optional_figure() {
        let bare = [0, 0, 0, 17];
        assert_eq!(
            ClientMsg::decode(&bare),
            Ok(ClientMsg::Move {
                action: MoveAction::Down,
                expected: None
            })
        );

        let with_figure = ClientMsg::Move {
            action: MoveAction::Rotate,
            expected: Some(sample_figure()),
        }
        .encode();
        assert_eq!(with_figure.len(), 4 + FIGURE_WIRE_LEN);
        assert!(matches!(
            ClientMsg::decode(&with_figure),
            Ok(ClientMsg::Move {
                action: MoveAction::Rotate,
                expected: Some(_)
            })
        ));

        // a partial figure is a desync, not a bare move
        assert!(matches!(
            ClientMsg::decode(&with_figure[..10]),
            Err(ProtocolError::Truncated { .. })
        ));
    }

    #[test]
    fn client_fixed_payloads() {
        let mut create = vec![0, 0, 0, 4];
        create.extend_from_slice(&2i32.to_be_bytes());
        assert_eq!(
            ClientMsg::decode(&create),
            Ok(ClientMsg::CreateRoom { max_players: 2 })
        );

        let mut join = vec![0, 0, 0, 12];
        join.extend_from_slice(&9i64.to_be_bytes());
        assert_eq!(ClientMsg::decode(&join), Ok(ClientMsg::JoinRoom { room_id: 9 }));

        let mut chat = vec![0, 0, 0, 0];
        chat.extend_from_slice("hola".as_bytes());
        assert_eq!(
            ClientMsg::decode(&chat),
            Ok(ClientMsg::Chat {
                text: "hola".into()
            })
        );
    }

    #[test]
    fn malformed_messages_are_rejected() {
        assert_eq!(ClientMsg::decode(&[0, 0]), Err(ProtocolError::MissingCommand(2)));
        assert_eq!(
            ClientMsg::decode(&[0, 0, 0, 99]),
            Err(ProtocolError::UnknownCommand(99))
        );
        assert_eq!(
            ClientMsg::decode(&[0, 0, 0, 12, 0, 0]),
            Err(ProtocolError::Truncated {
                command: Command::JoinRoom,
                needed: 8,
                remaining: 2
            })
        );
        assert_eq!(
            ClientMsg::decode(&[0, 0, 0, 10, 1]),
            Err(ProtocolError::TrailingBytes {
                command: Command::Abandon,
                extra: 1
            })
        );
        // server-only command sent by a client
        assert_eq!(
            ClientMsg::decode(&[0, 0, 0, 20]),
            Err(ProtocolError::UnexpectedCommand(Command::NewFigure))
        );
    }

    #[test]
    fn unknown_blob_version_is_rejected() {
        let mut bytes = ServerMsg::LobbyData(LobbySnapshot::default()).encode().to_vec();
        bytes[4] = 9;
        assert_eq!(
            ServerMsg::decode(&bytes, Via::Direct),
            Err(ProtocolError::UnsupportedVersion {
                command: Command::LobbyData,
                version: 9
            })
        );
    }

    #[test]
    fn oversized_counts_do_not_allocate() {
        let mut bytes = vec![0, 0, 0, 13, 0, 0, 0, 8, BLOB_VERSION];
        bytes.extend_from_slice(&u32::MAX.to_be_bytes());
        assert!(matches!(
            ServerMsg::decode(&bytes, Via::Group),
            Err(ProtocolError::Truncated { .. })
        ));
    }
}
