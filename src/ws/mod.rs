//! WebSocket transport: command table, codec, broadcast groups, sessions

pub mod channel;
pub mod command;
pub mod handler;
pub mod protocol;

pub use channel::{ChannelManager, SessionId, SessionSender, LOBBY_CHANNEL};
pub use command::Command;
pub use protocol::{ClientMsg, ProtocolError, ServerMsg, Via};
