//! Block Room Server - authoritative multiplayer falling-block game server
//!
//! Players connect over a WebSocket, meet in a shared lobby, and play in
//! rooms on one wide board. The server owns every board and figure; clients
//! only send intents and render the binary broadcasts.

pub mod app;
pub mod config;
pub mod game;
pub mod http;
pub mod lobby;
pub mod util;
pub mod ws;
