//! Game rules: board, figures and rooms

pub mod board;
pub mod figure;
pub mod room;

pub use board::{board_width_for, Board, CellState, BOARD_HEIGHT};
pub use figure::{Figure, FigureKind};
pub use room::{
    GameRoom, Recipient, RoomCommand, RoomEvent, RoomHandle, RoomPhase, RoomRegistry, RoomSettings,
    RoomState, SeatRefusal, PLAYER_COLORS,
};
