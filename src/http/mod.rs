//! HTTP surface: health, lobby snapshot and the WebSocket upgrade

pub mod routes;

pub use routes::{build_router, AppError};
