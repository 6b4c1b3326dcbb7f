//! ScriptDesk: streaming Hindi/English translation with bounded history,
//! plus a persisted script library.

pub mod api;
pub mod cli;
pub mod core;
pub mod shared;

pub use api::AppState;
pub use shared::error::{AppError, AppResult};
