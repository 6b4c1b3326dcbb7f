//! Command modules
//!
//! Each submodule groups the commands for one area. Commands take the
//! shared `AppState` and return `AppResult` values ready for display.
//!
//! - `translation`: streaming translation, cancel, direction swap
//! - `history`: translation history
//! - `scripts`: script library and export
//! - `settings`: settings persistence

pub mod history;
pub mod scripts;
pub mod settings;
pub mod translation;

pub use history::*;
pub use scripts::*;
pub use settings::*;
pub use translation::*;
