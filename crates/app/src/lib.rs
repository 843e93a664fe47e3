pub mod config;
pub mod server;
pub mod views;

pub use config::{Cli, Command, EmbedderChoice, Settings};
pub use server::{router, serve, AppState};
