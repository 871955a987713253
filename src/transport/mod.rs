//! Front-ends: the HTTP chat UI and the terminal commands

pub mod cli;
pub mod http;
mod page;
pub mod render;

pub use http::{run_chat_server, AppState};
