//! CLI command handlers.

pub mod server;
