//! dispatch-server
//!
//! Multi-client async WebSocket server for the request dispatch core.

pub mod config;
pub mod generator;
pub mod server;

// internal module, not re-exported
mod client;
