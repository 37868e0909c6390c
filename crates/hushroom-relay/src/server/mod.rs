//! WebSocket server: listener, shared state and per-connection tasks.

mod connection;
mod listener;
mod state;

pub use listener::RelayServer;
pub use state::RelayState;
