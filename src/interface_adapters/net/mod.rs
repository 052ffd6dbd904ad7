// WebSocket adapter for match clients.

pub mod client;

pub use client::{spawn_match_serializer, ws_handler};
