// Interface adapters: wire protocol, HTTP and WebSocket handling.

pub mod http;
pub mod net;
pub mod protocol;
pub mod routes;
pub mod state;
