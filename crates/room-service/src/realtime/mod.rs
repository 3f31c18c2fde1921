//! Real-time channel over WebSocket.

pub mod session;
pub mod ws;

pub use session::RealtimeSession;
pub use ws::ws_handler;
