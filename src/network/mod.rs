//! Network subsystem: Socket.IO relay transport and the two pipeline ends
//! that touch it

pub mod client;
pub mod engineio;
pub mod receiver;
pub mod sender;
pub mod socketio;

pub use client::{EventEmitter, SocketClient};
pub use receiver::{AudioChunkHandler, ReceiveOutcome};
pub use sender::NetworkSender;
