//! # Room Audio Streamer
//!
//! Bidirectional real-time audio between the local microphone/speaker pair and
//! a room-based Socket.IO relay.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │                               LOCAL PC                                    │
//! │                                                                           │
//! │  ┌─────────────┐  normalize  ┌──────────────┐  pop(500ms) ┌────────────┐  │
//! │  │ Microphone  │────────────▶│  Send Queue  │────────────▶│  Sender    │  │
//! │  │  (cpal cb)  │  base64     │  (bounded)   │             │  Thread    │  │
//! │  └─────────────┘  try_push   └──────────────┘             └─────┬──────┘  │
//! │                                                                  │ emit    │
//! │                                                                  ▼         │
//! │                                                    ┌──────────────────────┐│
//! │                                                    │ Socket.IO client     ││
//! │                                                    │ (network::client)    ││
//! │                                                    │ Engine.IO/WebSocket  ││
//! │                                                    └──────────┬───────────┘│
//! │  ┌─────────────┐  drain+pad  ┌──────────────┐  try_push      │ dispatch   │
//! │  │  Speaker    │◀────────────│Playback Queue│◀───────────────┘ (receiver) │
//! │  │  (cpal cb)  │  leftover   │  (bounded)   │  base64 decode              │
//! │  └─────────────┘             └──────────────┘                             │
//! └──────────────────────────────────────────┬───────────────────────────────┘
//!                                            │ ws:// or wss://
//!                                            ▼
//!                                 ┌─────────────────────┐
//!                                 │  Relay server room  │
//!                                 └─────────────────────┘
//! ```
//!
//! Neither audio callback ever blocks: both queues drop on overflow and the
//! playback side pads underruns with silence.

pub mod audio;
pub mod codec;
pub mod config;
pub mod console;
pub mod error;
pub mod network;
pub mod protocol;
pub mod session;

/// Application-wide constants
pub mod constants {
    use std::time::Duration;

    /// Default sample rate for capture and playback
    pub const DEFAULT_SAMPLE_RATE: u32 = 16000;

    /// Default channel count (mono)
    pub const DEFAULT_CHANNELS: u16 = 1;

    /// Default device block size in frames
    pub const DEFAULT_BLOCK_SIZE: u32 = 1024;

    /// Default relay server URL
    pub const DEFAULT_SERVER_URL: &str = "http://localhost:3000";

    /// Default room code
    pub const DEFAULT_ROOM: &str = "test-room";

    /// Default display name announced on join
    pub const DEFAULT_NAME: &str = "Rust-Mic";

    /// Send queue capacity (encoded chunks)
    pub const DEFAULT_SEND_QUEUE_CAPACITY: usize = 128;

    /// Playback queue capacity (decoded chunks)
    pub const DEFAULT_PLAYBACK_QUEUE_CAPACITY: usize = 256;

    /// How long the sender waits on an empty queue before re-checking the running flag
    pub const SEND_POLL_TIMEOUT: Duration = Duration::from_millis(500);

    /// Pause after a failed emit
    pub const EMIT_RETRY_PAUSE: Duration = Duration::from_millis(100);

    /// Poll interval of the threads keeping device streams alive
    pub const STREAM_KEEPALIVE_POLL: Duration = Duration::from_millis(200);

    /// Full scale used when converting float samples to PCM16
    pub const PCM16_FULL_SCALE: f32 = 32767.0;

    /// Event names used on the relay
    pub const EVENT_JOIN_ROOM: &str = "join-room";
    pub const EVENT_AUDIO_CHUNK: &str = "audio-chunk";
}
