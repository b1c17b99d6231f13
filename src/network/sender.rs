//! Network sender loop
//!
//! Drains the send queue on a dedicated thread and emits each chunk to the
//! room. Delivery is fire-and-forget: a failed emit is logged, followed by a
//! short pause, and the chunk is gone.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::audio::buffer::EncodedChunk;
use crate::constants::{EMIT_RETRY_PAUSE, EVENT_AUDIO_CHUNK, SEND_POLL_TIMEOUT};
use crate::error::NetworkError;
use crate::network::client::EventEmitter;
use crate::protocol::OutboundAudioChunk;
use crate::session::{PipelineCounters, SessionContext, SharedContext};

/// Emit one encoded chunk tagged with the session's room and format
pub fn send_chunk(
    ctx: &SessionContext,
    emitter: &dyn EventEmitter,
    chunk: EncodedChunk,
) -> Result<(), NetworkError> {
    let config = ctx.config();
    let message = OutboundAudioChunk {
        room: config.room.clone(),
        data: chunk.data,
        sample_rate: config.sample_rate,
        channels: config.channels,
    };
    emitter.emit(EVENT_AUDIO_CHUNK, serde_json::to_value(message)?)
}

/// Run until the session's running flag is cleared
pub fn run_sender_loop(ctx: &SessionContext, emitter: &dyn EventEmitter) {
    tracing::info!("Network sender thread started");
    let counters = ctx.counters();

    while ctx.is_running() {
        // Bounded wait so a cleared running flag is noticed while idle
        let Some(chunk) = ctx.send_queue().pop_timeout(SEND_POLL_TIMEOUT) else {
            continue;
        };

        match send_chunk(ctx, emitter, chunk) {
            Ok(()) => PipelineCounters::bump(&counters.chunks_sent),
            Err(e) => {
                PipelineCounters::bump(&counters.emit_failures);
                tracing::warn!("emit failed: {}", e);
                thread::sleep(EMIT_RETRY_PAUSE);
            }
        }
    }

    tracing::info!("Network sender thread stopped");
}

/// Handle to the sender thread
pub struct NetworkSender {
    handle: Option<JoinHandle<()>>,
}

impl NetworkSender {
    pub fn spawn(ctx: SharedContext, emitter: Arc<dyn EventEmitter>) -> std::io::Result<Self> {
        let handle = thread::Builder::new()
            .name("network-sender".into())
            .spawn(move || run_sender_loop(&ctx, emitter.as_ref()))?;
        Ok(Self {
            handle: Some(handle),
        })
    }

    /// Wait for the loop to exit; the session must already be stopped
    pub fn join(mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("Network sender thread panicked");
            }
        }
    }
}
