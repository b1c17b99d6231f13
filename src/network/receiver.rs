//! Inbound `audio-chunk` handling
//!
//! Runs on the connection task's dispatch path, so it must never block:
//! decoded chunks are offered to the playback queue and dropped if it is full.

use serde::Deserialize;
use serde_json::Value;

use crate::codec::decoder::decode_chunk;
use crate::error::CodecError;
use crate::protocol::InboundAudioChunk;
use crate::session::{PipelineCounters, SessionContext, SharedContext};

/// What happened to one inbound message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveOutcome {
    Queued,
    /// Missing or empty `data`
    Empty,
    /// Playback queue full
    Dropped,
    Malformed,
}

/// Event handler feeding the playback queue
#[derive(Clone)]
pub struct AudioChunkHandler {
    ctx: SharedContext,
}

impl AudioChunkHandler {
    pub fn new(ctx: SharedContext) -> Self {
        Self { ctx }
    }

    /// Handle one event payload. Never panics on bad input.
    pub fn handle(&self, payload: &Value) -> ReceiveOutcome {
        handle_payload(&self.ctx, payload)
    }
}

/// Decode and enqueue one `audio-chunk` payload
pub fn handle_payload(ctx: &SessionContext, payload: &Value) -> ReceiveOutcome {
    let counters = ctx.counters();

    if payload.is_null() {
        PipelineCounters::bump(&counters.empty_payloads);
        tracing::trace!("audio-chunk without payload");
        return ReceiveOutcome::Empty;
    }

    let message = match InboundAudioChunk::deserialize(payload) {
        Ok(message) => message,
        Err(_) => {
            PipelineCounters::bump(&counters.decode_failures);
            tracing::warn!("on_audio_chunk error: {}", CodecError::MalformedPayload);
            return ReceiveOutcome::Malformed;
        }
    };

    let data = match message.data() {
        Some(data) if !data.is_empty() => data,
        _ => {
            PipelineCounters::bump(&counters.empty_payloads);
            tracing::trace!(sender = ?message.sender(), "audio-chunk without data");
            return ReceiveOutcome::Empty;
        }
    };

    tracing::debug!(
        sender = ?message.sender(),
        bytes = data.len(),
        "audio-chunk received"
    );

    let chunk = match decode_chunk(data) {
        Ok(chunk) => chunk,
        Err(e) => {
            PipelineCounters::bump(&counters.decode_failures);
            tracing::warn!("on_audio_chunk error: {}", e);
            return ReceiveOutcome::Malformed;
        }
    };

    // Whitespace-only data
    if chunk.is_empty() {
        PipelineCounters::bump(&counters.empty_payloads);
        return ReceiveOutcome::Empty;
    }
    tracing::trace!(samples = chunk.len(), "audio-chunk decoded");

    PipelineCounters::bump(&counters.chunks_received);
    if ctx.playback_queue().push(chunk) {
        ReceiveOutcome::Queued
    } else {
        tracing::debug!("playback queue full, dropping chunk");
        ReceiveOutcome::Dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use serde_json::json;

    fn ctx(playback_capacity: usize) -> SharedContext {
        SessionContext::shared(SessionConfig {
            playback_queue_capacity: playback_capacity,
            ..SessionConfig::default()
        })
    }

    #[test]
    fn test_wrapped_payload_is_queued() {
        let ctx = ctx(4);
        let handler = AudioChunkHandler::new(ctx.clone());
        let outcome = handler.handle(&json!({"sender": "peer-1", "data": "AQACAA=="}));
        assert_eq!(outcome, ReceiveOutcome::Queued);
        assert_eq!(ctx.playback_queue().try_pop().unwrap().samples, vec![1, 2]);
        assert_eq!(ctx.stats().chunks_received, 1);
    }

    #[test]
    fn test_bare_string_is_tolerated() {
        let ctx = ctx(4);
        assert_eq!(handle_payload(&ctx, &json!("AQACAA==")), ReceiveOutcome::Queued);
        assert_eq!(ctx.playback_queue().len(), 1);
    }

    #[test]
    fn test_empty_data_leaves_queue_untouched() {
        let ctx = ctx(4);
        assert_eq!(
            handle_payload(&ctx, &json!({"sender": "peer-1", "data": ""})),
            ReceiveOutcome::Empty
        );
        assert_eq!(handle_payload(&ctx, &json!({"sender": "peer-1"})), ReceiveOutcome::Empty);
        assert_eq!(handle_payload(&ctx, &json!("")), ReceiveOutcome::Empty);
        assert!(ctx.playback_queue().is_empty());
        assert_eq!(ctx.playback_queue().pushed_count(), 0);
    }

    #[test]
    fn test_loose_sender_and_null_payload() {
        let ctx = ctx(4);
        assert_eq!(
            handle_payload(&ctx, &json!({"sender": 7, "data": "AQA="})),
            ReceiveOutcome::Queued
        );
        assert_eq!(
            handle_payload(&ctx, &json!({"sender": {"id": "p1"}, "data": "AgA="})),
            ReceiveOutcome::Queued
        );
        assert_eq!(handle_payload(&ctx, &Value::Null), ReceiveOutcome::Empty);
        assert_eq!(
            handle_payload(&ctx, &json!({"sender": null, "data": null})),
            ReceiveOutcome::Empty
        );

        assert_eq!(ctx.playback_queue().len(), 2);
        let stats = ctx.stats();
        assert_eq!(stats.decode_failures, 0);
        assert_eq!(stats.empty_payloads, 2);
    }

    #[test]
    fn test_wrapped_lines_in_data_are_decoded() {
        let ctx = ctx(4);
        assert_eq!(
            handle_payload(&ctx, &json!({"data": "AQAC\nAA=="})),
            ReceiveOutcome::Queued
        );
        assert_eq!(ctx.playback_queue().try_pop().unwrap().samples, vec![1, 2]);

        assert_eq!(handle_payload(&ctx, &json!({"data": " \n"})), ReceiveOutcome::Empty);
        assert!(ctx.playback_queue().is_empty());
        assert_eq!(ctx.stats().empty_payloads, 1);
    }

    #[test]
    fn test_malformed_payloads_are_swallowed() {
        let ctx = ctx(4);
        assert_eq!(handle_payload(&ctx, &json!({"data": "%%%"})), ReceiveOutcome::Malformed);
        assert_eq!(handle_payload(&ctx, &json!({"data": "AAAA"})), ReceiveOutcome::Malformed);
        assert_eq!(handle_payload(&ctx, &json!(17)), ReceiveOutcome::Malformed);
        assert!(ctx.playback_queue().is_empty());
        assert_eq!(ctx.stats().decode_failures, 3);
    }

    #[test]
    fn test_overflow_drops_without_blocking() {
        let ctx = ctx(1);
        assert_eq!(handle_payload(&ctx, &json!("AQA=")), ReceiveOutcome::Queued);
        assert_eq!(handle_payload(&ctx, &json!("AgA=")), ReceiveOutcome::Dropped);
        assert_eq!(ctx.playback_queue().len(), 1);
        assert_eq!(ctx.playback_queue().dropped_count(), 1);
        assert_eq!(ctx.playback_queue().try_pop().unwrap().samples, vec![1]);
    }
}
