//! Process-wide session context shared by every loop and callback

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::audio::buffer::{AudioChunk, BoundedQueue, EncodedChunk, QueueStats};
use crate::audio::device::Direction;
use crate::config::SessionConfig;
use crate::error::AudioError;

/// Shared state: config, on/off flags, both queues and counters.
///
/// Flags are plain atomics; readers tolerate seeing a toggle one block late.
pub struct SessionContext {
    config: SessionConfig,
    muted: AtomicBool,
    running: AtomicBool,
    send_queue: BoundedQueue<EncodedChunk>,
    playback_queue: BoundedQueue<AudioChunk>,
    counters: PipelineCounters,
    started: Instant,
}

pub type SharedContext = Arc<SessionContext>;

impl SessionContext {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            send_queue: BoundedQueue::new(config.send_queue_capacity),
            playback_queue: BoundedQueue::new(config.playback_queue_capacity),
            config,
            muted: AtomicBool::new(false),
            running: AtomicBool::new(true),
            counters: PipelineCounters::default(),
            started: Instant::now(),
        }
    }

    pub fn shared(config: SessionConfig) -> SharedContext {
        Arc::new(Self::new(config))
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::Relaxed)
    }

    /// Returns the previous state
    pub fn set_muted(&self, muted: bool) -> bool {
        self.muted.swap(muted, Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Ask every loop to wind down
    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }

    /// Failure policy for an error reported by a running device stream:
    /// losing the input ends the session, losing the output does not.
    ///
    /// Returns whether the session was stopped.
    pub fn stream_failed(&self, direction: Direction, err: &AudioError) -> bool {
        match direction {
            Direction::Input => {
                tracing::error!("Input stream failed, stopping: {}", err);
                self.stop();
                true
            }
            Direction::Output => {
                tracing::warn!("Output stream error, playback may be silent: {}", err);
                false
            }
        }
    }

    pub fn send_queue(&self) -> &BoundedQueue<EncodedChunk> {
        &self.send_queue
    }

    pub fn playback_queue(&self) -> &BoundedQueue<AudioChunk> {
        &self.playback_queue
    }

    pub fn counters(&self) -> &PipelineCounters {
        &self.counters
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    /// Snapshot of queue and pipeline counters
    pub fn stats(&self) -> StreamStats {
        let c = &self.counters;
        StreamStats {
            uptime: self.uptime(),
            muted: self.is_muted(),
            send_queue: self.send_queue.stats(),
            playback_queue: self.playback_queue.stats(),
            muted_blocks: c.muted_blocks.load(Ordering::Relaxed),
            chunks_sent: c.chunks_sent.load(Ordering::Relaxed),
            emit_failures: c.emit_failures.load(Ordering::Relaxed),
            chunks_received: c.chunks_received.load(Ordering::Relaxed),
            empty_payloads: c.empty_payloads.load(Ordering::Relaxed),
            decode_failures: c.decode_failures.load(Ordering::Relaxed),
            playback_underruns: c.playback_underruns.load(Ordering::Relaxed),
            callback_panics: c.callback_panics.load(Ordering::Relaxed),
        }
    }
}

/// Monotonic pipeline counters
#[derive(Debug, Default)]
pub struct PipelineCounters {
    pub muted_blocks: AtomicU64,
    pub chunks_sent: AtomicU64,
    pub emit_failures: AtomicU64,
    pub chunks_received: AtomicU64,
    pub empty_payloads: AtomicU64,
    pub decode_failures: AtomicU64,
    pub playback_underruns: AtomicU64,
    pub callback_panics: AtomicU64,
}

impl PipelineCounters {
    #[inline]
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Statistics snapshot
#[derive(Debug, Clone)]
pub struct StreamStats {
    pub uptime: Duration,
    pub muted: bool,
    pub send_queue: QueueStats,
    pub playback_queue: QueueStats,
    pub muted_blocks: u64,
    pub chunks_sent: u64,
    pub emit_failures: u64,
    pub chunks_received: u64,
    pub empty_payloads: u64,
    pub decode_failures: u64,
    pub playback_underruns: u64,
    pub callback_panics: u64,
}

impl fmt::Display for StreamStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "uptime {:.0}s, muted: {}", self.uptime.as_secs_f64(), self.muted)?;
        writeln!(
            f,
            "send:     queued {}/{}, dropped {} ({:.1}%), sent {}, emit failures {}, muted blocks {}",
            self.send_queue.len,
            self.send_queue.capacity,
            self.send_queue.dropped,
            self.send_queue.drop_rate() * 100.0,
            self.chunks_sent,
            self.emit_failures,
            self.muted_blocks
        )?;
        write!(
            f,
            "playback: queued {}/{}, dropped {} ({:.1}%), received {}, empty {}, decode failures {}, underruns {}, callback panics {}",
            self.playback_queue.len,
            self.playback_queue.capacity,
            self.playback_queue.dropped,
            self.playback_queue.drop_rate() * 100.0,
            self.chunks_received,
            self.empty_payloads,
            self.decode_failures,
            self.playback_underruns,
            self.callback_panics
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_are_independent_per_context() {
        let a = SessionContext::new(SessionConfig::default());
        let b = SessionContext::new(SessionConfig::default());

        assert!(a.is_running());
        assert!(!a.is_muted());

        assert!(!a.set_muted(true));
        assert!(a.set_muted(true));
        a.stop();

        assert!(a.is_muted());
        assert!(!a.is_running());
        assert!(b.is_running());
        assert!(!b.is_muted());
    }

    #[test]
    fn test_stream_failure_policy() {
        let ctx = SessionContext::new(SessionConfig::default());
        let err = AudioError::StreamError("device unplugged".into());

        assert!(!ctx.stream_failed(Direction::Output, &err));
        assert!(ctx.is_running());

        assert!(ctx.stream_failed(Direction::Input, &err));
        assert!(!ctx.is_running());
    }

    #[test]
    fn test_queues_follow_config() {
        let config = SessionConfig {
            send_queue_capacity: 3,
            playback_queue_capacity: 5,
            ..SessionConfig::default()
        };
        let ctx = SessionContext::new(config);
        assert_eq!(ctx.send_queue().capacity(), 3);
        assert_eq!(ctx.playback_queue().capacity(), 5);
    }

    #[test]
    fn test_stats_snapshot() {
        let ctx = SessionContext::new(SessionConfig::default());
        PipelineCounters::bump(&ctx.counters().chunks_sent);
        PipelineCounters::bump(&ctx.counters().chunks_sent);
        PipelineCounters::bump(&ctx.counters().decode_failures);

        let stats = ctx.stats();
        assert_eq!(stats.chunks_sent, 2);
        assert_eq!(stats.decode_failures, 1);
        assert_eq!(stats.send_queue.capacity, 128);

        let text = stats.to_string();
        assert!(text.contains("sent 2"));
        assert!(text.contains("decode failures 1"));
    }
}
