//! Bounded drop-on-full queues for audio chunks
//!
//! Both directions of the pipeline hand chunks between a real-time audio
//! callback and a network thread. Insertion never blocks: when the queue is
//! full the chunk is discarded and counted instead.

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// One time-contiguous slice of PCM16 audio, interleaved by channel
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AudioChunk {
    pub samples: Vec<i16>,
}

impl AudioChunk {
    pub fn new(samples: Vec<i16>) -> Self {
        Self { samples }
    }

    /// Total samples across all channels
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

}

/// Base64 PCM16 chunk waiting to be emitted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedChunk {
    /// Standard padded base64 of the little-endian sample bytes
    pub data: String,
    /// Number of samples the payload carries
    pub samples: usize,
}

/// Bounded FIFO that fails fast instead of blocking producers
pub struct BoundedQueue<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
    capacity: usize,
    pushed: AtomicU64,
    dropped: AtomicU64,
}

impl<T> BoundedQueue<T> {
    /// Create a new queue with the specified capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity);
        Self {
            tx,
            rx,
            capacity,
            pushed: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Push an item without blocking.
    /// Returns false if the queue is full; the item is discarded.
    pub fn push(&self, item: T) -> bool {
        match self.tx.try_send(item) {
            Ok(()) => {
                self.pushed.fetch_add(1, Ordering::Relaxed);
                true
            }
            // Disconnected cannot happen while we own both ends.
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Pop without blocking
    pub fn try_pop(&self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Wait up to `timeout` for an item
    pub fn pop_timeout(&self, timeout: Duration) -> Option<T> {
        match self.rx.recv_timeout(timeout) {
            Ok(item) => Some(item),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Items accepted since creation
    pub fn pushed_count(&self) -> u64 {
        self.pushed.load(Ordering::Relaxed)
    }

    /// Items discarded because the queue was full
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Discard everything currently queued
    pub fn clear(&self) {
        while self.rx.try_recv().is_ok() {}
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            len: self.len(),
            capacity: self.capacity,
            pushed: self.pushed_count(),
            dropped: self.dropped_count(),
        }
    }
}

/// Queue statistics snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStats {
    pub len: usize,
    pub capacity: usize,
    pub pushed: u64,
    pub dropped: u64,
}

impl QueueStats {
    pub fn drop_rate(&self) -> f32 {
        let total = self.pushed + self.dropped;
        if total == 0 {
            0.0
        } else {
            self.dropped as f32 / total as f32
        }
    }
}
