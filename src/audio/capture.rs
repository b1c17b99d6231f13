//! Microphone capture
//!
//! The device callback hands each block to a [`CaptureProcessor`], which
//! applies mute, encodes the block and offers it to the send queue. The cpal
//! stream itself lives on a dedicated thread for the lifetime of the capture.

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{SampleFormat, SizedSample, StreamConfig};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::audio::device::{find_device, pick_sample_format, stream_config, Direction};
use crate::codec::{ChunkEncoder, PcmSample};
use crate::config::MuteMode;
use crate::constants::STREAM_KEEPALIVE_POLL;
use crate::error::AudioError;
use crate::session::{PipelineCounters, SharedContext};

/// What happened to one captured block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOutcome {
    Queued,
    /// Discarded because the microphone is muted
    Muted,
    /// Send queue full
    Dropped,
}

/// Per-block capture work, independent of the audio backend
pub struct CaptureProcessor {
    ctx: SharedContext,
    encoder: ChunkEncoder,
    /// Panic in the next `process`
    #[cfg(test)]
    fail_next: bool,
}

impl CaptureProcessor {
    pub fn new(ctx: SharedContext) -> Self {
        let block = ctx.config().samples_per_block();
        Self {
            ctx,
            encoder: ChunkEncoder::with_capacity(block),
            #[cfg(test)]
            fail_next: false,
        }
    }

    /// Handle one interleaved device block. Never blocks.
    pub fn process<T: PcmSample>(&mut self, input: &[T]) -> CaptureOutcome {
        #[cfg(test)]
        if std::mem::take(&mut self.fail_next) {
            panic!("injected capture failure");
        }

        let chunk = if self.ctx.is_muted() {
            PipelineCounters::bump(&self.ctx.counters().muted_blocks);
            match self.ctx.config().mute_mode {
                MuteMode::Drop => return CaptureOutcome::Muted,
                MuteMode::Silence => self.encoder.encode_silence(input.len()),
            }
        } else {
            self.encoder.encode(input)
        };

        if self.ctx.send_queue().push(chunk) {
            CaptureOutcome::Queued
        } else {
            tracing::trace!("send queue full, dropping block");
            CaptureOutcome::Dropped
        }
    }

    /// [`process`](Self::process) for use inside a device callback: a panic
    /// is counted and swallowed so the stream keeps running.
    pub fn process_guarded<T: PcmSample>(&mut self, input: &[T]) -> Option<CaptureOutcome> {
        match panic::catch_unwind(AssertUnwindSafe(|| self.process(input))) {
            Ok(outcome) => Some(outcome),
            Err(_) => {
                PipelineCounters::bump(&self.ctx.counters().callback_panics);
                tracing::error!("capture callback panicked, block discarded");
                None
            }
        }
    }
}

/// Microphone input stream owned by a background thread
pub struct AudioCapture {
    ctx: SharedContext,

    /// Whether capture is running
    running: Arc<AtomicBool>,

    /// Stream thread handle
    thread_handle: Option<JoinHandle<()>>,

    /// Channel for stream errors
    error_rx: Option<Receiver<AudioError>>,
}

impl AudioCapture {
    pub fn new(ctx: SharedContext) -> Self {
        Self {
            ctx,
            running: Arc::new(AtomicBool::new(false)),
            thread_handle: None,
            error_rx: None,
        }
    }

    /// Open the input device and start streaming.
    ///
    /// Returns once the stream is playing, or with the reason it could not be
    /// opened.
    pub fn start(&mut self) -> Result<(), AudioError> {
        if self.running.load(Ordering::SeqCst) {
            return Ok(());
        }

        let (error_tx, error_rx) = bounded::<AudioError>(16);
        let (ready_tx, ready_rx) = bounded::<Result<(), AudioError>>(1);
        self.error_rx = Some(error_rx);

        let ctx = self.ctx.clone();
        let running = self.running.clone();
        running.store(true, Ordering::SeqCst);

        let handle = thread::Builder::new()
            .name("audio-capture".into())
            .spawn(move || {
                let stream = match open_input_stream(&ctx, error_tx) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));

                // Keep thread alive while running
                while running.load(Ordering::Relaxed) && ctx.is_running() {
                    thread::sleep(STREAM_KEEPALIVE_POLL);
                }

                // Stream is dropped here, stopping capture
                drop(stream);
                tracing::debug!("capture stream closed");
            })
            .map_err(|e| AudioError::StreamError(e.to_string()))?;

        let ready = ready_rx
            .recv()
            .unwrap_or_else(|_| Err(AudioError::StreamError("capture thread exited".into())));
        match ready {
            Ok(()) => {
                self.thread_handle = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                let _ = handle.join();
                Err(e)
            }
        }
    }

    /// Stop capturing audio
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);

        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }

    /// Check if capture is running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Check for stream errors
    pub fn check_errors(&self) -> Option<AudioError> {
        self.error_rx.as_ref().and_then(|rx| rx.try_recv().ok())
    }
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

fn open_input_stream(
    ctx: &SharedContext,
    error_tx: Sender<AudioError>,
) -> Result<cpal::Stream, AudioError> {
    let config = ctx.config();
    let device = find_device(Direction::Input, config.input_device.as_deref())?;
    let format = pick_sample_format(&device, Direction::Input, config)?;

    tracing::info!(
        "Opening input '{}' ({} Hz, {} ch, {:?}, block {})",
        device.name().unwrap_or_else(|_| "unknown".into()),
        config.sample_rate,
        config.channels,
        format,
        config.block_size
    );

    let stream = match build_input_stream(
        &device,
        format,
        &stream_config(config, true),
        ctx,
        error_tx.clone(),
    ) {
        Ok(stream) => stream,
        Err(e) => {
            tracing::warn!("Fixed block size rejected ({}), using device default", e);
            build_input_stream(&device, format, &stream_config(config, false), ctx, error_tx)?
        }
    };

    stream
        .play()
        .map_err(|e| AudioError::StreamError(e.to_string()))?;
    Ok(stream)
}

fn build_input_stream(
    device: &cpal::Device,
    format: SampleFormat,
    config: &StreamConfig,
    ctx: &SharedContext,
    error_tx: Sender<AudioError>,
) -> Result<cpal::Stream, AudioError> {
    let processor = CaptureProcessor::new(ctx.clone());
    match format {
        SampleFormat::I8 => build_typed::<i8>(device, config, processor, error_tx),
        SampleFormat::I16 => build_typed::<i16>(device, config, processor, error_tx),
        SampleFormat::I32 => build_typed::<i32>(device, config, processor, error_tx),
        SampleFormat::I64 => build_typed::<i64>(device, config, processor, error_tx),
        SampleFormat::U8 => build_typed::<u8>(device, config, processor, error_tx),
        SampleFormat::U16 => build_typed::<u16>(device, config, processor, error_tx),
        SampleFormat::U32 => build_typed::<u32>(device, config, processor, error_tx),
        SampleFormat::U64 => build_typed::<u64>(device, config, processor, error_tx),
        SampleFormat::F32 => build_typed::<f32>(device, config, processor, error_tx),
        SampleFormat::F64 => build_typed::<f64>(device, config, processor, error_tx),
        other => Err(AudioError::UnsupportedFormat(format!("{:?}", other))),
    }
}

fn build_typed<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut processor: CaptureProcessor,
    error_tx: Sender<AudioError>,
) -> Result<cpal::Stream, AudioError>
where
    T: SizedSample + PcmSample,
{
    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                processor.process_guarded(data);
            },
            move |err| {
                tracing::warn!("input stream status: {}", err);
                let _ = error_tx.try_send(AudioError::StreamError(err.to_string()));
            },
            None,
        )
        .map_err(|e| AudioError::CpalError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::decoder::decode_chunk;
    use crate::config::SessionConfig;
    use crate::session::SessionContext;

    fn ctx(config: SessionConfig) -> SharedContext {
        SessionContext::shared(config)
    }

    #[test]
    fn test_block_is_encoded_and_queued() {
        let ctx = ctx(SessionConfig::default());
        let mut processor = CaptureProcessor::new(ctx.clone());

        assert_eq!(processor.process(&[1i16, 2]), CaptureOutcome::Queued);
        let chunk = ctx.send_queue().try_pop().unwrap();
        assert_eq!(chunk.data, "AQACAA==");
        assert_eq!(chunk.samples, 2);
    }

    #[test]
    fn test_float_block_is_normalized() {
        let ctx = ctx(SessionConfig::default());
        let mut processor = CaptureProcessor::new(ctx.clone());

        processor.process(&[1.0f32, -1.0, 0.0, 2.0]);
        let chunk = ctx.send_queue().try_pop().unwrap();
        let decoded = decode_chunk(&chunk.data).unwrap();
        assert_eq!(decoded.samples, vec![32767, -32767, 0, 32767]);
    }

    #[test]
    fn test_muted_blocks_are_dropped() {
        let ctx = ctx(SessionConfig::default());
        let mut processor = CaptureProcessor::new(ctx.clone());

        ctx.set_muted(true);
        for _ in 0..5 {
            assert_eq!(processor.process(&[100i16; 64]), CaptureOutcome::Muted);
        }
        assert!(ctx.send_queue().is_empty());
        assert_eq!(ctx.stats().muted_blocks, 5);

        ctx.set_muted(false);
        assert_eq!(processor.process(&[100i16; 64]), CaptureOutcome::Queued);
        assert_eq!(ctx.send_queue().len(), 1);
    }

    #[test]
    fn test_silence_mode_sends_zeros() {
        let ctx = ctx(SessionConfig {
            mute_mode: MuteMode::Silence,
            ..SessionConfig::default()
        });
        let mut processor = CaptureProcessor::new(ctx.clone());

        ctx.set_muted(true);
        assert_eq!(processor.process(&[0.5f32; 4]), CaptureOutcome::Queued);
        let chunk = ctx.send_queue().try_pop().unwrap();
        assert_eq!(decode_chunk(&chunk.data).unwrap().samples, vec![0; 4]);
    }

    #[test]
    fn test_panic_in_callback_is_swallowed() {
        let ctx = ctx(SessionConfig::default());
        let mut processor = CaptureProcessor::new(ctx.clone());

        processor.fail_next = true;
        assert_eq!(processor.process_guarded(&[1i16, 2]), None);
        assert!(ctx.send_queue().is_empty());
        assert_eq!(ctx.stats().callback_panics, 1);

        assert_eq!(processor.process_guarded(&[1i16, 2]), Some(CaptureOutcome::Queued));
        assert_eq!(ctx.send_queue().len(), 1);
    }

    #[test]
    fn test_full_queue_drops_newest() {
        let ctx = ctx(SessionConfig {
            send_queue_capacity: 2,
            ..SessionConfig::default()
        });
        let mut processor = CaptureProcessor::new(ctx.clone());

        assert_eq!(processor.process(&[1i16]), CaptureOutcome::Queued);
        assert_eq!(processor.process(&[2i16]), CaptureOutcome::Queued);
        assert_eq!(processor.process(&[3i16]), CaptureOutcome::Dropped);

        assert_eq!(ctx.send_queue().len(), 2);
        assert_eq!(ctx.send_queue().dropped_count(), 1);
        // Oldest chunks survive
        assert_eq!(ctx.send_queue().try_pop().unwrap().data, "AQA=");
        assert_eq!(ctx.send_queue().try_pop().unwrap().data, "AgA=");
    }
}
