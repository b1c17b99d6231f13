//! Speaker playback
//!
//! Each output callback is filled by a [`PlaybackRenderer`] from the playback
//! queue. Whatever part of a chunk does not fit in the current buffer is kept
//! and played first in the next callback; gaps are filled with silence.

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{FromSample, SampleFormat, SizedSample, StreamConfig};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::audio::buffer::AudioChunk;
use crate::audio::device::{find_device, pick_sample_format, stream_config, Direction};
use crate::constants::STREAM_KEEPALIVE_POLL;
use crate::error::AudioError;
use crate::session::{PipelineCounters, SharedContext};

/// Partially played chunk
struct Pending {
    chunk: AudioChunk,
    pos: usize,
}

/// Turns queued chunks into device-sized output buffers
pub struct PlaybackRenderer {
    ctx: SharedContext,
    channels: usize,
    pending: Option<Pending>,
    /// Panic in the next `fill` after copying audio
    #[cfg(test)]
    fail_next: bool,
}

impl PlaybackRenderer {
    pub fn new(ctx: SharedContext) -> Self {
        let channels = usize::from(ctx.config().channels.max(1));
        Self {
            ctx,
            channels,
            pending: None,
            #[cfg(test)]
            fail_next: false,
        }
    }

    /// Samples held back from the last callback
    pub fn pending_len(&self) -> usize {
        self.pending
            .as_ref()
            .map_or(0, |p| p.chunk.samples.len() - p.pos)
    }

    /// Fill `out` with queued audio, silence for whatever is missing.
    ///
    /// Only whole frames are written; a trailing partial frame stays zero.
    /// Returns the number of samples taken from the queue.
    pub fn fill(&mut self, out: &mut [i16]) -> usize {
        out.fill(0);
        let required = out.len() / self.channels * self.channels;
        let mut written = 0;

        while written < required {
            let Pending { chunk, pos } = match self.pending.take() {
                Some(pending) => pending,
                None => match self.ctx.playback_queue().try_pop() {
                    Some(chunk) => Pending { chunk, pos: 0 },
                    None => break,
                },
            };

            let n = (chunk.samples.len() - pos).min(required - written);
            out[written..written + n].copy_from_slice(&chunk.samples[pos..pos + n]);
            written += n;

            if pos + n < chunk.samples.len() {
                self.pending = Some(Pending { chunk, pos: pos + n });
            }
        }

        #[cfg(test)]
        if std::mem::take(&mut self.fail_next) {
            panic!("injected playback failure");
        }

        if written < required {
            PipelineCounters::bump(&self.ctx.counters().playback_underruns);
        }
        written
    }

    /// [`fill`](Self::fill) for use inside a device callback: a panic
    /// produces a silent buffer instead of unwinding into the backend.
    pub fn fill_guarded(&mut self, out: &mut [i16]) {
        if panic::catch_unwind(AssertUnwindSafe(|| self.fill(out))).is_err() {
            out.fill(0);
            self.pending = None;
            PipelineCounters::bump(&self.ctx.counters().callback_panics);
            tracing::error!("playback callback panicked, buffer silenced");
        }
    }

    /// Render `frames` frames into a fresh buffer
    pub fn render(&mut self, frames: usize) -> Vec<i16> {
        let mut out = vec![0i16; frames * self.channels];
        self.fill(&mut out);
        out
    }
}

/// Speaker output stream owned by a background thread
pub struct AudioPlayback {
    ctx: SharedContext,
    running: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
    error_rx: Option<Receiver<AudioError>>,
}

impl AudioPlayback {
    pub fn new(ctx: SharedContext) -> Self {
        Self {
            ctx,
            running: Arc::new(AtomicBool::new(false)),
            thread_handle: None,
            error_rx: None,
        }
    }

    /// Open the output device and start playing from the playback queue
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
            .name("audio-playback".into())
            .spawn(move || {
                let stream = match open_output_stream(&ctx, error_tx) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));

                while running.load(Ordering::Relaxed) && ctx.is_running() {
                    thread::sleep(STREAM_KEEPALIVE_POLL);
                }

                drop(stream);
                tracing::debug!("playback stream closed");
            })
            .map_err(|e| AudioError::StreamError(e.to_string()))?;

        let ready = ready_rx
            .recv()
            .unwrap_or_else(|_| Err(AudioError::StreamError("playback thread exited".into())));
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

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);

        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Check for stream errors
    pub fn check_errors(&self) -> Option<AudioError> {
        self.error_rx.as_ref().and_then(|rx| rx.try_recv().ok())
    }
}

impl Drop for AudioPlayback {
    fn drop(&mut self) {
        self.stop();
    }
}

fn open_output_stream(
    ctx: &SharedContext,
    error_tx: Sender<AudioError>,
) -> Result<cpal::Stream, AudioError> {
    let config = ctx.config();
    let device = find_device(Direction::Output, config.output_device.as_deref())?;
    let format = pick_sample_format(&device, Direction::Output, config)?;

    tracing::info!(
        "Opening output '{}' ({} Hz, {} ch, {:?})",
        device.name().unwrap_or_else(|_| "unknown".into()),
        config.sample_rate,
        config.channels,
        format
    );

    let stream = match build_output_stream(
        &device,
        format,
        &stream_config(config, true),
        ctx,
        error_tx.clone(),
    ) {
        Ok(stream) => stream,
        Err(e) => {
            tracing::warn!("Fixed block size rejected ({}), using device default", e);
            build_output_stream(&device, format, &stream_config(config, false), ctx, error_tx)?
        }
    };

    stream
        .play()
        .map_err(|e| AudioError::StreamError(e.to_string()))?;
    Ok(stream)
}

fn build_output_stream(
    device: &cpal::Device,
    format: SampleFormat,
    config: &StreamConfig,
    ctx: &SharedContext,
    error_tx: Sender<AudioError>,
) -> Result<cpal::Stream, AudioError> {
    let mut renderer = PlaybackRenderer::new(ctx.clone());
    let err_fn = move |err: cpal::StreamError| {
        tracing::warn!("output stream status: {}", err);
        let _ = error_tx.try_send(AudioError::StreamError(err.to_string()));
    };

    let stream = match format {
        SampleFormat::I16 => device.build_output_stream(
            config,
            move |data: &mut [i16], _: &cpal::OutputCallbackInfo| renderer.fill_guarded(data),
            err_fn,
            None,
        ),
        SampleFormat::I8 => build_converted::<i8>(device, config, renderer, err_fn),
        SampleFormat::I32 => build_converted::<i32>(device, config, renderer, err_fn),
        SampleFormat::I64 => build_converted::<i64>(device, config, renderer, err_fn),
        SampleFormat::U8 => build_converted::<u8>(device, config, renderer, err_fn),
        SampleFormat::U16 => build_converted::<u16>(device, config, renderer, err_fn),
        SampleFormat::U32 => build_converted::<u32>(device, config, renderer, err_fn),
        SampleFormat::U64 => build_converted::<u64>(device, config, renderer, err_fn),
        SampleFormat::F32 => build_converted::<f32>(device, config, renderer, err_fn),
        SampleFormat::F64 => build_converted::<f64>(device, config, renderer, err_fn),
        other => return Err(AudioError::UnsupportedFormat(format!("{:?}", other))),
    };
    stream.map_err(|e| AudioError::CpalError(e.to_string()))
}

/// Output stream for devices without native PCM16: render, then convert
fn build_converted<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut renderer: PlaybackRenderer,
    err_fn: impl FnMut(cpal::StreamError) + Send + 'static,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: SizedSample + FromSample<i16>,
{
    let mut scratch: Vec<i16> = Vec::new();
    device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            scratch.resize(data.len(), 0);
            renderer.fill_guarded(&mut scratch);
            for (out, &sample) in data.iter_mut().zip(scratch.iter()) {
                *out = T::from_sample(sample);
            }
        },
        err_fn,
        None,
    )
}
