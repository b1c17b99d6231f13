//! Room audio streamer
//!
//! Streams the microphone to a relay room and plays back what the other
//! participants send.

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use room_audio_streamer::{
    audio::{device::list_devices, AudioCapture, AudioPlayback, Direction},
    config::{CliArgs, FileConfig, SessionConfig},
    console::spawn_console,
    constants::*,
    error::{AudioError, NetworkError},
    network::{AudioChunkHandler, EventEmitter, NetworkSender, SocketClient},
    protocol::JoinRoom,
    session::{SessionContext, SharedContext},
};

fn print_devices() {
    println!("\n=== Available Audio Devices ===");
    for device in list_devices() {
        let device_type = match (device.is_input, device.is_output) {
            (true, true) => "Input/Output",
            (true, false) => "Input",
            (false, true) => "Output",
            _ => "Unknown",
        };
        let default_marker = if device.is_default { " [DEFAULT]" } else { "" };
        println!("  {} ({}){}:", device.name, device_type, default_marker);
        println!("    Sample rates: {:?}", device.sample_rates);
        println!("    Channels: {:?}", device.channels);
    }
    println!();
}

fn build_client(ctx: &SharedContext) -> Result<SocketClient> {
    let handler = AudioChunkHandler::new(ctx.clone());
    let client = SocketClient::builder(ctx.config().server_url.clone())
        .on(EVENT_AUDIO_CHUNK, move |payload| {
            handler.handle(payload);
        })
        .on_connect(|| tracing::info!("Socket connected"))
        .on_disconnect(|| tracing::info!("Socket disconnected"))
        .build()?;
    Ok(client)
}

/// Connect and join the room. Failures are logged; streaming starts anyway.
async fn connect_and_join(client: &SocketClient, ctx: &SessionContext) {
    if let Err(e) = client.connect().await {
        tracing::warn!("Socket connect failed (continuing): {}", e);
        return;
    }

    let join = JoinRoom {
        room: ctx.config().room.clone(),
        name: ctx.config().name.clone(),
    };
    let result = serde_json::to_value(join)
        .map_err(NetworkError::from)
        .and_then(|payload| {
            client.emit_with_ack(EVENT_JOIN_ROOM, payload, |ack| {
                tracing::info!("JOIN: {}", ack);
            })
        });
    if let Err(e) = result {
        tracing::warn!("join-room emit failed: {}", e);
    }
}

/// Open a device stream on the blocking pool; opening can take a while
async fn start_stream<S, F>(stream: S, start: F) -> Result<(S, std::result::Result<(), AudioError>)>
where
    S: Send + 'static,
    F: FnOnce(&mut S) -> std::result::Result<(), AudioError> + Send + 'static,
{
    let opened = tokio::task::spawn_blocking(move || {
        let mut stream = stream;
        let result = start(&mut stream);
        (stream, result)
    })
    .await?;
    Ok(opened)
}

/// Hand errors reported by the device streams to the session's failure policy
fn check_streams(ctx: &SessionContext, capture: &AudioCapture, playback: &AudioPlayback) {
    while let Some(e) = capture.check_errors() {
        ctx.stream_failed(Direction::Input, &e);
    }
    while let Some(e) = playback.check_errors() {
        ctx.stream_failed(Direction::Output, &e);
    }
}

async fn wait_for_shutdown(ctx: &SessionContext, capture: &AudioCapture, playback: &AudioPlayback) {
    let mut poll = tokio::time::interval(STREAM_KEEPALIVE_POLL);
    let mut stats = ctx
        .config()
        .stats_interval
        .map(|period| tokio::time::interval_at(tokio::time::Instant::now() + period, period));
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                tracing::info!("Interrupted");
                return;
            }
            _ = poll.tick() => {
                check_streams(ctx, capture, playback);
                if !ctx.is_running() {
                    return;
                }
            }
            _ = async {
                match stats.as_mut() {
                    Some(interval) => interval.tick().await,
                    None => std::future::pending().await,
                }
            } => {
                tracing::info!("Stats:\n{}", ctx.stats());
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = CliArgs::parse();
    if args.list_devices {
        print_devices();
        return Ok(());
    }

    let file = FileConfig::discover(args.config.as_deref())?;
    let config = SessionConfig::resolve(&args, file)?;
    tracing::info!("Starting room audio streamer: {}", config);

    let ctx = SessionContext::shared(config);
    let client = build_client(&ctx)?;
    connect_and_join(&client, &ctx).await;

    let emitter: Arc<dyn EventEmitter> = Arc::new(client.clone());
    let sender = NetworkSender::spawn(ctx.clone(), emitter)?;

    let (mut playback, opened) =
        start_stream(AudioPlayback::new(ctx.clone()), AudioPlayback::start).await?;
    match opened {
        Ok(()) => tracing::info!("Playback started"),
        Err(e) => tracing::error!("Playback unavailable, continuing send-only: {}", e),
    }

    let (mut capture, opened) =
        start_stream(AudioCapture::new(ctx.clone()), AudioCapture::start).await?;
    match opened {
        Ok(()) => {
            tracing::info!(
                "Streaming mic to room '{}' ({} Hz, {} ch, blocks of {} = {:?})",
                ctx.config().room,
                ctx.config().sample_rate,
                ctx.config().channels,
                ctx.config().block_size,
                ctx.config().block_duration()
            );
            if let Err(e) = spawn_console(ctx.clone()) {
                tracing::warn!("Console unavailable: {}", e);
            }
            wait_for_shutdown(&ctx, &capture, &playback).await;
        }
        Err(e) => tracing::error!("Failed to open input stream: {}", e),
    }

    // Shutdown
    ctx.stop();
    capture.stop();
    playback.stop();
    sender.join();
    client.disconnect().await;

    tracing::info!("Stopped\n{}", ctx.stats());
    Ok(())
}
