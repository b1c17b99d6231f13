//! Session configuration
//!
//! Every setting resolves with precedence command-line flag > environment
//! variable > config file > built-in default. clap handles the first two; the
//! optional TOML file fills whatever is still unset.

use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::*;
use crate::error::ConfigError;
use crate::network::client::engine_url;

/// What the capture side sends while muted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MuteMode {
    /// Send nothing; peers simply stop receiving chunks
    #[default]
    Drop,
    /// Keep sending zero-filled chunks
    Silence,
}

impl fmt::Display for MuteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Drop => write!(f, "drop"),
            Self::Silence => write!(f, "silence"),
        }
    }
}

/// Command-line surface
#[derive(Debug, Clone, Default, Parser)]
#[command(
    name = "room-streamer",
    version,
    about = "Mic streamer (send+receive) through a Socket.IO relay room"
)]
pub struct CliArgs {
    /// Relay server URL [default: http://localhost:3000]
    #[arg(short = 's', long, env = "SERVER_URL")]
    pub server: Option<String>,

    /// Room code [default: test-room]
    #[arg(short = 'r', long, env = "ROOM_CODE")]
    pub room: Option<String>,

    /// Display name announced on join [default: Rust-Mic]
    #[arg(short = 'n', long, env = "NAME")]
    pub name: Option<String>,

    /// Sample rate in Hz [default: 16000]
    #[arg(long, env = "SAMPLE_RATE")]
    pub sample_rate: Option<u32>,

    /// Channel count [default: 1]
    #[arg(long, env = "CHANNELS")]
    pub channels: Option<u16>,

    /// Device block size in frames [default: 1024]
    #[arg(long = "blocksize", env = "BLOCKSIZE")]
    pub block_size: Option<u32>,

    /// Send queue capacity in chunks [default: 128]
    #[arg(long = "send-queue", env = "SEND_QUEUE")]
    pub send_queue_capacity: Option<usize>,

    /// Playback queue capacity in chunks [default: 256]
    #[arg(long = "playback-queue", env = "PLAYBACK_QUEUE")]
    pub playback_queue_capacity: Option<usize>,

    /// Input device name [default: system default]
    #[arg(long, env = "INPUT_DEVICE")]
    pub input_device: Option<String>,

    /// Output device name [default: system default]
    #[arg(long, env = "OUTPUT_DEVICE")]
    pub output_device: Option<String>,

    /// What to send while muted [default: drop]
    #[arg(long, value_enum, env = "MUTE_MODE")]
    pub mute_mode: Option<MuteMode>,

    /// Seconds between statistics log lines, 0 disables [default: 0]
    #[arg(long, env = "STATS_INTERVAL")]
    pub stats_interval: Option<u64>,

    /// Config file [default: <platform config dir>/config.toml if present]
    #[arg(short = 'c', long, env = "ROOM_AUDIO_CONFIG")]
    pub config: Option<PathBuf>,

    /// List audio devices and exit
    #[arg(long)]
    pub list_devices: bool,
}

/// Optional TOML config file, same fields as the flags
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub server: Option<String>,
    pub room: Option<String>,
    pub name: Option<String>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u16>,
    #[serde(alias = "blocksize")]
    pub block_size: Option<u32>,
    pub send_queue_capacity: Option<usize>,
    pub playback_queue_capacity: Option<usize>,
    pub input_device: Option<String>,
    pub output_device: Option<String>,
    pub mute_mode: Option<MuteMode>,
    pub stats_interval: Option<u64>,
}

impl FileConfig {
    pub fn parse(text: &str, origin: &Path) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: origin.display().to_string(),
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&text, path)
    }

    /// Load the explicit file, or the platform default one if it exists
    pub fn discover(explicit: Option<&Path>) -> Result<Option<Self>, ConfigError> {
        if let Some(path) = explicit {
            return Self::load(path).map(Some);
        }
        match default_config_path() {
            Some(path) if path.is_file() => {
                tracing::debug!("Loading config from {}", path.display());
                Self::load(&path).map(Some)
            }
            _ => Ok(None),
        }
    }
}

/// `<platform config dir>/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "room-audio-streamer")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Immutable settings for one streaming session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub server_url: String,
    pub room: String,
    pub name: String,
    pub sample_rate: u32,
    pub channels: u16,
    pub block_size: u32,
    pub send_queue_capacity: usize,
    pub playback_queue_capacity: usize,
    pub input_device: Option<String>,
    pub output_device: Option<String>,
    pub mute_mode: MuteMode,
    pub stats_interval: Option<Duration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            room: DEFAULT_ROOM.to_string(),
            name: DEFAULT_NAME.to_string(),
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: DEFAULT_CHANNELS,
            block_size: DEFAULT_BLOCK_SIZE,
            send_queue_capacity: DEFAULT_SEND_QUEUE_CAPACITY,
            playback_queue_capacity: DEFAULT_PLAYBACK_QUEUE_CAPACITY,
            input_device: None,
            output_device: None,
            mute_mode: MuteMode::Drop,
            stats_interval: None,
        }
    }
}

impl SessionConfig {
    /// Merge flags/env over the config file over defaults, then validate
    pub fn resolve(cli: &CliArgs, file: Option<FileConfig>) -> Result<Self, ConfigError> {
        let file = file.unwrap_or_default();
        let defaults = Self::default();

        let stats_secs = cli.stats_interval.or(file.stats_interval).unwrap_or(0);

        let config = Self {
            server_url: cli.server.clone().or(file.server).unwrap_or(defaults.server_url),
            room: cli.room.clone().or(file.room).unwrap_or(defaults.room),
            name: cli.name.clone().or(file.name).unwrap_or(defaults.name),
            sample_rate: cli.sample_rate.or(file.sample_rate).unwrap_or(defaults.sample_rate),
            channels: cli.channels.or(file.channels).unwrap_or(defaults.channels),
            block_size: cli.block_size.or(file.block_size).unwrap_or(defaults.block_size),
            send_queue_capacity: cli
                .send_queue_capacity
                .or(file.send_queue_capacity)
                .unwrap_or(defaults.send_queue_capacity),
            playback_queue_capacity: cli
                .playback_queue_capacity
                .or(file.playback_queue_capacity)
                .unwrap_or(defaults.playback_queue_capacity),
            input_device: cli.input_device.clone().or(file.input_device),
            output_device: cli.output_device.clone().or(file.output_device),
            mute_mode: cli.mute_mode.or(file.mute_mode).unwrap_or(defaults.mute_mode),
            stats_interval: (stats_secs > 0).then(|| Duration::from_secs(stats_secs)),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        engine_url(&self.server_url)
            .map_err(|e| ConfigError::invalid("server", e.to_string()))?;
        if self.room.trim().is_empty() {
            return Err(ConfigError::invalid("room", "must not be empty"));
        }
        if self.sample_rate == 0 {
            return Err(ConfigError::invalid("sample_rate", "must be positive"));
        }
        if self.channels == 0 {
            return Err(ConfigError::invalid("channels", "must be positive"));
        }
        if self.block_size == 0 {
            return Err(ConfigError::invalid("blocksize", "must be positive"));
        }
        if self.send_queue_capacity == 0 {
            return Err(ConfigError::invalid("send_queue_capacity", "must be positive"));
        }
        if self.playback_queue_capacity == 0 {
            return Err(ConfigError::invalid("playback_queue_capacity", "must be positive"));
        }
        Ok(())
    }

    /// Interleaved samples in one device block
    pub fn samples_per_block(&self) -> usize {
        self.block_size as usize * self.channels as usize
    }

    /// Wall-clock length of one device block
    pub fn block_duration(&self) -> Duration {
        Duration::from_secs_f64(self.block_size as f64 / self.sample_rate as f64)
    }
}

impl fmt::Display for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SERVER_URL={}, ROOM={}, NAME={}, SR={}, CH={}, BS={}, SEND_Q={}, PLAY_Q={}, MUTE={}",
            self.server_url,
            self.room,
            self.name,
            self.sample_rate,
            self.channels,
            self.block_size,
            self.send_queue_capacity,
            self.playback_queue_capacity,
            self.mute_mode
        )
    }
}
