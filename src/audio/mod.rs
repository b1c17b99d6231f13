//! Audio subsystem module

pub mod buffer;
pub mod capture;
pub mod device;
pub mod playback;

pub use buffer::{AudioChunk, BoundedQueue, EncodedChunk, QueueStats};
pub use capture::{AudioCapture, CaptureOutcome, CaptureProcessor};
pub use device::{find_device, list_devices, AudioDeviceInfo, Direction};
pub use playback::{AudioPlayback, PlaybackRenderer};
