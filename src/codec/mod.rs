//! PCM16 / base64 codec
//!
//! Audio travels as standard base64 text of little-endian `i16` samples,
//! interleaved by channel. Device samples of any format are normalized to
//! PCM16 before encoding.

pub mod decoder;
pub mod encoder;
pub mod sample;

pub use decoder::decode_chunk;
pub use encoder::ChunkEncoder;
pub use sample::PcmSample;

use base64::alphabet::STANDARD;
use base64::engine::general_purpose::{GeneralPurpose, PAD};

/// Engine shared by encoder and decoder: standard alphabet, padded
pub(crate) const PCM_ENGINE: GeneralPurpose = GeneralPurpose::new(&STANDARD, PAD);
